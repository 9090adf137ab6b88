//! Advisor points table
//!
//! Single source of truth for point values. Components look values up here
//! at award time instead of hardcoding them.

use serde::{Deserialize, Serialize};

use leadflow_core::ScoreReason;

use crate::ConfigError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointsTable {
    #[serde(default = "default_close")]
    pub close: i64,
    #[serde(default = "default_appointment")]
    pub appointment: i64,
    #[serde(default = "default_property_tour")]
    pub property_tour: i64,
    #[serde(default = "default_quality_note")]
    pub quality_note: i64,
    #[serde(default = "default_flash_response")]
    pub flash_response: i64,
    #[serde(default = "default_normal_response")]
    pub normal_response: i64,
    #[serde(default = "default_slow_rejection")]
    pub slow_rejection: i64,
    #[serde(default = "default_sla_breach")]
    pub sla_breach: i64,
    #[serde(default = "default_forced_reassignment")]
    pub forced_reassignment: i64,
    #[serde(default = "default_abandonment")]
    pub abandonment: i64,
    /// Minimum note length that earns the quality note bonus
    #[serde(default = "default_quality_note_min_chars")]
    pub quality_note_min_chars: usize,
}

fn default_close() -> i64 {
    200
}
fn default_appointment() -> i64 {
    25
}
fn default_property_tour() -> i64 {
    50
}
fn default_quality_note() -> i64 {
    2
}
fn default_flash_response() -> i64 {
    2
}
fn default_normal_response() -> i64 {
    1
}
fn default_slow_rejection() -> i64 {
    -2
}
fn default_sla_breach() -> i64 {
    -30
}
fn default_forced_reassignment() -> i64 {
    -10
}
fn default_abandonment() -> i64 {
    -20
}
fn default_quality_note_min_chars() -> usize {
    20
}

impl Default for PointsTable {
    fn default() -> Self {
        Self {
            close: default_close(),
            appointment: default_appointment(),
            property_tour: default_property_tour(),
            quality_note: default_quality_note(),
            flash_response: default_flash_response(),
            normal_response: default_normal_response(),
            slow_rejection: default_slow_rejection(),
            sla_breach: default_sla_breach(),
            forced_reassignment: default_forced_reassignment(),
            abandonment: default_abandonment(),
            quality_note_min_chars: default_quality_note_min_chars(),
        }
    }
}

impl PointsTable {
    /// Points for a reason. Audit-only reasons are always zero.
    pub fn points(&self, reason: ScoreReason) -> i64 {
        match reason {
            ScoreReason::Close => self.close,
            ScoreReason::Appointment => self.appointment,
            ScoreReason::PropertyTour => self.property_tour,
            ScoreReason::QualityNote => self.quality_note,
            ScoreReason::FlashResponse => self.flash_response,
            ScoreReason::NormalResponse => self.normal_response,
            ScoreReason::SlowRejection => self.slow_rejection,
            ScoreReason::SlaBreach => self.sla_breach,
            ScoreReason::ForcedReassignment => self.forced_reassignment,
            ScoreReason::Abandonment => self.abandonment,
            ScoreReason::FastRejection | ScoreReason::ManualReassignment => 0,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let penalties = [
            ("points.slow_rejection", self.slow_rejection),
            ("points.sla_breach", self.sla_breach),
            ("points.forced_reassignment", self.forced_reassignment),
            ("points.abandonment", self.abandonment),
        ];
        for (field, value) in penalties {
            if value > 0 {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    message: format!("Penalty must not be positive, got {}", value),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_table_values() {
        let table = PointsTable::default();
        assert_eq!(table.points(ScoreReason::Close), 200);
        assert_eq!(table.points(ScoreReason::Appointment), 25);
        assert_eq!(table.points(ScoreReason::PropertyTour), 50);
        assert_eq!(table.points(ScoreReason::QualityNote), 2);
        assert_eq!(table.points(ScoreReason::FlashResponse), 2);
        assert_eq!(table.points(ScoreReason::NormalResponse), 1);
        assert_eq!(table.points(ScoreReason::SlowRejection), -2);
        assert_eq!(table.points(ScoreReason::SlaBreach), -30);
        assert_eq!(table.points(ScoreReason::ForcedReassignment), -10);
        assert_eq!(table.points(ScoreReason::Abandonment), -20);
        assert_eq!(table.points(ScoreReason::FastRejection), 0);
        assert_eq!(table.points(ScoreReason::ManualReassignment), 0);
    }

    #[test]
    fn test_positive_penalty_rejected() {
        let mut table = PointsTable::default();
        table.sla_breach = 5;
        assert!(table.validate().is_err());
    }
}
