//! Advisor command vocabulary
//!
//! Commands are transient: parsed from one message, dispatched, discarded.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::lead::{LeadId, LeadStatus};

/// Closed set of advisor commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandType {
    Activar,
    Contactado,
    Cita,
    Seguimiento,
    Perdido,
    Cierre,
    /// Typed as `INTENTO`
    IntentoContacto,
    Notas,
    Info,
}

impl CommandType {
    pub const ALL: [CommandType; 9] = [
        Self::Activar,
        Self::Contactado,
        Self::Cita,
        Self::Seguimiento,
        Self::Perdido,
        Self::Cierre,
        Self::IntentoContacto,
        Self::Notas,
        Self::Info,
    ];

    /// Internal name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Activar => "ACTIVAR",
            Self::Contactado => "CONTACTADO",
            Self::Cita => "CITA",
            Self::Seguimiento => "SEGUIMIENTO",
            Self::Perdido => "PERDIDO",
            Self::Cierre => "CIERRE",
            Self::IntentoContacto => "INTENTO_CONTACTO",
            Self::Notas => "NOTAS",
            Self::Info => "INFO",
        }
    }

    /// Word advisors type
    pub fn keyword(&self) -> &'static str {
        match self {
            Self::IntentoContacto => "INTENTO",
            other => other.as_str(),
        }
    }

    /// Case-insensitive keyword lookup; accepts both `INTENTO` and `INTENTO_CONTACTO`
    pub fn from_keyword(word: &str) -> Option<Self> {
        let upper = word.to_ascii_uppercase();
        if upper == "INTENTO_CONTACTO" {
            return Some(Self::IntentoContacto);
        }
        Self::ALL.into_iter().find(|c| c.keyword() == upper)
    }

    /// Status the command moves a lead to, if it changes status at all
    pub fn target_status(&self) -> Option<LeadStatus> {
        match self {
            Self::Activar => Some(LeadStatus::Asignado),
            Self::Contactado => Some(LeadStatus::Contactado),
            Self::Cita => Some(LeadStatus::Cita),
            Self::Seguimiento => Some(LeadStatus::Seguimiento),
            Self::Perdido => Some(LeadStatus::Perdido),
            Self::Cierre => Some(LeadStatus::Cierre),
            Self::IntentoContacto | Self::Notas | Self::Info => None,
        }
    }

    pub fn is_read_only(&self) -> bool {
        matches!(self, Self::Info)
    }

    /// Commands that count as advisor activity on the lead
    pub fn is_advisor_action(&self) -> bool {
        matches!(
            self,
            Self::Contactado | Self::IntentoContacto | Self::Cita | Self::Seguimiento | Self::Notas
        )
    }
}

impl fmt::Display for CommandType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parsed advisor command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    #[serde(rename = "type")]
    pub kind: CommandType,
    pub lead_id: LeadId,
    /// Remaining text after the command/id pair, verbatim
    pub value: Option<String>,
}

impl Command {
    pub fn new(kind: CommandType, lead_id: LeadId) -> Self {
        Self {
            kind,
            lead_id,
            value: None,
        }
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyword_lookup_is_case_insensitive() {
        assert_eq!(CommandType::from_keyword("contactado"), Some(CommandType::Contactado));
        assert_eq!(CommandType::from_keyword("CiTa"), Some(CommandType::Cita));
        assert_eq!(CommandType::from_keyword("intento"), Some(CommandType::IntentoContacto));
        assert_eq!(
            CommandType::from_keyword("INTENTO_CONTACTO"),
            Some(CommandType::IntentoContacto)
        );
        assert_eq!(CommandType::from_keyword("hola"), None);
    }

    #[test]
    fn test_target_status() {
        assert_eq!(CommandType::Activar.target_status(), Some(LeadStatus::Asignado));
        assert_eq!(CommandType::Notas.target_status(), None);
        assert_eq!(CommandType::IntentoContacto.target_status(), None);
        assert!(CommandType::Info.is_read_only());
    }

    #[test]
    fn test_command_serializes_type_field() {
        let cmd = Command::new(CommandType::Contactado, 123);
        let json = serde_json::to_value(&cmd).unwrap();
        assert_eq!(json["type"], "CONTACTADO");
        assert_eq!(json["lead_id"], 123);
    }
}
