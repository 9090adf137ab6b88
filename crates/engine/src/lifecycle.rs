//! Lead lifecycle state machine
//!
//! ```text
//! NUEVO -> PRECALIFICADO -> ASIGNADO -> CONTACTADO -> {CITA, SEGUIMIENTO} -> CIERRE | PERDIDO
//! ```
//!
//! That is the usual path, not a constraint: an open lead accepts any status
//! command, so an advisor may close or lose a lead straight from `ASIGNADO`.
//! Only terminal leads reject commands. `ACTIVAR` is an override that forces
//! any open lead to `ASIGNADO`. Moving a lead back to `NUEVO` is only possible
//! through the administrative reset, never through a command.

use leadflow_core::{Command, CommandType, Lead, LeadStatus, UserInputError};

/// Statuses reachable from `status` through a normal command
pub fn valid_transitions(status: LeadStatus) -> &'static [LeadStatus] {
    use LeadStatus::*;
    match status {
        Nuevo => &[Precalificado, Contactado, Cita, Seguimiento, Cierre, Perdido],
        Precalificado => &[Asignado, Contactado, Cita, Seguimiento, Cierre, Perdido],
        Asignado | Contactado | Cita | Seguimiento => &[Contactado, Cita, Seguimiento, Cierre, Perdido],
        Cierre | Perdido => &[],
    }
}

pub fn can_transition(from: LeadStatus, to: LeadStatus) -> bool {
    valid_transitions(from).contains(&to)
}

/// Validate a command against a lead.
///
/// Returns the status the lead moves to, or `None` when the command leaves
/// the status untouched (`INTENTO`, `NOTAS`, `INFO`).
pub fn check_command(command: &Command, lead: &Lead) -> Result<Option<LeadStatus>, UserInputError> {
    let rejected = || UserInputError::InvalidTransition {
        lead_id: lead.id,
        command: command.kind,
        status: lead.status,
    };

    if command.kind.is_read_only() {
        return Ok(None);
    }
    if lead.status.is_terminal() {
        return Err(rejected());
    }

    match command.kind {
        CommandType::Activar => Ok(Some(LeadStatus::Asignado)),
        CommandType::IntentoContacto => Ok(None),
        CommandType::Notas => match command.value.as_deref() {
            Some(body) if !body.trim().is_empty() => Ok(None),
            _ => Err(UserInputError::InvalidFormat),
        },
        kind => match kind.target_status() {
            Some(target) if can_transition(lead.status, target) => Ok(Some(target)),
            _ => Err(rejected()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn lead(status: LeadStatus) -> Lead {
        Lead {
            id: 7,
            phone: "5215500000001".into(),
            name: "Carla".into(),
            source: "whatsapp".into(),
            status,
            answers: Vec::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            last_advisor_action_at: None,
        }
    }

    #[test]
    fn test_happy_path() {
        use LeadStatus::*;
        let path = [Nuevo, Precalificado, Asignado, Contactado, Seguimiento, Seguimiento, Cita, Cierre];
        for pair in path.windows(2) {
            assert!(can_transition(pair[0], pair[1]), "{:?} -> {:?}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_never_back_to_nuevo() {
        use LeadStatus::*;
        for status in [Nuevo, Precalificado, Asignado, Contactado, Cita, Seguimiento, Cierre, Perdido] {
            assert!(!can_transition(status, Nuevo));
        }
    }

    #[test]
    fn test_terminal_rejects_everything_but_info() {
        let closed = lead(LeadStatus::Cierre);
        let err = check_command(&Command::new(CommandType::Contactado, 7), &closed).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Cannot apply CONTACTADO to lead 7 with status CIERRE"
        );

        for kind in CommandType::ALL {
            let result = check_command(&Command::new(kind, 7).with_value("nota"), &closed);
            if kind == CommandType::Info {
                assert_eq!(result, Ok(None));
            } else {
                assert!(result.is_err(), "{} accepted on closed lead", kind);
            }
        }
    }

    #[test]
    fn test_activar_overrides_any_open_status() {
        for status in [
            LeadStatus::Nuevo,
            LeadStatus::Precalificado,
            LeadStatus::Asignado,
            LeadStatus::Contactado,
            LeadStatus::Seguimiento,
        ] {
            assert_eq!(
                check_command(&Command::new(CommandType::Activar, 7), &lead(status)),
                Ok(Some(LeadStatus::Asignado))
            );
        }
    }

    #[test]
    fn test_open_lead_accepts_every_status_command() {
        use LeadStatus::*;
        let commands = [
            (CommandType::Contactado, Contactado),
            (CommandType::Cita, Cita),
            (CommandType::Seguimiento, Seguimiento),
            (CommandType::Cierre, Cierre),
            (CommandType::Perdido, Perdido),
        ];
        for status in [Nuevo, Precalificado, Asignado, Contactado, Cita, Seguimiento] {
            for (kind, target) in commands {
                assert_eq!(
                    check_command(&Command::new(kind, 7), &lead(status)),
                    Ok(Some(target)),
                    "{} on {}",
                    kind,
                    status
                );
            }
        }
    }

    #[test]
    fn test_close_straight_from_assigned() {
        let assigned = lead(LeadStatus::Asignado);
        assert_eq!(
            check_command(&Command::new(CommandType::Cierre, 7), &assigned),
            Ok(Some(LeadStatus::Cierre))
        );
        assert_eq!(
            check_command(&Command::new(CommandType::Seguimiento, 7), &assigned),
            Ok(Some(LeadStatus::Seguimiento))
        );
    }

    #[test]
    fn test_status_neutral_commands() {
        let assigned = lead(LeadStatus::Asignado);
        assert_eq!(
            check_command(&Command::new(CommandType::IntentoContacto, 7), &assigned),
            Ok(None)
        );
        assert_eq!(
            check_command(&Command::new(CommandType::Notas, 7).with_value("x"), &assigned),
            Ok(None)
        );
        assert_eq!(
            check_command(&Command::new(CommandType::Notas, 7), &assigned),
            Err(UserInputError::InvalidFormat)
        );
    }
}
