//! Spanish reply templates sent back over WhatsApp

use leadflow_core::{Advisor, Assignment, CommandType, Lead, LeadStatus, UserInputError};

const COMMAND_LIST: &str =
    "ACTIVAR, CONTACTADO, CITA, SEGUIMIENTO, PERDIDO, CIERRE, INTENTO, NOTAS, INFO";

pub fn format_help() -> String {
    format!(
        "Formato no reconocido. Escribe <COMANDO> <id> [texto] o <id> <COMANDO> [texto].\n\
         Ejemplo: CONTACTADO 123\n\
         Comandos: {}",
        COMMAND_LIST
    )
}

/// Reply for a rejected advisor message
pub fn user_error(err: &UserInputError) -> String {
    match err {
        UserInputError::InvalidFormat => format_help(),
        UserInputError::InvalidLeadId(token) => format!(
            "\"{}\" no es un id de lead válido; debe ser un número entero.\n{}",
            token,
            format_help()
        ),
        UserInputError::LeadNotFound(id) => format!("No existe ningún lead con id {}.", id),
        UserInputError::InvalidTransition {
            lead_id,
            command,
            status,
        } => format!(
            "No se puede aplicar {} al lead {}: su estado actual es {}.",
            command.keyword(),
            lead_id,
            status
        ),
    }
}

/// Confirmation after a successful command
pub fn confirmation(kind: CommandType, lead: &Lead, holder: Option<&Advisor>) -> String {
    match kind {
        CommandType::Info => info(lead, holder),
        CommandType::Notas => format!("Nota guardada en el lead {}.", lead.id),
        CommandType::IntentoContacto => {
            format!("Intento de contacto registrado para el lead {}.", lead.id)
        },
        CommandType::Activar => match holder {
            Some(advisor) if lead.status == LeadStatus::Asignado => format!(
                "Lead {} reactivado y asignado a {}.",
                lead.id, advisor.name
            ),
            _ => format!(
                "Lead {} sin asesor disponible por ahora; se reintentará automáticamente.",
                lead.id
            ),
        },
        _ => format!(
            "Lead {} ({}) actualizado: {}.",
            lead.id, lead.name, lead.status
        ),
    }
}

/// Lead snapshot for `INFO`
pub fn info(lead: &Lead, holder: Option<&Advisor>) -> String {
    let mut text = format!(
        "Lead {}\nNombre: {}\nTeléfono: {}\nEstado: {}\nAsesor: {}",
        lead.id,
        lead.name,
        lead.phone,
        lead.status,
        holder.map(|a| a.name.as_str()).unwrap_or("sin asignar"),
    );
    if !lead.answers.is_empty() {
        text.push_str("\nRespuestas:");
        for answer in &lead.answers {
            text.push_str(&format!("\n- {}: {}", answer.prompt, answer.answer));
        }
    }
    text
}

/// Notice sent to an advisor when a lead is assigned to them
pub fn assignment_notice(lead: &Lead, assignment: &Assignment) -> String {
    let mut text = format!(
        "Nuevo lead asignado #{}: {} ({}).\nResponde CONTACTADO {} antes de las {} UTC.",
        lead.id,
        lead.name,
        lead.phone,
        lead.id,
        assignment.sla_deadline.format("%H:%M"),
    );
    for answer in &lead.answers {
        text.push_str(&format!("\n- {}: {}", answer.prompt, answer.answer));
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use leadflow_core::QualificationAnswer;

    fn lead() -> Lead {
        Lead {
            id: 42,
            phone: "5215500000001".into(),
            name: "Carla".into(),
            source: "whatsapp".into(),
            status: LeadStatus::Contactado,
            answers: vec![QualificationAnswer::new("¿Presupuesto?", "50000")],
            created_at: Utc::now(),
            updated_at: Utc::now(),
            last_advisor_action_at: None,
        }
    }

    #[test]
    fn test_transition_error_names_keyword() {
        let text = user_error(&UserInputError::InvalidTransition {
            lead_id: 7,
            command: CommandType::IntentoContacto,
            status: LeadStatus::Cierre,
        });
        assert!(text.contains("INTENTO al lead 7"));
        assert!(text.contains("CIERRE"));
    }

    #[test]
    fn test_invalid_id_includes_help() {
        let text = user_error(&UserInputError::InvalidLeadId("abc".into()));
        assert!(text.contains("\"abc\""));
        assert!(text.contains("CONTACTADO 123"));
    }

    #[test]
    fn test_info_lists_answers() {
        let text = info(&lead(), None);
        assert!(text.contains("Estado: CONTACTADO"));
        assert!(text.contains("sin asignar"));
        assert!(text.contains("- ¿Presupuesto?: 50000"));
    }
}
