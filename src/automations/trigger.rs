use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::error::{AppError, AppResult};

pub const DEFAULT_STALE_DAYS: u32 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    DeadlineApproaching,
    NoProgress,
    NewLead,
    EndOfDay,
}

impl TriggerKind {
    pub const ALL: [Self; 4] = [
        Self::DeadlineApproaching,
        Self::NoProgress,
        Self::NewLead,
        Self::EndOfDay,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::DeadlineApproaching => "deadline_approaching",
            Self::NoProgress => "no_progress",
            Self::NewLead => "new_lead",
            Self::EndOfDay => "end_of_day",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == value.trim())
    }

    pub fn placeholders(self) -> &'static [&'static str] {
        match self {
            Self::DeadlineApproaching => &["lead.name", "lead.company", "lead.deadline"],
            Self::NoProgress => &["projeto.name", "projeto.progress", "projeto.updated_at"],
            Self::NewLead => &["lead.name", "lead.company", "lead.status"],
            Self::EndOfDay => &[
                "stats.leads_active",
                "stats.projetos_dev",
                "stats.tasks_done",
                "stats.deadlines_week",
            ],
        }
    }

    pub fn default_template(self) -> &'static str {
        match self {
            Self::DeadlineApproaching => {
                "🔴 *Prazo chegando!*\nLead: {{lead.name}}\nEmpresa: {{lead.company}}\nPrazo: {{lead.deadline}}"
            }
            Self::NoProgress => {
                "⚠️ *Projeto parado!*\nProjeto: {{projeto.name}}\nProgresso: {{projeto.progress}}%\nÚltima atualização: {{projeto.updated_at}}"
            }
            Self::NewLead => {
                "🟢 *Novo lead cadastrado!*\nNome: {{lead.name}}\nEmpresa: {{lead.company}}\nStatus: {{lead.status}}"
            }
            Self::EndOfDay => {
                "📋 *Resumo do dia*\n\nLeads ativos: {{stats.leads_active}}\nProjetos em dev: {{stats.projetos_dev}}\nTarefas concluídas hoje: {{stats.tasks_done}}\nPrazos esta semana: {{stats.deadlines_week}}"
            }
        }
    }
}

/// A trigger kind together with the parameters that kind understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    DeadlineApproaching,
    NoProgress { stale_days: u32 },
    NewLead,
    EndOfDay,
}

impl Trigger {
    pub fn kind(self) -> TriggerKind {
        match self {
            Self::DeadlineApproaching => TriggerKind::DeadlineApproaching,
            Self::NoProgress { .. } => TriggerKind::NoProgress,
            Self::NewLead => TriggerKind::NewLead,
            Self::EndOfDay => TriggerKind::EndOfDay,
        }
    }

    pub fn from_parts(trigger_type: &str, trigger_value: &Value) -> AppResult<Self> {
        let kind = TriggerKind::parse(trigger_type).ok_or_else(|| {
            AppError::BadRequest(format!("invalid trigger type '{trigger_type}'"))
        })?;

        let params = match trigger_value {
            Value::Null => Map::new(),
            Value::Object(map) => map.clone(),
            _ => {
                return Err(AppError::BadRequest(
                    "trigger_value must be a JSON object".to_string(),
                ))
            }
        };

        match kind {
            TriggerKind::DeadlineApproaching => Ok(Self::DeadlineApproaching),
            TriggerKind::NewLead => Ok(Self::NewLead),
            TriggerKind::EndOfDay => Ok(Self::EndOfDay),
            TriggerKind::NoProgress => {
                let stale_days = match params.get("days") {
                    None | Some(Value::Null) => DEFAULT_STALE_DAYS,
                    Some(value) => parse_stale_days(value)?,
                };
                Ok(Self::NoProgress { stale_days })
            }
        }
    }

    /// Parses a stored row, where `trigger_value` is JSON text.
    pub fn from_stored(trigger_type: &str, trigger_value: &str) -> AppResult<Self> {
        let value = if trigger_value.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(trigger_value).map_err(|error| {
                AppError::BadRequest(format!("trigger_value is not valid JSON: {error}"))
            })?
        };
        Self::from_parts(trigger_type, &value)
    }

    pub fn parameters(self) -> Value {
        match self {
            Self::NoProgress { stale_days } => json!({ "days": stale_days }),
            _ => json!({}),
        }
    }
}

fn parse_stale_days(value: &Value) -> AppResult<u32> {
    let days = value
        .as_u64()
        .or_else(|| value.as_str().and_then(|raw| raw.trim().parse().ok()))
        .ok_or_else(|| {
            AppError::BadRequest("trigger_value.days must be a positive integer".to_string())
        })?;

    match u32::try_from(days) {
        Ok(days) if days > 0 => Ok(days),
        _ => Err(AppError::BadRequest(
            "trigger_value.days must be between 1 and 4294967295".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{Trigger, TriggerKind, DEFAULT_STALE_DAYS};

    #[test]
    fn no_progress_defaults_to_seven_days() {
        let trigger = Trigger::from_parts("no_progress", &json!({})).expect("should parse");
        assert_eq!(
            trigger,
            Trigger::NoProgress {
                stale_days: DEFAULT_STALE_DAYS
            }
        );
        assert_eq!(trigger.parameters(), json!({ "days": 7 }));
    }

    #[test]
    fn no_progress_reads_days_from_number_or_string() {
        assert_eq!(
            Trigger::from_parts("no_progress", &json!({ "days": 3 })).expect("number"),
            Trigger::NoProgress { stale_days: 3 }
        );
        assert_eq!(
            Trigger::from_stored("no_progress", r#"{"days":"14"}"#).expect("string"),
            Trigger::NoProgress { stale_days: 14 }
        );
    }

    #[test]
    fn rejects_zero_days_and_unknown_kinds() {
        assert!(Trigger::from_parts("no_progress", &json!({ "days": 0 })).is_err());
        assert!(Trigger::from_parts("no_progress", &json!({ "days": -2 })).is_err());
        assert!(Trigger::from_parts("on_full_moon", &json!({})).is_err());
        assert!(Trigger::from_parts("end_of_day", &json!([1, 2])).is_err());
    }

    #[test]
    fn parameterless_kinds_ignore_extra_keys() {
        let trigger =
            Trigger::from_parts("deadline_approaching", &json!({ "days": 7 })).expect("parse");
        assert_eq!(trigger, Trigger::DeadlineApproaching);
        assert_eq!(trigger.parameters(), json!({}));
    }

    #[test]
    fn default_templates_only_use_their_own_placeholders() {
        for kind in TriggerKind::ALL {
            let unknown =
                crate::automations::template::unknown_placeholders(kind.default_template(), kind);
            assert!(unknown.is_empty(), "{kind:?} template uses {unknown:?}");
        }
    }
}
