//! Pure trigger evaluation: given "now", the business timezone and a
//! snapshot of domain rows, decide which entities qualify and build their
//! template variables. Nothing here touches the store or the network.

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Timelike, Utc};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::automations::clock::{format_date, local_date, parse_timestamp, start_of_day};
use crate::automations::template::{vars, TemplateVars};
use crate::automations::trigger::TriggerKind;
use crate::db::models::{DigestStats, LeadRecord, ProjetoRecord};

const DAY_MS: i64 = 86_400_000;
const MISSING_COMPANY: &str = "—";

/// One notification an evaluator wants to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Firing {
    pub entity_id: String,
    pub vars: TemplateVars,
}

/// The lead fields carried by a lead-created event.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LeadEvent {
    #[serde(default, deserialize_with = "id_as_string")]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

impl From<&LeadRecord> for LeadEvent {
    fn from(lead: &LeadRecord) -> Self {
        Self {
            id: Some(lead.id.clone()),
            name: Some(lead.name.clone()),
            company: lead.company.clone(),
            status: Some(lead.status.clone()),
        }
    }
}

/// Row ids arrive as strings or as numbers depending on the emitter.
fn id_as_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(id) => Some(id),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    })
}

/// Whole days from `now` until local midnight of `deadline`, rounded up.
pub fn days_until(deadline: NaiveDate, now: DateTime<Utc>, tz: FixedOffset) -> i64 {
    let ms = (start_of_day(deadline, tz) - now).num_milliseconds();
    ms.div_euclid(DAY_MS) + i64::from(ms.rem_euclid(DAY_MS) != 0)
}

/// Leads whose deadline is exactly one day out.
pub fn deadline_firings(leads: &[LeadRecord], now: DateTime<Utc>, tz: FixedOffset) -> Vec<Firing> {
    leads
        .iter()
        .filter(|lead| lead.status != "done" && lead.archived == 0)
        .filter_map(|lead| {
            let raw = lead.deadline.as_deref()?;
            let deadline = match NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
                Ok(date) => date,
                Err(error) => {
                    tracing::warn!(lead_id = %lead.id, deadline = raw, error = %error, "skipping lead with unreadable deadline");
                    return None;
                }
            };

            if days_until(deadline, now, tz) != 1 {
                return None;
            }

            Some(Firing {
                entity_id: lead.id.clone(),
                vars: vars([
                    ("lead.name", lead.name.clone()),
                    ("lead.company", company_or_dash(lead.company.as_deref())),
                    ("lead.deadline", format_date(deadline)),
                ]),
            })
        })
        .collect()
}

/// Unfinished projetos not touched for more than `stale_days`.
pub fn stale_project_firings(
    projetos: &[ProjetoRecord],
    now: DateTime<Utc>,
    stale_days: u32,
    tz: FixedOffset,
) -> Vec<Firing> {
    let cutoff = now - Duration::days(i64::from(stale_days));

    projetos
        .iter()
        .filter(|projeto| projeto.status != "done")
        .filter_map(|projeto| {
            let Some(updated_at) = parse_timestamp(&projeto.updated_at) else {
                tracing::warn!(projeto_id = %projeto.id, updated_at = %projeto.updated_at, "skipping projeto with unreadable updated_at");
                return None;
            };

            if updated_at >= cutoff {
                return None;
            }

            Some(Firing {
                entity_id: projeto.id.clone(),
                vars: vars([
                    ("projeto.name", projeto.name.clone()),
                    ("projeto.progress", projeto.progress.to_string()),
                    ("projeto.updated_at", format_date(local_date(updated_at, tz))),
                ]),
            })
        })
        .collect()
}

pub fn is_digest_hour(now: DateTime<Utc>, tz: FixedOffset, hour: u32) -> bool {
    now.with_timezone(&tz).hour() == hour
}

/// Last local date counted by `stats.deadlines_week`.
pub fn digest_week_end(now: DateTime<Utc>, tz: FixedOffset) -> NaiveDate {
    local_date(now + Duration::days(7), tz)
}

pub fn digest_vars(stats: DigestStats) -> TemplateVars {
    vars([
        ("stats.leads_active", stats.leads_active.to_string()),
        ("stats.projetos_dev", stats.projetos_dev.to_string()),
        ("stats.tasks_done", stats.tasks_done.to_string()),
        ("stats.deadlines_week", stats.deadlines_week.to_string()),
    ])
}

pub fn new_lead_vars(event: &LeadEvent) -> TemplateVars {
    vars([
        ("lead.name", event.name.clone().unwrap_or_default()),
        ("lead.company", company_or_dash(event.company.as_deref())),
        ("lead.status", event.status.clone().unwrap_or_default()),
    ])
}

/// Placeholder values for test sends.
pub fn sample_vars(kind: TriggerKind, now: DateTime<Utc>, tz: FixedOffset) -> TemplateVars {
    let today = local_date(now, tz);
    match kind {
        TriggerKind::DeadlineApproaching => vars([
            ("lead.name", "Lead de exemplo".to_string()),
            ("lead.company", "Empresa Exemplo".to_string()),
            (
                "lead.deadline",
                format_date(today.succ_opt().unwrap_or(today)),
            ),
        ]),
        TriggerKind::NoProgress => vars([
            ("projeto.name", "Projeto de exemplo".to_string()),
            ("projeto.progress", "42".to_string()),
            ("projeto.updated_at", format_date(today)),
        ]),
        TriggerKind::NewLead => new_lead_vars(&LeadEvent {
            id: None,
            name: Some("Lead de exemplo".to_string()),
            company: Some("Empresa Exemplo".to_string()),
            status: Some("new".to_string()),
        }),
        TriggerKind::EndOfDay => digest_vars(DigestStats {
            leads_active: 3,
            projetos_dev: 2,
            tasks_done: 5,
            deadlines_week: 1,
        }),
    }
}

fn company_or_dash(company: Option<&str>) -> String {
    company
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(MISSING_COMPANY)
        .to_string()
}
