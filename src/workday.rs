use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Utc};

use crate::automations::clock::{local_date, start_of_day};
use crate::db::models::{DailyTaskRecord, LeadRecord, ProjetoRecord};
use crate::db::queries::{self, NewDailyTaskInput};
use crate::error::AppResult;
use crate::state::AppState;

const URGENT_HORIZON_DAYS: i64 = 7;
const SLOW_PROGRESS_THRESHOLD: i64 = 80;

/// Creates the day's derived tasks for `date` (business-local today when
/// `None`). Tasks that already exist for the same source row and date are
/// left alone, so repeated calls return an empty list.
pub async fn materialize(
    state: &AppState,
    date: Option<NaiveDate>,
) -> AppResult<Vec<DailyTaskRecord>> {
    let now = state.clock.now();
    let tz = state.business_timezone();
    let date = date.unwrap_or_else(|| local_date(now, tz));

    let leads = queries::list_leads_with_open_deadlines(&state.db).await?;
    let projetos = queries::list_unfinished_projetos(&state.db).await?;
    let candidates = task_candidates(&leads, &projetos, date, now, tz);

    let created = queries::insert_materialized_tasks(&state.db, candidates, now).await?;
    tracing::info!(date = %date, created = created.len(), "daily tasks materialized");
    Ok(created)
}

/// Urgent tasks for leads due within a week, scheduled tasks for projetos
/// below 80% progress.
pub fn task_candidates(
    leads: &[LeadRecord],
    projetos: &[ProjetoRecord],
    date: NaiveDate,
    now: DateTime<Utc>,
    tz: FixedOffset,
) -> Vec<NewDailyTaskInput> {
    let horizon = now + Duration::days(URGENT_HORIZON_DAYS);
    let scheduled_date = date.to_string();

    let urgent = leads
        .iter()
        .filter(|lead| lead.status != "done" && lead.archived == 0)
        .filter_map(|lead| {
            let deadline =
                NaiveDate::parse_from_str(lead.deadline.as_deref()?, "%Y-%m-%d").ok()?;
            (start_of_day(deadline, tz) < horizon).then(|| NewDailyTaskInput {
                title: format!("Lead: {} — prazo {}", lead.name, deadline.format("%d/%m")),
                notes: None,
                priority: "urgent".to_string(),
                source: "lead".to_string(),
                source_id: Some(lead.id.clone()),
                scheduled_date: scheduled_date.clone(),
            })
        });

    let slow = projetos
        .iter()
        .filter(|projeto| projeto.status != "done" && projeto.progress < SLOW_PROGRESS_THRESHOLD)
        .map(|projeto| NewDailyTaskInput {
            title: format!("Projeto: {} — {}% concluído", projeto.name, projeto.progress),
            notes: None,
            priority: "scheduled".to_string(),
            source: "projeto".to_string(),
            source_id: Some(projeto.id.clone()),
            scheduled_date: scheduled_date.clone(),
        });

    urgent.chain(slow).collect()
}

#[cfg(test)]
mod tests {
    use chrono::{FixedOffset, NaiveDate, TimeZone, Utc};

    use super::task_candidates;
    use crate::db::models::{LeadRecord, ProjetoRecord};

    fn lead(id: &str, deadline: &str, status: &str) -> LeadRecord {
        LeadRecord {
            id: id.to_string(),
            name: id.to_string(),
            company: None,
            contact: None,
            repo_url: None,
            status: status.to_string(),
            deadline: Some(deadline.to_string()),
            notes: None,
            tags: "[]".to_string(),
            archived: 0,
            created_at: "2026-05-01T12:00:00Z".to_string(),
            updated_at: "2026-05-01T12:00:00Z".to_string(),
        }
    }

    fn projeto(id: &str, progress: i64, status: &str) -> ProjetoRecord {
        ProjetoRecord {
            id: id.to_string(),
            lead_id: None,
            name: id.to_string(),
            status: status.to_string(),
            progress,
            notes: None,
            repo_url: None,
            created_at: "2026-05-01T12:00:00Z".to_string(),
            updated_at: "2026-05-01T12:00:00Z".to_string(),
        }
    }

    #[test]
    fn picks_near_deadlines_and_slow_projects() {
        let tz = FixedOffset::west_opt(3 * 3600).expect("valid offset");
        let now = Utc
            .with_ymd_and_hms(2026, 5, 10, 12, 0, 0)
            .single()
            .expect("valid instant");
        let date = NaiveDate::from_ymd_opt(2026, 5, 10).expect("valid date");

        let leads = vec![
            lead("soon", "2026-05-14", "new"),
            lead("overdue", "2026-05-02", "in-progress"),
            lead("far", "2026-05-30", "new"),
            lead("closed", "2026-05-12", "done"),
        ];
        let projetos = vec![
            projeto("slow", 40, "dev"),
            projeto("almost", 80, "test"),
            projeto("finished", 10, "done"),
        ];

        let candidates = task_candidates(&leads, &projetos, date, now, tz);
        let summary: Vec<(&str, &str, Option<&str>)> = candidates
            .iter()
            .map(|task| {
                (
                    task.priority.as_str(),
                    task.source.as_str(),
                    task.source_id.as_deref(),
                )
            })
            .collect();

        assert_eq!(
            summary,
            vec![
                ("urgent", "lead", Some("soon")),
                ("urgent", "lead", Some("overdue")),
                ("scheduled", "projeto", Some("slow")),
            ]
        );
        assert_eq!(candidates[0].title, "Lead: soon — prazo 14/05");
        assert_eq!(candidates[2].title, "Projeto: slow — 40% concluído");
        assert!(candidates.iter().all(|task| task.scheduled_date == "2026-05-10"));
    }
}
