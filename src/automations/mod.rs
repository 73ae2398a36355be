pub mod clock;
pub mod dedup;
pub mod discord;
pub mod evaluate;
pub mod template;
pub mod trigger;

use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::time::MissedTickBehavior;

use crate::automations::clock::{local_date, timestamp};
use crate::automations::evaluate::{Firing, LeadEvent};
use crate::automations::trigger::{Trigger, TriggerKind};
use crate::db::models::AutomationRecord;
use crate::db::queries;
use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// Outcome of one evaluation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub evaluated: usize,
    pub sent: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl RunSummary {
    fn absorb(&mut self, other: RunSummary) {
        self.sent += other.sent;
        self.skipped += other.skipped;
        self.failed += other.failed;
    }
}

/// Evaluates every active polled automation once, in creation order.
///
/// A failing automation or entity is recorded as a failed log row and the
/// pass moves on. Only the initial load of automations can fail the whole
/// pass.
pub async fn run_scheduled(state: &AppState, now: DateTime<Utc>) -> AppResult<RunSummary> {
    let automations = queries::list_active_automations(&state.db, None).await?;
    let mut summary = RunSummary::default();

    for automation in automations {
        if automation.trigger_type == TriggerKind::NewLead.as_str() {
            continue;
        }

        summary.evaluated += 1;
        match run_automation(state, &automation, now).await {
            Ok(outcome) => summary.absorb(outcome),
            Err(error) => {
                summary.failed += 1;
                record_failure(state, &automation, None, &error, now).await;
            }
        }
    }

    tracing::info!(
        evaluated = summary.evaluated,
        sent = summary.sent,
        skipped = summary.skipped,
        failed = summary.failed,
        "automation pass finished"
    );
    Ok(summary)
}

/// Fires every active `new_lead` automation for one created lead.
pub async fn handle_new_lead(
    state: &AppState,
    lead: &LeadEvent,
    now: DateTime<Utc>,
) -> AppResult<RunSummary> {
    let automations =
        queries::list_active_automations(&state.db, Some(TriggerKind::NewLead)).await?;
    let vars = evaluate::new_lead_vars(lead);
    let mut summary = RunSummary::default();

    for automation in automations {
        summary.evaluated += 1;
        let firing = Firing {
            entity_id: lead.id.clone().unwrap_or_default(),
            vars: vars.clone(),
        };
        let payload = json!({ "lead_id": lead.id });

        let mut outcome = RunSummary::default();
        deliver(state, &automation, &firing, payload, now, &mut outcome).await;
        mark_fired(state, &automation, now, &outcome).await;
        summary.absorb(outcome);
    }

    Ok(summary)
}

/// Runs the `new_lead` automations off the request path.
pub fn spawn_new_lead(state: AppState, lead: LeadEvent) {
    tokio::spawn(async move {
        let now = state.clock.now();
        match handle_new_lead(&state, &lead, now).await {
            Ok(summary) => tracing::debug!(
                lead_id = ?lead.id,
                sent = summary.sent,
                failed = summary.failed,
                "new lead automations finished"
            ),
            Err(error) => tracing::error!(error = ?error, lead_id = ?lead.id, "new lead automations failed"),
        }
    });
}

/// Starts the in-process poller when an interval is configured.
pub fn spawn_poller(state: AppState) {
    let interval_secs = state.config.automations.poll_interval_secs;
    if interval_secs == 0 {
        return;
    }

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            if let Err(error) = run_scheduled(&state, state.clock.now()).await {
                tracing::error!(error = ?error, "scheduled automation pass failed");
            }
        }
    });
}

/// Sends the automation's template rendered with sample values. Nothing is
/// logged and `last_fired_at` is left alone.
pub async fn send_test(state: &AppState, automation_id: &str) -> AppResult<()> {
    let automation = queries::get_automation(&state.db, automation_id).await?;
    let trigger = Trigger::from_stored(&automation.trigger_type, &automation.trigger_value)?;
    let vars = evaluate::sample_vars(trigger.kind(), state.clock.now(), state.business_timezone());
    let message = template::render(&automation.message_template, &vars);

    discord::send_message(&state.http, &automation.webhook_url, &message)
        .await
        .map_err(|error| AppError::Upstream(format!("{error:#}")))
}

async fn run_automation(
    state: &AppState,
    automation: &AutomationRecord,
    now: DateTime<Utc>,
) -> anyhow::Result<RunSummary> {
    let trigger = Trigger::from_stored(&automation.trigger_type, &automation.trigger_value)
        .context("automation has an invalid trigger")?;
    let tz = state.business_timezone();
    let mut summary = RunSummary::default();

    match trigger {
        Trigger::DeadlineApproaching => {
            let leads = queries::list_leads_with_open_deadlines(&state.db)
                .await
                .context("failed to load leads")?;

            for firing in evaluate::deadline_firings(&leads, now, tz) {
                match dedup::entity_fired_today(&state.db, &automation.id, &firing.entity_id, now, tz)
                    .await
                {
                    Ok(false) => {}
                    Ok(true) => {
                        summary.skipped += 1;
                        continue;
                    }
                    Err(error) => {
                        tracing::error!(
                            error = ?error,
                            automation_id = %automation.id,
                            lead_id = %firing.entity_id,
                            "dedup lookup failed, skipping lead"
                        );
                        summary.skipped += 1;
                        continue;
                    }
                }

                let payload = json!({ "lead_id": firing.entity_id });
                deliver(state, automation, &firing, payload, now, &mut summary).await;
            }
        }
        Trigger::NoProgress { stale_days } => {
            if dedup::already_fired_today(automation.last_fired_at.as_deref(), now, tz) {
                summary.skipped += 1;
                return Ok(summary);
            }

            let projetos = queries::list_unfinished_projetos(&state.db)
                .await
                .context("failed to load projetos")?;

            for firing in evaluate::stale_project_firings(&projetos, now, stale_days, tz) {
                let payload = json!({ "projeto_id": firing.entity_id });
                deliver(state, automation, &firing, payload, now, &mut summary).await;
            }
        }
        Trigger::EndOfDay => {
            if !evaluate::is_digest_hour(now, tz, state.config.automations.end_of_day_hour)
                || dedup::already_fired_today(automation.last_fired_at.as_deref(), now, tz)
            {
                summary.skipped += 1;
                return Ok(summary);
            }

            let today = local_date(now, tz);
            let stats = queries::digest_stats(&state.db, today, evaluate::digest_week_end(now, tz))
                .await
                .context("failed to compute digest stats")?;
            let firing = Firing {
                entity_id: today.to_string(),
                vars: evaluate::digest_vars(stats),
            };

            let payload = json!({ "digest": today.to_string(), "stats": stats });
            deliver(state, automation, &firing, payload, now, &mut summary).await;
        }
        Trigger::NewLead => {}
    }

    // Once per pass, so a failed entity cannot hide the ones after it.
    mark_fired(state, automation, now, &summary).await;
    Ok(summary)
}

/// Fires one entity and folds the outcome into `summary`.
async fn deliver(
    state: &AppState,
    automation: &AutomationRecord,
    firing: &Firing,
    payload: Value,
    now: DateTime<Utc>,
    summary: &mut RunSummary,
) {
    match fire(state, automation, firing, payload, now).await {
        Ok(()) => summary.sent += 1,
        Err(error) => {
            summary.failed += 1;
            record_failure(state, automation, Some(&firing.entity_id), &error, now).await;
        }
    }
}

/// Renders, sends, then records a success row.
async fn fire(
    state: &AppState,
    automation: &AutomationRecord,
    firing: &Firing,
    payload: Value,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    let message = template::render(&automation.message_template, &firing.vars);
    discord::send_message(&state.http, &automation.webhook_url, &message).await?;

    queries::record_automation_log(
        &state.db,
        queries::NewAutomationLog {
            automation_id: automation.id.clone(),
            entity_id: entity_id(&firing.entity_id),
            success: true,
            payload,
            fired_at: timestamp(now),
        },
    )
    .await
    .context("failed to record automation log")?;

    tracing::info!(
        automation_id = %automation.id,
        trigger = %automation.trigger_type,
        entity_id = %firing.entity_id,
        "automation fired"
    );
    Ok(())
}

/// Advances `last_fired_at` when at least one message went out.
async fn mark_fired(
    state: &AppState,
    automation: &AutomationRecord,
    now: DateTime<Utc>,
    summary: &RunSummary,
) {
    if summary.sent == 0 {
        return;
    }

    if let Err(error) = queries::mark_automation_fired(&state.db, &automation.id, &timestamp(now)).await {
        tracing::error!(
            error = ?error,
            automation_id = %automation.id,
            "failed to update last_fired_at"
        );
    }
}

async fn record_failure(
    state: &AppState,
    automation: &AutomationRecord,
    entity: Option<&str>,
    error: &anyhow::Error,
    now: DateTime<Utc>,
) {
    tracing::warn!(
        error = ?error,
        automation_id = %automation.id,
        trigger = %automation.trigger_type,
        entity_id = entity.unwrap_or_default(),
        "automation failed"
    );

    let log = queries::NewAutomationLog {
        automation_id: automation.id.clone(),
        entity_id: entity.and_then(entity_id),
        success: false,
        payload: json!({ "error": format!("{error:#}") }),
        fired_at: timestamp(now),
    };

    if let Err(log_error) = queries::record_automation_log(&state.db, log).await {
        tracing::error!(
            error = ?log_error,
            automation_id = %automation.id,
            "failed to record automation failure"
        );
    }
}

fn entity_id(id: &str) -> Option<String> {
    Some(id.to_string()).filter(|id| !id.is_empty())
}
