use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;
use sqlx::query_builder::QueryBuilder;
use sqlx::{Any, AnyPool};
use uuid::Uuid;

use crate::automations::clock::timestamp;
use crate::automations::trigger::{Trigger, TriggerKind};
use crate::db::models::{
    AutomationLogRecord, AutomationRecord, DailyTaskRecord, DealNoteRecord, DealRecord,
    DigestStats, IssueRecord, LeadRecord, ProjetoRecord,
};
use crate::error::{AppError, AppResult};

const LEAD_COLUMNS: &str = "id, name, company, contact, repo_url, status, deadline, notes, tags, archived, created_at, updated_at";
const DEAL_COLUMNS: &str =
    "id, lead_id, title, value, stage, repo_url, notes, created_at, updated_at";
const DEAL_NOTE_COLUMNS: &str = "id, deal_id, content, created_at";
const PROJETO_COLUMNS: &str =
    "id, lead_id, name, status, progress, notes, repo_url, created_at, updated_at";
const DAILY_TASK_COLUMNS: &str =
    "id, title, notes, done, priority, source, source_id, scheduled_date, created_at";
const ISSUE_COLUMNS: &str =
    "id, lead_id, deal_id, projeto_id, gh_id, title, state, url, data, synced_at";
const AUTOMATION_COLUMNS: &str = "id, name, trigger_type, trigger_value, webhook_url, message_template, active, last_fired_at, created_at";
const AUTOMATION_LOG_COLUMNS: &str = "id, automation_id, entity_id, fired_at, success, payload";

#[derive(Debug, Clone, Default)]
pub struct LeadFilters {
    pub status: Option<String>,
    pub include_archived: bool,
}

#[derive(Debug, Clone)]
pub struct NewLeadInput {
    pub name: String,
    pub company: Option<String>,
    pub contact: Option<String>,
    pub repo_url: Option<String>,
    pub status: String,
    pub deadline: Option<String>,
    pub notes: Option<String>,
    pub tags: Vec<String>,
}

/// `Some("")` clears a nullable text field.
#[derive(Debug, Clone, Default)]
pub struct UpdateLeadInput {
    pub name: Option<String>,
    pub company: Option<String>,
    pub contact: Option<String>,
    pub repo_url: Option<String>,
    pub status: Option<String>,
    pub deadline: Option<String>,
    pub notes: Option<String>,
    pub tags: Option<Vec<String>>,
    pub archived: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct NewDealInput {
    pub title: String,
    pub value: f64,
    pub stage: String,
    pub repo_url: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateDealInput {
    pub title: Option<String>,
    pub value: Option<f64>,
    pub stage: Option<String>,
    pub repo_url: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewProjetoInput {
    pub lead_id: Option<String>,
    pub name: String,
    pub status: String,
    pub progress: i64,
    pub notes: Option<String>,
    pub repo_url: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateProjetoInput {
    pub lead_id: Option<String>,
    pub name: Option<String>,
    pub status: Option<String>,
    pub progress: Option<i64>,
    pub notes: Option<String>,
    pub repo_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewDailyTaskInput {
    pub title: String,
    pub notes: Option<String>,
    pub priority: String,
    pub source: String,
    pub source_id: Option<String>,
    pub scheduled_date: String,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateDailyTaskInput {
    pub title: Option<String>,
    pub notes: Option<String>,
    pub done: Option<bool>,
    pub priority: Option<String>,
    pub scheduled_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IssueScope {
    Lead(String),
    Deal(String),
    Projeto(String),
}

impl IssueScope {
    fn column(&self) -> &'static str {
        match self {
            Self::Lead(_) => "lead_id",
            Self::Deal(_) => "deal_id",
            Self::Projeto(_) => "projeto_id",
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Self::Lead(id) | Self::Deal(id) | Self::Projeto(id) => id,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewIssueInput {
    pub gh_id: i64,
    pub title: String,
    pub state: String,
    pub url: Option<String>,
    pub data: Value,
}

#[derive(Debug, Clone)]
pub struct CreateAutomationInput {
    pub name: String,
    pub trigger_type: String,
    pub trigger_value: Value,
    pub webhook_url: String,
    pub message_template: Option<String>,
    pub active: bool,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateAutomationInput {
    pub name: Option<String>,
    pub trigger_type: Option<String>,
    pub trigger_value: Option<Value>,
    pub webhook_url: Option<String>,
    pub message_template: Option<String>,
    pub active: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct NewAutomationLog {
    pub automation_id: String,
    pub entity_id: Option<String>,
    pub success: bool,
    pub payload: Value,
    pub fired_at: String,
}

// ── leads ────────────────────────────────────────────────────────────────

pub async fn list_leads(
    pool: &AnyPool,
    filters: LeadFilters,
    limit: i64,
    offset: i64,
) -> AppResult<Vec<LeadRecord>> {
    let mut query = QueryBuilder::<Any>::new(format!("SELECT {LEAD_COLUMNS} FROM leads WHERE 1 = 1"));

    if let Some(status) = filters.status.as_deref() {
        validate_lead_status(status)?;
        query.push(" AND status = ");
        query.push_bind(status.to_string());
    }

    if !filters.include_archived {
        query.push(" AND archived = 0");
    }

    query.push(" ORDER BY created_at DESC, id DESC LIMIT ");
    query.push_bind(limit);
    query.push(" OFFSET ");
    query.push_bind(offset);

    let leads = query
        .build_query_as::<LeadRecord>()
        .fetch_all(pool)
        .await?;
    Ok(leads)
}

pub async fn get_lead(pool: &AnyPool, lead_id: &str) -> AppResult<LeadRecord> {
    sqlx::query_as::<Any, LeadRecord>(&format!("SELECT {LEAD_COLUMNS} FROM leads WHERE id = ?"))
        .bind(lead_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("lead '{lead_id}' not found")))
}

pub async fn create_lead(
    pool: &AnyPool,
    input: NewLeadInput,
    now: DateTime<Utc>,
) -> AppResult<LeadRecord> {
    let name = required_text("lead name", &input.name)?;
    validate_lead_status(&input.status)?;
    let deadline = normalize_optional_date("deadline", input.deadline)?;
    let tags = tags_json(input.tags)?;

    let lead_id = Uuid::new_v4().to_string();
    let now = timestamp(now);

    sqlx::query(
        r#"
        INSERT INTO leads (
            id,
            name,
            company,
            contact,
            repo_url,
            status,
            deadline,
            notes,
            tags,
            archived,
            created_at,
            updated_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?, ?)
        "#,
    )
    .bind(&lead_id)
    .bind(name)
    .bind(optional_text(input.company))
    .bind(optional_text(input.contact))
    .bind(optional_text(input.repo_url))
    .bind(&input.status)
    .bind(deadline)
    .bind(optional_text(input.notes))
    .bind(tags)
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await?;

    get_lead(pool, &lead_id).await
}

pub async fn update_lead(
    pool: &AnyPool,
    lead_id: &str,
    input: UpdateLeadInput,
    now: DateTime<Utc>,
) -> AppResult<LeadRecord> {
    let existing = get_lead(pool, lead_id).await?;

    let name = match input.name {
        Some(value) => required_text("lead name", &value)?,
        None => existing.name,
    };
    let status = match input.status {
        Some(value) => {
            validate_lead_status(&value)?;
            value
        }
        None => existing.status,
    };
    let deadline = match input.deadline {
        Some(value) => normalize_optional_date("deadline", Some(value))?,
        None => existing.deadline,
    };
    let tags = match input.tags {
        Some(value) => tags_json(value)?,
        None => existing.tags,
    };
    let archived = input.archived.unwrap_or(existing.archived == 1);

    sqlx::query(
        r#"
        UPDATE leads
        SET name = ?, company = ?, contact = ?, repo_url = ?, status = ?, deadline = ?,
            notes = ?, tags = ?, archived = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(name)
    .bind(merge_optional_text(input.company, existing.company))
    .bind(merge_optional_text(input.contact, existing.contact))
    .bind(merge_optional_text(input.repo_url, existing.repo_url))
    .bind(status)
    .bind(deadline)
    .bind(merge_optional_text(input.notes, existing.notes))
    .bind(tags)
    .bind(i64::from(archived))
    .bind(timestamp(now))
    .bind(lead_id)
    .execute(pool)
    .await?;

    get_lead(pool, lead_id).await
}

pub async fn delete_lead(pool: &AnyPool, lead_id: &str) -> AppResult<()> {
    let result = sqlx::query("DELETE FROM leads WHERE id = ?")
        .bind(lead_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("lead '{lead_id}' not found")));
    }

    Ok(())
}

/// Leads that can still hit a deadline: open, not archived, deadline set.
pub async fn list_leads_with_open_deadlines(pool: &AnyPool) -> AppResult<Vec<LeadRecord>> {
    let leads = sqlx::query_as::<Any, LeadRecord>(&format!(
        r#"
        SELECT {LEAD_COLUMNS}
        FROM leads
        WHERE status <> 'done' AND archived = 0 AND deadline IS NOT NULL
        ORDER BY deadline ASC, id ASC
        "#
    ))
    .fetch_all(pool)
    .await?;
    Ok(leads)
}

pub fn parse_tags(raw: &str) -> Vec<String> {
    serde_json::from_str::<Vec<String>>(raw).unwrap_or_else(|error| {
        tracing::warn!(error = ?error, raw, "lead has invalid tags json");
        Vec::new()
    })
}

// ── deals ────────────────────────────────────────────────────────────────

pub async fn list_deals(
    pool: &AnyPool,
    lead_id: Option<&str>,
    limit: i64,
    offset: i64,
) -> AppResult<Vec<DealRecord>> {
    if let Some(lead_id) = lead_id {
        get_lead(pool, lead_id).await?;
    }

    let mut query = QueryBuilder::<Any>::new(format!("SELECT {DEAL_COLUMNS} FROM deals WHERE 1 = 1"));
    if let Some(lead_id) = lead_id {
        query.push(" AND lead_id = ");
        query.push_bind(lead_id.to_string());
    }
    query.push(" ORDER BY created_at DESC, id DESC LIMIT ");
    query.push_bind(limit);
    query.push(" OFFSET ");
    query.push_bind(offset);

    let deals = query
        .build_query_as::<DealRecord>()
        .fetch_all(pool)
        .await?;
    Ok(deals)
}

pub async fn get_deal(pool: &AnyPool, deal_id: &str) -> AppResult<DealRecord> {
    sqlx::query_as::<Any, DealRecord>(&format!("SELECT {DEAL_COLUMNS} FROM deals WHERE id = ?"))
        .bind(deal_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("deal '{deal_id}' not found")))
}

pub async fn create_deal(
    pool: &AnyPool,
    lead_id: &str,
    input: NewDealInput,
    now: DateTime<Utc>,
) -> AppResult<DealRecord> {
    get_lead(pool, lead_id).await?;
    let title = required_text("deal title", &input.title)?;
    validate_deal_stage(&input.stage)?;
    validate_deal_value(input.value)?;

    let deal_id = Uuid::new_v4().to_string();
    let now = timestamp(now);

    sqlx::query(
        r#"
        INSERT INTO deals (id, lead_id, title, value, stage, repo_url, notes, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&deal_id)
    .bind(lead_id)
    .bind(title)
    .bind(input.value)
    .bind(&input.stage)
    .bind(optional_text(input.repo_url))
    .bind(optional_text(input.notes))
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await?;

    get_deal(pool, &deal_id).await
}

pub async fn update_deal(
    pool: &AnyPool,
    deal_id: &str,
    input: UpdateDealInput,
    now: DateTime<Utc>,
) -> AppResult<DealRecord> {
    let existing = get_deal(pool, deal_id).await?;

    let title = match input.title {
        Some(value) => required_text("deal title", &value)?,
        None => existing.title,
    };
    let value = match input.value {
        Some(value) => {
            validate_deal_value(value)?;
            value
        }
        None => existing.value,
    };
    let stage = match input.stage {
        Some(value) => {
            validate_deal_stage(&value)?;
            value
        }
        None => existing.stage,
    };

    sqlx::query(
        r#"
        UPDATE deals
        SET title = ?, value = ?, stage = ?, repo_url = ?, notes = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(title)
    .bind(value)
    .bind(stage)
    .bind(merge_optional_text(input.repo_url, existing.repo_url))
    .bind(merge_optional_text(input.notes, existing.notes))
    .bind(timestamp(now))
    .bind(deal_id)
    .execute(pool)
    .await?;

    get_deal(pool, deal_id).await
}

pub async fn delete_deal(pool: &AnyPool, deal_id: &str) -> AppResult<()> {
    let result = sqlx::query("DELETE FROM deals WHERE id = ?")
        .bind(deal_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("deal '{deal_id}' not found")));
    }

    Ok(())
}

/// Notes on a deal, newest first.
pub async fn list_deal_notes(pool: &AnyPool, deal_id: &str) -> AppResult<Vec<DealNoteRecord>> {
    get_deal(pool, deal_id).await?;

    let notes = sqlx::query_as::<Any, DealNoteRecord>(&format!(
        r#"
        SELECT {DEAL_NOTE_COLUMNS}
        FROM deal_notes
        WHERE deal_id = ?
        ORDER BY created_at DESC, id DESC
        "#
    ))
    .bind(deal_id)
    .fetch_all(pool)
    .await?;
    Ok(notes)
}

pub async fn create_deal_note(
    pool: &AnyPool,
    deal_id: &str,
    content: &str,
    now: DateTime<Utc>,
) -> AppResult<DealNoteRecord> {
    get_deal(pool, deal_id).await?;
    let content = required_text("note content", content)?;
    let note_id = Uuid::new_v4().to_string();

    sqlx::query("INSERT INTO deal_notes (id, deal_id, content, created_at) VALUES (?, ?, ?, ?)")
        .bind(&note_id)
        .bind(deal_id)
        .bind(content)
        .bind(timestamp(now))
        .execute(pool)
        .await?;

    let note = sqlx::query_as::<Any, DealNoteRecord>(&format!(
        "SELECT {DEAL_NOTE_COLUMNS} FROM deal_notes WHERE id = ?"
    ))
    .bind(&note_id)
    .fetch_one(pool)
    .await?;
    Ok(note)
}

pub async fn delete_deal_note(pool: &AnyPool, note_id: &str) -> AppResult<()> {
    let result = sqlx::query("DELETE FROM deal_notes WHERE id = ?")
        .bind(note_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("deal note '{note_id}' not found")));
    }

    Ok(())
}

// ── projetos ─────────────────────────────────────────────────────────────

pub async fn list_projetos(
    pool: &AnyPool,
    status: Option<&str>,
    limit: i64,
    offset: i64,
) -> AppResult<Vec<ProjetoRecord>> {
    let mut query =
        QueryBuilder::<Any>::new(format!("SELECT {PROJETO_COLUMNS} FROM projetos WHERE 1 = 1"));
    if let Some(status) = status {
        validate_projeto_status(status)?;
        query.push(" AND status = ");
        query.push_bind(status.to_string());
    }
    query.push(" ORDER BY created_at DESC, id DESC LIMIT ");
    query.push_bind(limit);
    query.push(" OFFSET ");
    query.push_bind(offset);

    let projetos = query
        .build_query_as::<ProjetoRecord>()
        .fetch_all(pool)
        .await?;
    Ok(projetos)
}

pub async fn get_projeto(pool: &AnyPool, projeto_id: &str) -> AppResult<ProjetoRecord> {
    sqlx::query_as::<Any, ProjetoRecord>(&format!(
        "SELECT {PROJETO_COLUMNS} FROM projetos WHERE id = ?"
    ))
    .bind(projeto_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("projeto '{projeto_id}' not found")))
}

pub async fn create_projeto(
    pool: &AnyPool,
    input: NewProjetoInput,
    now: DateTime<Utc>,
) -> AppResult<ProjetoRecord> {
    let name = required_text("projeto name", &input.name)?;
    validate_projeto_status(&input.status)?;
    validate_progress(input.progress)?;
    let lead_id = optional_text(input.lead_id);
    if let Some(lead_id) = lead_id.as_deref() {
        get_lead(pool, lead_id).await?;
    }

    let projeto_id = Uuid::new_v4().to_string();
    let now = timestamp(now);

    sqlx::query(
        r#"
        INSERT INTO projetos (id, lead_id, name, status, progress, notes, repo_url, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&projeto_id)
    .bind(lead_id)
    .bind(name)
    .bind(&input.status)
    .bind(input.progress)
    .bind(optional_text(input.notes))
    .bind(optional_text(input.repo_url))
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await?;

    get_projeto(pool, &projeto_id).await
}

pub async fn update_projeto(
    pool: &AnyPool,
    projeto_id: &str,
    input: UpdateProjetoInput,
    now: DateTime<Utc>,
) -> AppResult<ProjetoRecord> {
    let existing = get_projeto(pool, projeto_id).await?;

    let name = match input.name {
        Some(value) => required_text("projeto name", &value)?,
        None => existing.name,
    };
    let status = match input.status {
        Some(value) => {
            validate_projeto_status(&value)?;
            value
        }
        None => existing.status,
    };
    let progress = match input.progress {
        Some(value) => {
            validate_progress(value)?;
            value
        }
        None => existing.progress,
    };
    let lead_id = merge_optional_text(input.lead_id, existing.lead_id);
    if let Some(lead_id) = lead_id.as_deref() {
        get_lead(pool, lead_id).await?;
    }

    sqlx::query(
        r#"
        UPDATE projetos
        SET lead_id = ?, name = ?, status = ?, progress = ?, notes = ?, repo_url = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(lead_id)
    .bind(name)
    .bind(status)
    .bind(progress)
    .bind(merge_optional_text(input.notes, existing.notes))
    .bind(merge_optional_text(input.repo_url, existing.repo_url))
    .bind(timestamp(now))
    .bind(projeto_id)
    .execute(pool)
    .await?;

    get_projeto(pool, projeto_id).await
}

pub async fn delete_projeto(pool: &AnyPool, projeto_id: &str) -> AppResult<()> {
    let result = sqlx::query("DELETE FROM projetos WHERE id = ?")
        .bind(projeto_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(format!(
            "projeto '{projeto_id}' not found"
        )));
    }

    Ok(())
}

pub async fn list_unfinished_projetos(pool: &AnyPool) -> AppResult<Vec<ProjetoRecord>> {
    let projetos = sqlx::query_as::<Any, ProjetoRecord>(&format!(
        r#"
        SELECT {PROJETO_COLUMNS}
        FROM projetos
        WHERE status <> 'done'
        ORDER BY updated_at ASC, id ASC
        "#
    ))
    .fetch_all(pool)
    .await?;
    Ok(projetos)
}

// ── daily tasks ──────────────────────────────────────────────────────────

pub async fn list_daily_tasks(
    pool: &AnyPool,
    scheduled_date: &str,
) -> AppResult<Vec<DailyTaskRecord>> {
    let scheduled_date = normalize_date("scheduled_date", scheduled_date)?;

    let tasks = sqlx::query_as::<Any, DailyTaskRecord>(&format!(
        r#"
        SELECT {DAILY_TASK_COLUMNS}
        FROM daily_tasks
        WHERE scheduled_date = ?
        ORDER BY
            CASE priority WHEN 'urgent' THEN 0 WHEN 'scheduled' THEN 1 ELSE 2 END,
            created_at ASC,
            id ASC
        "#
    ))
    .bind(scheduled_date)
    .fetch_all(pool)
    .await?;
    Ok(tasks)
}

pub async fn get_daily_task(pool: &AnyPool, task_id: &str) -> AppResult<DailyTaskRecord> {
    sqlx::query_as::<Any, DailyTaskRecord>(&format!(
        "SELECT {DAILY_TASK_COLUMNS} FROM daily_tasks WHERE id = ?"
    ))
    .bind(task_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("daily task '{task_id}' not found")))
}

pub async fn create_daily_task(
    pool: &AnyPool,
    input: NewDailyTaskInput,
    now: DateTime<Utc>,
) -> AppResult<DailyTaskRecord> {
    let task_id = insert_daily_task(pool, input, &timestamp(now)).await?;
    get_daily_task(pool, &task_id).await
}

pub async fn update_daily_task(
    pool: &AnyPool,
    task_id: &str,
    input: UpdateDailyTaskInput,
) -> AppResult<DailyTaskRecord> {
    let existing = get_daily_task(pool, task_id).await?;

    let title = match input.title {
        Some(value) => required_text("task title", &value)?,
        None => existing.title,
    };
    let priority = match input.priority {
        Some(value) => {
            validate_task_priority(&value)?;
            value
        }
        None => existing.priority,
    };
    let scheduled_date = match input.scheduled_date {
        Some(value) => normalize_date("scheduled_date", &value)?,
        None => existing.scheduled_date,
    };
    let done = input.done.unwrap_or(existing.done == 1);

    sqlx::query(
        r#"
        UPDATE daily_tasks
        SET title = ?, notes = ?, done = ?, priority = ?, scheduled_date = ?
        WHERE id = ?
        "#,
    )
    .bind(title)
    .bind(merge_optional_text(input.notes, existing.notes))
    .bind(i64::from(done))
    .bind(priority)
    .bind(scheduled_date)
    .bind(task_id)
    .execute(pool)
    .await?;

    get_daily_task(pool, task_id).await
}

pub async fn delete_daily_task(pool: &AnyPool, task_id: &str) -> AppResult<()> {
    let result = sqlx::query("DELETE FROM daily_tasks WHERE id = ?")
        .bind(task_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(format!(
            "daily task '{task_id}' not found"
        )));
    }

    Ok(())
}

/// Inserts the inputs whose (source, source_id, scheduled_date) is not
/// already present and returns only the rows that were created.
pub async fn insert_materialized_tasks(
    pool: &AnyPool,
    inputs: Vec<NewDailyTaskInput>,
    now: DateTime<Utc>,
) -> AppResult<Vec<DailyTaskRecord>> {
    let created_at = timestamp(now);
    let mut created_ids = Vec::new();

    for input in inputs {
        let exists: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM daily_tasks
            WHERE source = ? AND source_id = ? AND scheduled_date = ?
            "#,
        )
        .bind(&input.source)
        .bind(&input.source_id)
        .bind(&input.scheduled_date)
        .fetch_one(pool)
        .await?;

        if exists > 0 {
            continue;
        }

        created_ids.push(insert_daily_task(pool, input, &created_at).await?);
    }

    let mut created = Vec::with_capacity(created_ids.len());
    for task_id in created_ids {
        created.push(get_daily_task(pool, &task_id).await?);
    }
    Ok(created)
}

async fn insert_daily_task(
    pool: &AnyPool,
    input: NewDailyTaskInput,
    created_at: &str,
) -> AppResult<String> {
    let title = required_text("task title", &input.title)?;
    validate_task_priority(&input.priority)?;
    validate_task_source(&input.source)?;
    let scheduled_date = normalize_date("scheduled_date", &input.scheduled_date)?;
    let source_id = optional_text(input.source_id);
    if input.source != "manual" && source_id.is_none() {
        return Err(AppError::BadRequest(format!(
            "tasks with source '{}' need a source_id",
            input.source
        )));
    }

    let task_id = Uuid::new_v4().to_string();

    sqlx::query(
        r#"
        INSERT INTO daily_tasks (id, title, notes, done, priority, source, source_id, scheduled_date, created_at)
        VALUES (?, ?, ?, 0, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&task_id)
    .bind(title)
    .bind(optional_text(input.notes))
    .bind(&input.priority)
    .bind(&input.source)
    .bind(source_id)
    .bind(scheduled_date)
    .bind(created_at)
    .execute(pool)
    .await?;

    Ok(task_id)
}

// ── issues ───────────────────────────────────────────────────────────────

pub async fn list_issues(
    pool: &AnyPool,
    scope: Option<&IssueScope>,
    state: Option<&str>,
) -> AppResult<Vec<IssueRecord>> {
    let mut query = QueryBuilder::<Any>::new(format!("SELECT {ISSUE_COLUMNS} FROM issues WHERE 1 = 1"));
    if let Some(scope) = scope {
        query.push(format!(" AND {} = ", scope.column()));
        query.push_bind(scope.id().to_string());
    }
    if let Some(state) = state {
        query.push(" AND state = ");
        query.push_bind(state.to_string());
    }
    query.push(" ORDER BY gh_id ASC, id ASC");

    let issues = query
        .build_query_as::<IssueRecord>()
        .fetch_all(pool)
        .await?;
    Ok(issues)
}

/// Replaces every issue owned by `scope` with `issues`, deduplicated by
/// `gh_id` (first occurrence wins).
pub async fn replace_issues(
    pool: &AnyPool,
    scope: &IssueScope,
    issues: Vec<NewIssueInput>,
    synced_at: &str,
) -> AppResult<Vec<IssueRecord>> {
    let mut seen = std::collections::BTreeSet::new();
    let mut tx = pool.begin().await?;

    sqlx::query(&format!("DELETE FROM issues WHERE {} = ?", scope.column()))
        .bind(scope.id())
        .execute(&mut *tx)
        .await?;

    for issue in issues {
        if !seen.insert(issue.gh_id) {
            continue;
        }

        let data = serde_json::to_string(&issue.data).map_err(|error| {
            tracing::error!(error = ?error, "failed to serialize issue data");
            AppError::Internal
        })?;
        let (lead_id, deal_id, projeto_id) = match scope {
            IssueScope::Lead(id) => (Some(id.as_str()), None, None),
            IssueScope::Deal(id) => (None, Some(id.as_str()), None),
            IssueScope::Projeto(id) => (None, None, Some(id.as_str())),
        };

        sqlx::query(
            r#"
            INSERT INTO issues (id, lead_id, deal_id, projeto_id, gh_id, title, state, url, data, synced_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(lead_id)
        .bind(deal_id)
        .bind(projeto_id)
        .bind(issue.gh_id)
        .bind(issue.title)
        .bind(issue.state)
        .bind(issue.url)
        .bind(data)
        .bind(synced_at)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    list_issues(pool, Some(scope), None).await
}

// ── automations ──────────────────────────────────────────────────────────

pub async fn list_automations(
    pool: &AnyPool,
    limit: i64,
    offset: i64,
) -> AppResult<Vec<AutomationRecord>> {
    let automations = sqlx::query_as::<Any, AutomationRecord>(&format!(
        r#"
        SELECT {AUTOMATION_COLUMNS}
        FROM automations
        ORDER BY created_at DESC, id DESC
        LIMIT ? OFFSET ?
        "#
    ))
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;
    Ok(automations)
}

/// Active automations in creation order, optionally restricted to one kind.
pub async fn list_active_automations(
    pool: &AnyPool,
    kind: Option<TriggerKind>,
) -> AppResult<Vec<AutomationRecord>> {
    let mut query = QueryBuilder::<Any>::new(format!(
        "SELECT {AUTOMATION_COLUMNS} FROM automations WHERE active = 1"
    ));
    if let Some(kind) = kind {
        query.push(" AND trigger_type = ");
        query.push_bind(kind.as_str());
    }
    query.push(" ORDER BY created_at ASC, id ASC");

    let automations = query
        .build_query_as::<AutomationRecord>()
        .fetch_all(pool)
        .await?;
    Ok(automations)
}

pub async fn get_automation(pool: &AnyPool, automation_id: &str) -> AppResult<AutomationRecord> {
    sqlx::query_as::<Any, AutomationRecord>(&format!(
        "SELECT {AUTOMATION_COLUMNS} FROM automations WHERE id = ?"
    ))
    .bind(automation_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("automation '{automation_id}' not found")))
}

pub async fn create_automation(
    pool: &AnyPool,
    input: CreateAutomationInput,
    now: DateTime<Utc>,
) -> AppResult<AutomationRecord> {
    let name = required_text("automation name", &input.name)?;
    let trigger = Trigger::from_parts(&input.trigger_type, &input.trigger_value)?;
    let webhook_url = normalize_webhook_url(&input.webhook_url)?;
    let message_template = match optional_text(input.message_template) {
        Some(template) => template,
        None => trigger.kind().default_template().to_string(),
    };

    let automation_id = Uuid::new_v4().to_string();

    sqlx::query(
        r#"
        INSERT INTO automations (
            id,
            name,
            trigger_type,
            trigger_value,
            webhook_url,
            message_template,
            active,
            last_fired_at,
            created_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, NULL, ?)
        "#,
    )
    .bind(&automation_id)
    .bind(name)
    .bind(trigger.kind().as_str())
    .bind(trigger.parameters().to_string())
    .bind(webhook_url)
    .bind(message_template)
    .bind(i64::from(input.active))
    .bind(timestamp(now))
    .execute(pool)
    .await?;

    get_automation(pool, &automation_id).await
}

pub async fn update_automation(
    pool: &AnyPool,
    automation_id: &str,
    input: UpdateAutomationInput,
) -> AppResult<AutomationRecord> {
    let existing = get_automation(pool, automation_id).await?;

    let name = match input.name {
        Some(value) => required_text("automation name", &value)?,
        None => existing.name,
    };

    let trigger_type = input.trigger_type.unwrap_or(existing.trigger_type);
    let trigger = match input.trigger_value {
        Some(value) => Trigger::from_parts(&trigger_type, &value)?,
        None => Trigger::from_stored(&trigger_type, &existing.trigger_value)?,
    };

    let webhook_url = match input.webhook_url {
        Some(value) => normalize_webhook_url(&value)?,
        None => existing.webhook_url,
    };

    let message_template = match input.message_template {
        Some(value) => required_text("message template", &value)?,
        None => existing.message_template,
    };

    let active = input.active.unwrap_or(existing.active == 1);

    sqlx::query(
        r#"
        UPDATE automations
        SET name = ?, trigger_type = ?, trigger_value = ?, webhook_url = ?, message_template = ?, active = ?
        WHERE id = ?
        "#,
    )
    .bind(name)
    .bind(trigger.kind().as_str())
    .bind(trigger.parameters().to_string())
    .bind(webhook_url)
    .bind(message_template)
    .bind(i64::from(active))
    .bind(automation_id)
    .execute(pool)
    .await?;

    get_automation(pool, automation_id).await
}

pub async fn delete_automation(pool: &AnyPool, automation_id: &str) -> AppResult<()> {
    let result = sqlx::query("DELETE FROM automations WHERE id = ?")
        .bind(automation_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(format!(
            "automation '{automation_id}' not found"
        )));
    }

    Ok(())
}

/// Advances `last_fired_at` to `fired_at` unless it already holds a later
/// instant. Returns whether the row moved.
pub async fn mark_automation_fired(
    pool: &AnyPool,
    automation_id: &str,
    fired_at: &str,
) -> AppResult<bool> {
    let result = sqlx::query(
        r#"
        UPDATE automations
        SET last_fired_at = ?
        WHERE id = ? AND (last_fired_at IS NULL OR last_fired_at < ?)
        "#,
    )
    .bind(fired_at)
    .bind(automation_id)
    .bind(fired_at)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn record_automation_log(
    pool: &AnyPool,
    log: NewAutomationLog,
) -> AppResult<AutomationLogRecord> {
    let payload = serde_json::to_string(&log.payload).map_err(|error| {
        tracing::error!(error = ?error, "failed to serialize automation log payload");
        AppError::Internal
    })?;
    let log_id = Uuid::new_v4().to_string();

    sqlx::query(
        r#"
        INSERT INTO automation_logs (id, automation_id, entity_id, fired_at, success, payload)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&log_id)
    .bind(&log.automation_id)
    .bind(&log.entity_id)
    .bind(&log.fired_at)
    .bind(i64::from(log.success))
    .bind(&payload)
    .execute(pool)
    .await?;

    Ok(AutomationLogRecord {
        id: log_id,
        automation_id: log.automation_id,
        entity_id: log.entity_id,
        fired_at: log.fired_at,
        success: i64::from(log.success),
        payload,
    })
}

pub async fn list_automation_logs(
    pool: &AnyPool,
    automation_id: &str,
    limit: i64,
    offset: i64,
) -> AppResult<Vec<AutomationLogRecord>> {
    get_automation(pool, automation_id).await?;

    let logs = sqlx::query_as::<Any, AutomationLogRecord>(&format!(
        r#"
        SELECT {AUTOMATION_LOG_COLUMNS}
        FROM automation_logs
        WHERE automation_id = ?
        ORDER BY fired_at DESC, id DESC
        LIMIT ? OFFSET ?
        "#
    ))
    .bind(automation_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;
    Ok(logs)
}

/// Whether a successful firing for this automation and entity was logged at
/// or after `since`.
pub async fn automation_fired_for_entity_since(
    pool: &AnyPool,
    automation_id: &str,
    entity_id: &str,
    since: &str,
) -> AppResult<bool> {
    let count: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*)
        FROM automation_logs
        WHERE automation_id = ? AND entity_id = ? AND success = 1 AND fired_at >= ?
        "#,
    )
    .bind(automation_id)
    .bind(entity_id)
    .bind(since)
    .fetch_one(pool)
    .await?;

    Ok(count > 0)
}

/// `today` and `week_end` are `YYYY-MM-DD` dates in the business timezone.
pub async fn digest_stats(
    pool: &AnyPool,
    today: NaiveDate,
    week_end: NaiveDate,
) -> AppResult<DigestStats> {
    let leads_active: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM leads WHERE status <> 'done' AND archived = 0")
            .fetch_one(pool)
            .await?;

    let projetos_dev: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM projetos WHERE status = 'dev'")
        .fetch_one(pool)
        .await?;

    let tasks_done: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM daily_tasks WHERE done = 1 AND scheduled_date = ?",
    )
    .bind(today.to_string())
    .fetch_one(pool)
    .await?;

    let deadlines_week: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*)
        FROM leads
        WHERE status <> 'done' AND archived = 0 AND deadline IS NOT NULL AND deadline <= ?
        "#,
    )
    .bind(week_end.to_string())
    .fetch_one(pool)
    .await?;

    Ok(DigestStats {
        leads_active,
        projetos_dev,
        tasks_done,
        deadlines_week,
    })
}

// ── helpers ──────────────────────────────────────────────────────────────

fn validate_lead_status(value: &str) -> AppResult<()> {
    match value {
        "new" | "in-progress" | "done" => Ok(()),
        _ => Err(AppError::BadRequest(format!(
            "invalid lead status '{value}'"
        ))),
    }
}

fn validate_deal_stage(value: &str) -> AppResult<()> {
    match value {
        "prospect" | "negotiation" | "closed" | "lost" => Ok(()),
        _ => Err(AppError::BadRequest(format!("invalid deal stage '{value}'"))),
    }
}

fn validate_deal_value(value: f64) -> AppResult<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(AppError::BadRequest(
            "deal value must be a non-negative number".to_string(),
        ))
    }
}

fn validate_projeto_status(value: &str) -> AppResult<()> {
    match value {
        "idea" | "dev" | "test" | "done" => Ok(()),
        _ => Err(AppError::BadRequest(format!(
            "invalid projeto status '{value}'"
        ))),
    }
}

fn validate_progress(value: i64) -> AppResult<()> {
    if (0..=100).contains(&value) {
        Ok(())
    } else {
        Err(AppError::BadRequest(
            "progress must be between 0 and 100".to_string(),
        ))
    }
}

fn validate_task_priority(value: &str) -> AppResult<()> {
    match value {
        "urgent" | "scheduled" | "backlog" => Ok(()),
        _ => Err(AppError::BadRequest(format!(
            "invalid task priority '{value}'"
        ))),
    }
}

fn validate_task_source(value: &str) -> AppResult<()> {
    match value {
        "manual" | "lead" | "projeto" => Ok(()),
        _ => Err(AppError::BadRequest(format!(
            "invalid task source '{value}'"
        ))),
    }
}

pub fn normalize_date(field: &str, value: &str) -> AppResult<String> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map(|date| date.to_string())
        .map_err(|_| AppError::BadRequest(format!("{field} must be a YYYY-MM-DD date")))
}

fn normalize_optional_date(field: &str, value: Option<String>) -> AppResult<Option<String>> {
    match optional_text(value) {
        Some(value) => normalize_date(field, &value).map(Some),
        None => Ok(None),
    }
}

fn normalize_webhook_url(value: &str) -> AppResult<String> {
    let trimmed = value.trim();
    let parsed = reqwest::Url::parse(trimmed)
        .map_err(|_| AppError::BadRequest("webhook url must be a valid http(s) URL".to_string()))?;

    match parsed.scheme() {
        "http" | "https" => Ok(parsed.to_string()),
        _ => Err(AppError::BadRequest(
            "webhook url must use http or https".to_string(),
        )),
    }
}

fn required_text(field: &str, value: &str) -> AppResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::BadRequest(format!("{field} cannot be empty")));
    }
    Ok(trimmed.to_string())
}

fn optional_text(value: Option<String>) -> Option<String> {
    value
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
}

fn merge_optional_text(update: Option<String>, existing: Option<String>) -> Option<String> {
    match update {
        Some(value) => optional_text(Some(value)),
        None => existing,
    }
}

fn tags_json(tags: Vec<String>) -> AppResult<String> {
    let mut normalized: Vec<String> = Vec::new();
    for tag in tags {
        let trimmed = tag.trim();
        if trimmed.is_empty() || normalized.iter().any(|seen| seen == trimmed) {
            continue;
        }
        normalized.push(trimmed.to_string());
    }

    serde_json::to_string(&normalized).map_err(|error| {
        tracing::error!(error = ?error, "failed to serialize lead tags");
        AppError::Internal
    })
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, TimeZone, Utc};
    use serde_json::json;

    use crate::db::queries;
    use crate::testing::setup_db;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 10, 12, 0, 0)
            .single()
            .expect("valid instant")
    }

    fn lead_input(name: &str) -> queries::NewLeadInput {
        queries::NewLeadInput {
            name: name.to_string(),
            company: Some("Acme".to_string()),
            contact: None,
            repo_url: None,
            status: "new".to_string(),
            deadline: None,
            notes: None,
            tags: vec!["web".to_string(), " web ".to_string(), "api".to_string()],
        }
    }

    fn deadline_automation(url: &str) -> queries::CreateAutomationInput {
        queries::CreateAutomationInput {
            name: "deadline".to_string(),
            trigger_type: "deadline_approaching".to_string(),
            trigger_value: json!({}),
            webhook_url: url.to_string(),
            message_template: None,
            active: true,
        }
    }

    #[tokio::test]
    async fn lead_update_clears_fields_with_empty_strings() {
        let (_temp_dir, pool) = setup_db("lead-update").await;
        let lead = queries::create_lead(
            &pool,
            queries::NewLeadInput {
                deadline: Some("2026-05-10".to_string()),
                ..lead_input("Ana")
            },
            now(),
        )
        .await
        .expect("lead should be created");
        assert_eq!(queries::parse_tags(&lead.tags), vec!["web", "api"]);

        let updated = queries::update_lead(
            &pool,
            &lead.id,
            queries::UpdateLeadInput {
                company: Some(String::new()),
                deadline: Some("  ".to_string()),
                status: Some("in-progress".to_string()),
                ..Default::default()
            },
            now() + chrono::Duration::hours(2),
        )
        .await
        .expect("lead should update");

        assert_eq!(updated.company, None);
        assert_eq!(updated.deadline, None);
        assert_eq!(updated.status, "in-progress");
        assert_eq!(updated.name, "Ana");
        assert_eq!(updated.created_at, "2026-05-10T12:00:00Z");
        assert_eq!(updated.updated_at, "2026-05-10T14:00:00Z");
    }

    #[tokio::test]
    async fn lead_rejects_invalid_status_and_deadline() {
        let (_temp_dir, pool) = setup_db("lead-validation").await;
        let bad_status = queries::create_lead(
            &pool,
            queries::NewLeadInput {
                status: "won".to_string(),
                ..lead_input("Ana")
            },
            now(),
        )
        .await;
        assert!(bad_status.is_err());

        let bad_deadline = queries::create_lead(
            &pool,
            queries::NewLeadInput {
                deadline: Some("10/05/2026".to_string()),
                ..lead_input("Ana")
            },
            now(),
        )
        .await;
        assert!(bad_deadline.is_err());
    }

    #[tokio::test]
    async fn deleting_lead_cascades_to_deals_and_notes() {
        let (_temp_dir, pool) = setup_db("lead-cascade").await;
        let lead = queries::create_lead(&pool, lead_input("Ana"), now())
            .await
            .expect("lead should be created");
        let deal = queries::create_deal(
            &pool,
            &lead.id,
            queries::NewDealInput {
                title: "Site".to_string(),
                value: 1500.0,
                stage: "lost".to_string(),
                repo_url: None,
                notes: None,
            },
            now(),
        )
        .await
        .expect("deal should be created");
        queries::create_deal_note(&pool, &deal.id, "kickoff", now())
            .await
            .expect("note should be created");

        queries::delete_lead(&pool, &lead.id)
            .await
            .expect("lead should be deleted");
        assert!(queries::get_deal(&pool, &deal.id).await.is_err());

        let notes: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM deal_notes")
            .fetch_one(&pool)
            .await
            .expect("count should load");
        assert_eq!(notes, 0);
    }

    #[tokio::test]
    async fn mark_automation_fired_never_moves_backwards() {
        let (_temp_dir, pool) = setup_db("last-fired").await;
        let automation = queries::create_automation(&pool, deadline_automation("https://discord.test/hook"), now())
            .await
            .expect("automation should be created");
        assert!(automation.message_template.contains("{{lead.name}}"));

        assert!(
            queries::mark_automation_fired(&pool, &automation.id, "2026-05-10T12:00:00Z")
                .await
                .expect("first mark")
        );
        assert!(
            !queries::mark_automation_fired(&pool, &automation.id, "2026-05-09T12:00:00Z")
                .await
                .expect("older mark")
        );
        assert!(
            queries::mark_automation_fired(&pool, &automation.id, "2026-05-11T08:00:00Z")
                .await
                .expect("newer mark")
        );

        let stored = queries::get_automation(&pool, &automation.id)
            .await
            .expect("automation should load");
        assert_eq!(stored.last_fired_at.as_deref(), Some("2026-05-11T08:00:00Z"));
    }

    #[tokio::test]
    async fn automation_rejects_bad_trigger_and_url() {
        let (_temp_dir, pool) = setup_db("automation-validation").await;

        let bad_url = queries::create_automation(&pool, deadline_automation("ftp://example.com"), now())
            .await;
        assert!(bad_url.is_err());

        let bad_days = queries::create_automation(
            &pool,
            queries::CreateAutomationInput {
                trigger_type: "no_progress".to_string(),
                trigger_value: json!({ "days": 0 }),
                ..deadline_automation("https://discord.test/hook")
            },
            now(),
        )
        .await;
        assert!(bad_days.is_err());
    }

    #[tokio::test]
    async fn entity_dedup_lookup_is_scoped_to_automation_entity_and_day() {
        let (_temp_dir, pool) = setup_db("entity-dedup").await;
        let automation = queries::create_automation(&pool, deadline_automation("https://discord.test/hook"), now())
            .await
            .expect("automation should be created");

        queries::record_automation_log(
            &pool,
            queries::NewAutomationLog {
                automation_id: automation.id.clone(),
                entity_id: Some("lead-a".to_string()),
                success: true,
                payload: json!({ "lead_id": "lead-a" }),
                fired_at: "2026-05-10T13:00:00Z".to_string(),
            },
        )
        .await
        .expect("log should be recorded");

        let fired = |entity: &'static str, since: &'static str| {
            let pool = pool.clone();
            let automation_id = automation.id.clone();
            async move {
                queries::automation_fired_for_entity_since(&pool, &automation_id, entity, since)
                    .await
                    .expect("lookup should succeed")
            }
        };

        assert!(fired("lead-a", "2026-05-10T03:00:00Z").await);
        assert!(!fired("lead-b", "2026-05-10T03:00:00Z").await);
        assert!(!fired("lead-a", "2026-05-11T03:00:00Z").await);
    }

    #[tokio::test]
    async fn replace_issues_drops_previous_rows_and_duplicates() {
        let (_temp_dir, pool) = setup_db("issue-replace").await;
        let lead = queries::create_lead(&pool, lead_input("Ana"), now())
            .await
            .expect("lead should be created");
        let scope = queries::IssueScope::Lead(lead.id.clone());
        let issue = |gh_id: i64, title: &str| queries::NewIssueInput {
            gh_id,
            title: title.to_string(),
            state: "open".to_string(),
            url: None,
            data: json!({}),
        };

        queries::replace_issues(
            &pool,
            &scope,
            vec![issue(1, "one"), issue(2, "two")],
            "2026-05-10T12:00:00Z",
        )
        .await
        .expect("first sync");

        let synced = queries::replace_issues(
            &pool,
            &scope,
            vec![issue(2, "two again"), issue(3, "three"), issue(3, "three dup")],
            "2026-05-11T12:00:00Z",
        )
        .await
        .expect("second sync");

        let summary: Vec<(i64, String)> = synced
            .iter()
            .map(|issue| (issue.gh_id, issue.title.clone()))
            .collect();
        assert_eq!(
            summary,
            vec![(2, "two again".to_string()), (3, "three".to_string())]
        );
    }

    #[tokio::test]
    async fn materialized_tasks_are_not_duplicated() {
        let (_temp_dir, pool) = setup_db("materialize-dedup").await;
        let input = queries::NewDailyTaskInput {
            title: "Lead: Ana".to_string(),
            notes: None,
            priority: "urgent".to_string(),
            source: "lead".to_string(),
            source_id: Some("lead-a".to_string()),
            scheduled_date: "2026-05-10".to_string(),
        };

        let first = queries::insert_materialized_tasks(&pool, vec![input.clone()], now())
            .await
            .expect("first materialization");
        let second = queries::insert_materialized_tasks(&pool, vec![input], now())
            .await
            .expect("second materialization");

        assert_eq!(first.len(), 1);
        assert!(second.is_empty());
        assert_eq!(
            queries::list_daily_tasks(&pool, "2026-05-10")
                .await
                .expect("list")
                .len(),
            1
        );
    }
}
