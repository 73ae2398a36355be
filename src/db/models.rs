use serde::Serialize;
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct LeadRecord {
    pub id: String,
    pub name: String,
    pub company: Option<String>,
    pub contact: Option<String>,
    pub repo_url: Option<String>,
    pub status: String,
    pub deadline: Option<String>,
    pub notes: Option<String>,
    pub tags: String,
    pub archived: i64,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct DealRecord {
    pub id: String,
    pub lead_id: String,
    pub title: String,
    pub value: f64,
    pub stage: String,
    pub repo_url: Option<String>,
    pub notes: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct DealNoteRecord {
    pub id: String,
    pub deal_id: String,
    pub content: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ProjetoRecord {
    pub id: String,
    pub lead_id: Option<String>,
    pub name: String,
    pub status: String,
    pub progress: i64,
    pub notes: Option<String>,
    pub repo_url: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct DailyTaskRecord {
    pub id: String,
    pub title: String,
    pub notes: Option<String>,
    pub done: i64,
    pub priority: String,
    pub source: String,
    pub source_id: Option<String>,
    pub scheduled_date: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct IssueRecord {
    pub id: String,
    pub lead_id: Option<String>,
    pub deal_id: Option<String>,
    pub projeto_id: Option<String>,
    pub gh_id: i64,
    pub title: String,
    pub state: String,
    pub url: Option<String>,
    pub data: String,
    pub synced_at: String,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct AutomationRecord {
    pub id: String,
    pub name: String,
    pub trigger_type: String,
    pub trigger_value: String,
    pub webhook_url: String,
    pub message_template: String,
    pub active: i64,
    pub last_fired_at: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct AutomationLogRecord {
    pub id: String,
    pub automation_id: String,
    pub entity_id: Option<String>,
    pub fired_at: String,
    pub success: i64,
    pub payload: String,
}

/// Counters behind the `end_of_day` digest.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DigestStats {
    pub leads_active: i64,
    pub projetos_dev: i64,
    pub tasks_done: i64,
    pub deadlines_week: i64,
}
