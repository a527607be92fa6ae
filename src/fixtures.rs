//! Test data seeding.

use chrono::{DateTime, TimeZone, Utc};

use crate::database::Database;
use crate::models::{AppMode, FeedbackRating, InvokeFrom, WorkflowRunStatus};
use crate::timerange::to_db_timestamp;

pub fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, mo, d, h, mi, 0)
        .single()
        .expect("valid utc timestamp")
}

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

pub async fn insert_account(
    db: &Database,
    id: &str,
    timezone: Option<&str>,
    tenant_id: Option<&str>,
) {
    sqlx::query("INSERT INTO accounts (id, name, timezone, current_tenant_id) VALUES (?, ?, ?, ?)")
        .bind(id)
        .bind(format!("account {}", id))
        .bind(timezone)
        .bind(tenant_id)
        .execute(db.pool())
        .await
        .expect("insert account");
}

pub async fn insert_app(db: &Database, id: &str, tenant_id: &str, mode: AppMode) {
    sqlx::query("INSERT INTO apps (id, tenant_id, name, mode) VALUES (?, ?, ?, ?)")
        .bind(id)
        .bind(tenant_id)
        .bind(format!("app {}", id))
        .bind(mode.as_str())
        .execute(db.pool())
        .await
        .expect("insert app");
}

/// Insert a conversation and return its id.
pub async fn insert_conversation(db: &Database, app_id: &str, created_at: DateTime<Utc>) -> String {
    let id = new_id();
    sqlx::query("INSERT INTO conversations (id, app_id, invoke_from, created_at) VALUES (?, ?, ?, ?)")
        .bind(&id)
        .bind(app_id)
        .bind(InvokeFrom::WebApp.as_str())
        .bind(to_db_timestamp(created_at))
        .execute(db.pool())
        .await
        .expect("insert conversation");
    id
}

/// Builder for seeded messages. Defaults to a web-app message with no tokens.
#[derive(Debug, Clone)]
pub struct MessageSeed {
    pub app_id: String,
    pub conversation_id: String,
    pub end_user: Option<String>,
    pub message_tokens: i64,
    pub answer_tokens: i64,
    pub total_price: f64,
    pub latency: f64,
    pub invoke_from: InvokeFrom,
    pub created_at: DateTime<Utc>,
}

impl MessageSeed {
    pub fn new(app_id: &str, conversation_id: &str, created_at: DateTime<Utc>) -> Self {
        Self {
            app_id: app_id.to_string(),
            conversation_id: conversation_id.to_string(),
            end_user: None,
            message_tokens: 0,
            answer_tokens: 0,
            total_price: 0.0,
            latency: 0.0,
            invoke_from: InvokeFrom::WebApp,
            created_at,
        }
    }

    pub fn end_user(mut self, end_user: &str) -> Self {
        self.end_user = Some(end_user.to_string());
        self
    }

    pub fn tokens(mut self, message_tokens: i64, answer_tokens: i64) -> Self {
        self.message_tokens = message_tokens;
        self.answer_tokens = answer_tokens;
        self
    }

    pub fn price(mut self, total_price: f64) -> Self {
        self.total_price = total_price;
        self
    }

    pub fn latency(mut self, seconds: f64) -> Self {
        self.latency = seconds;
        self
    }

    pub fn invoked_from(mut self, invoke_from: InvokeFrom) -> Self {
        self.invoke_from = invoke_from;
        self
    }

    /// Insert the message and return its id.
    pub async fn insert(self, db: &Database) -> String {
        let id = new_id();
        sqlx::query(
            "INSERT INTO messages (id, app_id, conversation_id, from_end_user_id, message_tokens,
                answer_tokens, total_price, currency, provider_response_latency, invoke_from, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, 'USD', ?, ?, ?)",
        )
        .bind(&id)
        .bind(&self.app_id)
        .bind(&self.conversation_id)
        .bind(&self.end_user)
        .bind(self.message_tokens)
        .bind(self.answer_tokens)
        .bind(self.total_price)
        .bind(self.latency)
        .bind(self.invoke_from.as_str())
        .bind(to_db_timestamp(self.created_at))
        .execute(db.pool())
        .await
        .expect("insert message");
        id
    }
}

pub async fn insert_feedback(
    db: &Database,
    app_id: &str,
    conversation_id: &str,
    message_id: &str,
    rating: FeedbackRating,
) {
    sqlx::query(
        "INSERT INTO message_feedbacks (id, app_id, conversation_id, message_id, rating)
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(new_id())
    .bind(app_id)
    .bind(conversation_id)
    .bind(message_id)
    .bind(rating.as_str())
    .execute(db.pool())
    .await
    .expect("insert feedback");
}

/// Insert a workflow run and return its id.
pub async fn insert_workflow_run(
    db: &Database,
    app_id: &str,
    status: WorkflowRunStatus,
    elapsed_time: f64,
    total_tokens: i64,
    total_steps: i64,
    created_at: DateTime<Utc>,
) -> String {
    let id = new_id();
    sqlx::query(
        "INSERT INTO workflow_runs (id, tenant_id, app_id, workflow_id, status, elapsed_time,
            total_tokens, total_steps, created_at)
         VALUES (?, 'tenant-1', ?, 'wf-1', ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(app_id)
    .bind(status.as_str())
    .bind(elapsed_time)
    .bind(total_tokens)
    .bind(total_steps)
    .bind(to_db_timestamp(created_at))
    .execute(db.pool())
    .await
    .expect("insert workflow run");
    id
}

pub async fn insert_node_execution(
    db: &Database,
    app_id: &str,
    run_id: &str,
    index: i64,
    metadata: Option<&str>,
) {
    sqlx::query(
        r#"INSERT INTO workflow_node_executions
            (id, app_id, workflow_run_id, node_id, "index", execution_metadata)
           VALUES (?, ?, ?, ?, ?, ?)"#,
    )
    .bind(new_id())
    .bind(app_id)
    .bind(run_id)
    .bind(format!("node-{}", index))
    .bind(index)
    .bind(metadata)
    .execute(db.pool())
    .await
    .expect("insert node execution");
}
