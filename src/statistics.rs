//! Per-app statistics.
//!
//! Every daily metric is grouped by the calendar date of `created_at` in the
//! caller's timezone and ordered by date. Messages invoked from the debugger
//! never count.

use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::{QueryBuilder, Sqlite, Transaction};

use crate::database::{try_column, Database};
use crate::error::{Result, StatsError};
use crate::local_date::LocalDateBuckets;
use crate::models::{FeedbackRating, InvokeFrom, WorkflowRunStatus};
use crate::timerange::{from_db_timestamp, TimeRange};

/// Currency reported for token costs.
pub const DEFAULT_CURRENCY: &str = "USD";

/// Fractional digits of stored message prices.
const PRICE_SCALE: u32 = 7;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyMessageCount {
    pub date: String,
    pub message_count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyConversationCount {
    pub date: String,
    pub conversation_count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyTerminalCount {
    pub date: String,
    pub terminal_count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyTokenCost {
    pub date: String,
    pub token_count: i64,
    /// Decimal string with seven fractional digits.
    pub total_price: String,
    pub currency: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyInteractions {
    pub date: String,
    pub interactions: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailySatisfactionRate {
    pub date: String,
    /// Likes per thousand messages.
    pub rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyResponseTime {
    pub date: String,
    /// Milliseconds.
    pub latency: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyTokensPerSecond {
    pub date: String,
    pub tps: f64,
}

/// Whole-period conversation totals.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConversationSummary {
    pub total_conversations: i64,
    pub total_messages: i64,
    pub total_tokens: i64,
    pub avg_messages_per_conversation: f64,
}

/// Whole-period workflow run totals.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WorkflowRunSummary {
    pub total_runs: i64,
    pub succeeded_count: i64,
    pub failed_count: i64,
    pub stopped_count: i64,
    pub running_count: i64,
    /// Percentage of runs that succeeded.
    pub success_rate: f64,
    /// Seconds.
    pub avg_elapsed_time: f64,
    pub total_tokens: i64,
    pub total_steps: i64,
}

/// Token usage and cost of a single workflow run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkflowRunCost {
    pub total_tokens: i64,
    pub total_price: f64,
    pub currency: String,
}

/// Round half-to-even on the exact binary value, to `places` fractional digits.
pub fn round_to(value: f64, places: usize) -> f64 {
    format!("{:.*}", places, value).parse().unwrap_or(value)
}

/// Exact `numerator / denominator` rounded half-to-even at `places` decimal digits.
///
/// Unlike [`round_to`], ties are decided on the decimal quotient, so 107/40
/// gives 2.68.
pub fn decimal_ratio(numerator: i64, denominator: i64, places: u32) -> f64 {
    if denominator == 0 {
        return 0.0;
    }
    (Decimal::from(numerator) / Decimal::from(denominator))
        .round_dp_with_strategy(places, RoundingStrategy::MidpointNearestEven)
        .to_f64()
        .unwrap_or(0.0)
}

/// Rows a daily metric reads from.
struct RowSource {
    /// `FROM` clause, joins included.
    from: &'static str,
    /// Column holding the owning app.
    app_column: &'static str,
    /// Column bucketed into local dates and filtered by the time range.
    timestamp: &'static str,
}

// Timestamps go through `datetime()` so `T`-separated or offset-suffixed rows
// compare and bucket like the canonical `YYYY-MM-DD HH:MM:SS` form.
const MESSAGES: RowSource = RowSource {
    from: "messages m",
    app_column: "m.app_id",
    timestamp: "datetime(m.created_at)",
};

const CONVERSATION_MESSAGES: RowSource = RowSource {
    from: "conversations c JOIN messages m ON c.id = m.conversation_id",
    app_column: "c.app_id",
    timestamp: "datetime(c.created_at)",
};

/// Computes statistics for one app at a time.
pub struct StatisticsService {
    db: Arc<Database>,
}

impl StatisticsService {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Messages per day.
    pub async fn daily_messages(
        &self,
        app_id: &str,
        range: &TimeRange,
        tz: Tz,
    ) -> Result<Vec<DailyMessageCount>> {
        let rows = self
            .daily_message_rows(app_id, range, tz, "COUNT(*) AS message_count", "")
            .await?;

        rows.iter()
            .map(|row| {
                Ok(DailyMessageCount {
                    date: try_column(row, "date")?,
                    message_count: try_column(row, "message_count")?,
                })
            })
            .collect()
    }

    /// Distinct conversations with at least one message per day.
    pub async fn daily_conversations(
        &self,
        app_id: &str,
        range: &TimeRange,
        tz: Tz,
    ) -> Result<Vec<DailyConversationCount>> {
        let rows = self
            .daily_message_rows(
                app_id,
                range,
                tz,
                "COUNT(DISTINCT m.conversation_id) AS conversation_count",
                "",
            )
            .await?;

        rows.iter()
            .map(|row| {
                Ok(DailyConversationCount {
                    date: try_column(row, "date")?,
                    conversation_count: try_column(row, "conversation_count")?,
                })
            })
            .collect()
    }

    /// Distinct end users per day.
    pub async fn daily_end_users(
        &self,
        app_id: &str,
        range: &TimeRange,
        tz: Tz,
    ) -> Result<Vec<DailyTerminalCount>> {
        let rows = self
            .daily_message_rows(
                app_id,
                range,
                tz,
                "COUNT(DISTINCT m.from_end_user_id) AS terminal_count",
                "",
            )
            .await?;

        rows.iter()
            .map(|row| {
                Ok(DailyTerminalCount {
                    date: try_column(row, "date")?,
                    terminal_count: try_column(row, "terminal_count")?,
                })
            })
            .collect()
    }

    /// Prompt plus answer tokens and their price per day.
    pub async fn daily_token_costs(
        &self,
        app_id: &str,
        range: &TimeRange,
        tz: Tz,
    ) -> Result<Vec<DailyTokenCost>> {
        let rows = self
            .daily_message_rows(
                app_id,
                range,
                tz,
                "COALESCE(SUM(m.message_tokens), 0) + COALESCE(SUM(m.answer_tokens), 0) AS token_count,
                 COALESCE(SUM(CAST(ROUND(m.total_price * 10000000) AS INTEGER)), 0) AS price_units",
                "",
            )
            .await?;

        rows.iter()
            .map(|row| {
                let price_units: i64 = try_column(row, "price_units")?;
                Ok(DailyTokenCost {
                    date: try_column(row, "date")?,
                    token_count: try_column(row, "token_count")?,
                    total_price: Decimal::new(price_units, PRICE_SCALE).to_string(),
                    currency: DEFAULT_CURRENCY.to_string(),
                })
            })
            .collect()
    }

    /// Average messages per conversation, bucketed by conversation creation date.
    pub async fn average_session_interactions(
        &self,
        app_id: &str,
        range: &TimeRange,
        tz: Tz,
    ) -> Result<Vec<DailyInteractions>> {
        let mut tx = self.begin().await?;

        let Some((first, last)) = fetch_span(&mut tx, &CONVERSATION_MESSAGES, app_id, range).await?
        else {
            return finish_empty(tx).await;
        };
        let buckets = LocalDateBuckets::for_span(tz, first, last);

        let mut qb = QueryBuilder::<Sqlite>::new("SELECT ");
        buckets.push_date_expr(&mut qb, CONVERSATION_MESSAGES.timestamp);
        qb.push(
            " AS date, COALESCE(SUM(sub.message_count), 0) AS message_total,
                    COUNT(*) AS conversation_count
             FROM (SELECT m.conversation_id, COUNT(m.id) AS message_count FROM ",
        );
        qb.push(CONVERSATION_MESSAGES.from);
        push_filters(&mut qb, &CONVERSATION_MESSAGES, app_id, range);
        qb.push(
            " GROUP BY m.conversation_id) sub
             LEFT JOIN conversations c ON c.id = sub.conversation_id
             GROUP BY date ORDER BY date",
        );

        let rows = qb
            .build()
            .fetch_all(&mut *tx)
            .await
            .map_err(|e| StatsError::Database(format!("Failed to query session interactions: {}", e)))?;
        commit(tx).await?;

        rows.iter()
            .map(|row| {
                let message_total: i64 = try_column(row, "message_total")?;
                let conversation_count: i64 = try_column(row, "conversation_count")?;
                Ok(DailyInteractions {
                    date: try_column(row, "date")?,
                    interactions: decimal_ratio(message_total, conversation_count, 2),
                })
            })
            .collect()
    }

    /// Likes per thousand messages per day.
    pub async fn user_satisfaction_rate(
        &self,
        app_id: &str,
        range: &TimeRange,
        tz: Tz,
    ) -> Result<Vec<DailySatisfactionRate>> {
        let join = format!(
            " LEFT JOIN message_feedbacks mf ON mf.message_id = m.id AND mf.rating = '{}'",
            FeedbackRating::Like.as_str()
        );
        let rows = self
            .daily_message_rows(
                app_id,
                range,
                tz,
                "COUNT(m.id) AS message_count, COUNT(mf.id) AS feedback_count",
                &join,
            )
            .await?;

        rows.iter()
            .map(|row| {
                let message_count: i64 = try_column(row, "message_count")?;
                let feedback_count: i64 = try_column(row, "feedback_count")?;
                let rate = if message_count > 0 {
                    round_to(feedback_count as f64 * 1000.0 / message_count as f64, 2)
                } else {
                    0.0
                };
                Ok(DailySatisfactionRate {
                    date: try_column(row, "date")?,
                    rate,
                })
            })
            .collect()
    }

    /// Average provider latency in milliseconds per day.
    pub async fn average_response_time(
        &self,
        app_id: &str,
        range: &TimeRange,
        tz: Tz,
    ) -> Result<Vec<DailyResponseTime>> {
        let rows = self
            .daily_message_rows(
                app_id,
                range,
                tz,
                "CAST(COALESCE(AVG(m.provider_response_latency), 0) AS REAL) AS latency",
                "",
            )
            .await?;

        rows.iter()
            .map(|row| {
                let latency: f64 = try_column(row, "latency")?;
                Ok(DailyResponseTime {
                    date: try_column(row, "date")?,
                    latency: round_to(latency * 1000.0, 4),
                })
            })
            .collect()
    }

    /// Answer tokens per second of provider latency per day.
    pub async fn tokens_per_second(
        &self,
        app_id: &str,
        range: &TimeRange,
        tz: Tz,
    ) -> Result<Vec<DailyTokensPerSecond>> {
        let rows = self
            .daily_message_rows(
                app_id,
                range,
                tz,
                "CAST(CASE
                     WHEN COALESCE(SUM(m.provider_response_latency), 0) = 0 THEN 0
                     ELSE SUM(m.answer_tokens) * 1.0 / SUM(m.provider_response_latency)
                 END AS REAL) AS tps",
                "",
            )
            .await?;

        rows.iter()
            .map(|row| {
                let tps: f64 = try_column(row, "tps")?;
                Ok(DailyTokensPerSecond {
                    date: try_column(row, "date")?,
                    tps: round_to(tps, 4),
                })
            })
            .collect()
    }

    /// Conversation and message totals over the window.
    ///
    /// Conversations are selected by creation time. Their messages count
    /// regardless of when they were sent, debugger messages excepted.
    pub async fn conversation_summary(
        &self,
        app_id: &str,
        range: &TimeRange,
    ) -> Result<ConversationSummary> {
        let mut tx = self.begin().await?;

        let mut total_qb = QueryBuilder::<Sqlite>::new(
            "SELECT COUNT(DISTINCT id) AS total_count FROM conversations WHERE app_id = ",
        );
        total_qb.push_bind(app_id);
        push_range(&mut total_qb, "datetime(created_at)", range);

        let total_row = total_qb
            .build()
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| StatsError::Database(format!("Failed to count conversations: {}", e)))?;
        let total_conversations: i64 = try_column(&total_row, "total_count")?;

        let mut messages_qb = QueryBuilder::<Sqlite>::new(
            "SELECT COUNT(*) AS conversation_count,
                    COALESCE(SUM(message_count), 0) AS total_messages,
                    COALESCE(SUM(total_tokens), 0) AS total_tokens
             FROM (SELECT c.id, COUNT(m.id) AS message_count,
                          COALESCE(SUM(m.message_tokens + m.answer_tokens), 0) AS total_tokens
                   FROM conversations c
                   LEFT JOIN messages m ON c.id = m.conversation_id AND m.invoke_from != ",
        );
        messages_qb.push_bind(InvokeFrom::Debugger.as_str());
        messages_qb.push(" WHERE c.app_id = ").push_bind(app_id);
        push_range(&mut messages_qb, "datetime(c.created_at)", range);
        messages_qb.push(" GROUP BY c.id)");

        let row = messages_qb
            .build()
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| StatsError::Database(format!("Failed to sum conversation messages: {}", e)))?;
        commit(tx).await?;

        let conversation_count: i64 = try_column(&row, "conversation_count")?;
        let total_messages: i64 = try_column(&row, "total_messages")?;
        let total_tokens: i64 = try_column(&row, "total_tokens")?;

        let avg_messages_per_conversation = if conversation_count > 0 {
            round_to(total_messages as f64 / conversation_count as f64, 2)
        } else {
            0.0
        };

        Ok(ConversationSummary {
            total_conversations,
            total_messages,
            total_tokens,
            avg_messages_per_conversation,
        })
    }

    /// Run counts by status, success rate and resource totals over the window.
    pub async fn workflow_run_summary(
        &self,
        app_id: &str,
        range: &TimeRange,
    ) -> Result<WorkflowRunSummary> {
        let mut tx = self.begin().await?;

        let mut qb = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) AS total_runs");
        for (status, alias) in [
            (WorkflowRunStatus::Succeeded, "succeeded_count"),
            (WorkflowRunStatus::Failed, "failed_count"),
            (WorkflowRunStatus::Stopped, "stopped_count"),
            (WorkflowRunStatus::Running, "running_count"),
        ] {
            qb.push(", COALESCE(SUM(CASE WHEN status = ");
            qb.push_bind(status.as_str());
            qb.push(" THEN 1 ELSE 0 END), 0) AS ").push(alias);
        }
        qb.push(
            ", CAST(COALESCE(AVG(elapsed_time), 0) AS REAL) AS avg_elapsed_time,
               COALESCE(SUM(total_tokens), 0) AS total_tokens,
               COALESCE(SUM(total_steps), 0) AS total_steps
             FROM workflow_runs WHERE app_id = ",
        );
        qb.push_bind(app_id);
        push_range(&mut qb, "datetime(created_at)", range);

        let row = qb
            .build()
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| StatsError::Database(format!("Failed to summarize workflow runs: {}", e)))?;
        commit(tx).await?;

        let total_runs: i64 = try_column(&row, "total_runs")?;
        if total_runs == 0 {
            return Ok(WorkflowRunSummary::default());
        }

        let succeeded_count: i64 = try_column(&row, "succeeded_count")?;
        let avg_elapsed_time: f64 = try_column(&row, "avg_elapsed_time")?;

        Ok(WorkflowRunSummary {
            total_runs,
            succeeded_count,
            failed_count: try_column(&row, "failed_count")?,
            stopped_count: try_column(&row, "stopped_count")?,
            running_count: try_column(&row, "running_count")?,
            success_rate: round_to(succeeded_count as f64 / total_runs as f64 * 100.0, 2),
            avg_elapsed_time: round_to(avg_elapsed_time, 4),
            total_tokens: try_column(&row, "total_tokens")?,
            total_steps: try_column(&row, "total_steps")?,
        })
    }

    /// Token and price totals over the node executions of one run.
    ///
    /// An unknown run yields zeros. The currency is the last one reported by a
    /// node, in execution order.
    pub async fn workflow_run_cost(&self, app_id: &str, run_id: &str) -> Result<WorkflowRunCost> {
        let rows = sqlx::query(
            r#"SELECT execution_metadata FROM workflow_node_executions
               WHERE app_id = ? AND workflow_run_id = ?
               ORDER BY "index", created_at"#,
        )
        .bind(app_id)
        .bind(run_id)
        .fetch_all(self.db.pool())
        .await
        .map_err(|e| StatsError::Database(format!("Failed to get node executions: {}", e)))?;

        let mut total_tokens: i64 = 0;
        let mut total_price = Decimal::ZERO;
        let mut currency = DEFAULT_CURRENCY.to_string();

        for row in &rows {
            let metadata: Option<String> = try_column(row, "execution_metadata")?;
            let Some(metadata) = metadata.filter(|m| !m.trim().is_empty()) else {
                continue;
            };

            let metadata: serde_json::Value = match serde_json::from_str(&metadata) {
                Ok(value) => value,
                Err(e) => {
                    tracing::warn!(
                        run_id = %run_id,
                        error = %e,
                        "Skipping node execution with malformed metadata"
                    );
                    continue;
                }
            };

            if let Some(tokens) = metadata.get("total_tokens").and_then(json_integer) {
                total_tokens += tokens;
            }
            if let Some(price) = metadata.get("total_price").and_then(json_decimal) {
                total_price += price;
            }
            if let Some(code) = metadata.get("currency").and_then(|c| c.as_str()) {
                currency = code.to_string();
            }
        }

        Ok(WorkflowRunCost {
            total_tokens,
            total_price: total_price.to_f64().unwrap_or(0.0),
            currency,
        })
    }

    async fn begin(&self) -> Result<Transaction<'static, Sqlite>> {
        self.db
            .pool()
            .begin()
            .await
            .map_err(|e| StatsError::Database(format!("Failed to begin transaction: {}", e)))
    }

    /// Run a daily aggregation over non-debugger messages.
    ///
    /// `select` lists the aggregate columns; `join` is appended to `FROM messages m`.
    async fn daily_message_rows(
        &self,
        app_id: &str,
        range: &TimeRange,
        tz: Tz,
        select: &str,
        join: &str,
    ) -> Result<Vec<SqliteRow>> {
        let mut tx = self.begin().await?;

        let Some((first, last)) = fetch_span(&mut tx, &MESSAGES, app_id, range).await? else {
            return finish_empty(tx).await;
        };
        let buckets = LocalDateBuckets::for_span(tz, first, last);

        let mut qb = QueryBuilder::<Sqlite>::new("SELECT ");
        buckets.push_date_expr(&mut qb, MESSAGES.timestamp);
        qb.push(" AS date, ").push(select);
        qb.push(" FROM ").push(MESSAGES.from).push(join);
        push_filters(&mut qb, &MESSAGES, app_id, range);
        qb.push(" GROUP BY date ORDER BY date");

        let rows = qb
            .build()
            .fetch_all(&mut *tx)
            .await
            .map_err(|e| StatsError::Database(format!("Failed to query daily statistics: {}", e)))?;
        commit(tx).await?;

        tracing::debug!(
            app_id = %app_id,
            rows = rows.len(),
            offset_segments = buckets.segments().len(),
            "Daily statistics query"
        );

        Ok(rows)
    }
}

/// Append the app, debugger and time-range filters of `source` as the WHERE clause.
fn push_filters<'a>(
    qb: &mut QueryBuilder<'a, Sqlite>,
    source: &RowSource,
    app_id: &'a str,
    range: &TimeRange,
) {
    qb.push(" WHERE ").push(source.app_column).push(" = ");
    qb.push_bind(app_id);
    qb.push(" AND m.invoke_from != ");
    qb.push_bind(InvokeFrom::Debugger.as_str());
    push_range(qb, source.timestamp, range);
}

/// Append half-open range conditions on `column`.
fn push_range(qb: &mut QueryBuilder<'_, Sqlite>, column: &str, range: &TimeRange) {
    if let Some(start) = range.start_param() {
        qb.push(" AND ").push(column).push(" >= ");
        qb.push_bind(start);
    }
    if let Some(end) = range.end_param() {
        qb.push(" AND ").push(column).push(" < ");
        qb.push_bind(end);
    }
}

/// Earliest and latest timestamps of the rows a daily metric would group.
async fn fetch_span(
    conn: &mut SqliteConnection,
    source: &RowSource,
    app_id: &str,
    range: &TimeRange,
) -> Result<Option<(DateTime<Utc>, DateTime<Utc>)>> {
    let mut qb = QueryBuilder::<Sqlite>::new("SELECT MIN(");
    qb.push(source.timestamp).push(") AS first_at, MAX(");
    qb.push(source.timestamp).push(") AS last_at FROM ");
    qb.push(source.from);
    push_filters(&mut qb, source, app_id, range);

    let row = qb
        .build()
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| StatsError::Database(format!("Failed to get statistics span: {}", e)))?;

    let first: Option<String> = try_column(&row, "first_at")?;
    let last: Option<String> = try_column(&row, "last_at")?;

    match (first, last) {
        (Some(first), Some(last)) => Ok(Some((from_db_timestamp(&first)?, from_db_timestamp(&last)?))),
        _ => Ok(None),
    }
}

async fn commit(tx: Transaction<'_, Sqlite>) -> Result<()> {
    tx.commit()
        .await
        .map_err(|e| StatsError::Database(format!("Failed to commit transaction: {}", e)))
}

async fn finish_empty<T>(tx: Transaction<'_, Sqlite>) -> Result<Vec<T>> {
    commit(tx).await?;
    Ok(Vec::new())
}

fn json_integer(value: &serde_json::Value) -> Option<i64> {
    value
        .as_i64()
        .or_else(|| value.as_f64().map(|f| f as i64))
}

fn json_decimal(value: &serde_json::Value) -> Option<Decimal> {
    let raw = match value {
        serde_json::Value::String(s) => s.trim().to_string(),
        serde_json::Value::Number(n) => n.to_string(),
        _ => return None,
    };
    Decimal::from_str(&raw)
        .or_else(|_| Decimal::from_scientific(&raw))
        .ok()
}
