//! MessageRepository implementation over SQLite.

use crate::store::{db_err, SqliteStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use iris_core::{
    from_api_status, Error, InboundRecord, MessageKind, MessageRepository, MessageStatus,
    OutboundRecord, Result,
};
use sqlx::Row;
use tracing::debug;
use uuid::Uuid;

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Store(format!("bad timestamp '{value}': {e}")))
}

fn parse_optional_timestamp(value: Option<String>) -> Result<Option<DateTime<Utc>>> {
    value.as_deref().map(parse_timestamp).transpose()
}

fn row_to_outbound(row: &sqlx::sqlite::SqliteRow) -> Result<OutboundRecord> {
    let id: String = row.get("id");
    let payload: String = row.get("payload");
    let kind: String = row.get("kind");
    let status: String = row.get("status");
    let created_at: String = row.get("created_at");

    Ok(OutboundRecord {
        id: Uuid::parse_str(&id).map_err(|e| Error::Store(format!("bad record id: {e}")))?,
        wa_id: row.get("wa_id"),
        to: row.get("to_number"),
        kind: MessageKind::from_api_type(&kind),
        message_content: row.get("message_content"),
        payload: serde_json::from_str(&payload)
            .map_err(|e| Error::Store(format!("bad payload json: {e}")))?,
        status: from_api_status(&status),
        error_details: row.get("error_details"),
        error_code: row.get("error_code"),
        context_wa_id: row.get("context_wa_id"),
        created_at: parse_timestamp(&created_at)?,
        sent_at: parse_optional_timestamp(row.get("sent_at"))?,
        delivered_at: parse_optional_timestamp(row.get("delivered_at"))?,
        read_at: parse_optional_timestamp(row.get("read_at"))?,
        failed_at: parse_optional_timestamp(row.get("failed_at"))?,
    })
}

#[async_trait]
impl MessageRepository for SqliteStore {
    async fn create_outbound(&self, record: &OutboundRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO outbound_messages
             (id, wa_id, to_number, kind, message_content, payload, status,
              error_details, error_code, context_wa_id, created_at,
              sent_at, delivered_at, read_at, failed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
        )
        .bind(record.id.to_string())
        .bind(&record.wa_id)
        .bind(&record.to)
        .bind(record.kind.as_str())
        .bind(&record.message_content)
        .bind(record.payload.to_string())
        .bind(record.status.as_str())
        .bind(&record.error_details)
        .bind(record.error_code)
        .bind(&record.context_wa_id)
        .bind(record.created_at.to_rfc3339())
        .bind(record.sent_at.map(|t| t.to_rfc3339()))
        .bind(record.delivered_at.map(|t| t.to_rfc3339()))
        .bind(record.read_at.map(|t| t.to_rfc3339()))
        .bind(record.failed_at.map(|t| t.to_rfc3339()))
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn find_outbound_by_provider_id(&self, wa_id: &str) -> Result<Option<OutboundRecord>> {
        let row = sqlx::query("SELECT * FROM outbound_messages WHERE wa_id = ?1")
            .bind(wa_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.as_ref().map(row_to_outbound).transpose()
    }

    async fn apply_status(
        &self,
        wa_id: &str,
        status: MessageStatus,
        at: DateTime<Utc>,
        error_details: Option<&str>,
        error_code: Option<i64>,
    ) -> Result<bool> {
        let row = sqlx::query("SELECT status FROM outbound_messages WHERE wa_id = ?1")
            .bind(wa_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        let Some(row) = row else {
            debug!(wa_id, "status callback for unknown message, ignoring");
            return Ok(false);
        };

        let current_raw: String = row.get("status");
        let current = from_api_status(&current_raw);
        if !current.can_transition_to(status) {
            debug!(
                wa_id,
                current = %current,
                next = %status,
                "status transition rejected"
            );
            return Ok(false);
        }

        let timestamp_column = match status {
            MessageStatus::Sent => "sent_at",
            MessageStatus::Delivered => "delivered_at",
            MessageStatus::Read => "read_at",
            MessageStatus::Failed => "failed_at",
            // Unreachable through can_transition_to, but keep the column
            // stamping total.
            MessageStatus::Pending => return Ok(false),
        };

        let sql = format!(
            "UPDATE outbound_messages
             SET status = ?1, {timestamp_column} = ?2,
                 error_details = COALESCE(?3, error_details),
                 error_code = COALESCE(?4, error_code)
             WHERE wa_id = ?5"
        );
        sqlx::query(&sql)
            .bind(status.as_str())
            .bind(at.to_rfc3339())
            .bind(error_details)
            .bind(error_code)
            .bind(wa_id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(true)
    }

    async fn create_inbound(&self, record: &InboundRecord) -> Result<()> {
        // Webhooks are at-least-once: a redelivered message is a no-op.
        sqlx::query(
            "INSERT OR IGNORE INTO inbound_messages
             (id, wa_id, from_number, sender_name, kind, message_content,
              payload, context_wa_id, received_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        )
        .bind(record.id.to_string())
        .bind(&record.wa_id)
        .bind(&record.from)
        .bind(&record.sender_name)
        .bind(record.kind.as_str())
        .bind(&record.message_content)
        .bind(record.payload.to_string())
        .bind(&record.context_wa_id)
        .bind(record.received_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }
}
