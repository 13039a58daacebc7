//! AnalyticsRepository implementation over SQLite.

use crate::store::{db_err, SqliteStore};
use async_trait::async_trait;
use iris_core::{AnalyticsPoint, AnalyticsRepository, ClickBreakdown, CostBreakdown, Result};
use serde_json::{json, Value};
use sqlx::Row;

#[async_trait]
impl AnalyticsRepository for SqliteStore {
    async fn upsert_data_point(&self, point: &AnalyticsPoint) -> Result<i64> {
        let row = sqlx::query(
            "INSERT INTO template_analytics
             (template_id, start_ts, end_ts, sent_count, delivered_count, read_count)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT (template_id, start_ts, end_ts) DO UPDATE SET
                 sent_count = excluded.sent_count,
                 delivered_count = excluded.delivered_count,
                 read_count = excluded.read_count
             RETURNING id",
        )
        .bind(&point.template_id)
        .bind(point.start)
        .bind(point.end)
        .bind(point.sent)
        .bind(point.delivered)
        .bind(point.read)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(row.get("id"))
    }

    async fn upsert_click(&self, data_point_id: i64, click: &ClickBreakdown) -> Result<()> {
        sqlx::query(
            "INSERT INTO analytics_clicks (data_point_id, click_type, button_content, count)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (data_point_id, click_type, button_content)
             DO UPDATE SET count = excluded.count",
        )
        .bind(data_point_id)
        .bind(&click.click_type)
        .bind(click.button_content.as_deref().unwrap_or(""))
        .bind(click.count)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn upsert_cost(&self, data_point_id: i64, cost: &CostBreakdown) -> Result<()> {
        sqlx::query(
            "INSERT INTO analytics_costs (data_point_id, cost_type, value, currency)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (data_point_id, cost_type)
             DO UPDATE SET value = excluded.value, currency = excluded.currency",
        )
        .bind(data_point_id)
        .bind(&cost.cost_type)
        .bind(cost.value)
        .bind(&cost.currency)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn find_data_point(
        &self,
        template_id: &str,
        start: i64,
        end: i64,
    ) -> Result<Option<AnalyticsPoint>> {
        let row = sqlx::query(
            "SELECT template_id, start_ts, end_ts, sent_count, delivered_count, read_count
             FROM template_analytics
             WHERE template_id = ?1 AND start_ts = ?2 AND end_ts = ?3",
        )
        .bind(template_id)
        .bind(start)
        .bind(end)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(row.map(|row| AnalyticsPoint {
            template_id: row.get("template_id"),
            start: row.get("start_ts"),
            end: row.get("end_ts"),
            sent: row.get("sent_count"),
            delivered: row.get("delivered_count"),
            read: row.get("read_count"),
        }))
    }

    async fn data_point_json(
        &self,
        template_id: &str,
        start: i64,
        end: i64,
    ) -> Result<Option<Value>> {
        let row = sqlx::query(
            "SELECT id, template_id, start_ts, end_ts, sent_count, delivered_count, read_count
             FROM template_analytics
             WHERE template_id = ?1 AND start_ts = ?2 AND end_ts = ?3",
        )
        .bind(template_id)
        .bind(start)
        .bind(end)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let id: i64 = row.get("id");

        let click_rows = sqlx::query(
            "SELECT click_type, button_content, count
             FROM analytics_clicks WHERE data_point_id = ?1
             ORDER BY click_type, button_content",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let clicks: Vec<Value> = click_rows
            .iter()
            .map(|r| {
                let button: String = r.get("button_content");
                json!({
                    "type": r.get::<String, _>("click_type"),
                    "button_content": if button.is_empty() { Value::Null } else { Value::String(button) },
                    "count": r.get::<i64, _>("count"),
                })
            })
            .collect();

        let cost_rows = sqlx::query(
            "SELECT cost_type, value, currency
             FROM analytics_costs WHERE data_point_id = ?1
             ORDER BY cost_type",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let costs: Vec<Value> = cost_rows
            .iter()
            .map(|r| {
                json!({
                    "type": r.get::<String, _>("cost_type"),
                    "value": r.get::<f64, _>("value"),
                    "currency": r.get::<String, _>("currency"),
                })
            })
            .collect();

        Ok(Some(json!({
            "template_id": row.get::<String, _>("template_id"),
            "start": row.get::<i64, _>("start_ts"),
            "end": row.get::<i64, _>("end_ts"),
            "sent": row.get::<i64, _>("sent_count"),
            "delivered": row.get::<i64, _>("delivered_count"),
            "read": row.get::<i64, _>("read_count"),
            "clicked": clicks,
            "cost": costs,
        })))
    }
}
