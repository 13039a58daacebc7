//! Analytics ingestion - per-template time-series metrics
//!
//! Batch job over a bounded date window. Template ids are chunked into
//! groups of ten to stay under the provider query limit; each chunk is one
//! `template_analytics` request. Data points whose core metrics are all
//! zero are skipped, never persisted. Persistence is an idempotent upsert
//! keyed by `(template_id, start, end)`, so re-running a window is safe.
//! One failing chunk is counted and logged without aborting the rest, and
//! a fixed pause between chunks throttles the request rate.

use crate::endpoints::Endpoint;
use crate::transport::{HttpMethod, Transport};
use chrono::{DateTime, Utc};
use iris_core::{
    AnalyticsPoint, AnalyticsRepository, ClickBreakdown, CostBreakdown, Error, GatewayConfig,
    Result,
};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument};

/// Maximum window width accepted by the provider.
pub const MAX_WINDOW_DAYS: i64 = 90;

/// Template ids per analytics request.
pub const TEMPLATE_CHUNK_SIZE: usize = 10;

/// Metrics requested from the provider.
const METRIC_TYPES: &str = r#"["sent","delivered","read","clicked","cost"]"#;

/// Fixed pause between chunk requests. Rate-limit courtesy, not backoff.
const CHUNK_PAUSE: Duration = Duration::from_millis(500);

/// Outcome counters for one ingestion run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    /// Data points seen in provider responses
    pub processed: usize,
    /// Data points upserted
    pub saved: usize,
    /// Zero-metric data points dropped by the skip policy
    pub skipped: usize,
    /// Chunks that failed entirely (request or persistence error)
    pub errored_chunks: usize,
}

/// The template analytics ingestion job.
pub struct AnalyticsIngestor {
    transport: Arc<dyn Transport>,
    repository: Arc<dyn AnalyticsRepository>,
    config: GatewayConfig,
    chunk_pause: Duration,
}

impl AnalyticsIngestor {
    /// Create an ingestor over a transport and an analytics repository.
    #[must_use]
    pub fn new(
        transport: Arc<dyn Transport>,
        repository: Arc<dyn AnalyticsRepository>,
        config: GatewayConfig,
    ) -> Self {
        Self {
            transport,
            repository,
            config,
            chunk_pause: CHUNK_PAUSE,
        }
    }

    /// Override the inter-chunk pause (tests use zero).
    #[must_use]
    pub fn with_chunk_pause(mut self, pause: Duration) -> Self {
        self.chunk_pause = pause;
        self
    }

    /// Ingest metrics for the given templates over `[start, end)`.
    #[instrument(skip(self, template_ids), fields(templates = template_ids.len()))]
    pub async fn run(
        &self,
        template_ids: &[String],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<IngestReport> {
        validate_window(start, end)?;

        let mut report = IngestReport::default();
        let chunks: Vec<&[String]> = template_ids.chunks(TEMPLATE_CHUNK_SIZE).collect();

        for (index, chunk) in chunks.iter().enumerate() {
            if index > 0 && !self.chunk_pause.is_zero() {
                tokio::time::sleep(self.chunk_pause).await;
            }

            match self.ingest_chunk(chunk, start, end, &mut report).await {
                Ok(()) => {}
                Err(e) => {
                    // One bad chunk must not abort the run.
                    error!(chunk = index, error = %e, "analytics chunk failed");
                    report.errored_chunks += 1;
                }
            }
        }

        info!(
            processed = report.processed,
            saved = report.saved,
            skipped = report.skipped,
            errored_chunks = report.errored_chunks,
            "analytics ingestion finished"
        );
        Ok(report)
    }

    async fn ingest_chunk(
        &self,
        template_ids: &[String],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        report: &mut IngestReport,
    ) -> Result<()> {
        let path = Endpoint::TemplateAnalytics
            .render(&[("phone_number_id", &self.config.phone_number_id)])?;

        let query = vec![
            // Epoch seconds, UTC. No local timezone conversion — converting
            // would shift the provider's day boundaries.
            ("start".to_string(), start.timestamp().to_string()),
            ("end".to_string(), end.timestamp().to_string()),
            ("granularity".to_string(), "DAILY".to_string()),
            ("metric_types".to_string(), METRIC_TYPES.to_string()),
            (
                "template_ids".to_string(),
                serde_json::to_string(template_ids)
                    .map_err(|e| Error::InvalidApiResponse(e.to_string()))?,
            ),
            ("limit".to_string(), "100".to_string()),
        ];

        let response = self
            .transport
            .request_json(HttpMethod::Get, &path, &query, None)
            .await?;

        let Some(series) = response["data"].as_array() else {
            return Err(Error::InvalidApiResponse(
                "analytics response has no data array".into(),
            ));
        };

        for entry in series {
            let Some(points) = entry["data_points"].as_array() else {
                continue;
            };
            for point in points {
                report.processed += 1;
                self.persist_point(point, report).await?;
            }
        }
        Ok(())
    }

    async fn persist_point(&self, raw: &Value, report: &mut IngestReport) -> Result<()> {
        let point = AnalyticsPoint {
            template_id: raw["template_id"]
                .as_str()
                .map(ToString::to_string)
                .unwrap_or_else(|| raw["template_id"].as_i64().unwrap_or(0).to_string()),
            start: raw["start"].as_i64().unwrap_or(0),
            end: raw["end"].as_i64().unwrap_or(0),
            sent: raw["sent"].as_i64().unwrap_or(0),
            delivered: raw["delivered"].as_i64().unwrap_or(0),
            read: raw["read"].as_i64().unwrap_or(0),
        };

        // Skip policy: all-zero data points carry no signal and are never
        // persisted.
        if point.is_empty() {
            report.skipped += 1;
            return Ok(());
        }

        let data_point_id = self.repository.upsert_data_point(&point).await?;

        if let Some(clicks) = raw["clicked"].as_array() {
            for click in clicks {
                let count = click["count"].as_i64().unwrap_or(0);
                if count == 0 {
                    continue;
                }
                let breakdown = ClickBreakdown {
                    click_type: click["type"].as_str().unwrap_or("unknown").to_string(),
                    button_content: click["button_content"]
                        .as_str()
                        .map(ToString::to_string),
                    count,
                };
                self.repository
                    .upsert_click(data_point_id, &breakdown)
                    .await?;
            }
        }

        if let Some(costs) = raw["cost"].as_array() {
            for cost in costs {
                let value = cost["value"].as_f64().unwrap_or(0.0);
                if value == 0.0 {
                    continue;
                }
                let breakdown = CostBreakdown {
                    cost_type: cost["type"].as_str().unwrap_or("unknown").to_string(),
                    value,
                    currency: cost["currency"]
                        .as_str()
                        .unwrap_or(&self.config.default_currency)
                        .to_string(),
                };
                self.repository
                    .upsert_cost(data_point_id, &breakdown)
                    .await?;
            }
        }

        report.saved += 1;
        Ok(())
    }
}

/// Window validation: start before end, width at most 90 days.
fn validate_window(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<()> {
    if end <= start {
        return Err(Error::InvalidConfig {
            field: "analytics_window".into(),
            message: "end must be after start".into(),
        });
    }
    let days = (end - start).num_days();
    if days > MAX_WINDOW_DAYS {
        return Err(Error::InvalidConfig {
            field: "analytics_window".into(),
            message: format!("window of {days} days exceeds the {MAX_WINDOW_DAYS}-day limit"),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;
    use chrono::TimeZone;
    use iris_store::SqliteStore;
    use serde_json::json;

    fn config() -> GatewayConfig {
        GatewayConfig::new("token", "123456")
    }

    fn window() -> (DateTime<Utc>, DateTime<Utc>) {
        (
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 8, 0, 0, 0).unwrap(),
        )
    }

    fn sample_response() -> Value {
        json!({
            "data": [{
                "granularity": "DAILY",
                "data_points": [
                    {
                        "template_id": "tpl_1",
                        "start": 1704067200,
                        "end": 1704153600,
                        "sent": 120,
                        "delivered": 118,
                        "read": 60,
                        "clicked": [
                            {"type": "quick_reply_button", "button_content": "Yes", "count": 12},
                            {"type": "quick_reply_button", "button_content": "No", "count": 0}
                        ],
                        "cost": [
                            {"type": "marketing", "value": 1.25},
                            {"type": "utility", "value": 0.0}
                        ]
                    },
                    {
                        "template_id": "tpl_2",
                        "start": 1704067200,
                        "end": 1704153600,
                        "sent": 0,
                        "delivered": 0,
                        "read": 0
                    }
                ]
            }]
        })
    }

    async fn ingestor_with(
        transport: MockTransport,
    ) -> (AnalyticsIngestor, Arc<SqliteStore>) {
        let store = Arc::new(SqliteStore::in_memory().await.unwrap());
        let ingestor = AnalyticsIngestor::new(Arc::new(transport), store.clone(), config())
            .with_chunk_pause(Duration::ZERO);
        (ingestor, store)
    }

    #[tokio::test]
    async fn test_zero_metric_points_are_skipped() {
        let mut transport = MockTransport::new();
        transport
            .expect_request_json()
            .times(1)
            .returning(|_, _, _, _| Ok(sample_response()));

        let (ingestor, store) = ingestor_with(transport).await;
        let (start, end) = window();
        let report = ingestor
            .run(&["tpl_1".into(), "tpl_2".into()], start, end)
            .await
            .unwrap();

        assert_eq!(report.processed, 2);
        assert_eq!(report.saved, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.errored_chunks, 0);

        // The all-zero point was never persisted.
        assert!(store
            .find_data_point("tpl_2", 1_704_067_200, 1_704_153_600)
            .await
            .unwrap()
            .is_none());

        let saved = store
            .find_data_point("tpl_1", 1_704_067_200, 1_704_153_600)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(saved.sent, 120);
        assert_eq!(saved.read, 60);
    }

    #[tokio::test]
    async fn test_rerun_is_idempotent() {
        let mut transport = MockTransport::new();
        transport
            .expect_request_json()
            .times(2)
            .returning(|_, _, _, _| Ok(sample_response()));

        let (ingestor, store) = ingestor_with(transport).await;
        let (start, end) = window();
        let ids = vec!["tpl_1".to_string(), "tpl_2".to_string()];

        ingestor.run(&ids, start, end).await.unwrap();
        ingestor.run(&ids, start, end).await.unwrap();

        let saved = store
            .find_data_point("tpl_1", 1_704_067_200, 1_704_153_600)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(saved.sent, 120);
        assert_eq!(saved.delivered, 118);
        assert_eq!(saved.read, 60);
    }

    #[tokio::test]
    async fn test_chunking_and_failure_isolation() {
        // 12 templates → two chunks. First chunk fails; the run continues.
        let ids: Vec<String> = (0..12).map(|i| format!("tpl_{i}")).collect();

        let mut transport = MockTransport::new();
        let mut call = 0u32;
        transport
            .expect_request_json()
            .times(2)
            .returning(move |_, _, query, _| {
                call += 1;
                if call == 1 {
                    // First chunk carries ten ids.
                    let ids_param = query
                        .iter()
                        .find(|(k, _)| k == "template_ids")
                        .map(|(_, v)| v.clone())
                        .unwrap_or_default();
                    let parsed: Vec<String> = serde_json::from_str(&ids_param).unwrap();
                    assert_eq!(parsed.len(), TEMPLATE_CHUNK_SIZE);
                    Err(Error::Api {
                        status: 500,
                        code: 1,
                        message: "internal".into(),
                        details: Value::Null,
                    })
                } else {
                    Ok(sample_response())
                }
            });

        let (ingestor, _store) = ingestor_with(transport).await;
        let (start, end) = window();
        let report = ingestor.run(&ids, start, end).await.unwrap();

        assert_eq!(report.errored_chunks, 1);
        assert_eq!(report.saved, 1);
        assert_eq!(report.skipped, 1);
    }

    #[tokio::test]
    async fn test_window_wider_than_ninety_days_is_rejected() {
        let mut transport = MockTransport::new();
        transport.expect_request_json().times(0);

        let (ingestor, _store) = ingestor_with(transport).await;
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let err = ingestor
            .run(&["tpl_1".into()], start, end)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidConfig { .. }));

        let err = ingestor
            .run(&["tpl_1".into()], end, start)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidConfig { .. }));
    }

    #[tokio::test]
    async fn test_query_parameters_are_epoch_seconds_daily() {
        let mut transport = MockTransport::new();
        transport
            .expect_request_json()
            .withf(|method, path, query, _| {
                *method == HttpMethod::Get
                    && path == "123456/template_analytics"
                    && query.iter().any(|(k, v)| k == "start" && v == "1704067200")
                    && query.iter().any(|(k, v)| k == "granularity" && v == "DAILY")
                    && query.iter().any(|(k, _)| k == "metric_types")
            })
            .times(1)
            .returning(|_, _, _, _| Ok(json!({ "data": [] })));

        let (ingestor, _store) = ingestor_with(transport).await;
        let (start, end) = window();
        let report = ingestor.run(&["tpl_1".into()], start, end).await.unwrap();
        assert_eq!(report, IngestReport::default());
    }
}
