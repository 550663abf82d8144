//! HTTP client for a Prometheus-compatible metrics service

use chrono::{DateTime, Utc};
use reqwest::{Client, Response};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::{GatewayError, GatewayResult, MetricKind, MetricWindow};

#[derive(Debug, Clone)]
pub struct PrometheusClient {
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    status: String,
    #[serde(default)]
    data: Option<QueryData>,
    #[serde(default, rename = "errorType")]
    error_type: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QueryData {
    #[serde(rename = "resultType")]
    result_type: String,
    #[serde(default)]
    result: Vec<RangeSeries>,
}

#[derive(Debug, Deserialize)]
struct RangeSeries {
    #[serde(default)]
    values: Vec<(f64, String)>,
}

impl PrometheusClient {
    pub fn new(base_url: String, http_timeout: Duration) -> GatewayResult<Self> {
        let client = Client::builder()
            .timeout(http_timeout)
            .user_agent(format!("heartbeat-api/{}", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Utilisation series for one service, as a percentage of its limits
    pub async fn utilization(
        &self,
        namespace: &str,
        service: &str,
        metric: MetricKind,
        window: MetricWindow,
    ) -> GatewayResult<Vec<f64>> {
        let query = utilization_query(namespace, service, metric, window.period);
        let end = Utc::now();
        let start = end - chrono::Duration::from_std(window.lookback).unwrap_or_else(|_| chrono::Duration::zero());

        self.query_range(&query, start, end, window.period).await
    }

    /// Run a range query and return the first series, oldest sample first
    pub async fn query_range(
        &self,
        query: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        step: Duration,
    ) -> GatewayResult<Vec<f64>> {
        let url = format!("{}/api/v1/query_range", self.base_url);
        debug!("Querying {} for {}", url, query);

        let response = self
            .client
            .get(&url)
            .query(&[
                ("query", query.to_string()),
                ("start", start.timestamp().to_string()),
                ("end", end.timestamp().to_string()),
                ("step", step.as_secs().to_string()),
            ])
            .send()
            .await?;

        let body = self.handle_response(response).await?;
        parse_range_response(body)
    }

    async fn handle_response(&self, response: Response) -> GatewayResult<QueryResponse> {
        let status = response.status();

        // The API reports query errors as JSON bodies on 4xx as well.
        if status.is_success() || status.as_u16() == 400 || status.as_u16() == 422 {
            return Ok(response.json().await?);
        }

        let error_body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());

        Err(GatewayError::Metrics(match status.as_u16() {
            401 | 403 => format!("metrics service rejected credentials: {}", error_body),
            429 => format!("metrics service rate limited: {}", error_body),
            503 => format!("metrics service unavailable: {}", error_body),
            _ => format!("unexpected response {}: {}", status, error_body),
        }))
    }
}

fn parse_range_response(body: QueryResponse) -> GatewayResult<Vec<f64>> {
    if body.status != "success" {
        return Err(GatewayError::Metrics(format!(
            "{}: {}",
            body.error_type.unwrap_or_else(|| "error".to_string()),
            body.error.unwrap_or_default()
        )));
    }

    let Some(data) = body.data else {
        return Ok(Vec::new());
    };

    if data.result_type != "matrix" {
        return Err(GatewayError::Metrics(format!(
            "expected a matrix result, got {}",
            data.result_type
        )));
    }

    let mut samples: Vec<(f64, f64)> = data
        .result
        .into_iter()
        .next()
        .map(|series| {
            series
                .values
                .into_iter()
                .filter_map(|(ts, value)| value.parse::<f64>().ok().map(|v| (ts, v)))
                .filter(|(_, v)| v.is_finite())
                .collect()
        })
        .unwrap_or_default();

    samples.sort_by(|a, b| a.0.total_cmp(&b.0));
    Ok(samples.into_iter().map(|(_, v)| v).collect())
}

/// PromQL for the per-period maximum utilisation of a Deployment's pods
pub fn utilization_query(namespace: &str, service: &str, metric: MetricKind, period: Duration) -> String {
    let selector = format!(
        r#"namespace="{}",pod=~"{}-[a-z0-9]+-[a-z0-9]+""#,
        escape_label(namespace),
        escape_label(service)
    );

    let ratio = match metric {
        MetricKind::Cpu => format!(
            r#"100 * sum(rate(container_cpu_usage_seconds_total{{{sel},container!=""}}[5m])) / sum(kube_pod_container_resource_limits{{{sel},resource="cpu"}})"#,
            sel = selector
        ),
        MetricKind::Memory => format!(
            r#"100 * sum(container_memory_working_set_bytes{{{sel},container!=""}}) / sum(kube_pod_container_resource_limits{{{sel},resource="memory"}})"#,
            sel = selector
        ),
    };

    format!("max_over_time(({})[{}s:1m])", ratio, period.as_secs())
}

fn escape_label(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
