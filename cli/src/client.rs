use async_trait::async_trait;
use observer_core::config::BackendConfig;
use observer_core::{
    AnalysisError, Anomaly, FetchError, LogEntry, MetricSample, MonitoringMode, RawTrace,
    RcaResult, ServiceScope, TelemetryBackend, TraceContext,
};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;

/// REST side of the telemetry backend.
#[derive(Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(config: &BackendConfig) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        if let Some(key) = config.resolved_api_key() {
            let value = HeaderValue::from_str(&format!("Bearer {}", key))
                .map_err(|_| anyhow::anyhow!("API key contains invalid header characters"))?;
            headers.insert(AUTHORIZATION, value);
        }

        let client = Client::builder()
            .timeout(config.request_timeout())
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        url: String,
        request: RequestBuilder,
    ) -> Result<T, FetchError> {
        tracing::debug!(url = %url, "backend request");

        let response = request.send().await.map_err(|e| FetchError::Request {
            url: url.clone(),
            message: e.to_string(),
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url,
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await.map_err(|e| FetchError::Request {
            url: url.clone(),
            message: e.to_string(),
        })?;

        serde_json::from_slice(&body).map_err(|e| FetchError::Decode {
            url,
            message: e.to_string(),
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, url: String) -> Result<T, FetchError> {
        let request = self.client.get(&url);
        self.send_json(url, request).await
    }
}

#[async_trait]
impl TelemetryBackend for HttpBackend {
    async fn fetch_alerts(&self) -> Result<Vec<Anomaly>, FetchError> {
        self.get_json(self.url("/api/alerts")).await
    }

    async fn fetch_metrics(
        &self,
        scope: &ServiceScope,
        mode: MonitoringMode,
    ) -> Result<Vec<MetricSample>, FetchError> {
        let url = self.url(&format!(
            "/api/metrics/{}/{}",
            urlencoding::encode(scope.path_segment()),
            mode.metric_type()
        ));
        self.get_json(url).await
    }

    async fn fetch_trace(&self, trace_id: &str) -> Result<RawTrace, FetchError> {
        let url = self.url(&format!("/api/traces/{}", urlencoding::encode(trace_id)));
        self.get_json(url).await
    }

    async fn fetch_logs(&self, trace_id: &str) -> Result<Vec<LogEntry>, FetchError> {
        let url = self.url(&format!(
            "/api/logs?trace_id={}",
            urlencoding::encode(trace_id)
        ));
        self.get_json(url).await
    }

    async fn request_rca(&self, context: &TraceContext) -> Result<RcaResult, AnalysisError> {
        let url = self.url(&format!(
            "/api/rca/{}",
            urlencoding::encode(&context.trace_id)
        ));
        let request = self.client.post(&url).json(context);
        match self.send_json(url, request).await {
            Ok(result) => Ok(result),
            // answered, but not with an analysis
            Err(FetchError::Decode { message, .. }) => Err(AnalysisError::Rejected(message)),
            Err(err) => Err(AnalysisError::Unavailable(err)),
        }
    }
}
