//! HTTP data source for the `/api/kline` endpoint.

use std::time::Duration;

use reqwest::Client;

use crate::source::{BarQuery, DataSource, RawRow, SourceError, SourceResponse};

/// Queries a kline server over HTTP.
#[derive(Debug, Clone)]
pub struct HttpSource {
    http: Client,
    base_url: String,
}

impl HttpSource {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, SourceError> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("charter/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SourceError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn endpoint(&self) -> String {
        format!("{}/api/kline", self.base_url)
    }
}

impl DataSource for HttpSource {
    async fn query(&self, query: &BarQuery) -> Result<Vec<RawRow>, SourceError> {
        let url = self.endpoint();
        log::debug!("GET {} {:?}", url, query.query_pairs());

        let response = self
            .http
            .get(&url)
            .query(&query.query_pairs())
            .send()
            .await
            .map_err(|e| SourceError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| SourceError::Transport(e.to_string()))?;

        // The server reports semantic failures as {"error": ...}, sometimes with a 500
        let decoded = serde_json::from_str::<SourceResponse>(&body);
        match decoded {
            Ok(SourceResponse::Error { error }) => Err(SourceError::Semantic(error)),
            Ok(resp) if status.is_success() => resp.into_result(),
            Ok(_) => Err(SourceError::Status(status.as_u16())),
            Err(_) if !status.is_success() => Err(SourceError::Status(status.as_u16())),
            Err(e) => Err(SourceError::Decode(e.to_string())),
        }
    }
}
