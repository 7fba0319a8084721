use std::{collections::HashMap, time::Duration};

use async_trait::async_trait;
use futures::future::join_all;
use reqwest::{header, Client};
use shared::{
    domain::SurveyDescriptor,
    protocol::{SessionPayload, SubmitAck},
};
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_millis(5000);
pub const DEFAULT_UPLOAD_TIMEOUT: Duration = Duration::from_millis(30_000);
const PING_PATH: &str = "ping";
const STATIC_PATH: &str = "static";

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,
    #[error("server answered with status {0}")]
    Status(u16),
    #[error("batch could not be encoded: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error(transparent)]
    Request(reqwest::Error),
}

impl From<reqwest::Error> for TransportError {
    fn from(value: reqwest::Error) -> Self {
        if value.is_timeout() {
            Self::Timeout
        } else if let Some(status) = value.status() {
            Self::Status(status.as_u16())
        } else {
            Self::Request(value)
        }
    }
}

/// Lightweight reachability check of the survey server.
#[async_trait]
pub trait LivenessProbe: Send + Sync {
    async fn ping(&self) -> Result<(), TransportError>;
}

/// Delivers a batch of finished sessions in one request.
#[async_trait]
pub trait BatchUploader: Send + Sync {
    async fn upload(&self, batch: &[SessionPayload]) -> Result<SubmitAck, TransportError>;
}

/// Where the page list and its assets come from.
#[async_trait]
pub trait SurveySource: Send + Sync {
    async fn fetch_survey(&self) -> Result<SurveyDescriptor, TransportError>;
    async fn fetch_asset(&self, name: &str) -> Result<Vec<u8>, TransportError>;
}

/// HTTP implementation of every network contract the survey client relies on.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: Client,
    base_url: Url,
    survey_url: Url,
    probe_timeout: Duration,
    upload_timeout: Duration,
}

impl HttpTransport {
    /// `base_url` is the application root; the survey lives at `{base}/book/{survey}`.
    pub fn new(base_url: &str, survey: &str) -> Result<Self, TransportError> {
        let base_url = Url::parse(&with_trailing_slash(base_url))?;
        let survey_url = base_url.join(&format!("book/{survey}"))?;
        Ok(Self {
            http: Client::new(),
            base_url,
            survey_url,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            upload_timeout: DEFAULT_UPLOAD_TIMEOUT,
        })
    }

    /// Derives the application root from a survey page address: everything in
    /// front of `/book` (or `/admin`) is the base path.
    pub fn from_survey_url(survey_url: &str) -> Result<Self, TransportError> {
        let survey_url = Url::parse(survey_url.trim_end_matches('/'))?;
        let path = survey_url.path();
        let end = path
            .find("/book")
            .or_else(|| path.find("/admin"))
            .unwrap_or(path.len());
        let mut base_url = survey_url.clone();
        base_url.set_path(&with_trailing_slash(&path[..end]));
        base_url.set_query(None);
        Ok(Self {
            http: Client::new(),
            base_url,
            survey_url,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            upload_timeout: DEFAULT_UPLOAD_TIMEOUT,
        })
    }

    pub fn with_probe_timeout(mut self, probe_timeout: Duration) -> Self {
        self.probe_timeout = probe_timeout;
        self
    }

    /// An upload without an answer in time fails with [`TransportError::Timeout`].
    pub fn with_upload_timeout(mut self, upload_timeout: Duration) -> Self {
        self.upload_timeout = upload_timeout;
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn survey_url(&self) -> &Url {
        &self.survey_url
    }

    fn submit_url(&self) -> String {
        format!("{}/submit", self.survey_url.as_str().trim_end_matches('/'))
    }

    /// Fetches every asset of the survey concurrently, keyed by name.
    pub async fn preload_assets(
        &self,
        descriptor: &SurveyDescriptor,
    ) -> Result<HashMap<String, Vec<u8>>, TransportError> {
        let names = descriptor.asset_names();
        let fetched = join_all(names.iter().map(|name| self.fetch_asset(name))).await;
        let mut assets = HashMap::with_capacity(names.len());
        for (name, result) in names.into_iter().zip(fetched) {
            match result {
                Ok(bytes) => {
                    assets.insert(name, bytes);
                }
                Err(error) => {
                    warn!(asset = %name, %error, "transport: asset failed to load");
                    return Err(error);
                }
            }
        }
        info!(count = assets.len(), "transport: all assets ready");
        Ok(assets)
    }
}

#[async_trait]
impl LivenessProbe for HttpTransport {
    async fn ping(&self) -> Result<(), TransportError> {
        let url = self.base_url.join(PING_PATH)?;
        self.http
            .head(url)
            .timeout(self.probe_timeout)
            .send()
            .await?
            .error_for_status()?;
        debug!("transport: heartbeat");
        Ok(())
    }
}

#[async_trait]
impl BatchUploader for HttpTransport {
    async fn upload(&self, batch: &[SessionPayload]) -> Result<SubmitAck, TransportError> {
        let body = serde_json::to_vec(batch)?;
        let response = self
            .http
            .post(self.submit_url())
            .timeout(self.upload_timeout)
            .header(header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?
            .error_for_status()?;
        let text = response.text().await?;
        Ok(SubmitAck::from_body(&text))
    }
}

#[async_trait]
impl SurveySource for HttpTransport {
    async fn fetch_survey(&self) -> Result<SurveyDescriptor, TransportError> {
        let descriptor = self
            .http
            .get(self.survey_url.clone())
            .header(header::ACCEPT, "application/json")
            .send()
            .await?
            .error_for_status()?
            .json::<SurveyDescriptor>()
            .await?;
        info!(pages = descriptor.pages.len(), "transport: survey loaded");
        Ok(descriptor)
    }

    async fn fetch_asset(&self, name: &str) -> Result<Vec<u8>, TransportError> {
        let url = self.base_url.join(&format!("{STATIC_PATH}/{name}"))?;
        let bytes = self
            .http
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        Ok(bytes.to_vec())
    }
}

fn with_trailing_slash(path: &str) -> String {
    if path.ends_with('/') {
        path.to_string()
    } else {
        format!("{path}/")
    }
}

#[cfg(test)]
#[path = "tests/transport_tests.rs"]
mod tests;
