//! Submission transport
//!
//! The submitter hands a serialized bundle to the regulatory API and returns
//! the raw response text. Non-2xx responses are not errors here: their body
//! carries the OperationOutcome the evaluator and reconciler need.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::RunnerError;

pub const FHIR_XML: &str = "application/fhir+xml";

#[async_trait]
pub trait Submitter: Send + Sync {
    /// Submit one transaction bundle, returning the raw response body
    async fn submit(&self, bundle_xml: &str) -> Result<String, RunnerError>;
}

/// Client for the regulatory transaction endpoint
#[derive(Clone)]
pub struct HttpSubmitter {
    http: reqwest::Client,
    url: String,
    access_token: Option<String>,
}

impl HttpSubmitter {
    pub fn new(
        url: impl Into<String>,
        access_token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, RunnerError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            url: url.into(),
            access_token,
        })
    }
}

#[async_trait]
impl Submitter for HttpSubmitter {
    async fn submit(&self, bundle_xml: &str) -> Result<String, RunnerError> {
        let mut request = self
            .http
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, FHIR_XML)
            .header(reqwest::header::ACCEPT, FHIR_XML)
            .body(bundle_xml.to_string());
        if let Some(token) = &self.access_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if status.is_success() {
            tracing::debug!(
                status = %status,
                bytes = body.len(),
                "Submission accepted by transport"
            );
        } else {
            tracing::warn!(
                status = %status,
                bytes = body.len(),
                "Submission endpoint returned non-success status"
            );
        }
        Ok(body)
    }
}
