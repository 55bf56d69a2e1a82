//! Runner configuration

use std::path::PathBuf;
use std::time::Duration;

use submit_core::{AssemblerOptions, EmptyResponsePolicy, EvaluatorOptions};

use crate::error::RunnerError;

const DEFAULT_API_URL: &str = "http://localhost:8080/fhir";
const DEFAULT_DATABASE_URL: &str = "host=localhost user=postgres dbname=submissions";
const DEFAULT_CATALOG_PATH: &str = "catalog.json";
const DEFAULT_QUESTIONNAIRE_URL: &str = "Questionnaire/assessment";
const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Runner configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub api_url: String,
    pub access_token: Option<String>,
    pub database_url: String,
    pub catalog_path: PathBuf,
    pub fhir_base_url: String,
    pub questionnaire_url: String,
    pub empty_response: EmptyResponsePolicy,
    pub request_timeout: Duration,
    pub metrics_address: Option<String>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, RunnerError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration from any variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, RunnerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let empty_response = match var("EMPTY_RESPONSE_POLICY") {
            None => EmptyResponsePolicy::default(),
            Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
                "pass" => EmptyResponsePolicy::Pass,
                "fail" => EmptyResponsePolicy::Fail,
                other => {
                    return Err(RunnerError::Config(format!(
                        "EMPTY_RESPONSE_POLICY must be 'pass' or 'fail', got '{}'",
                        other
                    )));
                }
            },
        };

        let request_timeout = match var("REQUEST_TIMEOUT_SECS") {
            None => Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            Some(raw) => raw.trim().parse().map(Duration::from_secs).map_err(|_| {
                RunnerError::Config(format!("REQUEST_TIMEOUT_SECS is not a number: '{}'", raw))
            })?,
        };

        Ok(Self {
            api_url: var("SUBMIT_API_URL").unwrap_or_else(|| DEFAULT_API_URL.into()),
            access_token: var("SUBMIT_ACCESS_TOKEN"),
            database_url: var("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.into()),
            catalog_path: var("CATALOG_PATH")
                .unwrap_or_else(|| DEFAULT_CATALOG_PATH.into())
                .into(),
            fhir_base_url: var("FHIR_BASE_URL").unwrap_or_default(),
            questionnaire_url: var("QUESTIONNAIRE_URL")
                .unwrap_or_else(|| DEFAULT_QUESTIONNAIRE_URL.into()),
            empty_response,
            request_timeout,
            metrics_address: var("METRICS_ADDRESS"),
        })
    }

    pub fn assembler_options(&self) -> AssemblerOptions {
        AssemblerOptions {
            base_url: self.fhir_base_url.clone(),
            questionnaire_url: self.questionnaire_url.clone(),
        }
    }

    pub fn evaluator_options(&self) -> EvaluatorOptions {
        EvaluatorOptions {
            empty_response: self.empty_response,
        }
    }
}
