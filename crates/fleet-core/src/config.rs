use std::env;
use std::time::Duration;

use crate::{Error, Result};

/// Connection settings for the machines API.
#[derive(Debug, Clone)]
pub struct FlyConfig {
    pub api_token: String,
    pub app_name: String,
    pub base_url: String,
    /// Image new machines are expected to run, if the deployment pins one.
    pub image_ref: Option<String>,
}

impl FlyConfig {
    pub fn new(api_token: impl Into<String>, app_name: impl Into<String>) -> Self {
        Self {
            api_token: api_token.into(),
            app_name: app_name.into(),
            base_url: fly_api::DEFAULT_BASE_URL.into(),
            image_ref: None,
        }
    }

    /// Load from `FLY_API_TOKEN`, `FLY_APP_NAME` (both required),
    /// `FLY_API_BASE_URL` and `FLY_IMAGE_REF`.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let api_token =
            env::var("FLY_API_TOKEN").map_err(|_| Error::MissingEnv("FLY_API_TOKEN".into()))?;
        let app_name =
            env::var("FLY_APP_NAME").map_err(|_| Error::MissingEnv("FLY_APP_NAME".into()))?;
        let base_url =
            env::var("FLY_API_BASE_URL").unwrap_or_else(|_| fly_api::DEFAULT_BASE_URL.into());
        let image_ref = env::var("FLY_IMAGE_REF").ok().filter(|s| !s.is_empty());

        Ok(Self {
            api_token,
            app_name,
            base_url,
            image_ref,
        })
    }

    pub fn client(&self) -> fly_api::FlyClient {
        fly_api::FlyClient::with_base_url(&self.api_token, &self.app_name, &self.base_url)
    }
}

/// Retry budget for machine creation. Backoff is fixed, not exponential.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff: Duration::from_secs(1),
        }
    }
}
