//! Typed Rust client for the Fly.io Machines API.
//!
//! Covers the subset needed for managing provisioned machines:
//! machines (create, get, list, delete) and platform region discovery.

mod types;

pub use types::*;

pub const DEFAULT_BASE_URL: &str = "https://api.machines.dev/v1";

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("fly api request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error(
        "fly api {endpoint} returned HTTP {} - {}: {body}",
        .status.as_u16(),
        .status.canonical_reason().unwrap_or("Unknown")
    )]
    Api {
        endpoint: &'static str,
        status: reqwest::StatusCode,
        body: String,
    },
}

impl Error {
    /// HTTP status of a non-success response, `None` for transport failures.
    pub fn status(&self) -> Option<reqwest::StatusCode> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::Request(e) => e.status(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Api { status, .. } if *status == reqwest::StatusCode::NOT_FOUND)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Client for the Fly.io Machines REST API.
#[derive(Clone)]
pub struct FlyClient {
    token: String,
    app: String,
    base_url: String,
    http: reqwest::Client,
}

impl FlyClient {
    pub fn new(token: impl Into<String>, app: impl Into<String>) -> Self {
        Self::with_base_url(token, app, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(
        token: impl Into<String>,
        app: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            token: token.into(),
            app: app.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/apps/{}{path}", self.base_url, self.app)
    }

    fn platform_url(&self, path: &str) -> String {
        format!("{}/platform{path}", self.base_url)
    }

    fn auth(&self) -> String {
        format!("Bearer {}", self.token)
    }

    async fn check(resp: reqwest::Response, endpoint: &'static str) -> Result<reqwest::Response> {
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Api { endpoint, status, body });
        }
        Ok(resp)
    }

    // ── Machines ─────────────────────────────────────────────────────

    pub async fn create_machine(&self, req: &CreateMachineRequest) -> Result<Machine> {
        let resp = self
            .http
            .post(self.url("/machines"))
            .header("Authorization", self.auth())
            .header("Accept", "application/json")
            .json(req)
            .send()
            .await?;

        Self::check(resp, "create machine")
            .await?
            .json()
            .await
            .map_err(Error::from)
    }

    /// Fetch live machine state. A 404 is reported as `Ok(None)`.
    pub async fn get_machine(&self, machine_id: &str) -> Result<Option<Machine>> {
        let resp = self
            .http
            .get(self.url(&format!("/machines/{machine_id}")))
            .header("Authorization", self.auth())
            .header("Accept", "application/json")
            .send()
            .await?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }

        Self::check(resp, "get machine")
            .await?
            .json()
            .await
            .map(Some)
            .map_err(Error::from)
    }

    pub async fn list_machines(&self) -> Result<Vec<Machine>> {
        let resp = self
            .http
            .get(self.url("/machines"))
            .header("Authorization", self.auth())
            .header("Accept", "application/json")
            .send()
            .await?;

        Self::check(resp, "list machines")
            .await?
            .json()
            .await
            .map_err(Error::from)
    }

    pub async fn delete_machine(&self, machine_id: &str, force: bool) -> Result<()> {
        let resp = self
            .http
            .delete(self.url(&format!("/machines/{machine_id}")))
            .header("Authorization", self.auth())
            .header("Accept", "application/json")
            .query(&[("force", force)])
            .send()
            .await?;

        Self::check(resp, "delete machine").await?;
        Ok(())
    }

    // ── Platform ─────────────────────────────────────────────────────

    pub async fn list_regions(&self) -> Result<Vec<Region>> {
        let resp = self
            .http
            .get(self.platform_url("/regions"))
            .header("Authorization", self.auth())
            .header("Accept", "application/json")
            .send()
            .await?;

        let body: RegionsResponse = Self::check(resp, "list regions").await?.json().await?;
        Ok(body.regions)
    }
}
