//! External verification service boundary.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Clone, Deserialize)]
pub struct LookupOutcome {
    pub valid: bool,
    #[serde(default)]
    pub data: Map<String, Value>,
}

/// Looks an identifier up in an external registry (e.g. a municipal census
/// service) and returns whether it is valid plus any extra attributes.
#[async_trait]
pub trait ExternalLookup: Send + Sync {
    async fn lookup(&self, identifier: &str) -> Result<LookupOutcome, anyhow::Error>;
}

/// JSON-over-HTTP lookup client.
pub struct HttpLookup {
    client: reqwest::Client,
    base_url: String,
    user: String,
    password: String,
}

impl HttpLookup {
    pub fn new(
        base_url: String,
        user: String,
        password: String,
        timeout: Duration,
    ) -> Result<Self, anyhow::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url,
            user,
            password,
        })
    }
}

#[async_trait]
impl ExternalLookup for HttpLookup {
    async fn lookup(&self, identifier: &str) -> Result<LookupOutcome, anyhow::Error> {
        let url = format!("{}/lookup", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .basic_auth(&self.user, Some(&self.password))
            .json(&serde_json::json!({ "identifier": identifier }))
            .send()
            .await?
            .error_for_status()?;

        Ok(response.json::<LookupOutcome>().await?)
    }
}
