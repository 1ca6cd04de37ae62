//! Bundled `http` attacker (§4.10 C10): issues one GET per `Do` against a
//! configured URL. Not part of the core scheduler — a concrete instance of
//! the user-implemented contract, shipped so the binary is runnable without
//! a separate attacker crate.
//!
//! The target URL is read from the handle's free-form `metadata` (§3) under
//! the `url` key, since [`RunnerConfig`] has no dedicated URL field and the
//! factory (called once per handle at construction) is the only place this
//! attacker sees a config.

use std::sync::Arc;

use async_trait::async_trait;
use attackctl::attacker::{Attacker, AttackerFactory, DoResult};
use attackctl::config::RunnerConfig;
use attackctl::runner::Runner;

pub struct HttpAttacker {
    client: reqwest::Client,
    url: Option<String>,
}

impl HttpAttacker {
    #[must_use]
    pub fn new(client: reqwest::Client, url: Option<String>) -> Self {
        Self { client, url }
    }

    /// Builds the `AttackerFactory` registered under the `"http"` label:
    /// reads `metadata["url"]` once per handle, sharing one [`reqwest::Client`]
    /// (and its connection pool) across every worker the handle spawns.
    #[must_use]
    pub fn factory(client: reqwest::Client) -> AttackerFactory {
        Arc::new(move |config: &RunnerConfig, _runner: &Arc<Runner>| -> Box<dyn Attacker> {
            Box::new(Self::new(client.clone(), config.metadata.get("url").cloned()))
        })
    }
}

#[async_trait]
impl Attacker for HttpAttacker {
    async fn do_call(&mut self, _deadline: std::time::Duration) -> DoResult {
        let Some(url) = self.url.as_ref() else {
            return DoResult::failed("http", "handle metadata is missing a \"url\" entry");
        };
        match self.client.get(url).send().await {
            Ok(response) => {
                let status_code = response.status().as_u16();
                let bytes_in = response.content_length().unwrap_or(0);
                DoResult {
                    request_label: url.clone(),
                    error: None,
                    status_code,
                    bytes_in,
                    bytes_out: 0,
                }
            }
            Err(err) => DoResult::failed(url, err.to_string()),
        }
    }

    fn clone_for(&self, _runner: &Arc<Runner>) -> Box<dyn Attacker> {
        Box::new(Self {
            client: self.client.clone(),
            url: self.url.clone(),
        })
    }
}
