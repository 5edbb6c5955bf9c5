//! Outbound publisher for the resource tree service
//!
//! Trees are upserted with `POST {base}/compositions/{uid}` and dropped with
//! `DELETE {base}/compositions/{uid}`. Anything but a 200 is a failure; callers
//! retry on their next poll.

use crate::error::PublishError;
use async_trait::async_trait;
use std::time::Duration;
use url::Url;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TreePublisher: Send + Sync {
    /// Create or replace the cached tree for a composition
    async fn upsert(&self, composition_uid: &str, tree: &[u8]) -> Result<(), PublishError>;

    /// Drop the cached tree for a composition
    async fn delete(&self, composition_uid: &str) -> Result<(), PublishError>;
}

/// `TreePublisher` speaking HTTP to the resource tree handler
pub struct HttpPublisher {
    client: reqwest::Client,
    base_url: Option<Url>,
}

impl HttpPublisher {
    /// Create a publisher for `base_url`; `None` leaves publishing unconfigured
    pub fn new(base_url: Option<&str>, timeout: Duration) -> Result<Self, PublishError> {
        let base_url = match base_url.map(str::trim).filter(|s| !s.is_empty()) {
            Some(raw) => Some(Url::parse(raw).map_err(|e| PublishError::InvalidUrl(format!("{raw}: {e}")))?),
            None => None,
        };

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PublishError::Transport {
                method: "INIT",
                url: String::new(),
                message: e.to_string(),
            })?;

        if base_url.is_none() {
            tracing::warn!("No resource tree handler URL configured; publishing will fail");
        }

        Ok(Self { client, base_url })
    }

    /// Full URL for a composition's cache entry
    pub fn composition_url(&self, composition_uid: &str) -> Result<Url, PublishError> {
        let base = self.base_url.as_ref().ok_or(PublishError::NotConfigured)?;
        composition_url(base, composition_uid)
    }

    async fn send(
        &self,
        method: &'static str,
        request: reqwest::RequestBuilder,
        url: &Url,
    ) -> Result<(), PublishError> {
        let resp = request.send().await.map_err(|e| PublishError::Transport {
            method,
            url: url.to_string(),
            message: e.to_string(),
        })?;

        if resp.status() != reqwest::StatusCode::OK {
            return Err(PublishError::Status {
                method,
                url: url.to_string(),
                status: resp.status().as_u16(),
            });
        }

        Ok(())
    }
}

fn composition_url(base: &Url, composition_uid: &str) -> Result<Url, PublishError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| PublishError::InvalidUrl(format!("{base} cannot be a base URL")))?
        .pop_if_empty()
        .push("compositions")
        .push(composition_uid);
    Ok(url)
}

#[async_trait]
impl TreePublisher for HttpPublisher {
    async fn upsert(&self, composition_uid: &str, tree: &[u8]) -> Result<(), PublishError> {
        let url = self.composition_url(composition_uid)?;
        tracing::debug!("POST {} ({} bytes)", url, tree.len());

        let request = self
            .client
            .post(url.clone())
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(tree.to_vec());
        self.send("POST", request, &url).await
    }

    async fn delete(&self, composition_uid: &str) -> Result<(), PublishError> {
        let url = self.composition_url(composition_uid)?;
        tracing::debug!("DELETE {}", url);

        let request = self.client.delete(url.clone());
        self.send("DELETE", request, &url).await
    }
}
