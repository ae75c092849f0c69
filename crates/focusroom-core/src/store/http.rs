//! HTTP session store.
//!
//! REST endpoints, relative to the configured base URL:
//!
//! | Operation | Request |
//! |---|---|
//! | create | `POST sessions` |
//! | list active | `GET sessions?status=active&limit=N` |
//! | complete | `POST sessions/{id}/complete` |
//! | abandon | `POST sessions/{id}/abandon` |
//! | profile | `GET profile` |

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use url::Url;

use super::{CompletionReceipt, Profile, SessionStore};
use crate::error::StoreError;
use crate::storage::RemoteConfig;
use crate::timer::{NewSession, Session};

pub struct HttpSessionStore {
    base_url: Url,
    token: Option<String>,
    http_client: Client,
}

impl HttpSessionStore {
    /// Build a client for `base_url` with the given per-request timeout.
    pub fn new(base_url: Url, token: Option<String>, timeout: Duration) -> Result<Self, StoreError> {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(StoreError::from)?;
        Ok(Self {
            base_url,
            token,
            http_client,
        })
    }

    pub fn from_config(config: &RemoteConfig) -> Result<Self, StoreError> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| StoreError::Validation(format!("invalid base url '{}': {e}", config.base_url)))?;
        Self::new(
            base_url,
            config.token.clone(),
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, StoreError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| StoreError::Validation(format!("base url cannot hold a path: {}", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder, subject: &str) -> Result<Response, StoreError> {
        let resp = self.authorize(request).send().await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        tracing::debug!(%status, subject, "session store request failed");
        Err(classify(status, subject, body))
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        subject: &str,
    ) -> Result<T, StoreError> {
        let resp = self.send(request, subject).await?;
        Ok(resp.json::<T>().await?)
    }
}

fn classify(status: StatusCode, subject: &str, body: String) -> StoreError {
    let detail = if body.trim().is_empty() {
        status.to_string()
    } else {
        body
    };
    match status {
        StatusCode::NOT_FOUND => StoreError::NotFound(subject.to_string()),
        StatusCode::CONFLICT => StoreError::Conflict(detail),
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => StoreError::Timeout,
        StatusCode::TOO_MANY_REQUESTS => StoreError::Network(detail),
        s if s.is_client_error() => StoreError::Validation(detail),
        _ => StoreError::Network(format!("server returned {status}")),
    }
}

#[async_trait]
impl SessionStore for HttpSessionStore {
    async fn create_session(&self, request: &NewSession) -> Result<Session, StoreError> {
        let url = self.endpoint(&["sessions"])?;
        self.send_json(self.http_client.post(url).json(request), "sessions")
            .await
    }

    async fn list_active_sessions(&self, limit: usize) -> Result<Vec<Session>, StoreError> {
        let mut url = self.endpoint(&["sessions"])?;
        url.query_pairs_mut()
            .append_pair("status", "active")
            .append_pair("limit", &limit.to_string());
        let mut sessions: Vec<Session> = self
            .send_json(self.http_client.get(url), "sessions")
            .await?;
        sessions.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        sessions.truncate(limit);
        Ok(sessions)
    }

    async fn complete_session(&self, session_id: &str) -> Result<CompletionReceipt, StoreError> {
        let url = self.endpoint(&["sessions", session_id, "complete"])?;
        let resp = self.send(self.http_client.post(url), session_id).await?;
        // Some deployments answer 204 with no body.
        let bytes = resp.bytes().await?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(CompletionReceipt::default());
        }
        serde_json::from_slice(&bytes)
            .map_err(|e| StoreError::Validation(format!("malformed completion response: {e}")))
    }

    async fn abandon_session(&self, session_id: &str) -> Result<(), StoreError> {
        let url = self.endpoint(&["sessions", session_id, "abandon"])?;
        self.send(self.http_client.post(url), session_id).await?;
        Ok(())
    }

    async fn fetch_profile(&self) -> Result<Profile, StoreError> {
        let url = self.endpoint(&["profile"])?;
        self.send_json(self.http_client.get(url), "profile").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(base: &str) -> HttpSessionStore {
        HttpSessionStore::new(Url::parse(base).unwrap(), None, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn endpoint_handles_trailing_slash() {
        let a = store("https://api.example.com/v1/").endpoint(&["sessions"]).unwrap();
        let b = store("https://api.example.com/v1").endpoint(&["sessions"]).unwrap();
        assert_eq!(a.as_str(), "https://api.example.com/v1/sessions");
        assert_eq!(a, b);
    }

    #[test]
    fn endpoint_escapes_session_ids() {
        let url = store("https://api.example.com/")
            .endpoint(&["sessions", "a/b", "abandon"])
            .unwrap();
        assert_eq!(url.as_str(), "https://api.example.com/sessions/a%2Fb/abandon");
    }

    #[test]
    fn status_classification() {
        assert_eq!(
            classify(StatusCode::NOT_FOUND, "s-1", String::new()),
            StoreError::NotFound("s-1".into())
        );
        assert!(matches!(
            classify(StatusCode::UNPROCESSABLE_ENTITY, "sessions", "bad duration".into()),
            StoreError::Validation(msg) if msg == "bad duration"
        ));
        assert_eq!(
            classify(StatusCode::GATEWAY_TIMEOUT, "profile", String::new()),
            StoreError::Timeout
        );
        assert!(matches!(
            classify(StatusCode::BAD_GATEWAY, "profile", String::new()),
            StoreError::Network(_)
        ));
    }
}
