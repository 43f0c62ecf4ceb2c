//! HTTP client for a remote knowledge service.
//!
//! Speaks the same result shapes as the local engine ([`SearchResult`],
//! [`DebugReport`], [`KnowledgeStatus`]) so callers can use either one. A
//! query goes to one or the other, never both.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::config::RemoteConfig;
use crate::error::{KnowledgeError, Result};
use crate::knowledge::search::DEFAULT_MIN_SIMILARITY;
use crate::knowledge::{
    DebugQuery, DebugReport, KnowledgeStatus, SearchMode, SearchRequest, SearchResult,
};

#[derive(Serialize)]
struct LoginBody<'a> {
    passphrase: &'a str,
}

#[derive(Deserialize)]
struct LoginResponse {
    #[serde(default)]
    ok: bool,
    #[serde(default)]
    token: String,
}

#[derive(Serialize)]
struct SearchBody<'a> {
    query: &'a str,
    mode: SearchMode,
    domain: &'a str,
    top_k: usize,
    threshold: f32,
}

#[derive(Serialize)]
struct DebugBody<'a> {
    error: &'a str,
    file_path: &'a str,
    domain: &'a str,
}

pub struct RemoteClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl RemoteClient {
    pub fn new(config: &RemoteConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: Some(config.token.clone()).filter(|t| !t.is_empty()),
        })
    }

    /// Reuse a bearer token obtained earlier.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into()).filter(|t: &String| !t.is_empty());
        self
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Log in and keep the returned bearer token. `Ok(false)` when the
    /// service rejects the passphrase.
    pub async fn authenticate(&mut self, passphrase: &str) -> Result<bool> {
        let response: LoginResponse = self.post("/auth/login", &LoginBody { passphrase }).await?;
        if response.ok && !response.token.is_empty() {
            self.token = Some(response.token);
            tracing::info!(base_url = %self.base_url, "authenticated with remote knowledge service");
            Ok(true)
        } else {
            tracing::warn!(base_url = %self.base_url, "remote knowledge service rejected credentials");
            Ok(false)
        }
    }

    /// The request's project scope is decided by the remote service.
    pub async fn search(&self, request: &SearchRequest) -> Result<SearchResult> {
        request.validate()?;
        let body = SearchBody {
            query: &request.query,
            mode: SearchMode::from_chunk_type(request.chunk_type),
            domain: request.domain.map(|d| d.as_str()).unwrap_or(""),
            top_k: request.top_k,
            threshold: request.min_similarity.unwrap_or(0.0),
        };
        self.post("/ml/rag/search", &body).await
    }

    pub async fn debug(&self, query: &DebugQuery) -> Result<DebugReport> {
        if query.error.trim().is_empty() {
            return Err(KnowledgeError::validation("error description must not be empty"));
        }
        let body = DebugBody {
            error: &query.error,
            file_path: query.file_path.as_deref().unwrap_or(""),
            domain: query.domain.map(|d| d.as_str()).unwrap_or(""),
        };
        self.post("/ml/debug", &body).await
    }

    pub async fn quick_check(&self, query: &DebugQuery) -> Result<bool> {
        let report = self.debug(query).await?;
        Ok(report.has_proven_fix)
    }

    pub async fn status(&self) -> Result<KnowledgeStatus> {
        self.get("/ml/rag/status").await
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        let response = self
            .authorize(self.http.post(self.url(path)))
            .json(body)
            .send()
            .await?;
        decode(path, response).await
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self.authorize(self.http.get(self.url(path))).send().await?;
        decode(path, response).await
    }
}

async fn decode<T: DeserializeOwned>(path: &str, response: reqwest::Response) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        tracing::error!(path, %status, "remote knowledge request failed");
        return Err(KnowledgeError::Remote(format!("{path} returned HTTP {status}")));
    }
    response
        .json::<T>()
        .await
        .map_err(|e| KnowledgeError::Remote(format!("{path}: malformed response: {e}")))
}
