//! Code-repository backend.
//!
//! Runs code search scoped to one fixed repository and links every hit to
//! its raw file content on the configured branch.
//!
//! # Configuration
//!
//! ```toml
//! [code_repo]
//! repository = "acme/handbook"
//! branch = "main"
//! token_env = "GITHUB_TOKEN"
//! ```

use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;
use std::time::Duration;

use crate::config::{resolve_token, CodeRepoConfig};
use crate::error::{BackendError, BackendResult};
use crate::http_client::{encode_component, LazyClient};
use crate::models::{BackendKind, Hit};
use crate::traits::SearchBackend;

pub struct CodeRepoAdapter {
    base_url: String,
    raw_base_url: String,
    repository: String,
    branch: String,
    http: LazyClient,
}

#[derive(Debug, Deserialize)]
struct CodeSearchResponse {
    #[serde(default)]
    items: Vec<CodeItem>,
}

#[derive(Debug, Deserialize)]
struct CodeItem {
    name: String,
    path: String,
}

impl CodeRepoAdapter {
    pub fn new(
        base_url: impl Into<String>,
        raw_base_url: impl Into<String>,
        repository: impl Into<String>,
        branch: impl Into<String>,
        token: Option<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            raw_base_url: raw_base_url.into().trim_end_matches('/').to_string(),
            repository: repository.into(),
            branch: branch.into(),
            http: LazyClient::new(BackendKind::CodeRepo, token, timeout),
        }
    }

    pub fn from_config(config: &CodeRepoConfig, timeout: Duration) -> Self {
        Self::new(
            &config.base_url,
            &config.raw_base_url,
            &config.repository,
            &config.branch,
            resolve_token("code_repo", &config.token_env),
            timeout,
        )
    }

    /// Raw-content URL of a file on the configured branch.
    pub fn raw_url(&self, path: &str) -> String {
        let encoded_path = path
            .split('/')
            .map(encode_component)
            .collect::<Vec<_>>()
            .join("/");
        format!(
            "{}/{}/{}/{}",
            self.raw_base_url, self.repository, self.branch, encoded_path
        )
    }

    fn search_query(&self, term: &str) -> String {
        format!("{} repo:{}", term, self.repository)
    }
}

#[async_trait]
impl SearchBackend for CodeRepoAdapter {
    fn kind(&self) -> BackendKind {
        BackendKind::CodeRepo
    }

    fn description(&self) -> &str {
        "Code search in the configured repository"
    }

    async fn search(&self, term: &str) -> BackendResult<Vec<Hit>> {
        let term = term.trim();
        if term.is_empty() {
            return Ok(Vec::new());
        }
        let url = format!("{}/search/code", self.base_url);
        let req = self
            .http
            .request(Method::GET, &url)?
            .header("Accept", "application/vnd.github+json")
            .query(&[("q", self.search_query(term))]);
        let resp = self.http.send(req).await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(BackendError::unavailable(
                BackendKind::CodeRepo,
                format!("code search returned status {}", status.as_u16()),
            ));
        }

        let body: CodeSearchResponse = resp
            .json()
            .await
            .map_err(|e| BackendError::from_transport(BackendKind::CodeRepo, e))?;

        Ok(body
            .items
            .into_iter()
            .map(|item| Hit {
                source: BackendKind::CodeRepo,
                link: Some(self.raw_url(&item.path)),
                detail: item.path,
                title: item.name,
                native_id: None,
            })
            .collect())
    }
}
