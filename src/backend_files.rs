//! File-store backend (drive files API).
//!
//! Searches non-trashed files by name and retrieves their content. Native
//! office documents have no binary form of their own, so they are exported
//! server-side to PDF and the returned filename gains a `.pdf` suffix.
//!
//! # Configuration
//!
//! ```toml
//! [file_store]
//! base_url = "https://www.googleapis.com"
//! token_env = "DRIVE_TOKEN"
//! ```

use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;
use std::time::Duration;

use crate::config::{resolve_token, FileStoreConfig};
use crate::error::{BackendError, BackendResult};
use crate::http_client::{encode_component, LazyClient};
use crate::models::{Attachment, BackendKind, Hit};
use crate::traits::{FileFetcher, SearchBackend};

const NATIVE_PREFIX: &str = "application/vnd.google-apps.";
const EXPORT_MIME: &str = "application/pdf";

pub struct FileStoreAdapter {
    base_url: String,
    http: LazyClient,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveFile {
    id: String,
    name: String,
    #[serde(default)]
    mime_type: String,
    #[serde(default)]
    web_view_link: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FileList {
    #[serde(default)]
    files: Vec<DriveFile>,
}

impl FileStoreAdapter {
    pub fn new(base_url: impl Into<String>, token: Option<String>, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http: LazyClient::new(BackendKind::FileStore, token, timeout),
        }
    }

    pub fn from_config(config: &FileStoreConfig, timeout: Duration) -> Self {
        Self::new(
            &config.base_url,
            resolve_token("file_store", &config.token_env),
            timeout,
        )
    }

    fn file_url(&self, id: &str) -> String {
        format!(
            "{}/drive/v3/files/{}",
            self.base_url,
            encode_component(id)
        )
    }

    async fn metadata(&self, id: &str) -> BackendResult<DriveFile> {
        let req = self
            .http
            .request(Method::GET, &self.file_url(id))?
            .query(&[("fields", "id,name,mimeType,webViewLink")]);
        let resp = self.http.send(req).await?;
        match resp.status().as_u16() {
            200 => resp
                .json()
                .await
                .map_err(|e| BackendError::from_transport(BackendKind::FileStore, e)),
            404 => Err(BackendError::NotFound),
            code => Err(BackendError::unavailable(
                BackendKind::FileStore,
                format!("metadata returned status {}", code),
            )),
        }
    }
}

/// Build the name query. Quotes and backslashes must be escaped inside the
/// single-quoted literal.
pub fn name_query(term: &str) -> String {
    let escaped = term.replace('\\', "\\\\").replace('\'', "\\'");
    format!("name contains '{}' and trashed = false", escaped)
}

pub fn is_native_document(mime_type: &str) -> bool {
    mime_type.starts_with(NATIVE_PREFIX) && mime_type != "application/vnd.google-apps.folder"
}

/// Human-readable classification of a MIME type.
pub fn classify(mime_type: &str) -> &str {
    match mime_type {
        "application/vnd.google-apps.document" => "document",
        "application/vnd.google-apps.spreadsheet" => "spreadsheet",
        "application/vnd.google-apps.presentation" => "presentation",
        "application/vnd.google-apps.drawing" => "drawing",
        "application/vnd.google-apps.folder" => "folder",
        "application/pdf" => "pdf",
        m if m.starts_with("image/") => "image",
        m if m.starts_with("text/") => "text",
        "" => "file",
        other => other,
    }
}

/// Filename used for a downloaded or exported file.
pub fn export_filename(name: &str, mime_type: &str) -> String {
    if is_native_document(mime_type) {
        format!("{}.pdf", name)
    } else {
        name.to_string()
    }
}

fn file_to_hit(file: DriveFile) -> Hit {
    Hit {
        source: BackendKind::FileStore,
        detail: format!("{} ({})", file.name, classify(&file.mime_type)),
        title: file.name,
        link: file.web_view_link,
        native_id: Some(file.id),
    }
}

#[async_trait]
impl SearchBackend for FileStoreAdapter {
    fn kind(&self) -> BackendKind {
        BackendKind::FileStore
    }

    fn description(&self) -> &str {
        "File name search in the shared drive"
    }

    async fn search(&self, term: &str) -> BackendResult<Vec<Hit>> {
        let term = term.trim();
        if term.is_empty() {
            return Ok(Vec::new());
        }
        let url = format!("{}/drive/v3/files", self.base_url);
        let req = self.http.request(Method::GET, &url)?.query(&[
            ("q", name_query(term).as_str()),
            ("fields", "files(id,name,mimeType,webViewLink)"),
        ]);
        let resp = self.http.send(req).await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(BackendError::unavailable(
                BackendKind::FileStore,
                format!("file search returned status {}", status.as_u16()),
            ));
        }

        let list: FileList = resp
            .json()
            .await
            .map_err(|e| BackendError::from_transport(BackendKind::FileStore, e))?;
        Ok(list.files.into_iter().map(file_to_hit).collect())
    }
}

#[async_trait]
impl FileFetcher for FileStoreAdapter {
    async fn fetch(&self, hit: &Hit) -> BackendResult<Attachment> {
        if hit.source != BackendKind::FileStore {
            return Err(BackendError::Invalid(format!(
                "cannot fetch a {} result from the file store",
                hit.source
            )));
        }
        let id = hit
            .native_id
            .as_deref()
            .ok_or_else(|| BackendError::Invalid("file result has no id".to_string()))?;

        let meta = self.metadata(id).await?;
        let native = is_native_document(&meta.mime_type);

        let req = if native {
            self.http
                .request(Method::GET, &format!("{}/export", self.file_url(id)))?
                .query(&[("mimeType", EXPORT_MIME)])
        } else {
            self.http
                .request(Method::GET, &self.file_url(id))?
                .query(&[("alt", "media")])
        };
        let resp = self.http.send(req).await?;

        match resp.status().as_u16() {
            200 => {}
            404 => return Err(BackendError::NotFound),
            code => {
                return Err(BackendError::unavailable(
                    BackendKind::FileStore,
                    format!("download returned status {}", code),
                ))
            }
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| BackendError::from_transport(BackendKind::FileStore, e))?;

        Ok(Attachment {
            filename: export_filename(&meta.name, &meta.mime_type),
            content_type: if native {
                EXPORT_MIME.to_string()
            } else {
                meta.mime_type
            },
            bytes: bytes.to_vec(),
        })
    }
}
