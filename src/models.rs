//! Core data models used throughout Record Desk.
//!
//! These types represent the rows, normalized hits, actors and audit
//! entries that flow between the gate, the adapters and the dispatcher.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the backends the desk can talk to.
///
/// The declaration order is the fan-out priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Tabular,
    FileStore,
    CodeRepo,
    IdentityLookup,
}

impl BackendKind {
    /// Backends that take part in fan-out, in priority order.
    pub const SEARCHABLE: [BackendKind; 3] = [
        BackendKind::Tabular,
        BackendKind::FileStore,
        BackendKind::CodeRepo,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Tabular => "tabular",
            BackendKind::FileStore => "file_store",
            BackendKind::CodeRepo => "code_repo",
            BackendKind::IdentityLookup => "identity",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "tabular" => Some(BackendKind::Tabular),
            "file_store" => Some(BackendKind::FileStore),
            "code_repo" => Some(BackendKind::CodeRepo),
            "identity" | "identity_lookup" => Some(BackendKind::IdentityLookup),
            _ => None,
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which kind of identity record a lookup key refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityKind {
    /// 8-digit national identity number.
    Person,
    /// 11-digit taxpayer number.
    Organization,
}

impl IdentityKind {
    pub fn key_len(&self) -> usize {
        match self {
            IdentityKind::Person => 8,
            IdentityKind::Organization => 11,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            IdentityKind::Person => "DNI",
            IdentityKind::Organization => "RUC",
        }
    }

    /// Whether `key` has exactly the required number of ASCII digits.
    pub fn accepts(&self, key: &str) -> bool {
        key.len() == self.key_len() && key.bytes().all(|b| b.is_ascii_digit())
    }
}

/// One row of tabular data: column titles paired with cell values.
///
/// Column order follows the header row of the snapshot it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub cells: Vec<(String, String)>,
}

impl Record {
    /// Pair a data row with the header row. Short rows are padded with
    /// empty values; cells beyond the header are kept under an empty title.
    pub fn from_row(headers: &[String], row: &[String]) -> Self {
        let width = headers.len().max(row.len());
        let cells = (0..width)
            .map(|i| {
                let title = headers.get(i).cloned().unwrap_or_default();
                let value = row.get(i).cloned().unwrap_or_default();
                (title, value)
            })
            .collect();
        Self { cells }
    }

    pub fn get(&self, title: &str) -> Option<&str> {
        self.cells
            .iter()
            .find(|(t, _)| t.trim().eq_ignore_ascii_case(title.trim()))
            .map(|(_, v)| v.as_str())
    }

    /// All cell values joined, used for substring matching.
    pub fn joined_text(&self) -> String {
        self.cells
            .iter()
            .map(|(_, v)| v.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// `Title: value` lines, blank cells omitted.
    pub fn render(&self) -> String {
        self.cells
            .iter()
            .filter(|(_, v)| !v.trim().is_empty())
            .map(|(t, v)| {
                if t.trim().is_empty() {
                    v.clone()
                } else {
                    format!("{}: {}", t, v)
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// A normalized result from any backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Hit {
    pub source: BackendKind,
    pub title: String,
    /// Plain text, ready for display.
    pub detail: String,
    /// Absolute URL, when the backend provides one.
    pub link: Option<String>,
    /// Backend-native identifier, used to fetch file-store content.
    #[serde(skip)]
    pub native_id: Option<String>,
}

/// Role of an actor as resolved from the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    None,
    Member,
    Admin,
}

impl Role {
    /// Interpret a role cell. Any enrolled row is at least a member.
    pub fn from_cell(cell: &str) -> Self {
        match cell.trim().to_lowercase().as_str() {
            "admin" | "administrator" | "administrador" => Role::Admin,
            _ => Role::Member,
        }
    }
}

/// The person issuing a command, as reported by the chat transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub handle: Option<String>,
}

impl Actor {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            handle: None,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_handle(mut self, handle: impl Into<String>) -> Self {
        self.handle = Some(handle.into());
        self
    }
}

/// How an attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Ok,
    NoMatches,
    NotFound,
    Invalid,
    Unavailable,
    Denied,
    WriteError,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Ok => "ok",
            Outcome::NoMatches => "no_matches",
            Outcome::NotFound => "not_found",
            Outcome::Invalid => "invalid",
            Outcome::Unavailable => "unavailable",
            Outcome::Denied => "denied",
            Outcome::WriteError => "write_error",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An audit entry. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryAttempt {
    pub timestamp: DateTime<Local>,
    pub actor_id: String,
    pub actor_name: String,
    pub actor_handle: String,
    pub operation: String,
    pub query_text: String,
    pub outcome: Outcome,
    pub match_count: usize,
}

impl QueryAttempt {
    pub fn new(
        actor: &Actor,
        operation: &str,
        query_text: &str,
        outcome: Outcome,
        match_count: usize,
    ) -> Self {
        Self {
            timestamp: Local::now(),
            actor_id: actor.id.clone(),
            actor_name: actor.name.clone(),
            actor_handle: actor.handle.clone().unwrap_or_default(),
            operation: operation.to_string(),
            query_text: query_text.to_string(),
            outcome,
            match_count,
        }
    }

    pub fn formatted_timestamp(&self) -> String {
        self.timestamp.format("%Y-%m-%d %H:%M:%S").to_string()
    }
}

/// A file returned to the transport next to the text reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}
