//! # Record Desk
//!
//! A chat-driven lookup desk. Registered users send short commands; the desk
//! checks their role against a registry sheet, fans searches out to a
//! spreadsheet, a file store and a code repository, answers single-key
//! identity lookups, appends records, and writes one audit entry per
//! attempt.
//!
//! ## Architecture
//!
//! ```text
//!  transport ──▶ POST /commands ──▶ Dispatcher
//!                                        │
//!             ┌─────────────────┬────────┴────────┬─────────────────┐
//!             ▼                 ▼                 ▼                 ▼
//!     ┌──────────────┐  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐
//!     │  AccessGate  │  │  Aggregator  │  │   Identity   │  │ AuditLogger  │
//!     │  (registry)  │  │   fan-out    │  │ lookup only  │  │ sheet/sqlite │
//!     └──────────────┘  └───────┬──────┘  └──────────────┘  └──────────────┘
//!                   ┌───────────┼───────────┐
//!                   ▼           ▼           ▼
//!                Tabular   File store   Code repo
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! rdesk sources                                   # show configured backends
//! rdesk exec --actor-id 111 "/buscar informe"     # run one command locally
//! rdesk serve                                     # start the HTTP hook
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`error`] | Adapter error taxonomy |
//! | [`traits`] | Backend, transport and audit traits |
//! | [`http_client`] | Lazily built, reconnecting HTTP client |
//! | [`backend_tabular`] | Spreadsheet search, append and row store |
//! | [`backend_files`] | File store search and download |
//! | [`backend_code`] | Code repository search |
//! | [`backend_identity`] | Person and organization lookup |
//! | [`registry`] | Actor id → role table |
//! | [`gate`] | Role-based access decisions |
//! | [`aggregate`] | Concurrent fan-out and merge |
//! | [`audit`] | Audit logger and sinks |
//! | [`command`] | Command parsing and validation |
//! | [`render`] | Reply text |
//! | [`dispatch`] | Parse, gate, handle, audit |
//! | [`messenger`] | Outbound messages for broadcasts |
//! | [`server`] | HTTP hook |
//! | [`sources`] | Backend status listing |
//! | [`db`] | SQLite connection |
//! | [`migrate`] | Audit schema |

pub mod aggregate;
pub mod audit;
pub mod backend_code;
pub mod backend_files;
pub mod backend_identity;
pub mod backend_tabular;
pub mod command;
pub mod config;
pub mod db;
pub mod dispatch;
pub mod error;
pub mod gate;
pub mod http_client;
pub mod messenger;
pub mod migrate;
pub mod models;
pub mod registry;
pub mod render;
pub mod server;
pub mod sources;
pub mod traits;
