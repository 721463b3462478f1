//! Command dispatcher.
//!
//! The single entry point the chat transport calls. Each inbound message
//! goes through the same stages:
//!
//! ```text
//! text ──parse──▶ Command ──gate──▶ handler ──▶ Response ──render──▶ Reply
//!        │                 │                         │
//!        ▼                 ▼                         ▼
//!   Invalid reply     Denied reply              audit record
//!   (not audited)     (audited)                 (every gated or public command)
//! ```
//!
//! Handlers never see an actor the gate refused, and no handler can bypass
//! the gate: [`Dispatcher::handle`] is the only public way in.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;

use crate::aggregate::{Aggregator, FanOut, FanOutPolicy};
use crate::audit::{AuditLogger, SheetAuditSink, SqliteAuditSink};
use crate::backend_code::CodeRepoAdapter;
use crate::backend_files::FileStoreAdapter;
use crate::backend_identity::IdentityAdapter;
use crate::backend_tabular::{SheetsClient, TabularAdapter};
use crate::command::{self, Command};
use crate::config::Config;
use crate::error::BackendError;
use crate::gate::{AccessGate, Decision};
use crate::messenger::{self, LogMessenger};
use crate::models::{Actor, Attachment, BackendKind, IdentityKind, Outcome, QueryAttempt};
use crate::registry::RegistryClient;
use crate::render::{render, Response};
use crate::traits::{
    BackendRegistry, FileFetcher, IdentityLookup, Messenger, RecordWriter, RowStore,
    SearchBackend,
};

/// What the transport sends back to the actor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub outcome: Outcome,
    pub messages: Vec<String>,
    pub attachments: Vec<Attachment>,
}

/// Result of one handler, before rendering and auditing.
struct Handled {
    response: Response,
    outcome: Outcome,
    match_count: usize,
    attachments: Vec<Attachment>,
}

impl Handled {
    fn new(response: Response, outcome: Outcome, match_count: usize) -> Self {
        Self {
            response,
            outcome,
            match_count,
            attachments: Vec::new(),
        }
    }
}

pub struct Dispatcher {
    gate: AccessGate,
    registry: Arc<RegistryClient>,
    aggregator: Aggregator,
    enabled: Vec<BackendKind>,
    identity: Option<Arc<dyn IdentityLookup>>,
    writer: Option<Arc<dyn RecordWriter>>,
    files: Option<Arc<dyn FileFetcher>>,
    attach_best_file: bool,
    messenger: Arc<dyn Messenger>,
    pace: Duration,
    audit: AuditLogger,
    register_arity: Option<usize>,
}

impl Dispatcher {
    pub fn builder(registry: Arc<RegistryClient>) -> DispatcherBuilder {
        DispatcherBuilder::new(registry)
    }

    /// Wire every configured adapter, the registry, the audit sink and the
    /// messenger from a loaded configuration. Performs no network calls.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let timeout = config.aggregator.timeout();
        let sheets: Arc<dyn RowStore> =
            Arc::new(SheetsClient::from_config(&config.tabular, timeout));

        let registry = Arc::new(RegistryClient::new(
            sheets.clone(),
            config.registry.clone(),
        ));

        let tabular = Arc::new(TabularAdapter::from_config(sheets.clone(), &config.tabular));
        let mut builder = Dispatcher::builder(registry)
            .search_backend(tabular.clone())
            .record_writer(tabular)
            .policy(FanOutPolicy::from_config(&config.aggregator))
            .enabled(config.aggregator.enabled())
            .attach_best_file(config.aggregator.attach_best_file)
            .register_arity(config.tabular.register_arity)
            .pace(Duration::from_millis(config.messenger.pace_ms))
            .messenger(messenger::from_config(&config.messenger)?);

        if let Some(fs) = &config.file_store {
            let files = Arc::new(FileStoreAdapter::from_config(fs, timeout));
            builder = builder.search_backend(files.clone()).file_fetcher(files);
        }
        if let Some(code) = &config.code_repo {
            builder = builder.search_backend(Arc::new(CodeRepoAdapter::from_config(code, timeout)));
        }
        if let Some(identity) = &config.identity {
            builder = builder.identity(Arc::new(IdentityAdapter::from_config(identity)));
        }

        let audit = match config.audit.sink.as_str() {
            "sheet" => AuditLogger::new(Arc::new(SheetAuditSink::new(
                sheets,
                config.audit.range.clone(),
            ))),
            "sqlite" => {
                let sink = SqliteAuditSink::open(&config.audit.path)
                    .await
                    .with_context(|| {
                        format!("Failed to open audit database: {}", config.audit.path.display())
                    })?;
                AuditLogger::new(Arc::new(sink))
            }
            _ => AuditLogger::disabled(),
        };

        Ok(builder.audit(audit).build())
    }

    pub fn aggregator(&self) -> &Aggregator {
        &self.aggregator
    }

    pub fn enabled(&self) -> &[BackendKind] {
        &self.enabled
    }

    pub fn has_identity(&self) -> bool {
        self.identity.is_some()
    }

    pub fn audit_sink(&self) -> &str {
        self.audit.sink_name()
    }

    pub fn messenger_name(&self) -> &str {
        self.messenger.name()
    }

    /// Handle one inbound message from `actor`. Never fails: every error
    /// becomes a reply.
    pub async fn handle(&self, actor: &Actor, text: &str) -> Reply {
        let command = match command::parse(text, self.register_arity) {
            Ok(command) => command,
            Err(e) => {
                tracing::debug!(actor = %actor.id, error = %e, "rejected malformed command");
                return Reply {
                    outcome: Outcome::Invalid,
                    messages: render(&Response::Invalid(e.to_string())),
                    attachments: Vec::new(),
                };
            }
        };

        let operation = command.name();
        let query_text = command.query_text();

        let handled = match self.gate.check(actor, command.access_level()).await {
            Decision::Permitted { .. } => self.execute(actor, command).await,
            Decision::Denied { actor_id, .. } => {
                Handled::new(Response::Denied { actor_id }, Outcome::Denied, 0)
            }
        };

        self.audit
            .record(QueryAttempt::new(
                actor,
                operation,
                &query_text,
                handled.outcome,
                handled.match_count,
            ))
            .await;

        Reply {
            outcome: handled.outcome,
            messages: render(&handled.response),
            attachments: handled.attachments,
        }
    }

    async fn execute(&self, actor: &Actor, command: Command) -> Handled {
        match command {
            Command::Help => Handled::new(Response::Help, Outcome::Ok, 0),
            Command::WhoAmI => Handled::new(Response::WhoAmI(actor.clone()), Outcome::Ok, 0),
            Command::Search { term } => self.search(&term).await,
            Command::Lookup { kind, key } => self.lookup(kind, &key).await,
            Command::Register { fields } => self.register(fields).await,
            Command::Broadcast { message } => self.broadcast(&message).await,
        }
    }

    async fn search(&self, term: &str) -> Handled {
        let fan_out = self.aggregator.fan_out(term, &self.enabled).await;
        let match_count = fan_out.total_matches();
        let outcome = search_outcome(&fan_out);

        let mut attachments = Vec::new();
        if self.attach_best_file {
            if let Some(attachment) = self.best_file(&fan_out).await {
                attachments.push(attachment);
            }
        }

        Handled {
            response: Response::Search(fan_out),
            outcome,
            match_count,
            attachments,
        }
    }

    async fn best_file(&self, fan_out: &FanOut) -> Option<Attachment> {
        let fetcher = self.files.as_ref()?;
        let hit = fan_out
            .hits()
            .iter()
            .find(|h| h.source == BackendKind::FileStore)?;
        match fetcher.fetch(hit).await {
            Ok(attachment) => Some(attachment),
            Err(e) => {
                tracing::warn!(backend = %BackendKind::FileStore, error = %e, "could not fetch best file");
                None
            }
        }
    }

    async fn lookup(&self, kind: IdentityKind, key: &str) -> Handled {
        let Some(identity) = &self.identity else {
            return Handled::new(
                Response::Unavailable("Identity lookup".into()),
                Outcome::Unavailable,
                0,
            );
        };
        match identity.lookup(kind, key).await {
            Ok(hit) => Handled::new(Response::Found(hit), Outcome::Ok, 1),
            Err(BackendError::NotFound) => Handled::new(
                Response::NotFound {
                    kind,
                    key: key.to_string(),
                },
                Outcome::NotFound,
                0,
            ),
            Err(BackendError::Invalid(message)) => {
                Handled::new(Response::Invalid(message), Outcome::Invalid, 0)
            }
            Err(e) => {
                tracing::warn!(backend = %BackendKind::IdentityLookup, error = %e, "lookup failed");
                Handled::new(
                    Response::Unavailable("Identity lookup".into()),
                    Outcome::Unavailable,
                    0,
                )
            }
        }
    }

    async fn register(&self, fields: Vec<String>) -> Handled {
        let Some(writer) = &self.writer else {
            return Handled::new(
                Response::Unavailable("The record store".into()),
                Outcome::Unavailable,
                0,
            );
        };
        match writer.append(fields.clone()).await {
            Ok(()) => Handled::new(Response::Registered { fields }, Outcome::Ok, 1),
            Err(BackendError::WriteError(reason)) => {
                tracing::warn!(backend = %BackendKind::Tabular, %reason, "append rejected");
                Handled::new(Response::WriteFailed, Outcome::WriteError, 0)
            }
            Err(BackendError::Invalid(message)) => {
                Handled::new(Response::Invalid(message), Outcome::Invalid, 0)
            }
            Err(e) => {
                tracing::warn!(backend = %BackendKind::Tabular, error = %e, "append failed");
                Handled::new(
                    Response::Unavailable("The record store".into()),
                    Outcome::Unavailable,
                    0,
                )
            }
        }
    }

    async fn broadcast(&self, message: &str) -> Handled {
        let recipients = match self.registry.recipients().await {
            Ok(ids) => ids,
            Err(e) => {
                tracing::warn!(error = %e, "could not read broadcast recipients");
                return Handled::new(
                    Response::Unavailable("The user registry".into()),
                    Outcome::Unavailable,
                    0,
                );
            }
        };

        let attempted = recipients.len();
        let mut delivered = 0;
        for (i, recipient) in recipients.iter().enumerate() {
            if i > 0 && !self.pace.is_zero() {
                tokio::time::sleep(self.pace).await;
            }
            match self.messenger.send(recipient, message).await {
                Ok(()) => delivered += 1,
                Err(e) => {
                    tracing::warn!(messenger = self.messenger.name(), recipient = %recipient, error = %e, "broadcast send failed")
                }
            }
        }
        tracing::info!(attempted, delivered, "broadcast finished");

        let outcome = if attempted > 0 && delivered == 0 {
            Outcome::Unavailable
        } else {
            Outcome::Ok
        };
        Handled::new(
            Response::Broadcast {
                attempted,
                delivered,
            },
            outcome,
            attempted,
        )
    }
}

fn search_outcome(fan_out: &FanOut) -> Outcome {
    if !fan_out.is_no_match() {
        Outcome::Ok
    } else if !fan_out.backends.is_empty()
        && fan_out.unreachable().len() == fan_out.backends.len()
    {
        Outcome::Unavailable
    } else {
        Outcome::NoMatches
    }
}

/// Assembles a [`Dispatcher`] from individual collaborators.
///
/// Only the registry is required. Everything else defaults to "not
/// configured": no search backends, no identity lookup, no writer, a
/// log-only messenger and a disabled audit sink.
pub struct DispatcherBuilder {
    registry: Arc<RegistryClient>,
    backends: BackendRegistry,
    policy: FanOutPolicy,
    enabled: Option<Vec<BackendKind>>,
    identity: Option<Arc<dyn IdentityLookup>>,
    writer: Option<Arc<dyn RecordWriter>>,
    files: Option<Arc<dyn FileFetcher>>,
    attach_best_file: bool,
    messenger: Arc<dyn Messenger>,
    pace: Duration,
    audit: AuditLogger,
    register_arity: Option<usize>,
}

impl DispatcherBuilder {
    pub fn new(registry: Arc<RegistryClient>) -> Self {
        Self {
            registry,
            backends: BackendRegistry::new(),
            policy: FanOutPolicy::default(),
            enabled: None,
            identity: None,
            writer: None,
            files: None,
            attach_best_file: false,
            messenger: Arc::new(LogMessenger),
            pace: Duration::ZERO,
            audit: AuditLogger::disabled(),
            register_arity: None,
        }
    }

    pub fn search_backend(mut self, backend: Arc<dyn SearchBackend>) -> Self {
        self.backends.register(backend);
        self
    }

    pub fn policy(mut self, policy: FanOutPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Backends that take part in fan-out. Defaults to every registered one.
    pub fn enabled(mut self, kinds: Vec<BackendKind>) -> Self {
        self.enabled = Some(kinds);
        self
    }

    pub fn identity(mut self, identity: Arc<dyn IdentityLookup>) -> Self {
        self.identity = Some(identity);
        self
    }

    pub fn record_writer(mut self, writer: Arc<dyn RecordWriter>) -> Self {
        self.writer = Some(writer);
        self
    }

    pub fn file_fetcher(mut self, files: Arc<dyn FileFetcher>) -> Self {
        self.files = Some(files);
        self
    }

    pub fn attach_best_file(mut self, on: bool) -> Self {
        self.attach_best_file = on;
        self
    }

    pub fn messenger(mut self, messenger: Arc<dyn Messenger>) -> Self {
        self.messenger = messenger;
        self
    }

    pub fn pace(mut self, pace: Duration) -> Self {
        self.pace = pace;
        self
    }

    pub fn audit(mut self, audit: AuditLogger) -> Self {
        self.audit = audit;
        self
    }

    pub fn register_arity(mut self, arity: Option<usize>) -> Self {
        self.register_arity = arity;
        self
    }

    pub fn build(self) -> Dispatcher {
        let enabled = self.enabled.unwrap_or_else(|| self.backends.kinds());
        Dispatcher {
            gate: AccessGate::new(self.registry.clone()),
            registry: self.registry,
            aggregator: Aggregator::new(self.backends, self.policy),
            enabled,
            identity: self.identity,
            writer: self.writer,
            files: self.files,
            attach_best_file: self.attach_best_file,
            messenger: self.messenger,
            pace: self.pace,
            audit: self.audit,
            register_arity: self.register_arity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::{BackendReport, FanOutOutcome};

    fn report(reachable: bool) -> BackendReport {
        BackendReport {
            kind: BackendKind::Tabular,
            reachable,
            matched: 0,
            returned: 0,
            error: None,
        }
    }

    #[test]
    fn test_search_outcome() {
        let all_down = FanOut {
            outcome: FanOutOutcome::NoMatches,
            backends: vec![report(false)],
        };
        assert_eq!(search_outcome(&all_down), Outcome::Unavailable);

        let empty = FanOut {
            outcome: FanOutOutcome::NoMatches,
            backends: vec![report(true), report(false)],
        };
        assert_eq!(search_outcome(&empty), Outcome::NoMatches);

        let none_configured = FanOut {
            outcome: FanOutOutcome::NoMatches,
            backends: vec![],
        };
        assert_eq!(search_outcome(&none_configured), Outcome::NoMatches);
    }
}
