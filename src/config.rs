//! TOML configuration parsing.
//!
//! Every backend has its own optional section; leaving a section out
//! disables that backend. Credentials never live in the file. Each section
//! names an environment variable (`token_env`) holding its bearer token.
//!
//! ```toml
//! [server]
//! bind = "0.0.0.0:8080"
//!
//! [tabular]
//! spreadsheet_id = "1AbC..."
//! data_range = "Hoja 1"
//! token_env = "SHEETS_TOKEN"
//!
//! [registry]
//! range = "Usuarios"
//!
//! [code_repo]
//! repository = "acme/handbook"
//!
//! [identity]
//! token_env = "APIS_NET_PE_TOKEN"
//!
//! [audit]
//! sink = "sheet"
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::models::BackendKind;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    pub tabular: TabularConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub file_store: Option<FileStoreConfig>,
    #[serde(default)]
    pub code_repo: Option<CodeRepoConfig>,
    #[serde(default)]
    pub identity: Option<IdentityConfig>,
    #[serde(default)]
    pub aggregator: AggregatorConfig,
    #[serde(default)]
    pub audit: AuditConfig,
    #[serde(default)]
    pub messenger: MessengerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:8080".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct TabularConfig {
    #[serde(default = "default_sheets_base_url")]
    pub base_url: String,
    pub spreadsheet_id: String,
    #[serde(default = "default_data_range")]
    pub data_range: String,
    #[serde(default)]
    pub token_env: Option<String>,
    /// Upper-case values appended by `register`.
    #[serde(default = "default_true")]
    pub uppercase_appends: bool,
    /// Exact number of fields `register` must receive, when set.
    #[serde(default)]
    pub register_arity: Option<usize>,
}

fn default_sheets_base_url() -> String {
    "https://sheets.googleapis.com".to_string()
}
fn default_data_range() -> String {
    "Sheet1".to_string()
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct RegistryConfig {
    #[serde(default = "default_registry_range")]
    pub range: String,
    #[serde(default = "default_id_column")]
    pub id_column: String,
    #[serde(default = "default_role_column")]
    pub role_column: String,
    /// How long a registry snapshot may be reused. 0 disables caching.
    #[serde(default)]
    pub cache_ttl_secs: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            range: default_registry_range(),
            id_column: default_id_column(),
            role_column: default_role_column(),
            cache_ttl_secs: 0,
        }
    }
}

fn default_registry_range() -> String {
    "Usuarios".to_string()
}
fn default_id_column() -> String {
    "ID".to_string()
}
fn default_role_column() -> String {
    "ROL".to_string()
}

impl RegistryConfig {
    pub fn cache_ttl(&self) -> Option<Duration> {
        (self.cache_ttl_secs > 0).then(|| Duration::from_secs(self.cache_ttl_secs))
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct FileStoreConfig {
    #[serde(default = "default_drive_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub token_env: Option<String>,
}

fn default_drive_base_url() -> String {
    "https://www.googleapis.com".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct CodeRepoConfig {
    #[serde(default = "default_github_base_url")]
    pub base_url: String,
    #[serde(default = "default_raw_base_url")]
    pub raw_base_url: String,
    /// `owner/name` of the one repository searched.
    pub repository: String,
    #[serde(default = "default_branch")]
    pub branch: String,
    #[serde(default)]
    pub token_env: Option<String>,
}

fn default_github_base_url() -> String {
    "https://api.github.com".to_string()
}
fn default_raw_base_url() -> String {
    "https://raw.githubusercontent.com".to_string()
}
fn default_branch() -> String {
    "main".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct IdentityConfig {
    #[serde(default = "default_identity_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub token_env: Option<String>,
    #[serde(default = "default_identity_timeout")]
    pub timeout_secs: u64,
}

fn default_identity_base_url() -> String {
    "https://api.apis.net.pe".to_string()
}
fn default_identity_timeout() -> u64 {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct AggregatorConfig {
    #[serde(default = "default_backends")]
    pub backends: Vec<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_tabular_cap")]
    pub tabular_cap: usize,
    #[serde(default = "default_best_match_cap")]
    pub file_store_cap: usize,
    #[serde(default = "default_best_match_cap")]
    pub code_repo_cap: usize,
    /// Fetch the top file-store hit and return it as an attachment.
    #[serde(default)]
    pub attach_best_file: bool,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            backends: default_backends(),
            timeout_secs: default_timeout_secs(),
            tabular_cap: default_tabular_cap(),
            file_store_cap: default_best_match_cap(),
            code_repo_cap: default_best_match_cap(),
            attach_best_file: false,
        }
    }
}

fn default_backends() -> Vec<String> {
    BackendKind::SEARCHABLE
        .iter()
        .map(|k| k.as_str().to_string())
        .collect()
}
fn default_timeout_secs() -> u64 {
    10
}
fn default_tabular_cap() -> usize {
    3
}
fn default_best_match_cap() -> usize {
    1
}

impl AggregatorConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn cap_for(&self, kind: BackendKind) -> usize {
        match kind {
            BackendKind::Tabular => self.tabular_cap,
            BackendKind::FileStore => self.file_store_cap,
            BackendKind::CodeRepo => self.code_repo_cap,
            BackendKind::IdentityLookup => 1,
        }
    }

    /// Enabled fan-out backends. Names are validated by [`load_config`].
    pub fn enabled(&self) -> Vec<BackendKind> {
        let mut kinds: Vec<BackendKind> = self
            .backends
            .iter()
            .filter_map(|b| BackendKind::parse(b))
            .filter(|k| *k != BackendKind::IdentityLookup)
            .collect();
        kinds.sort();
        kinds.dedup();
        kinds
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuditConfig {
    #[serde(default = "default_audit_sink")]
    pub sink: String,
    #[serde(default = "default_audit_range")]
    pub range: String,
    #[serde(default = "default_audit_path")]
    pub path: PathBuf,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            sink: default_audit_sink(),
            range: default_audit_range(),
            path: default_audit_path(),
        }
    }
}

fn default_audit_sink() -> String {
    "sheet".to_string()
}
fn default_audit_range() -> String {
    "Log_Busquedas".to_string()
}
fn default_audit_path() -> PathBuf {
    PathBuf::from("data/audit.sqlite")
}

#[derive(Debug, Deserialize, Clone)]
pub struct MessengerConfig {
    #[serde(default = "default_messenger_provider")]
    pub provider: String,
    #[serde(default = "default_telegram_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub token_env: Option<String>,
    /// Delay between two broadcast sends.
    #[serde(default = "default_pace_ms")]
    pub pace_ms: u64,
}

impl Default for MessengerConfig {
    fn default() -> Self {
        Self {
            provider: default_messenger_provider(),
            base_url: default_telegram_base_url(),
            token_env: None,
            pace_ms: default_pace_ms(),
        }
    }
}

fn default_messenger_provider() -> String {
    "log".to_string()
}
fn default_telegram_base_url() -> String {
    "https://api.telegram.org".to_string()
}
fn default_pace_ms() -> u64 {
    50
}

/// Read a bearer token from the environment variable a section names.
///
/// A missing variable is not fatal: the client runs unauthenticated and the
/// backend will answer with an error status that surfaces as `Unavailable`.
pub fn resolve_token(section: &str, token_env: &Option<String>) -> Option<String> {
    let var = token_env.as_ref()?;
    match std::env::var(var) {
        Ok(v) if !v.trim().is_empty() => Some(v),
        _ => {
            tracing::warn!(section, var = %var, "token variable not set, using no credentials");
            None
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.tabular.spreadsheet_id.trim().is_empty() {
        bail!("tabular.spreadsheet_id must not be empty");
    }
    if config.tabular.register_arity == Some(0) {
        bail!("tabular.register_arity must be >= 1 when set");
    }

    let agg = &config.aggregator;
    if agg.timeout_secs == 0 {
        bail!("aggregator.timeout_secs must be > 0");
    }
    if agg.tabular_cap == 0 || agg.file_store_cap == 0 || agg.code_repo_cap == 0 {
        bail!("aggregator caps must be >= 1");
    }
    for name in &agg.backends {
        match BackendKind::parse(name) {
            Some(BackendKind::IdentityLookup) => {
                bail!("aggregator.backends: identity lookup cannot take part in fan-out")
            }
            Some(_) => {}
            None => bail!(
                "Unknown backend in aggregator.backends: '{}'. Must be tabular, file_store, or code_repo.",
                name
            ),
        }
    }

    if let Some(code) = &config.code_repo {
        let parts: Vec<&str> = code.repository.split('/').collect();
        if parts.len() != 2 || parts.iter().any(|p| p.trim().is_empty()) {
            bail!(
                "code_repo.repository must be 'owner/name', got '{}'",
                code.repository
            );
        }
    }

    match config.audit.sink.as_str() {
        "sheet" | "sqlite" | "disabled" => {}
        other => bail!(
            "Unknown audit sink: '{}'. Must be sheet, sqlite, or disabled.",
            other
        ),
    }

    match config.messenger.provider.as_str() {
        "telegram" | "log" => {}
        other => bail!(
            "Unknown messenger provider: '{}'. Must be telegram or log.",
            other
        ),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &str) -> Result<Config> {
        let toml_src = format!(
            "[tabular]\nspreadsheet_id = \"sheet-1\"\n{}",
            extra
        );
        let config: Config = toml::from_str(&toml_src)?;
        validate(&config)?;
        Ok(config)
    }

    #[test]
    fn test_defaults() {
        let cfg = parse("").unwrap();
        assert_eq!(cfg.aggregator.cap_for(BackendKind::Tabular), 3);
        assert_eq!(cfg.aggregator.cap_for(BackendKind::FileStore), 1);
        assert_eq!(cfg.aggregator.cap_for(BackendKind::CodeRepo), 1);
        assert_eq!(cfg.aggregator.enabled(), BackendKind::SEARCHABLE.to_vec());
        assert_eq!(cfg.registry.cache_ttl(), None);
        assert_eq!(cfg.audit.sink, "sheet");
        assert_eq!(cfg.audit.range, "Log_Busquedas");
        assert!(cfg.tabular.uppercase_appends);
    }

    #[test]
    fn test_enabled_backends_sorted_by_priority() {
        let cfg = parse("[aggregator]\nbackends = [\"code_repo\", \"tabular\", \"tabular\"]\n")
            .unwrap();
        assert_eq!(
            cfg.aggregator.enabled(),
            vec![BackendKind::Tabular, BackendKind::CodeRepo]
        );
    }

    #[test]
    fn test_rejects_identity_in_fan_out() {
        let err = parse("[aggregator]\nbackends = [\"identity\"]\n").unwrap_err();
        assert!(err.to_string().contains("fan-out"));
    }

    #[test]
    fn test_rejects_zero_cap() {
        assert!(parse("[aggregator]\ntabular_cap = 0\n").is_err());
    }

    #[test]
    fn test_rejects_bad_repository() {
        assert!(parse("[code_repo]\nrepository = \"just-a-name\"\n").is_err());
        assert!(parse("[code_repo]\nrepository = \"acme/handbook\"\n").is_ok());
    }

    #[test]
    fn test_rejects_unknown_sink() {
        assert!(parse("[audit]\nsink = \"kafka\"\n").is_err());
    }

    #[test]
    fn test_cache_ttl() {
        let cfg = parse("[registry]\ncache_ttl_secs = 5\n").unwrap();
        assert_eq!(cfg.registry.cache_ttl(), Some(Duration::from_secs(5)));
    }
}
