//! `rdesk sources`: which backends are configured and which take part in
//! fan-out. Reads the configuration only; no backend is contacted.

use anyhow::Result;

use crate::config::Config;
use crate::models::BackendKind;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceStatus {
    pub kind: BackendKind,
    pub configured: bool,
    /// Part of `aggregator.backends`. Always false for identity lookup.
    pub in_fan_out: bool,
    pub target: String,
}

pub fn source_statuses(config: &Config) -> Vec<SourceStatus> {
    let enabled = config.aggregator.enabled();
    let status = |kind: BackendKind, target: Option<String>| SourceStatus {
        kind,
        configured: target.is_some(),
        in_fan_out: target.is_some() && enabled.contains(&kind),
        target: target.unwrap_or_else(|| "-".to_string()),
    };

    vec![
        status(
            BackendKind::Tabular,
            Some(format!(
                "{} ({})",
                config.tabular.spreadsheet_id, config.tabular.data_range
            )),
        ),
        status(
            BackendKind::FileStore,
            config.file_store.as_ref().map(|f| f.base_url.clone()),
        ),
        status(
            BackendKind::CodeRepo,
            config
                .code_repo
                .as_ref()
                .map(|c| format!("{}@{}", c.repository, c.branch)),
        ),
        status(
            BackendKind::IdentityLookup,
            config.identity.as_ref().map(|i| i.base_url.clone()),
        ),
    ]
}

pub fn list_sources(config: &Config) -> Result<()> {
    println!("{:<12} {:<12} {:<8} TARGET", "BACKEND", "STATUS", "FAN-OUT");
    for s in source_statuses(config) {
        let status = if s.configured { "OK" } else { "NOT CONFIGURED" };
        println!(
            "{:<12} {:<12} {:<8} {}",
            s.kind.as_str(),
            status,
            s.in_fan_out,
            s.target
        );
    }
    println!();
    println!(
        "registry: {} (id column {}, role column {})",
        config.registry.range, config.registry.id_column, config.registry.role_column
    );
    println!("audit:    {}", config.audit.sink);
    println!("messenger: {}", config.messenger.provider);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(extra: &str) -> Config {
        let text = format!("[tabular]\nspreadsheet_id = \"sheet-1\"\n{}", extra);
        toml::from_str(&text).unwrap()
    }

    #[test]
    fn test_unconfigured_backends_are_reported() {
        let statuses = source_statuses(&config(""));
        assert_eq!(statuses.len(), 4);
        assert!(statuses[0].configured && statuses[0].in_fan_out);
        assert!(!statuses[1].configured && !statuses[1].in_fan_out);
        assert!(!statuses[3].configured);
    }

    #[test]
    fn test_identity_never_in_fan_out() {
        let statuses = source_statuses(&config(
            "[identity]\n[code_repo]\nrepository = \"acme/handbook\"\n",
        ));
        let code = &statuses[2];
        assert!(code.in_fan_out);
        assert_eq!(code.target, "acme/handbook@main");
        assert!(statuses[3].configured && !statuses[3].in_fan_out);
    }
}
