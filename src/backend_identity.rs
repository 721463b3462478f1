//! Identity-lookup backend.
//!
//! Resolves 8-digit person numbers (DNI) and 11-digit taxpayer numbers (RUC)
//! against a rate-limited external API. Records are fetched on demand and
//! never cached or stored.
//!
//! | Key | Request |
//! |-----|---------|
//! | person | `GET {base}/v2/reniec/dni?numero=<8 digits>` |
//! | organization | `GET {base}/v2/sunat/ruc?numero=<11 digits>` |
//!
//! Each lookup issues exactly one request and never retries.

use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;
use std::time::Duration;

use crate::config::{resolve_token, IdentityConfig};
use crate::error::{BackendError, BackendResult};
use crate::http_client::LazyClient;
use crate::models::{BackendKind, Hit, IdentityKind};
use crate::traits::IdentityLookup;

pub struct IdentityAdapter {
    base_url: String,
    http: LazyClient,
}

/// Person record. Every field is required; a body missing one is rejected
/// instead of being shown half-filled.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PersonRecord {
    numero_documento: String,
    nombres: String,
    apellido_paterno: String,
    apellido_materno: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrganizationRecord {
    numero_documento: String,
    razon_social: String,
    #[serde(default)]
    estado: Option<String>,
    #[serde(default)]
    condicion: Option<String>,
    #[serde(default)]
    direccion: Option<String>,
}

impl IdentityAdapter {
    pub fn new(base_url: impl Into<String>, token: Option<String>, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http: LazyClient::new(BackendKind::IdentityLookup, token, timeout),
        }
    }

    pub fn from_config(config: &IdentityConfig) -> Self {
        Self::new(
            &config.base_url,
            resolve_token("identity", &config.token_env),
            Duration::from_secs(config.timeout_secs),
        )
    }

    fn endpoint(&self, kind: IdentityKind) -> String {
        match kind {
            IdentityKind::Person => format!("{}/v2/reniec/dni", self.base_url),
            IdentityKind::Organization => format!("{}/v2/sunat/ruc", self.base_url),
        }
    }
}

fn malformed(kind: IdentityKind) -> BackendError {
    BackendError::unavailable(
        BackendKind::IdentityLookup,
        format!("malformed {} record", kind.label()),
    )
}

fn person_hit(body: &str) -> BackendResult<Hit> {
    let rec: PersonRecord =
        serde_json::from_str(body).map_err(|_| malformed(IdentityKind::Person))?;
    if rec.numero_documento.trim().is_empty() || rec.nombres.trim().is_empty() {
        return Err(malformed(IdentityKind::Person));
    }
    let full_name = format!(
        "{} {} {}",
        rec.nombres.trim(),
        rec.apellido_paterno.trim(),
        rec.apellido_materno.trim()
    )
    .trim()
    .to_string();
    Ok(Hit {
        source: BackendKind::IdentityLookup,
        detail: format!(
            "DNI: {}\nNombres: {}\nApellido paterno: {}\nApellido materno: {}",
            rec.numero_documento, rec.nombres, rec.apellido_paterno, rec.apellido_materno
        ),
        title: full_name,
        link: None,
        native_id: None,
    })
}

fn organization_hit(body: &str) -> BackendResult<Hit> {
    let rec: OrganizationRecord =
        serde_json::from_str(body).map_err(|_| malformed(IdentityKind::Organization))?;
    if rec.numero_documento.trim().is_empty() || rec.razon_social.trim().is_empty() {
        return Err(malformed(IdentityKind::Organization));
    }
    let mut lines = vec![
        format!("RUC: {}", rec.numero_documento),
        format!("Razón social: {}", rec.razon_social),
    ];
    for (title, value) in [
        ("Estado", &rec.estado),
        ("Condición", &rec.condicion),
        ("Dirección", &rec.direccion),
    ] {
        if let Some(v) = value.as_deref().filter(|v| !v.trim().is_empty()) {
            lines.push(format!("{}: {}", title, v));
        }
    }
    Ok(Hit {
        source: BackendKind::IdentityLookup,
        title: rec.razon_social.clone(),
        detail: lines.join("\n"),
        link: None,
        native_id: None,
    })
}

#[async_trait]
impl IdentityLookup for IdentityAdapter {
    async fn lookup(&self, kind: IdentityKind, key: &str) -> BackendResult<Hit> {
        let key = key.trim();
        if !kind.accepts(key) {
            return Err(BackendError::Invalid(format!(
                "{} must be exactly {} digits",
                kind.label(),
                kind.key_len()
            )));
        }

        let req = self
            .http
            .request(Method::GET, &self.endpoint(kind))?
            .header("Accept", "application/json")
            .query(&[("numero", key)]);
        let resp = self.http.send(req).await?;

        match resp.status().as_u16() {
            200 => {}
            404 => return Err(BackendError::NotFound),
            code => {
                return Err(BackendError::unavailable(
                    BackendKind::IdentityLookup,
                    format!("{} lookup returned status {}", kind.label(), code),
                ))
            }
        }

        let body = resp
            .text()
            .await
            .map_err(|e| BackendError::from_transport(BackendKind::IdentityLookup, e))?;

        match kind {
            IdentityKind::Person => person_hit(&body),
            IdentityKind::Organization => organization_hit(&body),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_person_hit() {
        let hit = person_hit(
            r#"{"nombres":"ANA MARIA","apellidoPaterno":"QUISPE","apellidoMaterno":"ROJAS","numeroDocumento":"12345678","tipoDocumento":"1"}"#,
        )
        .unwrap();
        assert_eq!(hit.title, "ANA MARIA QUISPE ROJAS");
        assert!(hit.detail.starts_with("DNI: 12345678\n"));
    }

    #[test]
    fn test_person_missing_field_is_rejected() {
        let err = person_hit(r#"{"nombres":"ANA","numeroDocumento":"12345678"}"#).unwrap_err();
        assert!(matches!(err, BackendError::Unavailable { .. }));
    }

    #[test]
    fn test_organization_hit_skips_blank_optionals() {
        let hit = organization_hit(
            r#"{"razonSocial":"ACME SAC","numeroDocumento":"20123456789","estado":"ACTIVO","condicion":"","direccion":null}"#,
        )
        .unwrap();
        assert_eq!(hit.title, "ACME SAC");
        assert_eq!(
            hit.detail,
            "RUC: 20123456789\nRazón social: ACME SAC\nEstado: ACTIVO"
        );
    }

    #[tokio::test]
    async fn test_invalid_key_never_reaches_network() {
        // Unroutable base: reaching the network would surface as Unavailable.
        let adapter = IdentityAdapter::new("http://127.0.0.1:9", None, Duration::from_secs(1));
        for (kind, key) in [
            (IdentityKind::Person, "1234567"),
            (IdentityKind::Person, "123456789"),
            (IdentityKind::Person, "12a45678"),
            (IdentityKind::Organization, "12345678"),
        ] {
            let err = adapter.lookup(kind, key).await.unwrap_err();
            assert!(matches!(err, BackendError::Invalid(_)), "{kind:?} {key}");
        }
    }
}
