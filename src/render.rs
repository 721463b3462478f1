//! Reply rendering.
//!
//! The one place where structured results become chat text. Adapters shape
//! their own [`Hit::detail`]; everything here is backend-agnostic.

use crate::aggregate::{FanOut, FanOutOutcome};
use crate::models::{Actor, Hit, IdentityKind};

/// What a command produced, before it is turned into text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Help,
    WhoAmI(Actor),
    Search(FanOut),
    Found(Hit),
    NotFound { kind: IdentityKind, key: String },
    Registered { fields: Vec<String> },
    Broadcast { attempted: usize, delivered: usize },
    Denied { actor_id: String },
    Invalid(String),
    /// The named service could not be reached.
    Unavailable(String),
    WriteFailed,
}

pub const HELP_TEXT: &str = "\
Available commands:
/search <term> - search every source (plain text works too)
/lookup-person <8-digit DNI> - look up a person
/lookup-org <11-digit RUC> - look up an organization
/register <field> | <field> | ... - add a record
/broadcast <message> - message every registered user (admins only)
/whoami - show your id
/help - show this message";

/// Render a response as one or more chat messages.
pub fn render(response: &Response) -> Vec<String> {
    match response {
        Response::Help => vec![HELP_TEXT.to_string()],
        Response::WhoAmI(actor) => vec![render_actor(actor)],
        Response::Search(fan_out) => render_search(fan_out),
        Response::Found(hit) => vec![render_hit(hit)],
        Response::NotFound { kind, key } => {
            vec![format!("No {} record found for {}.", kind.label(), key)]
        }
        Response::Registered { fields } => {
            vec![format!("Record registered: {}", fields.join(" | "))]
        }
        Response::Broadcast {
            attempted,
            delivered,
        } => vec![format!(
            "Broadcast sent to {} of {} registered users.",
            delivered, attempted
        )],
        Response::Denied { actor_id } => vec![format!(
            "Access denied. Your id is {}. Ask an administrator to register it.",
            actor_id
        )],
        Response::Invalid(message) => vec![message.clone()],
        Response::Unavailable(what) => vec![format!(
            "{} is unavailable right now. Please try again later.",
            what
        )],
        Response::WriteFailed => {
            vec!["The record could not be saved. Nothing was written.".to_string()]
        }
    }
}

fn render_actor(actor: &Actor) -> String {
    let mut lines = vec![format!("Your id: {}", actor.id)];
    if !actor.name.is_empty() {
        lines.push(format!("Name: {}", actor.name));
    }
    if let Some(handle) = actor.handle.as_deref().filter(|h| !h.is_empty()) {
        lines.push(format!("Username: @{}", handle.trim_start_matches('@')));
    }
    lines.join("\n")
}

/// Title (unless the detail already shows it), detail, then link.
pub fn render_hit(hit: &Hit) -> String {
    let mut lines = Vec::new();
    if !hit.title.is_empty() && !hit.detail.contains(&hit.title) {
        lines.push(hit.title.clone());
    }
    if !hit.detail.is_empty() {
        lines.push(hit.detail.clone());
    }
    if let Some(link) = &hit.link {
        lines.push(link.clone());
    }
    lines.join("\n")
}

fn match_header(total: usize, shown: usize) -> String {
    let noun = if total == 1 { "match" } else { "matches" };
    if total > shown {
        format!("Found {} {} (showing {}).", total, noun, shown)
    } else {
        format!("Found {} {}.", total, noun)
    }
}

fn unreachable_note(fan_out: &FanOut) -> Option<String> {
    let down = fan_out.unreachable();
    if down.is_empty() {
        return None;
    }
    let names: Vec<&str> = down.iter().map(|k| k.as_str()).collect();
    Some(format!(
        "Some sources could not be searched: {}.",
        names.join(", ")
    ))
}

fn render_search(fan_out: &FanOut) -> Vec<String> {
    let down = fan_out.unreachable();
    match &fan_out.outcome {
        FanOutOutcome::NoMatches if fan_out.backends.is_empty() => {
            vec!["No search sources are configured.".to_string()]
        }
        FanOutOutcome::NoMatches if down.len() == fan_out.backends.len() => {
            vec!["Search is unavailable right now. Please try again later.".to_string()]
        }
        FanOutOutcome::NoMatches => {
            let mut out = vec!["No matches found.".to_string()];
            out.extend(unreachable_note(fan_out));
            out
        }
        FanOutOutcome::Matches(hits) => {
            let mut out = Vec::with_capacity(hits.len() + 2);
            out.push(match_header(fan_out.total_matches(), hits.len()));
            out.extend(hits.iter().map(render_hit));
            out.extend(unreachable_note(fan_out));
            out
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::BackendReport;
    use crate::models::BackendKind;

    fn report(kind: BackendKind, reachable: bool, matched: usize, returned: usize) -> BackendReport {
        BackendReport {
            kind,
            reachable,
            matched,
            returned,
            error: (!reachable).then(|| "down".to_string()),
        }
    }

    fn tabular_hit() -> Hit {
        Hit {
            source: BackendKind::Tabular,
            title: "Ana".into(),
            detail: "Nombre: Ana\nCodigo: 123".into(),
            link: None,
            native_id: None,
        }
    }

    #[test]
    fn test_search_header_and_rows() {
        let fan_out = FanOut {
            outcome: FanOutOutcome::Matches(vec![tabular_hit()]),
            backends: vec![report(BackendKind::Tabular, true, 4, 1)],
        };
        let msgs = render(&Response::Search(fan_out));
        assert_eq!(msgs[0], "Found 4 matches (showing 1).");
        assert_eq!(msgs[1], "Nombre: Ana\nCodigo: 123");
        assert_eq!(msgs.len(), 2);
    }

    #[test]
    fn test_no_match_differs_from_unavailable() {
        let none = FanOut {
            outcome: FanOutOutcome::NoMatches,
            backends: vec![
                report(BackendKind::Tabular, true, 0, 0),
                report(BackendKind::CodeRepo, false, 0, 0),
            ],
        };
        let msgs = render(&Response::Search(none));
        assert_eq!(msgs[0], "No matches found.");
        assert_eq!(msgs[1], "Some sources could not be searched: code_repo.");

        let down = FanOut {
            outcome: FanOutOutcome::NoMatches,
            backends: vec![report(BackendKind::Tabular, false, 0, 0)],
        };
        assert!(render(&Response::Search(down))[0].starts_with("Search is unavailable"));
    }

    #[test]
    fn test_hit_with_link_shows_title_once() {
        let hit = Hit {
            source: BackendKind::FileStore,
            title: "Informe.pdf".into(),
            detail: "Informe.pdf (PDF)".into(),
            link: Some("https://files.example/1".into()),
            native_id: Some("1".into()),
        };
        assert_eq!(
            render_hit(&hit),
            "Informe.pdf (PDF)\nhttps://files.example/1"
        );

        let person = Hit {
            source: BackendKind::IdentityLookup,
            title: "ANA PEREZ ROJAS".into(),
            detail: "DNI: 12345678".into(),
            link: None,
            native_id: None,
        };
        assert_eq!(render_hit(&person), "ANA PEREZ ROJAS\nDNI: 12345678");
    }

    #[test]
    fn test_denied_carries_own_id() {
        let msgs = render(&Response::Denied {
            actor_id: "999".into(),
        });
        assert!(msgs[0].contains("999"));
    }

    #[test]
    fn test_whoami() {
        let actor = Actor::new("42").named("Ana").with_handle("@ana");
        assert_eq!(
            render(&Response::WhoAmI(actor))[0],
            "Your id: 42\nName: Ana\nUsername: @ana"
        );
    }
}
