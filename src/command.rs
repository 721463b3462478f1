//! Command parsing and argument validation.
//!
//! Turns one inbound chat message into a [`Command`]. Everything that can be
//! checked without a backend is checked here (arity, digit-length, empty
//! arguments), so malformed input never reaches the gate or an adapter.
//!
//! # Surface
//!
//! | Command | Aliases | Access |
//! |---------|---------|--------|
//! | `search <term>` | `buscar`, any plain text | member |
//! | `lookup-person <8 digits>` | `dni` | member |
//! | `lookup-org <11 digits>` | `ruc` | member |
//! | `register <field>...` | `registrar` | member |
//! | `broadcast <message>` | `anuncio` | admin |
//! | `whoami` | `id` | public |
//! | `help` | `start` | public |
//!
//! A leading `/` and a trailing `@botname` on the command word are
//! stripped. Aliases only apply to slash commands; unprefixed text is a
//! command only when its first word is a canonical name, and a search
//! otherwise.

use crate::gate::AccessLevel;
use crate::models::IdentityKind;

/// Longest accepted search term, in characters.
pub const MAX_TERM_CHARS: usize = 200;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Search { term: String },
    Lookup { kind: IdentityKind, key: String },
    Register { fields: Vec<String> },
    Broadcast { message: String },
    WhoAmI,
    Help,
}

impl Command {
    /// Canonical operation name, as recorded in the audit log.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Search { .. } => "search",
            Command::Lookup {
                kind: IdentityKind::Person,
                ..
            } => "lookup-person",
            Command::Lookup {
                kind: IdentityKind::Organization,
                ..
            } => "lookup-org",
            Command::Register { .. } => "register",
            Command::Broadcast { .. } => "broadcast",
            Command::WhoAmI => "whoami",
            Command::Help => "help",
        }
    }

    pub fn access_level(&self) -> AccessLevel {
        match self {
            Command::Search { .. } | Command::Lookup { .. } | Command::Register { .. } => {
                AccessLevel::Member
            }
            Command::Broadcast { .. } => AccessLevel::Admin,
            Command::WhoAmI | Command::Help => AccessLevel::Public,
        }
    }

    /// Argument text recorded in the audit log.
    pub fn query_text(&self) -> String {
        match self {
            Command::Search { term } => term.clone(),
            Command::Lookup { key, .. } => key.clone(),
            Command::Register { fields } => fields.join(" | "),
            Command::Broadcast { message } => message.clone(),
            Command::WhoAmI | Command::Help => String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("message cannot be empty")]
    Empty,
    #[error("unknown command: /{0}")]
    UnknownCommand(String),
    #[error("missing argument. Usage: {usage}")]
    MissingArgument { usage: &'static str },
    #[error("{label} must be exactly {len} digits. Usage: {usage}")]
    BadKey {
        label: &'static str,
        len: usize,
        usage: &'static str,
    },
    #[error("register expects {expected} fields, got {got}. Usage: {usage}")]
    Arity {
        expected: usize,
        got: usize,
        usage: &'static str,
    },
    #[error("search term exceeds maximum length of {0} characters")]
    TooLong(usize),
}

const USAGE_SEARCH: &str = "/search <term>";
const USAGE_PERSON: &str = "/lookup-person <8-digit DNI>";
const USAGE_ORG: &str = "/lookup-org <11-digit RUC>";
const USAGE_REGISTER: &str = "/register <field> | <field> | ...";
const USAGE_BROADCAST: &str = "/broadcast <message>";

enum Verb {
    Search,
    Person,
    Org,
    Register,
    Broadcast,
    WhoAmI,
    Help,
}

fn canonical_verb(word: &str) -> Option<Verb> {
    match word {
        "search" => Some(Verb::Search),
        "lookup-person" => Some(Verb::Person),
        "lookup-org" => Some(Verb::Org),
        "register" => Some(Verb::Register),
        "broadcast" => Some(Verb::Broadcast),
        "whoami" => Some(Verb::WhoAmI),
        "help" => Some(Verb::Help),
        _ => None,
    }
}

impl Verb {
    fn writes(&self) -> bool {
        matches!(self, Verb::Register | Verb::Broadcast)
    }
}

fn alias_verb(word: &str) -> Option<Verb> {
    match word {
        "buscar" => Some(Verb::Search),
        "dni" | "lookup_person" => Some(Verb::Person),
        "ruc" | "lookup_org" => Some(Verb::Org),
        "registrar" => Some(Verb::Register),
        "anuncio" => Some(Verb::Broadcast),
        "id" => Some(Verb::WhoAmI),
        "start" => Some(Verb::Help),
        _ => None,
    }
}

/// Split off the first whitespace-delimited word.
fn split_word(text: &str) -> (&str, &str) {
    match text.find(char::is_whitespace) {
        Some(i) => (&text[..i], text[i..].trim()),
        None => (text, ""),
    }
}

/// Parse one inbound message.
///
/// `register_arity`, when set, is the exact number of fields `register`
/// must receive.
pub fn parse(text: &str, register_arity: Option<usize>) -> Result<Command, ParseError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(ParseError::Empty);
    }

    let (word, rest) = split_word(text);
    let verb = if let Some(slashed) = word.strip_prefix('/') {
        let name = slashed.split('@').next().unwrap_or_default().to_lowercase();
        match canonical_verb(&name).or_else(|| alias_verb(&name)) {
            Some(v) => v,
            None => return Err(ParseError::UnknownCommand(name)),
        }
    } else {
        // Without a slash only read-only verbs are recognised.
        match canonical_verb(&word.to_lowercase()) {
            Some(v) if !v.writes() => v,
            _ => return search(text),
        }
    };

    match verb {
        Verb::Search => search(rest),
        Verb::Person => lookup(IdentityKind::Person, rest, USAGE_PERSON),
        Verb::Org => lookup(IdentityKind::Organization, rest, USAGE_ORG),
        Verb::Register => register(rest, register_arity),
        Verb::Broadcast => {
            if rest.is_empty() {
                Err(ParseError::MissingArgument {
                    usage: USAGE_BROADCAST,
                })
            } else {
                Ok(Command::Broadcast {
                    message: rest.to_string(),
                })
            }
        }
        Verb::WhoAmI => Ok(Command::WhoAmI),
        Verb::Help => Ok(Command::Help),
    }
}

fn search(term: &str) -> Result<Command, ParseError> {
    let term = term.trim();
    if term.is_empty() {
        return Err(ParseError::MissingArgument {
            usage: USAGE_SEARCH,
        });
    }
    if term.chars().count() > MAX_TERM_CHARS {
        return Err(ParseError::TooLong(MAX_TERM_CHARS));
    }
    Ok(Command::Search {
        term: term.to_lowercase(),
    })
}

fn lookup(kind: IdentityKind, rest: &str, usage: &'static str) -> Result<Command, ParseError> {
    let args: Vec<&str> = rest.split_whitespace().collect();
    match args.as_slice() {
        [] => Err(ParseError::MissingArgument { usage }),
        [key] if kind.accepts(key) => Ok(Command::Lookup {
            kind,
            key: key.to_string(),
        }),
        _ => Err(ParseError::BadKey {
            label: kind.label(),
            len: kind.key_len(),
            usage,
        }),
    }
}

/// Fields are split on `|` when present, otherwise on whitespace.
pub fn split_fields(rest: &str) -> Vec<String> {
    if rest.contains('|') {
        rest.split('|').map(|f| f.trim().to_string()).collect()
    } else {
        rest.split_whitespace().map(str::to_string).collect()
    }
}

fn register(rest: &str, arity: Option<usize>) -> Result<Command, ParseError> {
    let fields = split_fields(rest);
    if fields.iter().all(|f| f.is_empty()) {
        return Err(ParseError::MissingArgument {
            usage: USAGE_REGISTER,
        });
    }
    if let Some(expected) = arity {
        if fields.len() != expected {
            return Err(ParseError::Arity {
                expected,
                got: fields.len(),
                usage: USAGE_REGISTER,
            });
        }
    }
    Ok(Command::Register { fields })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(text: &str) -> Result<Command, ParseError> {
        parse(text, None)
    }

    #[test]
    fn test_plain_text_is_search() {
        assert_eq!(
            p("  Informe Anual ").unwrap(),
            Command::Search {
                term: "informe anual".into()
            }
        );
    }

    #[test]
    fn test_canonical_names_without_slash() {
        assert_eq!(p("search report").unwrap(), Command::Search { term: "report".into() });
        assert_eq!(p("whoami").unwrap(), Command::WhoAmI);
        // Aliases need the slash.
        assert_eq!(p("id").unwrap(), Command::Search { term: "id".into() });
    }

    #[test]
    fn test_slash_aliases_and_bot_suffix() {
        assert_eq!(p("/start").unwrap(), Command::Help);
        assert_eq!(p("/id@desk_bot").unwrap(), Command::WhoAmI);
        assert_eq!(
            p("/DNI 12345678").unwrap(),
            Command::Lookup {
                kind: IdentityKind::Person,
                key: "12345678".into()
            }
        );
        assert_eq!(
            p("/ruc 20123456789").unwrap().name(),
            "lookup-org"
        );
    }

    #[test]
    fn test_unknown_slash_command() {
        assert_eq!(p("/frobnicate x"), Err(ParseError::UnknownCommand("frobnicate".into())));
    }

    #[test]
    fn test_lookup_key_validation() {
        assert!(matches!(p("lookup-person 1234567"), Err(ParseError::BadKey { len: 8, .. })));
        assert!(matches!(p("lookup-person 12345678 9"), Err(ParseError::BadKey { .. })));
        assert!(matches!(p("lookup-org 12345678"), Err(ParseError::BadKey { len: 11, .. })));
        assert!(matches!(p("lookup-org"), Err(ParseError::MissingArgument { .. })));
    }

    #[test]
    fn test_register_fields() {
        assert_eq!(
            p("/register Ana Maria | 123 | ").unwrap(),
            Command::Register {
                fields: vec!["Ana Maria".into(), "123".into(), "".into()]
            }
        );
        assert_eq!(
            p("/registrar ana 123").unwrap(),
            Command::Register {
                fields: vec!["ana".into(), "123".into()]
            }
        );
        assert!(matches!(p("/register | |"), Err(ParseError::MissingArgument { .. })));
    }

    #[test]
    fn test_register_arity() {
        assert!(matches!(
            parse("/register a b c", Some(2)),
            Err(ParseError::Arity { expected: 2, got: 3, .. })
        ));
        assert!(parse("/register a b", Some(2)).is_ok());
    }

    #[test]
    fn test_unprefixed_write_verbs_are_searches() {
        assert_eq!(
            p("register ana 123").unwrap(),
            Command::Search {
                term: "register ana 123".into()
            }
        );
        assert_eq!(
            p("Broadcast plan").unwrap(),
            Command::Search {
                term: "broadcast plan".into()
            }
        );
        assert_eq!(p("help").unwrap(), Command::Help);
    }

    #[test]
    fn test_broadcast_keeps_message() {
        assert_eq!(
            p("/anuncio Hola a todos\nmañana no hay servicio").unwrap(),
            Command::Broadcast {
                message: "Hola a todos\nmañana no hay servicio".into()
            }
        );
        assert!(p("/broadcast").is_err());
    }

    #[test]
    fn test_empty_and_too_long() {
        assert_eq!(p("   "), Err(ParseError::Empty));
        let long = "x".repeat(MAX_TERM_CHARS + 1);
        assert_eq!(p(&long), Err(ParseError::TooLong(MAX_TERM_CHARS)));
    }

    #[test]
    fn test_access_levels() {
        assert_eq!(p("help").unwrap().access_level(), AccessLevel::Public);
        assert_eq!(p("search x").unwrap().access_level(), AccessLevel::Member);
        assert_eq!(p("/broadcast x").unwrap().access_level(), AccessLevel::Admin);
    }
}
