use core::fmt;
use std::collections::HashMap;

use nom::{
    branch::alt,
    bytes::complete::{escaped_transform, is_not, tag},
    character::complete::{char, digit1, one_of},
    combinator::{all_consuming, map, map_res, opt, peek, recognize, rest, value},
    sequence::{delimited, pair, preceded, separated_pair, terminated},
    IResult,
};

use crate::error::{FlagsyncError, FlagsyncResult};

/// Storage key of the null scope.
pub const NULL_SCOPE_KEY: &str = "__null__";

/// An identifier a feature value can be stored against.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Identity {
    /// A bare string such as an email address. The empty string is a valid
    /// identity and is distinct from the null scope.
    Str(String),
    Int(i64),
    /// A typed entity, serialized as `kind|id`.
    Model { kind: String, id: String },
}

impl Identity {
    pub fn model(kind: impl Into<String>, id: impl ToString) -> Self {
        Identity::Model {
            kind: kind.into(),
            id: id.to_string(),
        }
    }
}

impl From<&str> for Identity {
    fn from(value: &str) -> Self {
        Identity::Str(value.to_string())
    }
}

impl From<String> for Identity {
    fn from(value: String) -> Self {
        Identity::Str(value)
    }
}

impl From<i64> for Identity {
    fn from(value: i64) -> Self {
        Identity::Int(value)
    }
}

/// The partition a feature value is resolved and stored against.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum Scope {
    /// No specific actor. Values live in the session only.
    #[default]
    Null,
    Identity(Identity),
    /// Whoever is authenticated for the current session. Drivers resolve this
    /// against their [`RequestContext`](crate::context::RequestContext) before
    /// doing anything else.
    CurrentActor,
}

impl Scope {
    /// Build a scope from anything that knows how to identify itself.
    pub fn of(scopeable: &impl FeatureScopeable) -> Self {
        scopeable.to_feature_identifier()
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Scope::Null)
    }

    /// Serialized key using the default serializer (no morph map).
    pub fn key(&self) -> String {
        ScopeSerializer::default().serialize(self)
    }
}

impl From<Identity> for Scope {
    fn from(value: Identity) -> Self {
        Scope::Identity(value)
    }
}

impl From<&str> for Scope {
    fn from(value: &str) -> Self {
        Scope::Identity(value.into())
    }
}

impl From<String> for Scope {
    fn from(value: String) -> Self {
        Scope::Identity(value.into())
    }
}

impl From<i64> for Scope {
    fn from(value: i64) -> Self {
        Scope::Identity(value.into())
    }
}

impl<T: Into<Scope>> From<Option<T>> for Scope {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Scope::Null)
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Null => write!(f, "{}", NULL_SCOPE_KEY),
            Scope::Identity(identity) => {
                write!(f, "{}", ScopeSerializer::default().identity_key(identity))
            }
            Scope::CurrentActor => write!(f, "current actor"),
        }
    }
}

/// Implemented by domain types that can act as a feature scope.
pub trait FeatureScopeable {
    fn to_feature_identifier(&self) -> Scope;
}

/// Turns scopes into deterministic storage keys and back.
///
/// Bare strings are escaped so they never contain an unescaped `|`, which
/// keeps them apart from `kind|id` model keys. Strings that would otherwise
/// start like the null or integer keys get a leading `\`.
#[derive(Debug, Clone, Default)]
pub struct ScopeSerializer {
    morph_map: HashMap<String, String>,
}

impl ScopeSerializer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serialize model kinds under a short alias, e.g. `App\Models\User` as `user`.
    pub fn with_morph_map(morph_map: HashMap<String, String>) -> Self {
        Self { morph_map }
    }

    pub fn serialize(&self, scope: &Scope) -> String {
        match scope {
            // Unresolved current-actor scopes have no identity to key on.
            Scope::Null | Scope::CurrentActor => NULL_SCOPE_KEY.to_string(),
            Scope::Identity(identity) => self.identity_key(identity),
        }
    }

    pub fn identity_key(&self, identity: &Identity) -> String {
        match identity {
            Identity::Str(s) => {
                let escaped = escape(s);
                if escaped.starts_with("__") || escaped.starts_with('#') {
                    format!("\\{}", escaped)
                } else {
                    escaped
                }
            }
            Identity::Int(n) => format!("#{}", n),
            Identity::Model { kind, id } => {
                let kind = self.morph_map.get(kind).unwrap_or(kind);
                format!("{}|{}", escape(kind), id)
            }
        }
    }

    /// Decode a storage key produced by [`ScopeSerializer::serialize`].
    pub fn deserialize(&self, key: &str) -> FlagsyncResult<Scope> {
        let (_, scope) = parse_scope_key(key)
            .map_err(|e| FlagsyncError::InvalidScope(format!("{}: {}", key, e)))?;
        Ok(match scope {
            Scope::Identity(Identity::Model { kind, id }) => {
                let kind = self
                    .morph_map
                    .iter()
                    .find(|(_, alias)| **alias == kind)
                    .map(|(original, _)| original.clone())
                    .unwrap_or(kind);
                Scope::Identity(Identity::Model { kind, id })
            }
            other => other,
        })
    }
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        if ch == '\\' || ch == '|' {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

fn escaped_text(i: &str) -> IResult<&str, String> {
    map(
        opt(escaped_transform(
            is_not("\\|"),
            '\\',
            alt((value("\\", tag("\\")), value("|", tag("|")))),
        )),
        Option::unwrap_or_default,
    )(i)
}

fn parse_int(i: &str) -> IResult<&str, i64> {
    map_res(recognize(pair(opt(char('-')), digit1)), |n: &str| {
        n.parse::<i64>()
    })(i)
}

fn null_key(i: &str) -> IResult<&str, Scope> {
    value(Scope::Null, tag(NULL_SCOPE_KEY))(i)
}

fn int_key(i: &str) -> IResult<&str, Scope> {
    map(preceded(char('#'), parse_int), |n| {
        Scope::Identity(Identity::Int(n))
    })(i)
}

fn model_key(i: &str) -> IResult<&str, Scope> {
    map(separated_pair(escaped_text, char('|'), rest), |(kind, id)| {
        Scope::Identity(Identity::Model {
            kind,
            id: id.to_string(),
        })
    })(i)
}

fn string_key(i: &str) -> IResult<&str, Scope> {
    let prefix = opt(terminated(char('\\'), peek(one_of("_#"))));
    map(preceded(prefix, escaped_text), |s| {
        Scope::Identity(Identity::Str(s))
    })(i)
}

fn parse_scope_key(i: &str) -> IResult<&str, Scope> {
    alt((
        all_consuming(null_key),
        all_consuming(int_key),
        all_consuming(model_key),
        all_consuming(string_key),
    ))(i)
}

fn quoted(i: &str) -> IResult<&str, Scope> {
    map(
        delimited(char('"'), opt(is_not("\"")), char('"')),
        |s: Option<&str>| Scope::Identity(Identity::Str(s.unwrap_or_default().to_string())),
    )(i)
}

/// Parse a scope typed by a person: `null`, `"quoted string"`, or any
/// storage key (`#42`, `User|1`, `tim@example.com`).
pub fn parse_scope(input: &str) -> FlagsyncResult<Scope> {
    let input = input.trim();
    let parsed = alt((
        all_consuming(value(Scope::Null, tag("null"))),
        all_consuming(quoted),
        parse_scope_key,
    ))(input);
    match parsed {
        Ok((_, scope)) => Ok(scope),
        Err(e) => Err(FlagsyncError::InvalidScope(format!("{}: {}", input, e))),
    }
}
