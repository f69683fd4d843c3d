// src/atom.rs

//! Dependency specifier parsing
//!
//! A specifier names a package key and optionally narrows it:
//!
//! ```text
//! [!][op]category/name[-version][*][#tag][~revision][:slot][@repo[,repo...]]
//! ```
//!
//! Examples:
//! - `app/foo` - any version of app/foo
//! - `>=app/foo-1.1` - version 1.1 or newer
//! - `~app/foo-1.0` - any `-rN` release of 1.0
//! - `=app/foo-1.*` - versions starting with "1."
//! - `app/kmod-2.0#5.10.0~3:0@main,extra` - tagged, revision-pinned, slotted,
//!   restricted to two repositories
//! - `!app/bar` - conflict specifier

use crate::error::{Error, Result};
use crate::version::{Version, VersionConstraint};
use portage_atom::Cpv;
use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

const OPERATORS: [&str; 6] = [">=", "<=", ">", "<", "=", "~"];

/// A parsed, immutable dependency specifier
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Specifier {
    text: String,
    key: String,
    slot: Option<String>,
    tag: Option<String>,
    revision: Option<u32>,
    repositories: Option<Vec<String>>,
    constraint: VersionConstraint,
    negated: bool,
}

impl Specifier {
    /// Parse a specifier string
    pub fn parse(s: &str) -> Result<Self> {
        let text = s.trim();
        if text.is_empty() {
            return Err(Error::invalid_spec(s, "empty specifier"));
        }

        let (negated, rest) = match text.strip_prefix('!') {
            Some(rest) => (true, rest),
            None => (false, text),
        };

        let (op, mut rest) = OPERATORS
            .iter()
            .find_map(|op| rest.strip_prefix(op).map(|r| (*op, r)))
            .unwrap_or(("", rest));

        let repositories = match rest.rfind('@') {
            Some(at_pos) => {
                let repos: Vec<String> = rest[at_pos + 1..]
                    .split(',')
                    .map(|r| r.trim().to_string())
                    .collect();
                if repos.iter().any(|r| r.is_empty()) {
                    return Err(Error::invalid_spec(s, "empty repository name"));
                }
                rest = &rest[..at_pos];
                Some(repos)
            }
            None => None,
        };

        let slot = take_suffix(&mut rest, ':', s, "slot")?;

        let revision = match take_suffix(&mut rest, '~', s, "revision")? {
            Some(digits) => Some(digits.parse::<u32>().map_err(|_| {
                Error::invalid_spec(s, format!("revision '{}' is not a number", digits))
            })?),
            None => None,
        };

        let tag = take_suffix(&mut rest, '#', s, "tag")?;

        let (key, version) = split_key_version(rest, s)?;

        let constraint = match (op, version) {
            ("", None) => VersionConstraint::Any,
            (op, None) => {
                return Err(Error::invalid_spec(
                    s,
                    format!("operator '{}' requires a version", op),
                ));
            }
            (op, Some(version)) => VersionConstraint::from_operator(op, version)?,
        };

        Ok(Self {
            text: text.to_string(),
            key: key.to_string(),
            slot,
            tag,
            revision,
            repositories,
            constraint,
            negated,
        })
    }

    /// Specifier selecting any version of `key` in `slot`
    pub fn for_key_slot(key: &str, slot: &str) -> Result<Self> {
        Self::parse(&format!("{}:{}", key, slot))
    }

    /// The category/name pair
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn slot(&self) -> Option<&str> {
        self.slot.as_deref()
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    pub fn revision(&self) -> Option<u32> {
        self.revision
    }

    /// Repositories this specifier may be resolved from (None = all)
    pub fn repositories(&self) -> Option<&[String]> {
        self.repositories.as_deref()
    }

    pub fn constraint(&self) -> &VersionConstraint {
        &self.constraint
    }

    /// Whether this is a conflict (`!`) specifier
    pub fn is_negated(&self) -> bool {
        self.negated
    }

    /// The same specifier with its leading `!` removed
    pub fn without_negation(&self) -> Self {
        let mut positive = self.clone();
        if positive.negated {
            positive.negated = false;
            positive.text = positive.text[1..].to_string();
        }
        positive
    }

    /// Whether the specifier allows searching the named repository
    pub fn allows_repository(&self, repository: &str) -> bool {
        match &self.repositories {
            Some(repos) => repos.iter().any(|r| r == repository),
            None => true,
        }
    }

    /// The original specifier text
    pub fn as_str(&self) -> &str {
        &self.text
    }
}

impl fmt::Display for Specifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.text)
    }
}

impl Serialize for Specifier {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.text)
    }
}

impl FromStr for Specifier {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Split off the text after the last `sep`, requiring it to be non-empty
fn take_suffix(rest: &mut &str, sep: char, spec: &str, what: &str) -> Result<Option<String>> {
    let Some(pos) = rest.rfind(sep) else {
        return Ok(None);
    };
    // Separators inside the category part belong to the key and are invalid anyway
    if rest[..pos].find('/').is_none() {
        return Err(Error::invalid_spec(spec, format!("misplaced {} separator", what)));
    }
    let value = &rest[pos + 1..];
    if value.is_empty() {
        return Err(Error::invalid_spec(spec, format!("empty {}", what)));
    }
    let value = value.to_string();
    *rest = &rest[..pos];
    Ok(Some(value))
}

/// Split `category/name[-version]` into the key and the optional version
fn split_key_version<'a>(s: &'a str, spec: &str) -> Result<(&'a str, Option<&'a str>)> {
    let slash = s
        .find('/')
        .ok_or_else(|| Error::invalid_spec(spec, "missing category"))?;
    if slash == 0 || s[slash + 1..].contains('/') {
        return Err(Error::invalid_spec(spec, "key must be category/name"));
    }

    let name_start = slash + 1;
    let name = &s[name_start..];
    for (i, _) in name.match_indices('-') {
        let candidate = &name[i + 1..];
        if !candidate.starts_with(|c: char| c.is_ascii_digit()) {
            continue;
        }
        let bare = candidate.strip_suffix('*').unwrap_or(candidate);
        let parses = bare.ends_with('.') && Version::parse(bare.trim_end_matches('.')).is_ok()
            || Version::parse(bare).is_ok();
        if parses {
            let key = &s[..name_start + i];
            check_key(key, spec)?;
            return Ok((key, Some(candidate)));
        }
    }

    if name.is_empty() {
        return Err(Error::invalid_spec(spec, "empty package name"));
    }
    check_key(s, spec)?;
    Ok((s, None))
}

/// Validate `category/name` against the PMS naming rules
fn check_key(key: &str, spec: &str) -> Result<()> {
    let cpv = Cpv::parse(&format!("{}-0", key))
        .map_err(|e| Error::invalid_spec(spec, e.to_string()))?;
    if !key.ends_with(&format!("/{}", cpv.cpn.package)) {
        return Err(Error::invalid_spec(spec, "key must be category/name"));
    }
    Ok(())
}
