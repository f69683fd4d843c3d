// src/version/mod.rs

//! Version handling and constraint satisfaction for package atoms
//!
//! Versions follow the PMS grammar
//! `N(.N)*[letter](_suffix[N])*[-rN]` where `suffix` is one of
//! `alpha`, `beta`, `pre`, `rc` or `p`; parsing and ordering are delegated
//! to [`portage_atom::Version`]. A package revision is further qualified by
//! an optional tag and an integer repository revision; the three together
//! form a [`VersionTriple`].

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// A parsed package version
#[derive(Debug, Clone)]
pub struct Version {
    text: String,
    inner: portage_atom::Version,
}

impl Version {
    /// Parse a bare version string
    ///
    /// Examples:
    /// - "1.2.3"
    /// - "1.2b"
    /// - "2.0_rc1_p3"
    /// - "1.0-r2"
    ///
    /// Operators and `*` wildcards belong to the specifier and are rejected.
    pub fn parse(s: &str) -> Result<Self> {
        if s.is_empty() {
            return Err(Error::malformed(s, "empty version"));
        }

        let inner =
            portage_atom::Version::parse(s).map_err(|e| Error::malformed(s, e.to_string()))?;
        if inner.op.is_some() || inner.glob {
            return Err(Error::malformed(s, "expected a bare version"));
        }

        Ok(Self {
            text: s.to_string(),
            inner,
        })
    }

    /// The original version text
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Whether both versions are equal once `-rN` is ignored
    pub fn same_base(&self, other: &Self) -> bool {
        self.inner.base() == other.inner.base()
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.inner.cmp(&other.inner)
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.text)
    }
}

/// Compare two version strings, failing on unparseable input
pub fn compare_versions(a: &str, b: &str) -> Result<Ordering> {
    Ok(Version::parse(a)?.cmp(&Version::parse(b)?))
}

/// A (version, tag, revision) triple identifying one package revision
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VersionTriple {
    pub version: String,
    pub tag: Option<String>,
    pub revision: u32,
}

impl VersionTriple {
    pub fn new(version: impl Into<String>, tag: Option<String>, revision: u32) -> Self {
        Self {
            version: version.into(),
            tag,
            revision,
        }
    }
}

impl fmt::Display for VersionTriple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.version)?;
        if let Some(ref tag) = self.tag {
            write!(f, "#{}", tag)?;
        }
        if self.revision > 0 {
            write!(f, "~{}", self.revision)?;
        }
        Ok(())
    }
}

/// Compare two triples of the same tag
///
/// Triples whose tags are both set and differ are not comparable and yield
/// [`Error::TagMismatch`]; use [`compare_cross_tag`] to order them anyway.
pub fn compare(a: &VersionTriple, b: &VersionTriple) -> Result<Ordering> {
    if let (Some(left), Some(right)) = (&a.tag, &b.tag) {
        if left != right {
            return Err(Error::TagMismatch {
                left: a.to_string(),
                right: b.to_string(),
            });
        }
    }

    Ok(compare_versions(&a.version, &b.version)?.then_with(|| a.revision.cmp(&b.revision)))
}

/// Compare two triples on version, then tag, then revision
///
/// A missing tag sorts below any tag; tags compare lexicographically.
pub fn compare_cross_tag(a: &VersionTriple, b: &VersionTriple) -> Result<Ordering> {
    Ok(compare_versions(&a.version, &b.version)?
        .then_with(|| a.tag.cmp(&b.tag))
        .then_with(|| a.revision.cmp(&b.revision)))
}

/// Version constraint carried by a specifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum VersionConstraint {
    /// Any version is acceptable
    #[default]
    Any,
    /// Exact version match (`=` or a bare versioned atom)
    Exact(String),
    /// String prefix match (`=cat/pkg-1.2*`)
    Prefix(String),
    /// Greater than
    GreaterThan(String),
    /// Greater than or equal
    GreaterOrEqual(String),
    /// Less than
    LessThan(String),
    /// Less than or equal
    LessOrEqual(String),
    /// Same base version with a release marker at least as high (`~`)
    Revisions(String),
}

impl VersionConstraint {
    /// Build a constraint from an operator token and a version
    ///
    /// Examples:
    /// - (">=", "1.2.3") → GreaterOrEqual(1.2.3)
    /// - ("=", "1.*") → Prefix("1.")
    /// - ("~", "1.0") → Revisions(1.0)
    pub fn from_operator(op: &str, version: &str) -> Result<Self> {
        if let Some(prefix) = version.strip_suffix('*') {
            if op != "=" && !op.is_empty() {
                return Err(Error::malformed(
                    version,
                    format!("wildcard versions only combine with '=', not '{}'", op),
                ));
            }
            return Ok(VersionConstraint::Prefix(prefix.to_string()));
        }

        Version::parse(version)?;
        let version = version.to_string();

        match op {
            "" | "=" => Ok(VersionConstraint::Exact(version)),
            ">" => Ok(VersionConstraint::GreaterThan(version)),
            ">=" => Ok(VersionConstraint::GreaterOrEqual(version)),
            "<" => Ok(VersionConstraint::LessThan(version)),
            "<=" => Ok(VersionConstraint::LessOrEqual(version)),
            "~" => Ok(VersionConstraint::Revisions(version)),
            other => Err(Error::malformed(
                &version,
                format!("unknown operator '{}'", other),
            )),
        }
    }

    /// The operator token for this constraint
    pub fn operator(&self) -> &'static str {
        match self {
            VersionConstraint::Any => "",
            VersionConstraint::Exact(_) | VersionConstraint::Prefix(_) => "=",
            VersionConstraint::GreaterThan(_) => ">",
            VersionConstraint::GreaterOrEqual(_) => ">=",
            VersionConstraint::LessThan(_) => "<",
            VersionConstraint::LessOrEqual(_) => "<=",
            VersionConstraint::Revisions(_) => "~",
        }
    }

    /// The version text this constraint refers to, if any
    pub fn version(&self) -> Option<&str> {
        match self {
            VersionConstraint::Any => None,
            VersionConstraint::Exact(v)
            | VersionConstraint::Prefix(v)
            | VersionConstraint::GreaterThan(v)
            | VersionConstraint::GreaterOrEqual(v)
            | VersionConstraint::LessThan(v)
            | VersionConstraint::LessOrEqual(v)
            | VersionConstraint::Revisions(v) => Some(v),
        }
    }

    /// Check if a candidate version satisfies this constraint
    ///
    /// Relational operators return the raw ordering via
    /// [`VersionConstraint::ordering`] so callers can apply secondary keys.
    pub fn satisfied_by(&self, candidate: &str) -> Result<bool> {
        match self {
            VersionConstraint::Any => Ok(true),
            VersionConstraint::Prefix(prefix) => Ok(candidate.starts_with(prefix.as_str())),
            VersionConstraint::Exact(v) => Ok(compare_versions(candidate, v)? == Ordering::Equal),
            VersionConstraint::Revisions(v) => {
                let wanted = Version::parse(v)?;
                let found = Version::parse(candidate)?;
                Ok(found.same_base(&wanted) && found >= wanted)
            }
            _ => {
                let ord = self.ordering(candidate)?.unwrap_or(Ordering::Equal);
                Ok(self.accepts(ord))
            }
        }
    }

    /// Ordering of `candidate` against a relational constraint's version
    pub fn ordering(&self, candidate: &str) -> Result<Option<Ordering>> {
        match self {
            VersionConstraint::GreaterThan(v)
            | VersionConstraint::GreaterOrEqual(v)
            | VersionConstraint::LessThan(v)
            | VersionConstraint::LessOrEqual(v) => Ok(Some(compare_versions(candidate, v)?)),
            _ => Ok(None),
        }
    }

    /// Whether an ordering (candidate relative to the constraint) is accepted
    pub fn accepts(&self, ord: Ordering) -> bool {
        match self {
            VersionConstraint::GreaterThan(_) => ord == Ordering::Greater,
            VersionConstraint::GreaterOrEqual(_) => ord != Ordering::Less,
            VersionConstraint::LessThan(_) => ord == Ordering::Less,
            VersionConstraint::LessOrEqual(_) => ord != Ordering::Greater,
            VersionConstraint::Exact(_) | VersionConstraint::Revisions(_) => {
                ord == Ordering::Equal
            }
            VersionConstraint::Any | VersionConstraint::Prefix(_) => true,
        }
    }
}

impl fmt::Display for VersionConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionConstraint::Any => write!(f, "*"),
            VersionConstraint::Prefix(v) => write!(f, "= {}*", v),
            other => write!(
                f,
                "{} {}",
                other.operator(),
                other.version().unwrap_or_default()
            ),
        }
    }
}
