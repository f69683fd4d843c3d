// src/repository/mod.rs

//! Package store adapters
//!
//! The resolver only ever reads package metadata through the
//! [`PackageStore`] trait. One store exists per repository plus one for the
//! installed-packages database. This module provides:
//! - The trait and the read-only [`PackageRecord`] projection
//! - [`InMemoryStore`] for tests and TOML catalogs
//! - [`SqliteStore`] backed by a relational metadata database
//! - [`Catalog`] for loading repositories and the installed set from TOML

mod catalog;
mod memory;
mod sqlite;

pub use catalog::{Catalog, CatalogPackage, CatalogRepository};
pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

use crate::atom::Specifier;
use crate::error::Result;
use crate::version::{VersionConstraint, VersionTriple};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Identifier of a package within one store
pub type PackageId = i64;

/// Identifier of a store: a named repository or the installed database
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RepositoryId {
    /// The installed-packages store
    Installed,
    /// A repository, by name
    Named(String),
}

impl RepositoryId {
    pub fn named(name: impl Into<String>) -> Self {
        RepositoryId::Named(name.into())
    }

    /// Repository name used in specifier restrictions (`@name`)
    pub fn name(&self) -> &str {
        match self {
            RepositoryId::Installed => "installed",
            RepositoryId::Named(name) => name,
        }
    }
}

impl fmt::Display for RepositoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RepositoryId::Installed => write!(f, "@installed"),
            RepositoryId::Named(name) => write!(f, "{}", name),
        }
    }
}

/// A resolved package: an id meaningful only within its repository
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Match {
    pub package_id: PackageId,
    pub repository: RepositoryId,
}

impl Match {
    pub fn new(package_id: PackageId, repository: RepositoryId) -> Self {
        Self {
            package_id,
            repository,
        }
    }

    /// A match against the installed-packages store
    pub fn installed(package_id: PackageId) -> Self {
        Self::new(package_id, RepositoryId::Installed)
    }

    pub fn is_installed(&self) -> bool {
        self.repository == RepositoryId::Installed
    }
}

impl fmt::Display for Match {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.package_id, self.repository.name())
    }
}

/// How a dependency participates in planning
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyKind {
    /// Must be satisfied for the package to work
    #[default]
    Runtime,
    /// Followed only on request; failures do not abort planning
    Optional,
}

impl DependencyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DependencyKind::Runtime => "runtime",
            DependencyKind::Optional => "optional",
        }
    }
}

/// One dependency specifier declared by a package
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dependency {
    pub spec: String,
    #[serde(default)]
    pub kind: DependencyKind,
}

impl Dependency {
    pub fn runtime(spec: impl Into<String>) -> Self {
        Self {
            spec: spec.into(),
            kind: DependencyKind::Runtime,
        }
    }

    pub fn optional(spec: impl Into<String>) -> Self {
        Self {
            spec: spec.into(),
            kind: DependencyKind::Optional,
        }
    }
}

/// A shared library a package links against or ships (a NEEDED record)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LinkedLibrary {
    pub soname: String,
    #[serde(default = "default_elfclass")]
    pub elfclass: u8,
}

fn default_elfclass() -> u8 {
    64
}

impl LinkedLibrary {
    pub fn new(soname: impl Into<String>, elfclass: u8) -> Self {
        Self {
            soname: soname.into(),
            elfclass,
        }
    }
}

impl fmt::Display for LinkedLibrary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (ELFCLASS{})", self.soname, self.elfclass)
    }
}

fn default_slot() -> String {
    "0".to_string()
}

fn default_branch() -> String {
    "main".to_string()
}

/// Read-only projection of one package's metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageRecord {
    /// Category/name pair
    pub key: String,
    #[serde(default = "default_slot")]
    pub slot: String,
    pub version: String,
    #[serde(default)]
    pub tag: Option<String>,
    /// Repository revision of this build (absent = 0)
    #[serde(default)]
    pub revision: u32,
    /// Repository branch the package was published on
    #[serde(default = "default_branch")]
    pub branch: String,
    #[serde(default)]
    pub dependencies: Vec<Dependency>,
    /// Conflict specifiers, with or without a leading `!`
    #[serde(default)]
    pub conflicts: Vec<String>,
    /// Virtual keys this package satisfies
    #[serde(default)]
    pub provides: Vec<String>,
    /// Libraries required at runtime
    #[serde(default)]
    pub needed: Vec<LinkedLibrary>,
    /// Libraries shipped by this package
    #[serde(default)]
    pub provided_libraries: Vec<LinkedLibrary>,
    #[serde(default)]
    pub licenses: Vec<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
}

impl PackageRecord {
    /// Minimal record with default slot and branch
    pub fn new(key: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            slot: default_slot(),
            version: version.into(),
            tag: None,
            revision: 0,
            branch: default_branch(),
            dependencies: Vec::new(),
            conflicts: Vec::new(),
            provides: Vec::new(),
            needed: Vec::new(),
            provided_libraries: Vec::new(),
            licenses: Vec::new(),
            keywords: Vec::new(),
        }
    }

    /// Fully qualified atom text: `key-version[#tag][~revision]`
    pub fn atom(&self) -> String {
        let mut atom = format!("{}-{}", self.key, self.version);
        if let Some(ref tag) = self.tag {
            atom.push('#');
            atom.push_str(tag);
        }
        if self.revision > 0 {
            atom.push_str(&format!("~{}", self.revision));
        }
        atom
    }

    /// `key:slot` identity used for duplicate suppression
    pub fn key_slot(&self) -> String {
        format!("{}:{}", self.key, self.slot)
    }

    pub fn triple(&self) -> VersionTriple {
        VersionTriple::new(self.version.clone(), self.tag.clone(), self.revision)
    }

    /// Conflict specifiers normalized to their negated form
    pub fn conflict_specs(&self) -> impl Iterator<Item = String> + '_ {
        self.conflicts.iter().map(|c| {
            if c.starts_with('!') {
                c.clone()
            } else {
                format!("!{}", c)
            }
        })
    }

    /// Check whether this package satisfies a (non-negated reading of a) specifier
    ///
    /// Repository restrictions are not considered here; they narrow which
    /// stores are searched, not what a package is. A package matched only
    /// through a provided virtual satisfies unversioned specifiers only.
    pub fn satisfies(&self, spec: &Specifier) -> Result<bool> {
        if self.key != spec.key() {
            let provided = self.provides.iter().any(|p| p == spec.key());
            return Ok(provided && *spec.constraint() == VersionConstraint::Any);
        }
        if spec.slot().is_some_and(|slot| slot != self.slot) {
            return Ok(false);
        }
        if spec.tag().is_some() && spec.tag() != self.tag.as_deref() {
            return Ok(false);
        }
        if spec.revision().is_some_and(|rev| rev != self.revision) {
            return Ok(false);
        }

        let constraint = spec.constraint();
        match constraint.ordering(&self.version)? {
            Some(ord) => {
                let ord = ord
                    .then_with(|| secondary_cmp(self.tag.as_deref(), spec.tag()))
                    .then_with(|| match spec.revision() {
                        Some(rev) => self.revision.cmp(&rev),
                        None => Ordering::Equal,
                    });
                Ok(constraint.accepts(ord))
            }
            None => constraint.satisfied_by(&self.version),
        }
    }
}

fn secondary_cmp(candidate: Option<&str>, wanted: Option<&str>) -> Ordering {
    match wanted {
        Some(_) => candidate.cmp(&wanted),
        None => Ordering::Equal,
    }
}

/// Read-only query surface over one repository or the installed database
pub trait PackageStore {
    /// Identity of this store
    fn repository_id(&self) -> &RepositoryId;

    /// Sort key among repositories (lower sorts first)
    fn repository_priority(&self) -> i32 {
        0
    }

    /// Whether packages come from a locally-supplied overlay rather than a sync
    fn is_local(&self) -> bool {
        false
    }

    /// Package ids for a key, optionally restricted to one slot
    fn candidates_by_key(&self, key: &str, slot: Option<&str>) -> Result<Vec<PackageId>>;

    /// Package ids providing a virtual key
    fn providers_of(&self, virtual_key: &str) -> Result<Vec<PackageId>>;

    /// Metadata for one package id
    fn record(&self, id: PackageId) -> Result<PackageRecord>;

    /// Packages in this store with a dependency satisfied by `id`
    fn reverse_dependents(&self, id: PackageId) -> Result<Vec<PackageId>>;

    /// Whether `id` is pinned as a system package
    fn is_system_package(&self, _id: PackageId) -> Result<bool> {
        Ok(false)
    }

    /// Packages whose NEEDED records include `library`
    fn library_consumers(&self, library: &LinkedLibrary) -> Result<Vec<PackageId>>;

    /// Packages shipping `library`
    fn library_providers(&self, library: &LinkedLibrary) -> Result<Vec<PackageId>>;

    /// Content checksum, changing whenever any record changes
    fn checksum(&self) -> Result<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(s: &str) -> Specifier {
        Specifier::parse(s).unwrap()
    }

    #[test]
    fn test_atom_rendering() {
        let mut record = PackageRecord::new("app/kmod", "2.0");
        assert_eq!(record.atom(), "app/kmod-2.0");
        record.tag = Some("5.10".to_string());
        record.revision = 3;
        assert_eq!(record.atom(), "app/kmod-2.0#5.10~3");
        assert_eq!(record.key_slot(), "app/kmod:0");
    }

    #[test]
    fn test_satisfies_version_and_slot() {
        let mut record = PackageRecord::new("app/foo", "1.2");
        record.slot = "1".to_string();
        assert!(record.satisfies(&spec(">=app/foo-1.1")).unwrap());
        assert!(record.satisfies(&spec("app/foo:1")).unwrap());
        assert!(!record.satisfies(&spec("app/foo:2")).unwrap());
        assert!(!record.satisfies(&spec("<app/foo-1.2")).unwrap());
        assert!(!record.satisfies(&spec("app/bar")).unwrap());
    }

    #[test]
    fn test_satisfies_tag_and_revision_pins() {
        let mut record = PackageRecord::new("app/kmod", "2.0");
        record.tag = Some("5.10".to_string());
        record.revision = 2;
        assert!(record.satisfies(&spec("app/kmod#5.10")).unwrap());
        assert!(!record.satisfies(&spec("app/kmod#5.15")).unwrap());
        assert!(record.satisfies(&spec(">=app/kmod-2.0#5.10~2")).unwrap());
        assert!(!record.satisfies(&spec("app/kmod~1")).unwrap());
    }

    #[test]
    fn test_satisfies_through_virtual() {
        let mut record = PackageRecord::new("mail/postfix", "3.8");
        record.provides.push("virtual/mta".to_string());
        assert!(record.satisfies(&spec("virtual/mta")).unwrap());
        assert!(!record.satisfies(&spec(">=virtual/mta-1")).unwrap());
    }

    #[test]
    fn test_conflict_specs_are_negated() {
        let mut record = PackageRecord::new("app/foo", "1.0");
        record.conflicts = vec!["app/bar".to_string(), "!app/baz".to_string()];
        let conflicts: Vec<String> = record.conflict_specs().collect();
        assert_eq!(conflicts, vec!["!app/bar", "!app/baz"]);
    }

    #[test]
    fn test_match_display() {
        assert_eq!(Match::installed(4).to_string(), "4@installed");
        assert_eq!(Match::new(7, RepositoryId::named("main")).to_string(), "7@main");
    }
}
