// src/lib.rs

//! pkgplan: resolution core of a binary package manager
//!
//! Given ordered repositories of available packages and the installed set,
//! pkgplan answers two questions:
//!
//! - Which single package does a dependency specifier resolve to right now?
//! - Which packages must be installed or removed, in which order, to satisfy
//!   a request?
//!
//! # Architecture
//!
//! - Greedy and deterministic: repository order, then version, tag,
//!   revision, then repository declaration order
//! - Stores are reached only through [`PackageStore`]
//! - Plans are depth trees; install trees apply from depth 1 upwards and
//!   keep hard conflicts at depth 0, removal trees apply deepest first
//! - Results can be cached on disk, keyed on store checksums

pub mod atom;
pub mod cache;
pub mod config;
mod error;
pub mod hash;
pub mod repository;
pub mod resolver;
pub mod version;

pub use atom::Specifier;
pub use cache::{CacheKey, ResultCache};
pub use config::{MatchPolicy, ResolverConfig, load_config, parse_config_string};
pub use error::{Error, Result};
pub use repository::{
    Catalog, Dependency, DependencyKind, InMemoryStore, LinkedLibrary, Match, PackageId,
    PackageRecord, PackageStore, RepositoryId, SqliteStore,
};
pub use resolver::{
    AtomMatcher, DependencyTreeBuilder, DepthTree, InstallPlan, MaskingCause, MaskingPolicy,
    MaskingReason, MaskingReasons, MatchMode, MatchResult, RemovalPlan, RemovalTreeBuilder,
    Resolver, TreeOptions,
};
pub use version::{Version, VersionConstraint, VersionTriple, compare, compare_cross_tag};
