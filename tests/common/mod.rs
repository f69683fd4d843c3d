// tests/common/mod.rs

//! Shared test utilities and helpers for integration tests.

#![allow(dead_code)]

use pkgplan::{
    Dependency, InMemoryStore, LinkedLibrary, Match, PackageRecord, RepositoryId, Specifier,
};

/// A package record with default slot, no tag and revision 0.
pub fn pkg(key: &str, version: &str) -> PackageRecord {
    PackageRecord::new(key, version)
}

/// A package record with runtime dependencies.
pub fn pkg_with_deps(key: &str, version: &str, deps: &[&str]) -> PackageRecord {
    let mut record = pkg(key, version);
    record.dependencies = deps.iter().map(|d| Dependency::runtime(*d)).collect();
    record
}

/// A 64-bit shared library record.
pub fn lib(soname: &str) -> LinkedLibrary {
    LinkedLibrary::new(soname, 64)
}

pub fn spec(s: &str) -> Specifier {
    Specifier::parse(s).unwrap()
}

pub fn specs(list: &[&str]) -> Vec<Specifier> {
    list.iter().map(|s| spec(s)).collect()
}

/// Match against a named repository.
pub fn repo_match(id: i64, repository: &str) -> Match {
    Match::new(id, RepositoryId::named(repository))
}

/// Repository holding `app/foo-1.0-r0` (id 1) and `app/foo-1.2-r0` (id 2).
pub fn foo_repository() -> InMemoryStore {
    let mut store = InMemoryStore::new("main");
    store.add(pkg("app/foo", "1.0-r0"));
    store.add(pkg("app/foo", "1.2-r0"));
    store
}
