// src/repository/memory.rs

//! In-memory package store
//!
//! Holds records in a `BTreeMap` keyed by id so every query returns ids in
//! ascending order. Used by tests and by TOML catalogs.

use super::{
    DependencyKind, LinkedLibrary, PackageId, PackageRecord, PackageStore, RepositoryId,
};
use crate::atom::Specifier;
use crate::error::{Error, Result};
use crate::hash::Hasher;
use std::collections::{BTreeMap, BTreeSet};

/// A package store held entirely in memory
#[derive(Debug, Clone)]
pub struct InMemoryStore {
    id: RepositoryId,
    priority: i32,
    local: bool,
    packages: BTreeMap<PackageId, PackageRecord>,
    system: BTreeSet<PackageId>,
    next_id: PackageId,
}

impl InMemoryStore {
    /// Create an empty repository store
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_id(RepositoryId::Named(name.into()))
    }

    /// Create an empty installed-packages store
    pub fn installed() -> Self {
        Self::with_id(RepositoryId::Installed)
    }

    fn with_id(id: RepositoryId) -> Self {
        Self {
            id,
            priority: 0,
            local: false,
            packages: BTreeMap::new(),
            system: BTreeSet::new(),
            next_id: 1,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Mark this store as a locally-supplied overlay
    pub fn local(mut self) -> Self {
        self.local = true;
        self
    }

    /// Add a package, returning its id
    pub fn add(&mut self, record: PackageRecord) -> PackageId {
        let id = self.next_id;
        self.next_id += 1;
        self.packages.insert(id, record);
        id
    }

    /// Add a package pinned as a system package
    pub fn add_system(&mut self, record: PackageRecord) -> PackageId {
        let id = self.add(record);
        self.system.insert(id);
        id
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    fn ids_where(&self, pred: impl Fn(&PackageRecord) -> bool) -> Vec<PackageId> {
        self.packages
            .iter()
            .filter(|(_, record)| pred(record))
            .map(|(id, _)| *id)
            .collect()
    }
}

impl PackageStore for InMemoryStore {
    fn repository_id(&self) -> &RepositoryId {
        &self.id
    }

    fn repository_priority(&self) -> i32 {
        self.priority
    }

    fn is_local(&self) -> bool {
        self.local
    }

    fn candidates_by_key(&self, key: &str, slot: Option<&str>) -> Result<Vec<PackageId>> {
        Ok(self.ids_where(|r| r.key == key && slot.is_none_or(|s| r.slot == s)))
    }

    fn providers_of(&self, virtual_key: &str) -> Result<Vec<PackageId>> {
        Ok(self.ids_where(|r| r.provides.iter().any(|p| p == virtual_key)))
    }

    fn record(&self, id: PackageId) -> Result<PackageRecord> {
        self.packages
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::UnknownPackage {
                id,
                repository: self.id.to_string(),
            })
    }

    fn reverse_dependents(&self, id: PackageId) -> Result<Vec<PackageId>> {
        let target = self.record(id)?;
        let mut dependents = Vec::new();

        for (&other_id, other) in &self.packages {
            if other_id == id {
                continue;
            }
            for dep in &other.dependencies {
                if dep.kind != DependencyKind::Runtime {
                    continue;
                }
                if target.satisfies(&Specifier::parse(&dep.spec)?)? {
                    dependents.push(other_id);
                    break;
                }
            }
        }

        Ok(dependents)
    }

    fn is_system_package(&self, id: PackageId) -> Result<bool> {
        Ok(self.system.contains(&id))
    }

    fn library_consumers(&self, library: &LinkedLibrary) -> Result<Vec<PackageId>> {
        Ok(self.ids_where(|r| r.needed.contains(library)))
    }

    fn library_providers(&self, library: &LinkedLibrary) -> Result<Vec<PackageId>> {
        Ok(self.ids_where(|r| r.provided_libraries.contains(library)))
    }

    fn checksum(&self) -> Result<String> {
        let mut hasher = Hasher::new();
        hasher.update_json(&self.id)?;
        hasher.update(&self.priority.to_le_bytes());
        hasher.update(&[self.local as u8]);
        for (id, record) in &self.packages {
            hasher.update(&id.to_le_bytes());
            hasher.update(&[self.system.contains(id) as u8]);
            hasher.update_json(record)?;
        }
        Ok(hasher.finalize())
    }
}
