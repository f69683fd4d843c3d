// src/repository/catalog.rs

//! TOML package catalogs
//!
//! A catalog describes a set of repositories and the installed packages in
//! one file:
//!
//! ```toml
//! [[repository]]
//! name = "main"
//! priority = 0
//!
//! [[repository.package]]
//! key = "app/foo"
//! version = "1.1"
//! dependencies = [{ spec = ">=lib/z-1.2" }]
//!
//! [[installed]]
//! key = "sys/glibc"
//! version = "2.39"
//! system = true
//! ```

use super::{InMemoryStore, PackageRecord};
use crate::error::Result;
use serde::Deserialize;
use std::path::Path;
use tracing::debug;

/// One package entry in a catalog
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogPackage {
    #[serde(flatten)]
    pub record: PackageRecord,
    /// Pin as a system package (installed entries only)
    #[serde(default)]
    pub system: bool,
}

/// One repository section
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogRepository {
    pub name: String,
    #[serde(default)]
    pub priority: i32,
    /// Locally supplied overlay
    #[serde(default)]
    pub local: bool,
    #[serde(default, rename = "package")]
    pub packages: Vec<CatalogPackage>,
}

/// Repositories plus the installed set, as loaded from TOML
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Catalog {
    #[serde(default, rename = "repository")]
    pub repositories: Vec<CatalogRepository>,
    #[serde(default)]
    pub installed: Vec<CatalogPackage>,
}

impl Catalog {
    /// Load a catalog file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let catalog = Self::parse(&content)?;
        debug!(
            "Loaded catalog {} ({} repositories, {} installed)",
            path.as_ref().display(),
            catalog.repositories.len(),
            catalog.installed.len()
        );
        Ok(catalog)
    }

    /// Parse a catalog from a string
    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Build one store per repository (in declaration order) plus the installed store
    pub fn into_stores(self) -> (Vec<InMemoryStore>, InMemoryStore) {
        let repositories = self
            .repositories
            .into_iter()
            .map(|repo| {
                let mut store = InMemoryStore::new(repo.name).with_priority(repo.priority);
                if repo.local {
                    store = store.local();
                }
                for package in repo.packages {
                    store.add(package.record);
                }
                store
            })
            .collect();

        let mut installed = InMemoryStore::installed();
        for package in self.installed {
            if package.system {
                installed.add_system(package.record);
            } else {
                installed.add(package.record);
            }
        }

        (repositories, installed)
    }
}
