// tests/cache.rs

//! Integration tests for plan result caching.

mod common;

use common::{pkg, pkg_with_deps, specs};
use pkgplan::{InMemoryStore, MaskingReasons, Resolver, ResultCache, TreeOptions};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn count_entries(dir: &Path) -> usize {
    let mut count = 0;
    for shard in fs::read_dir(dir).unwrap() {
        let shard = shard.unwrap().path();
        if shard.is_dir() {
            count += fs::read_dir(&shard).unwrap().count();
        }
    }
    count
}

fn repository() -> InMemoryStore {
    let mut repo = InMemoryStore::new("main");
    repo.add(pkg_with_deps("app/a", "1.0", &["dev/lib"]));
    repo.add(pkg("dev/lib", "1.0"));
    repo
}

#[test]
fn test_install_plan_cached() {
    let temp = TempDir::new().unwrap();
    let repo = repository();
    let installed = InMemoryStore::installed();
    let targets = specs(&["app/a"]);

    let resolver = Resolver::new(vec![&repo], &installed)
        .with_cache(ResultCache::new(temp.path()).unwrap());
    let first = resolver
        .install_plan(&targets, TreeOptions::default(), &mut MaskingReasons::new())
        .unwrap();
    assert_eq!(count_entries(temp.path()), 1);

    let second = resolver
        .install_plan(&targets, TreeOptions::default(), &mut MaskingReasons::new())
        .unwrap();
    assert_eq!(first, second);
    assert_eq!(count_entries(temp.path()), 1);

    // Duplicate targets do not change the key
    let duplicated = specs(&["app/a", "app/a"]);
    resolver
        .install_plan(&duplicated, TreeOptions::default(), &mut MaskingReasons::new())
        .unwrap();
    assert_eq!(count_entries(temp.path()), 1);

    // Different options are a different request
    let options = TreeOptions {
        include_optional_deps: true,
        deep: false,
    };
    resolver
        .install_plan(&targets, options, &mut MaskingReasons::new())
        .unwrap();
    assert_eq!(count_entries(temp.path()), 2);
}

#[test]
fn test_store_change_invalidates() {
    let temp = TempDir::new().unwrap();
    let installed = InMemoryStore::installed();
    let targets = specs(&["app/a"]);

    let repo = repository();
    let resolver = Resolver::new(vec![&repo], &installed)
        .with_cache(ResultCache::new(temp.path()).unwrap());
    let before = resolver
        .install_plan(&targets, TreeOptions::default(), &mut MaskingReasons::new())
        .unwrap();

    let mut updated = repository();
    let newer = updated.add(pkg("dev/lib", "2.0"));
    let resolver = Resolver::new(vec![&updated], &installed)
        .with_cache(ResultCache::new(temp.path()).unwrap());
    let after = resolver
        .install_plan(&targets, TreeOptions::default(), &mut MaskingReasons::new())
        .unwrap();

    assert_eq!(count_entries(temp.path()), 2);
    assert_ne!(before, after);
    assert!(after.tree.contains(&common::repo_match(newer, "main")));
}

#[test]
fn test_removal_plan_cached() {
    let temp = TempDir::new().unwrap();
    let repo = InMemoryStore::new("main");
    let mut installed = InMemoryStore::installed();
    let lib = installed.add(pkg("dev/lib", "1.0"));
    installed.add(pkg_with_deps("app/a", "1.0", &["dev/lib"]));

    let resolver = Resolver::new(vec![&repo], &installed)
        .with_cache(ResultCache::new(temp.path()).unwrap());
    let first = resolver.removal_plan(&[lib], false).unwrap();
    let second = resolver.removal_plan(&[lib, lib], false).unwrap();

    assert_eq!(first, second);
    assert_eq!(first.tree.len(), 2);
    assert_eq!(count_entries(temp.path()), 1);
}

#[test]
fn test_corrupt_entry_recomputed() {
    let temp = TempDir::new().unwrap();
    let repo = repository();
    let installed = InMemoryStore::installed();
    let targets = specs(&["app/a"]);

    let resolver = Resolver::new(vec![&repo], &installed)
        .with_cache(ResultCache::new(temp.path()).unwrap());
    let first = resolver
        .install_plan(&targets, TreeOptions::default(), &mut MaskingReasons::new())
        .unwrap();

    for shard in fs::read_dir(temp.path()).unwrap() {
        for entry in fs::read_dir(shard.unwrap().path()).unwrap() {
            fs::write(entry.unwrap().path(), b"not json").unwrap();
        }
    }

    let second = resolver
        .install_plan(&targets, TreeOptions::default(), &mut MaskingReasons::new())
        .unwrap();
    assert_eq!(first, second);
    assert_eq!(count_entries(temp.path()), 1);
}
