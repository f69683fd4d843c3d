// src/resolver/removal.rs

//! Removal tree construction
//!
//! Breadth-first walk over reverse dependencies of the installed set. Level 0
//! holds the requested packages, level n the packages that stop working once
//! level n-1 is gone. Removal runs from the deepest level back to level 0.

use super::masking::MaskingReasons;
use super::matcher::AtomMatcher;
use super::plan::{DepthTree, RemovalPlan};
use crate::atom::Specifier;
use crate::error::Result;
use crate::repository::{DependencyKind, Match, PackageId, PackageRecord, PackageStore};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use tracing::{debug, info};

/// Builds ordered removal trees over the installed store
pub struct RemovalTreeBuilder<'s> {
    installed: &'s dyn PackageStore,
    matcher: AtomMatcher<'s>,
}

impl<'s> RemovalTreeBuilder<'s> {
    pub fn new(installed: &'s dyn PackageStore) -> Self {
        Self {
            installed,
            matcher: AtomMatcher::unmasked(installed),
        }
    }

    /// Build the removal tree for installed package ids
    ///
    /// With `deep`, dependencies left without any dependent are removed too.
    pub fn build(&self, roots: &[PackageId], deep: bool) -> Result<RemovalPlan> {
        let mut levels: BTreeMap<u32, Vec<PackageId>> = BTreeMap::new();
        let mut slated: HashSet<PackageId> = HashSet::new();
        let mut blocked: Vec<Match> = Vec::new();

        let mut current = Vec::new();
        for &id in roots {
            if slated.contains(&id) {
                continue;
            }
            if self.is_pinned(id, &slated)? {
                info!("{} is a system package, keeping it", self.installed.record(id)?.atom());
                push_unique(&mut blocked, Match::installed(id));
                continue;
            }
            slated.insert(id);
            current.push(id);
        }

        let mut depth = 0;
        while !current.is_empty() {
            levels.entry(depth).or_default().extend(current.iter().copied());
            let mut next = Vec::new();

            for &id in &current {
                let removed = self.installed.record(id)?;
                let dependents = self.installed.reverse_dependents(id)?;

                for &dependent in &dependents {
                    if slated.contains(&dependent) {
                        continue;
                    }
                    if self.still_satisfied(dependent, &removed, &slated)? {
                        debug!("Dependent {} has another provider", dependent);
                        continue;
                    }
                    if self.is_pinned(dependent, &slated)? {
                        push_unique(&mut blocked, Match::installed(dependent));
                        continue;
                    }
                    debug!("Level {}: {} depends on {}", depth + 1, dependent, removed.atom());
                    slated.insert(dependent);
                    next.push(dependent);
                }

                if deep && dependents.iter().all(|d| slated.contains(d)) {
                    for orphan in self.orphaned_dependencies(&removed, &slated)? {
                        debug!("Level {}: {} orphaned by {}", depth + 1, orphan, removed.atom());
                        slated.insert(orphan);
                        next.push(orphan);
                    }
                }
            }

            current = next;
            depth += 1;
        }

        let tree = compact(levels);
        info!(
            "Removal plan: {} packages in {} levels, {} blocked",
            tree.len(),
            tree.max_depth().map_or(0, |d| d + 1),
            blocked.len()
        );

        Ok(RemovalPlan { tree, blocked })
    }

    /// System package with no other slot of its key left installed
    fn is_pinned(&self, id: PackageId, slated: &HashSet<PackageId>) -> Result<bool> {
        if !self.installed.is_system_package(id)? {
            return Ok(false);
        }
        let record = self.installed.record(id)?;
        for other in self.installed.candidates_by_key(&record.key, None)? {
            if other == id || slated.contains(&other) {
                continue;
            }
            if self.installed.record(other)?.slot != record.slot {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Whether every dependency of `dependent` on `removed` resolves elsewhere
    ///
    /// Each such specifier must still match an installed package that is not
    /// slated for removal.
    fn still_satisfied(
        &self,
        dependent: PackageId,
        removed: &PackageRecord,
        slated: &HashSet<PackageId>,
    ) -> Result<bool> {
        let record = self.installed.record(dependent)?;
        let mut scratch = MaskingReasons::new();

        for dep in &record.dependencies {
            if dep.kind != DependencyKind::Runtime {
                continue;
            }
            let spec = Specifier::parse(&dep.spec)?;
            if !removed.satisfies(&spec)? {
                continue;
            }
            let alternatives = self.matcher.find_all(&spec, &mut scratch)?;
            if !alternatives
                .iter()
                .any(|m| !slated.contains(&m.package_id))
            {
                return Ok(false);
            }
        }

        Ok(true)
    }

    /// Installed dependencies of `removed` whose every dependent is slated
    fn orphaned_dependencies(
        &self,
        removed: &PackageRecord,
        slated: &HashSet<PackageId>,
    ) -> Result<Vec<PackageId>> {
        let mut scratch = MaskingReasons::new();
        let mut orphans = Vec::new();

        for dep in &removed.dependencies {
            let spec = Specifier::parse(&dep.spec)?;
            for m in self.matcher.find_all(&spec, &mut scratch)? {
                let id = m.package_id;
                if slated.contains(&id) || orphans.contains(&id) {
                    continue;
                }
                if self.installed.is_system_package(id)? {
                    continue;
                }
                let dependents = self.installed.reverse_dependents(id)?;
                if dependents.iter().all(|d| slated.contains(d)) {
                    orphans.push(id);
                }
            }
        }

        Ok(orphans)
    }
}

fn push_unique(list: &mut Vec<Match>, m: Match) {
    if !list.contains(&m) {
        list.push(m);
    }
}

/// Keep each id only at its shallowest level
fn compact(levels: BTreeMap<u32, Vec<PackageId>>) -> DepthTree {
    let mut seen = BTreeSet::new();
    let mut tree = DepthTree::new();
    for (depth, ids) in levels {
        for id in ids {
            if seen.insert(id) {
                tree.insert(depth, Match::installed(id));
            }
        }
    }
    tree
}
