// src/resolver/install.rs

//! Dependency tree construction
//!
//! Walks the dependency graph of a set of target matches with an explicit
//! LIFO work list. Each item carries the depth it was discovered at; the
//! finished tree is inverted so the deepest dependencies install first.
//!
//! Besides plain dependencies the walk handles:
//! - Conflicts: an installed package matching a `!spec` is upgraded away if
//!   the repositories offer a non-conflicting build of its key:slot, else it
//!   is reported at depth 0
//! - Library breakage: replacing an installed package may drop a library
//!   other installed packages link against, or need one nothing installed
//!   will still ship; both sides are repaired by pulling in repository
//!   packages
//! - Inverse dependencies: installed packages whose dependency on the
//!   replaced key no longer holds are re-pulled from the repositories

use super::masking::MaskingReasons;
use super::matcher::{AtomMatcher, MatchMode};
use super::plan::{DepthTree, InstallPlan};
use crate::atom::Specifier;
use crate::error::{Error, Result};
use crate::repository::{
    DependencyKind, LinkedLibrary, Match, PackageId, PackageRecord, PackageStore,
};
use crate::version::compare_cross_tag;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, info, warn};

/// Options for dependency tree construction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TreeOptions {
    /// Follow optional dependencies and dependencies that are already installed
    pub include_optional_deps: bool,
    /// Treat an installed dependency as satisfied only when it is the
    /// repositories' best match
    pub deep: bool,
}

enum WorkItem {
    Spec { spec: Specifier, optional: bool },
    Resolved(Match),
}

/// One pending item of the work list
struct Pending {
    depth: u32,
    /// Recorded match whose expansion queued this item
    parent: Option<Match>,
    item: WorkItem,
}

impl Pending {
    fn new(depth: u32, parent: Option<&Match>, item: WorkItem) -> Self {
        Self {
            depth,
            parent: parent.cloned(),
            item,
        }
    }
}

/// Traversal state local to one build
#[derive(Default)]
struct Visited {
    /// Specifier text -> the match it resolved to
    atoms: HashMap<String, Match>,
    matches: HashSet<Match>,
    /// key:slot -> the match chosen for it
    key_slots: HashMap<String, Match>,
    /// parent -> matches it pulled in, which must install first
    edges: HashMap<Match, Vec<Match>>,
}

impl Visited {
    fn link(&mut self, parent: Option<&Match>, child: &Match) {
        let Some(parent) = parent else {
            return;
        };
        if parent == child {
            return;
        }
        let children = self.edges.entry(parent.clone()).or_default();
        if !children.contains(child) {
            children.push(child.clone());
        }
    }
}

/// Builds ordered install trees
pub struct DependencyTreeBuilder<'m, 's> {
    matcher: &'m AtomMatcher<'s>,
    installed: &'s dyn PackageStore,
    installed_matcher: AtomMatcher<'s>,
    filter: Option<Box<dyn Fn(&Match) -> bool + 'm>>,
}

impl<'m, 's> DependencyTreeBuilder<'m, 's> {
    /// Builder resolving against `matcher`'s repositories and the installed store
    pub fn new(matcher: &'m AtomMatcher<'s>, installed: &'s dyn PackageStore) -> Self {
        Self {
            matcher,
            installed,
            installed_matcher: AtomMatcher::unmasked(installed),
            filter: None,
        }
    }

    /// Skip matches for which `filter` returns false
    ///
    /// Skipped matches are neither recorded nor expanded. Callers use this to
    /// drop packages already scheduled by an earlier plan.
    pub fn with_filter(mut self, filter: impl Fn(&Match) -> bool + 'm) -> Self {
        self.filter = Some(Box::new(filter));
        self
    }

    /// Build the install tree for `targets`
    ///
    /// Masking reasons accumulate into `reasons`; callers clear it between
    /// top-level requests.
    pub fn build(
        &self,
        targets: &[Match],
        options: TreeOptions,
        reasons: &mut MaskingReasons,
    ) -> Result<InstallPlan> {
        let mut stack: Vec<Pending> = targets
            .iter()
            .rev()
            .map(|m| Pending::new(1, None, WorkItem::Resolved(m.clone())))
            .collect();

        let mut visited = Visited::default();
        let mut recorded: Vec<(u32, Match)> = Vec::new();
        let mut roots: Vec<Match> = Vec::new();
        let mut conflicts: Vec<Match> = Vec::new();
        let mut missing: Vec<String> = Vec::new();
        let mut optional_missing: Vec<String> = Vec::new();

        while let Some(Pending {
            depth,
            parent,
            item,
        }) = stack.pop()
        {
            let parent = parent.as_ref();
            let candidate = match item {
                WorkItem::Spec { spec, optional } => {
                    if spec.is_negated() {
                        self.handle_conflict(
                            depth,
                            parent,
                            &spec,
                            &visited,
                            &mut stack,
                            &mut conflicts,
                            reasons,
                        )?;
                        continue;
                    }
                    if let Some(m) = visited.atoms.get(spec.as_str()).cloned() {
                        visited.link(parent, &m);
                        continue;
                    }
                    match self.matcher.resolve(&spec, MatchMode::Single, reasons) {
                        Ok(result) => match result.into_single() {
                            Some(m) => {
                                visited.atoms.insert(spec.as_str().to_string(), m.clone());
                                m
                            }
                            None => continue,
                        },
                        Err(Error::Unmatched(text)) => {
                            debug!("Unmatched dependency {} (optional: {})", text, optional);
                            let list = if optional {
                                &mut optional_missing
                            } else {
                                &mut missing
                            };
                            if !list.contains(&text) {
                                list.push(text);
                            }
                            continue;
                        }
                        Err(e) => return Err(e),
                    }
                }
                WorkItem::Resolved(m) => m,
            };

            if visited.matches.contains(&candidate) {
                visited.link(parent, &candidate);
                continue;
            }
            visited.matches.insert(candidate.clone());

            if let Some(ref filter) = self.filter {
                if !filter(&candidate) {
                    debug!("Filtered out {}", candidate);
                    continue;
                }
            }

            let record = self.matcher.record(&candidate)?;
            let key_slot = record.key_slot();
            if let Some(scheduled) = visited.key_slots.get(&key_slot).cloned() {
                debug!("{} already scheduled, skipping {}", key_slot, record.atom());
                visited.link(parent, &scheduled);
                continue;
            }
            visited.key_slots.insert(key_slot, candidate.clone());

            debug!("Depth {}: {} ({})", depth, record.atom(), candidate);
            match parent {
                Some(_) => visited.link(parent, &candidate),
                None => roots.push(candidate.clone()),
            }
            recorded.push((depth, candidate.clone()));

            if let Some((installed_id, installed_record)) = self.installed_counterpart(&record)? {
                self.repair_libraries(
                    depth,
                    &candidate,
                    &record,
                    installed_id,
                    &installed_record,
                    &mut stack,
                    reasons,
                )?;
                self.repull_inverse_deps(depth, &record, installed_id, &mut stack, reasons)?;
            }

            for conflict in record.conflict_specs() {
                stack.push(Pending::new(
                    depth,
                    Some(&candidate),
                    WorkItem::Spec {
                        spec: Specifier::parse(&conflict)?,
                        optional: false,
                    },
                ));
            }

            for dep in record.dependencies.iter().rev() {
                let optional = dep.kind == DependencyKind::Optional;
                if optional && !options.include_optional_deps {
                    continue;
                }
                let spec = Specifier::parse(&dep.spec)?;
                if !options.include_optional_deps
                    && self.installed_satisfies(&spec, options.deep, reasons)?
                {
                    debug!("{} already satisfied", spec);
                    continue;
                }
                stack.push(Pending::new(
                    depth + 1,
                    Some(&candidate),
                    WorkItem::Spec { spec, optional },
                ));
            }
        }

        if !missing.is_empty() {
            return Err(Error::UnresolvedDependencies(missing));
        }

        let levels = deepen(recorded, &roots, &visited.edges);
        let tree = invert(levels, conflicts);
        info!(
            "Install plan: {} packages in {} levels, {} conflicts",
            tree.len() - tree.level(0).map_or(0, |l| l.len()),
            tree.max_depth().unwrap_or(0),
            tree.level(0).map_or(0, |l| l.len())
        );

        Ok(InstallPlan {
            tree,
            optional_missing,
        })
    }

    /// Installed package in the same key:slot whose version triple differs
    fn installed_counterpart(
        &self,
        record: &PackageRecord,
    ) -> Result<Option<(PackageId, PackageRecord)>> {
        for id in self
            .installed
            .candidates_by_key(&record.key, Some(&record.slot))?
        {
            let installed = self.installed.record(id)?;
            if installed.triple() != record.triple() {
                return Ok(Some((id, installed)));
            }
        }
        Ok(None)
    }

    /// Whether an installed package already satisfies `spec`
    fn installed_satisfies(
        &self,
        spec: &Specifier,
        deep: bool,
        reasons: &mut MaskingReasons,
    ) -> Result<bool> {
        let Some(installed) = self.installed_matcher.find(spec, reasons)? else {
            return Ok(false);
        };
        if !deep {
            return Ok(true);
        }

        let Some(best) = self.matcher.find(spec, reasons)? else {
            return Ok(true);
        };
        let installed = self.installed.record(installed.package_id)?;
        let best = self.matcher.record(&best)?;
        Ok(compare_cross_tag(&installed.triple(), &best.triple())? == Ordering::Equal)
    }

    /// Resolve a negated specifier against the installed set
    #[allow(clippy::too_many_arguments)]
    fn handle_conflict(
        &self,
        depth: u32,
        parent: Option<&Match>,
        spec: &Specifier,
        visited: &Visited,
        stack: &mut Vec<Pending>,
        conflicts: &mut Vec<Match>,
        reasons: &mut MaskingReasons,
    ) -> Result<()> {
        let positive = spec.without_negation();

        for installed in self.installed_matcher.find_all(&positive, reasons)? {
            let record = self.installed.record(installed.package_id)?;

            // An upgrade already in the tree replaces the conflicting package
            if let Some(scheduled) = visited.key_slots.get(&record.key_slot()) {
                if !self.matcher.record(scheduled)?.satisfies(&positive)? {
                    debug!("Conflict {} resolved by scheduled {}", spec, scheduled);
                    continue;
                }
            }

            let key_slot = Specifier::for_key_slot(&record.key, &record.slot)?;
            if let Some(replacement) = self.matcher.find(&key_slot, reasons)? {
                if !self.matcher.record(&replacement)?.satisfies(&positive)? {
                    debug!("Conflict {} replaced by {}", spec, replacement);
                    stack.push(Pending::new(
                        depth + 1,
                        parent,
                        WorkItem::Resolved(replacement),
                    ));
                    continue;
                }
            }

            info!("{} conflicts with installed {}", spec, record.atom());
            if !conflicts.contains(&installed) {
                conflicts.push(installed);
            }
        }

        Ok(())
    }

    /// Queue repository packages that keep shared libraries resolvable
    #[allow(clippy::too_many_arguments)]
    fn repair_libraries(
        &self,
        depth: u32,
        candidate_match: &Match,
        candidate: &PackageRecord,
        replaced_id: PackageId,
        replaced: &PackageRecord,
        stack: &mut Vec<Pending>,
        reasons: &mut MaskingReasons,
    ) -> Result<()> {
        // Libraries the replaced package ships and the candidate drops
        for lib in &replaced.provided_libraries {
            if candidate.provided_libraries.contains(lib) {
                continue;
            }
            if self.installed_provider_remains(lib, replaced_id)? {
                continue;
            }
            for consumer_id in self.installed.library_consumers(lib)? {
                if consumer_id == replaced_id {
                    continue;
                }
                let consumer = self.installed.record(consumer_id)?;
                if consumer.key_slot() == candidate.key_slot() {
                    continue;
                }
                let spec = Specifier::for_key_slot(&consumer.key, &consumer.slot)?;
                match self.matcher.find(&spec, reasons)? {
                    Some(m) if self.matcher.record(&m)?.triple() != consumer.triple() => {
                        debug!("{} loses {}, pulling {}", consumer.atom(), lib, m);
                        stack.push(Pending::new(
                            depth + 1,
                            Some(candidate_match),
                            WorkItem::Resolved(m),
                        ));
                    }
                    _ => warn!(
                        "{} needs {} which {} no longer provides",
                        consumer.atom(),
                        lib,
                        candidate.atom()
                    ),
                }
            }
        }

        // Libraries the candidate needs that nothing installed will still ship
        for lib in &candidate.needed {
            if candidate.provided_libraries.contains(lib)
                || self.installed_provider_remains(lib, replaced_id)?
            {
                continue;
            }
            match self.repository_library_provider(lib, reasons)? {
                Some(m) => {
                    debug!("{} needs {}, pulling {}", candidate.atom(), lib, m);
                    stack.push(Pending::new(
                        depth + 1,
                        Some(candidate_match),
                        WorkItem::Resolved(m),
                    ));
                }
                None => warn!("No package provides {} needed by {}", lib, candidate.atom()),
            }
        }

        Ok(())
    }

    fn installed_provider_remains(
        &self,
        lib: &LinkedLibrary,
        replaced_id: PackageId,
    ) -> Result<bool> {
        Ok(self
            .installed
            .library_providers(lib)?
            .into_iter()
            .any(|id| id != replaced_id))
    }

    /// Best repository match for the first package shipping `lib`
    fn repository_library_provider(
        &self,
        lib: &LinkedLibrary,
        reasons: &mut MaskingReasons,
    ) -> Result<Option<Match>> {
        for store in self.matcher.stores() {
            for id in store.library_providers(lib)? {
                let provider = store.record(id)?;
                let spec = Specifier::for_key_slot(&provider.key, &provider.slot)?;
                if let Some(m) = self.matcher.find(&spec, reasons)? {
                    if self.matcher.record(&m)?.provided_libraries.contains(lib) {
                        return Ok(Some(m));
                    }
                }
            }
        }
        Ok(None)
    }

    /// Re-pull installed reverse dependents the candidate would break
    fn repull_inverse_deps(
        &self,
        depth: u32,
        candidate: &PackageRecord,
        replaced_id: PackageId,
        stack: &mut Vec<Pending>,
        reasons: &mut MaskingReasons,
    ) -> Result<()> {
        for dependent_id in self.installed.reverse_dependents(replaced_id)? {
            let dependent = self.installed.record(dependent_id)?;
            let mut broken = false;
            for dep in &dependent.dependencies {
                let spec = Specifier::parse(&dep.spec)?;
                if spec.key() == candidate.key && !candidate.satisfies(&spec)? {
                    broken = true;
                    break;
                }
            }
            if !broken {
                continue;
            }

            let spec = Specifier::for_key_slot(&dependent.key, &dependent.slot)?;
            match self.matcher.find(&spec, reasons)? {
                Some(m) => {
                    debug!(
                        "{} does not accept {}, re-pulling {}",
                        dependent.atom(),
                        candidate.atom(),
                        m
                    );
                    stack.push(Pending::new(depth, None, WorkItem::Resolved(m)));
                }
                None => warn!(
                    "{} does not accept {} and has no replacement",
                    dependent.atom(),
                    candidate.atom()
                ),
            }
        }
        Ok(())
    }
}

/// Place every match below all the packages that pulled it in
///
/// A match first seen as a shallow dependency and later as a deeper one
/// moves to the deeper level, taking its own dependencies along. Depths are
/// recomputed as longest paths from the roots; edges closing a dependency
/// cycle are ignored.
fn deepen(
    recorded: Vec<(u32, Match)>,
    roots: &[Match],
    edges: &HashMap<Match, Vec<Match>>,
) -> BTreeMap<u32, Vec<Match>> {
    let mut depths: HashMap<Match, u32> = recorded.iter().map(|(_, m)| (m.clone(), 0)).collect();
    for (depth, m) in &recorded {
        if roots.contains(m) {
            depths.insert(m.clone(), *depth);
        }
    }

    for root in roots {
        let mut on_path: HashSet<Match> = HashSet::from([root.clone()]);
        let mut path: Vec<(Match, usize)> = vec![(root.clone(), 0)];

        while let Some(top) = path.last_mut() {
            let node = top.0.clone();
            let index = top.1;
            top.1 += 1;

            let Some(child) = edges.get(&node).and_then(|c| c.get(index)) else {
                on_path.remove(&node);
                path.pop();
                continue;
            };
            if on_path.contains(child) {
                continue;
            }
            let Some(&node_depth) = depths.get(&node) else {
                continue;
            };
            if let Some(child_depth) = depths.get_mut(child) {
                if *child_depth < node_depth + 1 {
                    *child_depth = node_depth + 1;
                    on_path.insert(child.clone());
                    path.push((child.clone(), 0));
                }
            }
        }
    }

    let mut levels: BTreeMap<u32, Vec<Match>> = BTreeMap::new();
    for (first_depth, m) in recorded {
        let depth = match depths.get(&m) {
            Some(&d) if d > 0 => d,
            _ => first_depth,
        };
        levels.entry(depth).or_default().push(m);
    }
    levels
}

/// Renumber depths so the deepest level installs first
///
/// Depth d becomes max - d + 1; conflicts stay at depth 0.
fn invert(levels: BTreeMap<u32, Vec<Match>>, conflicts: Vec<Match>) -> DepthTree {
    let max = levels.keys().next_back().copied().unwrap_or(0);
    let mut tree = DepthTree::new();
    for (depth, matches) in levels {
        for m in matches {
            tree.insert(max - depth + 1, m);
        }
    }
    for m in conflicts {
        tree.insert(0, m);
    }
    tree
}
