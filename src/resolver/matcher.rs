// src/resolver/matcher.rs

//! Atom matching
//!
//! Resolves a specifier to the best package across an ordered list of
//! stores. Stores are searched in priority order (lower first, stable on
//! declaration order). Within a store the newest (version, tag, revision)
//! survivor wins; across stores a locally-supplied overlay wins outright when
//! the policy says so, otherwise the per-store bests are compared and ties go
//! to the store searched first.

use super::masking::{MaskingPolicy, MaskingReason, MaskingReasons};
use crate::atom::Specifier;
use crate::config::MatchPolicy;
use crate::error::{Error, Result};
use crate::repository::{Match, PackageId, PackageRecord, PackageStore, RepositoryId};
use crate::version::compare_cross_tag;
use std::cmp::Ordering;
use tracing::debug;

/// Whether a lookup returns one best match or every survivor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchMode {
    #[default]
    Single,
    Multi,
}

/// Outcome of a successful lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchResult {
    Single(Match),
    Multi(Vec<Match>),
}

impl MatchResult {
    /// All matches, best first for single lookups
    pub fn into_matches(self) -> Vec<Match> {
        match self {
            MatchResult::Single(m) => vec![m],
            MatchResult::Multi(matches) => matches,
        }
    }

    /// The single best match; the first survivor for multi lookups
    pub fn into_single(self) -> Option<Match> {
        match self {
            MatchResult::Single(m) => Some(m),
            MatchResult::Multi(matches) => matches.into_iter().next(),
        }
    }
}

/// Survivors of one store
struct StoreSurvivors<'a> {
    store: &'a dyn PackageStore,
    packages: Vec<(PackageId, PackageRecord)>,
}

impl StoreSurvivors<'_> {
    /// Newest survivor; the lowest id wins exact ties
    fn best(&self) -> Result<Option<&(PackageId, PackageRecord)>> {
        let mut best: Option<&(PackageId, PackageRecord)> = None;
        for candidate in &self.packages {
            best = match best {
                Some(current)
                    if compare_cross_tag(&candidate.1.triple(), &current.1.triple())?
                        != Ordering::Greater =>
                {
                    Some(current)
                }
                _ => Some(candidate),
            };
        }
        Ok(best)
    }
}

/// Resolves specifiers against an ordered set of stores
pub struct AtomMatcher<'a> {
    stores: Vec<&'a dyn PackageStore>,
    policy: Option<&'a MaskingPolicy>,
    local_overlay_wins: bool,
}

impl<'a> AtomMatcher<'a> {
    /// Matcher over repositories with masking applied
    pub fn new(
        repositories: &[&'a dyn PackageStore],
        masking: &'a MaskingPolicy,
        policy: &MatchPolicy,
    ) -> Self {
        let mut stores = repositories.to_vec();
        // Stable sort keeps declaration order among equal priorities
        stores.sort_by_key(|s| s.repository_priority());
        Self {
            stores,
            policy: Some(masking),
            local_overlay_wins: policy.local_overlay_wins,
        }
    }

    /// Matcher over a single store without masking (the installed set)
    pub fn unmasked(store: &'a dyn PackageStore) -> Self {
        Self {
            stores: vec![store],
            policy: None,
            local_overlay_wins: false,
        }
    }

    /// Stores in search order
    pub fn stores(&self) -> &[&'a dyn PackageStore] {
        &self.stores
    }

    /// Look up a store by id
    pub fn store(&self, id: &RepositoryId) -> Result<&'a dyn PackageStore> {
        self.stores
            .iter()
            .find(|s| s.repository_id() == id)
            .copied()
            .ok_or_else(|| Error::UnknownRepository(id.to_string()))
    }

    /// Metadata for a match produced by this matcher
    pub fn record(&self, m: &Match) -> Result<PackageRecord> {
        self.store(&m.repository)?.record(m.package_id)
    }

    /// Resolve a specifier
    ///
    /// A leading `!` is ignored; conflict handling is the caller's concern.
    /// Every candidate excluded by masking is recorded in `reasons` under the
    /// specifier's text.
    pub fn resolve(
        &self,
        spec: &Specifier,
        mode: MatchMode,
        reasons: &mut MaskingReasons,
    ) -> Result<MatchResult> {
        let mut per_store = Vec::new();

        for &store in &self.stores {
            let repo_id = store.repository_id();
            if !spec.allows_repository(repo_id.name()) {
                continue;
            }

            let mut ids = store.candidates_by_key(spec.key(), spec.slot())?;
            if ids.is_empty() {
                ids = store.providers_of(spec.key())?;
            }
            if ids.is_empty() {
                continue;
            }

            let mut packages = Vec::new();
            for id in ids {
                let record = store.record(id)?;
                if !record.satisfies(spec)? {
                    continue;
                }
                if let Some(policy) = self.policy {
                    if let Some(cause) = policy.check(&record, repo_id)? {
                        debug!("{} from {} masked: {}", record.atom(), repo_id, cause);
                        reasons.record(
                            spec.as_str(),
                            MaskingReason {
                                atom: record.atom(),
                                repository: repo_id.clone(),
                                cause,
                            },
                        );
                        continue;
                    }
                }
                packages.push((id, record));
            }

            if !packages.is_empty() {
                per_store.push(StoreSurvivors { store, packages });
            }
        }

        if per_store.is_empty() {
            debug!("No match for {}", spec);
            return Err(Error::Unmatched(spec.as_str().to_string()));
        }

        if mode == MatchMode::Multi {
            let matches = per_store
                .iter()
                .flat_map(|s| {
                    s.packages
                        .iter()
                        .map(|(id, _)| Match::new(*id, s.store.repository_id().clone()))
                })
                .collect();
            return Ok(MatchResult::Multi(matches));
        }

        if self.local_overlay_wins {
            if let Some(local) = per_store.iter().find(|s| s.store.is_local()) {
                if let Some((id, record)) = local.best()? {
                    debug!("{} -> {} (local overlay)", spec, record.atom());
                    return Ok(MatchResult::Single(Match::new(
                        *id,
                        local.store.repository_id().clone(),
                    )));
                }
            }
        }

        let mut winner: Option<(&StoreSurvivors, &(PackageId, PackageRecord))> = None;
        for survivors in &per_store {
            let Some(best) = survivors.best()? else {
                continue;
            };
            winner = match winner {
                Some((ws, wb))
                    if compare_cross_tag(&best.1.triple(), &wb.1.triple())?
                        != Ordering::Greater =>
                {
                    Some((ws, wb))
                }
                _ => Some((survivors, best)),
            };
        }

        match winner {
            Some((survivors, (id, record))) => {
                debug!(
                    "{} -> {} from {}",
                    spec,
                    record.atom(),
                    survivors.store.repository_id()
                );
                Ok(MatchResult::Single(Match::new(
                    *id,
                    survivors.store.repository_id().clone(),
                )))
            }
            None => Err(Error::Unmatched(spec.as_str().to_string())),
        }
    }

    /// Resolve to a single match, mapping `Unmatched` to `None`
    pub fn find(&self, spec: &Specifier, reasons: &mut MaskingReasons) -> Result<Option<Match>> {
        match self.resolve(spec, MatchMode::Single, reasons) {
            Ok(result) => Ok(result.into_single()),
            Err(Error::Unmatched(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Resolve every survivor, mapping `Unmatched` to an empty list
    pub fn find_all(&self, spec: &Specifier, reasons: &mut MaskingReasons) -> Result<Vec<Match>> {
        match self.resolve(spec, MatchMode::Multi, reasons) {
            Ok(result) => Ok(result.into_matches()),
            Err(Error::Unmatched(_)) => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }
}
