// src/resolver/mod.rs

//! Atom matching and install/removal planning
//!
//! The [`Resolver`] ties together the ordered repository stores, the
//! installed store, the masking policy and an optional result cache:
//!
//! - [`Resolver::match_atom`] resolves one specifier
//! - [`Resolver::install_plan`] builds the ordered install tree for targets
//! - [`Resolver::removal_plan`] builds the ordered removal tree for installed ids
//!
//! Each top-level call clears the caller's [`MaskingReasons`] first, then
//! fills it with every exclusion made while answering.

mod install;
mod masking;
mod matcher;
mod plan;
mod removal;

pub use install::{DependencyTreeBuilder, TreeOptions};
pub use masking::{
    ACCEPT_ALL_KEYWORDS, MaskingCause, MaskingPolicy, MaskingReason, MaskingReasons,
};
pub use matcher::{AtomMatcher, MatchMode, MatchResult};
pub use plan::{DepthTree, InstallPlan, RemovalPlan};
pub use removal::RemovalTreeBuilder;

use crate::atom::Specifier;
use crate::cache::{CacheKey, ResultCache};
use crate::config::{MatchPolicy, ResolverConfig};
use crate::error::{Error, Result};
use crate::repository::{PackageId, PackageStore};
use serde::Serialize;
use tracing::{debug, info};

/// Normalized install request, hashed into cache keys
#[derive(Serialize)]
struct InstallRequest<'a> {
    targets: Vec<&'a str>,
    options: TreeOptions,
    policy: &'a MatchPolicy,
    masking: &'a MaskingPolicy,
}

/// Normalized removal request, hashed into cache keys
#[derive(Serialize)]
struct RemovalRequest {
    roots: Vec<PackageId>,
    deep: bool,
}

/// Resolution entry point over a fixed set of stores
pub struct Resolver<'a> {
    repositories: Vec<&'a dyn PackageStore>,
    installed: &'a dyn PackageStore,
    masking: MaskingPolicy,
    policy: MatchPolicy,
    cache: Option<ResultCache>,
}

impl<'a> Resolver<'a> {
    /// Create a resolver with a permissive masking policy and no cache
    ///
    /// `repositories` are in declaration order; search order is by priority.
    pub fn new(repositories: Vec<&'a dyn PackageStore>, installed: &'a dyn PackageStore) -> Self {
        Self {
            repositories,
            installed,
            masking: MaskingPolicy::permissive(),
            policy: MatchPolicy::default(),
            cache: None,
        }
    }

    pub fn with_masking(mut self, masking: MaskingPolicy) -> Self {
        self.masking = masking;
        self
    }

    pub fn with_policy(mut self, policy: MatchPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Apply the masking and matching sections of a configuration
    pub fn with_config(self, config: &ResolverConfig) -> Result<Self> {
        let masking = MaskingPolicy::from_config(config)?;
        Ok(self
            .with_masking(masking)
            .with_policy(config.resolver.clone()))
    }

    pub fn with_cache(mut self, cache: ResultCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Matcher over the repositories with this resolver's policy
    pub fn matcher(&self) -> AtomMatcher<'_> {
        AtomMatcher::new(&self.repositories, &self.masking, &self.policy)
    }

    /// Resolve one specifier against the repositories
    pub fn match_atom(
        &self,
        spec: &str,
        mode: MatchMode,
        reasons: &mut MaskingReasons,
    ) -> Result<MatchResult> {
        reasons.clear();
        let spec = Specifier::parse(spec)?;
        self.matcher().resolve(&spec, mode, reasons)
    }

    /// Resolve one specifier against the installed store
    pub fn match_installed(&self, spec: &str, mode: MatchMode) -> Result<MatchResult> {
        let spec = Specifier::parse(spec)?;
        AtomMatcher::unmasked(self.installed).resolve(&spec, mode, &mut MaskingReasons::new())
    }

    /// Build the install plan for target specifiers
    ///
    /// Every target must match; unmatched targets and unmatched mandatory
    /// dependencies are reported together in
    /// [`Error::UnresolvedDependencies`].
    pub fn install_plan(
        &self,
        targets: &[Specifier],
        options: TreeOptions,
        reasons: &mut MaskingReasons,
    ) -> Result<InstallPlan> {
        reasons.clear();

        let key = match self.cache {
            Some(_) => {
                let mut texts: Vec<&str> = targets.iter().map(Specifier::as_str).collect();
                texts.sort_unstable();
                texts.dedup();
                let request = InstallRequest {
                    targets: texts,
                    options,
                    policy: &self.policy,
                    masking: &self.masking,
                };
                Some(CacheKey::compute("install", &request, &self.all_stores())?)
            }
            None => None,
        };
        if let (Some(cache), Some(key)) = (&self.cache, &key) {
            if let Some(plan) = cache.get::<InstallPlan>(key) {
                return Ok(plan);
            }
        }

        let matcher = self.matcher();
        let mut matches = Vec::new();
        let mut missing = Vec::new();
        for target in targets {
            if target.is_negated() {
                return Err(Error::invalid_spec(
                    target.as_str(),
                    "conflict specifiers cannot be install targets",
                ));
            }
            match matcher.find(target, reasons)? {
                Some(m) => {
                    debug!("Target {} -> {}", target, m);
                    matches.push(m);
                }
                None => missing.push(target.as_str().to_string()),
            }
        }
        if !missing.is_empty() {
            return Err(Error::UnresolvedDependencies(missing));
        }

        let plan =
            DependencyTreeBuilder::new(&matcher, self.installed).build(&matches, options, reasons)?;

        if let (Some(cache), Some(key)) = (&self.cache, &key) {
            cache.put(key, &plan);
        }
        Ok(plan)
    }

    /// Build the removal plan for installed package ids
    pub fn removal_plan(&self, roots: &[PackageId], deep: bool) -> Result<RemovalPlan> {
        let key = match self.cache {
            Some(_) => {
                let mut roots = roots.to_vec();
                roots.sort_unstable();
                roots.dedup();
                let request = RemovalRequest { roots, deep };
                Some(CacheKey::compute("remove", &request, &[self.installed])?)
            }
            None => None,
        };
        if let (Some(cache), Some(key)) = (&self.cache, &key) {
            if let Some(plan) = cache.get::<RemovalPlan>(key) {
                return Ok(plan);
            }
        }

        let plan = RemovalTreeBuilder::new(self.installed).build(roots, deep)?;

        if let (Some(cache), Some(key)) = (&self.cache, &key) {
            cache.put(key, &plan);
        }
        Ok(plan)
    }

    /// Build the removal plan for every installed package matching `specs`
    pub fn removal_plan_for(&self, specs: &[Specifier], deep: bool) -> Result<RemovalPlan> {
        let matcher = AtomMatcher::unmasked(self.installed);
        let mut reasons = MaskingReasons::new();
        let mut roots = Vec::new();
        let mut missing = Vec::new();

        for spec in specs {
            let found = matcher.find_all(spec, &mut reasons)?;
            if found.is_empty() {
                missing.push(spec.as_str().to_string());
            }
            roots.extend(found.into_iter().map(|m| m.package_id));
        }
        if !missing.is_empty() {
            return Err(Error::UnresolvedDependencies(missing));
        }

        info!("Removing {} installed packages", roots.len());
        self.removal_plan(&roots, deep)
    }

    fn all_stores(&self) -> Vec<&'a dyn PackageStore> {
        let mut stores = self.repositories.clone();
        stores.push(self.installed);
        stores
    }
}
