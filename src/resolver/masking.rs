// src/resolver/masking.rs

//! Package masking
//!
//! A masked package is invisible to the matcher. Masking never fails a
//! lookup by itself; each exclusion is recorded as a [`MaskingReason`] under
//! the specifier being resolved so callers can explain an empty result.
//!
//! Checks run in this order, first hit wins:
//! 1. Explicit unmask: the package is accepted outright
//! 2. Global mask (`UserMask`)
//! 3. Repository mask scoped to the package's branch (`RepositoryMask`)
//! 4. License outside the accepted set (`License`)
//! 5. No keyword in the effective accepted set (`Keyword`)

use crate::atom::Specifier;
use crate::config::ResolverConfig;
use crate::error::Result;
use crate::repository::{PackageRecord, RepositoryId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Keyword accepting every package
pub const ACCEPT_ALL_KEYWORDS: &str = "**";

/// Why a package was excluded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MaskingCause {
    /// Matched a global `[mask]` entry
    UserMask,
    /// Matched a repository mask for the branch it was published on
    RepositoryMask { branch: String },
    /// Carries a license that is not accepted
    License { license: String },
    /// None of its keywords is accepted
    Keyword,
}

impl fmt::Display for MaskingCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MaskingCause::UserMask => write!(f, "masked by user"),
            MaskingCause::RepositoryMask { branch } => {
                write!(f, "masked by repository (branch {})", branch)
            }
            MaskingCause::License { license } => write!(f, "license {} not accepted", license),
            MaskingCause::Keyword => write!(f, "no accepted keyword"),
        }
    }
}

/// One excluded package
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaskingReason {
    /// Atom of the excluded package
    pub atom: String,
    pub repository: RepositoryId,
    pub cause: MaskingCause,
}

impl fmt::Display for MaskingReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} from {}: {}", self.atom, self.repository, self.cause)
    }
}

/// Masking reasons collected during one top-level call, by specifier text
#[derive(Debug, Clone, Default)]
pub struct MaskingReasons {
    by_spec: BTreeMap<String, Vec<MaskingReason>>,
}

impl MaskingReasons {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.by_spec.clear();
    }

    /// Record a reason, ignoring exact duplicates
    pub fn record(&mut self, spec: &str, reason: MaskingReason) {
        let reasons = self.by_spec.entry(spec.to_string()).or_default();
        if !reasons.contains(&reason) {
            reasons.push(reason);
        }
    }

    /// Reasons recorded for a specifier
    pub fn get(&self, spec: &str) -> &[MaskingReason] {
        self.by_spec.get(spec).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Total number of recorded reasons
    pub fn len(&self) -> usize {
        self.by_spec.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_spec.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[MaskingReason])> {
        self.by_spec.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }
}

/// Compiled masking rules
#[derive(Debug, Clone, Default, Serialize)]
pub struct MaskingPolicy {
    unmask: Vec<Specifier>,
    masks: Vec<Specifier>,
    /// repository -> branch -> masked specifiers
    repository_masks: BTreeMap<String, BTreeMap<String, Vec<Specifier>>>,
    accepted_keywords: BTreeSet<String>,
    repository_keywords: BTreeMap<String, BTreeSet<String>>,
    package_keywords: Vec<(Specifier, BTreeSet<String>)>,
    accepted_licenses: BTreeSet<String>,
}

fn parse_all(specs: &[String]) -> Result<Vec<Specifier>> {
    specs.iter().map(|s| Specifier::parse(s)).collect()
}

impl MaskingPolicy {
    /// A policy that accepts everything
    pub fn permissive() -> Self {
        Self::default()
    }

    /// Compile the masking sections of a configuration
    pub fn from_config(config: &ResolverConfig) -> Result<Self> {
        let mut policy = Self {
            unmask: parse_all(&config.mask.unmask)?,
            masks: parse_all(&config.mask.packages)?,
            accepted_keywords: config.keywords.accept.iter().cloned().collect(),
            accepted_licenses: config.license.accept.iter().cloned().collect(),
            ..Self::default()
        };

        for (repo, repo_policy) in &config.repository {
            let mut branches = BTreeMap::new();
            for (branch, specs) in &repo_policy.mask {
                branches.insert(branch.clone(), parse_all(specs)?);
            }
            policy.repository_masks.insert(repo.clone(), branches);
            policy
                .repository_keywords
                .insert(repo.clone(), repo_policy.keywords.iter().cloned().collect());
        }

        for (spec, keywords) in &config.keywords.package {
            policy
                .package_keywords
                .push((Specifier::parse(spec)?, keywords.iter().cloned().collect()));
        }

        Ok(policy)
    }

    /// Add a global mask
    pub fn mask(mut self, spec: Specifier) -> Self {
        self.masks.push(spec);
        self
    }

    /// Add an explicit unmask
    pub fn unmask(mut self, spec: Specifier) -> Self {
        self.unmask.push(spec);
        self
    }

    /// Decide whether a package from `repository` is masked
    pub fn check(
        &self,
        record: &PackageRecord,
        repository: &RepositoryId,
    ) -> Result<Option<MaskingCause>> {
        let repo_name = repository.name();

        if any_matches(&self.unmask, record, repo_name)? {
            return Ok(None);
        }

        if any_matches(&self.masks, record, repo_name)? {
            return Ok(Some(MaskingCause::UserMask));
        }

        if let Some(specs) = self
            .repository_masks
            .get(repo_name)
            .and_then(|branches| branches.get(&record.branch))
        {
            if any_matches(specs, record, repo_name)? {
                return Ok(Some(MaskingCause::RepositoryMask {
                    branch: record.branch.clone(),
                }));
            }
        }

        if !self.accepted_licenses.is_empty() {
            if let Some(license) = record
                .licenses
                .iter()
                .find(|l| !self.accepted_licenses.contains(*l))
            {
                return Ok(Some(MaskingCause::License {
                    license: license.clone(),
                }));
            }
        }

        let effective = self.effective_keywords(record, repo_name)?;
        if !effective.is_empty()
            && !effective.contains(ACCEPT_ALL_KEYWORDS)
            && !record.keywords.iter().any(|k| effective.contains(k))
        {
            return Ok(Some(MaskingCause::Keyword));
        }

        Ok(None)
    }

    /// Global, per-repository and per-package keywords combined
    fn effective_keywords(
        &self,
        record: &PackageRecord,
        repo_name: &str,
    ) -> Result<BTreeSet<String>> {
        let mut effective = self.accepted_keywords.clone();
        if let Some(keywords) = self.repository_keywords.get(repo_name) {
            effective.extend(keywords.iter().cloned());
        }
        for (spec, keywords) in &self.package_keywords {
            if spec.allows_repository(repo_name) && record.satisfies(spec)? {
                effective.extend(keywords.iter().cloned());
            }
        }
        Ok(effective)
    }
}

fn any_matches(specs: &[Specifier], record: &PackageRecord, repo_name: &str) -> Result<bool> {
    for spec in specs {
        if spec.allows_repository(repo_name) && record.satisfies(spec)? {
            return Ok(true);
        }
    }
    Ok(false)
}
