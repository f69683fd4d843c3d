// src/resolver/plan.rs

//! Resolution plan data structures
//!
//! Both builders produce a [`DepthTree`]: an ordered map from depth to the
//! set of matches at that depth. An install tree is applied from depth 1
//! upwards and keeps hard conflicts at depth 0. A removal tree is applied
//! from its deepest level down to depth 0.

use crate::repository::Match;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Matches grouped by depth; a match appears at one depth at most
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepthTree {
    levels: BTreeMap<u32, BTreeSet<Match>>,
}

impl DepthTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a match at a depth unless it is already present at any depth
    pub fn insert(&mut self, depth: u32, m: Match) -> bool {
        if self.contains(&m) {
            return false;
        }
        self.levels.entry(depth).or_default().insert(m)
    }

    pub fn contains(&self, m: &Match) -> bool {
        self.levels.values().any(|level| level.contains(m))
    }

    /// Depth a match sits at
    pub fn depth_of(&self, m: &Match) -> Option<u32> {
        self.levels
            .iter()
            .find(|(_, level)| level.contains(m))
            .map(|(depth, _)| *depth)
    }

    pub fn level(&self, depth: u32) -> Option<&BTreeSet<Match>> {
        self.levels.get(&depth)
    }

    /// Levels in ascending depth order
    pub fn levels(&self) -> impl Iterator<Item = (u32, &BTreeSet<Match>)> {
        self.levels.iter().map(|(depth, level)| (*depth, level))
    }

    pub fn max_depth(&self) -> Option<u32> {
        self.levels.keys().next_back().copied()
    }

    /// Total number of matches
    pub fn len(&self) -> usize {
        self.levels.values().map(BTreeSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.values().all(BTreeSet::is_empty)
    }
}

/// Result of dependency tree construction
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallPlan {
    /// Install layers from depth 1; installed packages to remove at depth 0
    pub tree: DepthTree,
    /// Optional dependencies that could not be matched
    pub optional_missing: Vec<String>,
}

impl InstallPlan {
    /// Matches in install order (dependencies first)
    pub fn install_order(&self) -> Vec<Match> {
        self.tree
            .levels()
            .filter(|(depth, _)| *depth > 0)
            .flat_map(|(_, level)| level.iter().cloned())
            .collect()
    }

    /// Installed packages that conflict with the plan and cannot be replaced
    pub fn conflicts(&self) -> Vec<Match> {
        self.tree
            .level(0)
            .map(|level| level.iter().cloned().collect())
            .unwrap_or_default()
    }
}

/// Result of removal tree construction
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemovalPlan {
    /// Removal levels; roots at depth 0, dependents deeper
    pub tree: DepthTree,
    /// System packages that were requested or reached but kept
    pub blocked: Vec<Match>,
}

impl RemovalPlan {
    /// Matches in removal order (deepest level first)
    pub fn removal_order(&self) -> Vec<Match> {
        let mut levels: Vec<_> = self.tree.levels().collect();
        levels.reverse();
        levels
            .into_iter()
            .flat_map(|(_, level)| level.iter().cloned())
            .collect()
    }
}
