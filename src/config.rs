// src/config.rs

//! Resolver configuration file
//!
//! ```toml
//! [resolver]
//! local_overlay_wins = true
//!
//! [mask]
//! packages = [">=app/foo-2"]
//! unmask = ["=app/foo-2.0"]
//!
//! [repository.main]
//! keywords = ["~amd64"]
//!
//! [repository.main.mask]
//! testing = ["app/experimental"]
//!
//! [keywords]
//! accept = ["amd64"]
//!
//! [keywords.package]
//! "app/bar" = ["~amd64"]
//!
//! [license]
//! accept = ["MIT", "GPL-2"]
//! ```
//!
//! Every section is optional; an empty file accepts everything.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Top-level resolver configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolverConfig {
    #[serde(default)]
    pub resolver: MatchPolicy,

    /// Global package masks and unmasks
    #[serde(default)]
    pub mask: MaskConfig,

    /// Per-repository policy, by repository name
    #[serde(default)]
    pub repository: BTreeMap<String, RepositoryPolicy>,

    #[serde(default)]
    pub keywords: KeywordConfig,

    #[serde(default)]
    pub license: LicenseConfig,
}

/// Candidate selection knobs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchPolicy {
    /// A locally-supplied repository with survivors wins over newer versions elsewhere
    #[serde(default = "default_true")]
    pub local_overlay_wins: bool,
}

impl Default for MatchPolicy {
    fn default() -> Self {
        Self {
            local_overlay_wins: true,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Global `[mask]` section
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaskConfig {
    /// Specifiers of packages that must never be selected
    #[serde(default)]
    pub packages: Vec<String>,

    /// Specifiers accepted outright, bypassing every other check
    #[serde(default)]
    pub unmask: Vec<String>,
}

/// `[repository.<name>]` section
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryPolicy {
    /// Keywords accepted for packages from this repository
    #[serde(default)]
    pub keywords: Vec<String>,

    /// Branch name to masked specifiers
    #[serde(default)]
    pub mask: BTreeMap<String, Vec<String>>,
}

/// `[keywords]` section
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordConfig {
    /// Globally accepted keywords
    #[serde(default)]
    pub accept: Vec<String>,

    /// Extra keywords accepted for packages matching a specifier
    #[serde(default)]
    pub package: BTreeMap<String, Vec<String>>,
}

/// `[license]` section
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicenseConfig {
    /// Accepted licenses; empty accepts every license
    #[serde(default)]
    pub accept: Vec<String>,
}

/// Parse a resolver configuration file
pub fn load_config(path: &Path) -> Result<ResolverConfig> {
    let content = std::fs::read_to_string(path)?;
    parse_config_string(&content)
}

/// Parse resolver configuration from a string
pub fn parse_config_string(content: &str) -> Result<ResolverConfig> {
    Ok(toml::from_str(content)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_empty_config_defaults() {
        let config = parse_config_string("").unwrap();
        assert!(config.resolver.local_overlay_wins);
        assert!(config.mask.packages.is_empty());
        assert!(config.license.accept.is_empty());
    }

    #[test]
    fn test_full_config() {
        let toml = r#"
[resolver]
local_overlay_wins = false

[mask]
packages = [">=app/foo-2"]
unmask = ["=app/foo-2.0"]

[repository.main]
keywords = ["~amd64"]

[repository.main.mask]
testing = ["app/experimental"]

[keywords]
accept = ["amd64"]

[keywords.package]
"app/bar" = ["~amd64"]

[license]
accept = ["MIT"]
"#;
        let config = parse_config_string(toml).unwrap();
        assert!(!config.resolver.local_overlay_wins);
        assert_eq!(config.mask.unmask, vec!["=app/foo-2.0"]);
        let main = &config.repository["main"];
        assert_eq!(main.keywords, vec!["~amd64"]);
        assert_eq!(main.mask["testing"], vec!["app/experimental"]);
        assert_eq!(config.keywords.package["app/bar"], vec!["~amd64"]);
        assert_eq!(config.license.accept, vec!["MIT"]);
    }

    #[test]
    fn test_load_config_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[license]\naccept = [\"BSD\"]").unwrap();
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.license.accept, vec!["BSD"]);
    }

    #[test]
    fn test_unknown_types_rejected() {
        assert!(parse_config_string("[resolver]\nlocal_overlay_wins = \"yes\"").is_err());
    }
}
