// src/commands.rs
//! Command implementations

use crate::cli::SourceArgs;
use anyhow::{Context, Result};
use pkgplan::{
    Catalog, DepthTree, Match, MatchMode, MaskingReasons, PackageStore, ResolverConfig, Resolver,
    ResultCache, Specifier, SqliteStore, TreeOptions, load_config,
};
use std::path::Path;
use tracing::info;

/// Stores and policy loaded from the command line
struct Sources {
    repositories: Vec<Box<dyn PackageStore>>,
    installed: Box<dyn PackageStore>,
    config: ResolverConfig,
}

impl Sources {
    fn load(args: &SourceArgs) -> Result<Self> {
        let mut repositories: Vec<Box<dyn PackageStore>> = Vec::new();
        let mut installed: Option<Box<dyn PackageStore>> = None;

        if let Some(ref path) = args.catalog {
            let catalog = Catalog::load(path)
                .with_context(|| format!("Failed to load catalog {}", path.display()))?;
            let (repos, inst) = catalog.into_stores();
            for repo in repos {
                repositories.push(Box::new(repo));
            }
            installed = Some(Box::new(inst));
        }

        for path in &args.repo_db {
            let store = SqliteStore::open(path)
                .with_context(|| format!("Failed to open repository store {}", path.display()))?;
            repositories.push(Box::new(store));
        }

        if let Some(ref path) = args.installed_db {
            let store = SqliteStore::open(path)
                .with_context(|| format!("Failed to open installed store {}", path.display()))?;
            installed = Some(Box::new(store));
        }

        let installed = match installed {
            Some(store) => store,
            None => Box::new(pkgplan::InMemoryStore::installed()),
        };

        let config = match args.config {
            Some(ref path) => load_config(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?,
            None => ResolverConfig::default(),
        };

        info!("Loaded {} repositories", repositories.len());

        Ok(Self {
            repositories,
            installed,
            config,
        })
    }

    fn resolver(&self, cache_dir: Option<&Path>) -> Result<Resolver<'_>> {
        let repositories = self
            .repositories
            .iter()
            .map(|r| r.as_ref() as &dyn PackageStore)
            .collect();
        let mut resolver =
            Resolver::new(repositories, self.installed.as_ref()).with_config(&self.config)?;
        if let Some(dir) = cache_dir {
            resolver = resolver.with_cache(ResultCache::new(dir)?);
        }
        Ok(resolver)
    }

    /// Human-readable description of a match
    fn describe(&self, m: &Match) -> Result<String> {
        let store: Option<&dyn PackageStore> = if m.is_installed() {
            Some(self.installed.as_ref() as &dyn PackageStore)
        } else {
            self.repositories
                .iter()
                .map(|r| r.as_ref() as &dyn PackageStore)
                .find(|r| r.repository_id() == &m.repository)
        };
        match store {
            Some(store) => Ok(format!(
                "{} [{}]",
                store.record(m.package_id)?.atom(),
                m.repository.name()
            )),
            None => Ok(m.to_string()),
        }
    }

    fn print_tree(&self, tree: &DepthTree) -> Result<()> {
        for (depth, level) in tree.levels() {
            println!("  Level {}:", depth);
            for m in level {
                println!("    {}", self.describe(m)?);
            }
        }
        Ok(())
    }
}

fn parse_specs(texts: &[String]) -> Result<Vec<Specifier>> {
    texts
        .iter()
        .map(|t| Specifier::parse(t).with_context(|| format!("Invalid specifier '{}'", t)))
        .collect()
}

fn print_reasons(reasons: &MaskingReasons) {
    if reasons.is_empty() {
        return;
    }
    println!("Masked packages:");
    for (spec, list) in reasons.iter() {
        for reason in list {
            println!("  {}: {}", spec, reason);
        }
    }
}

/// Resolve a specifier and print the selected package(s)
pub fn cmd_match(spec: &str, all: bool, args: &SourceArgs) -> Result<()> {
    let sources = Sources::load(args)?;
    let resolver = sources.resolver(None)?;
    let mut reasons = MaskingReasons::new();
    let mode = if all { MatchMode::Multi } else { MatchMode::Single };

    let result = resolver.match_atom(spec, mode, &mut reasons);
    print_reasons(&reasons);

    for m in result?.into_matches() {
        println!("{}", sources.describe(&m)?);
    }
    Ok(())
}

/// Plan an installation and print its levels
pub fn cmd_install(
    targets: &[String],
    deep: bool,
    with_optional: bool,
    cache_dir: Option<&Path>,
    args: &SourceArgs,
) -> Result<()> {
    let sources = Sources::load(args)?;
    let resolver = sources.resolver(cache_dir)?;
    let specs = parse_specs(targets)?;
    let options = TreeOptions {
        include_optional_deps: with_optional,
        deep,
    };

    let mut reasons = MaskingReasons::new();
    let result = resolver.install_plan(&specs, options, &mut reasons);
    print_reasons(&reasons);
    let plan = result?;

    println!("Install plan ({} packages):", plan.install_order().len());
    sources.print_tree(&plan.tree)?;

    let conflicts = plan.conflicts();
    if !conflicts.is_empty() {
        println!("Conflicting installed packages:");
        for m in &conflicts {
            println!("  {}", sources.describe(m)?);
        }
    }
    if !plan.optional_missing.is_empty() {
        println!("Optional dependencies not found: {}", plan.optional_missing.join(", "));
    }
    Ok(())
}

/// Plan a removal and print its levels
pub fn cmd_remove(
    targets: &[String],
    deep: bool,
    cache_dir: Option<&Path>,
    args: &SourceArgs,
) -> Result<()> {
    let sources = Sources::load(args)?;
    let resolver = sources.resolver(cache_dir)?;
    let specs = parse_specs(targets)?;

    let plan = resolver.removal_plan_for(&specs, deep)?;

    println!("Removal plan ({} packages, deepest level first):", plan.tree.len());
    let mut levels: Vec<_> = plan.tree.levels().collect();
    levels.reverse();
    for (depth, level) in levels {
        println!("  Level {}:", depth);
        for m in level {
            println!("    {}", sources.describe(m)?);
        }
    }

    if !plan.blocked.is_empty() {
        println!("Kept system packages:");
        for m in &plan.blocked {
            println!("  {}", sources.describe(m)?);
        }
    }
    Ok(())
}
