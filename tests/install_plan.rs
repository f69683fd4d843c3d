// tests/install_plan.rs

//! Integration tests for install tree construction.

mod common;

use common::{lib, pkg, pkg_with_deps, repo_match, specs};
use pkgplan::{
    Dependency, DependencyTreeBuilder, Error, InMemoryStore, Match, MaskingReasons, Resolver,
    TreeOptions,
};

fn plan(
    repo: &InMemoryStore,
    installed: &InMemoryStore,
    targets: &[&str],
    options: TreeOptions,
) -> pkgplan::Result<pkgplan::InstallPlan> {
    let resolver = Resolver::new(vec![repo], installed);
    resolver.install_plan(&specs(targets), options, &mut MaskingReasons::new())
}

#[test]
fn test_chain_installs_dependencies_first() {
    let mut repo = InMemoryStore::new("main");
    let a = repo.add(pkg_with_deps("app/a", "1.0", &["app/b"]));
    let b = repo.add(pkg_with_deps("app/b", "1.0", &["app/c"]));
    let c = repo.add(pkg("app/c", "1.0"));
    let installed = InMemoryStore::installed();

    let plan = plan(&repo, &installed, &["app/a"], TreeOptions::default()).unwrap();

    assert_eq!(plan.tree.depth_of(&repo_match(c, "main")), Some(1));
    assert_eq!(plan.tree.depth_of(&repo_match(b, "main")), Some(2));
    assert_eq!(plan.tree.depth_of(&repo_match(a, "main")), Some(3));
    assert_eq!(
        plan.install_order(),
        vec![repo_match(c, "main"), repo_match(b, "main"), repo_match(a, "main")]
    );
    assert!(plan.conflicts().is_empty());
}

#[test]
fn test_dependency_cycle_terminates() {
    let mut repo = InMemoryStore::new("main");
    let a = repo.add(pkg_with_deps("app/a", "1.0", &["app/b"]));
    let b = repo.add(pkg_with_deps("app/b", "1.0", &["app/a"]));
    let installed = InMemoryStore::installed();

    let plan = plan(&repo, &installed, &["app/a"], TreeOptions::default()).unwrap();

    assert_eq!(plan.tree.len(), 2);
    assert!(plan.tree.contains(&repo_match(a, "main")));
    assert!(plan.tree.contains(&repo_match(b, "main")));
}

#[test]
fn test_shared_dependency_appears_once() {
    let mut repo = InMemoryStore::new("main");
    repo.add(pkg_with_deps("app/a", "1.0", &["app/b", "dev/common"]));
    repo.add(pkg_with_deps("app/b", "1.0", &["dev/common"]));
    let common = repo.add(pkg("dev/common", "1.0"));
    let installed = InMemoryStore::installed();

    let plan = plan(&repo, &installed, &["app/a"], TreeOptions::default()).unwrap();

    assert_eq!(plan.tree.len(), 3);
    let occurrences = plan
        .install_order()
        .into_iter()
        .filter(|m| *m == repo_match(common, "main"))
        .count();
    assert_eq!(occurrences, 1);
    assert_eq!(plan.tree.depth_of(&repo_match(common, "main")), Some(1));
}

#[test]
fn test_diamond_dependency_installs_first() {
    let mut repo = InMemoryStore::new("main");
    let a = repo.add(pkg_with_deps("app/a", "1.0", &["dev/common", "app/b"]));
    let b = repo.add(pkg_with_deps("app/b", "1.0", &["dev/common"]));
    let common = repo.add(pkg("dev/common", "1.0"));
    let installed = InMemoryStore::installed();

    let plan = plan(&repo, &installed, &["app/a"], TreeOptions::default()).unwrap();

    let depth = |id| plan.tree.depth_of(&repo_match(id, "main")).unwrap();
    assert!(depth(common) < depth(b));
    assert!(depth(b) < depth(a));
    assert_eq!(
        plan.install_order(),
        vec![repo_match(common, "main"), repo_match(b, "main"), repo_match(a, "main")]
    );
}

#[test]
fn test_unmatched_dependency_is_reported() {
    let mut repo = InMemoryStore::new("main");
    repo.add(pkg_with_deps("app/a", "1.0", &["dev/missing", "app/b"]));
    repo.add(pkg("app/b", "1.0"));
    let installed = InMemoryStore::installed();

    let err = plan(&repo, &installed, &["app/a"], TreeOptions::default()).unwrap_err();
    match err {
        Error::UnresolvedDependencies(missing) => {
            assert_eq!(missing, vec!["dev/missing".to_string()]);
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[test]
fn test_unmatched_dependencies_aggregated() {
    let mut repo = InMemoryStore::new("main");
    repo.add(pkg_with_deps("app/a", "1.0", &["dev/missing", "app/b"]));
    repo.add(pkg_with_deps("app/b", "1.0", &["dev/absent"]));
    let installed = InMemoryStore::installed();

    let err = plan(&repo, &installed, &["app/a"], TreeOptions::default()).unwrap_err();
    match err {
        Error::UnresolvedDependencies(mut missing) => {
            missing.sort();
            assert_eq!(
                missing,
                vec!["dev/absent".to_string(), "dev/missing".to_string()]
            );
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[test]
fn test_malformed_candidate_version_aborts() {
    let mut repo = InMemoryStore::new("main");
    repo.add(pkg_with_deps("app/a", "1.0", &[">=dev/bad-1.0"]));
    repo.add(pkg("dev/bad", "1.x"));
    let installed = InMemoryStore::installed();

    let err = plan(&repo, &installed, &["app/a"], TreeOptions::default()).unwrap_err();
    assert!(matches!(err, Error::Malformed { .. }), "{:?}", err);
}

#[test]
fn test_unmatched_target_is_reported() {
    let repo = InMemoryStore::new("main");
    let installed = InMemoryStore::installed();

    let err = plan(&repo, &installed, &["app/nowhere"], TreeOptions::default()).unwrap_err();
    assert!(matches!(err, Error::UnresolvedDependencies(ref m) if m == &["app/nowhere"]));
}

#[test]
fn test_conflict_target_rejected() {
    let repo = InMemoryStore::new("main");
    let installed = InMemoryStore::installed();

    let err = plan(&repo, &installed, &["!app/a"], TreeOptions::default()).unwrap_err();
    assert!(matches!(err, Error::InvalidSpecifier { .. }));
}

#[test]
fn test_optional_dependencies() {
    let mut repo = InMemoryStore::new("main");
    let mut app = pkg("app/a", "1.0");
    app.dependencies = vec![
        Dependency::optional("app/extra"),
        Dependency::optional("app/ghost"),
    ];
    repo.add(app);
    let extra = repo.add(pkg("app/extra", "1.0"));
    let installed = InMemoryStore::installed();

    let plan_default = plan(&repo, &installed, &["app/a"], TreeOptions::default()).unwrap();
    assert_eq!(plan_default.tree.len(), 1);
    assert!(plan_default.optional_missing.is_empty());

    let options = TreeOptions {
        include_optional_deps: true,
        deep: false,
    };
    let plan_all = plan(&repo, &installed, &["app/a"], options).unwrap();
    assert!(plan_all.tree.contains(&repo_match(extra, "main")));
    assert_eq!(plan_all.optional_missing, vec!["app/ghost".to_string()]);
}

#[test]
fn test_installed_dependency_skipped() {
    let mut repo = InMemoryStore::new("main");
    let app = repo.add(pkg_with_deps("app/a", "1.0", &["dev/lib"]));
    repo.add(pkg("dev/lib", "1.0"));
    repo.add(pkg("dev/lib", "2.0"));
    let mut installed = InMemoryStore::installed();
    installed.add(pkg("dev/lib", "1.0"));

    let shallow = plan(&repo, &installed, &["app/a"], TreeOptions::default()).unwrap();
    assert_eq!(shallow.install_order(), vec![repo_match(app, "main")]);

    // Deep mode only accepts the installed package if it is the best match
    let options = TreeOptions {
        include_optional_deps: false,
        deep: true,
    };
    let deep = plan(&repo, &installed, &["app/a"], options).unwrap();
    assert_eq!(deep.tree.len(), 2);
    assert_eq!(deep.tree.depth_of(&repo_match(app, "main")), Some(2));
}

#[test]
fn test_unresolvable_conflict_at_depth_zero() {
    let mut repo = InMemoryStore::new("main");
    let mut new = pkg("app/new", "1.0");
    new.conflicts = vec!["app/old".to_string()];
    let new_id = repo.add(new);
    let mut installed = InMemoryStore::installed();
    let old = installed.add(pkg("app/old", "1.0"));

    let plan = plan(&repo, &installed, &["app/new"], TreeOptions::default()).unwrap();

    assert_eq!(plan.conflicts(), vec![Match::installed(old)]);
    assert_eq!(plan.tree.depth_of(&Match::installed(old)), Some(0));
    assert_eq!(plan.install_order(), vec![repo_match(new_id, "main")]);
}

#[test]
fn test_conflict_replaced_by_upgrade() {
    let mut repo = InMemoryStore::new("main");
    let mut new = pkg("app/new", "1.0");
    new.conflicts = vec!["!<app/old-2.0".to_string()];
    let new_id = repo.add(new);
    let upgrade = repo.add(pkg("app/old", "2.0"));
    let mut installed = InMemoryStore::installed();
    installed.add(pkg("app/old", "1.0"));

    let plan = plan(&repo, &installed, &["app/new"], TreeOptions::default()).unwrap();

    assert!(plan.conflicts().is_empty());
    assert_eq!(plan.tree.depth_of(&repo_match(upgrade, "main")), Some(1));
    assert_eq!(plan.tree.depth_of(&repo_match(new_id, "main")), Some(2));
}

#[test]
fn test_dropped_library_pulls_consumer_upgrade() {
    let mut repo = InMemoryStore::new("main");
    let mut libfoo = pkg("dev/libfoo", "2.0");
    libfoo.provided_libraries = vec![lib("libfoo.so.2")];
    let libfoo_id = repo.add(libfoo);
    let mut consumer = pkg("app/user", "1.1");
    consumer.needed = vec![lib("libfoo.so.2")];
    let consumer_id = repo.add(consumer);

    let mut installed = InMemoryStore::installed();
    let mut old_libfoo = pkg("dev/libfoo", "1.0");
    old_libfoo.provided_libraries = vec![lib("libfoo.so.1")];
    installed.add(old_libfoo);
    let mut old_consumer = pkg("app/user", "1.0");
    old_consumer.needed = vec![lib("libfoo.so.1")];
    installed.add(old_consumer);

    let plan = plan(&repo, &installed, &["dev/libfoo"], TreeOptions::default()).unwrap();

    assert_eq!(plan.tree.len(), 2);
    assert!(plan.tree.contains(&repo_match(libfoo_id, "main")));
    assert!(plan.tree.contains(&repo_match(consumer_id, "main")));
}

#[test]
fn test_needed_library_pulls_provider() {
    let mut repo = InMemoryStore::new("main");
    let mut app = pkg("app/tool", "2.0");
    app.needed = vec![lib("libbar.so.1")];
    let app_id = repo.add(app);
    let mut libbar = pkg("dev/libbar", "1.0");
    libbar.provided_libraries = vec![lib("libbar.so.1")];
    let libbar_id = repo.add(libbar);

    let mut installed = InMemoryStore::installed();
    installed.add(pkg("app/tool", "1.0"));

    let plan = plan(&repo, &installed, &["app/tool"], TreeOptions::default()).unwrap();

    assert_eq!(plan.tree.depth_of(&repo_match(libbar_id, "main")), Some(1));
    assert_eq!(plan.tree.depth_of(&repo_match(app_id, "main")), Some(2));
}

#[test]
fn test_library_still_provided_elsewhere() {
    let mut repo = InMemoryStore::new("main");
    repo.add(pkg("dev/libfoo", "2.0"));
    repo.add(pkg("app/user", "1.1"));

    let mut installed = InMemoryStore::installed();
    let mut old_libfoo = pkg("dev/libfoo", "1.0");
    old_libfoo.provided_libraries = vec![lib("libfoo.so.1")];
    installed.add(old_libfoo);
    let mut compat = pkg("dev/libfoo-compat", "1.0");
    compat.provided_libraries = vec![lib("libfoo.so.1")];
    installed.add(compat);
    let mut user = pkg("app/user", "1.0");
    user.needed = vec![lib("libfoo.so.1")];
    installed.add(user);

    let plan = plan(&repo, &installed, &["dev/libfoo"], TreeOptions::default()).unwrap();
    assert_eq!(plan.tree.len(), 1);
}

#[test]
fn test_broken_inverse_dependency_repulled() {
    let mut repo = InMemoryStore::new("main");
    let lib_id = repo.add(pkg("dev/lib", "2.0"));
    let tool_id = repo.add(pkg_with_deps("app/tool", "1.1", &["dev/lib"]));

    let mut installed = InMemoryStore::installed();
    installed.add(pkg("dev/lib", "1.0"));
    installed.add(pkg_with_deps("app/tool", "1.0", &["<dev/lib-2.0"]));

    let plan = plan(&repo, &installed, &["dev/lib"], TreeOptions::default()).unwrap();

    assert_eq!(plan.tree.len(), 2);
    assert_eq!(plan.tree.depth_of(&repo_match(lib_id, "main")), Some(1));
    assert_eq!(plan.tree.depth_of(&repo_match(tool_id, "main")), Some(1));
}

#[test]
fn test_compatible_inverse_dependency_untouched() {
    let mut repo = InMemoryStore::new("main");
    repo.add(pkg("dev/lib", "2.0"));
    repo.add(pkg_with_deps("app/tool", "1.1", &["dev/lib"]));

    let mut installed = InMemoryStore::installed();
    installed.add(pkg("dev/lib", "1.0"));
    installed.add(pkg_with_deps("app/tool", "1.0", &[">=dev/lib-1.0"]));

    let plan = plan(&repo, &installed, &["dev/lib"], TreeOptions::default()).unwrap();
    assert_eq!(plan.tree.len(), 1);
}

#[test]
fn test_filter_skips_matches() {
    let mut repo = InMemoryStore::new("main");
    let a = repo.add(pkg_with_deps("app/a", "1.0", &["app/b"]));
    let b = repo.add(pkg_with_deps("app/b", "1.0", &["app/c"]));
    repo.add(pkg("app/c", "1.0"));
    let installed = InMemoryStore::installed();
    let resolver = Resolver::new(vec![&repo], &installed);
    let matcher = resolver.matcher();

    let skipped = repo_match(b, "main");
    let plan = DependencyTreeBuilder::new(&matcher, &installed)
        .with_filter(move |m| *m != skipped)
        .build(
            &[repo_match(a, "main")],
            TreeOptions::default(),
            &mut MaskingReasons::new(),
        )
        .unwrap();

    // The filtered package is neither recorded nor expanded
    assert_eq!(plan.install_order(), vec![repo_match(a, "main")]);
}

#[test]
fn test_virtual_provider_satisfies_dependency() {
    let mut repo = InMemoryStore::new("main");
    repo.add(pkg_with_deps("app/mail", "1.0", &["virtual/mta"]));
    let mut mta = pkg("net/postfix", "3.8");
    mta.provides = vec!["virtual/mta".to_string()];
    let mta_id = repo.add(mta);
    let installed = InMemoryStore::installed();

    let plan = plan(&repo, &installed, &["app/mail"], TreeOptions::default()).unwrap();
    assert_eq!(plan.tree.depth_of(&repo_match(mta_id, "main")), Some(1));
}
