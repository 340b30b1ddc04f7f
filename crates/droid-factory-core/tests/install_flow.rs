//! Load → discover → plan → install, locally and over HTTP.

mod common;

use std::fs;
use std::path::Path;

use common::{touch, tree_body, MockEnv};
use droid_factory_core::installer::{download_dir, download_file, InstallOptions, ItemOutcome};
use droid_factory_core::marketplace::{RemoteRepo, RemoteResource};
use droid_factory_core::{
    compute_marketplace_plan, discover_plugins, load_marketplace, normalize_plugins, Auth,
    DestDirs, Installer, PlanOptions, PluginSelection, SourceType,
};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

fn write_marketplace(root: &Path, manifest: &str) {
    touch(root, ".claude-plugin/marketplace.json", manifest);
}

fn file_names(items: &[droid_factory_core::InstallPlanItem]) -> Vec<String> {
    items
        .iter()
        .map(|i| i.dest.file_name().unwrap().to_string_lossy().to_string())
        .collect()
}

#[test]
fn test_local_marketplace_end_to_end() {
    let market = TempDir::new().unwrap();
    let target = TempDir::new().unwrap();
    let root = market.path();

    write_marketplace(root, r#"{"plugins": [{"name": "demo", "source": "./demo"}]}"#);
    touch(root, "demo/commands/plan.md", "# plan");
    touch(root, "demo/commands/workflows/review.md", "# review");
    touch(root, "demo/skills/frontend/SKILL.md", "# frontend");
    touch(root, "demo/skills/frontend/reference/tips.md", "tips");

    let env = MockEnv::start();
    let mut session = env.session();
    let loaded = load_marketplace(&mut session, &root.display().to_string(), None).unwrap();
    let records = normalize_plugins(&loaded.json);
    let discovered = discover_plugins(
        &mut session,
        &records,
        &loaded.context,
        &PluginSelection::All,
        None,
    );

    let dirs = DestDirs::under(&target.path().join(".factory"));
    let plan = compute_marketplace_plan(&PluginSelection::All, &discovered, &dirs, &PlanOptions::default());

    assert!(plan.unresolved.is_empty(), "{:?}", plan.unresolved);
    let mut commands = file_names(&plan.commands);
    commands.sort();
    assert_eq!(commands, vec!["plan.md", "workflows__review.md"]);
    let mut names: Vec<_> = plan.commands.iter().map(|i| i.name.as_str()).collect();
    names.sort();
    assert_eq!(names, vec!["plan", "workflows__review"]);
    assert_eq!(plan.skills.len(), 1);
    assert_eq!(plan.skills[0].name, "frontend");
    assert!(plan.skills[0].is_skill);
    assert!(plan.all_items().all(|i| i.src_type == SourceType::Local));

    let mut installer = Installer::new(&mut session, InstallOptions::default());
    let result = installer.install_plan(&plan, None);
    assert_eq!(result.written, 3);
    assert_eq!(result.failed(), 0);

    let factory = target.path().join(".factory");
    assert_eq!(
        fs::read_to_string(factory.join("commands/workflows__review.md")).unwrap(),
        "# review"
    );
    assert!(factory.join("skills/frontend/SKILL.md").is_file());
    assert!(factory.join("skills/frontend/reference/tips.md").is_file());

    // Running again changes nothing
    let again = installer.install_plan(&plan, None);
    assert_eq!(again.unchanged, 3);
    assert_eq!(session.request_count(), 0);
}

#[test]
fn test_unsupported_plugin_is_one_unresolved_entry() {
    let market = TempDir::new().unwrap();
    let root = market.path();
    write_marketplace(
        root,
        r#"{"plugins": [
            {"name": "a", "source": {"source": "npm", "package": "a"}},
            {"name": "b", "source": "./b"}
        ]}"#,
    );
    touch(root, "b/commands/one.md", "1");
    touch(root, "b/commands/two.md", "2");
    touch(root, "b/commands/three.md", "3");

    let env = MockEnv::start();
    let mut session = env.session();
    let loaded = load_marketplace(&mut session, &root.display().to_string(), None).unwrap();
    let discovered = discover_plugins(
        &mut session,
        &normalize_plugins(&loaded.json),
        &loaded.context,
        &PluginSelection::All,
        None,
    );
    let plan = compute_marketplace_plan(
        &PluginSelection::All,
        &discovered,
        &DestDirs::under(Path::new("/unused")),
        &PlanOptions::default(),
    );

    assert_eq!(plan.unresolved.len(), 1);
    assert_eq!(plan.unresolved[0].plugin, "a");
    assert_eq!(plan.commands.len(), 3);
    assert!(plan.commands.iter().all(|i| i.plugin == "b"));
}

#[test]
fn test_remote_marketplace_installs_files_and_skills() {
    let env = MockEnv::start();
    let target = TempDir::new().unwrap();

    env.mount(
        Mock::given(method("GET"))
            .and(path("/acme/tools/main/.claude-plugin/marketplace.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "plugins": [{"name": "demo", "source": "./plugins/demo"}]
            }))),
    );
    env.mount(
        Mock::given(method("GET"))
            .and(path("/repos/acme/tools/git/trees/main"))
            .respond_with(ResponseTemplate::new(200).set_body_json(tree_body(&[
                "plugins/demo/commands/plan.md",
                "plugins/demo/skills/frontend/SKILL.md",
                "plugins/demo/skills/frontend/assets/a.txt",
            ])))
            .expect(1),
    );
    for (file, body) in [
        ("plugins/demo/commands/plan.md", "# plan"),
        ("plugins/demo/skills/frontend/SKILL.md", "# skill"),
        ("plugins/demo/skills/frontend/assets/a.txt", "asset"),
    ] {
        env.mount(
            Mock::given(method("GET"))
                .and(path(format!("/acme/tools/main/{}", file)))
                .respond_with(ResponseTemplate::new(200).set_body_string(body)),
        );
    }

    let mut session = env.session();
    let loaded = load_marketplace(&mut session, "acme/tools", None).unwrap();
    let discovered = discover_plugins(
        &mut session,
        &normalize_plugins(&loaded.json),
        &loaded.context,
        &PluginSelection::All,
        None,
    );
    let dirs = DestDirs::under(target.path());
    let plan = compute_marketplace_plan(&PluginSelection::All, &discovered, &dirs, &PlanOptions::default());
    assert_eq!(plan.total_items(), 2);
    assert!(plan.all_items().all(|i| i.src_type == SourceType::Remote));

    let result = Installer::new(&mut session, InstallOptions::default()).install_plan(&plan, None);
    assert_eq!(result.written, 2, "{:?}", result.failures);
    assert_eq!(fs::read_to_string(target.path().join("commands/plan.md")).unwrap(), "# plan");
    assert_eq!(
        fs::read_to_string(target.path().join("skills/frontend/assets/a.txt")).unwrap(),
        "asset"
    );
}

#[test]
fn test_failed_download_leaves_nothing_behind() {
    let env = MockEnv::start();
    env.mount(
        Mock::given(method("GET"))
            .and(path("/broken.md"))
            .respond_with(ResponseTemplate::new(500)),
    );

    let target = TempDir::new().unwrap();
    let dest = target.path().join("commands/broken.md");
    let mut session = env.session();

    let err = download_file(
        &mut session,
        &format!("{}/broken.md", env.uri()),
        Auth::None,
        &dest,
        InstallOptions::default(),
    )
    .unwrap_err();

    assert_eq!(err.exit_code(), 4);
    assert!(!dest.exists());
    let leftovers = fs::read_dir(target.path())
        .map(|rd| rd.count())
        .unwrap_or(0);
    assert_eq!(leftovers, 0);
}

#[test]
fn test_existing_download_target_is_skipped_without_request() {
    let env = MockEnv::start();
    let target = TempDir::new().unwrap();
    let dest = target.path().join("plan.md");
    fs::write(&dest, "mine").unwrap();

    let mut session = env.session();
    let outcome = download_file(
        &mut session,
        &format!("{}/plan.md", env.uri()),
        Auth::None,
        &dest,
        InstallOptions::default(),
    )
    .unwrap();

    assert_eq!(outcome, ItemOutcome::Skipped);
    assert_eq!(fs::read_to_string(&dest).unwrap(), "mine");
    assert_eq!(session.request_count(), 0);
}

#[test]
fn test_failed_skill_file_discards_whole_skill() {
    let env = MockEnv::start();
    let target = TempDir::new().unwrap();

    env.mount(
        Mock::given(method("GET"))
            .and(path("/acme/tools/main/.claude-plugin/marketplace.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "plugins": [{"name": "demo", "source": "./plugins/demo"}]
            }))),
    );
    env.mount(
        Mock::given(method("GET"))
            .and(path("/repos/acme/tools/git/trees/main"))
            .respond_with(ResponseTemplate::new(200).set_body_json(tree_body(&[
                "plugins/demo/skills/frontend/SKILL.md",
                "plugins/demo/skills/frontend/z.txt",
            ]))),
    );
    env.mount(
        Mock::given(method("GET"))
            .and(path("/acme/tools/main/plugins/demo/skills/frontend/SKILL.md"))
            .respond_with(ResponseTemplate::new(200).set_body_string("# skill")),
    );
    env.mount(
        Mock::given(method("GET"))
            .and(path("/acme/tools/main/plugins/demo/skills/frontend/z.txt"))
            .respond_with(ResponseTemplate::new(500)),
    );

    let mut session = env.session();
    let loaded = load_marketplace(&mut session, "acme/tools", None).unwrap();
    let discovered = discover_plugins(
        &mut session,
        &normalize_plugins(&loaded.json),
        &loaded.context,
        &PluginSelection::All,
        None,
    );
    let dirs = DestDirs::under(target.path());
    let plan = compute_marketplace_plan(&PluginSelection::All, &discovered, &dirs, &PlanOptions::default());
    assert_eq!(plan.skills.len(), 1);

    let mut installer = Installer::new(&mut session, InstallOptions::default());
    let first = installer.install_plan(&plan, None);
    assert_eq!(first.failed(), 1);
    assert_eq!(first.written, 0);

    let skills = target.path().join("skills");
    assert!(!skills.join("frontend").exists());
    let leftovers = fs::read_dir(&skills).map(|rd| rd.count()).unwrap_or(0);
    assert_eq!(leftovers, 0);

    // The next run retries instead of reporting a skip
    let second = installer.install_plan(&plan, None);
    assert_eq!(second.skipped, 0);
    assert_eq!(second.failed(), 1);
}

#[test]
fn test_forced_skill_download_replaces_stale_files() {
    let env = MockEnv::start();
    let target = TempDir::new().unwrap();
    let dest = target.path().join("frontend");
    touch(&dest, "SKILL.md", "old");
    touch(&dest, "stale.txt", "gone");

    env.mount(
        Mock::given(method("GET"))
            .and(path("/repos/acme/tools/git/trees/main"))
            .respond_with(ResponseTemplate::new(200).set_body_json(tree_body(&["skills/frontend/SKILL.md"]))),
    );
    env.mount(
        Mock::given(method("GET"))
            .and(path("/acme/tools/main/skills/frontend/SKILL.md"))
            .respond_with(ResponseTemplate::new(200).set_body_string("new")),
    );

    let mut session = env.session();
    let remote = RemoteResource {
        url: format!("{}/acme/tools/main/skills/frontend", env.uri()),
        repo: RemoteRepo::GitHub {
            owner: "acme".into(),
            repo: "tools".into(),
            git_ref: "main".into(),
        },
        path: "skills/frontend".into(),
    };
    let force = InstallOptions {
        force: true,
        dry_run: false,
    };

    assert_eq!(download_dir(&mut session, &remote, &dest, force).unwrap(), ItemOutcome::Written);
    assert_eq!(fs::read_to_string(dest.join("SKILL.md")).unwrap(), "new");
    assert!(!dest.join("stale.txt").exists());

    assert_eq!(download_dir(&mut session, &remote, &dest, force).unwrap(), ItemOutcome::Unchanged);
    assert_eq!(fs::read_dir(target.path()).unwrap().count(), 1);
}
