use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{CommandFactory, Parser};
use clap_complete::generate;
use colored::Colorize;
use tracing_subscriber::EnvFilter;

use droid_factory_core::config::Config;
use droid_factory_core::{
    compute_marketplace_plan, discover_plugins, discover_template_dir, load_marketplace,
    normalize_plugins, DestDirs, DiscoveredPlugin, DroidFactoryError, InstallOptions, Installer,
    LoadedMarketplace, MarketplacePlan, PluginSelection, ResourceKind, Result, Session,
};

mod args;
mod progress;
use args::{Cli, Commands, ConfigAction, Shell, TargetArgs};
use progress::{watch_interrupt, Progress};

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    let progress = Progress::new(!cli.debug);
    watch_interrupt(progress.clone());

    let base_dir = resolve_base_dir(cli.base_dir);

    let result = match cli.command {
        Some(Commands::Install {
            marketplace,
            git_ref,
            plugins,
            target,
        }) => handle_install(
            &base_dir,
            &progress,
            &marketplace,
            git_ref.as_deref(),
            &plugins,
            &target,
        ),
        Some(Commands::List {
            marketplace,
            git_ref,
            plugins,
            json,
        }) => handle_list(&base_dir, &progress, &marketplace, git_ref.as_deref(), &plugins, json),
        Some(Commands::Templates { dir, target }) => handle_templates(&base_dir, &dir, &target),
        Some(Commands::Config { action }) => handle_config(action, &base_dir),
        Some(Commands::Completions { shell }) => {
            handle_completions(shell);
            Ok(())
        }
        None => {
            Cli::command().print_help().ok();
            Ok(())
        }
    };
    progress.finish();

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", "[ERROR]".red().bold(), e);
            ExitCode::from(e.exit_code() as u8)
        }
    }
}

/// Logs go to stderr. `--debug` turns on per-request logging; `RUST_LOG`
/// overrides either default.
fn init_tracing(debug: bool) {
    let default = if debug {
        "warn,droid_factory_core=debug,droid_factory=debug"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(debug)
        .init();
}

fn handle_completions(shell: Shell) {
    let mut cmd = Cli::command();
    let shell = match shell {
        Shell::Bash => clap_complete::Shell::Bash,
        Shell::Zsh => clap_complete::Shell::Zsh,
        Shell::Fish => clap_complete::Shell::Fish,
        Shell::PowerShell => clap_complete::Shell::PowerShell,
        Shell::Elvish => clap_complete::Shell::Elvish,
    };
    generate(shell, &mut cmd, "droid-factory", &mut io::stdout());
}

fn resolve_base_dir(cli_base: Option<PathBuf>) -> PathBuf {
    if let Some(base) = cli_base {
        return base;
    }

    if let Ok(base) = std::env::var("DROID_FACTORY_BASE") {
        return PathBuf::from(base);
    }

    dirs::home_dir()
        .map(|h| h.join(".droid-factory"))
        .unwrap_or_else(|| PathBuf::from(".droid-factory"))
}

fn handle_config(action: ConfigAction, base_dir: &Path) -> Result<()> {
    match action {
        ConfigAction::Get { key } => {
            let config = Config::load(base_dir)?;
            match config.get(&key) {
                Some(value) => println!("{}", value),
                None => return Err(DroidFactoryError::ConfigKeyNotFound { key }),
            }
        }
        ConfigAction::Set { key, value } => {
            let mut config = Config::load(base_dir)?;
            config.set(&key, &value)?;
            config.save(base_dir)?;
            println!("{} {} = {}", "Set:".green(), key, value);
        }
        ConfigAction::List => {
            let config = Config::load(base_dir)?;
            println!();
            for (key, value) in config.list() {
                println!("{} = {}", key.cyan(), value);
            }
            println!();
        }
        ConfigAction::Path => {
            println!("{}", Config::path(base_dir).display());
        }
        ConfigAction::Init => {
            let path = Config::init(base_dir)?;
            println!("{} {}", "Initialized:".green(), path.display());
        }
    }

    Ok(())
}

/// Load a marketplace and scan the selected plugins behind the spinner
fn discover(
    session: &mut Session,
    progress: &Progress,
    marketplace: &str,
    git_ref: Option<&str>,
    plugins: &PluginSelection,
) -> Result<(LoadedMarketplace, Vec<DiscoveredPlugin>)> {
    progress.start(format!("Loading marketplace {}", marketplace));
    let loaded = load_marketplace(session, marketplace, git_ref)?;
    let records = normalize_plugins(&loaded.json);

    let on_plugin = |name: &str| progress.set_message(format!("Scanning {}", name));
    let discovered = discover_plugins(session, &records, &loaded.context, plugins, Some(&on_plugin));
    progress.finish();

    Ok((loaded, discovered))
}

fn handle_install(
    base_dir: &Path,
    progress: &Progress,
    marketplace: &str,
    git_ref: Option<&str>,
    plugins: &PluginSelection,
    target: &TargetArgs,
) -> Result<()> {
    let config = Config::load(base_dir)?;
    let mut session = Session::from_config(&config)?;
    let root = target.scope.factory_dir(target.path.as_deref())?;

    let (loaded, discovered) = discover(&mut session, progress, marketplace, git_ref, plugins)?;

    println!();
    println!("Marketplace: {}", loaded.name().unwrap_or(marketplace).cyan());
    println!("Source: {}", loaded.context);
    println!("Target: {} ({})", root.display(), target.scope);

    print_discovery_warnings(&discovered, &session, &config.github.token_env);

    let plan = compute_marketplace_plan(
        plugins,
        &discovered,
        &DestDirs::under(&root),
        &config.plan_options(),
    );
    print_plan_notes(&plan, &discovered);

    execute_plan(&mut session, &plan, &root, target)
}

fn handle_list(
    base_dir: &Path,
    progress: &Progress,
    marketplace: &str,
    git_ref: Option<&str>,
    plugins: &PluginSelection,
    json: bool,
) -> Result<()> {
    let config = Config::load(base_dir)?;
    let mut session = Session::from_config(&config)?;

    let (loaded, discovered) = discover(&mut session, progress, marketplace, git_ref, plugins)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&discovered)?);
        return Ok(());
    }

    println!();
    println!("Marketplace: {}", loaded.name().unwrap_or(marketplace).cyan());
    println!("Source: {}", loaded.context);
    println!();

    if discovered.is_empty() {
        println!("No plugins found.");
        return Ok(());
    }

    for plugin in &discovered {
        match &plugin.version {
            Some(v) => println!("  {} {}", plugin.name.cyan().bold(), v.dimmed()),
            None => println!("  {}", plugin.name.cyan().bold()),
        }
        if !plugin.description.is_empty() {
            println!("    {}", plugin.description);
        }
        println!("    Source: {}", plugin.source);
        for kind in ResourceKind::ALL {
            let resources = plugin.resources(kind);
            if resources.is_empty() {
                continue;
            }
            let names: Vec<&str> = resources.iter().map(|r| r.rel_path.as_str()).collect();
            println!("    {}: {}", kind_label(kind), names.join(", "));
        }
        for error in &plugin.errors {
            println!("    {} {}", "[WARN]".yellow(), error);
        }
        println!();
    }

    print_rate_limit(&session);
    Ok(())
}

fn handle_templates(base_dir: &Path, dir: &Path, target: &TargetArgs) -> Result<()> {
    let config = Config::load(base_dir)?;
    let mut session = Session::from_config(&config)?;
    let root = target.scope.factory_dir(target.path.as_deref())?;

    let plugin = discover_template_dir(dir)?;

    println!();
    println!("Templates: {}", dir.display().to_string().cyan());
    println!("Target: {} ({})", root.display(), target.scope);

    for error in &plugin.errors {
        println!("  {} {}", "[WARN]".yellow(), error);
    }

    let discovered = [plugin];
    let plan = compute_marketplace_plan(
        &PluginSelection::All,
        &discovered,
        &DestDirs::under(&root),
        &config.plan_options(),
    );
    print_plan_notes(&plan, &discovered);

    execute_plan(&mut session, &plan, &root, target)
}

fn execute_plan(
    session: &mut Session,
    plan: &MarketplacePlan,
    root: &Path,
    target: &TargetArgs,
) -> Result<()> {
    println!();
    if plan.total_items() == 0 {
        println!("Nothing to install.");
        return Ok(());
    }

    for kind in ResourceKind::ALL {
        let count = plan.items(kind).len();
        if count > 0 {
            println!("  {}: {}", kind_label(kind), count);
        }
    }
    if target.dry_run {
        println!("{}", "(dry run)".yellow());
    }
    println!();
    println!("Installing...");

    let on_file = |status: &str, path: &str| {
        let status_str = match status {
            "OK" => format!("[{}]", status).green(),
            "SKIP" => format!("[{}]", status).yellow(),
            "SAME" => format!("[{}]", status).dimmed(),
            "FAIL" => format!("[{}]", status).red().bold(),
            _ => format!("[{}]", status).normal(),
        };
        println!("  {} {}", status_str, path);
    };

    let options = InstallOptions {
        force: target.force,
        dry_run: target.dry_run,
    };
    let result = Installer::new(session, options).install_plan(plan, Some(&on_file));

    println!();
    println!("Summary:");
    println!("  Installed: {}", result.written);
    println!("  Unchanged: {}", result.unchanged);
    println!("  Skipped: {}", result.skipped);
    println!("  Failed: {}", result.failed());

    if result.skipped > 0 && !target.force {
        println!("  (use --force to overwrite skipped files)");
    }

    print_rate_limit(session);

    if result.failed() > 0 {
        println!();
        for (path, reason) in &result.failures {
            println!("  {} {}: {}", "[FAIL]".red(), path.display(), reason);
        }
        return Err(DroidFactoryError::InstallFailed {
            failed: result.failed(),
            total: plan.total_items(),
        });
    }

    println!();
    println!("{} {}", "Installation complete:".green(), root.display());
    Ok(())
}

/// One line per failing plugin with its first error
fn print_discovery_warnings(discovered: &[DiscoveredPlugin], session: &Session, token_env: &str) {
    let failing: Vec<&DiscoveredPlugin> = discovered.iter().filter(|p| !p.errors.is_empty()).collect();
    if failing.is_empty() {
        return;
    }

    println!();
    println!("{}", "Warnings:".yellow().bold());
    for plugin in &failing {
        let more = match plugin.errors.len() {
            1 => String::new(),
            n => format!(" (+{} more)", n - 1),
        };
        println!("  {} {}: {}{}", "[WARN]".yellow(), plugin.name, plugin.errors[0], more);
    }

    if looks_rate_limited(&failing, session) && !session.has_github_token() {
        println!(
            "  Hint: set {} (or GH_TOKEN) to raise the GitHub API rate limit",
            token_env.cyan()
        );
    }
}

fn looks_rate_limited(failing: &[&DiscoveredPlugin], session: &Session) -> bool {
    if session.rate_limit().is_some_and(|r| r.remaining == 0) {
        return true;
    }
    failing.iter().flat_map(|p| p.errors.iter()).any(|e| {
        let e = e.to_lowercase();
        e.contains("403") || e.contains("429") || e.contains("rate limit")
    })
}

fn print_rate_limit(session: &Session) {
    let Some(info) = session.rate_limit() else {
        return;
    };
    if !info.is_low() {
        return;
    }
    let reset = info
        .reset
        .map(|t| {
            format!(
                ", resets at {}",
                t.with_timezone(&chrono::Local).format("%H:%M:%S")
            )
        })
        .unwrap_or_default();
    println!();
    println!(
        "{} API rate limit low: {}/{} remaining{}",
        "[WARN]".yellow().bold(),
        info.remaining,
        info.limit,
        reset
    );
}

/// Unresolved plugins and collisions. Scan errors were already shown as
/// warnings and are not repeated.
fn print_plan_notes(plan: &MarketplacePlan, discovered: &[DiscoveredPlugin]) {
    let warned = |name: &str| discovered.iter().any(|p| p.name == name && !p.errors.is_empty());
    let unresolved: Vec<_> = plan.unresolved.iter().filter(|u| !warned(&u.plugin)).collect();
    if unresolved.is_empty() && plan.collisions.is_empty() {
        return;
    }

    println!();
    for entry in unresolved {
        println!("  {} {}: {}", "[UNRESOLVED]".red(), entry.plugin, entry.reason);
    }
    for collision in &plan.collisions {
        println!("  {} {}", "[COLLISION]".yellow(), collision);
    }
}

fn kind_label(kind: ResourceKind) -> &'static str {
    match kind {
        ResourceKind::Agents => "droids",
        other => other.dir_name(),
    }
}
