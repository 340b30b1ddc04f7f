use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use droid_factory_core::{InstallScope, PluginSelection};

#[derive(Parser)]
#[command(name = "droid-factory")]
#[command(about = "Install commands, droids, hooks and skills from plugin marketplaces")]
#[command(version)]
pub struct Cli {
    /// Verbose per-request logging (disables the spinner)
    #[arg(long, global = true)]
    pub debug: bool,

    /// Base directory (default: ~/.droid-factory)
    #[arg(long, global = true)]
    pub base_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
#[allow(clippy::enum_variant_names)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}

/// Where installed files land
#[derive(Args, Clone, Debug)]
pub struct TargetArgs {
    /// Install scope (personal: ~/.factory, project: <path>/.factory)
    #[arg(long, default_value = "personal", value_parser = parse_scope)]
    pub scope: InstallScope,

    /// Project root for --scope project (default: current directory)
    #[arg(long)]
    pub path: Option<PathBuf>,

    /// Overwrite existing files
    #[arg(short, long)]
    pub force: bool,

    /// Show what would be installed without writing anything
    #[arg(short, long)]
    pub dry_run: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Install plugins from a marketplace
    Install {
        /// Marketplace: local path, owner/repo, GitHub/GitLab URL or manifest URL
        marketplace: String,

        /// Git ref (default: main, then master)
        #[arg(long = "ref", value_name = "REF")]
        git_ref: Option<String>,

        /// Plugins to install: "all" or a comma-separated list
        #[arg(short, long, default_value = "all", value_parser = parse_selection)]
        plugins: PluginSelection,

        #[command(flatten)]
        target: TargetArgs,
    },

    /// List the plugins of a marketplace and what they contain
    List {
        /// Marketplace: local path, owner/repo, GitHub/GitLab URL or manifest URL
        marketplace: String,

        /// Git ref (default: main, then master)
        #[arg(long = "ref", value_name = "REF")]
        git_ref: Option<String>,

        /// Plugins to show: "all" or a comma-separated list
        #[arg(short, long, default_value = "all", value_parser = parse_selection)]
        plugins: PluginSelection,

        /// Print discovered plugins as JSON
        #[arg(long)]
        json: bool,
    },

    /// Install a local template directory (commands/, droids/, hooks/, skills/)
    Templates {
        /// Template directory
        dir: PathBuf,

        #[command(flatten)]
        target: TargetArgs,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Create config.toml with defaults
    Init,
    /// Show config file path
    Path,
    /// List all config values
    List,
    /// Get a config value
    Get {
        /// Key in dot notation (e.g., github.token_env)
        key: String,
    },
    /// Set a config value
    Set {
        /// Key in dot notation (e.g., install.on_collision)
        key: String,
        /// Value
        value: String,
    },
}

fn parse_scope(s: &str) -> Result<InstallScope, String> {
    s.parse()
}

fn parse_selection(s: &str) -> Result<PluginSelection, String> {
    s.parse()
}
