use std::path::{Path, PathBuf};

use autolike_core::{
    load_bot_config, BotConfig, ChromiumLauncher, Command, Orchestrator, RunReport,
};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use thiserror::Error;
use tracing::info;
use tracing_subscriber::EnvFilter;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(#[from] autolike_core::ConfigError),
    #[error("tracker error: {0}")]
    Tracker(#[from] autolike_core::TrackerError),
    #[error("browser error: {0}")]
    Browser(#[from] autolike_core::BrowserError),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("no target account given and `account.target_username` is not configured")]
    MissingTarget,
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Browser-driven auto-like bot", long_about = None)]
pub struct Cli {
    /// Path to the bot configuration file
    #[arg(long, default_value = "configs/autolike.toml")]
    pub config: PathBuf,
    /// Force headless mode regardless of `browser.headless`
    #[arg(long)]
    pub headless: bool,
    /// Skip the login step and reuse the browser profile's session
    #[arg(long)]
    pub skip_login: bool,
    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Like posts from the explore feed, filtered by hashtag
    LikeFromExplore,
    /// Like every post of every followed account
    LikeFollowedAccounts,
    /// Print the accounts the configured user follows
    ListFollowedAccounts,
    /// Like every post of a single account
    LikeProfile(LikeProfileArgs),
}

#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct LikeProfileArgs {
    /// Username to visit; defaults to `account.target_username`
    pub username: Option<String>,
}

/// Installs the global fmt subscriber. `RUST_LOG` wins over `default_level`.
pub fn init_logging(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

pub async fn run(cli: Cli) -> Result<()> {
    let mut config = load_bot_config(&cli.config)?;
    if cli.headless {
        config.browser.headless = true;
    }
    if cli.skip_login {
        config.account.skip_login = true;
    }
    let command = resolve_command(&cli.command, &config)?;
    let base_dir = config_base_dir(&cli.config);
    let history = Orchestrator::load_history(&config, &base_dir)?;

    let mut browser = config.browser.clone();
    browser.user_data_dir = browser
        .user_data_dir
        .as_ref()
        .map(|dir| config.resolve_path(&base_dir, dir).display().to_string());
    let launcher = ChromiumLauncher::new(browser, config.site.base_url.clone());
    let session = launcher.launch().await?;

    let orchestrator = Orchestrator::from_config(Box::new(session), &config, history);
    let report = orchestrator.run(command).await?;
    info!(run_id = %report.run_id, "run complete");
    render(&report, cli.format)
}

/// Maps a CLI subcommand onto the orchestrator command it runs.
pub fn resolve_command(command: &Commands, config: &BotConfig) -> Result<Command> {
    Ok(match command {
        Commands::LikeFromExplore => Command::LikeFromExplore,
        Commands::LikeFollowedAccounts => Command::LikeFollowedAccounts,
        Commands::ListFollowedAccounts => Command::ListFollowedAccounts,
        Commands::LikeProfile(args) => {
            let target = args
                .username
                .clone()
                .or_else(|| config.account.target_username.clone())
                .filter(|name| !name.trim().is_empty())
                .ok_or(AppError::MissingTarget)?;
            Command::LikeProfile(target)
        }
    })
}

fn config_base_dir(config_path: &Path) -> PathBuf {
    config_path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

fn render<T>(value: &T, format: OutputFormat) -> Result<()>
where
    T: Serialize + DisplayFallback,
{
    match format {
        OutputFormat::Text => {
            println!("{}", value.display());
            Ok(())
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value)?;
            println!("{}", json);
            Ok(())
        }
    }
}

trait DisplayFallback {
    fn display(&self) -> String;
}

impl DisplayFallback for RunReport {
    fn display(&self) -> String {
        let mut lines = vec![format!("Run {} ({})", self.run_id, self.command)];
        if matches!(self.command, Command::ListFollowedAccounts) {
            if self.accounts.is_empty() {
                lines.push("No followed accounts found".to_string());
            } else {
                lines.push(format!("Following {} accounts:", self.accounts.len()));
                for account in &self.accounts {
                    lines.push(format!("  - {} {}", account.username, account.profile_link));
                }
            }
        } else {
            lines.push(format!("  - liked: {}", self.stats.acted));
            lines.push(format!("  - skipped: {}", self.stats.skipped));
        }
        lines.join("\n")
    }
}
