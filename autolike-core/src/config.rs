use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::{ConfigError, Result};

pub const PASSWORD_ENV: &str = "AUTOLIKE_PASSWORD";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct BotConfig {
    pub account: AccountSection,
    pub site: SiteSection,
    #[serde(default)]
    pub filter: FilterSection,
    pub pacing: PacingSection,
    pub strategy: StrategySection,
    #[serde(default)]
    pub traversal: TraversalSection,
    #[serde(default)]
    pub timeouts: TimeoutSection,
    pub selectors: SelectorSection,
    pub browser: BrowserSection,
    #[serde(default)]
    pub tracker: TrackerSection,
}

impl BotConfig {
    /// Applies environment overrides that should never live in a config file.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(password) = std::env::var(PASSWORD_ENV) {
            if !password.is_empty() {
                self.account.password = password;
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        let [low, high] = self.pacing.action_delay_ms;
        if low > high {
            return Err(ConfigError::Invalid(format!(
                "pacing.action_delay_ms lower bound {low} exceeds upper bound {high}"
            )));
        }
        if let StrategySection::ForeverWithBreaks {
            threshold,
            pause_secs,
        } = &self.strategy
        {
            if *threshold == 0 {
                return Err(ConfigError::Invalid(
                    "strategy.threshold must be at least 1".to_string(),
                ));
            }
            if pause_secs[0] > pause_secs[1] {
                return Err(ConfigError::Invalid(
                    "strategy.pause_secs lower bound exceeds upper bound".to_string(),
                ));
            }
        }
        if !self.site.explore_url_template.contains("{cursor}") {
            return Err(ConfigError::Invalid(
                "site.explore_url_template must contain a {cursor} placeholder".to_string(),
            ));
        }
        Ok(())
    }

    pub fn resolve_path<P: AsRef<Path>>(&self, base_dir: &Path, candidate: P) -> PathBuf {
        let path = candidate.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            base_dir.join(path)
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccountSection {
    pub username: String,
    #[serde(default)]
    pub password: String,
    pub profile_link: String,
    #[serde(default)]
    pub target_username: Option<String>,
    #[serde(default)]
    pub skip_login: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SiteSection {
    pub base_url: String,
    pub explore_url_template: String,
}

impl SiteSection {
    pub fn explore_url(&self, cursor: u64) -> String {
        self.explore_url_template
            .replace("{cursor}", &cursor.to_string())
    }

    pub fn profile_url(&self, username: &str) -> String {
        format!("{}/{}/", self.base_url.trim_end_matches('/'), username)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FilterSection {
    #[serde(default)]
    pub ignore_tags: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PacingSection {
    pub action_delay_ms: [u64; 2],
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum StrategySection {
    Forever,
    ForeverWithBreaks {
        threshold: u32,
        pause_secs: [u64; 2],
    },
    Times {
        ceiling: u32,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct TraversalSection {
    #[serde(default = "default_true")]
    pub shuffle_pages: bool,
    #[serde(default)]
    pub seed: Option<u64>,
    /// Attempts per explore cursor; absent means retry until the page loads.
    #[serde(default)]
    pub explore_max_attempts: Option<usize>,
    #[serde(default = "default_scroll_iterations")]
    pub max_scroll_iterations: usize,
    #[serde(default = "default_scroll_settle_ms")]
    pub scroll_settle_ms: u64,
}

impl Default for TraversalSection {
    fn default() -> Self {
        Self {
            shuffle_pages: true,
            seed: None,
            explore_max_attempts: None,
            max_scroll_iterations: default_scroll_iterations(),
            scroll_settle_ms: default_scroll_settle_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TimeoutSection {
    #[serde(default = "default_page_wait")]
    pub page_wait_secs: u64,
    #[serde(default = "default_action_wait")]
    pub action_wait_secs: u64,
    #[serde(default = "default_action_wait")]
    pub login_wait_secs: u64,
}

impl Default for TimeoutSection {
    fn default() -> Self {
        Self {
            page_wait_secs: default_page_wait(),
            action_wait_secs: default_action_wait(),
            login_wait_secs: default_action_wait(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SelectorSection {
    pub payload: String,
    pub like_button: String,
    pub login_username: String,
    pub login_password: String,
    pub login_submit: String,
    #[serde(default)]
    pub dismiss_prompts: Vec<String>,
    pub home_marker: String,
    pub following_link: String,
    pub following_dialog: String,
    pub following_item: String,
    pub profile_grid: String,
    pub profile_post_link: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BrowserSection {
    pub executable_path: String,
    #[serde(default)]
    pub headless: bool,
    #[serde(default = "default_true")]
    pub sandbox: bool,
    #[serde(default)]
    pub disable_gpu: bool,
    #[serde(default)]
    pub user_data_dir: Option<String>,
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
    #[serde(default = "default_window")]
    pub window: [u32; 2],
    #[serde(default)]
    pub extra_args: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TrackerSection {
    /// SQLite file holding previously liked posts; persistence is off when absent.
    #[serde(default)]
    pub state_db: Option<String>,
    #[serde(default)]
    pub skip_known: bool,
}

fn default_true() -> bool {
    true
}

fn default_scroll_iterations() -> usize {
    200
}

fn default_scroll_settle_ms() -> u64 {
    3000
}

fn default_page_wait() -> u64 {
    7
}

fn default_action_wait() -> u64 {
    5
}

fn default_window() -> [u32; 2] {
    [1280, 900]
}

pub fn load_bot_config<P: AsRef<Path>>(path: P) -> Result<BotConfig> {
    let mut config: BotConfig = load_toml(path)?;
    config.apply_env_overrides();
    config.validate()?;
    Ok(config)
}

fn load_toml<T, P>(path: P) -> Result<T>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        source,
        path: path.to_path_buf(),
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        source,
        path: path.to_path_buf(),
    })
}
