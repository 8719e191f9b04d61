use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::time::Duration;

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use serde_json::Value;
use tokio::time::sleep;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use crate::browser::{BrowserError, BrowserResult, BrowserSession, ElementId};
use crate::config::{AccountSection, BotConfig, SelectorSection, SiteSection};
use crate::pacing::ActionPacer;
use crate::parser::{ExploreGridParser, FeedParser};
use crate::policy::{policy_from_config, AcceptAll, DecisionPolicy};
use crate::record::{Account, Post};
use crate::strategy::{strategy_from_config, ContinuationStrategy, RunForever};
use crate::tracker::{ActionTracker, TrackerResult, TrackerStats, TrackerStore};

const HOME_TAB: usize = 0;

/// How many attempts a call site may make before giving up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RetryBound {
    Unbounded,
    Limited(usize),
}

impl RetryBound {
    pub fn allows(&self, attempts_made: usize) -> bool {
        match self {
            RetryBound::Unbounded => true,
            RetryBound::Limited(max) => attempts_made < *max,
        }
    }
}

/// Container scrolled by [`Orchestrator::scroll_until_stable`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScrollTarget {
    Window,
    Element(String),
}

impl ScrollTarget {
    pub fn scroll_script(&self) -> String {
        match self {
            ScrollTarget::Window => {
                "window.scrollTo(0, document.body.scrollHeight);".to_string()
            }
            ScrollTarget::Element(selector) => format!(
                "(() => {{ const el = document.querySelector({}); if (el) {{ el.scrollTop = el.scrollHeight; }} }})()",
                js_string(selector)
            ),
        }
    }

    pub fn height_script(&self) -> String {
        match self {
            ScrollTarget::Window => "document.body.scrollHeight".to_string(),
            ScrollTarget::Element(selector) => format!(
                "(() => {{ const el = document.querySelector({}); return el ? el.scrollHeight : null; }})()",
                js_string(selector)
            ),
        }
    }
}

fn js_string(value: &str) -> String {
    Value::String(value.to_string()).to_string()
}

/// Resolves grid hrefs (usually `/p/<code>/`) against the site base URL,
/// dropping duplicates that only differed in form.
fn absolute_links(base_url: &str, hrefs: Vec<String>) -> Vec<String> {
    let base = match Url::parse(base_url) {
        Ok(base) => base,
        Err(err) => {
            warn!(base_url, error = %err, "base url is not absolute; links left as found");
            return hrefs;
        }
    };
    let mut seen = HashSet::new();
    hrefs
        .into_iter()
        .map(|href| match base.join(&href) {
            Ok(url) => url.to_string(),
            Err(_) => href,
        })
        .filter(|link| seen.insert(link.clone()))
        .collect()
}

/// Stable key used to de-duplicate items collected while scrolling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemKey {
    Text,
    Attribute(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "command", content = "target", rename_all = "kebab-case")]
pub enum Command {
    LikeFromExplore,
    LikeFollowedAccounts,
    ListFollowedAccounts,
    LikeProfile(String),
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::LikeFromExplore => f.write_str("like-from-explore"),
            Command::LikeFollowedAccounts => f.write_str("like-followed-accounts"),
            Command::ListFollowedAccounts => f.write_str("list-followed-accounts"),
            Command::LikeProfile(target) => write!(f, "like-profile {target}"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub command: Command,
    pub stats: TrackerStats,
    pub accounts: Vec<Account>,
}

/// Acted-post history carried between runs.
#[derive(Debug)]
pub struct TrackerHistory {
    pub store: TrackerStore,
    pub tracker: ActionTracker,
}

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub account: AccountSection,
    pub site: SiteSection,
    pub selectors: SelectorSection,
    pub page_wait: Duration,
    pub action_wait: Duration,
    pub login_wait: Duration,
    pub scroll_settle: Duration,
    pub explore_retry: RetryBound,
    pub scroll_bound: RetryBound,
    pub shuffle_pages: bool,
    pub skip_known: bool,
}

impl OrchestratorConfig {
    pub fn from_bot_config(config: &BotConfig) -> Self {
        Self {
            account: config.account.clone(),
            site: config.site.clone(),
            selectors: config.selectors.clone(),
            page_wait: Duration::from_secs(config.timeouts.page_wait_secs),
            action_wait: Duration::from_secs(config.timeouts.action_wait_secs),
            login_wait: Duration::from_secs(config.timeouts.login_wait_secs),
            scroll_settle: Duration::from_millis(config.traversal.scroll_settle_ms),
            explore_retry: config
                .traversal
                .explore_max_attempts
                .map_or(RetryBound::Unbounded, RetryBound::Limited),
            scroll_bound: RetryBound::Limited(config.traversal.max_scroll_iterations),
            shuffle_pages: config.traversal.shuffle_pages,
            skip_known: config.tracker.skip_known,
        }
    }
}

/// Drives the discover, filter and like cycles over one browser session.
///
/// The home tab (index 0) stays open for the whole run; every navigation
/// bound operation happens in a single auxiliary tab that is closed again
/// before the operation returns.
pub struct Orchestrator {
    session: Box<dyn BrowserSession>,
    parser: Box<dyn FeedParser>,
    policy: Box<dyn DecisionPolicy>,
    strategy: Box<dyn ContinuationStrategy>,
    tracker: ActionTracker,
    tracker_store: Option<TrackerStore>,
    pacer: ActionPacer,
    rng: ChaCha8Rng,
    config: OrchestratorConfig,
    run_id: Uuid,
}

impl Orchestrator {
    pub fn new(session: Box<dyn BrowserSession>, config: OrchestratorConfig) -> Self {
        let parser = ExploreGridParser::new(config.site.base_url.clone());
        Self {
            session,
            parser: Box::new(parser),
            policy: Box::new(AcceptAll),
            strategy: Box::new(RunForever),
            tracker: ActionTracker::new(),
            tracker_store: None,
            pacer: ActionPacer::disabled(),
            rng: ChaCha8Rng::from_entropy(),
            config,
            run_id: Uuid::new_v4(),
        }
    }

    /// Opens the configured tracker history, if any. Relative paths are
    /// resolved against `base_dir`.
    ///
    /// Runs before the browser is launched.
    pub fn load_history(
        config: &BotConfig,
        base_dir: &Path,
    ) -> TrackerResult<Option<TrackerHistory>> {
        let Some(state_db) = &config.tracker.state_db else {
            return Ok(None);
        };
        let store = TrackerStore::new(config.resolve_path(base_dir, state_db));
        let tracker = store.load()?;
        info!(
            path = %store.path().display(),
            known = tracker.acted_ids().count(),
            "tracker history enabled"
        );
        Ok(Some(TrackerHistory { store, tracker }))
    }

    /// Wires every collaborator from a loaded configuration file.
    pub fn from_config(
        session: Box<dyn BrowserSession>,
        config: &BotConfig,
        history: Option<TrackerHistory>,
    ) -> Self {
        let [low, high] = config.pacing.action_delay_ms;
        let mut orchestrator = Self::new(session, OrchestratorConfig::from_bot_config(config))
            .with_policy(policy_from_config(&config.filter))
            .with_strategy(strategy_from_config(&config.strategy))
            .with_pacer(ActionPacer::new((low, high)));
        if let Some(seed) = config.traversal.seed {
            orchestrator = orchestrator.with_seed(seed);
        }
        if let Some(TrackerHistory { store, tracker }) = history {
            orchestrator = orchestrator.with_tracker(tracker).with_tracker_store(store);
        }
        orchestrator
    }

    pub fn with_parser(mut self, parser: Box<dyn FeedParser>) -> Self {
        self.parser = parser;
        self
    }

    pub fn with_policy(mut self, policy: Box<dyn DecisionPolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_strategy(mut self, strategy: Box<dyn ContinuationStrategy>) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_tracker(mut self, tracker: ActionTracker) -> Self {
        self.tracker = tracker;
        self
    }

    pub fn with_tracker_store(mut self, store: TrackerStore) -> Self {
        self.tracker_store = Some(store);
        self
    }

    pub fn with_pacer(mut self, pacer: ActionPacer) -> Self {
        self.pacer = pacer;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = ChaCha8Rng::seed_from_u64(seed);
        self
    }

    pub fn tracker(&self) -> &ActionTracker {
        &self.tracker
    }

    pub fn stats(&self) -> TrackerStats {
        self.tracker.stats()
    }

    /// Logs in, runs `command`, and releases the session on every exit path.
    pub async fn run(mut self, command: Command) -> BrowserResult<RunReport> {
        info!(run_id = %self.run_id, command = %command, "starting run");
        let outcome = self.execute(&command).await;

        let stats = self.tracker.stats();
        info!(
            run_id = %self.run_id,
            acted = stats.acted,
            skipped = stats.skipped,
            "run finished"
        );
        if let Some(store) = &self.tracker_store {
            match store.save(&self.tracker) {
                Ok(written) => debug!(written, "tracker history saved"),
                Err(err) => warn!(error = %err, "failed to save tracker history"),
            }
        }

        let shutdown = self.session.shutdown().await;
        let accounts = outcome?;
        shutdown?;
        Ok(RunReport {
            run_id: self.run_id,
            command,
            stats,
            accounts,
        })
    }

    async fn execute(&mut self, command: &Command) -> BrowserResult<Vec<Account>> {
        if self.config.account.skip_login {
            debug!("login skipped by configuration");
        } else {
            self.log_in().await?;
        }
        match command {
            Command::LikeFromExplore => self.run_explore_loop().await?,
            Command::LikeFollowedAccounts => self.run_followed_accounts_loop().await?,
            Command::ListFollowedAccounts => return self.list_followed_accounts().await,
            Command::LikeProfile(target) => {
                self.run_single_profile_loop(target).await?;
            }
        }
        Ok(Vec::new())
    }

    /// Likes explore-feed posts page by page until the strategy says stop.
    pub async fn run_explore_loop(&mut self) -> BrowserResult<()> {
        let mut cursor = 0u64;
        loop {
            let raw = self.fetch_explore_page_with_retry(cursor).await?;
            let mut posts = match self.parser.parse_feed(&raw) {
                Ok(posts) => posts,
                Err(err) => {
                    warn!(cursor, error = %err, "explore payload could not be parsed");
                    Vec::new()
                }
            };
            if self.config.shuffle_pages {
                posts.shuffle(&mut self.rng);
            }
            debug!(cursor, posts = posts.len(), "explore page loaded");

            for post in &posts {
                if self.config.skip_known && self.tracker.has_acted(&post.id) {
                    debug!(post = %post.id, "already liked in an earlier run");
                    self.tracker.record_skipped(post);
                    continue;
                }
                if !self.policy.should_act(post) {
                    self.tracker.record_skipped(post);
                    continue;
                }
                if !self.like_record(post).await? {
                    continue;
                }
                if !self.strategy.should_continue().await {
                    info!(cursor, "continuation strategy requested stop");
                    return Ok(());
                }
            }

            cursor += 1;
        }
    }

    /// Likes every post of every account the owner follows. No filtering.
    pub async fn run_followed_accounts_loop(&mut self) -> BrowserResult<()> {
        let accounts = self.list_followed_accounts().await?;
        info!(accounts = accounts.len(), "followed accounts collected");
        for account in &accounts {
            self.like_profile_posts(account).await?;
        }
        Ok(())
    }

    pub async fn run_single_profile_loop(&mut self, username: &str) -> BrowserResult<usize> {
        let account = Account::new(username, self.config.site.profile_url(username));
        self.like_profile_posts(&account).await
    }

    /// Collects the accounts the owner follows without acting on anything.
    pub async fn list_followed_accounts(&mut self) -> BrowserResult<Vec<Account>> {
        match self.open_following_dialog().await {
            Ok(()) => {}
            Err(err) if err.is_target_unavailable() => {
                warn!(error = %err, "following list could not be opened");
                return Ok(Vec::new());
            }
            Err(err) => return Err(err),
        }

        let target = ScrollTarget::Element(self.config.selectors.following_dialog.clone());
        let item_selector = self.config.selectors.following_item.clone();
        let names = self
            .scroll_until_stable(&target, &item_selector, &ItemKey::Text)
            .await;
        Ok(names
            .into_iter()
            .map(|name| {
                let link = self.config.site.profile_url(&name);
                Account::new(name, link)
            })
            .collect())
    }

    async fn open_following_dialog(&mut self) -> BrowserResult<()> {
        let selectors = &self.config.selectors;
        self.session.navigate(&self.config.account.profile_link).await?;
        let link = self
            .session
            .wait_for_element(&selectors.following_link, self.config.page_wait)
            .await?;
        self.session.click(link).await?;
        self.session
            .wait_for_element(&selectors.following_dialog, self.config.page_wait)
            .await?;
        Ok(())
    }

    async fn like_profile_posts(&mut self, account: &Account) -> BrowserResult<usize> {
        let links = match self.fetch_profile_links(&account.profile_link).await {
            Ok(links) => links,
            Err(err) if err.is_target_unavailable() => {
                warn!(account = %account, error = %err, "profile grid unavailable; skipping account");
                return Ok(0);
            }
            Err(err) => return Err(err),
        };
        info!(account = %account, posts = links.len(), "profile posts collected");

        let mut liked = 0;
        for link in &links {
            let post = Post::from_link(link);
            if self.config.skip_known && self.tracker.has_acted(&post.id) {
                self.tracker.record_skipped(&post);
                continue;
            }
            if self.like_record(&post).await? {
                liked += 1;
            }
        }
        Ok(liked)
    }

    async fn fetch_profile_links(&mut self, profile_url: &str) -> BrowserResult<Vec<String>> {
        let outcome = match self.open_aux_tab(profile_url).await {
            Ok(()) => self.collect_profile_links().await,
            Err(err) => Err(err),
        };
        self.close_aux_tab().await?;
        outcome
    }

    async fn collect_profile_links(&mut self) -> BrowserResult<Vec<String>> {
        self.session
            .wait_for_element(&self.config.selectors.profile_grid, self.config.page_wait)
            .await?;
        let item_selector = self.config.selectors.profile_post_link.clone();
        let hrefs = self
            .scroll_until_stable(
                &ScrollTarget::Window,
                &item_selector,
                &ItemKey::Attribute("href".to_string()),
            )
            .await;
        Ok(absolute_links(&self.config.site.base_url, hrefs))
    }

    /// Scrolls `target` until its height stops changing and returns every
    /// item key seen along the way, in discovery order and de-duplicated.
    ///
    /// Failed iterations are logged and skipped; the iteration count is
    /// capped by the configured scroll bound.
    pub async fn scroll_until_stable(
        &mut self,
        target: &ScrollTarget,
        item_selector: &str,
        key: &ItemKey,
    ) -> Vec<String> {
        let mut collected = Vec::new();
        let mut seen = HashSet::new();
        let mut last_height: Option<f64> = None;
        let mut iterations = 0usize;

        while self.config.scroll_bound.allows(iterations) {
            iterations += 1;
            match self
                .scroll_iteration(target, item_selector, key, &mut seen, &mut collected)
                .await
            {
                Ok(height) => {
                    if last_height == Some(height) {
                        debug!(iterations, items = collected.len(), "scroll height converged");
                        return collected;
                    }
                    last_height = Some(height);
                }
                Err(err) => {
                    warn!(iteration = iterations, error = %err, "scroll iteration failed");
                }
            }
        }

        warn!(
            iterations,
            items = collected.len(),
            "scroll pagination stopped at its iteration cap"
        );
        collected
    }

    async fn scroll_iteration(
        &mut self,
        target: &ScrollTarget,
        item_selector: &str,
        key: &ItemKey,
        seen: &mut HashSet<String>,
        collected: &mut Vec<String>,
    ) -> BrowserResult<f64> {
        self.session.run_script(&target.scroll_script()).await?;
        sleep(self.config.scroll_settle).await;
        let height = self
            .session
            .run_script(&target.height_script())
            .await?
            .as_f64()
            .ok_or_else(|| BrowserError::Script("scroll height is not a number".to_string()))?;

        for element in self.session.find_all_elements(item_selector).await? {
            match self.read_item_key(element, key).await {
                Ok(value) if !value.is_empty() => {
                    if seen.insert(value.clone()) {
                        collected.push(value);
                    }
                }
                Ok(_) => {}
                Err(err) => debug!(error = %err, "skipping unreadable item"),
            }
        }
        Ok(height)
    }

    async fn read_item_key(&mut self, element: ElementId, key: &ItemKey) -> BrowserResult<String> {
        let value = match key {
            ItemKey::Text => self.session.read_text(element).await?,
            ItemKey::Attribute(name) => self.session.read_attribute(element, name).await?,
        };
        Ok(value.trim().to_string())
    }

    /// Opens the post in an auxiliary tab and clicks its like control.
    ///
    /// Returns `false` when the control is missing or never appears. The tab
    /// is closed either way; a failed close is logged and does not change the
    /// outcome, since the like may already be recorded.
    pub async fn like_record(&mut self, post: &Post) -> BrowserResult<bool> {
        let outcome = match self.open_aux_tab(&post.link).await {
            Ok(()) => self.like_in_current_tab(post).await,
            Err(err) => Err(err),
        };
        if let Err(err) = self.close_aux_tab().await {
            warn!(post = %post.id, error = %err, "failed to close post tab");
        }

        match outcome {
            Ok(liked) => Ok(liked),
            Err(err) if err.is_target_unavailable() => {
                debug!(post = %post.id, error = %err, "post no longer available");
                Ok(false)
            }
            Err(err) => Err(err),
        }
    }

    async fn like_in_current_tab(&mut self, post: &Post) -> BrowserResult<bool> {
        let button = self
            .session
            .wait_for_element(&self.config.selectors.like_button, self.config.action_wait)
            .await?;
        self.session.click(button).await?;
        self.tracker.record_acted(post);
        info!(post = %post, acted = self.tracker.stats().acted, "liked post");
        let waited = self.pacer.wait().await;
        debug!(delay_ms = waited, "paced after like");
        Ok(true)
    }

    async fn fetch_explore_page_with_retry(&mut self, cursor: u64) -> BrowserResult<String> {
        let mut attempts = 0usize;
        loop {
            attempts += 1;
            match self.fetch_explore_page(cursor).await {
                Ok(raw) => return Ok(raw),
                Err(err) if err.is_target_unavailable() => {
                    if !self.config.explore_retry.allows(attempts) {
                        warn!(cursor, attempts, "explore page retries exhausted");
                        return Err(err);
                    }
                    warn!(cursor, attempt = attempts, error = %err, "explore page not ready; retrying");
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn fetch_explore_page(&mut self, cursor: u64) -> BrowserResult<String> {
        let url = self.config.site.explore_url(cursor);
        let outcome = match self.open_aux_tab(&url).await {
            Ok(()) => self.read_payload().await,
            Err(err) => Err(err),
        };
        self.close_aux_tab().await?;
        outcome
    }

    async fn read_payload(&mut self) -> BrowserResult<String> {
        let payload = self
            .session
            .wait_for_element(&self.config.selectors.payload, self.config.page_wait)
            .await?;
        self.session.read_text(payload).await
    }

    async fn open_aux_tab(&mut self, url: &str) -> BrowserResult<()> {
        let handles = self.session.tab_handles().await?;
        if handles.len() > 1 {
            return Err(BrowserError::Unexpected(format!(
                "auxiliary tab already open ({} tabs)",
                handles.len()
            )));
        }
        self.session.open_tab(url).await?;
        self.session.switch_to_tab(handles.len()).await
    }

    async fn close_aux_tab(&mut self) -> BrowserResult<()> {
        let handles = self.session.tab_handles().await?;
        if handles.len() > 1 {
            self.session.close_tab(handles.len() - 1).await?;
        }
        self.session.switch_to_tab(HOME_TAB).await
    }

    /// Signs in on the home tab. A missing form element aborts the login
    /// with a warning; the run continues either way.
    pub async fn log_in(&mut self) -> BrowserResult<()> {
        let base_url = self.config.site.base_url.clone();
        match self.session.navigate(&base_url).await {
            Ok(()) => {}
            Err(err) if err.is_target_unavailable() => {
                warn!(error = %err, "login page did not load; login aborted");
                return Ok(());
            }
            Err(err) => return Err(err),
        }

        match self
            .session
            .wait_for_element(&self.config.selectors.login_username, self.config.login_wait)
            .await
        {
            Ok(username_field) => match self.submit_credentials(username_field).await {
                Ok(()) => info!(user = %self.config.account.username, "credentials submitted"),
                Err(err) if err.is_target_unavailable() => {
                    warn!(error = %err, "could not find login element; login aborted");
                    return Ok(());
                }
                Err(err) => return Err(err),
            },
            Err(err) if err.is_target_unavailable() => {
                debug!("login form not shown; assuming an authenticated profile");
            }
            Err(err) => return Err(err),
        }

        let prompts = self.config.selectors.dismiss_prompts.clone();
        for prompt in &prompts {
            if let Ok(button) = self.session.find_element(prompt).await {
                match self.session.click(button).await {
                    Ok(()) => debug!(selector = %prompt, "dismissed prompt"),
                    Err(err) => debug!(selector = %prompt, error = %err, "prompt click failed"),
                }
            }
        }

        match self
            .session
            .wait_for_element(&self.config.selectors.home_marker, self.config.login_wait)
            .await
        {
            Ok(_) => Ok(()),
            Err(err) if err.is_target_unavailable() => {
                warn!(error = %err, "home feed did not appear after login");
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    async fn submit_credentials(&mut self, username_field: ElementId) -> BrowserResult<()> {
        let account = &self.config.account;
        let selectors = &self.config.selectors;
        self.session
            .type_text(username_field, &account.username)
            .await?;
        let password_field = self.session.find_element(&selectors.login_password).await?;
        self.session
            .type_text(password_field, &account.password)
            .await?;
        let submit = self.session.find_element(&selectors.login_submit).await?;
        self.session.click(submit).await
    }
}
