use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::error::CdpError;
use serde_json::{json, Value};

use autolike_core::config::{AccountSection, SelectorSection, SiteSection};
use autolike_core::{
    ActionTracker, BrowserError, BrowserResult, BrowserSession, Command, ElementId, IgnoreTags,
    ItemKey, Orchestrator, OrchestratorConfig, Post, RetryBound, RunTimes, ScrollTarget,
    TabHandle, TrackerStats,
};

const BASE: &str = "https://site.test";
const OWNER: &str = "https://site.test/owner/";

fn explore_url(cursor: u64) -> String {
    format!("{BASE}/explore?max_id={cursor}")
}

fn post_url(code: &str) -> String {
    format!("{BASE}/p/{code}/")
}

fn selectors() -> SelectorSection {
    SelectorSection {
        payload: "pre".into(),
        like_button: "button.like".into(),
        login_username: "input[name='username']".into(),
        login_password: "input[name='password']".into(),
        login_submit: "button[type='submit']".into(),
        dismiss_prompts: vec!["button.not-now".into()],
        home_marker: "nav.home".into(),
        following_link: "a.following".into(),
        following_dialog: "div.dialog".into(),
        following_item: "a.account".into(),
        profile_grid: "article".into(),
        profile_post_link: "article a".into(),
    }
}

fn test_config() -> OrchestratorConfig {
    OrchestratorConfig {
        account: AccountSection {
            username: "owner".into(),
            password: "secret".into(),
            profile_link: OWNER.into(),
            target_username: None,
            skip_login: true,
        },
        site: SiteSection {
            base_url: BASE.into(),
            explore_url_template: format!("{BASE}/explore?max_id={{cursor}}"),
        },
        selectors: selectors(),
        page_wait: Duration::from_secs(7),
        action_wait: Duration::from_secs(5),
        login_wait: Duration::from_secs(5),
        scroll_settle: Duration::from_millis(500),
        explore_retry: RetryBound::Unbounded,
        scroll_bound: RetryBound::Limited(50),
        shuffle_pages: false,
        skip_known: false,
    }
}

fn payload(posts: &[(&str, &str)]) -> String {
    let medias: Vec<Value> = posts
        .iter()
        .map(|(code, caption)| json!({"media": {"code": code, "caption": {"text": caption}}}))
        .collect();
    json!({"sectional_items": [{"layout_content": {"medias": medias}}]}).to_string()
}

#[derive(Debug, Clone)]
enum MockElement {
    Payload(String),
    LikeButton(String),
    Item(String),
    Marker(String),
}

#[derive(Debug, Default)]
struct MockState {
    tabs: Vec<String>,
    current: usize,
    elements: Vec<MockElement>,
    max_tabs_seen: usize,
    opened: Vec<String>,
    navigations: Vec<String>,
    liked: Vec<String>,
    clicked_selectors: Vec<String>,
    typed: Vec<String>,
    scroll_commands: usize,
    shut_down: bool,
    /// Explore payloads per URL; `None` entries time out.
    payloads: HashMap<String, VecDeque<Option<String>>>,
    likeable: HashSet<String>,
    /// Selectors present on a given page URL.
    present: HashMap<String, HashSet<String>>,
    /// Scroll heights per page URL; `None` entries fail the read.
    heights: HashMap<String, VecDeque<Option<f64>>>,
    /// Item batches returned per page URL, one per collection.
    batches: HashMap<String, VecDeque<Vec<String>>>,
    /// Page loads that time out at the CDP layer, per URL.
    slow_loads: HashMap<String, usize>,
    failing_closes: usize,
}

impl MockState {
    fn url(&self) -> String {
        self.tabs[self.current].clone()
    }

    fn add(&mut self, element: MockElement) -> ElementId {
        self.elements.push(element);
        ElementId(self.elements.len() - 1)
    }

    fn lookup(&mut self, selector: &str) -> Option<ElementId> {
        let url = self.url();
        let sel = selectors();
        if selector == sel.payload {
            let next = self.payloads.get_mut(&url).and_then(VecDeque::pop_front)??;
            return Some(self.add(MockElement::Payload(next)));
        }
        if selector == sel.like_button {
            return self
                .likeable
                .contains(&url)
                .then(|| self.add(MockElement::LikeButton(url.clone())));
        }
        let present = self
            .present
            .get(&url)
            .map_or(false, |set| set.contains(selector));
        present.then(|| self.add(MockElement::Marker(selector.to_string())))
    }

    fn slow_load(&mut self, url: &str) -> BrowserResult<()> {
        match self.slow_loads.get_mut(url) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                Err(CdpError::Timeout.into())
            }
            _ => Ok(()),
        }
    }

    fn pop_or_repeat<T: Clone>(queue: Option<&mut VecDeque<T>>) -> Option<T> {
        let queue = queue?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

#[derive(Clone, Default)]
struct MockSession {
    state: Arc<Mutex<MockState>>,
}

impl MockSession {
    fn new() -> Self {
        let session = Self::default();
        {
            let mut state = session.state.lock().unwrap();
            state.tabs.push("about:home".into());
            state.max_tabs_seen = 1;
        }
        session
    }

    fn with<R>(&self, f: impl FnOnce(&mut MockState) -> R) -> R {
        let mut guard = self.state.lock().unwrap();
        f(&mut *guard)
    }

    fn add_payloads(&self, url: String, entries: Vec<Option<String>>) {
        self.with(|state| {
            state.payloads.entry(url).or_default().extend(entries);
        });
    }

    fn add_likeable(&self, codes: &[&str]) {
        self.with(|state| {
            state
                .likeable
                .extend(codes.iter().map(|code| post_url(code)));
        });
    }

    fn add_present(&self, url: &str, selector: &str) {
        self.with(|state| {
            state
                .present
                .entry(url.to_string())
                .or_default()
                .insert(selector.to_string());
        });
    }

    fn add_scroll_pages<S: Into<String>>(
        &self,
        url: &str,
        heights: Vec<Option<f64>>,
        batches: Vec<Vec<S>>,
    ) {
        self.with(|state| {
            state.heights.insert(url.to_string(), heights.into());
            state.batches.insert(
                url.to_string(),
                batches
                    .into_iter()
                    .map(|batch| batch.into_iter().map(Into::into).collect())
                    .collect(),
            );
        });
    }

    fn add_slow_loads(&self, url: &str, count: usize) {
        self.with(|state| {
            state.slow_loads.insert(url.to_string(), count);
        });
    }

    fn opened_count(&self, url: &str) -> usize {
        self.with(|state| state.opened.iter().filter(|opened| *opened == url).count())
    }

    fn boxed(&self) -> Box<dyn BrowserSession> {
        Box::new(self.clone())
    }
}

#[async_trait(?Send)]
impl BrowserSession for MockSession {
    async fn navigate(&mut self, url: &str) -> BrowserResult<()> {
        self.with(|state| -> BrowserResult<()> {
            state.navigations.push(url.to_string());
            state.slow_load(url)?;
            let current = state.current;
            state.tabs[current] = url.to_string();
            state.elements.clear();
            Ok(())
        })
    }

    async fn tab_handles(&mut self) -> BrowserResult<Vec<TabHandle>> {
        Ok(self.with(|state| {
            (0..state.tabs.len())
                .map(|idx| TabHandle(format!("tab-{idx}")))
                .collect()
        }))
    }

    async fn open_tab(&mut self, url: &str) -> BrowserResult<()> {
        self.with(|state| -> BrowserResult<()> {
            state.opened.push(url.to_string());
            state.slow_load(url)?;
            state.tabs.push(url.to_string());
            state.max_tabs_seen = state.max_tabs_seen.max(state.tabs.len());
            Ok(())
        })
    }

    async fn close_tab(&mut self, index: usize) -> BrowserResult<()> {
        self.with(|state| {
            if index >= state.tabs.len() {
                return Err(BrowserError::NoSuchTab(index));
            }
            if state.failing_closes > 0 {
                state.failing_closes -= 1;
                return Err(BrowserError::Script("target crashed".into()));
            }
            state.tabs.remove(index);
            Ok(())
        })
    }

    async fn switch_to_tab(&mut self, index: usize) -> BrowserResult<()> {
        self.with(|state| {
            if index >= state.tabs.len() {
                return Err(BrowserError::NoSuchTab(index));
            }
            state.current = index;
            state.elements.clear();
            Ok(())
        })
    }

    async fn wait_for_element(
        &mut self,
        selector: &str,
        timeout: Duration,
    ) -> BrowserResult<ElementId> {
        match self.with(|state| state.lookup(selector)) {
            Some(id) => Ok(id),
            None => {
                tokio::time::sleep(timeout).await;
                Err(BrowserError::Timeout(selector.to_string()))
            }
        }
    }

    async fn find_element(&mut self, selector: &str) -> BrowserResult<ElementId> {
        self.with(|state| state.lookup(selector))
            .ok_or_else(|| BrowserError::NotFound(selector.to_string()))
    }

    async fn find_all_elements(&mut self, _selector: &str) -> BrowserResult<Vec<ElementId>> {
        Ok(self.with(|state| {
            let url = state.url();
            let batch = MockState::pop_or_repeat(state.batches.get_mut(&url)).unwrap_or_default();
            batch
                .into_iter()
                .map(|item| state.add(MockElement::Item(item)))
                .collect()
        }))
    }

    async fn run_script(&mut self, code: &str) -> BrowserResult<Value> {
        self.with(|state| {
            if code.contains("scrollTo(") || code.contains("scrollTop =") {
                state.scroll_commands += 1;
                return Ok(Value::Null);
            }
            let url = state.url();
            match MockState::pop_or_repeat(state.heights.get_mut(&url)) {
                Some(Some(height)) => Ok(json!(height)),
                _ => Err(BrowserError::Script("height unavailable".into())),
            }
        })
    }

    async fn click(&mut self, element: ElementId) -> BrowserResult<()> {
        self.with(|state| match state.elements.get(element.0).cloned() {
            Some(MockElement::LikeButton(url)) => {
                state.liked.push(url);
                Ok(())
            }
            Some(MockElement::Marker(selector)) => {
                state.clicked_selectors.push(selector);
                Ok(())
            }
            _ => Err(BrowserError::NotFound("stale element".into())),
        })
    }

    async fn type_text(&mut self, _element: ElementId, text: &str) -> BrowserResult<()> {
        self.with(|state| state.typed.push(text.to_string()));
        Ok(())
    }

    async fn read_text(&mut self, element: ElementId) -> BrowserResult<String> {
        self.with(|state| match state.elements.get(element.0) {
            Some(MockElement::Payload(text)) | Some(MockElement::Item(text)) => Ok(text.clone()),
            _ => Err(BrowserError::NotFound("text".into())),
        })
    }

    async fn read_attribute(&mut self, element: ElementId, _name: &str) -> BrowserResult<String> {
        self.with(|state| match state.elements.get(element.0) {
            Some(MockElement::Item(value)) => Ok(value.clone()),
            _ => Err(BrowserError::NotFound("attribute".into())),
        })
    }

    async fn shutdown(self: Box<Self>) -> BrowserResult<()> {
        self.with(|state| state.shut_down = true);
        Ok(())
    }
}

#[tokio::test(start_paused = true)]
async fn explore_likes_accepted_and_skips_ignored_tags() {
    let session = MockSession::new();
    session.add_payloads(
        explore_url(0),
        vec![Some(payload(&[("A", "plain"), ("B", "#sponsored deal")]))],
    );
    session.add_likeable(&["A", "B"]);

    let mut config = test_config();
    config.explore_retry = RetryBound::Limited(1);
    let mut orchestrator = Orchestrator::new(session.boxed(), config)
        .with_policy(Box::new(IgnoreTags::new(["sponsored"])));

    let result = orchestrator.run_explore_loop().await;
    assert!(matches!(result, Err(BrowserError::Timeout(_))));
    assert_eq!(orchestrator.stats(), TrackerStats { acted: 1, skipped: 1 });
    assert!(orchestrator.tracker().has_acted("A"));
    assert!(!orchestrator.tracker().has_acted("B"));
    session.with(|state| {
        assert_eq!(state.liked, vec![post_url("A")]);
        assert_eq!(state.opened.iter().filter(|url| **url == post_url("B")).count(), 0);
    });
}

#[tokio::test(start_paused = true)]
async fn explore_stops_when_run_times_is_reached() {
    let session = MockSession::new();
    session.add_payloads(
        explore_url(0),
        vec![Some(payload(&[("A", ""), ("B", ""), ("C", "")]))],
    );
    session.add_likeable(&["A", "B", "C"]);

    let mut orchestrator = Orchestrator::new(session.boxed(), test_config())
        .with_strategy(Box::new(RunTimes::new(2)));

    orchestrator.run_explore_loop().await.unwrap();
    assert_eq!(orchestrator.stats(), TrackerStats { acted: 2, skipped: 0 });
    session.with(|state| {
        assert_eq!(state.liked, vec![post_url("A"), post_url("B")]);
        assert!(!state.opened.contains(&post_url("C")));
        assert!(!state.opened.contains(&explore_url(1)));
    });
}

#[tokio::test(start_paused = true)]
async fn explore_retries_same_cursor_after_timeouts() {
    let session = MockSession::new();
    let empty = payload(&[]);
    for cursor in 0..3 {
        session.add_payloads(explore_url(cursor), vec![Some(empty.clone())]);
    }
    session.add_payloads(
        explore_url(3),
        vec![None, None, Some(payload(&[("Z", "#late")]))],
    );
    session.add_likeable(&["Z"]);

    let mut orchestrator = Orchestrator::new(session.boxed(), test_config())
        .with_strategy(Box::new(RunTimes::new(1)));

    orchestrator.run_explore_loop().await.unwrap();
    assert_eq!(session.opened_count(&explore_url(3)), 3);
    assert_eq!(session.opened_count(&explore_url(4)), 0);
    assert_eq!(orchestrator.stats().acted, 1);
    session.with(|state| assert_eq!(state.liked, vec![post_url("Z")]));
}

#[tokio::test(start_paused = true)]
async fn unparseable_page_advances_cursor() {
    let session = MockSession::new();
    session.add_payloads(explore_url(0), vec![Some("<html>login</html>".into())]);
    session.add_payloads(explore_url(1), vec![Some(payload(&[("A", "")]))]);
    session.add_likeable(&["A"]);

    let mut orchestrator = Orchestrator::new(session.boxed(), test_config())
        .with_strategy(Box::new(RunTimes::new(1)));

    orchestrator.run_explore_loop().await.unwrap();
    assert_eq!(session.opened_count(&explore_url(0)), 1);
    assert_eq!(orchestrator.stats().acted, 1);
}

#[tokio::test(start_paused = true)]
async fn shuffled_pages_still_visit_every_post() {
    let session = MockSession::new();
    let codes = ["A", "B", "C", "D", "E"];
    let page: Vec<(&str, &str)> = codes.iter().map(|code| (*code, "")).collect();
    session.add_payloads(explore_url(0), vec![Some(payload(&page))]);
    session.add_likeable(&codes);

    let mut config = test_config();
    config.shuffle_pages = true;
    config.explore_retry = RetryBound::Limited(1);
    let mut orchestrator = Orchestrator::new(session.boxed(), config).with_seed(7);

    assert!(orchestrator.run_explore_loop().await.is_err());
    session.with(|state| {
        let liked: HashSet<_> = state.liked.iter().cloned().collect();
        let expected: HashSet<_> = codes.iter().map(|code| post_url(code)).collect();
        assert_eq!(liked, expected);
    });
}

#[tokio::test(start_paused = true)]
async fn known_posts_are_skipped_when_history_is_enabled() {
    let session = MockSession::new();
    session.add_payloads(explore_url(0), vec![Some(payload(&[("A", ""), ("B", "")]))]);
    session.add_likeable(&["A", "B"]);

    let history = ActionTracker::with_history(vec![(
        "A".to_string(),
        post_url("A"),
        chrono::Utc::now(),
    )]);

    let mut config = test_config();
    config.skip_known = true;
    config.explore_retry = RetryBound::Limited(1);
    let mut orchestrator = Orchestrator::new(session.boxed(), config).with_tracker(history);

    assert!(orchestrator.run_explore_loop().await.is_err());
    assert_eq!(orchestrator.stats(), TrackerStats { acted: 1, skipped: 1 });
    session.with(|state| assert_eq!(state.liked, vec![post_url("B")]));
}

#[tokio::test(start_paused = true)]
async fn like_record_reports_missing_control_and_closes_tab() {
    let session = MockSession::new();
    let mut orchestrator = Orchestrator::new(session.boxed(), test_config());
    let post = Post::from_link(&post_url("gone"));

    assert!(!orchestrator.like_record(&post).await.unwrap());
    assert_eq!(orchestrator.stats().acted, 0);
    session.with(|state| {
        assert_eq!(state.tabs.len(), 1);
        assert_eq!(state.current, 0);
        assert_eq!(state.max_tabs_seen, 2);
    });
}

#[tokio::test(start_paused = true)]
async fn like_record_paces_after_success() {
    let session = MockSession::new();
    session.add_likeable(&["A"]);
    let mut orchestrator = Orchestrator::new(session.boxed(), test_config())
        .with_pacer(autolike_core::ActionPacer::new((1_000, 1_000)));

    let start = tokio::time::Instant::now();
    assert!(orchestrator
        .like_record(&Post::from_link(&post_url("A")))
        .await
        .unwrap());
    assert_eq!(start.elapsed(), Duration::from_millis(1_000));
    session.with(|state| assert_eq!(state.tabs.len(), 1));
}

#[tokio::test(start_paused = true)]
async fn scroll_until_stable_collects_union_and_tolerates_failures() {
    let session = MockSession::new();
    session.add_scroll_pages(
        "about:home",
        vec![Some(100.0), None, Some(150.0), Some(150.0)],
        vec![vec!["a", "b"], vec!["b", "c"], vec!["c", "d"]],
    );
    let mut orchestrator = Orchestrator::new(session.boxed(), test_config());

    let items = orchestrator
        .scroll_until_stable(&ScrollTarget::Window, "article a", &ItemKey::Text)
        .await;
    assert_eq!(items, vec!["a", "b", "c", "d"]);
    session.with(|state| assert_eq!(state.scroll_commands, 4));
}

#[tokio::test(start_paused = true)]
async fn scroll_until_stable_respects_iteration_cap() {
    let session = MockSession::new();
    let heights = (1..=20).map(|step| Some(f64::from(step) * 100.0)).collect();
    session.add_scroll_pages("about:home", heights, vec![vec!["x"]]);
    let mut config = test_config();
    config.scroll_bound = RetryBound::Limited(5);
    let mut orchestrator = Orchestrator::new(session.boxed(), config);

    let items = orchestrator
        .scroll_until_stable(
            &ScrollTarget::Element("div.dialog".into()),
            "a.account",
            &ItemKey::Attribute("href".into()),
        )
        .await;
    assert_eq!(items, vec!["x"]);
    session.with(|state| assert_eq!(state.scroll_commands, 5));
}

fn followed_accounts_fixture(session: &MockSession) {
    session.add_present(OWNER, "a.following");
    session.add_present(OWNER, "div.dialog");
    session.add_scroll_pages(
        OWNER,
        vec![Some(300.0), Some(600.0), Some(600.0)],
        vec![vec!["alice", "bob"], vec!["bob", "carol"], vec!["carol"]],
    );
}

#[tokio::test(start_paused = true)]
async fn list_followed_accounts_performs_no_actions() {
    let session = MockSession::new();
    followed_accounts_fixture(&session);
    let mut orchestrator = Orchestrator::new(session.boxed(), test_config());

    let accounts = orchestrator.list_followed_accounts().await.unwrap();
    let names: Vec<_> = accounts.iter().map(|account| account.username.as_str()).collect();
    assert_eq!(names, vec!["alice", "bob", "carol"]);
    assert_eq!(accounts[0].profile_link, "https://site.test/alice/");
    assert_eq!(orchestrator.stats(), TrackerStats::default());
    session.with(|state| {
        assert!(state.liked.is_empty());
        assert!(state.opened.is_empty());
        assert_eq!(state.clicked_selectors, vec!["a.following"]);
    });
}

#[tokio::test(start_paused = true)]
async fn followed_accounts_loop_likes_all_posts_and_skips_broken_profiles() {
    let session = MockSession::new();
    followed_accounts_fixture(&session);

    let alice = "https://site.test/alice/";
    session.add_present(alice, "article");
    session.add_scroll_pages(
        alice,
        vec![Some(1000.0), Some(1000.0)],
        vec![vec![post_url("a1"), post_url("a2")]],
    );
    let carol = "https://site.test/carol/";
    session.add_present(carol, "article");
    session.add_scroll_pages(carol, vec![Some(10.0), Some(10.0)], vec![vec![post_url("c1")]]);
    session.add_likeable(&["a1", "a2", "c1"]);

    let mut orchestrator = Orchestrator::new(session.boxed(), test_config())
        .with_policy(Box::new(|_: &Post| false));

    orchestrator.run_followed_accounts_loop().await.unwrap();
    assert_eq!(orchestrator.stats(), TrackerStats { acted: 3, skipped: 0 });
    session.with(|state| {
        assert_eq!(state.liked, vec![post_url("a1"), post_url("a2"), post_url("c1")]);
        assert_eq!(state.max_tabs_seen, 2);
        assert_eq!(state.tabs.len(), 1);
    });
    assert_eq!(session.opened_count("https://site.test/bob/"), 1);
}

#[tokio::test(start_paused = true)]
async fn single_profile_loop_likes_discovered_links() {
    let session = MockSession::new();
    let target = "https://site.test/natgeo/";
    session.add_present(target, "article");
    session.add_scroll_pages(
        target,
        vec![Some(100.0), Some(200.0), Some(200.0)],
        vec![vec![post_url("n1")], vec![post_url("n1"), post_url("n2")]],
    );
    session.add_likeable(&["n1"]);

    let mut orchestrator = Orchestrator::new(session.boxed(), test_config());
    let liked = orchestrator.run_single_profile_loop("natgeo").await.unwrap();
    assert_eq!(liked, 1);
    assert!(orchestrator.tracker().has_acted("n1"));
    session.with(|state| {
        assert_eq!(state.liked, vec![post_url("n1")]);
        assert!(state.opened.contains(&post_url("n2")));
    });
}

#[tokio::test(start_paused = true)]
async fn run_logs_in_and_shuts_down_after_failure() {
    let session = MockSession::new();
    session.add_present(BASE, "input[name='username']");
    session.add_present(BASE, "input[name='password']");
    session.add_present(BASE, "button[type='submit']");
    session.add_present(BASE, "nav.home");

    let mut config = test_config();
    config.account.skip_login = false;
    config.explore_retry = RetryBound::Limited(2);
    let orchestrator = Orchestrator::new(session.boxed(), config);

    let result = orchestrator.run(Command::LikeFromExplore).await;
    assert!(matches!(result, Err(BrowserError::Timeout(_))));
    session.with(|state| {
        assert!(state.shut_down);
        assert_eq!(state.typed, vec!["owner", "secret"]);
        assert_eq!(state.clicked_selectors, vec!["button[type='submit']"]);
        assert_eq!(state.navigations.first().map(String::as_str), Some(BASE));
    });
    assert_eq!(session.opened_count(&explore_url(0)), 2);
}

#[tokio::test(start_paused = true)]
async fn missing_login_element_aborts_login_but_not_the_run() {
    let session = MockSession::new();
    session.add_present(BASE, "input[name='username']");
    followed_accounts_fixture(&session);

    let mut config = test_config();
    config.account.skip_login = false;
    let orchestrator = Orchestrator::new(session.boxed(), config);

    let report = orchestrator
        .run(Command::ListFollowedAccounts)
        .await
        .unwrap();
    assert_eq!(report.accounts.len(), 3);
    assert_eq!(report.stats, TrackerStats::default());
    session.with(|state| {
        assert!(state.shut_down);
        assert_eq!(state.typed, vec!["owner"]);
    });
}

#[tokio::test(start_paused = true)]
async fn run_reports_stats_for_profile_command() {
    let session = MockSession::new();
    let target = "https://site.test/natgeo/";
    session.add_present(target, "article");
    session.add_scroll_pages(target, vec![Some(5.0), Some(5.0)], vec![vec![post_url("n1")]]);
    session.add_likeable(&["n1"]);

    let report = Orchestrator::new(session.boxed(), test_config())
        .run(Command::LikeProfile("natgeo".into()))
        .await
        .unwrap();
    assert_eq!(report.stats, TrackerStats { acted: 1, skipped: 0 });
    assert!(report.accounts.is_empty());
    assert!(session.with(|state| state.shut_down));
}

#[tokio::test(start_paused = true)]
async fn explore_retries_after_page_load_timeout() {
    let session = MockSession::new();
    session.add_slow_loads(&explore_url(0), 1);
    session.add_payloads(explore_url(0), vec![Some(payload(&[("A", "")]))]);
    session.add_likeable(&["A"]);

    let mut orchestrator = Orchestrator::new(session.boxed(), test_config())
        .with_strategy(Box::new(RunTimes::new(1)));

    orchestrator.run_explore_loop().await.unwrap();
    assert_eq!(session.opened_count(&explore_url(0)), 2);
    session.with(|state| {
        assert_eq!(state.liked, vec![post_url("A")]);
        assert_eq!(state.tabs.len(), 1);
    });
}

#[tokio::test(start_paused = true)]
async fn slow_login_page_aborts_login_but_not_the_run() {
    let session = MockSession::new();
    session.add_slow_loads(BASE, 1);
    followed_accounts_fixture(&session);

    let mut config = test_config();
    config.account.skip_login = false;
    let report = Orchestrator::new(session.boxed(), config)
        .run(Command::ListFollowedAccounts)
        .await
        .unwrap();
    assert_eq!(report.accounts.len(), 3);
    session.with(|state| {
        assert!(state.typed.is_empty());
        assert!(state.shut_down);
    });
}

#[tokio::test(start_paused = true)]
async fn relative_grid_links_are_resolved_against_site() {
    let session = MockSession::new();
    let target = "https://site.test/natgeo/";
    session.add_present(target, "article");
    session.add_scroll_pages(
        target,
        vec![Some(100.0), Some(100.0)],
        vec![vec!["/p/n1/".to_string(), post_url("n1"), "/p/n2/".to_string()]],
    );
    session.add_likeable(&["n1", "n2"]);

    let mut orchestrator = Orchestrator::new(session.boxed(), test_config());
    let liked = orchestrator.run_single_profile_loop("natgeo").await.unwrap();
    assert_eq!(liked, 2);
    assert!(orchestrator.tracker().has_acted("n1"));
    session.with(|state| {
        assert_eq!(state.liked, vec![post_url("n1"), post_url("n2")]);
        assert!(!state.opened.iter().any(|url| url.starts_with('/')));
    });
}

#[tokio::test(start_paused = true)]
async fn second_auxiliary_tab_is_rejected() {
    let session = MockSession::new();
    session.with(|state| state.tabs.push("about:stray".into()));
    session.add_likeable(&["A"]);
    let mut orchestrator = Orchestrator::new(session.boxed(), test_config());

    let result = orchestrator
        .like_record(&Post::from_link(&post_url("A")))
        .await;
    assert!(matches!(result, Err(BrowserError::Unexpected(_))));
    assert_eq!(orchestrator.stats().acted, 0);
    session.with(|state| {
        assert_eq!(state.current, 0);
        assert!(state.opened.is_empty());
    });

    let session = MockSession::new();
    session.with(|state| state.tabs.push("about:stray".into()));
    session.add_payloads(explore_url(0), vec![Some(payload(&[("A", "")]))]);
    let mut orchestrator = Orchestrator::new(session.boxed(), test_config());

    let result = orchestrator.run_explore_loop().await;
    assert!(matches!(result, Err(BrowserError::Unexpected(_))));
    assert_eq!(session.opened_count(&explore_url(0)), 0);
    session.with(|state| assert_eq!(state.current, 0));
}

#[tokio::test(start_paused = true)]
async fn failed_tab_close_keeps_recorded_like() {
    let session = MockSession::new();
    session.add_likeable(&["A"]);
    session.with(|state| state.failing_closes = 1);
    let mut orchestrator = Orchestrator::new(session.boxed(), test_config());

    assert!(orchestrator
        .like_record(&Post::from_link(&post_url("A")))
        .await
        .unwrap());
    assert_eq!(orchestrator.stats(), TrackerStats { acted: 1, skipped: 0 });
    session.with(|state| {
        assert_eq!(state.liked, vec![post_url("A")]);
        assert_eq!(state.tabs.len(), 2);
    });
}
