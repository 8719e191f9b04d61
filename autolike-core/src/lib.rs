pub mod browser;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod pacing;
pub mod parser;
pub mod policy;
pub mod record;
pub mod strategy;
pub mod tracker;

pub use browser::{
    BrowserError, BrowserResult, BrowserSession, ChromiumLauncher, ChromiumSession, ElementId,
    TabHandle,
};
pub use config::{load_bot_config, BotConfig, StrategySection};
pub use error::{ConfigError, Result};
pub use orchestrator::{
    Command, ItemKey, Orchestrator, OrchestratorConfig, RetryBound, RunReport, ScrollTarget,
    TrackerHistory,
};
pub use pacing::ActionPacer;
pub use parser::{ExploreGridParser, FeedParser, ParseError};
pub use policy::{AcceptAll, DecisionPolicy, IgnoreTags};
pub use record::{Account, Post};
pub use strategy::{ContinuationStrategy, RunForever, RunForeverWithBreaks, RunTimes};
pub use tracker::{ActionTracker, TrackerError, TrackerStats, TrackerStore};
