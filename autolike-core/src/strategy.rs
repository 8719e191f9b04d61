use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tokio::time::sleep;
use tracing::info;

use crate::config::StrategySection;

/// Decides whether the explore loop keeps going after a successful like.
///
/// Consulted exactly once per like, never before the first one and never
/// after a skip.
#[async_trait]
pub trait ContinuationStrategy: Send {
    async fn should_continue(&mut self) -> bool;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RunForever;

#[async_trait]
impl ContinuationStrategy for RunForever {
    async fn should_continue(&mut self) -> bool {
        true
    }
}

/// Runs forever, taking a long randomized break every `threshold` likes.
#[derive(Debug, Clone)]
pub struct RunForeverWithBreaks {
    threshold: u32,
    pause_secs: (u64, u64),
    counter: u32,
    breaks_taken: u32,
}

impl RunForeverWithBreaks {
    pub fn new(threshold: u32, pause_secs: (u64, u64)) -> Self {
        Self {
            threshold: threshold.max(1),
            pause_secs: (
                pause_secs.0.min(pause_secs.1),
                pause_secs.0.max(pause_secs.1),
            ),
            counter: 0,
            breaks_taken: 0,
        }
    }

    pub fn breaks_taken(&self) -> u32 {
        self.breaks_taken
    }

    fn pause_duration(&self) -> Duration {
        let (lower, upper) = self.pause_secs;
        Duration::from_secs(rand::thread_rng().gen_range(lower..=upper))
    }
}

#[async_trait]
impl ContinuationStrategy for RunForeverWithBreaks {
    async fn should_continue(&mut self) -> bool {
        self.counter += 1;
        if self.counter >= self.threshold {
            let pause = self.pause_duration();
            info!(
                likes = self.counter,
                pause_secs = pause.as_secs(),
                "taking a break"
            );
            sleep(pause).await;
            self.counter = 0;
            self.breaks_taken += 1;
        }
        true
    }
}

/// Stops once `ceiling` likes have been made. Not reusable after it says stop.
///
/// `should_continue` answers `true` for the first `ceiling - 1` calls and
/// `false` on call `ceiling` and after, so a loop that asks after each like
/// makes exactly `ceiling` likes. A ceiling of 0 behaves like 1.
#[derive(Debug, Clone)]
pub struct RunTimes {
    ceiling: u32,
    counter: u32,
}

impl RunTimes {
    pub fn new(ceiling: u32) -> Self {
        Self {
            ceiling,
            counter: 0,
        }
    }

    pub fn remaining(&self) -> u32 {
        self.ceiling.saturating_sub(self.counter)
    }
}

#[async_trait]
impl ContinuationStrategy for RunTimes {
    async fn should_continue(&mut self) -> bool {
        self.counter = self.counter.saturating_add(1);
        self.counter < self.ceiling
    }
}

pub fn strategy_from_config(section: &StrategySection) -> Box<dyn ContinuationStrategy> {
    match section {
        StrategySection::Forever => Box::new(RunForever),
        StrategySection::ForeverWithBreaks {
            threshold,
            pause_secs,
        } => Box::new(RunForeverWithBreaks::new(
            *threshold,
            (pause_secs[0], pause_secs[1]),
        )),
        StrategySection::Times { ceiling } => Box::new(RunTimes::new(*ceiling)),
    }
}
