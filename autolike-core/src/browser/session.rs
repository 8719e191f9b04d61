use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use super::error::BrowserResult;

/// Opaque reference to an element found in the currently focused tab.
///
/// Handles are only meaningful to the session that produced them and become
/// stale once focus moves to another tab.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementId(pub usize);

/// Opaque identifier of an open tab.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TabHandle(pub String);

impl fmt::Display for TabHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Browser capabilities the orchestrator drives.
///
/// Tabs are addressed by index into [`BrowserSession::tab_handles`]; the tab
/// opened first (index 0) is the home tab.
#[async_trait(?Send)]
pub trait BrowserSession {
    async fn navigate(&mut self, url: &str) -> BrowserResult<()>;

    async fn tab_handles(&mut self) -> BrowserResult<Vec<TabHandle>>;

    /// Opens `url` in a new tab without moving focus to it.
    async fn open_tab(&mut self, url: &str) -> BrowserResult<()>;

    async fn close_tab(&mut self, index: usize) -> BrowserResult<()>;

    async fn switch_to_tab(&mut self, index: usize) -> BrowserResult<()>;

    /// Polls until `selector` matches or `timeout` elapses.
    async fn wait_for_element(
        &mut self,
        selector: &str,
        timeout: Duration,
    ) -> BrowserResult<ElementId>;

    async fn find_element(&mut self, selector: &str) -> BrowserResult<ElementId>;

    async fn find_all_elements(&mut self, selector: &str) -> BrowserResult<Vec<ElementId>>;

    async fn run_script(&mut self, code: &str) -> BrowserResult<Value>;

    async fn click(&mut self, element: ElementId) -> BrowserResult<()>;

    async fn type_text(&mut self, element: ElementId, text: &str) -> BrowserResult<()>;

    async fn read_text(&mut self, element: ElementId) -> BrowserResult<String>;

    async fn read_attribute(&mut self, element: ElementId, name: &str) -> BrowserResult<String>;

    /// Releases the underlying browser. Called once, at the end of a run.
    async fn shutdown(self: Box<Self>) -> BrowserResult<()>;
}
