use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig as ChromiumConfig};
use chromiumoxide::element::Element;
use chromiumoxide::error::CdpError;
use chromiumoxide::page::Page;
use futures::StreamExt;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::config::BrowserSection;

use super::error::{BrowserError, BrowserResult};
use super::session::{BrowserSession, ElementId, TabHandle};

const ELEMENT_POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug, Clone)]
pub struct ChromiumLauncher {
    config: BrowserSection,
    home_url: String,
}

impl ChromiumLauncher {
    pub fn new(config: BrowserSection, home_url: impl Into<String>) -> Self {
        Self {
            config,
            home_url: home_url.into(),
        }
    }

    pub async fn launch(&self) -> BrowserResult<ChromiumSession> {
        let chromium_config = self.build_chromium_config()?;
        info!(
            executable = %self.config.executable_path,
            headless = self.config.headless,
            profile = ?self.config.user_data_dir,
            "Launching Chromium instance"
        );

        let (browser, mut handler) = Browser::launch(chromium_config)
            .await
            .map_err(|err| BrowserError::Launch(err.to_string()))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(err) = event {
                    debug!(error = %err, "Chromium handler reported error");
                }
            }
        });

        let home = browser.new_page(self.home_url.as_str()).await?;
        Ok(ChromiumSession {
            browser,
            handler_task: Some(handler_task),
            tabs: vec![home],
            current: 0,
            elements: Vec::new(),
        })
    }

    fn build_chromium_config(&self) -> BrowserResult<ChromiumConfig> {
        let [width, height] = self.config.window;
        let mut builder = ChromiumConfig::builder()
            .chrome_executable(&self.config.executable_path)
            .window_size(width, height);

        if let Some(dir) = &self.config.user_data_dir {
            let dir = PathBuf::from(dir);
            std::fs::create_dir_all(&dir)?;
            builder = builder.user_data_dir(dir);
        }
        if !self.config.headless {
            builder = builder.with_head();
        }
        if !self.config.sandbox {
            builder = builder.no_sandbox();
        }
        if let Some(timeout) = self.config.request_timeout_secs {
            builder = builder.request_timeout(Duration::from_secs(timeout));
        }

        let mut args = vec![
            "--no-first-run".to_string(),
            "--disable-features=AutomationControlled".to_string(),
            "--password-store=basic".to_string(),
        ];
        if self.config.disable_gpu {
            args.push("--disable-gpu".into());
        }
        args.extend(self.config.extra_args.iter().cloned());
        builder = builder.args(args);

        builder.build().map_err(BrowserError::Configuration)
    }
}

/// [`BrowserSession`] backed by a Chromium instance driven over CDP.
#[derive(Debug)]
pub struct ChromiumSession {
    browser: Browser,
    handler_task: Option<JoinHandle<()>>,
    tabs: Vec<Page>,
    current: usize,
    elements: Vec<Element>,
}

impl ChromiumSession {
    fn page(&self) -> BrowserResult<&Page> {
        self.tabs
            .get(self.current)
            .ok_or(BrowserError::NoSuchTab(self.current))
    }

    fn element(&self, id: ElementId) -> BrowserResult<&Element> {
        self.elements
            .get(id.0)
            .ok_or_else(|| BrowserError::NotFound(format!("stale element handle {}", id.0)))
    }

    fn register(&mut self, element: Element) -> ElementId {
        self.elements.push(element);
        ElementId(self.elements.len() - 1)
    }

    async fn try_find(&self, selector: &str) -> BrowserResult<Element> {
        self.page()?
            .find_element(selector)
            .await
            .map_err(|err| map_lookup_error(selector, err))
    }
}

fn map_lookup_error(selector: &str, err: CdpError) -> BrowserError {
    match err {
        CdpError::NotFound | CdpError::Chrome(_) => BrowserError::NotFound(selector.to_string()),
        other => other.into(),
    }
}

fn map_navigation_error(url: &str, err: CdpError) -> BrowserError {
    match BrowserError::from(err) {
        BrowserError::Timeout(_) => BrowserError::Timeout(format!("navigation to {url}")),
        other => other,
    }
}

#[async_trait(?Send)]
impl BrowserSession for ChromiumSession {
    async fn navigate(&mut self, url: &str) -> BrowserResult<()> {
        self.elements.clear();
        let page = self.page()?;
        page.goto(url)
            .await
            .map_err(|err| map_navigation_error(url, err))?;
        page.wait_for_navigation()
            .await
            .map_err(|err| map_navigation_error(url, err))?;
        Ok(())
    }

    async fn tab_handles(&mut self) -> BrowserResult<Vec<TabHandle>> {
        Ok(self
            .tabs
            .iter()
            .map(|page| TabHandle(page.target_id().inner().clone()))
            .collect())
    }

    async fn open_tab(&mut self, url: &str) -> BrowserResult<()> {
        let page = self
            .browser
            .new_page(url)
            .await
            .map_err(|err| map_navigation_error(url, err))?;
        self.tabs.push(page);
        Ok(())
    }

    async fn close_tab(&mut self, index: usize) -> BrowserResult<()> {
        if index >= self.tabs.len() {
            return Err(BrowserError::NoSuchTab(index));
        }
        let page = self.tabs.remove(index);
        if index == self.current {
            self.elements.clear();
        } else if index < self.current {
            self.current -= 1;
        }
        page.close().await?;
        Ok(())
    }

    async fn switch_to_tab(&mut self, index: usize) -> BrowserResult<()> {
        let page = self.tabs.get(index).ok_or(BrowserError::NoSuchTab(index))?;
        page.bring_to_front().await?;
        self.current = index;
        self.elements.clear();
        Ok(())
    }

    async fn wait_for_element(
        &mut self,
        selector: &str,
        timeout: Duration,
    ) -> BrowserResult<ElementId> {
        let deadline = Instant::now() + timeout;
        loop {
            match self.try_find(selector).await {
                Ok(element) => return Ok(self.register(element)),
                Err(err) if err.is_target_unavailable() => {
                    if Instant::now() >= deadline {
                        return Err(BrowserError::Timeout(selector.to_string()));
                    }
                    sleep(ELEMENT_POLL_INTERVAL).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn find_element(&mut self, selector: &str) -> BrowserResult<ElementId> {
        let element = self.try_find(selector).await?;
        Ok(self.register(element))
    }

    async fn find_all_elements(&mut self, selector: &str) -> BrowserResult<Vec<ElementId>> {
        let elements = match self.page()?.find_elements(selector).await {
            Ok(elements) => elements,
            Err(err) => match map_lookup_error(selector, err) {
                BrowserError::NotFound(_) => Vec::new(),
                other => return Err(other),
            },
        };
        Ok(elements
            .into_iter()
            .map(|element| self.register(element))
            .collect())
    }

    async fn run_script(&mut self, code: &str) -> BrowserResult<Value> {
        let result = self
            .page()?
            .evaluate(code)
            .await
            .map_err(|err| BrowserError::Script(err.to_string()))?;
        Ok(result.value().cloned().unwrap_or(Value::Null))
    }

    async fn click(&mut self, element: ElementId) -> BrowserResult<()> {
        self.element(element)?.click().await?;
        Ok(())
    }

    async fn type_text(&mut self, element: ElementId, text: &str) -> BrowserResult<()> {
        let element = self.element(element)?;
        element.click().await?;
        element.type_str(text).await?;
        Ok(())
    }

    async fn read_text(&mut self, element: ElementId) -> BrowserResult<String> {
        Ok(self
            .element(element)?
            .inner_text()
            .await?
            .unwrap_or_default())
    }

    async fn read_attribute(&mut self, element: ElementId, name: &str) -> BrowserResult<String> {
        self.element(element)?
            .attribute(name)
            .await?
            .ok_or_else(|| BrowserError::NotFound(format!("attribute {name}")))
    }

    async fn shutdown(mut self: Box<Self>) -> BrowserResult<()> {
        info!(tabs = self.tabs.len(), "Shutting down Chromium instance");
        if let Err(err) = self.browser.close().await {
            warn!(error = %err, "Failed to close browser gracefully");
        }
        if let Some(handle) = self.handler_task.take() {
            if let Err(err) = handle.await {
                warn!(error = %err, "Browser handler join error");
            }
        }
        Ok(())
    }
}

impl Drop for ChromiumSession {
    fn drop(&mut self) {
        if let Some(handle) = &self.handler_task {
            if !handle.is_finished() {
                warn!("ChromiumSession dropped without explicit shutdown");
            }
        }
    }
}
