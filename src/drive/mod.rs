//! Share-link lookup in the Drive web UI.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, debug, warn};
use crate::cfg::{BrowserConfig, RetryConfig};
use crate::error::{LinkFailure, PipelineError, UiStage};
use crate::retrieve::LinkResult;

pub mod webdriver;

use webdriver::{xpath_literal, Wait, WebDriver, WebDriverError};

static LINK_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^https?://\S+$").unwrap());

const CLEAR_CLIPBOARD: &str = "return navigator.clipboard.writeText('');";
const READ_CLIPBOARD: &str = "return navigator.clipboard.readText();";

/// Anything that can turn a file name into its share link.
pub trait LinkSource {
    async fn find_link(&mut self, filename: &str) -> LinkResult;
}

pub struct DriveUi {
    driver: WebDriver,
    search_url: String,
    result_label_template: String,
    copy_link_label: String,
    result_timeout: Duration,
    copy_timeout: Duration,
    clipboard_pause: Duration,
}

impl DriveUi {
    pub async fn launch(browser: &BrowserConfig, retry: &RetryConfig) -> Result<Self, PipelineError> {
        info!("Starting browser session via {}", browser.webdriver_url);

        let mut args = vec![
            format!("--profile-directory={}", browser.profile_directory),
            format!("--user-data-dir={}", browser.user_data_dir),
        ];
        if browser.headless {
            args.push("--headless=new".to_string());
        }

        let driver = WebDriver::start(&browser.webdriver_url, &args)
            .await
            .map_err(|e| PipelineError::WebDriver(e.to_string()))?;
        if let Err(e) = driver.maximize().await {
            debug!("Could not maximize window: {}", e);
        }

        Ok(Self {
            driver,
            search_url: browser.search_url.clone(),
            result_label_template: browser.result_label_template.clone(),
            copy_link_label: browser.copy_link_label.clone(),
            result_timeout: Duration::from_secs(retry.result_timeout_secs),
            copy_timeout: Duration::from_secs(retry.copy_timeout_secs),
            clipboard_pause: Duration::from_secs(retry.clipboard_pause_secs),
        })
    }

    pub async fn close(self) -> Result<(), PipelineError> {
        info!("Closing browser session");
        self.driver
            .quit()
            .await
            .map_err(|e| PipelineError::WebDriver(e.to_string()))
    }

    fn result_xpath(&self, filename: &str) -> String {
        let label = self.result_label_template.replace("{name}", filename);
        format!(
            "//*[@guidedhelpid=\"main_container\"]//*[@aria-label={}]",
            xpath_literal(&label)
        )
    }

    fn copy_link_xpath(&self) -> String {
        format!(
            "//*[@id=\"drive_main_page\"]//*[@aria-label={}]",
            xpath_literal(&self.copy_link_label)
        )
    }

    /// Walks the search results page that is already loaded.
    async fn lookup(&self, filename: &str) -> Result<Result<String, LinkFailure>, WebDriverError> {
        if let Err(e) = self.driver.execute(CLEAR_CLIPBOARD).await {
            debug!("Clipboard not cleared: {}", e);
        }

        let result = match self.driver.wait_clickable(&self.result_xpath(filename), self.result_timeout).await? {
            Wait::Ready(element) => element,
            Wait::NotReady => return Ok(Err(LinkFailure::Timeout { stage: UiStage::SearchResult })),
            Wait::Absent => return Ok(Err(LinkFailure::NoMatch)),
        };
        self.driver.click(&result).await?;

        let copy = match self.driver.wait_clickable(&self.copy_link_xpath(), self.copy_timeout).await? {
            Wait::Ready(element) => element,
            Wait::NotReady | Wait::Absent => {
                return Ok(Err(LinkFailure::Timeout { stage: UiStage::CopyLink }))
            }
        };
        self.driver.click(&copy).await?;

        sleep(self.clipboard_pause).await;

        match self.driver.execute(READ_CLIPBOARD).await {
            Ok(value) => Ok(clipboard_link(&value)),
            Err(WebDriverError::Javascript(message)) => Ok(Err(LinkFailure::Clipboard(message))),
            Err(e) => Err(e),
        }
    }
}

impl LinkSource for DriveUi {
    async fn find_link(&mut self, filename: &str) -> LinkResult {
        let url = format!("{}{}", self.search_url, urlencoding::encode(filename));
        if let Err(e) = self.driver.goto(&url).await {
            return LinkResult::Error(format!("search page did not load: {}", e));
        }

        match self.lookup(filename).await {
            Ok(Ok(link)) => LinkResult::Found(link),
            Ok(Err(failure)) => LinkResult::NotFound(failure),
            Err(e) if e.is_fatal() => LinkResult::Error(e.to_string()),
            Err(e) => {
                // element went stale, click intercepted and the like
                warn!("UI interaction failed for {}: {}", filename, e);
                LinkResult::NotFound(LinkFailure::Interaction(e.to_string()))
            }
        }
    }
}

/// Validates what the page read back from the clipboard.
pub fn clipboard_link(value: &Value) -> Result<String, LinkFailure> {
    let text = value.as_str().unwrap_or_default().trim();
    if text.is_empty() {
        return Err(LinkFailure::EmptyClipboard);
    }
    if !LINK_PATTERN.is_match(text) {
        return Err(LinkFailure::NotALink(text.chars().take(80).collect()));
    }
    Ok(text.to_string())
}
