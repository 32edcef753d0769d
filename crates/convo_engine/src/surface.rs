use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UiError {
    #[error("element not found: {0}")]
    NotFound(String),
    #[error("stale element reference: {0}")]
    Stale(String),
    #[error("webdriver protocol error: {0}")]
    Protocol(String),
    #[error("webdriver transport error: {0}")]
    Transport(String),
    #[error("webdriver session error: {0}")]
    Session(String),
}

impl UiError {
    /// Errors that usually disappear on the next poll.
    pub fn is_transient(&self) -> bool {
        matches!(self, UiError::NotFound(_) | UiError::Stale(_))
    }
}

/// Opaque reference to a live DOM element.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ElementHandle(pub String);

impl ElementHandle {
    pub fn id(&self) -> &str {
        &self.0
    }
}

/// CSS selector plus an optional visible-text filter (substring match).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Locator {
    pub css: String,
    #[serde(default)]
    pub text: Option<String>,
}

impl Locator {
    pub fn css(css: impl Into<String>) -> Self {
        Self {
            css: css.into(),
            text: None,
        }
    }

    pub fn with_text(css: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            css: css.into(),
            text: Some(text.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Enter,
}

impl Key {
    /// WebDriver code point for the key.
    pub fn code(self) -> &'static str {
        match self {
            Key::Enter => "\u{E007}",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cookie {
    pub name: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secure: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_only: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub same_site: Option<String>,
}

pub type StorageMap = BTreeMap<String, String>;

/// Browser capabilities the conversation flow relies on. "Not found" is `Ok(None)` or an
/// empty list, never an error.
#[async_trait::async_trait]
pub trait UiSurface: Send + Sync {
    async fn find_all(&self, css: &str) -> Result<Vec<ElementHandle>, UiError>;
    async fn find_all_within(
        &self,
        parent: &ElementHandle,
        css: &str,
    ) -> Result<Vec<ElementHandle>, UiError>;
    async fn is_visible(&self, element: &ElementHandle) -> Result<bool, UiError>;
    async fn click(&self, element: &ElementHandle) -> Result<(), UiError>;
    async fn clear(&self, element: &ElementHandle) -> Result<(), UiError>;
    async fn type_text(&self, element: &ElementHandle, text: &str) -> Result<(), UiError>;
    async fn press_key(&self, element: &ElementHandle, key: Key) -> Result<(), UiError>;
    async fn read_text(&self, element: &ElementHandle) -> Result<String, UiError>;
    async fn read_inner_html(&self, element: &ElementHandle) -> Result<String, UiError>;
    async fn get_attribute(
        &self,
        element: &ElementHandle,
        name: &str,
    ) -> Result<Option<String>, UiError>;
    async fn current_url(&self) -> Result<String, UiError>;
    async fn navigate(&self, url: &str) -> Result<(), UiError>;
    async fn cookies(&self) -> Result<Vec<Cookie>, UiError>;
    async fn add_cookies(&self, cookies: &[Cookie]) -> Result<(), UiError>;
    async fn local_storage(&self) -> Result<StorageMap, UiError>;
    async fn set_local_storage(&self, entries: &StorageMap) -> Result<(), UiError>;
    /// Sends hover events to every `css` match inside `parent`; returns how many were hovered.
    async fn hover_all(&self, parent: &ElementHandle, css: &str) -> Result<usize, UiError>;

    /// All matches for the locator, text filter applied.
    async fn find(&self, locator: &Locator) -> Result<Vec<ElementHandle>, UiError> {
        let found = self.find_all(&locator.css).await?;
        self.filter_by_text(found, locator).await
    }

    async fn find_within(
        &self,
        parent: &ElementHandle,
        locator: &Locator,
    ) -> Result<Vec<ElementHandle>, UiError> {
        let found = self.find_all_within(parent, &locator.css).await?;
        self.filter_by_text(found, locator).await
    }

    /// First visible element across the locators, tried in order.
    async fn find_visible(&self, locators: &[Locator]) -> Result<Option<ElementHandle>, UiError> {
        for locator in locators {
            for element in self.find(locator).await? {
                match self.is_visible(&element).await {
                    Ok(true) => return Ok(Some(element)),
                    Ok(false) => {}
                    Err(err) if err.is_transient() => {}
                    Err(err) => return Err(err),
                }
            }
        }
        Ok(None)
    }

    /// Last visible element of the first locator that yields one.
    async fn find_last_visible(
        &self,
        locators: &[Locator],
    ) -> Result<Option<ElementHandle>, UiError> {
        for locator in locators {
            for element in self.find(locator).await?.into_iter().rev() {
                match self.is_visible(&element).await {
                    Ok(true) => return Ok(Some(element)),
                    Ok(false) => {}
                    Err(err) if err.is_transient() => {}
                    Err(err) => return Err(err),
                }
            }
        }
        Ok(None)
    }

    async fn filter_by_text(
        &self,
        elements: Vec<ElementHandle>,
        locator: &Locator,
    ) -> Result<Vec<ElementHandle>, UiError> {
        let Some(needle) = locator.text.as_deref() else {
            return Ok(elements);
        };
        let mut kept = Vec::new();
        for element in elements {
            match self.read_text(&element).await {
                Ok(text) if text.contains(needle) => kept.push(element),
                Ok(_) => {}
                Err(err) if err.is_transient() => {}
                Err(err) => return Err(err),
            }
        }
        Ok(kept)
    }
}
