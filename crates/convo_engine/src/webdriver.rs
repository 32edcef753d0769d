use std::time::Duration;

use engine_logging::{engine_debug, engine_info, engine_warn};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use url::Url;

use crate::surface::{Cookie, ElementHandle, Key, StorageMap, UiError, UiSurface};

/// W3C element reference key.
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

const READ_STORAGE_SCRIPT: &str = "const out = {}; \
    for (let i = 0; i < window.localStorage.length; i++) { \
        const k = window.localStorage.key(i); out[k] = window.localStorage.getItem(k); \
    } return out;";
const WRITE_STORAGE_SCRIPT: &str = "for (const [k, v] of Object.entries(arguments[0])) { \
    window.localStorage.setItem(k, v); }";
const HOVER_SCRIPT: &str = "const tags = arguments[0].querySelectorAll(arguments[1]); \
    tags.forEach(tag => { \
        tag.scrollIntoView({block: 'center', behavior: 'instant'}); \
        const box = tag.getBoundingClientRect(); \
        tag.dispatchEvent(new MouseEvent('mouseover', {view: window, bubbles: true, cancelable: true, \
            clientX: box.left + 5, clientY: box.top + 5})); \
        tag.dispatchEvent(new MouseEvent('mouseenter', {view: window, bubbles: true, cancelable: true})); \
    }); \
    setTimeout(() => tags.forEach(tag => tag.dispatchEvent( \
        new MouseEvent('mouseout', {view: window, bubbles: true, cancelable: true}))), 100); \
    return tags.length;";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebDriverSettings {
    /// Base URL of geckodriver/chromedriver, e.g. `http://localhost:4444`.
    pub endpoint: String,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    /// Merged into `capabilities.alwaysMatch` when the session is created.
    pub capabilities: Value,
}

impl Default for WebDriverSettings {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:4444".to_string(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(60),
            capabilities: json!({}),
        }
    }
}

/// One live WebDriver session.
#[derive(Debug, Clone)]
pub struct WebDriverSession {
    client: reqwest::Client,
    endpoint: Url,
    session_url: Url,
    session_id: String,
}

#[derive(Debug, Deserialize)]
struct NewSession {
    #[serde(rename = "sessionId")]
    session_id: String,
}

#[derive(Debug, Deserialize)]
struct WireError {
    error: String,
    #[serde(default)]
    message: String,
}

impl WebDriverSession {
    pub async fn connect(settings: &WebDriverSettings) -> Result<Self, UiError> {
        let client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.request_timeout)
            .build()
            .map_err(|err| UiError::Transport(err.to_string()))?;
        let endpoint = with_trailing_slash(&settings.endpoint)?;
        let url = join(&endpoint, "session")?;
        let body = json!({ "capabilities": { "alwaysMatch": settings.capabilities } });

        let value = send(&client, Method::POST, url, Some(body)).await?;
        let created: NewSession =
            serde_json::from_value(value).map_err(|err| UiError::Protocol(err.to_string()))?;
        let session_url = join(&endpoint, &format!("session/{}/", created.session_id))?;
        engine_info!("WebDriver session {} opened at {}", created.session_id, endpoint);

        Ok(Self {
            client,
            endpoint,
            session_url,
            session_id: created.session_id,
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub async fn close(self) -> Result<(), UiError> {
        let url = join(&self.endpoint, &format!("session/{}", self.session_id))?;
        send(&self.client, Method::DELETE, url, None).await?;
        engine_info!("WebDriver session {} closed", self.session_id);
        Ok(())
    }

    async fn command(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value, UiError> {
        let url = join(&self.session_url, path)?;
        send(&self.client, method, url, body).await
    }

    async fn element_command(
        &self,
        method: Method,
        element: &ElementHandle,
        tail: &str,
        body: Option<Value>,
    ) -> Result<Value, UiError> {
        self.command(method, &format!("element/{}/{tail}", element.id()), body)
            .await
    }

    async fn execute(&self, script: &str, args: Vec<Value>) -> Result<Value, UiError> {
        self.command(
            Method::POST,
            "execute/sync",
            Some(json!({ "script": script, "args": args })),
        )
        .await
    }
}

#[async_trait::async_trait]
impl UiSurface for WebDriverSession {
    async fn find_all(&self, css: &str) -> Result<Vec<ElementHandle>, UiError> {
        let body = json!({ "using": "css selector", "value": css });
        let value = self.command(Method::POST, "elements", Some(body)).await?;
        element_list(value)
    }

    async fn find_all_within(
        &self,
        parent: &ElementHandle,
        css: &str,
    ) -> Result<Vec<ElementHandle>, UiError> {
        let body = json!({ "using": "css selector", "value": css });
        let value = self
            .element_command(Method::POST, parent, "elements", Some(body))
            .await?;
        element_list(value)
    }

    async fn is_visible(&self, element: &ElementHandle) -> Result<bool, UiError> {
        let value = self
            .element_command(Method::GET, element, "displayed", None)
            .await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    async fn click(&self, element: &ElementHandle) -> Result<(), UiError> {
        self.element_command(Method::POST, element, "click", Some(json!({})))
            .await
            .map(drop)
    }

    async fn clear(&self, element: &ElementHandle) -> Result<(), UiError> {
        self.element_command(Method::POST, element, "clear", Some(json!({})))
            .await
            .map(drop)
    }

    async fn type_text(&self, element: &ElementHandle, text: &str) -> Result<(), UiError> {
        self.element_command(Method::POST, element, "value", Some(json!({ "text": text })))
            .await
            .map(drop)
    }

    async fn press_key(&self, element: &ElementHandle, key: Key) -> Result<(), UiError> {
        self.type_text(element, key.code()).await
    }

    async fn read_text(&self, element: &ElementHandle) -> Result<String, UiError> {
        let value = self.element_command(Method::GET, element, "text", None).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn read_inner_html(&self, element: &ElementHandle) -> Result<String, UiError> {
        let value = self
            .element_command(Method::GET, element, "property/innerHTML", None)
            .await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn get_attribute(
        &self,
        element: &ElementHandle,
        name: &str,
    ) -> Result<Option<String>, UiError> {
        let value = self
            .element_command(Method::GET, element, &format!("attribute/{name}"), None)
            .await?;
        Ok(value.as_str().map(ToOwned::to_owned))
    }

    async fn current_url(&self) -> Result<String, UiError> {
        let value = self.command(Method::GET, "url", None).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn navigate(&self, url: &str) -> Result<(), UiError> {
        engine_debug!("Navigating to {url}");
        self.command(Method::POST, "url", Some(json!({ "url": url })))
            .await
            .map(drop)
    }

    async fn cookies(&self) -> Result<Vec<Cookie>, UiError> {
        let value = self.command(Method::GET, "cookie", None).await?;
        serde_json::from_value(value).map_err(|err| UiError::Protocol(err.to_string()))
    }

    async fn add_cookies(&self, cookies: &[Cookie]) -> Result<(), UiError> {
        for cookie in cookies {
            let result = self
                .command(Method::POST, "cookie", Some(json!({ "cookie": cookie })))
                .await;
            // Cookies for other domains are rejected by the browser; keep going.
            if let Err(err) = result {
                engine_warn!("Cookie {} not restored: {err}", cookie.name);
            }
        }
        Ok(())
    }

    async fn local_storage(&self) -> Result<StorageMap, UiError> {
        let value = self.execute(READ_STORAGE_SCRIPT, Vec::new()).await?;
        if value.is_null() {
            return Ok(StorageMap::new());
        }
        serde_json::from_value(value).map_err(|err| UiError::Protocol(err.to_string()))
    }

    async fn set_local_storage(&self, entries: &StorageMap) -> Result<(), UiError> {
        if entries.is_empty() {
            return Ok(());
        }
        let arg = serde_json::to_value(entries).map_err(|err| UiError::Protocol(err.to_string()))?;
        self.execute(WRITE_STORAGE_SCRIPT, vec![arg]).await.map(drop)
    }

    async fn hover_all(&self, parent: &ElementHandle, css: &str) -> Result<usize, UiError> {
        let args = vec![json!({ ELEMENT_KEY: parent.id() }), json!(css)];
        let value = self.execute(HOVER_SCRIPT, args).await?;
        Ok(value
            .as_u64()
            .and_then(|count| usize::try_from(count).ok())
            .unwrap_or(0))
    }
}

async fn send(
    client: &reqwest::Client,
    method: Method,
    url: Url,
    body: Option<Value>,
) -> Result<Value, UiError> {
    let mut request = client.request(method, url.as_str());
    if let Some(body) = body {
        request = request.json(&body);
    }
    let response = request.send().await.map_err(map_reqwest_error)?;
    let status = response.status();
    let payload: Value = response.json().await.map_err(map_reqwest_error)?;
    let value = payload.get("value").cloned().unwrap_or(Value::Null);

    if status.is_success() {
        return Ok(value);
    }
    match serde_json::from_value::<WireError>(value) {
        Ok(wire) => Err(map_wire_error(&wire.error, wire.message)),
        Err(_) => Err(UiError::Protocol(format!("http status {status}"))),
    }
}

fn map_wire_error(code: &str, message: String) -> UiError {
    let detail = if message.is_empty() {
        code.to_string()
    } else {
        message
    };
    match code {
        "no such element" | "no such window" | "no such frame" => UiError::NotFound(detail),
        "stale element reference" | "detached shadow root" | "element not interactable" => {
            UiError::Stale(detail)
        }
        "invalid session id" | "session not created" => UiError::Session(detail),
        _ => UiError::Protocol(format!("{code}: {detail}")),
    }
}

fn map_reqwest_error(err: reqwest::Error) -> UiError {
    if err.is_decode() {
        return UiError::Protocol(err.to_string());
    }
    UiError::Transport(err.to_string())
}

fn element_list(value: Value) -> Result<Vec<ElementHandle>, UiError> {
    let Value::Array(items) = value else {
        return Err(UiError::Protocol("expected element list".to_string()));
    };
    Ok(items
        .iter()
        .filter_map(|item| item.get(ELEMENT_KEY).and_then(Value::as_str))
        .map(|id| ElementHandle(id.to_string()))
        .collect())
}

fn with_trailing_slash(raw: &str) -> Result<Url, UiError> {
    let mut text = raw.trim().to_string();
    if !text.ends_with('/') {
        text.push('/');
    }
    Url::parse(&text).map_err(|err| UiError::Session(format!("invalid webdriver url {raw}: {err}")))
}

fn join(base: &Url, path: &str) -> Result<Url, UiError> {
    base.join(path)
        .map_err(|err| UiError::Protocol(format!("invalid command path {path}: {err}")))
}
