//! Chromium-backed engine implementation, speaking CDP via chromiumoxide.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::network::{
    CookieParam, EventLoadingFailed, EventRequestWillBeSent, RequestId, TimeSinceEpoch,
};
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::cdp::js_protocol::runtime::EventConsoleApiCalled;
use chromiumoxide::handler::viewport::Viewport as CdpViewport;
use chromiumoxide::page::{Page, ScreenshotParams};
use futures::StreamExt;
use tokio::task::JoinHandle;

use super::{
    CaptureParams, Cookie, DisposeError, Engine, EngineConfig, EngineProcess, EngineSession,
    ImageFormat, LaunchError, PageError, SessionError, SessionLogs, Viewport,
};

/// Flag set the browser is always launched with. Keeps headless renders
/// stable inside containers and stops background work from skewing captures.
const HARDENING_ARGS: &[&str] = &[
    "--headless=new",
    "--no-sandbox",
    "--disable-setuid-sandbox",
    "--disable-dev-shm-usage",
    "--disable-background-networking",
    "--disable-background-timer-throttling",
    "--disable-backgrounding-occluded-windows",
    "--disable-breakpad",
    "--disable-component-update",
    "--disable-default-apps",
    "--disable-features=Translate,BackForwardCache",
    "--disable-hang-monitor",
    "--disable-sync",
    "--disable-extensions",
    "--metrics-recording-only",
    "--mute-audio",
];

pub struct ChromiumEngine;

impl ChromiumEngine {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ChromiumEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Engine for ChromiumEngine {
    fn name(&self) -> &'static str {
        "chromium"
    }

    async fn launch(&self, config: &EngineConfig) -> Result<Box<dyn EngineProcess>, LaunchError> {
        let mut builder = BrowserConfig::builder().viewport(CdpViewport {
            width: config.viewport.width,
            height: config.viewport.height,
            device_scale_factor: Some(config.viewport.scale_factor),
            ..CdpViewport::default()
        });

        if !config.headless {
            builder = builder.with_head();
        }
        if let Some(ref executable) = config.executable {
            builder = builder.chrome_executable(executable.clone());
        }
        for arg in HARDENING_ARGS {
            builder = builder.arg(*arg);
        }
        for arg in &config.extra_args {
            builder = builder.arg(arg);
        }

        let browser_config = builder.build().map_err(LaunchError::Config)?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| LaunchError::Spawn(e.to_string()))?;

        // The handler stream must be polled for the whole process lifetime;
        // it multiplexes every CDP message for the browser.
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        Ok(Box::new(ChromiumProcess {
            browser,
            handler_task,
        }))
    }
}

pub struct ChromiumProcess {
    browser: Browser,
    handler_task: JoinHandle<()>,
}

#[async_trait]
impl EngineProcess for ChromiumProcess {
    async fn new_session(&self, viewport: Viewport) -> Result<Box<dyn EngineSession>, SessionError> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| SessionError::Create(e.to_string()))?;

        let logs = Arc::new(StdMutex::new(SessionLogs::default()));
        let tasks = spawn_log_collectors(&page, Arc::clone(&logs))
            .await
            .map_err(|e| SessionError::Create(e.to_string()))?;

        let mut session = ChromiumSession { page, logs, tasks };
        if let Err(e) = session.set_viewport(viewport).await {
            let _ = Box::new(session).close().await;
            return Err(SessionError::Create(e.to_string()));
        }

        Ok(Box::new(session))
    }

    async fn terminate(mut self: Box<Self>) -> Result<(), DisposeError> {
        let closed = self.browser.close().await;
        match closed {
            Ok(_) => {
                let _ = self.browser.wait().await;
                self.handler_task.abort();
                Ok(())
            }
            Err(e) => {
                self.handler_task.abort();
                Err(DisposeError::Terminate(e.to_string()))
            }
        }
    }
}

/// Subscribe to console output and request failures for a page.
///
/// Returns the collector tasks so the session can abort them on close.
async fn spawn_log_collectors(
    page: &Page,
    logs: Arc<StdMutex<SessionLogs>>,
) -> Result<Vec<JoinHandle<()>>, chromiumoxide::error::CdpError> {
    let mut console_events = page.event_listener::<EventConsoleApiCalled>().await?;
    let mut request_events = page.event_listener::<EventRequestWillBeSent>().await?;
    let mut failure_events = page.event_listener::<EventLoadingFailed>().await?;

    // Request ids are mapped to method + URL so a failure can be reported the
    // way it was issued, not just by its opaque id.
    let requests: Arc<StdMutex<HashMap<RequestId, (String, String)>>> =
        Arc::new(StdMutex::new(HashMap::new()));

    let console_logs = Arc::clone(&logs);
    let console_task = tokio::spawn(async move {
        while let Some(event) = console_events.next().await {
            let kind = format!("{:?}", event.r#type).to_uppercase();
            let message = event
                .args
                .iter()
                .filter_map(|arg| arg.value.as_ref())
                .map(|value| value.to_string())
                .collect::<Vec<_>>()
                .join(" ");
            tracing::debug!(target: "snaplet::page", "[CONSOLE {kind}] {message}");
            if let Ok(mut logs) = console_logs.lock() {
                logs.console.push(format!("[{kind}] {message}"));
            }
        }
    });

    let seen_requests = Arc::clone(&requests);
    let request_task = tokio::spawn(async move {
        while let Some(event) = request_events.next().await {
            if let Ok(mut map) = seen_requests.lock() {
                map.insert(
                    event.request_id.clone(),
                    (event.request.method.clone(), event.request.url.clone()),
                );
            }
        }
    });

    let failure_logs = logs;
    let failure_task = tokio::spawn(async move {
        while let Some(event) = failure_events.next().await {
            let known = requests
                .lock()
                .ok()
                .and_then(|mut map| map.remove(&event.request_id));
            let line = match known {
                Some((method, url)) => format!("{} {} - {}", method, url, event.error_text),
                None => format!("{:?} - {}", event.r#type, event.error_text),
            };
            tracing::debug!(target: "snaplet::page", "[NETWORK ERROR] {line}");
            if let Ok(mut logs) = failure_logs.lock() {
                logs.network_errors.push(line);
            }
        }
    });

    Ok(vec![console_task, request_task, failure_task])
}

pub struct ChromiumSession {
    page: Page,
    logs: Arc<StdMutex<SessionLogs>>,
    tasks: Vec<JoinHandle<()>>,
}

#[async_trait]
impl EngineSession for ChromiumSession {
    async fn set_viewport(&mut self, viewport: Viewport) -> Result<(), PageError> {
        let params = SetDeviceMetricsOverrideParams::builder()
            .width(viewport.width as i64)
            .height(viewport.height as i64)
            .device_scale_factor(viewport.scale_factor)
            .mobile(false)
            .build()
            .map_err(PageError::Protocol)?;
        self.page
            .execute(params)
            .await
            .map_err(|e| PageError::Protocol(e.to_string()))?;
        Ok(())
    }

    async fn set_cookies(&mut self, cookies: Vec<Cookie>) -> Result<(), PageError> {
        let mut params = Vec::with_capacity(cookies.len());
        for cookie in cookies {
            let mut builder = CookieParam::builder()
                .name(cookie.name)
                .value(cookie.value)
                .secure(cookie.secure)
                .http_only(cookie.http_only);
            if let Some(url) = cookie.url {
                builder = builder.url(url);
            }
            if let Some(domain) = cookie.domain {
                builder = builder.domain(domain);
            }
            if let Some(path) = cookie.path {
                builder = builder.path(path);
            }
            if let Some(expires) = cookie.expires {
                builder = builder.expires(TimeSinceEpoch::new(expires));
            }
            params.push(builder.build().map_err(PageError::Protocol)?);
        }
        self.page
            .set_cookies(params)
            .await
            .map_err(|e| PageError::Protocol(e.to_string()))?;
        Ok(())
    }

    async fn navigate(&mut self, url: &str) -> Result<(), PageError> {
        self.page
            .goto(url)
            .await
            .map_err(|e| PageError::Navigation(e.to_string()))?;
        self.page
            .wait_for_navigation()
            .await
            .map_err(|e| PageError::Navigation(e.to_string()))?;
        Ok(())
    }

    async fn capture(&mut self, params: &CaptureParams) -> Result<Vec<u8>, PageError> {
        let format = match params.format {
            ImageFormat::Png => CaptureScreenshotFormat::Png,
            ImageFormat::Jpeg => CaptureScreenshotFormat::Jpeg,
        };

        if let Some(ref selector) = params.selector {
            let element = self
                .page
                .find_element(selector.as_str())
                .await
                .map_err(|e| PageError::ElementNotFound(format!("{selector}: {e}")))?;
            return element
                .screenshot(format)
                .await
                .map_err(|e| PageError::Capture(e.to_string()));
        }

        let mut builder = ScreenshotParams::builder()
            .format(format)
            .full_page(params.full_page);
        if params.format == ImageFormat::Jpeg {
            builder = builder.quality(i64::from(params.quality));
        }
        self.page
            .screenshot(builder.build())
            .await
            .map_err(|e| PageError::Capture(e.to_string()))
    }

    fn drain_logs(&mut self) -> SessionLogs {
        self.logs
            .lock()
            .map(|mut logs| std::mem::take(&mut *logs))
            .unwrap_or_default()
    }

    async fn close(self: Box<Self>) -> Result<(), SessionError> {
        for task in &self.tasks {
            task.abort();
        }
        // The page handle is an Arc internally; close() consumes one clone.
        self.page
            .clone()
            .close()
            .await
            .map_err(|e| SessionError::Close(e.to_string()))
    }
}

impl Drop for ChromiumSession {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}
