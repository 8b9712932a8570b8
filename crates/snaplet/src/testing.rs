//! Instrumented fake engine shared by pool, service, and transport tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::engine::{
    CaptureParams, Cookie, DisposeError, Engine, EngineConfig, EngineProcess, EngineSession,
    LaunchError, PageError, SessionError, SessionLogs, Viewport,
};

pub(crate) const MOCK_IMAGE: &[u8] = b"mock-image-bytes";

/// Fake engine that records launches, disposals, and session closes, with
/// switches to fail the next launch, session creation, or capture.
pub(crate) struct MockEngine {
    launches: AtomicUsize,
    fail_next_launch: AtomicBool,
    fail_sessions: Arc<AtomicBool>,
    fail_capture: Arc<AtomicBool>,
    navigate_delay: Arc<StdMutex<Duration>>,
    session_closes: Arc<AtomicUsize>,
    disposed: Arc<StdMutex<Vec<usize>>>,
}

impl MockEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            launches: AtomicUsize::new(0),
            fail_next_launch: AtomicBool::new(false),
            fail_sessions: Arc::new(AtomicBool::new(false)),
            fail_capture: Arc::new(AtomicBool::new(false)),
            navigate_delay: Arc::new(StdMutex::new(Duration::ZERO)),
            session_closes: Arc::new(AtomicUsize::new(0)),
            disposed: Arc::new(StdMutex::new(Vec::new())),
        })
    }

    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn fail_next_launch(&self) {
        self.fail_next_launch.store(true, Ordering::SeqCst);
    }

    pub fn set_fail_sessions(&self, fail: bool) {
        self.fail_sessions.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_capture(&self, fail: bool) {
        self.fail_capture.store(fail, Ordering::SeqCst);
    }

    pub fn set_navigate_delay(&self, delay: Duration) {
        *self.navigate_delay.lock().unwrap() = delay;
    }

    /// Launch ordinals of terminated processes, in termination order.
    pub fn disposed_ids(&self) -> Vec<usize> {
        self.disposed.lock().unwrap().clone()
    }

    pub fn session_closes(&self) -> usize {
        self.session_closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Engine for MockEngine {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn launch(&self, _config: &EngineConfig) -> Result<Box<dyn EngineProcess>, LaunchError> {
        if self.fail_next_launch.swap(false, Ordering::SeqCst) {
            return Err(LaunchError::Spawn("mock launch failure".to_string()));
        }
        let ordinal = self.launches.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Box::new(MockProcess {
            ordinal,
            fail_sessions: Arc::clone(&self.fail_sessions),
            fail_capture: Arc::clone(&self.fail_capture),
            navigate_delay: Arc::clone(&self.navigate_delay),
            session_closes: Arc::clone(&self.session_closes),
            disposed: Arc::clone(&self.disposed),
        }))
    }
}

struct MockProcess {
    ordinal: usize,
    fail_sessions: Arc<AtomicBool>,
    fail_capture: Arc<AtomicBool>,
    navigate_delay: Arc<StdMutex<Duration>>,
    session_closes: Arc<AtomicUsize>,
    disposed: Arc<StdMutex<Vec<usize>>>,
}

#[async_trait]
impl EngineProcess for MockProcess {
    async fn new_session(&self, _viewport: Viewport) -> Result<Box<dyn EngineSession>, SessionError> {
        if self.fail_sessions.load(Ordering::SeqCst) {
            return Err(SessionError::Create("mock session refusal".to_string()));
        }
        Ok(Box::new(MockSession {
            fail_capture: Arc::clone(&self.fail_capture),
            navigate_delay: *self.navigate_delay.lock().unwrap(),
            session_closes: Arc::clone(&self.session_closes),
        }))
    }

    async fn terminate(self: Box<Self>) -> Result<(), DisposeError> {
        self.disposed.lock().unwrap().push(self.ordinal);
        Ok(())
    }
}

struct MockSession {
    fail_capture: Arc<AtomicBool>,
    navigate_delay: Duration,
    session_closes: Arc<AtomicUsize>,
}

#[async_trait]
impl EngineSession for MockSession {
    async fn set_viewport(&mut self, _viewport: Viewport) -> Result<(), PageError> {
        Ok(())
    }

    async fn set_cookies(&mut self, _cookies: Vec<Cookie>) -> Result<(), PageError> {
        Ok(())
    }

    async fn navigate(&mut self, _url: &str) -> Result<(), PageError> {
        if !self.navigate_delay.is_zero() {
            tokio::time::sleep(self.navigate_delay).await;
        }
        Ok(())
    }

    async fn capture(&mut self, _params: &CaptureParams) -> Result<Vec<u8>, PageError> {
        if self.fail_capture.load(Ordering::SeqCst) {
            return Err(PageError::Capture("mock capture failure".to_string()));
        }
        Ok(MOCK_IMAGE.to_vec())
    }

    fn drain_logs(&mut self) -> SessionLogs {
        SessionLogs {
            console: vec!["[LOG] mock console line".to_string()],
            network_errors: Vec::new(),
        }
    }

    async fn close(self: Box<Self>) -> Result<(), SessionError> {
        self.session_closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
