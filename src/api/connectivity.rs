use crate::api::Connectivity;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::Instant;
use tracing::{debug, trace};

const REACHABILITY_HOST: &str = "oauth2.googleapis.com:443";
const REACHABILITY_TIMEOUT: Duration = Duration::from_secs(3);
/// How long an answer is reused before connecting again.
const REACHABILITY_TTL: Duration = Duration::from_secs(10);

/// Considers the device online when a TCP connection to Google can be opened quickly. The answer
/// is remembered for a short while, so a run of mutations pays for at most one connection.
#[derive(Debug)]
pub struct TcpReachability {
    addr: String,
    timeout: Duration,
    ttl: Duration,
    last: Mutex<Option<(Instant, bool)>>,
}

impl Default for TcpReachability {
    fn default() -> Self {
        Self::new(REACHABILITY_HOST, REACHABILITY_TIMEOUT)
    }
}

impl TcpReachability {
    pub fn new(addr: impl Into<String>, timeout: Duration) -> Self {
        Self {
            addr: addr.into(),
            timeout,
            ttl: REACHABILITY_TTL,
            last: Mutex::new(None),
        }
    }

    /// Reuse an answer for `ttl`. `Duration::ZERO` connects every time.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    fn cached(&self) -> Option<bool> {
        let last = *self.last.lock().unwrap_or_else(|p| p.into_inner());
        last.filter(|(at, _)| at.elapsed() < self.ttl)
            .map(|(_, online)| online)
    }

    fn remember(&self, online: bool) {
        *self.last.lock().unwrap_or_else(|p| p.into_inner()) = Some((Instant::now(), online));
    }

    async fn connect(&self) -> bool {
        match tokio::time::timeout(self.timeout, TcpStream::connect(&self.addr)).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                debug!("Offline: unable to reach {}: {e}", self.addr);
                false
            }
            Err(_) => {
                debug!("Offline: timed out reaching {}", self.addr);
                false
            }
        }
    }
}

#[async_trait::async_trait]
impl Connectivity for TcpReachability {
    async fn is_online(&self) -> bool {
        if let Some(online) = self.cached() {
            trace!("Reusing connectivity answer: {online}");
            return online;
        }
        let online = self.connect().await;
        self.remember(online);
        online
    }
}

/// A switch. Used for `--offline`, test mode and tests.
#[derive(Debug)]
pub struct StaticConnectivity {
    online: AtomicBool,
}

impl StaticConnectivity {
    pub fn new(online: bool) -> Self {
        Self {
            online: AtomicBool::new(online),
        }
    }

    pub fn online() -> Self {
        Self::new(true)
    }

    pub fn offline() -> Self {
        Self::new(false)
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl Connectivity for StaticConnectivity {
    async fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }
}
