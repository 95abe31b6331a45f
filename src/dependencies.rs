use async_trait::async_trait;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{Result, StartupError};

/// A connectivity check against an external dependency
#[async_trait]
pub trait ReadinessProbe: Send + Sync {
    /// Attempt a single check; `Err` means "not ready yet"
    async fn probe(&self) -> std::io::Result<()>;

    /// Human-readable endpoint name for logs
    fn target(&self) -> String;
}

/// Probes a TCP endpoint by opening (and immediately closing) a connection
#[derive(Debug, Clone)]
pub struct TcpProbe {
    host: String,
    port: u16,
    connect_timeout: Duration,
}

impl TcpProbe {
    pub fn new(host: impl Into<String>, port: u16, connect_timeout: Duration) -> Self {
        Self {
            host: host.into(),
            port,
            connect_timeout,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.database.host.clone(),
            config.database.port,
            config.connect_timeout(),
        )
    }
}

#[async_trait]
impl ReadinessProbe for TcpProbe {
    async fn probe(&self) -> std::io::Result<()> {
        let connect = tokio::net::TcpStream::connect((self.host.as_str(), self.port));
        match tokio::time::timeout(self.connect_timeout, connect).await {
            Ok(Ok(_stream)) => Ok(()),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                format!("connect timed out after {}ms", self.connect_timeout.as_millis()),
            )),
        }
    }

    fn target(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Outcome of a successful wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitReport {
    /// Probes issued, including the successful one
    pub attempts: u64,
    pub elapsed: Duration,
}

/// Blocks startup until the database accepts connections
pub struct DatabaseWaiter<P> {
    probe: P,
    interval: Duration,
    max_wait: Option<Duration>,
}

impl<P: ReadinessProbe> DatabaseWaiter<P> {
    pub fn new(probe: P, interval: Duration) -> Self {
        Self {
            probe,
            interval,
            max_wait: None,
        }
    }

    /// Fail instead of waiting forever once `max_wait` has passed
    pub fn with_max_wait(mut self, max_wait: Option<Duration>) -> Self {
        self.max_wait = max_wait;
        self
    }

    pub fn probe(&self) -> &P {
        &self.probe
    }

    /// Probe at a fixed interval until the endpoint answers.
    ///
    /// Without a deadline this never gives up.
    pub async fn wait_until_ready(&self) -> Result<WaitReport> {
        let started = Instant::now();
        let target = self.probe.target();
        let mut attempts: u64 = 0;

        info!("⏳ Waiting for database at {}", target);

        loop {
            attempts += 1;

            match self.probe.probe().await {
                Ok(()) => {
                    let elapsed = started.elapsed();
                    info!(
                        "✅ Database at {} is accepting connections (attempts: {}, waited {:.3}s)",
                        target,
                        attempts,
                        elapsed.as_secs_f64()
                    );
                    return Ok(WaitReport { attempts, elapsed });
                }
                Err(e) => {
                    if attempts == 1 || attempts % 10 == 0 {
                        info!("Database at {} not ready yet (attempt {}): {}", target, attempts, e);
                    } else {
                        debug!("Database at {} not ready (attempt {}): {}", target, attempts, e);
                    }
                }
            }

            if let Some(max_wait) = self.max_wait {
                if started.elapsed() + self.interval > max_wait {
                    warn!(
                        "❌ Giving up on database at {} after {} attempts",
                        target, attempts
                    );
                    return Err(StartupError::DatabaseUnavailable {
                        target,
                        attempts,
                        waited_seconds: started.elapsed().as_secs(),
                    });
                }
            }

            tokio::time::sleep(self.interval).await;
        }
    }
}
