// ABOUTME: Readiness polling for the display server
// ABOUTME: Fixed linear poll of GET /api/state with named attempt and interval limits

use crate::process::ManagedProcess;
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 30;
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

const PROBE_TIMEOUT: Duration = Duration::from_secs(2);
const PROBE_CONNECT_TIMEOUT: Duration = Duration::from_secs(1);

/// How often and how long to poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub max_attempts: u32,
    pub interval: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// A lightweight check of whether the server accepts requests.
#[async_trait]
pub trait ReadinessProbe: Send + Sync {
    /// What is being probed, for messages.
    fn target(&self) -> &str;

    async fn probe(&self) -> bool;
}

/// Probes an HTTP endpoint. Any response counts as ready, whatever the
/// status code; only transport failures count as not ready.
pub struct HttpProbe {
    client: Client,
    url: String,
}

impl HttpProbe {
    pub fn new(url: impl Into<String>) -> reqwest::Result<Self> {
        let client = Client::builder()
            .timeout(PROBE_TIMEOUT)
            .connect_timeout(PROBE_CONNECT_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl ReadinessProbe for HttpProbe {
    fn target(&self) -> &str {
        &self.url
    }

    async fn probe(&self) -> bool {
        match self.client.get(&self.url).send().await {
            Ok(resp) => {
                tracing::debug!(url = %self.url, status = %resp.status(), "Readiness probe answered");
                true
            }
            Err(e) => {
                tracing::trace!(url = %self.url, error = %e, "Readiness probe failed");
                false
            }
        }
    }
}

/// Result of a poll run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// Probe succeeded on attempt `attempts`
    Ready { attempts: u32 },
    /// Every attempt failed
    TimedOut { attempts: u32 },
    /// The server process died before answering
    ProcessExited { attempts: u32, code: Option<i32> },
}

/// Polls `probe` until it answers, the attempts run out, or `process` dies.
///
/// Probes once per `policy.interval`, with no sleep after the last attempt.
/// `on_miss` runs after every failed attempt.
pub async fn wait_until_ready(
    probe: &dyn ReadinessProbe,
    policy: &PollPolicy,
    process: &mut dyn ManagedProcess,
    mut on_miss: impl FnMut(u32) + Send,
) -> Readiness {
    for attempt in 1..=policy.max_attempts {
        if !process.is_alive() {
            let code = process.wait().await.ok().and_then(|exit| exit.code);
            return Readiness::ProcessExited {
                attempts: attempt - 1,
                code,
            };
        }

        if probe.probe().await {
            return Readiness::Ready { attempts: attempt };
        }
        on_miss(attempt);

        if attempt < policy.max_attempts {
            tokio::time::sleep(policy.interval).await;
        }
    }

    Readiness::TimedOut {
        attempts: policy.max_attempts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{CountingProbe, FakeProcess};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::time::Instant;

    #[test]
    fn test_default_policy() {
        let policy = PollPolicy::default();
        assert_eq!(policy.max_attempts, 30);
        assert_eq!(policy.interval, Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ready_on_third_attempt_stops_polling() {
        let probe = CountingProbe::ready_on(3);
        let (mut server, _handle) = FakeProcess::running("server");
        let start = Instant::now();
        let mut misses = Vec::new();

        let result =
            wait_until_ready(&probe, &PollPolicy::default(), &mut server, |n| misses.push(n)).await;

        assert_eq!(result, Readiness::Ready { attempts: 3 });
        assert_eq!(probe.calls(), 3);
        assert_eq!(misses, vec![1, 2]);
        assert_eq!(start.elapsed(), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ready_on_first_attempt_does_not_sleep() {
        let probe = CountingProbe::ready_on(1);
        let (mut server, _handle) = FakeProcess::running("server");
        let start = Instant::now();

        let result = wait_until_ready(&probe, &PollPolicy::default(), &mut server, |_| {}).await;

        assert_eq!(result, Readiness::Ready { attempts: 1 });
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out_after_max_attempts() {
        let probe = CountingProbe::never();
        let (mut server, _handle) = FakeProcess::running("server");
        let start = Instant::now();

        let result = wait_until_ready(&probe, &PollPolicy::default(), &mut server, |_| {}).await;

        assert_eq!(result, Readiness::TimedOut { attempts: 30 });
        assert_eq!(probe.calls(), 30);
        assert_eq!(start.elapsed(), Duration::from_secs(29));
    }

    #[tokio::test(start_paused = true)]
    async fn test_custom_policy() {
        let probe = CountingProbe::never();
        let (mut server, _handle) = FakeProcess::running("server");
        let policy = PollPolicy {
            max_attempts: 4,
            interval: Duration::from_millis(250),
        };
        let start = Instant::now();

        let result = wait_until_ready(&probe, &policy, &mut server, |_| {}).await;

        assert_eq!(result, Readiness::TimedOut { attempts: 4 });
        assert_eq!(start.elapsed(), Duration::from_millis(750));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dead_server_stops_polling() {
        let probe = CountingProbe::never();
        let (mut server, handle) = FakeProcess::running("server");
        handle.exit_with(Some(1));

        let result = wait_until_ready(&probe, &PollPolicy::default(), &mut server, |_| {}).await;

        assert_eq!(
            result,
            Readiness::ProcessExited {
                attempts: 0,
                code: Some(1)
            }
        );
        assert_eq!(probe.calls(), 0);
    }

    #[tokio::test]
    async fn test_http_probe_connection_refused_is_not_ready() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let probe = HttpProbe::new(format!("http://{addr}/api/state")).unwrap();
        assert!(!probe.probe().await);
    }

    #[tokio::test]
    async fn test_http_probe_accepts_any_status() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = socket.read(&mut buf).await;
            let _ = socket
                .write_all(
                    b"HTTP/1.1 500 Internal Server Error\r\ncontent-length: 0\r\nconnection: close\r\n\r\n",
                )
                .await;
        });

        let probe = HttpProbe::new(format!("http://{addr}/api/state")).unwrap();
        assert_eq!(probe.target(), format!("http://{addr}/api/state"));
        assert!(probe.probe().await, "a 500 still means the server is listening");
    }
}
