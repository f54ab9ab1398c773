use std::time::Duration;

/// Delay before the first ping, so the listener is up when it arrives.
const FIRST_PING_DELAY: Duration = Duration::from_secs(5);

/// Periodic self-ping that keeps free-tier hosts from idling the relay.
pub struct KeepAlive {
    ping_url: String,
    interval: Duration,
    client: reqwest::Client,
}

impl KeepAlive {
    pub fn new(public_url: &str, interval_secs: u64, client: reqwest::Client) -> Self {
        Self {
            ping_url: ping_url(public_url),
            interval: Duration::from_secs(interval_secs.max(1)),
            client,
        }
    }

    pub fn ping_url(&self) -> &str {
        &self.ping_url
    }

    /// Ping forever. Failures are logged and the loop carries on.
    pub async fn run(self) {
        tracing::info!(
            url = %self.ping_url,
            interval_secs = self.interval.as_secs(),
            "Keep-alive started"
        );

        tokio::time::sleep(FIRST_PING_DELAY).await;
        loop {
            self.ping_once().await;
            tokio::time::sleep(self.interval).await;
        }
    }

    async fn ping_once(&self) {
        match self.client.get(&self.ping_url).send().await {
            Ok(resp) if resp.status().is_success() => {
                tracing::debug!(status = resp.status().as_u16(), "Keep-alive ping ok");
            }
            Ok(resp) => {
                tracing::warn!(status = resp.status().as_u16(), "Keep-alive ping rejected");
            }
            Err(e) => {
                tracing::warn!(error = %e, "Keep-alive ping failed");
            }
        }
    }
}

fn ping_url(public_url: &str) -> String {
    format!("{}/ping", public_url.trim_end_matches('/'))
}
