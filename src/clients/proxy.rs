use rand::seq::IndexedRandom;
use reqwest::Client;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Egress proxies pulled from public `host:port` lists.
///
/// The list is refetched once it is older than `refresh`; a failed refresh
/// keeps serving the previous list.
pub struct ProxyPool {
    client: Client,
    lists: HashMap<String, String>,
    refresh: Duration,
    cached: RwLock<Option<(Instant, Vec<String>)>>,
}

impl ProxyPool {
    #[must_use]
    pub fn new(client: Client, lists: HashMap<String, String>, refresh: Duration) -> Self {
        Self {
            client,
            lists,
            refresh,
            cached: RwLock::new(None),
        }
    }

    /// A pool that never hands out a proxy.
    #[must_use]
    pub fn disabled(client: Client) -> Self {
        Self::new(client, HashMap::new(), Duration::from_secs(0))
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        !self.lists.is_empty()
    }

    /// A random proxy URL such as `socks5://1.2.3.4:1080`.
    pub async fn pick(&self) -> Option<String> {
        if !self.is_enabled() {
            return None;
        }

        {
            let cached = self.cached.read().await;
            if let Some((fetched_at, proxies)) = cached.as_ref()
                && fetched_at.elapsed() < self.refresh
            {
                return proxies.choose(&mut rand::rng()).cloned();
            }
        }

        let fresh = self.fetch_all().await;
        let mut cached = self.cached.write().await;
        if !fresh.is_empty() {
            *cached = Some((Instant::now(), fresh));
        }
        cached
            .as_ref()
            .and_then(|(_, proxies)| proxies.choose(&mut rand::rng()).cloned())
    }

    async fn fetch_all(&self) -> Vec<String> {
        let mut proxies = Vec::new();

        for (scheme, url) in &self.lists {
            match self.fetch_list(url).await {
                Ok(body) => {
                    let before = proxies.len();
                    proxies.extend(parse_proxy_list(scheme, &body));
                    debug!(scheme, count = proxies.len() - before, "Loaded proxy list");
                }
                Err(e) => warn!(scheme, url, error = %e, "Failed to load proxy list"),
            }
        }

        proxies
    }

    async fn fetch_list(&self, url: &str) -> reqwest::Result<String> {
        self.client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await
    }
}

fn parse_proxy_list(scheme: &str, body: &str) -> Vec<String> {
    body.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && line.contains(':'))
        .map(|line| format!("{scheme}://{line}"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_proxy_list_skips_blank_and_malformed_lines() {
        let body = "1.2.3.4:8080\n\n  5.6.7.8:1080  \ngarbage\n";
        assert_eq!(
            parse_proxy_list("socks5", body),
            vec!["socks5://1.2.3.4:8080", "socks5://5.6.7.8:1080"]
        );
    }

    #[tokio::test]
    async fn test_disabled_pool_hands_out_nothing() {
        let pool = ProxyPool::disabled(Client::new());
        assert!(!pool.is_enabled());
        assert!(pool.pick().await.is_none());
    }
}
