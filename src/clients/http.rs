use crate::clients::proxy::ProxyPool;
use crate::config::ScraperConfig;
use crate::error::ScrapeError;
use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Proxy, StatusCode};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/97.0.4692.71 Safari/537.36";

/// GET helper shared by scrapers, extractors and metadata providers.
///
/// Every request carries a short timeout. Transport errors, 5xx, 403 and 429
/// are retried after a fixed delay, and each retry goes out through a fresh
/// proxy from the pool when one is configured.
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
    proxies: Arc<ProxyPool>,
    user_agent: String,
    timeout: Duration,
    max_retries: u32,
    retry_delay: Duration,
}

impl HttpFetcher {
    #[must_use]
    pub fn new(client: Client, proxies: Arc<ProxyPool>, config: &ScraperConfig) -> Self {
        Self {
            client,
            proxies,
            user_agent: config.user_agent.clone(),
            timeout: Duration::from_secs(config.request_timeout_secs),
            max_retries: config.max_retries,
            retry_delay: Duration::from_millis(config.retry_delay_ms),
        }
    }

    /// Same client without retries or proxies. Used by tests and one-shot tools.
    #[must_use]
    pub fn direct(client: Client) -> Self {
        Self {
            proxies: Arc::new(ProxyPool::disabled(client.clone())),
            client,
            user_agent: USER_AGENT.to_string(),
            timeout: Duration::from_secs(5),
            max_retries: 0,
            retry_delay: Duration::ZERO,
        }
    }

    #[must_use]
    pub const fn client(&self) -> &Client {
        &self.client
    }

    pub async fn get_text(&self, url: &str) -> Result<String, ScrapeError> {
        self.get_text_with_headers(url, &[]).await
    }

    pub async fn get_text_with_headers(
        &self,
        url: &str,
        headers: &[(&str, &str)],
    ) -> Result<String, ScrapeError> {
        let (status, body) = self.execute(url, headers).await?;
        if status == StatusCode::NOT_FOUND {
            return Err(ScrapeError::NotFound(url.to_string()));
        }
        if !status.is_success() {
            return Err(transient(url, format!("HTTP {status}")));
        }
        Ok(body)
    }

    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        headers: &[(&str, &str)],
    ) -> Result<T, ScrapeError> {
        let body = self.get_text_with_headers(url, headers).await?;
        serde_json::from_str(&body).map_err(|e| {
            ScrapeError::UpstreamLogicMismatch(format!("Unexpected JSON from {url}: {e}"))
        })
    }

    /// Returns the status alongside the body instead of failing on non-2xx.
    pub async fn get_with_status(
        &self,
        url: &str,
        headers: &[(&str, &str)],
    ) -> Result<(StatusCode, String), ScrapeError> {
        self.execute(url, headers).await
    }

    async fn execute(
        &self,
        url: &str,
        headers: &[(&str, &str)],
    ) -> Result<(StatusCode, String), ScrapeError> {
        let headers = self.build_headers(headers);
        let mut last_error = transient(url, "no attempt made".to_string());

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                tokio::time::sleep(self.retry_delay).await;
            }

            let client = if attempt > 0 {
                self.rotated_client().await
            } else {
                self.client.clone()
            };

            match client
                .get(url)
                .headers(headers.clone())
                .timeout(self.timeout)
                .send()
                .await
            {
                Ok(response) => {
                    let status = response.status();
                    if is_retryable(status) {
                        debug!(url, attempt, %status, "Retryable upstream status");
                        last_error = transient(url, format!("HTTP {status}"));
                        continue;
                    }
                    match response.text().await {
                        Ok(body) => return Ok((status, body)),
                        Err(e) => last_error = e.into(),
                    }
                }
                Err(e) => {
                    debug!(url, attempt, error = %e, "Request failed");
                    last_error = e.into();
                }
            }
        }

        Err(last_error)
    }

    fn build_headers(&self, extra: &[(&str, &str)]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Ok(value) = HeaderValue::from_str(&self.user_agent) {
            headers.insert(header::USER_AGENT, value);
        }
        for (name, value) in extra {
            if let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                headers.insert(name, value);
            }
        }
        headers
    }

    async fn rotated_client(&self) -> Client {
        let Some(proxy_url) = self.proxies.pick().await else {
            return self.client.clone();
        };

        let built = Proxy::all(&proxy_url).and_then(|proxy| {
            Client::builder()
                .proxy(proxy)
                .timeout(self.timeout)
                .build()
        });

        match built {
            Ok(client) => {
                debug!(proxy = %proxy_url, "Retrying through proxy");
                client
            }
            Err(e) => {
                debug!(proxy = %proxy_url, error = %e, "Unusable proxy, retrying directly");
                self.client.clone()
            }
        }
    }
}

fn is_retryable(status: StatusCode) -> bool {
    status.is_server_error()
        || status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::FORBIDDEN
}

fn transient(url: &str, message: String) -> ScrapeError {
    let service = url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(ToString::to_string))
        .unwrap_or_else(|| "unknown".to_string());
    ScrapeError::UpstreamTransient { service, message }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_statuses() {
        assert!(is_retryable(StatusCode::BAD_GATEWAY));
        assert!(is_retryable(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_retryable(StatusCode::FORBIDDEN));
        assert!(!is_retryable(StatusCode::NOT_FOUND));
        assert!(!is_retryable(StatusCode::OK));
    }

    #[test]
    fn test_transient_error_names_host() {
        let err = transient("https://www1.gogoanime.ee/search.html", "HTTP 502".to_string());
        assert!(matches!(
            err,
            ScrapeError::UpstreamTransient { ref service, .. } if service == "www1.gogoanime.ee"
        ));
    }

    #[test]
    fn test_invalid_extra_headers_are_dropped() {
        let fetcher = HttpFetcher::direct(Client::new());
        let headers = fetcher.build_headers(&[("X-Requested-With", "XMLHttpRequest"), ("bad header", "x")]);
        assert_eq!(headers.get("x-requested-with").map(|v| v.to_str().unwrap()), Some("XMLHttpRequest"));
        assert!(headers.contains_key(header::USER_AGENT));
        assert_eq!(headers.len(), 2);
    }
}
