use anyhow::{Context, Result};
use reqwest::Client;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// One newly discovered source, as reported to the webhook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpisodeUpdate {
    pub anime: String,
    pub episode_number: i32,
    pub episode_title: Option<String>,
    pub episode_id: String,
    pub website: String,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct WebhookMessage {
    pub username: String,
    pub content: String,
    pub embeds: Vec<Embed>,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct Embed {
    pub description: String,
    pub color: u32,
    pub author: EmbedAuthor,
    pub timestamp: String,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct EmbedAuthor {
    pub name: String,
}

const EMBED_COLOR: u32 = 15_198_183;

/// Receives the digest of a finished scrape job.
#[async_trait::async_trait]
pub trait UpdateNotifier: Send + Sync {
    async fn notify(&self, updates: &[EpisodeUpdate]) -> Result<()>;
}

/// Builds one message per website, in website name order.
#[must_use]
pub fn build_digest(updates: &[EpisodeUpdate], username: &str) -> Vec<WebhookMessage> {
    let mut grouped: BTreeMap<&str, Vec<&EpisodeUpdate>> = BTreeMap::new();
    for update in updates {
        grouped.entry(update.website.as_str()).or_default().push(update);
    }

    let timestamp = crate::db::now();

    grouped
        .into_iter()
        .map(|(website, updates)| {
            let content = if updates.len() == 1 {
                "There is an update"
            } else {
                "There are multiple updates"
            };

            let description = updates
                .iter()
                .map(|u| match &u.episode_title {
                    Some(title) => format!("{} Episode {} - {title}", u.anime, u.episode_number),
                    None => format!("{} Episode {}", u.anime, u.episode_number),
                })
                .collect::<Vec<_>>()
                .join("\n");

            WebhookMessage {
                username: username.to_string(),
                content: content.to_string(),
                embeds: vec![Embed {
                    description,
                    color: EMBED_COLOR,
                    author: EmbedAuthor {
                        name: format!("Provided by {website}"),
                    },
                    timestamp: timestamp.clone(),
                }],
            }
        })
        .collect()
}

pub struct WebhookNotifier {
    client: Client,
    url: String,
    username: String,
}

impl WebhookNotifier {
    #[must_use]
    pub fn new(client: Client, url: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
            username: username.into(),
        }
    }
}

#[async_trait::async_trait]
impl UpdateNotifier for WebhookNotifier {
    async fn notify(&self, updates: &[EpisodeUpdate]) -> Result<()> {
        for message in build_digest(updates, &self.username) {
            let response = self
                .client
                .post(&self.url)
                .json(&message)
                .send()
                .await
                .context("Failed to send webhook")?;

            if !response.status().is_success() {
                warn!(status = %response.status(), "Webhook rejected the digest");
            }
        }
        debug!(count = updates.len(), "Webhook digest sent");
        Ok(())
    }
}

/// Used when notifications are disabled.
pub struct DisabledNotifier;

#[async_trait::async_trait]
impl UpdateNotifier for DisabledNotifier {
    async fn notify(&self, _updates: &[EpisodeUpdate]) -> Result<()> {
        Ok(())
    }
}
