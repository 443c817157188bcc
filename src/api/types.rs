use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub const fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub database: bool,
    pub uptime_secs: u64,
}

#[derive(Debug, Serialize)]
pub struct QueueDto {
    pub pending: u64,
    pub running: u64,
    pub failed: u64,
}

#[derive(Debug, Serialize)]
pub struct StatsDto {
    pub anime: u64,
    pub episodes: u64,
    pub sources: u64,
    pub websites: usize,
    pub queue: QueueDto,
    pub version: &'static str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeRequest {
    pub anime_ids: Vec<String>,
    #[serde(default)]
    pub info_only: bool,
}

#[derive(Debug, Deserialize, Default)]
pub struct ResyncRequest {
    #[serde(default)]
    pub ids: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
pub struct FetchResponse {
    pub anime_id: String,
    pub job_id: i64,
}

#[derive(Debug, Serialize)]
pub struct EnqueueResponse {
    pub jobs: usize,
}
