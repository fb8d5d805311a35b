//! Edge function client
//!
//! Fetchers here are handed to the query cache; they never touch the store.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, InvalidHeaderValue, AUTHORIZATION};
use thiserror::Error;

use crate::state::{Consolidator, Vip, VipFilter};

const CLIENT_ID: &str = "directors-access";
const TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("api key is not a valid header value")]
    InvalidKey(#[from] InvalidHeaderValue),
}

/// Authenticated client for the edge function base URL.
#[derive(Debug, Clone)]
pub struct EdgeClient {
    http: reqwest::Client,
    base_url: String,
}

impl EdgeClient {
    pub fn new(base_url: impl Into<String>, api_key: &str) -> Result<Self, ApiError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {api_key}"))?,
        );
        headers.insert("client_id", HeaderValue::from_static(CLIENT_ID));

        let http = reqwest::Client::builder()
            .timeout(TIMEOUT)
            .default_headers(headers)
            .build()?;
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self { http, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// VIPs, optionally narrowed to one assignment status.
    pub async fn get_vips(&self, filter: Option<VipFilter>) -> Result<Vec<Vip>, ApiError> {
        let mut request = self.http.get(format!("{}/vip", self.base_url));
        if let Some(filter) = filter {
            request = request.query(&[("status", filter_param(filter))]);
        }
        let vips = request.send().await?.error_for_status()?.json().await?;
        Ok(vips)
    }

    /// Consolidators matching a name query.
    pub async fn get_consolidators(&self, q: &str) -> Result<Vec<Consolidator>, ApiError> {
        let consolidators = self
            .http
            .get(format!("{}/consolidator", self.base_url))
            .query(&[("q", q)])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(consolidators)
    }
}

fn filter_param(filter: VipFilter) -> &'static str {
    match filter {
        VipFilter::Pending => "PENDING",
        VipFilter::Assigned => "ASSIGNED",
    }
}
