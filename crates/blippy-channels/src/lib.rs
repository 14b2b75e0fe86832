// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Notification channel dispatch (spec §4.4.1 point 2). The only defined
//! channel type is `http_request`: POST (or an overridden method) the tool
//! call's arguments as a JSON body to a configured URL.
//!
//! Dispatch never returns an error for an HTTP-level failure — the result is
//! always a textual description, successful or not, so the model sees it as
//! a normal tool result (spec §4.4.1).

use std::time::Duration;

use serde_json::Value;
use tracing::warn;

const TIMEOUT_SECS: u64 = 10;

/// A channel's `http_request` config, as stored in `notification_channels.config_json`.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct HttpRequestConfig {
    pub url: String,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default)]
    pub headers: std::collections::HashMap<String, String>,
}

fn default_method() -> String {
    "POST".to_string()
}

pub async fn dispatch_http_request(config: &HttpRequestConfig, body: &Value) -> String {
    let client = match reqwest::Client::builder().timeout(Duration::from_secs(TIMEOUT_SECS)).build() {
        Ok(c) => c,
        Err(e) => return format!("notification dispatch failed: client build error: {e}"),
    };

    let method = match config.method.to_uppercase().as_str() {
        "GET" => reqwest::Method::GET,
        "PUT" => reqwest::Method::PUT,
        "PATCH" => reqwest::Method::PATCH,
        _ => reqwest::Method::POST,
    };

    let mut req = client.request(method, &config.url).json(body);
    for (k, v) in &config.headers {
        req = req.header(k, v);
    }

    match req.send().await {
        Ok(resp) => {
            let status = resp.status();
            if status.is_success() {
                format!("notification sent ({status})")
            } else {
                let text = resp.text().await.unwrap_or_default();
                warn!(url = %config.url, %status, "notification channel returned non-2xx");
                format!("notification failed: {status}: {text}")
            }
        }
        Err(e) => {
            warn!(url = %config.url, error = %e, "notification channel request failed");
            format!("notification failed: {e}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults_to_post_with_no_headers() {
        let cfg: HttpRequestConfig = serde_json::from_value(serde_json::json!({"url": "http://x"})).unwrap();
        assert_eq!(cfg.method, "POST");
        assert!(cfg.headers.is_empty());
    }
}
