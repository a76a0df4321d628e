//! Screenshot capture through the Firecrawl scrape API.
//!
//! A capture walks an ordered list of named strategies, retrying the whole
//! list a bounded number of times with attempt-proportional backoff. It is
//! best-effort: when nothing usable comes back the caller gets a generated
//! placeholder image instead of an error.

use std::time::Duration;

use serde::Serialize;

use crate::config::ScreenshotConfig;

/// One page action understood by the scrape API.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PageAction {
    Wait {
        milliseconds: u64,
    },
    Screenshot {
        #[serde(rename = "fullPage", skip_serializing_if = "Option::is_none")]
        full_page: Option<bool>,
        #[serde(skip_serializing_if = "Option::is_none")]
        selector: Option<String>,
    },
}

/// A named request configuration, tried in a fixed fallback order.
#[derive(Debug, Clone, PartialEq)]
pub struct Strategy {
    pub name: &'static str,
    pub timeout: Duration,
    pub actions: Vec<PageAction>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeRequest<'a> {
    pub url: &'a str,
    pub formats: [&'static str; 1],
    pub only_main_content: bool,
    pub timeout: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actions: Option<&'a [PageAction]>,
}

impl Strategy {
    pub fn request<'a>(&'a self, url: &'a str) -> ScrapeRequest<'a> {
        ScrapeRequest {
            url,
            formats: ["screenshot"],
            only_main_content: false,
            timeout: self.timeout.as_millis() as u64,
            actions: (!self.actions.is_empty()).then_some(self.actions.as_slice()),
        }
    }
}

/// Strategy list and retry bounds for one kind of capture.
#[derive(Debug, Clone)]
pub struct CapturePlan {
    pub strategies: Vec<Strategy>,
    pub max_attempts: u32,
    /// Wait before every attempt, scaled by the attempt number.
    pub settle_unit: Option<Duration>,
    /// Wait between attempts, scaled by the attempt number.
    pub retry_unit: Duration,
}

impl CapturePlan {
    /// Right after publishing: the site may still be coming up.
    pub fn post_deploy(unit: Duration) -> Self {
        Self {
            strategies: vec![
                Strategy {
                    name: "full-page-with-actions",
                    timeout: Duration::from_secs(45),
                    actions: vec![
                        PageAction::Wait { milliseconds: 2000 },
                        PageAction::Screenshot {
                            full_page: Some(true),
                            selector: None,
                        },
                    ],
                },
                Strategy {
                    name: "simple-screenshot",
                    timeout: Duration::from_secs(30),
                    actions: Vec::new(),
                },
                Strategy {
                    name: "viewport-screenshot",
                    timeout: Duration::from_secs(30),
                    actions: vec![PageAction::Screenshot {
                        full_page: None,
                        selector: Some("body".to_string()),
                    }],
                },
            ],
            max_attempts: 3,
            settle_unit: Some(unit),
            retry_unit: unit * 5 / 3,
        }
    }

    /// Refreshing thumbnails of sites that are already live.
    pub fn manual(unit: Duration) -> Self {
        Self {
            strategies: vec![
                Strategy {
                    name: "simple-screenshot",
                    timeout: Duration::from_secs(25),
                    actions: Vec::new(),
                },
                Strategy {
                    name: "screenshot-with-wait",
                    timeout: Duration::from_secs(30),
                    actions: vec![
                        PageAction::Wait { milliseconds: 1000 },
                        PageAction::Screenshot {
                            full_page: None,
                            selector: None,
                        },
                    ],
                },
            ],
            max_attempts: 2,
            settle_unit: None,
            retry_unit: unit * 2 / 3,
        }
    }
}

/// Delay for a 1-based attempt number: `unit * attempt`.
pub fn backoff(unit: Duration, attempt: u32) -> Duration {
    unit.saturating_mul(attempt)
}

/// Locate the screenshot reference in any of the known response shapes.
pub fn extract_screenshot(body: &serde_json::Value) -> Option<&str> {
    body.pointer("/data/screenshot")
        .and_then(|v| v.as_str())
        .or_else(|| {
            body.pointer("/data/actions/screenshots/0")
                .and_then(|v| v.as_str())
        })
        .or_else(|| {
            body.pointer("/data/actions/0/screenshots/0")
                .and_then(|v| v.as_str())
        })
        .or_else(|| body.get("screenshot").and_then(|v| v.as_str()))
        .filter(|s| !s.is_empty())
}

/// Only URLs and inline image data are usable as thumbnails.
pub fn is_acceptable_reference(reference: &str) -> bool {
    reference.starts_with("http") || reference.starts_with("data:image")
}

const PLACEHOLDER_PREFIX: &str = "data:image/svg+xml";

/// Deterministic inline SVG labelled with the project id.
pub fn placeholder_thumbnail(project_id: &str) -> String {
    format!(
        "{PLACEHOLDER_PREFIX},<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"400\" height=\"300\">\
<rect width=\"400\" height=\"300\" fill=\"%23f3f4f6\"/>\
<text x=\"200\" y=\"150\" text-anchor=\"middle\" font-family=\"sans-serif\" font-size=\"16\" fill=\"%236b7280\">Project {}</text></svg>",
        escape_svg_text(project_id)
    )
}

fn escape_svg_text(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('#', "%23")
}

/// Empty or generated thumbnails are candidates for a refresh.
pub fn is_placeholder(thumbnail: &str) -> bool {
    thumbnail.is_empty() || thumbnail.starts_with(PLACEHOLDER_PREFIX)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Thumbnail {
    Captured(String),
    Placeholder(String),
}

impl Thumbnail {
    pub fn reference(&self) -> &str {
        match self {
            Thumbnail::Captured(r) | Thumbnail::Placeholder(r) => r,
        }
    }

    pub fn into_reference(self) -> String {
        match self {
            Thumbnail::Captured(r) | Thumbnail::Placeholder(r) => r,
        }
    }

    pub fn is_captured(&self) -> bool {
        matches!(self, Thumbnail::Captured(_))
    }
}

/// Client for the external scrape API, created once and shared.
#[derive(Clone)]
pub struct ScreenshotClient {
    http: reqwest::Client,
    api_url: String,
    api_key: Option<String>,
    unit: Duration,
}

impl ScreenshotClient {
    pub fn new(config: &ScreenshotConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_url: config.api_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            unit: config.backoff_unit,
        }
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    pub fn post_deploy_plan(&self) -> CapturePlan {
        CapturePlan::post_deploy(self.unit)
    }

    pub fn manual_plan(&self) -> CapturePlan {
        CapturePlan::manual(self.unit)
    }

    /// Capture `url`, falling back to the placeholder for `project_id`.
    pub async fn thumbnail(&self, url: &str, project_id: &str, plan: &CapturePlan) -> Thumbnail {
        let thumbnail = match self.capture(url, plan).await {
            Some(reference) => Thumbnail::Captured(reference),
            None => {
                tracing::warn!(project_id, "No screenshot captured, using placeholder");
                Thumbnail::Placeholder(placeholder_thumbnail(project_id))
            }
        };
        crate::metrics::screenshot_result(if thumbnail.is_captured() {
            "captured"
        } else {
            "placeholder"
        });
        thumbnail
    }

    /// First acceptable screenshot reference, or `None` once every strategy
    /// of every attempt has failed.
    pub async fn capture(&self, url: &str, plan: &CapturePlan) -> Option<String> {
        let Some(api_key) = self.api_key.as_deref() else {
            tracing::warn!("No Firecrawl API key, skipping screenshot");
            return None;
        };

        for attempt in 1..=plan.max_attempts {
            if let Some(unit) = plan.settle_unit {
                let wait = backoff(unit, attempt);
                tracing::debug!(attempt, wait_ms = wait.as_millis() as u64, "Waiting for site to be ready");
                tokio::time::sleep(wait).await;
            }
            tracing::info!(url, attempt, max_attempts = plan.max_attempts, "Capturing screenshot");

            for strategy in &plan.strategies {
                if let Some(reference) = self.try_strategy(api_key, url, strategy).await {
                    tracing::info!(url, strategy = strategy.name, attempt, "Captured screenshot");
                    return Some(reference);
                }
            }

            tracing::warn!(url, attempt, "All screenshot strategies failed");
            if attempt < plan.max_attempts {
                tokio::time::sleep(backoff(plan.retry_unit, attempt)).await;
            }
        }

        tracing::warn!(url, attempts = plan.max_attempts, "Screenshot attempts exhausted");
        None
    }

    async fn try_strategy(&self, api_key: &str, url: &str, strategy: &Strategy) -> Option<String> {
        tracing::debug!(strategy = strategy.name, "Trying screenshot strategy");

        let response = self
            .http
            .post(format!("{}/v1/scrape", self.api_url))
            .bearer_auth(api_key)
            .timeout(strategy.timeout + Duration::from_secs(5))
            .json(&strategy.request(url))
            .send()
            .await;

        let response = match response {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(strategy = strategy.name, "Screenshot request failed: {e}");
                return None;
            }
        };

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let snippet: String = text.chars().take(200).collect();
            tracing::warn!(strategy = strategy.name, %status, "Firecrawl API error: {snippet}");
            return None;
        }

        let body: serde_json::Value = match response.json().await {
            Ok(b) => b,
            Err(e) => {
                tracing::warn!(strategy = strategy.name, "Unreadable screenshot response: {e}");
                return None;
            }
        };

        match extract_screenshot(&body) {
            Some(reference) if is_acceptable_reference(reference) => Some(reference.to_string()),
            Some(reference) => {
                let snippet: String = reference.chars().take(100).collect();
                tracing::warn!(strategy = strategy.name, "Screenshot in unexpected format: {snippet}");
                None
            }
            None => {
                tracing::warn!(strategy = strategy.name, "Response carried no screenshot");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer, key: Option<&str>) -> ScreenshotClient {
        ScreenshotClient::new(&ScreenshotConfig {
            api_url: server.uri(),
            api_key: key.map(str::to_string),
            backoff_unit: Duration::ZERO,
            refresh_pause: Duration::ZERO,
        })
    }

    #[test]
    fn backoff_scales_with_attempt() {
        let unit = Duration::from_millis(3000);
        assert_eq!(backoff(unit, 1), Duration::from_millis(3000));
        assert_eq!(backoff(unit, 3), Duration::from_millis(9000));
        assert_eq!(backoff(Duration::ZERO, 5), Duration::ZERO);
    }

    #[test]
    fn plans_match_their_capture_paths() {
        let unit = Duration::from_millis(3000);
        let post = CapturePlan::post_deploy(unit);
        let names: Vec<_> = post.strategies.iter().map(|s| s.name).collect();
        assert_eq!(
            names,
            ["full-page-with-actions", "simple-screenshot", "viewport-screenshot"]
        );
        assert_eq!(post.max_attempts, 3);
        assert_eq!(post.retry_unit, Duration::from_millis(5000));

        let manual = CapturePlan::manual(unit);
        assert_eq!(manual.max_attempts, 2);
        assert!(manual.settle_unit.is_none());
        assert_eq!(manual.retry_unit, Duration::from_millis(2000));
    }

    #[test]
    fn request_body_shape() {
        let plan = CapturePlan::post_deploy(Duration::ZERO);
        let body = serde_json::to_value(plan.strategies[0].request("https://x.test")).unwrap();
        assert_eq!(
            body,
            json!({
                "url": "https://x.test",
                "formats": ["screenshot"],
                "onlyMainContent": false,
                "timeout": 45000,
                "actions": [
                    {"type": "wait", "milliseconds": 2000},
                    {"type": "screenshot", "fullPage": true}
                ]
            })
        );
        let simple = serde_json::to_value(plan.strategies[1].request("https://x.test")).unwrap();
        assert!(simple.get("actions").is_none());
        let viewport = serde_json::to_value(plan.strategies[2].request("https://x.test")).unwrap();
        assert_eq!(viewport["actions"][0]["selector"], "body");
    }

    #[test]
    fn extracts_every_known_shape() {
        let direct = json!({"data": {"screenshot": "https://cdn/a.png"}});
        let nested = json!({"data": {"actions": {"screenshots": ["https://cdn/b.png"]}}});
        let nested_list = json!({"data": {"actions": [{"screenshots": ["https://cdn/c.png"]}]}});
        let root = json!({"screenshot": "data:image/png;base64,AAA"});
        assert_eq!(extract_screenshot(&direct), Some("https://cdn/a.png"));
        assert_eq!(extract_screenshot(&nested), Some("https://cdn/b.png"));
        assert_eq!(extract_screenshot(&nested_list), Some("https://cdn/c.png"));
        assert_eq!(extract_screenshot(&root), Some("data:image/png;base64,AAA"));
        assert_eq!(extract_screenshot(&json!({"data": {}})), None);
        assert_eq!(extract_screenshot(&json!({"screenshot": ""})), None);
    }

    #[test]
    fn only_urls_and_inline_images_are_accepted() {
        assert!(is_acceptable_reference("https://cdn/a.png"));
        assert!(is_acceptable_reference("data:image/png;base64,AAA"));
        assert!(!is_acceptable_reference("screenshot-pending"));
        assert!(!is_acceptable_reference("data:text/html,<p>"));
    }

    #[test]
    fn placeholder_is_deterministic_and_labelled() {
        let a = placeholder_thumbnail("abc123");
        assert_eq!(a, placeholder_thumbnail("abc123"));
        assert!(a.starts_with("data:image/svg+xml,"));
        assert!(a.contains("Project abc123"));
        assert!(is_placeholder(&a));
        assert!(is_placeholder(""));
        assert!(!is_placeholder("https://cdn/a.png"));
    }

    #[tokio::test]
    async fn falls_through_to_a_working_strategy() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/scrape"))
            .and(body_partial_json(json!({"timeout": 45000})))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/scrape"))
            .and(header("authorization", "Bearer key-1"))
            .and(body_partial_json(json!({"timeout": 30000})))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"data": {"screenshot": "https://cdn/shot.png"}})),
            )
            .mount(&server)
            .await;

        let client = client(&server, Some("key-1"));
        let shot = client
            .capture("https://sites.test/creation/abc", &client.post_deploy_plan())
            .await;
        assert_eq!(shot.as_deref(), Some("https://cdn/shot.png"));
    }

    #[tokio::test]
    async fn unusable_reference_moves_to_the_next_strategy() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/scrape"))
            .and(body_partial_json(json!({"timeout": 25000})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"screenshot": "pending"})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/scrape"))
            .and(body_partial_json(json!({"timeout": 30000})))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                json!({"data": {"actions": {"screenshots": ["https://cdn/late.png"]}}}),
            ))
            .mount(&server)
            .await;

        let client = client(&server, Some("k"));
        let shot = client
            .capture("https://sites.test/creation/abc", &client.manual_plan())
            .await;
        assert_eq!(shot.as_deref(), Some("https://cdn/late.png"));
    }

    #[tokio::test]
    async fn exhausted_attempts_yield_placeholder() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/scrape"))
            .respond_with(ResponseTemplate::new(503))
            .expect(9)
            .mount(&server)
            .await;

        let client = client(&server, Some("k"));
        let thumb = client
            .thumbnail("https://sites.test/creation/abc", "abc", &client.post_deploy_plan())
            .await;
        assert_eq!(thumb, Thumbnail::Placeholder(placeholder_thumbnail("abc")));
        server.verify().await;
    }

    #[tokio::test]
    async fn manual_plan_bounds_requests() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/scrape"))
            .respond_with(ResponseTemplate::new(429))
            .expect(4)
            .mount(&server)
            .await;

        let client = client(&server, Some("k"));
        assert!(client
            .capture("https://sites.test/creation/abc", &client.manual_plan())
            .await
            .is_none());
        server.verify().await;
    }

    #[tokio::test]
    async fn missing_key_skips_the_network() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let client = client(&server, None);
        assert!(!client.has_api_key());
        let thumb = client
            .thumbnail("https://sites.test/creation/abc", "abc", &client.post_deploy_plan())
            .await;
        assert!(!thumb.is_captured());
        assert!(thumb.reference().contains("Project abc"));
        server.verify().await;
    }
}
