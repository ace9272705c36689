//! Anti-abuse layer in front of the WebSocket endpoint.
//!
//! Three cheap screens, each switchable from the environment: a
//! user-agent blocklist, a browser-upgrade-header requirement, and a
//! per-device submission rate limit.

use axum::{
    body::Body,
    extract::State,
    http::{header, Request, Response, StatusCode},
    middleware::Next,
};
use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::sync::RwLock;

/// Sec-WebSocket-Key header (browsers always send this for WS upgrades)
const SEC_WEBSOCKET_KEY: &str = "sec-websocket-key";

/// Lowercased user-agent fragments that identify CLI tools
const CLI_AGENT_FRAGMENTS: &[&str] = &[
    "curl",
    "wget",
    "httpie",
    "python-requests",
    "python-urllib",
    "libwww-perl",
    "go-http-client",
    "java/",
];

/// One device's counting window
#[derive(Debug, Clone, Copy)]
struct Window {
    count: u32,
    started: Instant,
}

/// Fixed-window rate limiter keyed by device id
#[derive(Debug, Clone)]
pub struct RateLimiter {
    windows: Arc<RwLock<HashMap<String, Window>>>,
    max_requests: u32,
    window: Duration,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(60, Duration::from_secs(10)) // 60 requests per 10 seconds
    }
}

impl RateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            windows: Arc::new(RwLock::new(HashMap::new())),
            max_requests,
            window,
        }
    }

    /// Count one request against `key`. False means over the limit.
    pub async fn check(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut windows = self.windows.write().await;

        let slot = windows.entry(key.to_string()).or_insert(Window {
            count: 0,
            started: now,
        });
        if now.duration_since(slot.started) >= self.window {
            *slot = Window {
                count: 0,
                started: now,
            };
        }
        slot.count += 1;
        slot.count <= self.max_requests
    }

    /// Drop windows that expired long enough ago to be irrelevant
    pub async fn cleanup(&self) {
        let now = Instant::now();
        self.windows
            .write()
            .await
            .retain(|_, w| now.duration_since(w.started) < self.window * 2);
    }

    #[cfg(test)]
    async fn tracked_keys(&self) -> usize {
        self.windows.read().await.len()
    }
}

/// Anti-abuse configuration
#[derive(Debug, Clone)]
pub struct AbuseConfig {
    pub block_user_agents: bool,
    pub require_browser_headers: bool,
    /// Rate limiter (None = disabled)
    pub rate_limiter: Option<RateLimiter>,
}

impl Default for AbuseConfig {
    fn default() -> Self {
        Self {
            block_user_agents: true,
            require_browser_headers: true,
            rate_limiter: Some(RateLimiter::default()),
        }
    }
}

fn env_flag(name: &str, default: bool) -> bool {
    match std::env::var(name) {
        Ok(v) => v != "0" && v.to_lowercase() != "false",
        Err(_) => default,
    }
}

fn env_number<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl AbuseConfig {
    /// Load config from environment variables
    pub fn from_env() -> Self {
        let block_user_agents = env_flag("ABUSE_BLOCK_USER_AGENTS", true);
        let require_browser_headers = env_flag("ABUSE_REQUIRE_BROWSER", true);

        let rate_limiter = env_flag("ABUSE_RATE_LIMIT", true).then(|| {
            RateLimiter::new(
                env_number("ABUSE_RATE_LIMIT_MAX", 60),
                Duration::from_secs(env_number("ABUSE_RATE_LIMIT_WINDOW", 10)),
            )
        });

        tracing::info!(
            block_user_agents,
            require_browser_headers,
            rate_limit_enabled = rate_limiter.is_some(),
            "Anti-abuse config loaded"
        );

        Self {
            block_user_agents,
            require_browser_headers,
            rate_limiter,
        }
    }
}

/// Check if a user agent looks like a bot/crawler/CLI tool
fn is_blocked_user_agent(user_agent: &str) -> bool {
    let ua = user_agent.to_lowercase();
    if CLI_AGENT_FRAGMENTS.iter().any(|f| ua.contains(f)) {
        return true;
    }
    // "bot" only counts at a word boundary ("Googlebot" yes, a name
    // merely containing the letters no)
    ua.ends_with("bot")
        || ua.contains("bot/")
        || ua.contains("bot ")
        || ua.contains("spider")
        || ua.contains("crawler")
}

/// Rate-limit key for a connection attempt.
/// None when the client has no device id yet (fresh devices pass).
fn rate_limit_key(request: &Request<Body>) -> Option<String> {
    // Keyed by device id, never by IP: attendees at a venue share the
    // WiFi's public address.
    let query = request.uri().query()?;
    query
        .split('&')
        .find_map(|pair| pair.strip_prefix("device_id="))
        .map(|device| format!("device:{}", device))
}

fn refuse(status: StatusCode, message: &str) -> Response<Body> {
    let mut builder = Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "text/plain");
    if status == StatusCode::TOO_MANY_REQUESTS {
        builder = builder.header(header::RETRY_AFTER, "10");
    }
    builder.body(Body::from(message.to_string())).unwrap()
}

/// Browsers send both Sec-WebSocket-Key and Origin on a WS upgrade;
/// CLI tools usually send neither.
fn looks_like_browser_upgrade(request: &Request<Body>) -> bool {
    request.headers().contains_key(SEC_WEBSOCKET_KEY)
        && request.headers().contains_key(header::ORIGIN)
}

/// Middleware applying the configured screens to the WebSocket endpoint
pub async fn ws_abuse_middleware(
    State(config): State<Arc<AbuseConfig>>,
    request: Request<Body>,
    next: Next,
) -> Response<Body> {
    if config.block_user_agents {
        let agent = request
            .headers()
            .get(header::USER_AGENT)
            .and_then(|ua| ua.to_str().ok());
        match agent {
            Some(ua) if is_blocked_user_agent(ua) => {
                tracing::warn!(user_agent = ua, "Blocked suspicious user agent");
                return refuse(StatusCode::FORBIDDEN, "Access denied");
            }
            Some(_) => {}
            None => {
                // No user agent at all is suspicious
                tracing::warn!("Blocked request with no User-Agent");
                return refuse(StatusCode::FORBIDDEN, "Access denied");
            }
        }
    }

    if config.require_browser_headers && !looks_like_browser_upgrade(&request) {
        tracing::warn!(uri = %request.uri(), "Blocked non-browser WebSocket request");
        return refuse(StatusCode::FORBIDDEN, "Access denied");
    }

    if let Some(ref limiter) = config.rate_limiter {
        if let Some(key) = rate_limit_key(&request) {
            if !limiter.check(&key).await {
                tracing::warn!(key, "Rate limited");
                return refuse(
                    StatusCode::TOO_MANY_REQUESTS,
                    "Rate limit exceeded. Please slow down.",
                );
            }
        }
    }

    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blocked_user_agents() {
        assert!(is_blocked_user_agent("curl/7.64.1"));
        assert!(is_blocked_user_agent("Wget/1.20.3"));
        assert!(is_blocked_user_agent("python-requests/2.25.1"));
        assert!(is_blocked_user_agent("Go-http-client/1.1"));
        assert!(is_blocked_user_agent("Googlebot/2.1"));
        assert!(is_blocked_user_agent("SomeSpider/1.0"));

        assert!(!is_blocked_user_agent(
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36"
        ));
        assert!(!is_blocked_user_agent(
            "Mozilla/5.0 (iPhone; CPU iPhone OS 14_0 like Mac OS X)"
        ));
        assert!(!is_blocked_user_agent(""));
    }

    #[test]
    fn test_rate_limit_key_from_query() {
        let req = Request::builder()
            .uri("/ws?role=audience&device_id=abc123")
            .body(Body::empty())
            .unwrap();
        assert_eq!(rate_limit_key(&req).as_deref(), Some("device:abc123"));

        let bare = Request::builder().uri("/ws").body(Body::empty()).unwrap();
        assert!(rate_limit_key(&bare).is_none());
    }

    #[tokio::test]
    async fn test_rate_limiter_allows_normal_traffic() {
        let limiter = RateLimiter::new(5, Duration::from_secs(1));

        for _ in 0..5 {
            assert!(limiter.check("test-key").await);
        }
        assert!(!limiter.check("test-key").await);
    }

    #[tokio::test]
    async fn test_rate_limiter_different_keys() {
        let limiter = RateLimiter::new(2, Duration::from_secs(1));

        assert!(limiter.check("key1").await);
        assert!(limiter.check("key1").await);
        assert!(!limiter.check("key1").await);

        assert!(limiter.check("key2").await);
        assert!(limiter.check("key2").await);
        assert!(!limiter.check("key2").await);
    }

    #[tokio::test]
    async fn test_rate_limiter_window_reset() {
        let limiter = RateLimiter::new(2, Duration::from_millis(50));

        assert!(limiter.check("key").await);
        assert!(limiter.check("key").await);
        assert!(!limiter.check("key").await);

        tokio::time::sleep(Duration::from_millis(60)).await;

        assert!(limiter.check("key").await);
    }

    #[tokio::test]
    async fn test_cleanup_drops_stale_entries() {
        let limiter = RateLimiter::new(2, Duration::from_millis(10));
        assert!(limiter.check("key").await);

        tokio::time::sleep(Duration::from_millis(30)).await;
        limiter.cleanup().await;

        assert_eq!(limiter.tracked_keys().await, 0);
    }

    #[test]
    fn test_abuse_config_default() {
        let config = AbuseConfig::default();
        assert!(config.block_user_agents);
        assert!(config.require_browser_headers);
        assert!(config.rate_limiter.is_some());
    }
}
