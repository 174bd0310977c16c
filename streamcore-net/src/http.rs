//! Shared `reqwest::Client` construction, grounded on
//! `pmoqobuz::api::QobuzApi::new`'s builder (fixed timeout + pinned
//! user-agent string, cookie store enabled for providers that need it).

use std::time::Duration;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Builds an HTTP client with a fixed request timeout and the given
/// user-agent string. Both providers construct one client per session and
/// reuse it for every request (connection pooling, same as the teacher).
pub fn build_client(user_agent: &str) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(DEFAULT_TIMEOUT)
        .user_agent(user_agent.to_string())
        .cookie_store(true)
        .build()
}
