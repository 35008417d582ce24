//! HTTP Client Factory
//!
//! Builds the reqwest client shared by every HTTP-using notification channel,
//! with bounded connect and total timeouts and optional proxy support.

use std::time::Duration;

use notify_relay_core::ProxyConfig;

/// Connect timeout applied to every outbound request.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Build a `reqwest::Client` with timeouts and the resolved proxy configuration.
///
/// - `Some(proxy)` -> configure proxy on the client
/// - `None` -> explicitly disable proxy (`no_proxy`), ignoring env vars
pub fn build_http_client(
    proxy: Option<&ProxyConfig>,
    timeout: Duration,
) -> reqwest::Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(timeout)
        .user_agent(concat!("notify-relay/", env!("CARGO_PKG_VERSION")));

    match proxy {
        Some(cfg) => {
            let mut p = reqwest::Proxy::all(cfg.url())?;
            if let (Some(u), Some(pw)) = (&cfg.username, &cfg.password) {
                p = p.basic_auth(u, pw);
            }
            builder = builder.proxy(p);
        }
        None => {
            builder = builder.no_proxy();
        }
    }

    builder.build()
}
