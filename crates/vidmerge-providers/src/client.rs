use std::time::Duration;

use reqwest::{Client, Url};
use serde_json::Value;
use tracing::warn;
use vidmerge_core::ProviderError;

/// Desktop browser identity; both platforms serve degraded results to
/// unknown agents.
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/140.0.0.0 Safari/537.36";

/// Default per-request timeout for platform API calls.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Build the HTTP client shared by every adapter.
///
/// Cookies are kept so a warm-up request can seed session cookies for later
/// API calls. An unparsable proxy URL is logged and ignored.
pub fn build_client(proxy: Option<&str>) -> Result<Client, reqwest::Error> {
    let mut builder = Client::builder()
        .user_agent(BROWSER_USER_AGENT)
        .cookie_store(true)
        .timeout(REQUEST_TIMEOUT);

    if let Some(proxy_url) = proxy {
        match reqwest::Proxy::all(proxy_url) {
            Ok(p) => builder = builder.proxy(p),
            Err(e) => warn!(proxy = %proxy_url, error = %e, "ignoring invalid proxy URL"),
        }
    }

    builder.build()
}

/// `base` with `params` appended as an encoded query string.
pub(crate) fn endpoint(base: &str, params: &[(&str, &str)]) -> Result<Url, ProviderError> {
    Url::parse_with_params(base, params).map_err(|e| ProviderError::Decode(format!("bad endpoint {base}: {e}")))
}

/// Read a play/view count that may arrive as a number, a digit string or an
/// abbreviated string such as `"12.3万"`.
pub(crate) fn parse_count(value: &Value) -> u64 {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
            .unwrap_or(0),
        Value::String(s) => parse_count_str(s),
        _ => 0,
    }
}

fn parse_count_str(s: &str) -> u64 {
    let s = s.trim().replace(',', "");
    let (digits, scale) = if let Some(d) = s.strip_suffix('万') {
        (d, 1e4)
    } else if let Some(d) = s.strip_suffix('亿') {
        (d, 1e8)
    } else {
        (s.as_str(), 1.0)
    };
    match digits.trim().parse::<f64>() {
        Ok(v) if v.is_finite() && v >= 0.0 => (v * scale).round() as u64,
        _ => 0,
    }
}
