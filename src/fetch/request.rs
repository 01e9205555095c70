use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, StatusCode};

use crate::error::{AppError, Context, Result};

use super::FetchErrorKind;

/// Expand `${NAME}` placeholders from the process environment.
pub fn expand_env_vars(value: &str) -> Result<String> {
    expand_placeholders(value, |name| std::env::var(name).ok())
}

/// Expand `${NAME}` placeholders using `lookup`; unknown names are an error.
pub fn expand_placeholders<F>(value: &str, lookup: F) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    let mut result = String::with_capacity(value.len());
    let mut chars = value.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut name = String::new();
            let mut closed = false;
            while let Some(&next) = chars.peek() {
                chars.next();
                if next == '}' {
                    closed = true;
                    break;
                }
                name.push(next);
            }

            if !closed {
                return Err(AppError::message(
                    "Unterminated environment placeholder in provider config",
                ));
            }

            if name.is_empty() {
                return Err(AppError::message(
                    "Encountered empty environment placeholder in provider config",
                ));
            }

            let value = lookup(&name).ok_or_else(|| {
                AppError::message(format!(
                    "Environment variable {} required by provider config is not set",
                    name
                ))
            })?;
            result.push_str(&value);
        } else {
            result.push(ch);
        }
    }

    Ok(result)
}

/// Expand placeholders for an optional value: an unset variable yields `None`,
/// a malformed placeholder is still an error.
pub fn expand_optional_placeholders<F>(value: &str, lookup: F) -> Result<Option<String>>
where
    F: Fn(&str) -> Option<String>,
{
    expand_placeholders(value, |_| Some(String::new()))?;
    Ok(expand_placeholders(value, lookup).ok())
}

pub fn expand_optional_env_vars(value: &str) -> Result<Option<String>> {
    expand_optional_placeholders(value, |name| std::env::var(name).ok())
}

pub fn build_headers(headers: &[(&str, String)]) -> Result<HeaderMap> {
    let mut map = HeaderMap::new();
    for (key, value) in headers {
        let name = HeaderName::from_bytes(key.as_bytes())
            .with_context(|| format!("Invalid header name: {}", key))?;
        let header_value = HeaderValue::from_str(value)
            .with_context(|| format!("Invalid header value for {}", key))?;
        map.insert(name, header_value);
    }
    Ok(map)
}

pub fn build_client(timeout: Duration, headers: HeaderMap) -> Result<Client> {
    Ok(Client::builder()
        .timeout(timeout)
        .default_headers(headers)
        .build()
        .context("Failed to construct HTTP client")?)
}

/// Map an HTTP status onto a failure class; `None` for success.
pub fn classify_status(status: StatusCode) -> Option<FetchErrorKind> {
    if status.is_success() {
        return None;
    }

    Some(match status {
        StatusCode::TOO_MANY_REQUESTS => FetchErrorKind::RateLimited,
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => FetchErrorKind::InvalidCredential,
        StatusCode::NOT_FOUND => FetchErrorKind::NotFound,
        _ => FetchErrorKind::Network,
    })
}

/// Describe a transport error without echoing the request URL, which may carry a token.
pub fn describe_transport_error(err: reqwest::Error) -> String {
    if err.is_timeout() {
        "request timed out".to_string()
    } else if err.is_connect() {
        "connection failed".to_string()
    } else {
        err.without_url().to_string()
    }
}

/// Trim a response body for log and error messages.
pub fn excerpt(body: &str) -> String {
    const LIMIT: usize = 160;
    let trimmed = body.trim();
    match trimmed.char_indices().nth(LIMIT) {
        Some((idx, _)) => format!("{}...", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}
