//! Shared helpers: secret redaction, credentialed remote URLs, text tails.

use regex::Regex;
use reqwest::Url;
use std::sync::LazyLock;

use crate::errors::ProviderError;

// Compile regexes once using LazyLock
static URL_CREDENTIALS_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(https?://)[^/@\s]+@").unwrap());

static TOKEN_HEADER_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(private-token:\s*|authorization:\s*bearer\s+|bearer\s+)[A-Za-z0-9_\-\.]+")
        .unwrap()
});

static KNOWN_TOKEN_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(glpat-[A-Za-z0-9_\-]{8,}|gh[pousr]_[A-Za-z0-9]{16,})").unwrap());

/// Strip credentials from text that may contain remote URLs, auth headers or
/// recognisable API tokens.
pub fn redact_secrets(text: &str) -> String {
    let step = URL_CREDENTIALS_REGEX.replace_all(text, "${1}***@");
    let step = TOKEN_HEADER_REGEX.replace_all(&step, "${1}***");
    KNOWN_TOKEN_REGEX.replace_all(&step, "***").into_owned()
}

/// Embed `user:token` into an http(s) remote URL. Non-http remotes (local
/// paths, `file://`, ssh) are returned unchanged.
pub fn authenticated_url(remote: &str, user: &str, token: &str) -> Result<String, ProviderError> {
    if !remote.starts_with("http://") && !remote.starts_with("https://") {
        return Ok(remote.to_string());
    }
    let mut url = Url::parse(remote)
        .map_err(|e| ProviderError::Config(format!("invalid remote URL: {}", e)))?;
    url.set_username(user)
        .map_err(|_| ProviderError::Config("remote URL cannot carry credentials".into()))?;
    url.set_password(Some(token))
        .map_err(|_| ProviderError::Config("remote URL cannot carry credentials".into()))?;
    Ok(url.to_string())
}

/// Last `max_chars` characters of `text`, prefixed with a marker when cut.
pub fn tail_chars(text: &str, max_chars: usize) -> String {
    let total = text.chars().count();
    if total <= max_chars {
        return text.to_string();
    }
    let tail: String = text.chars().skip(total - max_chars).collect();
    format!("[... {} characters truncated ...]\n{}", total - max_chars, tail)
}
