//! Field parsers shared by the loader.

use url::Url;

use crate::error::{ConfigError, Result};

pub(crate) fn parse_url(field: &'static str, value: &str, schemes: &[&str]) -> Result<Url> {
    let invalid = |reason| ConfigError::InvalidField {
        field,
        value: Some(value.to_string()),
        reason,
    };
    let url = Url::parse(value.trim()).map_err(|_| invalid("malformed url"))?;
    if !schemes.contains(&url.scheme()) {
        return Err(invalid("unsupported scheme"));
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(invalid("missing host"));
    }
    Ok(url)
}

pub(crate) fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|raw| raw.trim().to_string())
        .filter(|trimmed| !trimmed.is_empty())
}
