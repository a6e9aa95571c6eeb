//! Site entry normalization
//!
//! Turns whatever the user typed into the focus app (bare domains, full URLs,
//! entries with trailing slashes) into canonical hostnames. Normalization is
//! total: a malformed entry degrades to its slash-trimmed form instead of
//! failing the whole list.

use std::collections::BTreeSet;
use url::Url;

/// Canonical hostname for a single site entry
pub fn normalize(raw: &str) -> String {
    if raw.starts_with("http://") || raw.starts_with("https://") {
        if let Some(host) = Url::parse(raw)
            .ok()
            .and_then(|url| url.host_str().map(str::to_string))
        {
            if !host.is_empty() {
                return host;
            }
        }
    }
    raw.trim_end_matches('/').to_string()
}

/// Normalize a list of entries into a duplicate-free set, dropping empties
pub fn normalize_all<S: AsRef<str>>(raw: &[S]) -> BTreeSet<String> {
    raw.iter()
        .map(|site| normalize(site.as_ref()))
        .filter(|host| !host.is_empty())
        .collect()
}
