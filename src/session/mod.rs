//! Opaque credential bundle for the page fetcher.
//!
//! Cookies are captured outside the pipeline (interactive browser flow,
//! an exported extension file) and only loaded here. Two layouts are
//! accepted: a bare JSON array of cookie objects, or a storage-state
//! object with a top-level `cookies` array. Entries without both a name
//! and a value are skipped; a missing or unreadable file degrades to an
//! empty session with a warning, never an error.

use std::path::Path;
use std::sync::Arc;

use reqwest::cookie::Jar;
use serde::Deserialize;
use url::Url;

#[derive(Debug, Clone, Deserialize)]
pub struct SessionCookie {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct Session {
    cookies: Vec<SessionCookie>,
}

impl Session {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn load(path: &Path) -> Self {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(_) => {
                tracing::warn!(
                    "Cookie file {} not found, continuing without cookies",
                    path.display()
                );
                return Self::empty();
            }
        };

        match Self::parse(&raw) {
            Ok(session) => {
                tracing::info!("Loaded {} cookies from {}", session.len(), path.display());
                session
            }
            Err(e) => {
                tracing::warn!("Failed to read cookies from {}: {}", path.display(), e);
                Self::empty()
            }
        }
    }

    fn parse(raw: &str) -> serde_json::Result<Self> {
        let value: serde_json::Value = serde_json::from_str(raw)?;

        // Storage-state files nest the list under a `cookies` key.
        let list = if let serde_json::Value::Object(map) = &value {
            map.get("cookies").cloned().unwrap_or_else(|| value.clone())
        } else {
            value
        };

        let entries: Vec<serde_json::Value> = serde_json::from_value(list)?;
        let cookies = entries
            .into_iter()
            .filter_map(|entry| serde_json::from_value::<SessionCookie>(entry).ok())
            .filter(|cookie| !cookie.name.is_empty())
            .collect();

        Ok(Self { cookies })
    }

    pub fn len(&self) -> usize {
        self.cookies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }

    /// Seed a cookie jar for the HTTP client. Cookies carrying their own
    /// domain are scoped to it; domainless ones (the common browser-export
    /// shape) are applied to every fallback origin, matching the originals'
    /// send-with-everything session behavior.
    pub fn seed_jar(&self, fallback_origins: &[Url]) -> Arc<Jar> {
        let jar = Arc::new(Jar::default());

        for cookie in &self.cookies {
            match &cookie.domain {
                Some(domain) => {
                    let host = domain.trim_start_matches('.');
                    if let Ok(origin) = Url::parse(&format!("https://{host}/")) {
                        jar.add_cookie_str(&cookie_str(cookie, host), &origin);
                    }
                }
                None => {
                    for origin in fallback_origins {
                        if let Some(host) = origin.host_str() {
                            let domain = host.trim_start_matches("www.");
                            jar.add_cookie_str(&cookie_str(cookie, domain), origin);
                        }
                    }
                }
            }
        }

        jar
    }
}

fn cookie_str(cookie: &SessionCookie, domain: &str) -> String {
    let path = cookie.path.as_deref().unwrap_or("/");
    format!(
        "{}={}; Domain={}; Path={}",
        cookie.name, cookie.value, domain, path
    )
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use reqwest::cookie::CookieStore;

    use super::*;

    #[test]
    fn test_parse_bare_cookie_array() {
        let session = Session::parse(
            r#"[{"name": "sid", "value": "abc"}, {"name": "region", "value": "msk"}]"#,
        )
        .unwrap();
        assert_eq!(session.len(), 2);
    }

    #[test]
    fn test_parse_storage_state_layout() {
        let session = Session::parse(
            r#"{"cookies": [{"name": "sid", "value": "abc", "domain": ".vkusvill.ru"}], "origins": []}"#,
        )
        .unwrap();
        assert_eq!(session.len(), 1);
    }

    #[test]
    fn test_entries_without_name_or_value_are_skipped() {
        let session = Session::parse(
            r#"[{"name": "sid", "value": "abc"}, {"value": "orphan"}, {"name": "novalue"}]"#,
        )
        .unwrap();
        assert_eq!(session.len(), 1);
    }

    #[test]
    fn test_missing_file_is_an_empty_session() {
        let session = Session::load(Path::new("/definitely/not/here/cookies.json"));
        assert!(session.is_empty());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"[{{"name": "sid", "value": "abc"}}]"#).unwrap();

        let session = Session::load(file.path());
        assert_eq!(session.len(), 1);
    }

    #[test]
    fn test_seed_jar_applies_domainless_cookies_to_fallbacks() {
        let session = Session::parse(r#"[{"name": "sid", "value": "abc"}]"#).unwrap();
        let origin: Url = "https://vkusvill.ru/".parse().unwrap();
        let jar = session.seed_jar(std::slice::from_ref(&origin));

        let header = jar.cookies(&origin).expect("cookie for seeded origin");
        assert_eq!(header.to_str().unwrap(), "sid=abc");
    }

    #[test]
    fn test_seed_jar_scopes_domain_cookies_to_subdomains() {
        let session = Session::parse(
            r#"[{"name": "sid", "value": "abc", "domain": ".ozon.ru"}]"#,
        )
        .unwrap();
        let jar = session.seed_jar(&[]);

        let api: Url = "https://api.ozon.ru/".parse().unwrap();
        let header = jar.cookies(&api).expect("domain cookie covers subdomain");
        assert_eq!(header.to_str().unwrap(), "sid=abc");
    }
}
