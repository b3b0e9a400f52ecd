//! Fixed request identity shared by page fetches and file transfers.
//!
//! The site serves files only to browser-looking clients that arrive from its
//! own pages, so every request carries the same desktop Firefox User-Agent and
//! a Referer pointing at the site root.

/// Desktop Firefox User-Agent sent with every request.
pub const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:86.0) Gecko/20100101 Firefox/86.0";

/// Site root, used as the default Referer.
pub const SITE_REFERER: &str = "http://myzuka.club";

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_browser_user_agent_looks_like_firefox() {
        assert!(BROWSER_USER_AGENT.starts_with("Mozilla/5.0"));
        assert!(BROWSER_USER_AGENT.contains("Firefox/"));
    }

    #[test]
    fn test_referer_is_site_root() {
        let parsed = url::Url::parse(SITE_REFERER).unwrap();
        assert_eq!(parsed.path(), "/");
    }
}
