//! Filename extraction and sanitization for downloads and album directories.

use std::path::{Component, Path};

use url::Url;

/// Characters illegal on common filesystems. Each one becomes a space.
const ILLEGAL_PATH_CHARS: [char; 9] = ['/', '\\', '?', '*', '|', '"', ':', '>', '<'];

/// Parses Content-Disposition header to extract filename.
///
/// Handles both:
/// - `attachment; filename="example.mp3"`
/// - `attachment; filename=example.mp3`
/// - `attachment; filename*=UTF-8''example.mp3` (RFC 5987)
pub(crate) fn parse_content_disposition(header: &str) -> Option<String> {
    if let Some(pos) = header.find("filename*=") {
        let value = header[pos + 10..].trim();
        // charset'language'encoded_value
        if let Some(quote_pos) = value.find("''") {
            let encoded = &value[quote_pos + 2..];
            let end = encoded.find(';').unwrap_or(encoded.len());
            if let Ok(decoded) = urlencoding::decode(encoded[..end].trim()) {
                return Some(decoded.into_owned());
            }
        }
    }

    if let Some(pos) = header.find("filename=") {
        let value = header[pos + 9..].trim();

        if let Some(stripped) = value.strip_prefix('"') {
            if let Some(end) = stripped.find('"') {
                return Some(stripped[..end].to_string());
            }
        } else {
            let end = value.find(';').unwrap_or(value.len());
            let filename = value[..end].trim();
            if !filename.is_empty() {
                return Some(filename.to_string());
            }
        }
    }

    None
}

/// Replaces filesystem-illegal characters with spaces.
///
/// Used for both album directory names and downloaded file names. Names that
/// would resolve to `.` or `..` have their dots replaced as well.
#[must_use]
pub fn sanitize_path_component(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| {
            if ILLEGAL_PATH_CHARS.contains(&c) || c.is_control() {
                ' '
            } else {
                c
            }
        })
        .collect();
    let trimmed = sanitized.trim();

    if trimmed.is_empty() {
        return "_".to_string();
    }

    if is_safe_filename_segment(trimmed) {
        trimmed.to_string()
    } else {
        trimmed.replace('.', "_")
    }
}

/// Removes every occurrence of each token from `name`.
pub(crate) fn strip_tokens(name: &str, tokens: &[String]) -> String {
    tokens
        .iter()
        .filter(|token| !token.is_empty())
        .fold(name.to_string(), |acc, token| acc.replace(token.as_str(), ""))
}

/// Last URL path segment, percent-decoded, or `download.bin` when the path is empty.
pub(crate) fn fallback_filename_from_url(url: &Url) -> String {
    if let Some(mut segments) = url.path_segments()
        && let Some(last) = segments.next_back()
        && !last.is_empty()
    {
        return urlencoding::decode(last)
            .map_or_else(|_| last.to_string(), std::borrow::Cow::into_owned);
    }
    "download.bin".to_string()
}

/// Resolves the on-disk name for a transfer.
///
/// Priority: the caller-supplied name, then the Content-Disposition filename,
/// then the last URL path segment. Site suffix tokens are stripped and the
/// result is sanitized.
pub(crate) fn resolve_destination_name(
    preferred: Option<&str>,
    content_disposition: Option<&str>,
    url: &Url,
    strip: &[String],
) -> String {
    let raw = preferred
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(ToString::to_string)
        .or_else(|| content_disposition.and_then(parse_content_disposition))
        .unwrap_or_else(|| fallback_filename_from_url(url));
    sanitize_path_component(&strip_tokens(&raw, strip))
}

fn is_safe_filename_segment(name: &str) -> bool {
    !Path::new(name).components().any(|component| {
        matches!(
            component,
            Component::CurDir | Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn tokens() -> Vec<String> {
        vec!["_myzuka".to_string()]
    }

    // ==================== Sanitize Tests ====================

    #[test]
    fn test_sanitize_replaces_illegal_chars_with_spaces() {
        assert_eq!(sanitize_path_component("AC/DC - Back"), "AC DC - Back");
        assert_eq!(sanitize_path_component("What?*"), "What");
        assert_eq!(sanitize_path_component("a\\b|c\"d:e>f<g"), "a b c d e f g");
    }

    #[test]
    fn test_sanitize_preserves_cyrillic_and_parentheses() {
        assert_eq!(
            sanitize_path_component("Кино - Группа крови (1988)"),
            "Кино - Группа крови (1988)"
        );
    }

    #[test]
    fn test_sanitize_rewrites_dot_segments() {
        assert_eq!(sanitize_path_component(".."), "__");
        assert_eq!(sanitize_path_component("."), "_");
    }

    #[test]
    fn test_sanitize_empty_becomes_placeholder() {
        assert_eq!(sanitize_path_component("///"), "_");
    }

    // ==================== Content-Disposition Tests ====================

    #[test]
    fn test_parse_content_disposition_quoted() {
        let name = parse_content_disposition("attachment; filename=\"01 Intro_myzuka.mp3\"");
        assert_eq!(name.unwrap(), "01 Intro_myzuka.mp3");
    }

    #[test]
    fn test_parse_content_disposition_unquoted() {
        let name = parse_content_disposition("attachment; filename=track.mp3");
        assert_eq!(name.unwrap(), "track.mp3");
    }

    #[test]
    fn test_parse_content_disposition_rfc5987() {
        let name = parse_content_disposition("attachment; filename*=UTF-8''%D0%9A%D0%B8%D0%BD%D0%BE.mp3");
        assert_eq!(name.unwrap(), "Кино.mp3");
    }

    #[test]
    fn test_parse_content_disposition_missing() {
        assert!(parse_content_disposition("inline").is_none());
    }

    // ==================== Resolution Tests ====================

    #[test]
    fn test_resolve_prefers_caller_name() {
        let url = Url::parse("http://example.com/f/123").unwrap();
        let name = resolve_destination_name(
            Some("cover.jpg"),
            Some("attachment; filename=x.jpg"),
            &url,
            &tokens(),
        );
        assert_eq!(name, "cover.jpg");
    }

    #[test]
    fn test_resolve_strips_site_token_from_header_name() {
        let url = Url::parse("http://example.com/f/123").unwrap();
        let name = resolve_destination_name(
            None,
            Some("attachment; filename=\"03 Song_myzuka.mp3\""),
            &url,
            &tokens(),
        );
        assert_eq!(name, "03 Song.mp3");
    }

    #[test]
    fn test_resolve_falls_back_to_decoded_url_segment() {
        let url = Url::parse("http://example.com/files/My%20Song.mp3").unwrap();
        let name = resolve_destination_name(None, None, &url, &tokens());
        assert_eq!(name, "My Song.mp3");
    }

    #[test]
    fn test_resolve_empty_caller_name_is_ignored() {
        let url = Url::parse("http://example.com/files/a.mp3").unwrap();
        let name = resolve_destination_name(Some("  "), None, &url, &tokens());
        assert_eq!(name, "a.mp3");
    }

    #[test]
    fn test_fallback_filename_empty_path() {
        let url = Url::parse("http://example.com/").unwrap();
        assert_eq!(fallback_filename_from_url(&url), "download.bin");
    }
}
