//! Reel URL recognition

use super::MediaReference;
use lazy_regex::lazy_regex;

// With a scheme the URL may start anywhere. A bare host must start the text
// or follow a character that cannot belong to a hostname or path, so
// `notinstagram.com` and `evil.example/instagram.com` are not picked up.
static RE_REEL_URL: lazy_regex::Lazy<regex::Regex> = lazy_regex!(
    r"(?P<full>https?://(?:www\.)?instagram\.com/reel/[^\s/?#&]+)|(?:^|[^A-Za-z0-9_.\-/])(?P<bare>(?:www\.)?instagram\.com/reel/[^\s/?#&]+)"
);

/// Characters stripped from the end of a match (sentence punctuation, closing brackets)
const TRAILING_PUNCTUATION: &[char] = &['.', ',', '!', ';', ')', ']', '>', '"', '\''];

/// Finds the first Instagram reel URL in `text`
///
/// Scheme and `www.` are optional; the reel id stops at whitespace or any of
/// `/ ? # &`. Returns `None` when no reel URL is present.
///
/// # Examples
///
/// ```
/// use reel_relay::media::extract_reel_url;
///
/// let url = extract_reel_url("check this https://instagram.com/reel/Abc123 out");
/// assert_eq!(url.map(|u| u.to_string()), Some("https://instagram.com/reel/Abc123".to_string()));
/// assert!(extract_reel_url("https://instagram.com/p/Abc123").is_none());
/// ```
#[must_use]
pub fn extract_reel_url(text: &str) -> Option<MediaReference> {
    RE_REEL_URL
        .captures_iter(text)
        .filter_map(|caps| caps.name("full").or_else(|| caps.name("bare")))
        .map(|m| m.as_str().trim_end_matches(TRAILING_PUNCTUATION))
        .find(|url| !url.ends_with("/reel/"))
        .map(MediaReference::new)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extracted(text: &str) -> Option<String> {
        extract_reel_url(text).map(|r| r.as_str().to_string())
    }

    #[test]
    fn test_url_inside_sentence() {
        assert_eq!(
            extracted("check this https://instagram.com/reel/Abc123 out"),
            Some("https://instagram.com/reel/Abc123".to_string())
        );
    }

    #[test]
    fn test_post_urls_are_rejected() {
        assert_eq!(extracted("https://instagram.com/p/Abc123"), None);
        assert_eq!(extracted("https://www.instagram.com/stories/someone/1"), None);
    }

    #[test]
    fn test_query_string_is_dropped() {
        assert_eq!(
            extracted("instagram.com/reel/Abc123?x=1"),
            Some("instagram.com/reel/Abc123".to_string())
        );
        assert_eq!(
            extracted("https://www.instagram.com/reel/C0de_-9/?igsh=abc"),
            Some("https://www.instagram.com/reel/C0de_-9".to_string())
        );
    }

    #[test]
    fn test_delimiters_end_the_id() {
        assert_eq!(
            extracted("instagram.com/reel/Abc#frag"),
            Some("instagram.com/reel/Abc".to_string())
        );
        assert_eq!(
            extracted("instagram.com/reel/Abc&utm=1"),
            Some("instagram.com/reel/Abc".to_string())
        );
    }

    #[test]
    fn test_first_match_wins() {
        assert_eq!(
            extracted("a instagram.com/reel/First b https://instagram.com/reel/Second"),
            Some("instagram.com/reel/First".to_string())
        );
    }

    #[test]
    fn test_lookalike_hosts_are_rejected() {
        assert_eq!(extracted("notinstagram.com/reel/Abc123"), None);
        assert_eq!(extracted("https://evil.example/instagram.com/reel/Abc123"), None);
        assert_eq!(extracted("instagram.com is great, see example.com/reel/1"), None);
    }

    #[test]
    fn test_url_glued_to_preceding_text() {
        for text in [
            "Link:https://instagram.com/reel/Abc123",
            "reel=https://instagram.com/reel/Abc123",
            "看https://instagram.com/reel/Abc123",
            "🔥https://instagram.com/reel/Abc123",
        ] {
            assert_eq!(
                extracted(text),
                Some("https://instagram.com/reel/Abc123".to_string()),
                "text: {text}"
            );
        }
        assert_eq!(
            extracted("看instagram.com/reel/Abc123"),
            Some("instagram.com/reel/Abc123".to_string())
        );
        assert_eq!(
            extracted("url:www.instagram.com/reel/Abc123"),
            Some("www.instagram.com/reel/Abc123".to_string())
        );
    }

    #[test]
    fn test_trailing_punctuation_and_brackets() {
        assert_eq!(
            extracted("look (https://instagram.com/reel/Abc123)."),
            Some("https://instagram.com/reel/Abc123".to_string())
        );
        assert_eq!(
            extracted("Wow: instagram.com/reel/Abc123!"),
            Some("instagram.com/reel/Abc123".to_string())
        );
    }

    #[test]
    fn test_no_url() {
        assert_eq!(extracted("hello there"), None);
        assert_eq!(extracted(""), None);
    }
}
