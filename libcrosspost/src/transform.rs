//! Content transformation
//!
//! Derives a platform-specific [`PlatformContent`] from a [`PublishRequest`].
//! Everything here is pure: no I/O, no hidden state, and no failure path.
//! Platform differences live in the [`rules`] table so adding a platform is a
//! data change.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

use crate::types::{MediaRef, Platform, PublishOptions, PublishRequest};

/// Appended when characters were dropped
pub const TRUNCATION_MARKER: char = '…';

/// What to do with text longer than `max_length`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Overflow {
    /// Shorten the text to fit
    Truncate,
    /// Keep the text so validation rejects it
    Reject,
}

/// Hard constraints of one platform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlatformRules {
    /// Body/caption/description length in characters
    pub max_length: usize,
    pub max_media: usize,
    pub requires_media: bool,
    pub hashtag_cap: usize,
    /// Set for platforms with a separate title field
    pub title_length: Option<usize>,
    pub overflow: Overflow,
}

const TWITTER: PlatformRules = PlatformRules {
    max_length: 280,
    max_media: 4,
    requires_media: false,
    hashtag_cap: 5,
    title_length: None,
    overflow: Overflow::Reject,
};

const FACEBOOK: PlatformRules = PlatformRules {
    max_length: 63_206,
    max_media: 10,
    requires_media: false,
    hashtag_cap: 30,
    title_length: None,
    overflow: Overflow::Truncate,
};

const INSTAGRAM: PlatformRules = PlatformRules {
    max_length: 2_200,
    max_media: 10,
    requires_media: true,
    hashtag_cap: 30,
    title_length: None,
    overflow: Overflow::Truncate,
};

const LINKEDIN: PlatformRules = PlatformRules {
    max_length: 3_000,
    max_media: 9,
    requires_media: false,
    hashtag_cap: 10,
    title_length: None,
    overflow: Overflow::Truncate,
};

const TIKTOK: PlatformRules = PlatformRules {
    max_length: 2_200,
    max_media: 1,
    requires_media: true,
    hashtag_cap: 10,
    title_length: None,
    overflow: Overflow::Truncate,
};

const YOUTUBE: PlatformRules = PlatformRules {
    max_length: 5_000,
    max_media: 1,
    requires_media: true,
    hashtag_cap: 15,
    title_length: Some(100),
    overflow: Overflow::Truncate,
};

const PINTEREST: PlatformRules = PlatformRules {
    max_length: 500,
    max_media: 1,
    requires_media: true,
    hashtag_cap: 20,
    title_length: Some(100),
    overflow: Overflow::Truncate,
};

const SNAPCHAT: PlatformRules = PlatformRules {
    max_length: 250,
    max_media: 1,
    requires_media: true,
    hashtag_cap: 5,
    title_length: None,
    overflow: Overflow::Reject,
};

/// Rule table lookup
pub fn rules(platform: Platform) -> &'static PlatformRules {
    match platform {
        Platform::Twitter => &TWITTER,
        Platform::Facebook => &FACEBOOK,
        Platform::Instagram => &INSTAGRAM,
        Platform::LinkedIn => &LINKEDIN,
        Platform::TikTok => &TIKTOK,
        Platform::YouTube => &YOUTUBE,
        Platform::Pinterest => &PINTEREST,
        Platform::Snapchat => &SNAPCHAT,
    }
}

/// Content shaped for one platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformContent {
    pub platform: Platform,
    /// Body text (caption, status, description)
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Lower-cased, without the leading `#`
    #[serde(default)]
    pub hashtags: Vec<String>,
    #[serde(default)]
    pub media: Vec<MediaRef>,
    #[serde(default)]
    pub options: PublishOptions,
    /// True if any text was shortened
    #[serde(default)]
    pub truncated: bool,
}

impl PlatformContent {
    pub fn char_count(&self) -> usize {
        self.text.chars().count()
    }
}

pub(crate) fn hashtag_regex() -> &'static Regex {
    static HASHTAG: OnceLock<Regex> = OnceLock::new();
    HASHTAG.get_or_init(|| Regex::new(r"#(\w+)").expect("hashtag pattern is valid"))
}

/// Extract `#\w+` tags, lower-cased and de-duplicated in first-seen order
pub fn extract_hashtags(text: &str, cap: usize) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    for capture in hashtag_regex().captures_iter(text) {
        if tags.len() >= cap {
            break;
        }
        let tag = capture[1].to_lowercase();
        if !tags.contains(&tag) {
            tags.push(tag);
        }
    }
    tags
}

/// Shorten `text` to at most `max_chars` characters
///
/// Cuts at the last whitespace inside the budget when that keeps at least
/// half of it, otherwise hard-cuts. The marker counts towards the budget and
/// is only added when characters were dropped. Returns the text and whether
/// it was shortened.
pub fn truncate(text: &str, max_chars: usize) -> (String, bool) {
    if text.chars().count() <= max_chars {
        return (text.to_string(), false);
    }
    if max_chars == 0 {
        return (String::new(), true);
    }

    let budget = max_chars - 1;
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(budget).collect();
    let ends_on_boundary = chars.next().is_some_and(char::is_whitespace);

    let cut = match head.rfind(char::is_whitespace) {
        _ if ends_on_boundary => head.as_str(),
        Some(idx) if head[..idx].chars().count() * 2 >= budget => &head[..idx],
        _ => head.as_str(),
    };

    let mut shortened = cut.trim_end().to_string();
    shortened.push(TRUNCATION_MARKER);
    (shortened, true)
}

fn fit(text: &str, max_chars: usize, overflow: Overflow) -> (String, bool) {
    match overflow {
        Overflow::Truncate => truncate(text, max_chars),
        Overflow::Reject => (text.to_string(), false),
    }
}

/// First non-empty line of the text
fn first_line(text: &str) -> &str {
    text.lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("")
}

/// Derive the content for `platform`
///
/// Hashtags are extracted from the untruncated text before any shortening.
pub fn transform(platform: Platform, request: &PublishRequest) -> PlatformContent {
    let rules = rules(platform);
    let source = request.text.trim();

    let hashtags = extract_hashtags(source, rules.hashtag_cap);
    let (text, body_truncated) = fit(source, rules.max_length, rules.overflow);

    let (title, description, title_truncated) = match rules.title_length {
        Some(limit) => {
            let (title, truncated) = truncate(first_line(source), limit);
            (Some(title), Some(text.clone()), truncated)
        }
        None => (None, None, false),
    };

    PlatformContent {
        platform,
        text,
        title,
        description,
        hashtags,
        media: request.media.clone(),
        options: request.options.clone(),
        truncated: body_truncated || title_truncated,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(text: &str) -> PublishRequest {
        PublishRequest::new("user-1", text, vec![Platform::Twitter])
    }

    #[test]
    fn test_short_text_untouched() {
        let (text, truncated) = truncate("hello world", 20);
        assert_eq!(text, "hello world");
        assert!(!truncated);
    }

    #[test]
    fn test_truncate_at_word_boundary() {
        let (text, truncated) = truncate("the quick brown fox jumps", 16);
        assert!(truncated);
        assert_eq!(text, "the quick brown…");
        assert!(text.chars().count() <= 16);
    }

    #[test]
    fn test_truncate_hard_cut_without_spaces() {
        let (text, truncated) = truncate(&"a".repeat(50), 10);
        assert!(truncated);
        assert_eq!(text, format!("{}…", "a".repeat(9)));
        assert_eq!(text.chars().count(), 10);
    }

    #[test]
    fn test_truncate_counts_characters_not_bytes() {
        let source = "é".repeat(20);
        let (text, truncated) = truncate(&source, 20);
        assert_eq!(text, source);
        assert!(!truncated);

        let (text, _) = truncate(&"é".repeat(21), 20);
        assert_eq!(text.chars().count(), 20);
    }

    #[test]
    fn test_extract_hashtags() {
        let tags = extract_hashtags("Launch day! #Rust #rust #OpenSource and #2024", 10);
        assert_eq!(tags, vec!["rust", "opensource", "2024"]);
    }

    #[test]
    fn test_extract_hashtags_respects_cap() {
        let tags = extract_hashtags("#a #b #c #d", 2);
        assert_eq!(tags, vec!["a", "b"]);
    }

    #[test]
    fn test_hashtags_come_from_untruncated_text() {
        let text = format!("{} #tail", "word ".repeat(120));
        let content = transform(Platform::Pinterest, &request(&text));
        assert!(content.truncated);
        assert!(!content.text.contains("#tail"));
        assert_eq!(content.hashtags, vec!["tail"]);
    }

    #[test]
    fn test_twitter_keeps_overlong_text_for_validation() {
        let text = "x".repeat(300);
        let content = transform(Platform::Twitter, &request(&text));
        assert_eq!(content.char_count(), 300);
        assert!(!content.truncated);
    }

    #[test]
    fn test_linkedin_truncates() {
        let text = "word ".repeat(1000);
        let content = transform(Platform::LinkedIn, &request(&text));
        assert!(content.truncated);
        assert!(content.char_count() <= 3000);
        assert!(content.text.ends_with(TRUNCATION_MARKER));
    }

    #[test]
    fn test_youtube_title_and_description() {
        let content = transform(
            Platform::YouTube,
            &request("\nMy trip to the mountains\nWe hiked for three days. #travel"),
        );
        assert_eq!(content.title.as_deref(), Some("My trip to the mountains"));
        assert_eq!(
            content.description.as_deref(),
            Some("My trip to the mountains\nWe hiked for three days. #travel")
        );
        assert_eq!(content.hashtags, vec!["travel"]);
    }

    #[test]
    fn test_transform_is_idempotent() {
        let req = request("Same input #twice").with_media(vec![MediaRef {
            id: "m1".to_string(),
            url: "https://cdn.example.com/a.png".to_string(),
            mime_type: "image/png".to_string(),
            size_bytes: 10,
            alt_text: None,
        }]);

        for platform in Platform::ALL {
            assert_eq!(transform(platform, &req), transform(platform, &req));
        }
    }

    #[test]
    fn test_every_platform_has_rules() {
        for platform in Platform::ALL {
            let rules = rules(platform);
            assert!(rules.max_length > 0);
            assert!(rules.max_media > 0);
        }
    }
}
