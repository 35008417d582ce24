//! Channel Text Formatting
//!
//! Per-channel text rewriting driven by a small data table: bold-marker
//! dialect, emoji shortcode expansion, Telegram MarkdownV2 escaping and
//! length limits. Kept free of network code so each dialect can be tested
//! on its own.

use std::sync::OnceLock;

use regex::Regex;

/// How `**bold**` spans are rendered for a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoldStyle {
    /// Leave `**bold**` untouched
    Double,
    /// Rewrite to `*bold*`
    Single,
}

/// Text rewriting rules for one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelFormat {
    pub bold: BoldStyle,
    pub expand_shortcodes: bool,
    pub markdown_v2: bool,
    pub max_chars: Option<usize>,
}

/// Slack renders shortcodes itself and uses single-asterisk bold.
pub const SLACK: ChannelFormat = ChannelFormat {
    bold: BoldStyle::Single,
    expand_shortcodes: false,
    markdown_v2: false,
    max_chars: None,
};

/// Discord keeps `**bold**` and caps message content at 2000 characters.
pub const DISCORD: ChannelFormat = ChannelFormat {
    bold: BoldStyle::Double,
    expand_shortcodes: true,
    markdown_v2: false,
    max_chars: Some(2000),
};

/// Telegram MarkdownV2 with single-asterisk bold. The cap leaves room for
/// escapes within the 4096-character API limit.
pub const TELEGRAM: ChannelFormat = ChannelFormat {
    bold: BoldStyle::Single,
    expand_shortcodes: true,
    markdown_v2: true,
    max_chars: Some(2000),
};

/// Email and custom scripts get the raw text with emoji expanded.
pub const PLAIN: ChannelFormat = ChannelFormat {
    bold: BoldStyle::Double,
    expand_shortcodes: true,
    markdown_v2: false,
    max_chars: None,
};

/// Shortcodes understood by [`expand_shortcodes`].
const SHORTCODES: &[(&str, &str)] = &[
    (":white_check_mark:", "\u{2705}"),
    (":heavy_check_mark:", "\u{2714}\u{FE0F}"),
    (":warning:", "\u{26A0}\u{FE0F}"),
    (":x:", "\u{274C}"),
    (":hourglass:", "\u{231B}"),
    (":hourglass_flowing_sand:", "\u{23F3}"),
    (":information_source:", "\u{2139}\u{FE0F}"),
    (":rocket:", "\u{1F680}"),
    (":tada:", "\u{1F389}"),
    (":fire:", "\u{1F525}"),
    (":bell:", "\u{1F514}"),
    (":rotating_light:", "\u{1F6A8}"),
];

const MARKDOWN_V2_SPECIAL: &[char] = &[
    '_', '*', '[', ']', '(', ')', '~', '`', '>', '#', '+', '-', '=', '|', '{', '}', '.', '!',
];

fn bold_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"\*\*(.+?)\*\*").ok())
        .as_ref()
}

impl ChannelFormat {
    /// Apply this channel's rewriting rules to `text`.
    pub fn apply(&self, text: &str) -> String {
        let text = if self.expand_shortcodes {
            expand_shortcodes(text)
        } else {
            text.to_string()
        };

        // Truncate before escaping so a cut never splits an escape sequence
        let text = match self.max_chars {
            Some(limit) => truncate_chars(&text, limit),
            None => text,
        };

        if self.markdown_v2 {
            markdown_v2_with_bold(&text)
        } else {
            match (self.bold, bold_pattern()) {
                (BoldStyle::Single, Some(re)) => re.replace_all(&text, "*$1*").into_owned(),
                _ => text,
            }
        }
    }
}

/// Replace known emoji shortcodes with their Unicode characters.
pub fn expand_shortcodes(text: &str) -> String {
    let mut out = text.to_string();
    for (code, emoji) in SHORTCODES {
        if out.contains(code) {
            out = out.replace(code, emoji);
        }
    }
    out
}

/// Escape every Telegram MarkdownV2 special character.
pub fn escape_markdown_v2(text: &str) -> String {
    let mut result = String::with_capacity(text.len() * 2);
    for ch in text.chars() {
        if MARKDOWN_V2_SPECIAL.contains(&ch) {
            result.push('\\');
        }
        result.push(ch);
    }
    result
}

/// Escape text for MarkdownV2 while turning `**bold**` spans into `*bold*`.
fn markdown_v2_with_bold(text: &str) -> String {
    let Some(re) = bold_pattern() else {
        return escape_markdown_v2(text);
    };
    let mut out = String::with_capacity(text.len() * 2);
    let mut last = 0;
    for caps in re.captures_iter(text) {
        let (Some(whole), Some(inner)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        out.push_str(&escape_markdown_v2(&text[last..whole.start()]));
        out.push('*');
        out.push_str(&escape_markdown_v2(inner.as_str()));
        out.push('*');
        last = whole.end();
    }
    out.push_str(&escape_markdown_v2(&text[last..]));
    out
}

/// Truncate to at most `limit` characters, marking the cut with an ellipsis.
fn truncate_chars(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let mut out: String = text.chars().take(limit.saturating_sub(1)).collect();
    out.push('\u{2026}');
    out
}
