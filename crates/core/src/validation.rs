//! Input Validation
//!
//! Pure, side-effect-free predicates for every value that reaches an external
//! system, plus the escaping and masking helpers the channel senders rely on.
//!
//! Hostnames are never resolved here: checking a resolved address and then
//! connecting later is a time-of-check/time-of-use gap, so only the literal
//! host in the URL is inspected.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::path::Path;

use url::{Host, Url};

use crate::error::ValidationError;

/// Fixed replacement used whenever a secret must not be shown.
pub const REDACTED: &str = "[REDACTED]";

/// Secrets at or below this length are fully redacted.
const MASK_MIN_LEN: usize = 12;

/// Number of leading characters kept visible by `mask_token`.
const MASK_VISIBLE_PREFIX: usize = 8;

/// Internal-sounding DNS suffixes that webhooks may never target.
const BLOCKED_HOST_SUFFIXES: &[&str] = &[".internal", ".local", ".corp", ".intranet"];

/// Characters a shell would interpret.
const SHELL_METACHARACTERS: &[char] = &[
    ';', '&', '|', '$', '`', '<', '>', '(', ')', '{', '}', '*', '?', '!', '\\', '"', '\'',
];

/// Characters that would let an address smuggle extra mail headers or recipients.
const EMAIL_FORBIDDEN: &[char] = &['<', '>', '(', ')', ',', ';', ':', '"', '[', ']', '\\'];

// ============================================================================
// Predicates
// ============================================================================

/// Validate a plain non-negative integer literal.
///
/// Only ASCII digits are accepted: no sign, decimal point, exponent or
/// surrounding whitespace. `bounds` is inclusive when given.
pub fn validate_numeric(value: &str, bounds: Option<(u64, u64)>) -> Result<u64, ValidationError> {
    if value.is_empty() {
        return Err(ValidationError::Empty);
    }
    if !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ValidationError::NotNumeric);
    }

    let parsed: u64 = value.parse().map_err(|_| ValidationError::Overflow)?;

    if let Some((min, max)) = bounds {
        if parsed < min || parsed > max {
            return Err(ValidationError::OutOfRange {
                value: parsed,
                min,
                max,
            });
        }
    }

    Ok(parsed)
}

/// Validate an outbound webhook URL.
///
/// An empty value is valid and means "unconfigured". Anything else must be an
/// `https` URL without embedded credentials whose host is not loopback,
/// unspecified, private (RFC1918), link-local, unique-local, or an
/// internal-sounding domain.
pub fn validate_url(value: &str) -> Result<(), ValidationError> {
    if value.is_empty() {
        return Ok(());
    }

    // Url::parse silently strips tabs and newlines, so check the raw text first.
    if value.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(ValidationError::MalformedUrl(
            "contains whitespace or control characters".to_string(),
        ));
    }

    let url = Url::parse(value).map_err(|e| ValidationError::MalformedUrl(e.to_string()))?;

    if url.scheme() != "https" {
        return Err(ValidationError::InsecureScheme);
    }

    if !url.username().is_empty() || url.password().is_some() {
        return Err(ValidationError::MalformedUrl(
            "embedded credentials are not allowed".to_string(),
        ));
    }

    match url.host() {
        None => Err(ValidationError::MalformedUrl("missing host".to_string())),
        Some(Host::Ipv4(ip)) => check_ip(IpAddr::V4(ip)),
        Some(Host::Ipv6(ip)) => check_ip(IpAddr::V6(ip)),
        Some(Host::Domain(domain)) => check_domain(domain),
    }
}

/// Validate an email address of the shape `local@domain.tld`.
///
/// An empty value is valid and means "unconfigured".
pub fn validate_email(value: &str) -> Result<(), ValidationError> {
    if value.is_empty() {
        return Ok(());
    }

    if value
        .chars()
        .any(|c| c.is_whitespace() || c.is_control() || EMAIL_FORBIDDEN.contains(&c))
    {
        return Err(ValidationError::MalformedEmail);
    }

    let (local, domain) = value.split_once('@').ok_or(ValidationError::MalformedEmail)?;
    if local.is_empty() || domain.contains('@') {
        return Err(ValidationError::MalformedEmail);
    }

    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 || labels.iter().any(|label| label.is_empty()) {
        return Err(ValidationError::MalformedEmail);
    }

    let tld = labels[labels.len() - 1];
    if tld.len() < 2 || !tld.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(ValidationError::MalformedEmail);
    }

    Ok(())
}

/// Validate a filesystem path that may later be handed to a process.
///
/// An empty value is valid. Non-empty paths must not contain NUL/CR/LF, shell
/// metacharacters, or command-substitution shapes. With `must_exist`, the
/// path must also exist.
pub fn validate_path(value: &str, must_exist: bool) -> Result<(), ValidationError> {
    if value.is_empty() {
        return Ok(());
    }

    if value.contains(['\0', '\r', '\n']) {
        return Err(ValidationError::UnsafePath("control characters".to_string()));
    }

    if value.contains("$(") || value.contains('`') {
        return Err(ValidationError::UnsafePath(
            "command substitution".to_string(),
        ));
    }

    if let Some(c) = value.chars().find(|c| SHELL_METACHARACTERS.contains(c)) {
        return Err(ValidationError::UnsafePath(format!("'{}'", c)));
    }

    if must_exist && !Path::new(value).exists() {
        return Err(ValidationError::PathNotFound);
    }

    Ok(())
}

/// Validate a bot API token of the form `<digits>:<secret>`.
pub fn validate_bot_token(value: &str) -> Result<(), ValidationError> {
    let (id, secret) = value
        .split_once(':')
        .ok_or(ValidationError::MalformedToken)?;

    let id_ok = !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit());
    let secret_ok = !secret.is_empty()
        && secret
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');

    if id_ok && secret_ok {
        Ok(())
    } else {
        Err(ValidationError::MalformedToken)
    }
}

/// Validate a bot API chat id: a (possibly negative) integer or `@channelname`.
pub fn validate_chat_id(value: &str) -> Result<(), ValidationError> {
    if let Some(name) = value.strip_prefix('@') {
        let ok = name.len() >= 5 && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
        return if ok {
            Ok(())
        } else {
            Err(ValidationError::MalformedChatId)
        };
    }

    let digits = value.strip_prefix('-').unwrap_or(value);
    validate_numeric(digits, None)
        .map(|_| ())
        .map_err(|_| ValidationError::MalformedChatId)
}

// ============================================================================
// Escaping and masking
// ============================================================================

/// Escape a string for splicing into a JSON string literal.
///
/// Handles backslash, double quote, newline, tab and carriage return.
pub fn json_escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len() + 8);
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            '\t' => escaped.push_str("\\t"),
            '\r' => escaped.push_str("\\r"),
            other => escaped.push(other),
        }
    }
    escaped
}

/// Escape a string for inclusion in HTML text or attribute content.
pub fn html_escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len() + 16);
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}

/// Mask a secret for diagnostics.
///
/// Short or empty secrets become `[REDACTED]`; longer ones keep their first
/// eight characters so an operator can tell which credential is in play.
pub fn mask_token(value: &str) -> String {
    if value.chars().count() <= MASK_MIN_LEN {
        return REDACTED.to_string();
    }
    let prefix: String = value.chars().take(MASK_VISIBLE_PREFIX).collect();
    format!("{}...{}", prefix, REDACTED)
}

// ============================================================================
// Host checks
// ============================================================================

/// Check if an IP address is loopback, unspecified, private or link-local.
///
/// Blocks the following ranges:
/// - IPv4: 0.0.0.0/8, 127.0.0.0/8, 10.0.0.0/8, 172.16.0.0/12,
///   192.168.0.0/16, 169.254.0.0/16, 255.255.255.255
/// - IPv6: `::`, `::1`, `fc00::/7`, `fe80::/10`, and IPv4-mapped forms of
///   the IPv4 ranges above
pub fn is_blocked_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(ipv4) => is_blocked_ipv4(ipv4),
        IpAddr::V6(ipv6) => is_blocked_ipv6(ipv6),
    }
}

fn is_blocked_ipv4(ip: Ipv4Addr) -> bool {
    let octets = ip.octets();

    octets[0] == 0
        || octets[0] == 127
        || octets[0] == 10
        || (octets[0] == 172 && (16..=31).contains(&octets[1]))
        || (octets[0] == 192 && octets[1] == 168)
        || (octets[0] == 169 && octets[1] == 254)
        || ip.is_broadcast()
}

fn is_blocked_ipv6(ip: Ipv6Addr) -> bool {
    if ip.is_loopback() || ip.is_unspecified() {
        return true;
    }

    if let Some(mapped) = ip.to_ipv4_mapped() {
        return is_blocked_ipv4(mapped);
    }

    let first = ip.segments()[0];

    // fc00::/7 unique local, fe80::/10 link-local
    (first & 0xfe00) == 0xfc00 || (first & 0xffc0) == 0xfe80
}

fn check_ip(ip: IpAddr) -> Result<(), ValidationError> {
    if is_blocked_ip(ip) {
        Err(ValidationError::BlockedHost(ip.to_string()))
    } else {
        Ok(())
    }
}

fn check_domain(domain: &str) -> Result<(), ValidationError> {
    let normalized = domain.trim_end_matches('.').to_ascii_lowercase();

    let blocked = normalized == "localhost"
        || normalized.ends_with(".localhost")
        || BLOCKED_HOST_SUFFIXES
            .iter()
            .any(|suffix| normalized.ends_with(suffix));

    if blocked {
        Err(ValidationError::BlockedHost(normalized))
    } else {
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
