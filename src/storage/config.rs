//! Notification Configuration
//!
//! Reads and writes the line-oriented `KEY="value"` config file and types it
//! into an immutable [`NotifyConfig`] that is built once at startup and
//! passed by reference to every channel. `ENC:` values are decrypted during
//! the build; the decrypted secrets only ever live in memory.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use notify_relay_core::validation::{mask_token, validate_numeric};
use notify_relay_core::ProxyConfig;

use crate::storage::credentials::{CredentialCipher, DecryptionError};
use crate::utils::error::AppResult;

// ============================================================================
// Defaults
// ============================================================================

pub const DEFAULT_RATE_LIMIT: u64 = 10;
pub const DEFAULT_RATE_WINDOW_SECS: u64 = 60;
pub const DEFAULT_BATCH_DELAY_SECS: u64 = 0;
pub const DEFAULT_BATCH_MAX: u64 = 10;
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_SCRIPT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_SMTP_PORT: u16 = 587;
pub const DEFAULT_SUBJECT_PREFIX: &str = "Notification";

// ============================================================================
// Raw config file
// ============================================================================

/// The raw `KEY="value"` config file, in file order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigFile {
    entries: Vec<(String, String)>,
}

impl ConfigFile {
    /// Parse config file content.
    ///
    /// Blank lines and `#` comments are ignored, an optional `export ` prefix
    /// is stripped, and values may be double-quoted (with `\"` and `\\`
    /// escapes), single-quoted or bare. Later assignments win.
    pub fn parse(content: &str) -> Self {
        let mut file = Self::default();

        for (index, raw) in content.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let line = line.strip_prefix("export ").map(str::trim_start).unwrap_or(line);

            let Some((key, value)) = line.split_once('=') else {
                tracing::warn!("Ignoring config line {}: expected KEY=value", index + 1);
                continue;
            };

            let key = key.trim();
            if key.is_empty()
                || !key
                    .chars()
                    .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
            {
                tracing::warn!("Ignoring config line {}: invalid key", index + 1);
                continue;
            }

            file.set(key, parse_value(value.trim()));
        }

        file
    }

    /// Load a config file from disk.
    ///
    /// Logs a warning when the file is readable by group or others.
    pub fn load(path: &Path) -> AppResult<Self> {
        let content = fs::read_to_string(path)?;
        warn_if_permissive(path);
        Ok(Self::parse(&content))
    }

    /// Load a config file, treating a missing file as empty.
    pub fn load_or_default(path: &Path) -> AppResult<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            tracing::debug!("Config file {} not found, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Get a value by key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Set a value, replacing an existing assignment in place.
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key.to_string(), value)),
        }
    }

    /// Iterate over keys in file order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    /// Render back to `KEY="value"` lines.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (key, value) in &self.entries {
            let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
            out.push_str(&format!("{}=\"{}\"\n", key, escaped));
        }
        out
    }

    /// Save to disk with owner-only permissions.
    pub fn save(&self, path: &Path) -> AppResult<()> {
        if let Some(parent) = path.parent() {
            crate::utils::paths::ensure_dir(parent)?;
        }
        let mut options = fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(path)?;

        // `mode` only applies on creation; tighten a pre-existing file before
        // any secret is written to it
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.set_permissions(fs::Permissions::from_mode(0o600))?;
        }

        file.write_all(self.render().as_bytes())?;
        Ok(())
    }
}

fn parse_value(value: &str) -> String {
    if let Some(rest) = value.strip_prefix('"') {
        let mut out = String::new();
        let mut chars = rest.chars();
        while let Some(c) = chars.next() {
            match c {
                '\\' => match chars.next() {
                    Some(next @ ('"' | '\\')) => out.push(next),
                    Some(next) => {
                        out.push('\\');
                        out.push(next);
                    }
                    None => out.push('\\'),
                },
                '"' => break,
                _ => out.push(c),
            }
        }
        return out;
    }

    if let Some(rest) = value.strip_prefix('\'') {
        return rest.split('\'').next().unwrap_or_default().to_string();
    }

    // Bare value: stop at an inline comment
    match value.find(" #") {
        Some(pos) => value[..pos].trim_end().to_string(),
        None => value.to_string(),
    }
}

#[cfg(unix)]
fn warn_if_permissive(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    if let Ok(meta) = fs::metadata(path) {
        let mode = meta.permissions().mode();
        if mode & 0o077 != 0 {
            tracing::warn!(
                "Config file {} is accessible by other users (mode {:o}); run chmod 600",
                path.display(),
                mode & 0o777
            );
        }
    }
}

#[cfg(not(unix))]
fn warn_if_permissive(_path: &Path) {}

// ============================================================================
// Typed configuration
// ============================================================================

/// Slack incoming-webhook settings
#[derive(Clone, Default)]
pub struct SlackConfig {
    pub webhook_url: String,
    pub username: Option<String>,
    pub icon_emoji: Option<String>,
}

/// Discord webhook settings
#[derive(Clone, Default)]
pub struct DiscordConfig {
    pub webhook_url: String,
    pub username: Option<String>,
    pub avatar_url: Option<String>,
}

/// Telegram bot settings
#[derive(Clone, Default)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub chat_id: String,
}

/// SMTP relay settings
#[derive(Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub user: Option<String>,
    pub password: Option<String>,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: DEFAULT_SMTP_PORT,
            user: None,
            password: None,
        }
    }
}

/// Email settings and backend credentials
#[derive(Clone)]
pub struct EmailConfig {
    pub to: String,
    pub from: String,
    pub subject_prefix: String,
    pub html: bool,
    pub template: Option<PathBuf>,
    pub sendgrid_api_key: Option<String>,
    pub mailgun_api_key: Option<String>,
    pub mailgun_domain: Option<String>,
    pub smtp: SmtpConfig,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            to: String::new(),
            from: String::new(),
            subject_prefix: DEFAULT_SUBJECT_PREFIX.to_string(),
            html: false,
            template: None,
            sendgrid_api_key: None,
            mailgun_api_key: None,
            mailgun_domain: None,
            smtp: SmtpConfig::default(),
        }
    }
}

/// Custom executable settings
#[derive(Debug, Clone)]
pub struct CustomScriptConfig {
    pub script: String,
    pub timeout_secs: u64,
}

impl Default for CustomScriptConfig {
    fn default() -> Self {
        Self {
            script: String::new(),
            timeout_secs: DEFAULT_SCRIPT_TIMEOUT_SECS,
        }
    }
}

/// Sliding-window rate limit settings. `max_messages == 0` disables limiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub max_messages: u64,
    pub window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_messages: DEFAULT_RATE_LIMIT,
            window_secs: DEFAULT_RATE_WINDOW_SECS,
        }
    }
}

/// Batching settings. `delay_secs == 0` disables batching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchConfig {
    pub delay_secs: u64,
    pub max_size: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            delay_secs: DEFAULT_BATCH_DELAY_SECS,
            max_size: DEFAULT_BATCH_MAX,
        }
    }
}

/// Fully typed, decrypted notification configuration.
#[derive(Clone)]
pub struct NotifyConfig {
    pub slack: SlackConfig,
    pub discord: DiscordConfig,
    pub telegram: TelegramConfig,
    pub email: EmailConfig,
    pub custom: CustomScriptConfig,
    pub rate_limit: RateLimitConfig,
    pub batch: BatchConfig,
    pub http_timeout_secs: u64,
    pub proxy: Option<ProxyConfig>,
    /// Keys whose `ENC:` value could not be decrypted on this machine.
    pub decryption_failures: BTreeMap<String, DecryptionError>,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            slack: SlackConfig::default(),
            discord: DiscordConfig::default(),
            telegram: TelegramConfig::default(),
            email: EmailConfig::default(),
            custom: CustomScriptConfig::default(),
            rate_limit: RateLimitConfig::default(),
            batch: BatchConfig::default(),
            http_timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
            proxy: None,
            decryption_failures: BTreeMap::new(),
        }
    }
}

/// Reads typed values out of a [`ConfigFile`], decrypting on the way.
struct Reader<'a> {
    file: &'a ConfigFile,
    cipher: &'a CredentialCipher,
    failures: BTreeMap<String, DecryptionError>,
}

impl Reader<'_> {
    /// Decrypted string value; empty when absent or undecryptable.
    fn string(&mut self, key: &str) -> String {
        let Some(raw) = self.file.get(key) else {
            return String::new();
        };
        match self.cipher.decrypt(raw) {
            Ok(value) => value.trim().to_string(),
            Err(e) => {
                tracing::warn!("Failed to decrypt {}: {}", key, e);
                self.failures.insert(key.to_string(), e);
                String::new()
            }
        }
    }

    fn optional(&mut self, key: &str) -> Option<String> {
        Some(self.string(key)).filter(|v| !v.is_empty())
    }

    fn number(&mut self, key: &str, default: u64, min: u64, max: u64) -> u64 {
        let value = self.string(key);
        if value.is_empty() {
            return default;
        }
        match validate_numeric(&value, Some((min, max))) {
            Ok(n) => n,
            Err(e) => {
                tracing::warn!("Invalid {} ({}), using default {}", key, e, default);
                default
            }
        }
    }

    fn flag(&mut self, key: &str) -> bool {
        matches!(
            self.string(key).to_ascii_lowercase().as_str(),
            "true" | "1" | "yes" | "on"
        )
    }
}

impl NotifyConfig {
    /// Build the typed config from a raw file, decrypting secrets.
    pub fn from_file(file: &ConfigFile, cipher: &CredentialCipher) -> Self {
        let mut r = Reader {
            file,
            cipher,
            failures: BTreeMap::new(),
        };

        let slack = SlackConfig {
            webhook_url: r.string("SLACK_WEBHOOK_URL"),
            username: r.optional("SLACK_USERNAME"),
            icon_emoji: r.optional("SLACK_ICON_EMOJI"),
        };

        let discord = DiscordConfig {
            webhook_url: r.string("DISCORD_WEBHOOK_URL"),
            username: r.optional("DISCORD_USERNAME"),
            avatar_url: r.optional("DISCORD_AVATAR_URL"),
        };

        let telegram = TelegramConfig {
            bot_token: r.string("TELEGRAM_BOT_TOKEN"),
            chat_id: r.string("TELEGRAM_CHAT_ID"),
        };

        let smtp = SmtpConfig {
            host: r.string("SMTP_HOST"),
            port: r.number("SMTP_PORT", u64::from(DEFAULT_SMTP_PORT), 1, 65535) as u16,
            user: r.optional("SMTP_USER"),
            password: r.optional("SMTP_PASSWORD"),
        };

        let email = EmailConfig {
            to: r.string("EMAIL_TO"),
            from: r.string("EMAIL_FROM"),
            subject_prefix: r
                .optional("EMAIL_SUBJECT_PREFIX")
                .unwrap_or_else(|| DEFAULT_SUBJECT_PREFIX.to_string()),
            html: r.flag("EMAIL_HTML"),
            template: r.optional("EMAIL_TEMPLATE").map(PathBuf::from),
            sendgrid_api_key: r.optional("SENDGRID_API_KEY"),
            mailgun_api_key: r.optional("MAILGUN_API_KEY"),
            mailgun_domain: r.optional("MAILGUN_DOMAIN"),
            smtp,
        };

        let custom = CustomScriptConfig {
            script: r.string("CUSTOM_SCRIPT"),
            timeout_secs: r.number("CUSTOM_SCRIPT_TIMEOUT", DEFAULT_SCRIPT_TIMEOUT_SECS, 1, 300),
        };

        let rate_limit = RateLimitConfig {
            max_messages: r.number("NOTIFY_RATE_LIMIT", DEFAULT_RATE_LIMIT, 0, 10_000),
            window_secs: r.number("NOTIFY_RATE_WINDOW", DEFAULT_RATE_WINDOW_SECS, 1, 86_400),
        };

        let batch = BatchConfig {
            delay_secs: r.number("NOTIFY_BATCH_DELAY", DEFAULT_BATCH_DELAY_SECS, 0, 86_400),
            max_size: r.number("NOTIFY_BATCH_MAX", DEFAULT_BATCH_MAX, 1, 1_000),
        };

        let http_timeout_secs = r.number("NOTIFY_HTTP_TIMEOUT", DEFAULT_HTTP_TIMEOUT_SECS, 1, 300);

        let proxy = r.optional("NOTIFY_PROXY").and_then(|value| {
            ProxyConfig::parse(&value)
                .map_err(|e| tracing::warn!("Ignoring NOTIFY_PROXY: {}", e))
                .ok()
        });

        Self {
            slack,
            discord,
            telegram,
            email,
            custom,
            rate_limit,
            batch,
            http_timeout_secs,
            proxy,
            decryption_failures: r.failures,
        }
    }

    /// Load and type the config file at `path` using this machine's key.
    pub fn load(path: &Path) -> AppResult<Self> {
        let file = ConfigFile::load_or_default(path)?;
        Ok(Self::from_file(&file, &CredentialCipher::for_this_machine()))
    }

    /// First decryption failure among the given keys, if any.
    pub fn decryption_failure(&self, keys: &[&str]) -> Option<(&str, &DecryptionError)> {
        keys.iter().find_map(|key| {
            self.decryption_failures
                .get_key_value(*key)
                .map(|(k, e)| (k.as_str(), e))
        })
    }
}

// Debug impls mask every secret-bearing field.

fn masked(value: &str) -> String {
    if value.is_empty() {
        String::new()
    } else {
        mask_token(value)
    }
}

impl std::fmt::Debug for SlackConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlackConfig")
            .field("webhook_url", &masked(&self.webhook_url))
            .field("username", &self.username)
            .field("icon_emoji", &self.icon_emoji)
            .finish()
    }
}

impl std::fmt::Debug for DiscordConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscordConfig")
            .field("webhook_url", &masked(&self.webhook_url))
            .field("username", &self.username)
            .field("avatar_url", &self.avatar_url)
            .finish()
    }
}

impl std::fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("bot_token", &masked(&self.bot_token))
            .field("chat_id", &self.chat_id)
            .finish()
    }
}

impl std::fmt::Debug for SmtpConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl std::fmt::Debug for EmailConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailConfig")
            .field("to", &self.to)
            .field("from", &self.from)
            .field("subject_prefix", &self.subject_prefix)
            .field("html", &self.html)
            .field("template", &self.template)
            .field("sendgrid_api_key", &self.sendgrid_api_key.as_deref().map(masked))
            .field("mailgun_api_key", &self.mailgun_api_key.as_deref().map(masked))
            .field("mailgun_domain", &self.mailgun_domain)
            .field("smtp", &self.smtp)
            .finish()
    }
}

impl std::fmt::Debug for NotifyConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotifyConfig")
            .field("slack", &self.slack)
            .field("discord", &self.discord)
            .field("telegram", &self.telegram)
            .field("email", &self.email)
            .field("custom", &self.custom)
            .field("rate_limit", &self.rate_limit)
            .field("batch", &self.batch)
            .field("http_timeout_secs", &self.http_timeout_secs)
            .field("proxy", &self.proxy)
            .field("decryption_failures", &self.decryption_failures)
            .finish()
    }
}
