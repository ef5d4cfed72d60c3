use std::time::Duration;

use crate::errors::ConfigError;

/// Default byte threshold at which buffered text is flushed as a `0:` frame.
pub const DEFAULT_TEXT_FLUSH_BYTES: usize = 64;
/// Default debounce window of the text coalescer.
pub const DEFAULT_COALESCE_WINDOW: Duration = Duration::from_millis(32);
/// Default number of trailing id characters used to pair a file annotation
/// with its code-interpreter entry.
pub const DEFAULT_ANNOTATION_SUFFIX_LEN: usize = 8;

/// Configuration for the relay-side encoder.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncoderConfig {
    /// Buffered text is flushed once it grows past this many bytes.
    pub text_flush_threshold: usize,
    /// Emit the legacy bare `content-part-done` object for finished text
    /// parts.
    pub emit_content_part_done: bool,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            text_flush_threshold: DEFAULT_TEXT_FLUSH_BYTES,
            emit_content_part_done: false,
        }
    }
}

impl EncoderConfig {
    /// Reads overrides from `TURNWIRE_TEXT_FLUSH_BYTES` and
    /// `TURNWIRE_EMIT_CONTENT_PART_DONE`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(bytes) = env_parse::<usize>("TURNWIRE_TEXT_FLUSH_BYTES")? {
            config.text_flush_threshold = bytes.max(1);
        }
        if let Ok(raw) = std::env::var("TURNWIRE_EMIT_CONTENT_PART_DONE") {
            config.emit_content_part_done =
                parse_bool(&raw).ok_or_else(|| ConfigError::InvalidValue {
                    key: "TURNWIRE_EMIT_CONTENT_PART_DONE",
                    value: raw.clone(),
                    reason: "expected a boolean".into(),
                })?;
        }
        Ok(config)
    }

    pub fn text_flush_threshold(mut self, bytes: usize) -> Self {
        self.text_flush_threshold = bytes.max(1);
        self
    }

    pub fn emit_content_part_done(mut self, enabled: bool) -> Self {
        self.emit_content_part_done = enabled;
        self
    }
}

/// Configuration for the client-side decoder.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecoderConfig {
    /// Debounce window for text coalescing.
    pub coalesce_window: Duration,
    /// Trailing id characters shared by a code-interpreter entry and its
    /// file annotation.
    pub annotation_suffix_len: usize,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            coalesce_window: DEFAULT_COALESCE_WINDOW,
            annotation_suffix_len: DEFAULT_ANNOTATION_SUFFIX_LEN,
        }
    }
}

impl DecoderConfig {
    /// Reads overrides from `TURNWIRE_COALESCE_MS` and
    /// `TURNWIRE_ANNOTATION_SUFFIX_LEN`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(ms) = env_parse::<u64>("TURNWIRE_COALESCE_MS")? {
            config.coalesce_window = Duration::from_millis(ms);
        }
        if let Some(len) = env_parse::<usize>("TURNWIRE_ANNOTATION_SUFFIX_LEN")? {
            config.annotation_suffix_len = len;
        }
        Ok(config)
    }

    pub fn coalesce_window(mut self, window: Duration) -> Self {
        self.coalesce_window = window;
        self
    }

    pub fn annotation_suffix_len(mut self, len: usize) -> Self {
        self.annotation_suffix_len = len;
        self
    }
}

pub(crate) fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" | "enabled" => Some(true),
        "0" | "false" | "no" | "off" | "disabled" => Some(false),
        _ => None,
    }
}

fn env_parse<T>(key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let Ok(raw) = std::env::var(key) else {
        return Ok(None);
    };
    if raw.trim().is_empty() {
        return Ok(None);
    }
    raw.trim()
        .parse::<T>()
        .map(Some)
        .map_err(|e| ConfigError::InvalidValue {
            key,
            value: raw.clone(),
            reason: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builders_override_defaults() {
        let encoder = EncoderConfig::default()
            .text_flush_threshold(0)
            .emit_content_part_done(true);
        assert_eq!(encoder.text_flush_threshold, 1);
        assert!(encoder.emit_content_part_done);

        let decoder = DecoderConfig::default()
            .coalesce_window(Duration::from_millis(5))
            .annotation_suffix_len(4);
        assert_eq!(decoder.coalesce_window, Duration::from_millis(5));
        assert_eq!(decoder.annotation_suffix_len, 4);
    }

    #[test]
    fn parse_bool_accepts_common_spellings() {
        assert_eq!(parse_bool(" Yes "), Some(true));
        assert_eq!(parse_bool("off"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }
}
