//! Job identifiers.
//!
//! An identifier is a slug of the start of the message followed by a random
//! hex suffix (`hello-world-3f9a0c1d2e4b`). Identifiers double as output file
//! names on the rendering side, so they only ever contain `[a-z0-9-]`.

use std::fmt;

use serde::Serialize;
use slug::slugify;
use uuid::Uuid;

use super::error::DomainError;

const PREFIX_SOURCE_CHARS: usize = 24;
const MAX_PREFIX_LEN: usize = 24;
const SUFFIX_LEN: usize = 12;
const FALLBACK_PREFIX: &str = "job";
const MAX_EXTERNAL_LEN: usize = 96;

/// Opaque, filename-safe job identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Build an identifier from the message it belongs to and a uniqueness suffix.
    pub fn derive(message: &str, suffix: &str) -> Self {
        let head: String = message.chars().take(PREFIX_SOURCE_CHARS).collect();
        let mut prefix = slugify(head);
        prefix.truncate(MAX_PREFIX_LEN);
        let prefix = prefix.trim_matches('-');
        let prefix = if prefix.is_empty() {
            FALLBACK_PREFIX
        } else {
            prefix
        };

        Self(format!("{prefix}-{suffix}"))
    }

    /// Accept an identifier supplied from outside the process (path segment,
    /// completion callback).
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        let valid = !raw.is_empty()
            && raw.len() <= MAX_EXTERNAL_LEN
            && raw
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_');

        if valid {
            Ok(Self(raw.to_string()))
        } else {
            Err(DomainError::malformed_job_id(raw))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for JobId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Source of new job identifiers.
pub trait JobIdGenerator: Send + Sync {
    fn generate(&self, message: &str) -> JobId;
}

/// Production generator: random suffix from a UUIDv4.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomJobIds;

impl JobIdGenerator for RandomJobIds {
    fn generate(&self, message: &str) -> JobId {
        let hex = Uuid::new_v4().simple().to_string();
        JobId::derive(message, &hex[..SUFFIX_LEN])
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn derive_sanitizes_message_prefix() {
        let id = JobId::derive("Hello, World! How are you?", "abc123");
        assert_eq!(id.as_str(), "hello-world-how-are-yo-abc123");
    }

    #[test]
    fn derive_caps_prefix_length() {
        let id = JobId::derive(&"a".repeat(200), "000000000000");
        assert_eq!(id.as_str(), format!("{}-000000000000", "a".repeat(24)));
    }

    #[test]
    fn derive_falls_back_when_nothing_representable() {
        let id = JobId::derive("!!! ???", "ff00ff00ff00");
        assert_eq!(id.as_str(), "job-ff00ff00ff00");
    }

    #[test]
    fn random_ids_are_filename_safe_and_distinct() {
        let ids: HashSet<JobId> = (0..256)
            .map(|_| RandomJobIds.generate("Same message every time"))
            .collect();

        assert_eq!(ids.len(), 256);
        for id in &ids {
            assert!(id.as_str().starts_with("same-message-every-time-"));
            assert!(
                id.as_str()
                    .chars()
                    .all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '-')
            );
            assert!(JobId::parse(id.as_str()).is_ok());
        }
    }

    #[test]
    fn parse_rejects_path_like_values() {
        assert!(JobId::parse("").is_err());
        assert!(JobId::parse("../etc/passwd").is_err());
        assert!(JobId::parse("hello world").is_err());
        assert!(JobId::parse(&"x".repeat(97)).is_err());
        assert!(JobId::parse("Hello_World-42").is_ok());
    }
}
