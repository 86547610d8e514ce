//! Auto-retry failure classification.
//!
//! When a submission attempt fails, the provider's error text is classified
//! into one of three families. Content-filter rejections are treated as
//! transient — the same prompt may pass on a retried seed. Temporary errors
//! (timeouts, rate limits, server errors) are retried. Everything else is
//! permanent. Classification is a pure string match over configurable
//! keyword lists, so the same error text and retry count always produce the
//! same verdict.

// ---------------------------------------------------------------------------
// Retry bounds
// ---------------------------------------------------------------------------

/// Default cap on automatic retries per generation.
pub const DEFAULT_MAX_RETRY_ATTEMPTS: i32 = 20;

/// Lowest configurable retry cap.
pub const MIN_RETRY_ATTEMPTS: i32 = 1;

/// Highest configurable retry cap.
pub const MAX_RETRY_ATTEMPTS: i32 = 50;

/// Clamp a configured retry cap into the supported range.
pub fn clamp_max_retry_attempts(value: i32) -> i32 {
    value.clamp(MIN_RETRY_ATTEMPTS, MAX_RETRY_ATTEMPTS)
}

// ---------------------------------------------------------------------------
// Default keyword lists
// ---------------------------------------------------------------------------

/// Substrings marking a provider-side content moderation rejection.
pub const DEFAULT_CONTENT_FILTER_KEYWORDS: &[&str] = &[
    "content filter",
    "content_filter",
    "content policy",
    "moderation",
    "flagged",
    "nsfw",
    "safety system",
    "sensitive content",
];

/// Substrings marking a transient infrastructure failure.
pub const DEFAULT_TEMPORARY_KEYWORDS: &[&str] = &[
    "timeout",
    "timed out",
    "rate limit",
    "rate_limit",
    "too many requests",
    "429",
    "500",
    "502",
    "503",
    "504",
    "internal server error",
    "service unavailable",
    "bad gateway",
    "gateway timeout",
    "overloaded",
    "temporarily",
    "try again",
    "connection reset",
    "connection refused",
];

// ---------------------------------------------------------------------------
// FailureClass
// ---------------------------------------------------------------------------

/// Family a failed attempt's error text belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Provider moderation rejected the content. Retried: a different seed
    /// may pass.
    ContentFilter,
    /// Transient infrastructure failure. Retried.
    Temporary,
    /// Invalid input, exhausted quota, unsupported operation, or anything
    /// unrecognized. Never retried.
    Permanent,
}

impl FailureClass {
    /// String representation for logs and stored error metadata.
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureClass::ContentFilter => "content_filter",
            FailureClass::Temporary => "temporary",
            FailureClass::Permanent => "permanent",
        }
    }
}

// ---------------------------------------------------------------------------
// RetryClassifier
// ---------------------------------------------------------------------------

/// Keyword-driven failure classifier.
///
/// Built once from configuration and shared read-only. Matching is
/// case-insensitive substring containment; content-filter keywords are
/// checked before temporary ones so that e.g. a moderation error mentioning
/// a gateway stays classified as content filter.
#[derive(Debug, Clone)]
pub struct RetryClassifier {
    content_filter_keywords: Vec<String>,
    temporary_keywords: Vec<String>,
}

impl RetryClassifier {
    /// Build a classifier from explicit keyword lists.
    ///
    /// Keywords are lowercased on construction; empty entries are dropped.
    pub fn new(content_filter_keywords: Vec<String>, temporary_keywords: Vec<String>) -> Self {
        let normalize = |list: Vec<String>| -> Vec<String> {
            list.into_iter()
                .map(|k| k.trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect()
        };
        Self {
            content_filter_keywords: normalize(content_filter_keywords),
            temporary_keywords: normalize(temporary_keywords),
        }
    }

    /// Classify an error text into its failure family.
    pub fn classify(&self, error_text: &str) -> FailureClass {
        let haystack = error_text.to_lowercase();
        if self
            .content_filter_keywords
            .iter()
            .any(|k| haystack.contains(k.as_str()))
        {
            return FailureClass::ContentFilter;
        }
        if self
            .temporary_keywords
            .iter()
            .any(|k| haystack.contains(k.as_str()))
        {
            return FailureClass::Temporary;
        }
        FailureClass::Permanent
    }

    /// Decide whether a failed generation should be requeued.
    ///
    /// Retries only content-filter and temporary failures, and only while
    /// `retry_count` has not reached `max_retry_attempts`.
    pub fn should_retry(&self, error_text: &str, retry_count: i32, max_retry_attempts: i32) -> bool {
        if retry_count >= max_retry_attempts {
            return false;
        }
        !matches!(self.classify(error_text), FailureClass::Permanent)
    }
}

impl Default for RetryClassifier {
    fn default() -> Self {
        Self::new(
            DEFAULT_CONTENT_FILTER_KEYWORDS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            DEFAULT_TEMPORARY_KEYWORDS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
