//! Retry classification for provider calls.

/// Max attempts per completion on retriable errors.
pub const MAX_RETRIES: usize = 3;

/// Base delay for exponential backoff between retries (milliseconds).
pub const RETRY_BASE_DELAY_MS: u64 = 500;

/// Whether an HTTP status code is worth retrying.
pub fn is_retriable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

/// Whether a completion error message indicates a retriable failure.
pub fn is_retriable_error(error_message: &str) -> bool {
    let lower = error_message.to_lowercase();
    // Rate limits and server errors
    lower.contains("429")
        || lower.contains("502")
        || lower.contains("503")
        || lower.contains("504")
        || lower.contains("rate limit")
        || lower.contains("overloaded")
        || lower.contains("timeout")
        || lower.contains("timed out")
        || lower.contains("connection")
        // Empty/malformed responses are transient provider issues
        || lower.contains("empty response")
        || lower.contains("failed to read response body")
}

/// Backoff before the given attempt (0-based). The first attempt has none.
pub fn backoff_delay(attempt: usize) -> Option<std::time::Duration> {
    if attempt == 0 {
        return None;
    }
    let exponent = u32::try_from(attempt - 1).unwrap_or(u32::MAX).min(10);
    Some(std::time::Duration::from_millis(
        RETRY_BASE_DELAY_MS * 2u64.pow(exponent),
    ))
}
