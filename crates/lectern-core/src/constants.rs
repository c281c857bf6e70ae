//! Service-wide constants.

/// Default size of a single upload chunk in bytes (5 MiB). Every chunk except
/// the last must be exactly this size; the last carries the remainder.
pub const DEFAULT_CHUNK_SIZE_BYTES: u64 = 5 * 1024 * 1024;

/// Default ceiling for a whole upload in bytes (300 MiB).
pub const DEFAULT_MAX_UPLOAD_SIZE_BYTES: u64 = 300 * 1024 * 1024;

/// Default lifetime of an in-flight upload session in seconds (1 hour).
/// Expiry is advisory cleanup; finalize re-validates completeness regardless.
pub const DEFAULT_SESSION_TTL_SECS: i64 = 3600;

/// Canonical distributable document format.
pub const CANONICAL_CONTENT_TYPE: &str = "application/pdf";

/// Extension given to rendered display names.
pub const CANONICAL_EXTENSION: &str = "pdf";
