use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Ephemeral server-side state for one in-progress chunked upload.
///
/// The session is single-owner: only `owner_id` may append chunks or
/// finalize. It is consumed (deleted) exactly once on successful finalize,
/// or swept after `expires_at` if abandoned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadSession {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub container_id: Uuid,
    pub filename: String,
    pub content_type: String,
    pub file_size: i64,
    pub chunk_size: i64,
    pub total_chunks: i32,
    pub secure: bool,
    /// Private-storage prefix owning this session's scratch chunk slots.
    pub scratch_prefix: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl UploadSession {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }

    /// Expected byte length of the chunk at `index`: the configured chunk
    /// size for all indices except the last, which carries the remainder.
    pub fn expected_chunk_len(&self, index: i32) -> i64 {
        expected_chunk_len(self.file_size, self.chunk_size, index, self.total_chunks)
    }
}

/// Fields required to open an upload session.
#[derive(Debug, Clone)]
pub struct NewUploadSession {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub container_id: Uuid,
    pub filename: String,
    pub content_type: String,
    pub file_size: i64,
    pub chunk_size: i64,
    pub total_chunks: i32,
    pub secure: bool,
    pub scratch_prefix: String,
    pub expires_at: DateTime<Utc>,
}

/// Number of chunks a file of `file_size` bytes splits into at `chunk_size`.
pub fn expected_chunk_count(file_size: i64, chunk_size: i64) -> i64 {
    if chunk_size <= 0 {
        return 0;
    }
    (file_size + chunk_size - 1) / chunk_size
}

/// Expected byte length of chunk `index` out of `total_chunks`.
pub fn expected_chunk_len(file_size: i64, chunk_size: i64, index: i32, total_chunks: i32) -> i64 {
    if index as i64 == (total_chunks as i64) - 1 {
        file_size - chunk_size * (total_chunks as i64 - 1)
    } else {
        chunk_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MB: i64 = 1024 * 1024;

    #[test]
    fn test_expected_chunk_count_exact_multiple() {
        assert_eq!(expected_chunk_count(10 * MB, 5 * MB), 2);
    }

    #[test]
    fn test_expected_chunk_count_with_remainder() {
        // 12 MB at 5 MB chunks: 5, 5, 2
        assert_eq!(expected_chunk_count(12 * MB, 5 * MB), 3);
    }

    #[test]
    fn test_expected_chunk_count_ten_million_bytes() {
        // 10_000_000 bytes at a 5 MiB chunk size needs 2 chunks, so a client
        // declaring totalChunks = 1 is rejected upstream.
        assert_eq!(expected_chunk_count(10_000_000, 5 * MB), 2);
    }

    #[test]
    fn test_expected_chunk_count_single_chunk() {
        assert_eq!(expected_chunk_count(1, 5 * MB), 1);
        assert_eq!(expected_chunk_count(5 * MB, 5 * MB), 1);
    }

    #[test]
    fn test_expected_chunk_count_zero_chunk_size() {
        assert_eq!(expected_chunk_count(10 * MB, 0), 0);
    }

    #[test]
    fn test_expected_chunk_len_last_carries_remainder() {
        assert_eq!(expected_chunk_len(12 * MB, 5 * MB, 0, 3), 5 * MB);
        assert_eq!(expected_chunk_len(12 * MB, 5 * MB, 1, 3), 5 * MB);
        assert_eq!(expected_chunk_len(12 * MB, 5 * MB, 2, 3), 2 * MB);
    }

    #[test]
    fn test_expected_chunk_len_exact_multiple() {
        assert_eq!(expected_chunk_len(10 * MB, 5 * MB, 1, 2), 5 * MB);
    }

    #[test]
    fn test_session_expiry() {
        let now = Utc::now();
        let session = UploadSession {
            id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            container_id: Uuid::new_v4(),
            filename: "slides.pdf".to_string(),
            content_type: "application/pdf".to_string(),
            file_size: 12 * MB,
            chunk_size: 5 * MB,
            total_chunks: 3,
            secure: true,
            scratch_prefix: "scratch/abc".to_string(),
            expires_at: now - chrono::Duration::seconds(1),
            created_at: now - chrono::Duration::hours(2),
        };
        assert!(session.is_expired(now));
        assert!(!session.is_expired(now - chrono::Duration::hours(1)));
    }
}
