//! Shared key layout for storage backends.
//!
//! Namespaces: `scratch/` (per-session chunk slots), `staging/` (secure-path
//! sources awaiting render), `rendered/` (watermarked output), `documents/`
//! (public-read direct publishes). Only `documents/` is publicly reachable.

use lectern_core::constants::CANONICAL_EXTENSION;
use uuid::Uuid;

/// Scratch prefix owned exclusively by one upload session. Namespacing by
/// session id keeps concurrent cleanup from touching another session's data.
pub fn scratch_prefix(session_id: Uuid) -> String {
    format!("scratch/{}", session_id)
}

/// Scratch slot for a single chunk. Zero-padded so lexical order matches
/// chunk order.
pub fn scratch_chunk_key(session_id: Uuid, chunk_index: i32) -> String {
    format!("scratch/{}/{:05}", session_id, chunk_index)
}

/// Private staging key for an assembled source awaiting render.
pub fn staging_key(asset_id: Uuid, extension: &str) -> String {
    format!("staging/{}/source.{}", asset_id, extension)
}

/// Deterministic private key for the rendered, watermarked document.
/// Re-rendering the same asset overwrites the same key.
pub fn rendered_key(asset_id: Uuid) -> String {
    format!("rendered/{}.{}", asset_id, CANONICAL_EXTENSION)
}

/// Public-read key for a direct-publish document.
pub fn public_document_key(asset_id: Uuid, extension: &str) -> String {
    format!("documents/{}.{}", asset_id, extension)
}

/// Whether a key lives in the public-read namespace.
pub fn is_public_key(storage_key: &str) -> bool {
    storage_key.starts_with("documents/")
}

/// Lowercased extension of a filename, or "bin" when absent.
pub fn file_extension(filename: &str) -> String {
    filename
        .rsplit('.')
        .next()
        .filter(|ext| *ext != filename && !ext.is_empty())
        .map(|ext| ext.to_lowercase())
        .unwrap_or_else(|| "bin".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scratch_keys_are_namespaced_by_session() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        assert!(scratch_chunk_key(a, 0).starts_with(&scratch_prefix(a)));
        assert!(!scratch_chunk_key(a, 0).starts_with(&scratch_prefix(b)));
    }

    #[test]
    fn test_scratch_chunk_keys_sort_in_chunk_order() {
        let session = Uuid::new_v4();
        let mut keys: Vec<String> = (0..12).rev().map(|i| scratch_chunk_key(session, i)).collect();
        keys.sort();
        for (i, key) in keys.iter().enumerate() {
            assert_eq!(*key, scratch_chunk_key(session, i as i32));
        }
    }

    #[test]
    fn test_rendered_key_is_deterministic() {
        let asset = Uuid::new_v4();
        assert_eq!(rendered_key(asset), rendered_key(asset));
        assert!(rendered_key(asset).ends_with(".pdf"));
    }

    #[test]
    fn test_only_documents_namespace_is_public() {
        assert!(is_public_key("documents/abc.pdf"));
        assert!(!is_public_key("rendered/abc.pdf"));
        assert!(!is_public_key("staging/abc/source.docx"));
        assert!(!is_public_key("scratch/abc/00000"));
    }

    #[test]
    fn test_file_extension() {
        assert_eq!(file_extension("lecture.PDF"), "pdf");
        assert_eq!(file_extension("archive.tar.gz"), "gz");
        assert_eq!(file_extension("noextension"), "bin");
        assert_eq!(file_extension("trailing."), "bin");
    }
}
