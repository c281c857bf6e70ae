//! Source document format detection.
//!
//! Routing decisions use the declared content type; the render worker
//! re-checks the actual bytes by magic number before converting, since a
//! mislabeled upload must still be normalized.

use lectern_core::constants::CANONICAL_CONTENT_TYPE;

/// Recognized source document families.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    /// Already the canonical distributable format.
    Pdf,
    /// ZIP-based office formats (DOCX, PPTX) and OpenDocument (ODT, ODP).
    OfficeZip,
    /// Pre-2007 MS Office binary formats (DOC, PPT).
    LegacyOffice,
    Unknown,
}

impl SourceFormat {
    pub fn is_canonical(self) -> bool {
        self == SourceFormat::Pdf
    }
}

/// Detect the format of a document from its leading bytes.
pub fn sniff_format(data: &[u8]) -> SourceFormat {
    if data.len() >= 4 && &data[0..4] == b"%PDF" {
        SourceFormat::Pdf
    } else if data.len() >= 2 && data[0..2] == [0x50, 0x4B] {
        SourceFormat::OfficeZip
    } else if data.len() >= 2 && data[0..2] == [0xD0, 0xCF] {
        SourceFormat::LegacyOffice
    } else {
        SourceFormat::Unknown
    }
}

/// Whether a declared content type is the canonical distributable form.
pub fn is_canonical_content_type(content_type: &str) -> bool {
    content_type.eq_ignore_ascii_case(CANONICAL_CONTENT_TYPE)
}

/// Declared content type for a known document extension; the inverse of
/// [`extension_for_content_type`], used when re-enqueueing from a stored
/// filename.
pub fn content_type_for_extension(extension: &str) -> Option<&'static str> {
    match extension.to_lowercase().as_str() {
        "pdf" => Some("application/pdf"),
        "doc" => Some("application/msword"),
        "docx" => {
            Some("application/vnd.openxmlformats-officedocument.wordprocessingml.document")
        }
        "ppt" => Some("application/vnd.ms-powerpoint"),
        "pptx" => {
            Some("application/vnd.openxmlformats-officedocument.presentationml.presentation")
        }
        "odt" => Some("application/vnd.oasis.opendocument.text"),
        "odp" => Some("application/vnd.oasis.opendocument.presentation"),
        _ => None,
    }
}

/// Page count of a PDF, or 0 when the bytes cannot be parsed.
pub fn pdf_page_count(data: &[u8]) -> i32 {
    lopdf::Document::load_mem(data)
        .map(|doc| doc.get_pages().len() as i32)
        .unwrap_or(0)
}

/// Preferred file extension for a declared content type, used when writing
/// the conversion input so the converter can identify the format.
pub fn extension_for_content_type(content_type: &str) -> Option<&'static str> {
    match content_type.to_lowercase().as_str() {
        "application/pdf" => Some("pdf"),
        "application/msword" => Some("doc"),
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document" => Some("docx"),
        "application/vnd.ms-powerpoint" => Some("ppt"),
        "application/vnd.openxmlformats-officedocument.presentationml.presentation" => {
            Some("pptx")
        }
        "application/vnd.oasis.opendocument.text" => Some("odt"),
        "application/vnd.oasis.opendocument.presentation" => Some("odp"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sniff_pdf() {
        assert_eq!(sniff_format(b"%PDF-1.7\n"), SourceFormat::Pdf);
    }

    #[test]
    fn test_sniff_office_zip() {
        assert_eq!(sniff_format(b"PK\x03\x04rest"), SourceFormat::OfficeZip);
    }

    #[test]
    fn test_sniff_legacy_office() {
        assert_eq!(
            sniff_format(&[0xD0, 0xCF, 0x11, 0xE0]),
            SourceFormat::LegacyOffice
        );
    }

    #[test]
    fn test_sniff_unknown_and_short() {
        assert_eq!(sniff_format(b"hello"), SourceFormat::Unknown);
        assert_eq!(sniff_format(b""), SourceFormat::Unknown);
        assert_eq!(sniff_format(b"%P"), SourceFormat::Unknown);
    }

    #[test]
    fn test_canonical_content_type() {
        assert!(is_canonical_content_type("application/pdf"));
        assert!(is_canonical_content_type("Application/PDF"));
        assert!(!is_canonical_content_type(
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
        ));
    }

    #[test]
    fn test_content_type_for_extension_roundtrip() {
        for ext in ["pdf", "docx", "pptx", "odt"] {
            let content_type = content_type_for_extension(ext).unwrap();
            assert_eq!(extension_for_content_type(content_type), Some(ext));
        }
        assert_eq!(content_type_for_extension("exe"), None);
    }

    #[test]
    fn test_extension_mapping() {
        assert_eq!(extension_for_content_type("application/pdf"), Some("pdf"));
        assert_eq!(
            extension_for_content_type(
                "application/vnd.openxmlformats-officedocument.presentationml.presentation"
            ),
            Some("pptx")
        );
        assert_eq!(extension_for_content_type("text/html"), None);
    }
}
