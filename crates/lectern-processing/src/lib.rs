//! Document normalization and watermarking.
//!
//! Non-PDF sources are normalized to PDF through an external converter;
//! every page of the normalized document is then stamped with a visible,
//! semi-transparent watermark before the result reaches private storage.

pub mod convert;
pub mod format;
pub mod watermark;

pub use convert::{DocumentConverter, SofficeConverter};
pub use format::SourceFormat;
pub use watermark::{stamp_pdf, StampedDocument, WatermarkSpec};
