//! Normalization of non-PDF sources to the canonical PDF form.
//!
//! Conversion is delegated to LibreOffice running headless, the same way the
//! service treats every heavy external tool: write the input to a scratch
//! directory, run the tool with a timeout, read the output back, surface
//! stderr in the error on failure.

use crate::format::{sniff_format, SourceFormat};
use async_trait::async_trait;
use lectern_core::AppError;
use std::path::PathBuf;
use std::time::Duration;
use tokio::process::Command;

/// Normalizes source bytes to PDF. Already-canonical input passes through
/// unchanged.
#[async_trait]
pub trait DocumentConverter: Send + Sync {
    /// Convert `data` to PDF. `filename` supplies the extension the
    /// converter uses to identify the source format.
    async fn to_pdf(&self, data: Vec<u8>, filename: &str) -> Result<Vec<u8>, AppError>;
}

/// LibreOffice-based converter (`soffice --headless --convert-to pdf`).
pub struct SofficeConverter {
    soffice_path: PathBuf,
    timeout: Duration,
}

impl SofficeConverter {
    pub fn new(soffice_path: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            soffice_path: soffice_path.into(),
            timeout,
        }
    }

    fn input_extension(filename: &str) -> &str {
        filename
            .rsplit('.')
            .next()
            .filter(|ext| !ext.is_empty() && *ext != filename)
            .unwrap_or("bin")
    }
}

#[async_trait]
impl DocumentConverter for SofficeConverter {
    async fn to_pdf(&self, data: Vec<u8>, filename: &str) -> Result<Vec<u8>, AppError> {
        if sniff_format(&data) == SourceFormat::Pdf {
            return Ok(data);
        }

        let workdir = tempfile::tempdir()
            .map_err(|e| AppError::ConvertFailed(format!("Failed to create workdir: {}", e)))?;

        let extension = Self::input_extension(filename);
        let input_path = workdir.path().join(format!("source.{}", extension));
        let output_path = workdir.path().join("source.pdf");

        tokio::fs::write(&input_path, &data)
            .await
            .map_err(|e| AppError::ConvertFailed(format!("Failed to write input: {}", e)))?;

        let start = std::time::Instant::now();

        let mut command = Command::new(&self.soffice_path);
        command
            .arg("--headless")
            .arg("--norestore")
            .arg("--convert-to")
            .arg("pdf")
            .arg("--outdir")
            .arg(workdir.path())
            .arg(&input_path)
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| {
                AppError::ConvertFailed(format!(
                    "Conversion timed out after {}s",
                    self.timeout.as_secs()
                ))
            })?
            .map_err(|e| {
                AppError::ConvertFailed(format!(
                    "Failed to run {}: {}",
                    self.soffice_path.display(),
                    e
                ))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AppError::ConvertFailed(format!(
                "Converter exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let pdf = tokio::fs::read(&output_path).await.map_err(|e| {
            AppError::ConvertFailed(format!("Converter produced no output: {}", e))
        })?;

        if sniff_format(&pdf) != SourceFormat::Pdf {
            return Err(AppError::ConvertFailed(
                "Converter output is not a PDF".to_string(),
            ));
        }

        tracing::info!(
            filename = %filename,
            input_bytes = data.len(),
            output_bytes = pdf.len(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Document normalized to PDF"
        );

        Ok(pdf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pdf_input_passes_through_unchanged() {
        let converter =
            SofficeConverter::new("soffice-not-installed", Duration::from_secs(1));
        let data = b"%PDF-1.4\nminimal".to_vec();
        let out = converter.to_pdf(data.clone(), "notes.pdf").await.unwrap();
        assert_eq!(out, data);
    }

    #[tokio::test]
    async fn test_missing_converter_binary_is_convert_failed() {
        let converter =
            SofficeConverter::new("/nonexistent/soffice", Duration::from_secs(1));
        let result = converter
            .to_pdf(b"PK\x03\x04not really a docx".to_vec(), "notes.docx")
            .await;
        assert!(matches!(result, Err(AppError::ConvertFailed(_))));
    }

    #[test]
    fn test_input_extension() {
        assert_eq!(SofficeConverter::input_extension("deck.pptx"), "pptx");
        assert_eq!(SofficeConverter::input_extension("noext"), "bin");
        assert_eq!(SofficeConverter::input_extension("dot."), "bin");
    }
}
