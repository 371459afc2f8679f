//! PDF page rasterization
//!
//! Each invocation writes its pages under a fresh `page-<uuid>` prefix, so
//! runs sharing an output directory never see each other's files.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::process::Command;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum RasterizeError {
    #[error("Source PDF not readable: {0}")]
    SourceUnreadable(String),

    #[error("Converter failed: {0}")]
    ConverterFailed(String),

    #[error("Converter produced no pages")]
    NoPages,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Converts one PDF into ordered page images
#[async_trait]
pub trait PageRasterizer: Send + Sync {
    /// Rasterize `pdf` into `out_dir` (created if absent), returning page
    /// image paths in page order
    async fn rasterize(&self, pdf: &Path, out_dir: &Path) -> Result<Vec<PathBuf>, RasterizeError>;
}

/// Rasterizer backed by poppler's `pdftoppm`
#[derive(Debug, Clone)]
pub struct PdftoppmRasterizer {
    program: String,
    dpi: u32,
}

impl PdftoppmRasterizer {
    pub fn new(program: impl Into<String>, dpi: u32) -> Self {
        Self {
            program: program.into(),
            dpi,
        }
    }
}

#[async_trait]
impl PageRasterizer for PdftoppmRasterizer {
    async fn rasterize(&self, pdf: &Path, out_dir: &Path) -> Result<Vec<PathBuf>, RasterizeError> {
        let metadata = tokio::fs::metadata(pdf)
            .await
            .map_err(|e| RasterizeError::SourceUnreadable(format!("{}: {}", pdf.display(), e)))?;
        if !metadata.is_file() {
            return Err(RasterizeError::SourceUnreadable(format!(
                "{} is not a file",
                pdf.display()
            )));
        }

        tokio::fs::create_dir_all(out_dir).await?;

        let prefix = format!("page-{}", Uuid::new_v4());
        let output = Command::new(&self.program)
            .arg("-jpeg")
            .arg("-r")
            .arg(self.dpi.to_string())
            .arg(pdf)
            .arg(out_dir.join(&prefix))
            .output()
            .await
            .map_err(|e| RasterizeError::ConverterFailed(format!("{}: {}", self.program, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RasterizeError::ConverterFailed(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }

        let pages = collect_page_images(out_dir, &prefix).await?;
        if pages.is_empty() {
            return Err(RasterizeError::NoPages);
        }

        tracing::debug!(pdf = %pdf.display(), pages = pages.len(), "Rasterized PDF");
        Ok(pages)
    }
}

/// Page images in `dir` carrying `prefix`, ordered by page number
///
/// Names look like `<prefix>-<n>.jpg`; the converter may zero-pad `n`.
pub async fn collect_page_images(dir: &Path, prefix: &str) -> std::io::Result<Vec<PathBuf>> {
    let mut pages = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;

    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if let Some(page) = page_number(name, prefix) {
            pages.push((page, entry.path()));
        }
    }

    pages.sort_by_key(|(page, _)| *page);
    Ok(pages.into_iter().map(|(_, path)| path).collect())
}

fn page_number(file_name: &str, prefix: &str) -> Option<u32> {
    file_name
        .strip_prefix(prefix)?
        .strip_prefix('-')?
        .strip_suffix(".jpg")?
        .parse()
        .ok()
}
