//! Format normalization ahead of extraction.
//!
//! Vision backends take common raster formats directly. PDFs are rendered to
//! a PNG of their first page and rarer rasters are re-encoded as PNG. Both
//! conversions write into a scratch directory owned by the returned
//! [`PreparedDocument`], so the files disappear when it is dropped.

use std::collections::BTreeSet;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use image::ImageFormat;
use tempfile::TempDir;
use tracing::{debug, warn};

use super::error::PipelineError;

/// Raster formats passed to the backend as they are.
const DIRECT_IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp"];

/// Raster formats re-encoded to PNG first.
const REENCODED_IMAGE_EXTENSIONS: &[&str] = &["bmp", "tif", "tiff"];

const PDF_EXTENSION: &str = "pdf";

const RENDER_DPI: u32 = 200;

/// Longest a single `pdftoppm` run may take before it is killed.
const RENDER_TIMEOUT: Duration = Duration::from_secs(60);

const RENDER_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Every extension the pipeline accepts, lower-case.
pub fn supported_formats() -> BTreeSet<&'static str> {
    DIRECT_IMAGE_EXTENSIONS
        .iter()
        .chain(REENCODED_IMAGE_EXTENSIONS)
        .copied()
        .chain(std::iter::once(PDF_EXTENSION))
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Image,
    ConvertibleImage,
    Pdf,
}

impl DocumentKind {
    /// Classifies `path` by extension, case-insensitively.
    pub fn from_path(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?.to_ascii_lowercase();
        if DIRECT_IMAGE_EXTENSIONS.contains(&extension.as_str()) {
            Some(Self::Image)
        } else if REENCODED_IMAGE_EXTENSIONS.contains(&extension.as_str()) {
            Some(Self::ConvertibleImage)
        } else if extension == PDF_EXTENSION {
            Some(Self::Pdf)
        } else {
            None
        }
    }
}

/// A document ready for the extraction backend.
#[derive(Debug)]
pub struct PreparedDocument {
    path: PathBuf,
    kind: DocumentKind,
    // Holds converted files; removed on drop.
    scratch: Option<TempDir>,
}

impl PreparedDocument {
    pub fn prepare(source: &Path) -> Result<Self, PipelineError> {
        let kind = DocumentKind::from_path(source).ok_or_else(|| {
            PipelineError::UnsupportedFormat(
                source
                    .extension()
                    .map(|e| e.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "<none>".to_string()),
            )
        })?;

        if kind == DocumentKind::Image {
            return Ok(Self {
                path: source.to_path_buf(),
                kind,
                scratch: None,
            });
        }

        let scratch = tempfile::Builder::new()
            .prefix("ledgerscan-")
            .tempdir()
            .map_err(PipelineError::Scratch)?;

        let path = match kind {
            DocumentKind::Pdf => render_first_page(source, scratch.path())?,
            _ => reencode_as_png(source, scratch.path())?,
        };
        debug!(kind = ?kind, "Document converted to PNG");

        Ok(Self {
            path,
            kind,
            scratch: Some(scratch),
        })
    }

    /// File to hand to the backend.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn kind(&self) -> DocumentKind {
        self.kind
    }

    pub fn scratch_dir(&self) -> Option<&Path> {
        self.scratch.as_ref().map(TempDir::path)
    }
}

fn reencode_as_png(source: &Path, out_dir: &Path) -> Result<PathBuf, PipelineError> {
    let img = image::open(source)
        .map_err(|e| PipelineError::Image(format!("Failed to load image: {}", e)))?;
    let target = out_dir.join("converted.png");
    img.save_with_format(&target, ImageFormat::Png)
        .map_err(|e| PipelineError::Image(format!("Failed to write PNG: {}", e)))?;
    Ok(target)
}

fn render_first_page(pdf_path: &Path, out_dir: &Path) -> Result<PathBuf, PipelineError> {
    match lopdf::Document::load(pdf_path) {
        Ok(doc) if doc.get_pages().is_empty() => {
            return Err(PipelineError::Pdf("document has no pages".to_string()));
        }
        Ok(doc) => debug!(pages = doc.get_pages().len(), "Rendering first PDF page"),
        // pdftoppm copes with more broken files than lopdf does.
        Err(e) => warn!("lopdf failed to parse PDF: {}. Trying pdftoppm anyway.", e),
    }

    let prefix = out_dir.join("page");
    let stderr_path = out_dir.join("pdftoppm.log");
    let stderr = File::create(&stderr_path).map_err(PipelineError::Scratch)?;
    let child = Command::new("pdftoppm")
        .args(["-png", "-singlefile", "-f", "1", "-l", "1", "-r"])
        .arg(RENDER_DPI.to_string())
        .arg(pdf_path)
        .arg(&prefix)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(stderr)
        .spawn()
        .map_err(|e| {
            PipelineError::Pdf(format!(
                "Failed to run pdftoppm: {}. Make sure poppler-utils is installed.",
                e
            ))
        })?;

    let status = wait_with_timeout(child, RENDER_TIMEOUT)?;
    if !status.success() {
        let message = fs::read_to_string(&stderr_path).unwrap_or_default();
        return Err(PipelineError::Pdf(format!(
            "pdftoppm failed: {}",
            message.trim()
        )));
    }

    let rendered = prefix.with_extension("png");
    if !rendered.is_file() {
        return Err(PipelineError::Pdf(
            "Failed to find rendered page image".to_string(),
        ));
    }
    Ok(rendered)
}

/// Waits for `child`, killing it once `timeout` has passed.
fn wait_with_timeout(mut child: Child, timeout: Duration) -> Result<ExitStatus, PipelineError> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait().map_err(PipelineError::Scratch)? {
            return Ok(status);
        }
        if Instant::now() >= deadline {
            if let Err(e) = child.kill() {
                warn!("Failed to kill renderer: {}", e);
            }
            // Reap it so no zombie is left behind.
            let _ = child.wait();
            return Err(PipelineError::Pdf(format!(
                "pdftoppm did not finish within {:?}",
                timeout
            )));
        }
        thread::sleep(RENDER_POLL_INTERVAL);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_bmp(dir: &Path) -> PathBuf {
        let path = dir.join("scan.BMP");
        let img = image::RgbImage::from_pixel(4, 4, image::Rgb([200, 10, 10]));
        img.save_with_format(&path, ImageFormat::Bmp).unwrap();
        path
    }

    #[test]
    fn test_supported_formats() {
        let formats = supported_formats();
        for ext in ["png", "jpg", "jpeg", "gif", "webp", "bmp", "tif", "tiff", "pdf"] {
            assert!(formats.contains(ext), "missing {ext}");
        }
        assert_eq!(formats.len(), 9);
        assert!(!formats.contains("docx"));
    }

    #[test]
    fn test_kind_is_case_insensitive() {
        assert_eq!(
            DocumentKind::from_path(Path::new("a/RECEIPT.JPG")),
            Some(DocumentKind::Image)
        );
        assert_eq!(
            DocumentKind::from_path(Path::new("scan.Tiff")),
            Some(DocumentKind::ConvertibleImage)
        );
        assert_eq!(
            DocumentKind::from_path(Path::new("invoice.pdf")),
            Some(DocumentKind::Pdf)
        );
        assert_eq!(DocumentKind::from_path(Path::new("notes.txt")), None);
        assert_eq!(DocumentKind::from_path(Path::new("README")), None);
    }

    #[test]
    fn test_direct_images_pass_through() {
        let prepared = PreparedDocument::prepare(Path::new("/scans/receipt.png")).unwrap();
        assert_eq!(prepared.path(), Path::new("/scans/receipt.png"));
        assert!(prepared.scratch_dir().is_none());
    }

    #[test]
    fn test_unsupported_extension() {
        assert!(matches!(
            PreparedDocument::prepare(Path::new("notes.txt")),
            Err(PipelineError::UnsupportedFormat(ext)) if ext == "txt"
        ));
    }

    #[test]
    fn test_bmp_reencoded_and_cleaned_up() {
        let dir = tempfile::tempdir().unwrap();
        let source = write_bmp(dir.path());

        let prepared = PreparedDocument::prepare(&source).unwrap();
        assert_eq!(prepared.kind(), DocumentKind::ConvertibleImage);
        let converted = prepared.path().to_path_buf();
        let scratch = prepared.scratch_dir().unwrap().to_path_buf();
        assert_eq!(converted.extension().unwrap(), "png");
        assert_eq!(
            image::ImageFormat::from_path(&converted).unwrap(),
            ImageFormat::Png
        );
        assert!(image::open(&converted).is_ok());

        drop(prepared);
        assert!(!converted.exists());
        assert!(!scratch.exists());
        assert!(source.exists());
    }

    #[test]
    fn test_corrupt_bmp_is_an_image_error() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("broken.bmp");
        std::fs::write(&source, b"not a bitmap").unwrap();
        assert!(matches!(
            PreparedDocument::prepare(&source),
            Err(PipelineError::Image(_))
        ));
    }

    #[test]
    fn test_unreadable_pdf_is_a_pdf_error() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("broken.pdf");
        std::fs::write(&source, b"%PDF-1.4 garbage").unwrap();
        // Fails whether or not pdftoppm is installed.
        assert!(matches!(
            PreparedDocument::prepare(&source),
            Err(PipelineError::Pdf(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_hung_renderer_is_killed() {
        let child = Command::new("sleep").arg("30").spawn().unwrap();
        let started = Instant::now();
        let err = wait_with_timeout(child, Duration::from_millis(200)).unwrap_err();
        assert!(matches!(err, PipelineError::Pdf(ref m) if m.contains("did not finish")));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[cfg(unix)]
    #[test]
    fn test_finished_renderer_status_is_returned() {
        let child = Command::new("true").spawn().unwrap();
        assert!(wait_with_timeout(child, Duration::from_secs(10)).unwrap().success());

        let child = Command::new("false").spawn().unwrap();
        assert!(!wait_with_timeout(child, Duration::from_secs(10)).unwrap().success());
    }
}
