//! Text extraction from uploaded documents.
//!
//! - PDFs go through `pdf-extract` on a blocking thread.
//! - Images are piped to the `tesseract` CLI (`tesseract stdin stdout -l <lang>`).
//! - Plain text is decoded as UTF-8.

use std::process::Stdio;

use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, instrument};

use crate::config::OcrCfg;

#[derive(Debug, Error)]
pub enum ExtractError {
  #[error("empty upload")]
  Empty,

  #[error("PDF parse error: {0}")]
  Pdf(String),

  #[error("OCR failed: {0}")]
  Ocr(String),

  #[error("extraction task failed: {0}")]
  Join(#[from] tokio::task::JoinError),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DocumentKind {
  Pdf,
  PlainText,
  Image,
}

impl DocumentKind {
  /// Decide from the client-supplied name and content type. Anything that is not
  /// recognisably PDF or text is treated as an image and sent to OCR.
  pub fn detect(filename: Option<&str>, content_type: Option<&str>) -> Self {
    let name = filename.unwrap_or("").to_lowercase();
    let ctype = content_type.unwrap_or("").to_lowercase();
    if name.ends_with(".pdf") || ctype == "application/pdf" {
      DocumentKind::Pdf
    } else if name.ends_with(".txt") || name.ends_with(".md") || ctype.starts_with("text/") {
      DocumentKind::PlainText
    } else {
      DocumentKind::Image
    }
  }
}

#[derive(Clone, Debug)]
pub struct Extractor {
  ocr: OcrCfg,
}

impl Extractor {
  pub fn new(ocr: OcrCfg) -> Self {
    Self { ocr }
  }

  #[instrument(level = "info", skip(self, bytes), fields(size = bytes.len()))]
  pub async fn extract(&self, kind: DocumentKind, bytes: Vec<u8>) -> Result<String, ExtractError> {
    if bytes.is_empty() {
      return Err(ExtractError::Empty);
    }
    let text = match kind {
      DocumentKind::Pdf => extract_pdf(bytes).await?,
      DocumentKind::PlainText => String::from_utf8_lossy(&bytes).into_owned(),
      DocumentKind::Image => self.ocr_image(&bytes).await?,
    };
    info!(target: "mcq", ?kind, chars = text.chars().count(), "Text extracted");
    Ok(text)
  }

  async fn ocr_image(&self, bytes: &[u8]) -> Result<String, ExtractError> {
    let mut child = Command::new(&self.ocr.tesseract_cmd)
      .args(["stdin", "stdout", "-l", self.ocr.language.as_str()])
      .stdin(Stdio::piped())
      .stdout(Stdio::piped())
      .stderr(Stdio::piped())
      .kill_on_drop(true)
      .spawn()
      .map_err(|e| ExtractError::Ocr(format!("cannot start {}: {}", self.ocr.tesseract_cmd, e)))?;

    let mut stdin = child
      .stdin
      .take()
      .ok_or_else(|| ExtractError::Ocr("tesseract stdin unavailable".into()))?;
    stdin.write_all(bytes).await.map_err(|e| ExtractError::Ocr(e.to_string()))?;
    // Close stdin so tesseract sees EOF.
    drop(stdin);

    let output = child.wait_with_output().await.map_err(|e| ExtractError::Ocr(e.to_string()))?;
    if !output.status.success() {
      let stderr = String::from_utf8_lossy(&output.stderr);
      return Err(ExtractError::Ocr(format!("tesseract exited with {}: {}", output.status, stderr.trim())));
    }
    debug!(target: "mcq", stdout_len = output.stdout.len(), "tesseract finished");
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
  }
}

async fn extract_pdf(bytes: Vec<u8>) -> Result<String, ExtractError> {
  tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&bytes))
    .await?
    .map_err(|e| ExtractError::Pdf(format!("{:?}", e)))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn detects_kind_from_name_or_content_type() {
    assert_eq!(DocumentKind::detect(Some("Notes.PDF"), None), DocumentKind::Pdf);
    assert_eq!(DocumentKind::detect(Some("upload"), Some("application/pdf")), DocumentKind::Pdf);
    assert_eq!(DocumentKind::detect(Some("chapter.txt"), None), DocumentKind::PlainText);
    assert_eq!(DocumentKind::detect(None, Some("text/plain; charset=utf-8")), DocumentKind::PlainText);
    assert_eq!(DocumentKind::detect(Some("scan.png"), Some("image/png")), DocumentKind::Image);
    assert_eq!(DocumentKind::detect(None, None), DocumentKind::Image);
  }

  #[tokio::test]
  async fn plain_text_passes_through() {
    let ex = Extractor::new(OcrCfg::default());
    let text = ex.extract(DocumentKind::PlainText, "Cells divide.".as_bytes().to_vec()).await.expect("text");
    assert_eq!(text, "Cells divide.");
  }

  #[tokio::test]
  async fn empty_upload_is_rejected() {
    let ex = Extractor::new(OcrCfg::default());
    assert!(matches!(ex.extract(DocumentKind::Pdf, Vec::new()).await, Err(ExtractError::Empty)));
  }

  #[tokio::test]
  async fn garbage_pdf_is_an_error() {
    let ex = Extractor::new(OcrCfg::default());
    let res = ex.extract(DocumentKind::Pdf, b"definitely not a pdf".to_vec()).await;
    assert!(matches!(res, Err(ExtractError::Pdf(_)) | Err(ExtractError::Join(_))));
  }

  #[tokio::test]
  async fn missing_ocr_binary_is_an_error() {
    let ex = Extractor::new(OcrCfg { tesseract_cmd: "/nonexistent/tesseract-bin".into(), language: "eng".into() });
    let res = ex.extract(DocumentKind::Image, vec![0x89, b'P', b'N', b'G']).await;
    assert!(matches!(res, Err(ExtractError::Ocr(_))));
  }
}
