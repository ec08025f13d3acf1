//! Tesseract OCR client
//!
//! Wraps the `tesseract` command-line tool. OCR is an optional
//! dependency: when the binary is missing the caller falls back to
//! manual entry, so construction failure is an expected state rather
//! than an error path worth aborting on.

use escrutinio_common::config::OcrConfig;
use std::path::Path;
use std::process::Command;
use thiserror::Error;

/// Tesseract client errors
#[derive(Debug, Error)]
pub enum TesseractError {
    /// Tesseract binary not found in PATH
    #[error("Tesseract binary not found in PATH")]
    BinaryNotFound,

    /// OCR disabled by configuration
    #[error("OCR disabled by configuration")]
    Disabled,

    /// Failed to execute the tesseract command
    #[error("Failed to execute tesseract: {0}")]
    ExecutionError(String),

    /// Tesseract exited with an error
    #[error("Tesseract recognition failed: {0}")]
    RecognitionFailed(String),

    /// Image file not found at path
    #[error("Image file not found: {0}")]
    FileNotFound(String),
}

/// External OCR client over the tesseract binary
pub struct TesseractClient {
    config: OcrConfig,
}

impl TesseractClient {
    /// Create a new client, verifying the binary is runnable.
    pub fn new(config: OcrConfig) -> Result<Self, TesseractError> {
        if !config.enabled {
            return Err(TesseractError::Disabled);
        }

        match Command::new(&config.binary).arg("--version").output() {
            Ok(_) => Ok(Self { config }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(TesseractError::BinaryNotFound)
            }
            Err(e) => Err(TesseractError::ExecutionError(e.to_string())),
        }
    }

    /// Recognize text in the image, returning raw stdout text.
    ///
    /// Invocation: `tesseract <image> stdout -l <lang> --psm <mode>`.
    /// Recognition can take seconds on a full tally-sheet photo, so the
    /// blocking call runs on the blocking pool.
    pub async fn recognize(&self, image_path: &Path) -> Result<String, TesseractError> {
        if !image_path.exists() {
            return Err(TesseractError::FileNotFound(
                image_path.display().to_string(),
            ));
        }

        tracing::debug!(
            image = %image_path.display(),
            language = %self.config.language,
            "Running tesseract recognition"
        );

        let output = tokio::task::spawn_blocking({
            let binary = self.config.binary.clone();
            let language = self.config.language.clone();
            let psm = self.config.page_segmentation_mode.to_string();
            let image = image_path.to_path_buf();

            move || {
                Command::new(&binary)
                    .arg(&image)
                    .arg("stdout")
                    .arg("-l")
                    .arg(&language)
                    .arg("--psm")
                    .arg(&psm)
                    .output()
            }
        })
        .await
        .map_err(|e| TesseractError::ExecutionError(format!("task join error: {}", e)))?
        .map_err(|e| TesseractError::ExecutionError(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(TesseractError::RecognitionFailed(format!(
                "exit code {:?}, stderr: {}",
                output.status.code(),
                stderr
            )));
        }

        let text = String::from_utf8_lossy(&output.stdout).into_owned();
        tracing::info!(
            image = %image_path.display(),
            characters = text.len(),
            "Tesseract recognition completed"
        );
        Ok(text)
    }

    /// Check if the configured tesseract binary is available
    pub fn is_available(config: &OcrConfig) -> bool {
        config.enabled
            && Command::new(&config.binary)
                .arg("--version")
                .output()
                .is_ok()
    }
}
