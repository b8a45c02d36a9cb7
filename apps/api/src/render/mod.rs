//! Markdown → PDF conversion for interview reports.
//!
//! The converter is an external program (pandoc by default) run in a scratch
//! directory; the app only cares about bytes in and bytes out.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

const RENDER_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("I/O error while rendering: {0}")]
    Io(#[from] std::io::Error),

    #[error("converter exited with {status}: {stderr}")]
    Converter { status: String, stderr: String },

    #[error("converter timed out after {0:?}")]
    Timeout(Duration),

    #[error("converter produced an empty document")]
    EmptyOutput,
}

#[async_trait]
pub trait DocumentRenderer: Send + Sync {
    async fn markdown_to_pdf(&self, markdown: &str) -> Result<Bytes, RenderError>;
}

pub struct PandocRenderer {
    program: String,
}

impl PandocRenderer {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl DocumentRenderer for PandocRenderer {
    async fn markdown_to_pdf(&self, markdown: &str) -> Result<Bytes, RenderError> {
        let dir = tempfile::tempdir()?;
        let input = dir.path().join("report.md");
        let output = dir.path().join("report.pdf");
        tokio::fs::write(&input, markdown).await?;

        let run = Command::new(&self.program)
            .arg("--from=gfm")
            .arg(&input)
            .arg("-o")
            .arg(&output)
            .kill_on_drop(true)
            .output();

        let result = tokio::time::timeout(RENDER_TIMEOUT, run)
            .await
            .map_err(|_| RenderError::Timeout(RENDER_TIMEOUT))??;

        if !result.status.success() {
            return Err(RenderError::Converter {
                status: result.status.to_string(),
                stderr: String::from_utf8_lossy(&result.stderr).trim().to_string(),
            });
        }

        let pdf = tokio::fs::read(&output).await?;
        if pdf.is_empty() {
            return Err(RenderError::EmptyOutput);
        }

        debug!("Rendered report PDF ({} bytes)", pdf.len());
        Ok(Bytes::from(pdf))
    }
}
