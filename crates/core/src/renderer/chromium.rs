//! Headless-Chromium-based renderer implementation.

use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tokio::time::{timeout, Duration};

use super::config::RendererConfig;
use super::error::RenderError;
use super::traits::Renderer;
use crate::job::Resolution;

/// Renderer driving a headless Chromium binary, one invocation per slide.
///
/// Each capture navigates to the slide fragment, runs the page under a
/// virtual time budget (the settle delay) and writes a single screenshot.
pub struct ChromiumRenderer {
    config: RendererConfig,
}

impl ChromiumRenderer {
    /// Creates a new renderer with the given configuration.
    pub fn new(config: RendererConfig) -> Self {
        Self { config }
    }

    /// Creates a renderer with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(RendererConfig::default())
    }

    /// Builds the browser argument list for one slide capture.
    fn build_capture_args(
        &self,
        render_url: &str,
        slide_index: usize,
        resolution: Resolution,
        output: &Path,
    ) -> Vec<String> {
        let (width, height) = resolution.dimensions();

        let mut args = vec![
            "--headless=new".to_string(),
            "--disable-gpu".to_string(),
            "--no-sandbox".to_string(),
            "--hide-scrollbars".to_string(),
            format!("--window-size={},{}", width, height),
            format!("--virtual-time-budget={}", self.config.settle_ms),
            format!("--screenshot={}", output.to_string_lossy()),
        ];

        args.extend(self.config.extra_browser_args.iter().cloned());

        // Slide addressing is done through the URL fragment.
        args.push(format!("{}#slide={}", render_url, slide_index));

        args
    }
}

#[async_trait]
impl Renderer for ChromiumRenderer {
    fn name(&self) -> &str {
        "chromium"
    }

    async fn capture_slide(
        &self,
        render_url: &str,
        slide_index: usize,
        resolution: Resolution,
        output: &Path,
    ) -> Result<(), RenderError> {
        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let args = self.build_capture_args(render_url, slide_index, resolution, output);

        let child = Command::new(&self.config.browser_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    RenderError::BrowserNotFound {
                        path: self.config.browser_path.clone(),
                    }
                } else {
                    RenderError::Io(e)
                }
            })?;

        let timeout_duration = Duration::from_secs(self.config.capture_timeout_secs);
        let result = timeout(timeout_duration, child.wait_with_output()).await;

        let output_result = match result {
            Ok(Ok(out)) => out,
            Ok(Err(e)) => return Err(RenderError::Io(e)),
            Err(_) => {
                return Err(RenderError::Timeout {
                    slide_index,
                    timeout_secs: self.config.capture_timeout_secs,
                });
            }
        };

        if !output_result.status.success() {
            let stderr = String::from_utf8_lossy(&output_result.stderr).to_string();
            return Err(RenderError::capture_failed(
                slide_index,
                format!("browser exited with code: {:?}", output_result.status.code()),
                if stderr.is_empty() { None } else { Some(stderr) },
            ));
        }

        // Headless Chromium can exit 0 without writing a file when the page
        // fails to load; treat that as a capture failure too.
        let meta = tokio::fs::metadata(output).await.map_err(|_| {
            RenderError::capture_failed(slide_index, "screenshot file not created", None)
        })?;
        if meta.len() == 0 {
            return Err(RenderError::capture_failed(
                slide_index,
                "screenshot file is empty",
                None,
            ));
        }

        Ok(())
    }

    async fn validate(&self) -> Result<(), RenderError> {
        let result = Command::new(&self.config.browser_path)
            .arg("--version")
            .output()
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(RenderError::BrowserNotFound {
                    path: self.config.browser_path.clone(),
                })
            }
            Err(e) => Err(RenderError::Io(e)),
        }
    }
}
