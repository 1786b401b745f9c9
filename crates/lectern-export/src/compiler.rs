//! External document compiler run out of process.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use lectern_core::config::ExportConfig;
use lectern_core::error::LecternResult;
use lectern_core::traits::DocumentCompiler;
use lectern_core::types::{ExportFormat, TemplateAsset};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::error::{ExportError, ExportResult};

const INPUT_FILE: &str = "input.tex";
const MAX_STDERR_CHARS: usize = 4000;

/// Runs a converter such as `pandoc` in a scratch directory holding
/// `input.tex` and the template assets.
///
/// The child is killed when the call times out, is cancelled, or its future
/// is dropped.
#[derive(Debug, Clone)]
pub struct CommandCompiler {
    program: String,
    pdf_engine: Option<String>,
    timeout: Duration,
}

impl CommandCompiler {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            pdf_engine: None,
            timeout: Duration::from_secs(120),
        }
    }

    pub fn from_config(config: &ExportConfig) -> Self {
        Self {
            program: config.compiler.clone(),
            pdf_engine: config.pdf_engine.clone(),
            timeout: config.compile_timeout(),
        }
    }

    pub fn with_pdf_engine(mut self, engine: impl Into<String>) -> Self {
        self.pdf_engine = Some(engine.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Converter arguments for `format`, writing to `output`.
    pub fn args(&self, format: ExportFormat, output: &str) -> Vec<String> {
        let mut args = vec![
            INPUT_FILE.to_string(),
            "--from".to_string(),
            "latex".to_string(),
        ];
        match format {
            ExportFormat::Pdf => {
                if let Some(engine) = &self.pdf_engine {
                    args.push(format!("--pdf-engine={}", engine));
                }
            }
            ExportFormat::Docx => args.extend(["--to".to_string(), "docx".to_string()]),
            ExportFormat::Pptx => args.extend(["--to".to_string(), "pptx".to_string()]),
            ExportFormat::Html => args.extend([
                "--to".to_string(),
                "html5".to_string(),
                "--standalone".to_string(),
            ]),
            ExportFormat::Latex => args.extend(["--to".to_string(), "latex".to_string()]),
        }
        args.extend(["--output".to_string(), output.to_string()]);
        args
    }

    async fn prepare(&self, dir: &Path, markup: &str, assets: &[TemplateAsset]) -> ExportResult<()> {
        tokio::fs::write(dir.join(INPUT_FILE), markup).await?;
        for asset in assets {
            let plain = Path::new(&asset.name)
                .file_name()
                .is_some_and(|name| name == asset.name.as_str());
            if !plain || asset.name == INPUT_FILE {
                return Err(ExportError::InvalidAsset(asset.name.clone()));
            }
            tokio::fs::write(dir.join(&asset.name), &asset.bytes).await?;
        }
        Ok(())
    }

    async fn run(
        &self,
        markup: &str,
        assets: &[TemplateAsset],
        format: ExportFormat,
        cancel: &CancellationToken,
    ) -> ExportResult<Vec<u8>> {
        if format == ExportFormat::Latex {
            return Ok(markup.as_bytes().to_vec());
        }

        let dir = tempfile::tempdir()?;
        self.prepare(dir.path(), markup, assets).await?;
        let output = format!("output.{}", format.extension());

        let child = Command::new(&self.program)
            .args(self.args(format, &output))
            .current_dir(dir.path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ExportError::Compiler {
                format: format.to_string(),
                exit_code: None,
                stderr: format!("failed to start '{}': {}", self.program, e),
            })?;

        tracing::debug!(program = %self.program, format = %format, "Started document compiler");

        let result = tokio::select! {
            result = child.wait_with_output() => result?,
            _ = tokio::time::sleep(self.timeout) => {
                return Err(ExportError::Timeout {
                    format: format.to_string(),
                    secs: self.timeout.as_secs(),
                });
            }
            _ = cancel.cancelled() => return Err(ExportError::Cancelled),
        };

        if !result.status.success() {
            let stderr: String = String::from_utf8_lossy(&result.stderr)
                .trim()
                .chars()
                .take(MAX_STDERR_CHARS)
                .collect();
            return Err(ExportError::Compiler {
                format: format.to_string(),
                exit_code: result.status.code(),
                stderr,
            });
        }

        match tokio::fs::read(dir.path().join(&output)).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(ExportError::Compiler {
                format: format.to_string(),
                exit_code: result.status.code(),
                stderr: format!("compiler exited successfully but wrote no {}", output),
            }),
            Err(e) => Err(e.into()),
        }
    }
}

impl Default for CommandCompiler {
    fn default() -> Self {
        Self::from_config(&ExportConfig::default())
    }
}

#[async_trait]
impl DocumentCompiler for CommandCompiler {
    fn name(&self) -> &str {
        &self.program
    }

    async fn compile(
        &self,
        markup: &str,
        assets: &[TemplateAsset],
        format: ExportFormat,
        cancel: &CancellationToken,
    ) -> LecternResult<Vec<u8>> {
        let bytes = self.run(markup, assets, format, cancel).await?;
        tracing::info!(
            compiler = %self.program,
            format = %format,
            size_bytes = bytes.len(),
            "Compiled export"
        );
        Ok(bytes)
    }
}
