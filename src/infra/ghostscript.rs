use std::io::ErrorKind;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Instant;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::process::Command;
use tracing::{info, warn};

use crate::application::preview::{ImageFormat, RasterError, Rasterizer};

const TARGET: &str = "infra::ghostscript";

const JPEG_DEVICE: &str = "jpeg";

/// Runs the Ghostscript executable in a scratch directory per request.
///
/// `device` renders PNG output; JPEG always uses the `jpeg` device.
#[derive(Debug, Clone)]
pub struct GhostscriptRasterizer {
    executable: PathBuf,
    device: String,
    dpi: u32,
}

impl GhostscriptRasterizer {
    pub fn new(executable: impl Into<PathBuf>, device: impl Into<String>, dpi: u32) -> Self {
        Self {
            executable: executable.into(),
            device: device.into(),
            dpi,
        }
    }
}

#[async_trait]
impl Rasterizer for GhostscriptRasterizer {
    async fn rasterize(
        &self,
        document: Bytes,
        first_page: u32,
        last_page: u32,
        format: ImageFormat,
    ) -> Result<Vec<Vec<u8>>, RasterError> {
        if first_page == 0 || last_page < first_page {
            return Err(RasterError::InvalidRange {
                first_page,
                last_page,
            });
        }
        let started_at = Instant::now();
        let device = match format {
            ImageFormat::Png => self.device.as_str(),
            ImageFormat::Jpeg => JPEG_DEVICE,
        };
        let extension = format.extension();
        let workdir = tempfile::tempdir().map_err(RasterError::Io)?;
        let input = workdir.path().join("input.pdf");
        tokio::fs::write(&input, &document)
            .await
            .map_err(RasterError::Io)?;

        let output = Command::new(&self.executable)
            .arg("-dNOPAUSE")
            .arg("-dBATCH")
            .arg("-dSAFER")
            .arg("-dQUIET")
            .arg(format!("-sDEVICE={device}"))
            .arg(format!("-r{}", self.dpi))
            .arg(format!("-dFirstPage={first_page}"))
            .arg(format!("-dLastPage={last_page}"))
            .arg(format!(
                "-sOutputFile={}",
                workdir.path().join(format!("page-%d.{extension}")).display()
            ))
            .arg(&input)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|err| {
                warn!(
                    target = TARGET,
                    op = "rasterize",
                    error_code = "spawn",
                    executable = %self.executable.display(),
                    error = %err,
                    "failed to spawn ghostscript"
                );
                if err.kind() == ErrorKind::NotFound {
                    RasterError::NotFound(err)
                } else {
                    RasterError::Io(err)
                }
            })?;

        if !output.status.success() {
            let exit_code = output.status.code();
            let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
            warn!(
                target = TARGET,
                op = "rasterize",
                error_code = "exit_status",
                exit_code = exit_code.map(i64::from).unwrap_or(-1),
                stderr = %stderr,
                "ghostscript failed"
            );
            return Err(RasterError::Failed { exit_code, stderr });
        }

        // Ghostscript numbers output files from 1 regardless of -dFirstPage.
        let mut images = Vec::with_capacity((last_page - first_page + 1) as usize);
        for (offset, page) in (first_page..=last_page).enumerate() {
            let path = workdir
                .path()
                .join(format!("page-{}.{extension}", offset + 1));
            match tokio::fs::read(&path).await {
                Ok(image) => images.push(image),
                Err(err) if err.kind() == ErrorKind::NotFound => {
                    return Err(RasterError::MissingOutput { page });
                }
                Err(err) => return Err(RasterError::Io(err)),
            }
        }

        info!(
            target = TARGET,
            op = "rasterize",
            first_page,
            last_page,
            dpi = self.dpi,
            device,
            elapsed_ms = started_at.elapsed().as_millis() as u64,
            "rasterized pages"
        );
        Ok(images)
    }
}
