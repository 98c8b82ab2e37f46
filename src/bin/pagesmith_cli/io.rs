use std::path::{Path, PathBuf};

use bytes::Bytes;
use pagesmith::application::composition::IncomingFile;

use crate::client::CliError;

pub async fn read_pdf(path: &Path) -> Result<IncomingFile, CliError> {
    let data = tokio::fs::read(path)
        .await
        .map_err(|source| CliError::InputFile {
            path: path.display().to_string(),
            source,
        })?;
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document.pdf".to_string());
    Ok(IncomingFile {
        name,
        bytes: Bytes::from(data),
    })
}

pub async fn read_all(paths: &[PathBuf]) -> Result<Vec<IncomingFile>, CliError> {
    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        files.push(read_pdf(path).await?);
    }
    Ok(files)
}

pub async fn write_output(path: &Path, bytes: &[u8]) -> Result<(), CliError> {
    tokio::fs::write(path, bytes)
        .await
        .map_err(|source| CliError::OutputFile {
            path: path.display().to_string(),
            source,
        })
}
