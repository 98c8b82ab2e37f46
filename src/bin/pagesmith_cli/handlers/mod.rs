pub mod assemble;
pub mod convert;
pub mod preview;
pub mod quota;
pub mod transfer;

use std::path::PathBuf;

use pagesmith::util::bytes::human_size;

use crate::client::{CliError, Download};
use crate::io::write_output;
use crate::session::Session;

/// Write a downloaded document and report where it went.
pub(crate) async fn save_download(
    session: &mut Session,
    download: Download,
    output: Option<PathBuf>,
    fallback: &str,
) -> Result<PathBuf, CliError> {
    let path = output.unwrap_or_else(|| {
        PathBuf::from(download.filename.as_deref().unwrap_or(fallback))
    });
    write_output(&path, &download.bytes).await?;
    session.observe(download.quota);

    let pages = download
        .page_count
        .map(|count| format!("{count} pages, "))
        .unwrap_or_default();
    println!(
        "wrote {} ({pages}{})",
        path.display(),
        human_size(download.bytes.len() as u64)
    );
    if let Some(token) = &download.transfer_token {
        println!("transfer token: {token}");
    }
    if let Some(quota) = &session.quota {
        eprintln!("{}", quota.describe());
    }
    Ok(path)
}
