use std::path::PathBuf;

use crate::client::{CliError, Ctx};
use crate::session::Session;

use super::save_download;

pub async fn take(
    ctx: &Ctx,
    session: &mut Session,
    token: &str,
    output: Option<PathBuf>,
) -> Result<(), CliError> {
    let token = token.trim();
    if token.is_empty() || !token.bytes().all(|b| b.is_ascii_alphanumeric()) {
        return Err(CliError::InvalidInput(format!("`{token}` is not a transfer token")));
    }
    let download = ctx
        .post_download(&format!("api/v1/transfers/{token}"), session)
        .await?;
    save_download(session, download, output, "transfer.pdf").await?;
    Ok(())
}
