use pagesmith_api_types::{CLIENT_VERSION_FIELD, FILE_FIELD, TARGET_FORMAT_FIELD};
use reqwest::multipart::{Form, Part};

use crate::args::ConvertArgs;
use crate::client::{CliError, Ctx};
use crate::io::read_pdf;
use crate::session::Session;

use super::save_download;

pub async fn convert(ctx: &Ctx, session: &mut Session, args: ConvertArgs) -> Result<(), CliError> {
    let file = read_pdf(&args.file).await?;
    let form = Form::new()
        .part(FILE_FIELD, Part::bytes(file.bytes.to_vec()).file_name(file.name))
        .text(TARGET_FORMAT_FIELD, args.format.as_str())
        .text(CLIENT_VERSION_FIELD, Ctx::user_agent());
    let download = ctx.post_form_download("api/v1/convert", session, form).await?;
    save_download(session, download, args.output, "converted.zip").await?;
    Ok(())
}
