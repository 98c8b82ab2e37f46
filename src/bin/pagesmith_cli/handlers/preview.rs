use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use pagesmith::application::composition::IncomingFile;
use pagesmith_api_types::{FILE_FIELD, PreviewResponse};
use reqwest::multipart::{Form, Part};

use crate::args::PreviewArgs;
use crate::client::{CliError, Ctx};
use crate::io::{read_pdf, write_output};
use crate::session::Session;

const DATA_URL_PREFIX: &str = "data:image/png;base64,";

pub fn decode_preview(data_url: &str) -> Result<Vec<u8>, CliError> {
    let encoded = data_url
        .strip_prefix(DATA_URL_PREFIX)
        .ok_or_else(|| CliError::Server("preview is not a PNG data URL".into()))?;
    STANDARD
        .decode(encoded)
        .map_err(|e| CliError::Server(format!("invalid preview encoding: {e}")))
}

fn file_part(file: &IncomingFile) -> Part {
    Part::bytes(file.bytes.to_vec()).file_name(file.name.clone())
}

/// Collect previews for every page, one server-sized window at a time.
pub async fn fetch_previews(
    ctx: &Ctx,
    session: &Session,
    file: &IncomingFile,
    page_count: usize,
) -> Result<Vec<String>, CliError> {
    let mut previews = Vec::with_capacity(page_count);
    while previews.len() < page_count {
        let form = Form::new()
            .part(FILE_FIELD, file_part(file))
            .text("firstPage", (previews.len() + 1).to_string());
        let response: PreviewResponse = ctx.post_form_json("api/v1/preview", session, form).await?;
        if response.previews.is_empty() {
            break;
        }
        previews.extend(response.previews);
    }
    previews.truncate(page_count);
    Ok(previews)
}

pub async fn handle(ctx: &Ctx, session: &Session, args: PreviewArgs) -> Result<(), CliError> {
    let file = read_pdf(&args.file).await?;
    let mut form = Form::new().part(FILE_FIELD, file_part(&file));
    if let Some(first) = args.first_page {
        form = form.text("firstPage", first.to_string());
    }
    if let Some(last) = args.last_page {
        form = form.text("lastPage", last.to_string());
    }
    if args.count_only {
        form = form.text("countOnly", "true");
    }

    let response: PreviewResponse = ctx.post_form_json("api/v1/preview", session, form).await?;
    println!("{}: {} pages", file.name, response.total_pages);

    let first = args.first_page.unwrap_or(1);
    for (offset, preview) in response.previews.iter().enumerate() {
        let path = args
            .out_dir
            .join(format!("page-{}.png", first as usize + offset));
        write_output(&path, &decode_preview(preview)?).await?;
        println!("wrote {}", path.display());
    }
    Ok(())
}
