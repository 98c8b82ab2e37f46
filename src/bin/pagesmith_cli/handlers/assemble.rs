use std::collections::HashSet;
use std::path::Path;

use async_trait::async_trait;
use bytes::Bytes;
use pagesmith::application::composition::{
    IncomingFile, PageCountError, PageCounter, add_sources,
};
use pagesmith::domain::composition::CompositionOrder;
use pagesmith::domain::types::{PageId, SourceId};
use pagesmith::util::bytes::human_size;
use pagesmith_api_types::{
    AssemblyReference, CLIENT_VERSION_FIELD, FILE_FIELD, FILENAME_FIELD, FILES_FIELD,
    HANDOFF_FIELD, PAGES_FIELD, PreviewResponse, SLOT_FIELD_PREFIX, TOLERANT_FIELD,
};
use reqwest::multipart::{Form, Part};

use crate::args::{AssembleArgs, MergeArgs};
use crate::client::{CliError, Ctx};
use crate::io::{read_all, write_output};
use crate::session::Session;

use super::preview::{decode_preview, fetch_previews};
use super::save_download;

/// Counts pages with a `countOnly` preview request.
pub struct RemoteCounter<'a> {
    pub ctx: &'a Ctx,
    pub session: &'a Session,
}

#[async_trait]
impl PageCounter for RemoteCounter<'_> {
    async fn count_pages(&self, bytes: Bytes) -> Result<u32, PageCountError> {
        let form = Form::new()
            .part(FILE_FIELD, pdf_part(bytes.to_vec(), "source.pdf"))
            .text("countOnly", "true");
        self.ctx
            .post_form_json::<PreviewResponse>("api/v1/preview", self.session, form)
            .await
            .map(|response| response.total_pages)
            .map_err(|err| PageCountError(err.to_string()))
    }
}

fn pdf_part(bytes: Vec<u8>, name: &str) -> Part {
    Part::bytes(bytes).file_name(name.to_string())
}

/// A 1-based `(file, page)` pick from `--order`, already converted to 0-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pick {
    pub file: usize,
    pub page: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PickSpec {
    Page(Pick),
    Range { file: usize, first: u32, last: u32 },
    File(usize),
}

fn parse_one_based(raw: &str, what: &str) -> Result<u32, CliError> {
    match raw.trim().parse::<u32>() {
        Ok(value) if value > 0 => Ok(value - 1),
        _ => Err(CliError::InvalidInput(format!(
            "{what} `{raw}` must be a positive number"
        ))),
    }
}

pub fn parse_order(raw: &str) -> Result<Vec<PickSpec>, CliError> {
    raw.split(',')
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(|token| {
            let Some((file, pages)) = token.split_once(':') else {
                return Ok(PickSpec::File(parse_one_based(token, "file")? as usize));
            };
            let file = parse_one_based(file, "file")? as usize;
            match pages.split_once('-') {
                Some((first, last)) => {
                    let first = parse_one_based(first, "page")?;
                    let last = parse_one_based(last, "page")?;
                    if last < first {
                        return Err(CliError::InvalidInput(format!(
                            "range `{token}` runs backwards"
                        )));
                    }
                    Ok(PickSpec::Range { file, first, last })
                }
                None => Ok(PickSpec::Page(Pick {
                    file,
                    page: parse_one_based(pages, "page")?,
                })),
            }
        })
        .collect()
}

fn expand(
    specs: &[PickSpec],
    order: &CompositionOrder,
    sources: &[SourceId],
) -> Result<Vec<Pick>, CliError> {
    let mut picks = Vec::new();
    for spec in specs {
        match *spec {
            PickSpec::Page(pick) => picks.push(pick),
            PickSpec::Range { file, first, last } => {
                picks.extend((first..=last).map(|page| Pick { file, page }));
            }
            PickSpec::File(file) => {
                let count = sources
                    .get(file)
                    .and_then(|id| order.page_count(*id))
                    .ok_or_else(|| {
                        CliError::InvalidInput(format!("there is no file {}", file + 1))
                    })?;
                picks.extend((0..count).map(|page| Pick { file, page }));
            }
        }
    }
    Ok(picks)
}

/// Rearrange the composition so it holds exactly `specs`, in that order.
pub fn apply_order(
    order: &mut CompositionOrder,
    sources: &[SourceId],
    specs: &[PickSpec],
) -> Result<(), CliError> {
    let picks = expand(specs, order, sources)?;
    let mut wanted: Vec<PageId> = Vec::with_capacity(picks.len());
    let mut seen = HashSet::new();
    for pick in picks {
        let source = sources.get(pick.file).ok_or_else(|| {
            CliError::InvalidInput(format!("there is no file {}", pick.file + 1))
        })?;
        let page_id = order
            .pages()
            .iter()
            .find(|page| page.source_id == *source && page.page_index == pick.page)
            .map(|page| page.id)
            .ok_or_else(|| {
                CliError::InvalidInput(format!(
                    "file {} has no page {}",
                    pick.file + 1,
                    pick.page + 1
                ))
            })?;
        if !seen.insert(page_id) {
            return Err(CliError::InvalidInput(format!(
                "page {} of file {} is listed twice",
                pick.page + 1,
                pick.file + 1
            )));
        }
        wanted.push(page_id);
    }

    for source in sources {
        let used = order
            .pages()
            .iter()
            .any(|page| page.source_id == *source && seen.contains(&page.id));
        if !used {
            order.remove_source(*source);
        }
    }
    let unwanted: Vec<PageId> = order
        .pages()
        .iter()
        .filter(|page| !seen.contains(&page.id))
        .map(|page| page.id)
        .collect();
    for id in unwanted {
        order.remove_page(id);
    }
    for (target, id) in wanted.iter().enumerate() {
        let from = order
            .position_of(*id)
            .ok_or_else(|| CliError::InvalidInput("page vanished from the composition".into()))?;
        order
            .reorder(from, target)
            .map_err(|err| CliError::InvalidInput(err.to_string()))?;
    }
    Ok(())
}

/// Multipart body for the assemble endpoint. Only referenced sources are sent.
pub fn assembly_form(
    order: &CompositionOrder,
    files: &[(SourceId, IncomingFile)],
    args: &AssembleArgs,
) -> Result<Form, CliError> {
    let references: Vec<AssemblyReference> = order
        .serialize_for_assembly()
        .into_iter()
        .map(|reference| AssemblyReference {
            slot: reference.slot().to_string(),
            page_index: reference.page_index,
        })
        .collect();
    let pages = serde_json::to_string(&references)
        .map_err(|e| CliError::InvalidInput(e.to_string()))?;

    let mut form = Form::new()
        .text(PAGES_FIELD, pages)
        .text(CLIENT_VERSION_FIELD, Ctx::user_agent());
    for source in order.referenced_sources() {
        let Some((_, file)) = files.iter().find(|(id, _)| *id == source.id) else {
            continue;
        };
        form = form.part(
            format!("{SLOT_FIELD_PREFIX}{}", source.id.slot()),
            pdf_part(file.bytes.to_vec(), &file.name),
        );
    }
    if args.tolerant {
        form = form.text(TOLERANT_FIELD, "true");
    }
    if args.handoff {
        form = form.text(HANDOFF_FIELD, "true");
    }
    if let Some(filename) = &args.filename {
        form = form.text(FILENAME_FIELD, filename.clone());
    }
    Ok(form)
}

pub async fn assemble(
    ctx: &Ctx,
    session: &mut Session,
    args: AssembleArgs,
) -> Result<(), CliError> {
    let files = read_all(&args.files).await?;
    let mut order = CompositionOrder::new();
    let report = {
        let counter = RemoteCounter {
            ctx,
            session: &*session,
        };
        add_sources(&mut order, files.clone(), &counter).await
    };
    if let Some(rejected) = report.rejected.first() {
        return Err(CliError::InvalidInput(format!(
            "{}: {}",
            rejected.name, rejected.reason
        )));
    }

    for source in order.sources() {
        eprintln!(
            "{}: {} pages, {}",
            source.name,
            order.page_count(source.id).unwrap_or(0),
            human_size(source.byte_length)
        );
    }

    let sources: Vec<SourceId> = report.added.iter().map(|(id, _)| *id).collect();
    if let Some(dir) = &args.thumbnails {
        fetch_thumbnails(ctx, session, &mut order, &report.added, &files).await?;
        if let Some(raw) = &args.order {
            apply_order(&mut order, &sources, &parse_order(raw)?)?;
        }
        write_thumbnails(&order, dir).await?;
    } else if let Some(raw) = &args.order {
        apply_order(&mut order, &sources, &parse_order(raw)?)?;
    }
    if order.is_empty() {
        return Err(CliError::InvalidInput("the composition has no pages".into()));
    }

    let indexed: Vec<(SourceId, IncomingFile)> = sources.into_iter().zip(files).collect();
    let form = assembly_form(&order, &indexed, &args)?;
    let download = ctx.post_form_download("api/v1/assemble", session, form).await?;
    save_download(session, download, args.output, "edited.pdf").await?;
    Ok(())
}

/// Render every page of every source and attach the images to their pages.
async fn fetch_thumbnails(
    ctx: &Ctx,
    session: &Session,
    order: &mut CompositionOrder,
    added: &[(SourceId, Vec<PageId>)],
    files: &[IncomingFile],
) -> Result<(), CliError> {
    for ((_, pages), file) in added.iter().zip(files) {
        let previews = fetch_previews(ctx, session, file, pages.len()).await?;
        for (page_id, preview) in pages.iter().zip(previews) {
            order.attach_thumbnail(*page_id, preview);
        }
    }
    Ok(())
}

/// Write the thumbnails of the final order as `001.png`, `002.png`, ...
async fn write_thumbnails(order: &CompositionOrder, dir: &Path) -> Result<(), CliError> {
    for (position, page) in order.pages().iter().enumerate() {
        let Some(data_url) = order.thumbnail(page.id) else {
            continue;
        };
        let path = dir.join(format!("{:03}.png", position + 1));
        write_output(&path, &decode_preview(data_url)?).await?;
    }
    eprintln!("thumbnails written to {}", dir.display());
    Ok(())
}

pub async fn merge(ctx: &Ctx, session: &mut Session, args: MergeArgs) -> Result<(), CliError> {
    let files = read_all(&args.files).await?;
    let form = files.into_iter().fold(Form::new(), |form, file| {
        form.part(FILES_FIELD, pdf_part(file.bytes.to_vec(), &file.name))
    });
    let download = ctx.post_form_download("api/v1/merge", session, form).await?;
    save_download(session, download, args.output, "merged.pdf").await?;
    Ok(())
}
