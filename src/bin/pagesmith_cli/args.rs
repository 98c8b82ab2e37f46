//! Command-line surface for `pagesmith-cli`.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(
    name = "pagesmith-cli",
    version,
    about = "pagesmith PDF assembly client",
    long_about = None
)]
pub struct Cli {
    /// Server base URL
    #[arg(long, env = "PAGESMITH_SERVER_URL", default_value = "http://127.0.0.1:8080")]
    pub server: String,

    /// File holding the anonymous client id, signed-in user and last known quota
    #[arg(long, env = "PAGESMITH_SESSION_FILE", default_value = ".pagesmith-session.json")]
    pub session_file: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build a new document from pages of the given files
    Assemble(AssembleArgs),
    /// Concatenate whole files in the given order
    Merge(MergeArgs),
    /// Render page previews or report the page count
    Preview(PreviewArgs),
    /// Render every page and download the images as a zip archive
    Convert(ConvertArgs),
    /// Show the daily quota of the current identity
    Quota,
    /// Switch to a signed-in identity; the anonymous counter is dropped
    SignIn { user: String },
    /// Return to the anonymous identity
    SignOut,
    /// Download a document parked with `assemble --handoff`
    Take {
        token: String,
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
}

#[derive(Args, Debug)]
pub struct AssembleArgs {
    /// Source PDF files; they are numbered from 1 in the order given
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Output order as `FILE:PAGE`, `FILE:FIRST-LAST` or `FILE`, comma separated
    /// and 1-based, e.g. `1:3,2:1,1:1`. Defaults to every page of every file.
    #[arg(long)]
    pub order: Option<String>,

    /// Skip references the server cannot resolve instead of failing
    #[arg(long)]
    pub tolerant: bool,

    /// Keep the result on the server and print a one-shot transfer token
    #[arg(long)]
    pub handoff: bool,

    /// Name the server should give the document
    #[arg(long)]
    pub filename: Option<String>,

    /// Write a thumbnail of every output page, in output order, to this directory
    #[arg(long, value_name = "DIR")]
    pub thumbnails: Option<PathBuf>,

    /// Where to write the document; defaults to the server-provided name
    #[arg(long, short)]
    pub output: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct MergeArgs {
    #[arg(required = true, num_args = 2..)]
    pub files: Vec<PathBuf>,

    #[arg(long, short)]
    pub output: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct PreviewArgs {
    pub file: PathBuf,

    /// 1-based first page
    #[arg(long)]
    pub first_page: Option<u32>,

    /// 1-based last page, inclusive
    #[arg(long)]
    pub last_page: Option<u32>,

    /// Only print the page count
    #[arg(long)]
    pub count_only: bool,

    /// Directory for the rendered PNG files
    #[arg(long, default_value = ".")]
    pub out_dir: PathBuf,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum TargetFormat {
    Png,
    Jpeg,
}

impl TargetFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            TargetFormat::Png => "png",
            TargetFormat::Jpeg => "jpeg",
        }
    }
}

#[derive(Args, Debug)]
pub struct ConvertArgs {
    pub file: PathBuf,

    #[arg(long, value_enum, default_value = "png")]
    pub format: TargetFormat,

    /// Where to write the archive; defaults to the server-provided name
    #[arg(long, short)]
    pub output: Option<PathBuf>,
}
