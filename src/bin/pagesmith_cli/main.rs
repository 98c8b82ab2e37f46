//! pagesmith-cli: compose and download PDFs through the pagesmith API.
#![deny(clippy::all)]

mod args;
mod client;
mod handlers;
mod io;
mod print;
mod session;


use clap::Parser;

use args::{Cli, Commands};
use client::{CliError, Ctx};
use handlers::{assemble, convert, preview, quota, transfer};
use session::Session;

#[tokio::main]
async fn main() -> Result<(), CliError> {
    let cli = Cli::parse();
    let mut session = Session::load_or_create(&cli.session_file)?;
    let ctx = Ctx::new(&cli.server)?;

    match cli.command {
        Commands::Assemble(args) => assemble::assemble(&ctx, &mut session, args).await?,
        Commands::Merge(args) => assemble::merge(&ctx, &mut session, args).await?,
        Commands::Preview(args) => preview::handle(&ctx, &session, args).await?,
        Commands::Convert(args) => convert::convert(&ctx, &mut session, args).await?,
        Commands::Quota => quota::show(&ctx, &mut session).await?,
        Commands::SignIn { user } => quota::sign_in(&ctx, &mut session, user).await?,
        Commands::SignOut => quota::sign_out(&ctx, &mut session).await?,
        Commands::Take { token, output } => {
            transfer::take(&ctx, &mut session, &token, output).await?
        }
    }

    session.save(&cli.session_file)?;
    Ok(())
}
