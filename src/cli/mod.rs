mod args;
mod client;
mod parse;
mod serve;

use std::{
    env::{self, VarError},
    process::ExitCode,
};

use clap::{
    builder::{styling::AnsiColor, Styles},
    Parser, Subcommand,
};
use concolor_clap::ColorChoice;
use env_logger::WriteStyle;
use log::error;

use crate::{
    error::{Error, Result},
    logger,
};

use self::args::{
    BackupArgs, DeleteArgs, LoggerArgs, ReclaimArgs, RestoreArgs, ServeArgs, StateArgs,
};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None, propagate_version = true, styles = cli_styles())]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a peer
    Serve(ServeArgs),

    /// Back up a file to the group
    Backup(BackupArgs),

    /// Restore a backed-up file from the group
    Restore(RestoreArgs),

    /// Delete a backed-up file from every peer
    Delete(DeleteArgs),

    /// Change a peer's storage budget, evicting chunks if needed
    Reclaim(ReclaimArgs),

    /// Show what a peer owns and stores
    State(StateArgs),
}

impl Command {
    fn logger(&self) -> &LoggerArgs {
        match self {
            Command::Serve(args) => &args.logger,
            Command::Backup(args) => &args.client.logger,
            Command::Restore(args) => &args.client.logger,
            Command::Delete(args) => &args.client.logger,
            Command::Reclaim(args) => &args.client.logger,
            Command::State(args) => &args.client.logger,
        }
    }
}

pub async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logger(cli.command.logger());

    let result = match cli.command {
        Command::Serve(args) => serve::main(args).await,
        Command::Backup(args) => client::backup(args).await,
        Command::Restore(args) => client::restore(args).await,
        Command::Delete(args) => client::delete(args).await,
        Command::Reclaim(args) => client::reclaim(args).await,
        Command::State(args) => client::state(args).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}

fn init_logger(args: &LoggerArgs) {
    let level = logger::level_from_verbosity(args.verbose, args.quiet);
    let style = match args.color {
        ColorChoice::Auto => WriteStyle::Auto,
        ColorChoice::Always => WriteStyle::Always,
        ColorChoice::Never => WriteStyle::Never,
    };
    logger::init(level, style);
}

fn get_env_var(key: &str) -> Result<Option<String>> {
    match env::var(key) {
        Ok(value) => Ok(Some(value)),
        Err(VarError::NotPresent) => Ok(None),
        Err(err) => Err(Error::Cli(format!("`{key}` is not valid: {err}"))),
    }
}

fn cli_styles() -> Styles {
    Styles::styled()
        .header(AnsiColor::BrightMagenta.on_default())
        .usage(AnsiColor::BrightMagenta.on_default())
        .literal(AnsiColor::BrightBlue.on_default())
        .placeholder(AnsiColor::BrightCyan.on_default())
}
