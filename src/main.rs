use std::process::ExitCode;

use peerstash::cli;

#[tokio::main]
async fn main() -> ExitCode {
    cli::main().await
}
