use crate::demo::{run_catalog_check, run_demo, CatalogCheckArgs, DemoArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use kennel_engine::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "Kennel Engine",
    about = "Run and demonstrate the appointment capacity and level progression engine",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Inspect requirement catalog exports
    Catalog {
        #[command(subcommand)]
        command: CatalogCommand,
    },
    /// Walk through booking, waitlist promotion, billing, and a level-up
    Demo(DemoArgs),
}

#[derive(Subcommand, Debug)]
enum CatalogCommand {
    /// Validate level and training type CSV exports and print a summary
    Check(CatalogCheckArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Catalog {
            command: CatalogCommand::Check(args),
        } => run_catalog_check(args),
        Command::Demo(args) => run_demo(args),
    }
}
