use crate::commands::{run_comment, run_score, CommentArgs, ScoreArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use risk_intake::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "Security Risk Intake",
    about = "Run the security risk intake service or score decisions from the command line",
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
    /// Score a file of framework answers and print the band
    Score(ScoreArgs),
    /// Render the tracker comment for a saved wizard state
    Comment(CommentArgs),
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
        Command::Score(args) => run_score(args),
        Command::Comment(args) => run_comment(args),
    }
}
