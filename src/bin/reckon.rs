use std::{fs, path::PathBuf};

use clap::{Parser, Subcommand};
use log::info;

use reckon::{
    repl::{describe, Stdout},
    Document, ReckonError, Repl, Settings,
};

#[derive(Parser)]
#[command(author, version, about = "Reactive line-oriented calculator")]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,
    /// Hide warnings
    #[arg(long, global = true)]
    no_warnings: bool,
    /// Hide recommendations
    #[arg(long, global = true)]
    no_recommendations: bool,
    /// Run macro lines after the document resolves
    #[arg(long, short = 'x', global = true)]
    execute: bool,
    /// Log propagation at debug level
    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Resolve every line of a file
    Run { file: PathBuf },
    /// Start an interactive session
    Repl,
    /// Resolve a snippet, one statement per line
    Eval { source: String },
}

fn main() -> Result<(), ReckonError> {
    let args = Args::parse();
    let level = if args.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::new().filter_or("RECKON_LOG", level)).init();

    let settings = Settings::new()
        .with_suppressed_warnings(args.no_warnings)
        .with_suppressed_recommendations(args.no_recommendations)
        .with_execute(args.execute);
    match args.command.unwrap_or(Command::Repl) {
        Command::Run { file } => {
            let source = fs::read_to_string(&file)?;
            info!("resolving {}", file.display());
            report(&source, settings)
        }
        Command::Eval { source } => report(&source, settings),
        Command::Repl => Repl::new(settings).run(),
    }
}

fn report(source: &str, settings: Settings) -> Result<(), ReckonError> {
    let mut document = Document::with_settings(settings);
    document.load(source);
    if settings.execute {
        document.execute(&mut Stdout);
    }
    let mut failed = 0;
    for (at, id) in document.ids().into_iter().enumerate() {
        let Some(outcome) = document.outcome(id) else {
            continue;
        };
        if outcome.error.is_some() {
            failed += 1;
        }
        for row in describe(at + 1, &outcome) {
            println!("{row}");
        }
    }
    if failed > 0 {
        return Err(ReckonError::Failed(failed));
    }
    Ok(())
}
