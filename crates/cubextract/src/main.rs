use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{ArgAction, Parser};

use cubextract::app::session::{Session, SessionRequest};
use cubextract::domain::errors::ExtractError;
use cubextract::infra::config::{Config, RuleKind};
use cubextract::infra::prompt::stdio_prompter;

/// Extract a self-contained example project from a firmware SDK tree.
///
/// Values not given as options are asked for interactively.
#[derive(Parser)]
#[command(name = "cubextract", version, about, long_about = None)]
struct Cli {
    /// Root of the firmware distribution
    #[arg(long)]
    root: Option<PathBuf>,
    /// Example name (partial, case-insensitive)
    #[arg(long)]
    example: Option<String>,
    /// Board name (partial, case-insensitive)
    #[arg(long)]
    board: Option<String>,
    /// Sub-example name, skips the selection prompt
    #[arg(long)]
    sub_example: Option<String>,
    /// Target IDE (see --list-ides); unknown IDEs copy the whole board directory
    #[arg(long)]
    ide: Option<String>,
    /// Directory receiving the project bundle
    #[arg(long = "dest")]
    destination: Option<PathBuf>,
    /// Print the configured IDE copy rules and exit
    #[arg(long)]
    list_ides: bool,
    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    cubextract::init(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            let code = err
                .downcast_ref::<ExtractError>()
                .map(ExtractError::exit_code)
                .unwrap_or(1);
            ExitCode::from(u8::try_from(code).unwrap_or(1))
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;

    if cli.list_ides {
        print_ides(&config);
        return Ok(());
    }

    let request = SessionRequest {
        root: cli.root,
        example: cli.example,
        board: cli.board,
        sub_example: cli.sub_example,
        ide: cli.ide,
        destination: cli.destination,
    };

    let mut prompter = stdio_prompter();
    let mut session = Session::new(&config, prompter.as_mut())?;
    let outcome = session.run(request)?;

    println!(
        "Example copied to {} ({} files)",
        outcome.bundle.display(),
        outcome.report.file_count
    );
    Ok(())
}

fn print_ides(config: &Config) {
    for profile in &config.ides {
        if profile.aliases.is_empty() {
            println!("{}", profile.name);
        } else {
            println!("{} (aliases: {})", profile.name, profile.aliases.join(", "));
        }
        for rule in &profile.rules {
            let kind = match rule.kind {
                RuleKind::Dir => "dir ",
                RuleKind::File => "file",
            };
            let search = if rule.search { " [search]" } else { "" };
            println!("  {kind} {} -> {}{search}", rule.source, rule.dest());
        }
    }
}
