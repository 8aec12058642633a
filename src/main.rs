use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::io::IsTerminal;
use std::process::ExitCode;

use mdrecipe::{ExecuteOptions, Recipe, RecipeConfig};

mod cli;

const EXIT_FAILED: u8 = 1;
const EXIT_ERROR: u8 = 2;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = cli::Args::parse();
    if !std::io::stdout().is_terminal() {
        colored::control::set_override(false);
    }
    match run(&args) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(EXIT_FAILED),
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(EXIT_ERROR)
        }
    }
}

fn run(args: &cli::Args) -> Result<bool> {
    let markdown = std::fs::read_to_string(&args.file)
        .with_context(|| format!("read {}", args.file.display()))?;
    let config = RecipeConfig::default().with_shell_command(&args.shell)?;
    let mut recipe = Recipe::parse_with(&markdown, config)
        .with_context(|| format!("parse {}", args.file.display()))?;

    if args.dry_run {
        println!("Would run the following validation steps:");
        print!("{}", recipe.dry_run());
        return Ok(true);
    }

    let program = recipe
        .config()
        .shell
        .first()
        .ok_or_else(|| anyhow!("shell command must not be empty"))?;
    which::which(program).with_context(|| format!("resolve shell {program:?}"))?;

    let options = ExecuteOptions {
        manual: args.manual,
        tags: args.tags.clone(),
        validate_links: args.validate_links,
        link_retries: args.link_retries,
    };
    let outcome = recipe.execute(&options);
    print!("{}", outcome.report);
    Ok(outcome.success)
}
