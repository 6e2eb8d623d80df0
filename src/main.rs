use clap::Parser;
use console::style;
use std::process::ExitCode;
use stevedore::cli::args::{Cli, Commands};
use stevedore::cli::commands;
use stevedore::config::Config;
use stevedore::output;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => return report_error(&e),
    };

    let result = match cli.command {
        Commands::Run(args) => commands::run::execute(args, &config).await,
        Commands::Build(args) => commands::build::execute(args, &config).await,
        Commands::Cache { command } => commands::cache::execute(command, &config).await,
        Commands::Status => commands::status::execute(&config).await,
    };

    match result {
        Ok(code) => ExitCode::from(code.clamp(0, 255) as u8),
        Err(e) => report_error(&e),
    }
}

fn init_tracing(verbosity: u8) {
    // Quiet mode silences tracing entirely; RUST_LOG still overrides for
    // debugging an MCP-driven invocation.
    let default = if output::is_quiet_mode() {
        "off"
    } else {
        match verbosity {
            0 => "warn",
            1 => "stevedore=info",
            _ => "stevedore=debug",
        }
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();
}

fn report_error(e: &stevedore::StevedoreError) -> ExitCode {
    // Stderr only; stdout may be carrying protocol traffic
    if output::is_quiet_mode() {
        eprintln!("stevedore: {}", e);
    } else {
        eprintln!("{} {}", style("error:").red().bold(), e);
        if let Some(hint) = e.hint() {
            eprintln!("{} {}", style("hint:").yellow(), hint);
        }
    }
    ExitCode::FAILURE
}
