//! bpq-auth-proxy - authenticating telnet relay for BPQ nodes

use clap::{CommandFactory, Parser};
use clap_complete::env::CompleteEnv;

use bpq_auth_proxy::cli::commands::{completion, config, run, users, version};
use bpq_auth_proxy::cli::{Cli, Commands, ExitCode};

#[tokio::main]
async fn main() -> std::process::ExitCode {
    // Handle dynamic shell completion if COMPLETE env var is set
    CompleteEnv::with_factory(Cli::command).complete();

    let cli = Cli::parse();

    if let Err(e) = bpq_auth_proxy::logging::init(cli.verbose, cli.quiet) {
        eprintln!("Error: {}", e);
        return ExitCode::GeneralError.into();
    }

    let result = match cli.command {
        Commands::Run(args) => run::execute(args, cli.config).await,
        Commands::Config(args) => config::execute(args, cli.config).await,
        Commands::Users(args) => users::execute(args, cli.config).await,
        Commands::Version(args) => version::execute(args).await,
        Commands::Completion(args) => completion::execute(args).await,
    };

    match result {
        Ok(()) => ExitCode::Success.into(),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::for_error(&e).into()
        }
    }
}
