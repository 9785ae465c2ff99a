use clap::{CommandFactory, Parser};
use clap_complete::aot::generate;
use cortex::cli::{Cli, Commands};
use cortex::commands;
use cortex::orchestrator::SessionExit;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // The dev session owns the terminal; keep tracing quiet there unless
    // RUST_LOG asks otherwise.
    let default_level = match cli.command {
        Commands::Dev(_) | Commands::Start(_) => "warn",
        _ => "info",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let config_file = cli.global.config_file.as_deref();

    let result = match cli.command {
        Commands::Dev(args) => commands::dev::run(config_file, args, true).await.map(exit_code),
        Commands::Start(args) => commands::dev::run(config_file, args, false).await.map(exit_code),
        Commands::Stop { force } => commands::stop::run(config_file, force).await.map(|_| 0),
        Commands::Status => commands::status::run(config_file).await.map(|_| 0),
        Commands::Ports {
            kill,
            ports,
            all,
            force,
        } => commands::ports::run(kill, ports, all, force).await.map(|_| 0),
        Commands::Graph { command } => commands::graph::run(config_file, command).await.map(|_| 0),
        Commands::Init => commands::init::run().map(|_| 0),
        Commands::Validate => commands::validate::run(config_file).map(|_| 0),
        Commands::Doctor => commands::doctor::run().map(|_| 0),
        Commands::Completions { shell } => {
            generate(shell, &mut Cli::command(), "cortex", &mut std::io::stdout());
            Ok(0)
        }
    };

    match result {
        Ok(0) => {}
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

fn exit_code(exit: SessionExit) -> i32 {
    match exit {
        SessionExit::Clean => 0,
        SessionExit::Forced => 1,
    }
}
