use clap::Parser;
use tasksync::cli::commands::{Cli, Commands};
use tasksync::cli::handlers;
use tracing_subscriber::EnvFilter;

/// Log filter: `TSYNC_LOG` wins, otherwise warnings plus whatever `-v` asks for
fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "tasksync=debug",
        _ => "tasksync=trace",
    };
    let filter = EnvFilter::try_from_env("TSYNC_LOG").unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        // Init runs before vault discovery
        Commands::Init(args) => handlers::cmd_init(args, cli.vault_dir.as_deref()),
        _ => handlers::dispatch(cli),
    };

    if let Err(e) = result {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}
