use clap::Parser;
use inshallah::cli::{commands, Cli, Commands};
use inshallah::logging::init_logging;
use inshallah::InshallahError;

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    let json = cli.json;
    let result = match &cli.command {
        Commands::Run(args) => commands::run::execute(args, json),
        Commands::Resume { root, args } => commands::run::execute_resume(root, args, json),
        Commands::Status => commands::status::execute(json),
        Commands::Roles => commands::roles::execute(json),
        Commands::Issues { command } => commands::issues::execute(command, json),
        Commands::Forum { command } => commands::forum::execute(command, json),
    };

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => handle_error(&err, json),
    }
}

/// Render a structured error and exit non-zero.
///
/// Machine mode emits `{"error": "..."}` on stdout; human mode writes a
/// one-line message plus a recovery hint to stderr.
fn handle_error(err: &InshallahError, json: bool) -> ! {
    if json {
        println!(
            "{}",
            serde_json::json!({"error": err.to_string()})
        );
    } else {
        eprintln!("Error: {err}");
        if let Some(suggestion) = err.suggestion() {
            eprintln!("  {suggestion}");
        }
    }
    std::process::exit(err.exit_code());
}
