// hostel-insight/crates/hostel-insight/src/main.rs

#[cfg(feature = "cli")]
use clap::{Parser, Subcommand};
#[cfg(feature = "cli")]
use dotenvy::dotenv;
#[cfg(feature = "cli")]
use hostel_insight::{config::Config, run_server, Request, SharedState};

#[cfg(feature = "cli")]
#[derive(Parser)]
#[command(name = "hostel-insight", version, about = "Hostel BI and knowledge-base assistant")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[cfg(feature = "cli")]
#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server (default)
    Serve,
    /// Re-ingest the knowledge-base folder once and exit
    Reindex,
    /// Answer one question and print the response envelope as JSON
    Ask {
        question: String,
        #[arg(long, default_value = "cli")]
        session: String,
        #[arg(long)]
        debug: bool,
    },
}

#[cfg(feature = "cli")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let cli = Cli::parse();
    let cfg = Config::from_env()?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => run_server(cfg).await,
        Command::Reindex => {
            hostel_insight::telemetry::init_tracing();
            let state = SharedState::new(cfg)?;
            let report = state.reindex().await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Command::Ask { question, session, debug } => {
            hostel_insight::telemetry::init_tracing();
            let state = SharedState::new(cfg)?;
            let request = Request::new(question, session).with_debug(debug);
            let (envelope, pending) = state.orchestrator.handle_turn(&request).await;
            if let Some(handle) = pending {
                // the process exits right after printing; let the memory write land
                let _ = handle.await;
            }
            println!("{}", serde_json::to_string_pretty(&envelope)?);
            Ok(())
        }
    }
}

#[cfg(not(feature = "cli"))]
fn main() {
    println!("CLI feature not enabled. Enable with --features cli");
}
