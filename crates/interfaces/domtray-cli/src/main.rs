use std::sync::Arc;

use anyhow::Context;
use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};
use domtray_cli::{commands, script, CliOutput};
use domtray_infra::InMemoryHost;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the domain list as the tray would show it
    Snapshot {
        #[arg(long, env = "DOMTRAY_HOST")]
        host: Utf8PathBuf,
        #[arg(long)]
        settings: Option<Utf8PathBuf>,
        #[arg(long, value_enum, default_value_t = CliOutput::Text)]
        output: CliOutput,
    },
    /// Drive the engine with a scripted sequence and print every UI delta
    Replay {
        #[arg(long, env = "DOMTRAY_HOST")]
        host: Utf8PathBuf,
        #[arg(long)]
        script: Utf8PathBuf,
        #[arg(long, help = "Print deltas as JSON lines")]
        json: bool,
        #[arg(long)]
        settings: Option<Utf8PathBuf>,
    },
}

fn load_host(path: &Utf8PathBuf) -> anyhow::Result<Arc<InMemoryHost>> {
    let host = InMemoryHost::load(path)
        .with_context(|| format!("Failed to load host description {}", path))?;
    Ok(Arc::new(host))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::WARN
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("installing the log subscriber")?;

    match cli.command {
        Commands::Snapshot {
            host,
            settings,
            output,
        } => {
            let settings = commands::load_settings(settings.as_deref())?;
            let host = load_host(&host)?;
            let rows = tokio::task::spawn_blocking(move || commands::cmd_snapshot(host, settings))
                .await??;
            match output {
                CliOutput::Text => print!("{}", commands::render_rows(&rows)),
                CliOutput::Json => println!("{}", serde_json::to_string_pretty(&rows)?),
            }
        }
        Commands::Replay {
            host,
            script,
            json,
            settings,
        } => {
            let settings = commands::load_settings(settings.as_deref())?;
            let host = load_host(&host)?;
            let ops = script::load(&script)?;
            let deltas = commands::cmd_replay(host, ops, settings).await?;
            if json {
                for delta in &deltas {
                    println!("{}", serde_json::to_string(delta)?);
                }
            } else {
                for line in commands::render_deltas(&deltas) {
                    println!("{line}");
                }
            }
        }
    }

    Ok(())
}
