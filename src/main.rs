//! omnivec CLI
//!
//! Commands:
//!   serve   - Start the HTTP server
//!   ingest  - Ingest a file or URL and wait for the job to finish
//!   search  - Search the vector store

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use omnivec::{App, JobState, Settings};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "omnivec")]
#[command(about = "Universal document vectorizer")]
#[command(version)]
struct Cli {
    /// Path to a TOML settings file (defaults apply when omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "8005")]
        port: u16,
    },

    /// Ingest a file or URL and wait for completion
    Ingest {
        /// Path to the file to ingest
        path: Option<PathBuf>,

        /// URL to ingest instead of a file
        #[arg(long)]
        url: Option<String>,

        /// Extra metadata as key=value pairs (repeatable)
        #[arg(long = "meta")]
        metadata: Vec<String>,
    },

    /// Search for similar chunks
    Search {
        /// Search query
        query: String,

        /// Maximum number of results
        #[arg(short = 'k', long, default_value = "5")]
        top_k: usize,

        /// Skip this many results before returning top_k
        #[arg(long, default_value = "0")]
        offset: usize,
    },
}

/// Parse repeated `--meta key=value` arguments.
fn parse_metadata(pairs: &[String]) -> Result<HashMap<String, String>> {
    let mut metadata = HashMap::new();
    for pair in pairs {
        let (key, value) = pair
            .split_once('=')
            .with_context(|| format!("invalid --meta '{pair}', expected key=value"))?;
        metadata.insert(key.to_string(), value.to_string());
    }
    Ok(metadata)
}

async fn run_ingest(
    app: &App,
    path: Option<PathBuf>,
    url: Option<String>,
    metadata: HashMap<String, String>,
) -> Result<()> {
    let job_id = match (path, url) {
        (Some(path), None) => {
            if !path.exists() {
                bail!("file not found: {}", path.display());
            }
            app.service.ingest_file(path, metadata)
        }
        (None, Some(url)) => app.service.ingest_url(&url, metadata),
        _ => bail!("provide either a file path or --url"),
    };

    println!("Queued job {}", job_id);

    let mut last_reported = 0u64;
    loop {
        tokio::time::sleep(Duration::from_millis(200)).await;
        let Some(status) = app.jobs.get(&job_id) else {
            bail!("job {} disappeared", job_id);
        };

        if status.processed_chunks > last_reported {
            last_reported = status.processed_chunks;
            println!("  {} chunks processed", status.processed_chunks);
        }

        match status.state {
            JobState::Completed => {
                println!(
                    "{} ingested {} chunks",
                    "✓".green(),
                    status.processed_chunks
                );
                return Ok(());
            }
            JobState::Failed => {
                let reason = status
                    .errors
                    .last()
                    .cloned()
                    .unwrap_or_else(|| "unknown error".to_string());
                bail!("{} job failed: {}", "✗".red(), reason);
            }
            _ => {}
        }
    }
}

async fn run_search(app: &App, query: &str, top_k: usize, offset: usize) -> Result<()> {
    let matches = app.search.search(query, top_k, offset, None).await?;

    if matches.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (rank, m) in matches.iter().enumerate() {
        let source = m
            .metadata
            .get("source")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown");
        let mut preview: String = m.text.chars().take(160).collect();
        if preview.len() < m.text.len() {
            preview.push('…');
        }
        println!(
            "{}. {} (score {:.4})",
            rank + 1 + offset,
            source.cyan(),
            m.score
        );
        println!("   {}", preview);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref())?;
    let app = App::build(settings).await?;

    match cli.command {
        Commands::Serve { port } => {
            omnivec::run_server(app, port).await?;
        }

        Commands::Ingest {
            path,
            url,
            metadata,
        } => {
            let metadata = parse_metadata(&metadata)?;
            run_ingest(&app, path, url, metadata).await?;
        }

        Commands::Search {
            query,
            top_k,
            offset,
        } => {
            run_search(&app, &query, top_k, offset).await?;
        }
    }

    Ok(())
}
