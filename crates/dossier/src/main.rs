//! # Dossier CLI (`dsr`)
//!
//! Commands for catalog initialization, document registration, ingestion,
//! and context retrieval.
//!
//! ```bash
//! # Initialize the catalog
//! dsr init --config ./config/dossier.toml
//!
//! # Register a document (scope fields set up front), then ingest its text
//! dsr register --source-type document --client acme --title "Q3 brief"
//! dsr ingest <document-id> --text ./brief.txt
//!
//! # Retrieve a context bundle
//! dsr query "how does the client feel about the rebrand" --scope acme --json
//! ```

use std::io::Read;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use dossier::catalog::{self, NewDocument};
use dossier::config::load_config;
use dossier::embedding::build_embedder;
use dossier::index::RestVectorIndex;
use dossier::ingest::{ingest_document, IngestRequest};
use dossier::retrieve::{retrieve, RetrievalRequest, TopKOverrides};
use dossier::{db, migrate};
use dossier_core::models::{Namespace, SourceType};

/// Dossier: a retrieval-augmented context engine for client intelligence.
#[derive(Parser)]
#[command(name = "dsr", version, about)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, global = true, default_value = "config/dossier.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the catalog database and run schema migrations.
    Init,

    /// Register a source document ahead of ingestion.
    Register {
        /// transcript, document, or knowledge_base_item.
        #[arg(long)]
        source_type: String,
        /// Client/entity scope; omit for owner-level knowledge-base items.
        #[arg(long)]
        client: Option<String>,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        url: Option<String>,
        /// Playback link for meeting recordings.
        #[arg(long)]
        playback_url: Option<String>,
        /// Content date (YYYY-MM-DD); the meeting date for transcripts.
        #[arg(long)]
        content_date: Option<String>,
    },

    /// Ingest extracted raw text for a registered document.
    Ingest {
        document_id: String,
        /// File holding the raw text; reads stdin when omitted.
        #[arg(long)]
        text: Option<PathBuf>,
        /// Reprocess even if the content is unchanged.
        #[arg(long)]
        force: bool,
    },

    /// Retrieve a ranked, source-grouped context bundle for a question.
    Query {
        query: String,
        /// Client/entity scope to retrieve within.
        #[arg(long)]
        scope: String,
        /// Comma-separated namespaces (meetings,documents,knowledge_base);
        /// all when omitted.
        #[arg(long)]
        sources: Option<String>,
        #[arg(long)]
        top_k_meetings: Option<usize>,
        #[arg(long)]
        top_k_documents: Option<usize>,
        #[arg(long)]
        top_k_knowledge_base: Option<usize>,
        /// Emit the full response as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show a document's processing status.
    Status { document_id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    match cli.command {
        Command::Init => {
            let pool = db::connect(&config.catalog.path).await?;
            migrate::run_migrations(&pool).await?;
            pool.close().await;
            println!("catalog initialized at {}", config.catalog.path.display());
        }

        Command::Register {
            source_type,
            client,
            title,
            url,
            playback_url,
            content_date,
        } => {
            let Some(source_type) = SourceType::parse(&source_type) else {
                bail!("unknown source type '{source_type}'. Use transcript, document, or knowledge_base_item.");
            };
            let content_date = content_date
                .map(|raw| {
                    chrono::NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
                        .with_context(|| format!("invalid content date '{raw}' (expected YYYY-MM-DD)"))
                        .map(|d| d.and_hms_opt(0, 0, 0).unwrap().and_utc())
                })
                .transpose()?;

            let pool = db::connect(&config.catalog.path).await?;
            let id = catalog::create_document(
                &pool,
                &NewDocument {
                    owner_id: config.scope.owner_id.clone(),
                    client_id: client,
                    source_type,
                    title,
                    url,
                    playback_url,
                    content_date,
                },
            )
            .await?;
            pool.close().await;
            println!("{id}");
        }

        Command::Ingest {
            document_id,
            text,
            force,
        } => {
            let raw_text = match text {
                Some(path) => std::fs::read_to_string(&path)
                    .with_context(|| format!("failed to read {}", path.display()))?,
                None => {
                    let mut buf = String::new();
                    std::io::stdin().read_to_string(&mut buf)?;
                    buf
                }
            };

            let pool = db::connect(&config.catalog.path).await?;
            let embedder = build_embedder(&config.embedding)?;
            let index = RestVectorIndex::new(&config.index)?;

            let summary = ingest_document(
                &config,
                &pool,
                embedder.as_ref(),
                &index,
                IngestRequest {
                    document_id,
                    raw_text,
                    force,
                },
            )
            .await?;
            pool.close().await;

            println!("ingest {}", summary.document_id);
            println!("  chunks created: {}", summary.chunks_created);
            println!("  embeddings generated: {}", summary.embeddings_generated);
            println!("  status: {}", summary.status.as_str());
        }

        Command::Query {
            query,
            scope,
            sources,
            top_k_meetings,
            top_k_documents,
            top_k_knowledge_base,
            json,
        } => {
            let source_filters = match sources {
                None => Vec::new(),
                Some(raw) => raw
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(|s| {
                        Namespace::parse(s).ok_or_else(|| {
                            anyhow::anyhow!(
                                "unknown namespace '{s}'. Use meetings, documents, or knowledge_base."
                            )
                        })
                    })
                    .collect::<Result<Vec<_>>>()?,
            };

            let embedder = build_embedder(&config.embedding)?;
            let index = RestVectorIndex::new(&config.index)?;

            let response = retrieve(
                &config,
                embedder.as_ref(),
                &index,
                RetrievalRequest {
                    query,
                    scope_id: scope,
                    source_filters,
                    top_k: TopKOverrides {
                        meetings: top_k_meetings,
                        documents: top_k_documents,
                        knowledge_base: top_k_knowledge_base,
                    },
                },
            )
            .await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&response)?);
            } else {
                let breakdown = &response.metadata.breakdown;
                println!("query \"{}\"", response.query);
                println!(
                    "  retrieved: {} chunks, selected: {}",
                    response.metadata.total_chunks_retrieved, response.metadata.top_chunks_selected
                );
                println!(
                    "  meetings: {}, documents: {}, knowledge_base: {}",
                    breakdown.meetings, breakdown.documents, breakdown.knowledge_base
                );
                for item in &response.context.meetings {
                    println!("  [meeting {:.3}] {}", item.final_score, first_line(&item.text));
                }
                for item in &response.context.documents {
                    println!("  [document {:.3}] {}", item.final_score, first_line(&item.text));
                }
                for item in &response.context.knowledge_base {
                    println!("  [kb {:.3}] {}", item.final_score, first_line(&item.text));
                }
            }
        }

        Command::Status { document_id } => {
            let pool = db::connect(&config.catalog.path).await?;
            let document = catalog::get_document(&pool, &document_id)
                .await?
                .with_context(|| format!("unknown document '{document_id}'"))?;
            pool.close().await;

            println!("document {}", document.id);
            println!("  source type: {}", document.source_type.as_str());
            println!("  status: {}", document.status.as_str());
            println!("  chunks: {}", document.chunk_count);
            println!("  text length: {}", document.text_length);
            if let Some(reason) = &document.error_message {
                println!("  error: {reason}");
            }
        }
    }

    Ok(())
}

fn first_line(text: &str) -> String {
    let line = text.lines().next().unwrap_or_default();
    let mut preview: String = line.chars().take(96).collect();
    if preview.len() < line.len() {
        preview.push_str("...");
    }
    preview
}
