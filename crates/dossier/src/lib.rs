//! # Dossier
//!
//! A retrieval-augmented context engine for client intelligence. Documents,
//! meeting transcripts, and knowledge-base items are chunked, embedded, and
//! written to a partitioned vector index; at query time a question is
//! embedded, the namespaces are queried in parallel, and the results are
//! re-ranked into a source-grouped context bundle for a downstream
//! answer-generation step.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌────────────────┐   ┌──────────────┐
//! │ raw text /   │──▶│ chunk + embed  │──▶│ vector index │
//! │ transcripts  │   │ (ingest)       │   │ (namespaced) │
//! └──────────────┘   └────────────────┘   └──────┬───────┘
//!                                                │
//!                       ┌────────────────────────┤
//!                       ▼                        ▼
//!                ┌─────────────┐         ┌──────────────┐
//!                │ fan-out +   │         │   context    │
//!                │ re-rank     │────────▶│   bundle     │
//!                └─────────────┘         └──────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`db`] | Catalog database connection |
//! | [`migrate`] | Catalog schema migrations |
//! | [`catalog`] | Document and chunk persistence, status transitions |
//! | [`embedding`] | Embedding providers and the batched embedder |
//! | [`index`] | REST vector-index client |
//! | [`ingest`] | Ingestion pipeline |
//! | [`retrieve`] | Retrieval pipeline |

pub mod catalog;
pub mod config;
pub mod db;
pub mod embedding;
pub mod index;
pub mod ingest;
pub mod migrate;
pub mod retrieve;
