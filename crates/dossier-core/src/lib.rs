//! # Dossier Core
//!
//! Shared, runtime-free logic for Dossier: data models, the sliding-window
//! text chunker, speaker-aware transcript segmentation and chunk building,
//! query intent classification, composite re-ranking, context bundle
//! assembly, and the [`Embedder`](embedding::Embedder) /
//! [`VectorIndex`](index::VectorIndex) traits the application crate
//! implements against real services.
//!
//! This crate contains no tokio runtime, sqlx, or HTTP dependencies; the
//! providers, catalog, and pipelines live in the `dossier` application
//! crate.

pub mod bundle;
pub mod chunk;
pub mod embedding;
pub mod error;
pub mod index;
pub mod intent;
pub mod models;
pub mod rank;
pub mod transcript;

pub use error::{Error, Result};
