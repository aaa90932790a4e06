//! Vecload - Vector embedding pipeline for Azure AI Search
//!
//! A batch CLI that loads tabular records from CSV or a Celonis EMS data
//! model, generates vector embeddings for a text field via Azure OpenAI,
//! and indexes the resulting documents into Azure AI Search. Supports
//! keyword (BM25), vector, and hybrid (RRF) retrieval over the index,
//! with durable checkpointing for resumable batch runs.

pub mod cli;
pub mod config;
pub mod embedding;
pub mod error;
pub mod index;
pub mod pipeline;
pub mod source;

pub use error::{Result, VecloadError};
