// src/analyze/mod.rs
//! AI analysis: provider adapter plus the batcher that folds answers into articles.

pub mod ai_adapter;
pub mod batcher;

pub use ai_adapter::{build_client_from_config, AiClient, AnalysisItem, AnalysisResult, DynAiClient};
pub use batcher::{AnalysisReport, Batcher};
