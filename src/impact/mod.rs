//! Impact Analysis Module
//!
//! "What breaks if I change this, and what does it depend on?"
//! This module provides:
//! - The impact analyzer (downstream, upstream, full, schema change)
//! - Report documents for export and storage
//! - The analysis history repository

pub mod model;
pub mod analyzer;
pub mod report;
pub mod history;

pub use analyzer::ImpactAnalyzer;
pub use history::ImpactHistoryRepository;
pub use model::{AnalysisConfig, ChangeType, ImpactResult};
pub use report::generate_impact_report;
