//! Data models and DTOs (Data Transfer Objects)
//!
//! Contains all request/response structures used by the API.

pub mod impact;
pub mod lineage;
pub mod validation;

// Re-export commonly used types
pub use impact::*;
pub use lineage::*;
