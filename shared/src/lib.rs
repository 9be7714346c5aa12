//! Shared types and models for the plastics back office
//!
//! This crate holds the domain models and every pure decision the backend
//! applies inside its transactions: carton transitions, barcode sequencing,
//! threshold status, stocktake classification and works-order completion.

pub mod models;
pub mod types;
pub mod validation;

pub use models::*;
pub use types::*;
pub use validation::*;
