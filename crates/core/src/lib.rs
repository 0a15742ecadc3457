//! `pharmastock-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod error;
pub mod id;

pub use error::{DomainError, EntityKind};
pub use id::{BatchId, LedgerEntryId, MedicineId, SupplierId, UserId};
