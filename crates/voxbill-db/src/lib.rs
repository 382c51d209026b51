//! VoxBill Database Layer
//!
//! This crate provides PostgreSQL database access and repository implementations
//! for the VoxBill system. It includes:
//!
//! - Connection pool management with sqlx
//! - Repository implementations for calls, rates, users, and top-up policies
//! - The atomic ledger/balance write path (row-locked read-modify-write)
//! - The unique-constraint-insert idempotency store

pub mod pool;
pub mod repositories;

pub use pool::create_pool;
pub use repositories::*;

// Re-export commonly used types
pub use sqlx::{PgPool, Postgres, Transaction};
pub use voxbill_core::{AppError, AppResult};
