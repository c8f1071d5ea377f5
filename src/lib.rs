//! # Reconciliation Core
//!
//! Automatic matching of incoming bank transactions to unpaid invoices.
//!
//! ## Features
//!
//! - **Confidence scoring**: amount, date, reference, name and account signals
//! - **Greedy matching sweep**: each invoice is paid at most once per sweep
//! - **Matching rules**: ignore, customer preference and auto-match actions
//! - **Atomic commits**: payment, invoice and transaction updated together
//! - **Storage abstraction**: database-agnostic design with trait-based storage
//!
//! ## Quick Start
//!
//! ```rust
//! use reconciliation_core::{Matcher, MemoryStorage};
//!
//! # async fn run() -> reconciliation_core::ReconcileResult<()> {
//! let storage = MemoryStorage::new();
//! let matcher = Matcher::new(storage, "company-1".to_string());
//! let results = matcher.run_sweep().await?;
//! assert!(results.is_empty());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod reconciliation;
pub mod traits;
pub mod types;
pub mod utils;

// Re-export commonly used types
pub use config::{load_config, MatcherConfig};
pub use reconciliation::*;
pub use traits::*;
pub use types::*;
pub use utils::memory_storage::{FailPoint, MemoryStorage};
