//! # Shard-Commit Test Suite
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! └── integration/
//!     ├── mod.rs        # Cluster fixtures
//!     ├── flows.rs      # Deposit, transfer and cross-shard commits
//!     └── recovery.rs   # Leader crash, duplicates, ledger agreement
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p sc-tests
//! cargo test -p sc-tests integration::recovery::
//! ```

pub mod integration;
