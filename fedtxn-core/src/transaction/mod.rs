//! Logical transactions spanning several catalogs.
//!
//! `TransactionManager` is the entry point. Each live transaction is a
//! `TransactionMetadata` record holding one binding per touched catalog view;
//! commit and abort fan out to those bindings through a bounded executor.

mod binding;
mod executor;
mod finish;
mod id;
mod info;
mod isolation;
mod manager;
mod metadata;


pub use finish::FinishHandle;
pub use id::TransactionId;
pub use info::TransactionInfo;
pub use isolation::IsolationLevel;
pub use manager::TransactionManager;
