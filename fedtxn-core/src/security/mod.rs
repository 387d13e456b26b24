//! Catalog access rules.
//!
//! Rules are stateless predicates evaluated in order by the caller; the first
//! rule that matches decides.

mod rule;

pub use rule::{evaluate_rules, CatalogAccessControlRule};
