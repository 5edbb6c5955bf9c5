//! Status tree assembly
//!
//! Walks a composition's declared managed resources, resolves each one, and
//! assembles the cross-linked tree published for that composition.

mod builder;

pub use builder::{BuildReport, StatusTreeBuilder};
