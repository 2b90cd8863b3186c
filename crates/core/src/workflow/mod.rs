//! Ordered multi-step sequences driven through [`ActionContext`].

pub mod actions;
pub mod merge;
pub mod scan;
pub mod travel;
pub mod upgrade;

pub use actions::ActionContext;
