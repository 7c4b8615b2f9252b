//! Query filters.

mod filter;

pub use filter::{Filter, FilterEvaluator, FilterExpr};
