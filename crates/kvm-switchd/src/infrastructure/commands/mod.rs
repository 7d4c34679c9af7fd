//! Side-effect command runners.

pub mod mock;
pub mod shell;
