//! Small building blocks shared by the rest of the crate.

mod run_guard;
mod tags;

pub use run_guard::*;
pub use tags::*;
