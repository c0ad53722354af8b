//! Database record types.

mod combat;
mod resources;

pub use combat::*;
pub use resources::*;
