//! Rules engine core
//!
//! Pure rules live in [`session`] (combat) and [`resources`] (per-character
//! pools and rests); both are driven by storage-backed managers. The
//! remaining modules are the shared building blocks they sit on.

pub mod clock;
pub mod damage;
pub mod dice;
pub mod error;
pub mod logging;
pub mod resources;
pub mod session;
