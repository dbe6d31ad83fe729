//! OS integration layer for TableManager
//!
//! The window and input providers are the only code that talks to the platform.
//! Services depend on the traits, so tests run on the in-memory implementations
//! while the binary uses the system ones.

pub mod input;
pub mod window;

pub use input::*;
pub use window::*;
