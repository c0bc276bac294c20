// hmap-common - Shared wire types, errors and the store interface for HashMapper
//
// Every other crate in the workspace talks to a hash store through the
// `HashCommands` family of traits defined here.

pub mod command;
pub mod error;
pub mod scalar;
pub mod store;

// Re-export for convenience
pub use command::*;
pub use error::*;
pub use scalar::*;
pub use store::*;
