//! Utility functions and types.

mod file;
mod path;
mod perm;
mod term;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use file::*;
pub use path::*;
pub use perm::*;
pub use term::*;
