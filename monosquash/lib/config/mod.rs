//! Configuration types for a flatten run.

mod defaults;
mod flatten;
mod name_version;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use defaults::*;
pub use flatten::*;
pub use name_version::*;
