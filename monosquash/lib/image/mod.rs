//! Types describing the legacy `docker save` image tree.
//!
//! ```text
//! image/
//! ├── repositories          { name: { version: leafLayerId } }
//! ├── <layerId>/
//! │   ├── json              layer metadata record
//! │   ├── layer.tar         the layer's filesystem delta
//! │   └── VERSION           "1.0"
//! └── ...
//! ```

mod chain;
mod layer;
mod repositories;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use chain::*;
pub use layer::*;
pub use repositories::*;
