//! The flattening engine.
//!
//! A flatten runs in three stages over an unpacked image tree:
//! - [`LayerChainResolver`] follows `parent` pointers from the tagged leaf to get the layer order.
//! - [`LayerMerger`] replays each layer archive onto a working tree, consuming whiteout markers.
//! - [`ImageFinalizer`] packs the working tree as a new layer under a fresh id and writes the
//!   one-layer image tree around it.
//!
//! [`Flattener`] chains the three, and [`run`] wraps them with unpacking and repacking of the
//! `docker save` archive itself.

mod finalize;
mod flatten;
mod id;
mod merge;
mod observer;
mod resolve;
mod run;

#[cfg(test)]
mod fixtures;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use finalize::*;
pub use flatten::*;
pub use id::*;
pub use merge::*;
pub use observer::*;
pub use resolve::*;
pub use run::*;
