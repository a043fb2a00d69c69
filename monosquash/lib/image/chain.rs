use std::{fmt, ops::Deref};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Layer ids ordered root first, leaf last.
///
/// Every element after the first names the element before it as its parent, and no id appears
/// twice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerChain(Vec<String>);

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl LayerChain {
    /// Builds a chain from ids collected while walking parent pointers from the leaf down.
    pub(crate) fn from_leaf_first(mut ids: Vec<String>) -> Self {
        ids.reverse();
        Self(ids)
    }

    /// Returns the bottom-most layer.
    pub fn root(&self) -> Option<&str> {
        self.0.first().map(String::as_str)
    }

    /// Returns the top-most layer, whose metadata seeds the flattened layer's record.
    pub fn leaf(&self) -> Option<&str> {
        self.0.last().map(String::as_str)
    }

    /// Consumes the chain, returning the ids root first.
    pub fn into_inner(self) -> Vec<String> {
        self.0
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl Deref for LayerChain {
    type Target = [String];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl fmt::Display for LayerChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join(" -> "))
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
