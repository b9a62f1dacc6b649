//! Load-time binding, modelled as a side table.
//!
//! The generated module recompiles its embedded source, numbers the fresh
//! tree in preorder and attaches dispatch entries by number. Here the result
//! is a [`Bindings`] table handed to whoever runs the tree instead of a
//! field written into each prototype.

use seltran_bytecode::{chunk, Proto};
use tracing::debug;

use crate::error::{BindError, LoadFailure};
use crate::module::DispatchTable;
use crate::traversal::{preorder, TraversalId};

/// The host's source loader.
pub trait SourceLoader {
    fn load(&self, source: &[u8], chunkname: &str) -> Result<Proto, LoadFailure>;
}

/// Loads precompiled chunks.
#[derive(Clone, Copy, Debug, Default)]
pub struct ChunkLoader;

impl SourceLoader for ChunkLoader {
    fn load(&self, source: &[u8], chunkname: &str) -> Result<Proto, LoadFailure> {
        chunk::undump(source, chunkname).map_err(|e| LoadFailure::Syntax(e.to_string()))
    }
}

/// A loaded tree together with the generated function bound to each of its
/// prototypes.
#[derive(Debug)]
pub struct Bindings {
    root: Proto,
    symbols: Vec<String>,
}

impl Bindings {
    pub fn root(&self) -> &Proto {
        &self.root
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// The generated function bound to prototype `id`.
    pub fn symbol(&self, id: TraversalId) -> Option<&str> {
        self.symbols.get(id.0).map(String::as_str)
    }

    /// Each prototype of the loaded tree with its generated function.
    pub fn iter(&self) -> impl Iterator<Item = (TraversalId, &Proto, &str)> {
        preorder(&self.root)
            .zip(&self.symbols)
            .map(|((id, proto), symbol)| (id, proto, symbol.as_str()))
    }
}

/// Load `source`, check it has one prototype per dispatch entry, and bind
/// entries in preorder. Nothing is bound unless every step succeeds.
pub fn bind(
    loader: &impl SourceLoader,
    source: &[u8],
    chunkname: &str,
    dispatch: &DispatchTable,
) -> Result<Bindings, BindError> {
    let root = loader.load(source, chunkname)?;

    let found = preorder(&root).count();
    if found != dispatch.len() {
        return Err(BindError::CountMismatch {
            expected: dispatch.len(),
            found,
        });
    }

    let symbols: Vec<String> = preorder(&root)
        .map(|(id, _)| dispatch.symbol(id).unwrap_or_default().to_string())
        .collect();
    debug!(functions = symbols.len(), "bound dispatch table");
    Ok(Bindings { root, symbols })
}
