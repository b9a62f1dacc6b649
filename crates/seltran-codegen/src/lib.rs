//! Seltran code generator.
//!
//! Numbers a prototype tree in preorder, renders every lowered prototype as
//! one C function, and assembles the module: preamble, functions, dispatch
//! table, embedded source, registration name and loader postamble. The
//! [`bind`] module models what the generated loader does at load time.

pub mod bind;
pub mod c;
pub mod error;
pub mod module;
pub mod naming;
pub mod templates;
pub mod traversal;
pub mod writer;

pub use bind::{bind, Bindings, ChunkLoader, SourceLoader};
pub use error::{BindError, EmitError, LoadFailure, NameError};
pub use module::{emit_module, DispatchTable, EmitOptions, GeneratedModule};
pub use naming::ModuleName;
pub use traversal::{preorder, TraversalId};
