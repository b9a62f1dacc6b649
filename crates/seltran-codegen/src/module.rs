//! Whole-module assembly.

use seltran_bytecode::Proto;
use seltran_lower::lower;
use tracing::{debug, info};

use crate::c::write_function;
use crate::error::EmitError;
use crate::naming::ModuleName;
use crate::templates::{POSTAMBLE, PREAMBLE};
use crate::traversal::{preorder, TraversalId};
use crate::writer::{byte_rows, c_string_literal, CodeWriter};

const SOURCE_BYTES_PER_LINE: usize = 16;

/// Emitter settings.
#[derive(Clone, Debug)]
pub struct EmitOptions {
    /// Annotate functions and blocks with their source bytecode.
    pub comments: bool,
}

impl Default for EmitOptions {
    fn default() -> Self {
        EmitOptions { comments: true }
    }
}

/// Generated function symbols, indexed by traversal identifier.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DispatchTable {
    symbols: Vec<String>,
}

impl DispatchTable {
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn symbol(&self, id: TraversalId) -> Option<&str> {
        self.symbols.get(id.0).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (TraversalId, &str)> {
        self.symbols
            .iter()
            .enumerate()
            .map(|(i, s)| (TraversalId(i), s.as_str()))
    }
}

#[derive(Clone, Debug)]
pub struct GeneratedModule {
    pub text: String,
    pub dispatch: DispatchTable,
}

pub fn function_symbol(id: TraversalId) -> String {
    format!("seltran_fn_{}", id.0)
}

/// Translate a prototype tree into one C module.
///
/// `source` is embedded verbatim and recompiled by the module at load time;
/// it must compile to the same tree as `root`.
pub fn emit_module(
    root: &Proto,
    source: &[u8],
    name: &ModuleName,
    options: &EmitOptions,
) -> Result<GeneratedModule, EmitError> {
    let mut w = CodeWriter::new();
    w.raw(PREAMBLE);
    w.blank();

    let mut symbols = Vec::new();
    for (id, proto) in preorder(root) {
        let lowered = lower(proto).map_err(|source| EmitError::Lower {
            id,
            line: proto.linedefined,
            source,
        })?;
        debug!(%id, blocks = lowered.blocks.len(), "emitting function");
        let symbol = function_symbol(id);
        write_function(&mut w, &symbol, proto, &lowered, options.comments);
        symbols.push(symbol);
    }
    let dispatch = DispatchTable { symbols };

    write_dispatch(&mut w, &dispatch);
    write_source(&mut w, source);
    write_registration(&mut w, root, name, dispatch.len());
    w.raw(POSTAMBLE);

    info!(
        module = name.as_str(),
        functions = dispatch.len(),
        source_bytes = source.len(),
        "emitted module"
    );
    Ok(GeneratedModule {
        text: w.finish(),
        dispatch,
    })
}

fn write_dispatch(w: &mut CodeWriter, dispatch: &DispatchTable) {
    w.line(format!(
        "static const lua_CFunction seltran_functions[{}] = {{",
        dispatch.len()
    ));
    w.indent();
    for (_, symbol) in dispatch.iter() {
        w.line(format!("{symbol},"));
    }
    w.dedent();
    w.line("};");
    w.blank();
}

/// Embed the source as a byte list so embedded NULs and long sources
/// survive; a trailing 0 terminates it and the exact length is kept apart.
fn write_source(w: &mut CodeWriter, source: &[u8]) {
    w.line("static const unsigned char SELTRAN_SOURCE[] = {");
    w.indent();
    let bytes = source.iter().copied().chain(std::iter::once(0));
    for row in byte_rows(bytes, SOURCE_BYTES_PER_LINE) {
        w.line(row);
    }
    w.dedent();
    w.line("};");
    w.line(format!("#define SELTRAN_SOURCE_LEN {}", source.len()));
    w.blank();
}

fn write_registration(w: &mut CodeWriter, root: &Proto, name: &ModuleName, count: usize) {
    let chunkname = match &root.source {
        Some(s) => s.clone(),
        None => format!("={name}").into_bytes(),
    };
    w.line(format!("#define SELTRAN_MODULE_NAME {name}"));
    w.line(format!("#define SELTRAN_CHUNKNAME {}", c_string_literal(&chunkname)));
    w.line(format!("#define SELTRAN_NFUNCTIONS {count}"));
    w.blank();
}
