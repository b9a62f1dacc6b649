//! Getting a prototype tree out of the input file.

use std::path::Path;
use std::process::Command;

use anyhow::{bail, Context, Result};
use seltran_bytecode::{chunk, Proto};
use tracing::debug;

/// The translator's input: the bytes the module will embed and the tree
/// they compile to.
pub struct Loaded {
    pub source: Vec<u8>,
    pub tree: Proto,
    /// The input was already a binary chunk, so `source` can be reloaded
    /// here to check the module's load-time binding.
    pub precompiled: bool,
}

pub fn load(input: &Path, luac: &Path) -> Result<Loaded> {
    let source =
        std::fs::read(input).with_context(|| format!("cannot read {}", input.display()))?;
    let chunkname = format!("@{}", input.display());

    if chunk::is_binary(&source) {
        debug!(input = %input.display(), "input is a precompiled chunk");
        let tree = chunk::undump(&source, &chunkname)?;
        return Ok(Loaded {
            source,
            tree,
            precompiled: true,
        });
    }

    let bytes = compile(input, luac)?;
    let tree = chunk::undump(&bytes, &chunkname)
        .with_context(|| format!("{} produced an unreadable chunk", luac.display()))?;
    Ok(Loaded {
        source,
        tree,
        precompiled: false,
    })
}

/// Run `luac -o - INPUT` and return the chunk it writes to stdout.
fn compile(input: &Path, luac: &Path) -> Result<Vec<u8>> {
    debug!(luac = %luac.display(), input = %input.display(), "compiling source");
    let output = Command::new(luac)
        .arg("-o")
        .arg("-")
        .arg(input)
        .output()
        .with_context(|| format!("cannot run {}", luac.display()))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("{} failed: {}", luac.display(), stderr.trim());
    }
    Ok(output.stdout)
}
