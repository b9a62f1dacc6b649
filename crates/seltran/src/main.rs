//! `seltran`: translate a Lua 5.3 script into a C module whose functions
//! run without bytecode dispatch.

mod frontend;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use seltran_bytecode::disasm;
use seltran_codegen::{bind, emit_module, ChunkLoader, EmitOptions, ModuleName};
use tracing::{info, warn};
use tracing_subscriber::filter::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "seltran", version, about = "Lua 5.3 bytecode to C translator")]
struct Cli {
    /// Lua source or precompiled chunk, named `<module>.lua`
    input: PathBuf,

    /// Generated C file, named `<module>.c`
    #[arg(short, long)]
    output: PathBuf,

    /// Compiler used for source input
    #[arg(long, env = "SELTRAN_LUAC", default_value = "luac5.3")]
    luac: PathBuf,

    /// Do not annotate the generated code with bytecode listings
    #[arg(long)]
    no_comments: bool,

    /// Skip re-binding a precompiled input against the emitted dispatch table
    #[arg(long)]
    no_verify: bool,

    /// Print the bytecode listing of the input to stdout
    #[arg(long)]
    list: bool,

    /// Log translation progress (RUST_LOG overrides)
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("seltran: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<()> {
    // Naming problems are usage errors: report them before any work.
    let name = ModuleName::from_paths(&cli.input, &cli.output)?;

    let loaded = frontend::load(&cli.input, &cli.luac)?;
    if cli.list {
        print!("{}", disasm::listing(&loaded.tree));
    }

    let options = EmitOptions {
        comments: !cli.no_comments,
    };
    let module = emit_module(&loaded.tree, &loaded.source, &name, &options)
        .with_context(|| format!("cannot translate {}", cli.input.display()))?;

    if !cli.no_verify {
        if loaded.precompiled {
            let chunkname = format!("@{}", cli.input.display());
            let bindings = bind(&ChunkLoader, &loaded.source, &chunkname, &module.dispatch)
                .context("generated module would not bind to its embedded chunk")?;
            info!(functions = bindings.len(), "binding check passed");
        } else {
            warn!("binding check skipped: the input is source text");
        }
    }

    write_output(&cli.output, &module.text)
}

fn write_output(path: &Path, text: &str) -> Result<()> {
    std::fs::write(path, text).with_context(|| format!("cannot write {}", path.display()))?;
    info!(output = %path.display(), bytes = text.len(), "wrote module");
    Ok(())
}
