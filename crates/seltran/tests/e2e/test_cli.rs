use std::ffi::OsStr;

use super::helpers::*;
use pretty_assertions::assert_eq;
use seltran_bytecode::{chunk, disasm, Instruction, Proto};
use seltran_codegen::{emit_module, EmitOptions, ModuleName};
use tempfile::TempDir;

fn os(s: &str) -> &OsStr {
    OsStr::new(s)
}

#[test]
fn test_translates_precompiled_chunk() {
    let dir = TempDir::new().unwrap();
    let input = write_chunk(dir.path(), "sum.lua", &print_sum());
    let output = dir.path().join("sum.c");

    let out = seltran(&[input.as_os_str(), os("-o"), output.as_os_str()]);
    assert!(out.status.success(), "{}", stderr(&out));

    let text = std::fs::read_to_string(&output).unwrap();
    assert!(text.contains("#define SELTRAN_MODULE_NAME sum\n"));
    assert!(text.contains("static int seltran_fn_0 (lua_State *L)"));
    assert!(text.contains("#define SELTRAN_NFUNCTIONS 1\n"));
    assert!(text.contains("luaT_trybinTM(L, rb, rc, ra, TM_ADD);"));
    // The chunk itself is embedded: it starts with ESC 'L' 'u' 'a'.
    assert!(text.contains(" 27,  76, 117,  97,"));
}

#[test]
fn test_output_matches_library_emission() {
    let dir = TempDir::new().unwrap();
    let input = write_chunk(dir.path(), "sum.lua", &print_sum());
    let output = dir.path().join("sum.c");

    let out = seltran(&[input.as_os_str(), os("-o"), output.as_os_str(), os("--list")]);
    assert!(out.status.success(), "{}", stderr(&out));

    let bytes = std::fs::read(&input).unwrap();
    let tree = chunk::undump(&bytes, "@sum.lua").unwrap();
    let name = ModuleName::new("sum").unwrap();
    let expected = emit_module(&tree, &bytes, &name, &EmitOptions::default()).unwrap();
    assert_eq!(std::fs::read_to_string(&output).unwrap(), expected.text);
    assert_eq!(String::from_utf8(out.stdout).unwrap(), disasm::listing(&tree));
}

#[test]
fn test_no_comments() {
    let dir = TempDir::new().unwrap();
    let input = write_chunk(dir.path(), "sum.lua", &print_sum());
    let output = dir.path().join("sum.c");

    let out = seltran(&[
        input.as_os_str(),
        os("-o"),
        output.as_os_str(),
        os("--no-comments"),
    ]);
    assert!(out.status.success(), "{}", stderr(&out));
    let text = std::fs::read_to_string(&output).unwrap();
    assert!(!text.contains("// "));
}

#[test]
fn test_list_prints_bytecode() {
    let dir = TempDir::new().unwrap();
    let input = write_chunk(dir.path(), "sum.lua", &print_sum());
    let output = dir.path().join("sum.c");

    let out = seltran(&[input.as_os_str(), os("-o"), output.as_os_str(), os("--list")]);
    assert!(out.status.success(), "{}", stderr(&out));
    let listing = String::from_utf8(out.stdout).unwrap();
    assert!(listing.starts_with("main <@sum.lua:0,0> (4 instructions)"));
    assert!(listing.contains("GETTABUP"));
}

#[test]
fn test_mismatched_names_are_rejected_before_reading() {
    let dir = TempDir::new().unwrap();
    // The input does not even exist: naming is checked first.
    let input = dir.path().join("a.lua");
    let output = dir.path().join("b.c");

    let out = seltran(&[input.as_os_str(), os("-o"), output.as_os_str()]);
    assert_eq!(out.status.code(), Some(1));
    let err = stderr(&out);
    assert!(err.starts_with("seltran: "), "{err}");
    assert!(err.contains("must match"), "{err}");
    assert!(!output.exists());
}

#[test]
fn test_bad_extensions() {
    let dir = TempDir::new().unwrap();
    let input = write_chunk(dir.path(), "sum.luac", &print_sum());
    let output = dir.path().join("sum.c");
    let out = seltran(&[input.as_os_str(), os("-o"), output.as_os_str()]);
    assert_eq!(out.status.code(), Some(1));
    assert!(stderr(&out).contains(".lua extension"));

    let input = write_chunk(dir.path(), "sum.lua", &print_sum());
    let output = dir.path().join("sum.cc");
    let out = seltran(&[input.as_os_str(), os("-o"), output.as_os_str()]);
    assert_eq!(out.status.code(), Some(1));
    assert!(stderr(&out).contains(".c extension"));
    assert!(!output.exists());
}

#[test]
fn test_truncated_chunk_fails_without_output() {
    let dir = TempDir::new().unwrap();
    let bytes = seltran_bytecode::chunk::dump(&print_sum(), false);
    let input = dir.path().join("sum.lua");
    std::fs::write(&input, &bytes[..bytes.len() / 2]).unwrap();
    let output = dir.path().join("sum.c");

    let out = seltran(&[input.as_os_str(), os("-o"), output.as_os_str()]);
    assert_eq!(out.status.code(), Some(1));
    assert!(stderr(&out).starts_with("seltran: "));
    assert!(!output.exists());
}

#[test]
fn test_unknown_opcode_fails_without_output() {
    let dir = TempDir::new().unwrap();
    let mut main = print_sum();
    let mut child = Proto::new();
    child.linedefined = 3;
    child.lastlinedefined = 5;
    child.emit(Instruction(0x3f), 4);
    main.protos.push(child);
    let input = write_chunk(dir.path(), "sum.lua", &main);
    let output = dir.path().join("sum.c");

    let out = seltran(&[input.as_os_str(), os("-o"), output.as_os_str()]);
    assert_eq!(out.status.code(), Some(1));
    let err = stderr(&out);
    assert!(err.contains("unknown opcode 63 at pc 0"), "{err}");
    assert!(err.contains("function 1 (line 3)"), "{err}");
    assert!(!output.exists());
}

#[test]
fn test_missing_compiler() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("sum.lua");
    std::fs::write(&input, "print(1 + 2)\n").unwrap();
    let output = dir.path().join("sum.c");
    let luac = dir.path().join("no-such-luac");

    let out = seltran(&[
        input.as_os_str(),
        os("-o"),
        output.as_os_str(),
        os("--luac"),
        luac.as_os_str(),
    ]);
    assert_eq!(out.status.code(), Some(1));
    assert!(stderr(&out).contains("cannot run"), "{}", stderr(&out));
    assert!(!output.exists());
}

/// A stand-in compiler that prints a prepared chunk whatever it is asked.
#[cfg(unix)]
fn fake_luac(dir: &std::path::Path, chunk_file: &std::path::Path) -> std::path::PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let script = dir.join("fake-luac");
    std::fs::write(
        &script,
        format!("#!/bin/sh\ncat '{}'\n", chunk_file.display()),
    )
    .unwrap();
    let mut perms = std::fs::metadata(&script).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&script, perms).unwrap();
    script
}

#[cfg(unix)]
#[test]
fn test_source_input_embeds_text() {
    let dir = TempDir::new().unwrap();
    let compiled = write_chunk(dir.path(), "compiled.out", &print_sum());
    let luac = fake_luac(dir.path(), &compiled);

    let input = dir.path().join("sum.lua");
    std::fs::write(&input, "print(1 + 2)\n").unwrap();
    let output = dir.path().join("sum.c");

    let out = seltran(&[
        input.as_os_str(),
        os("-o"),
        output.as_os_str(),
        os("--luac"),
        luac.as_os_str(),
    ]);
    assert!(out.status.success(), "{}", stderr(&out));
    assert!(stderr(&out).contains("binding check skipped"));

    let text = std::fs::read_to_string(&output).unwrap();
    // "print" in decimal bytes, then the 13-byte length.
    assert!(text.contains("112, 114, 105, 110, 116,"));
    assert!(text.contains("#define SELTRAN_SOURCE_LEN 13\n"));
}

#[cfg(unix)]
#[test]
fn test_failing_compiler_reports_its_stderr() {
    use std::os::unix::fs::PermissionsExt;

    let dir = TempDir::new().unwrap();
    let luac = dir.path().join("bad-luac");
    std::fs::write(&luac, "#!/bin/sh\necho 'sum.lua:1: unexpected symbol' >&2\nexit 1\n").unwrap();
    let mut perms = std::fs::metadata(&luac).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&luac, perms).unwrap();

    let input = dir.path().join("sum.lua");
    std::fs::write(&input, "print(1 +)\n").unwrap();
    let output = dir.path().join("sum.c");

    let out = seltran(&[
        input.as_os_str(),
        os("-o"),
        output.as_os_str(),
        os("--luac"),
        luac.as_os_str(),
    ]);
    assert_eq!(out.status.code(), Some(1));
    assert!(stderr(&out).contains("unexpected symbol"), "{}", stderr(&out));
    assert!(!output.exists());
}
