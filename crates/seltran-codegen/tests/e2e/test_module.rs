use super::helpers::*;
use pretty_assertions::assert_eq;
use seltran_bytecode::Instruction;
use seltran_codegen::{emit_module, EmitError, EmitOptions, TraversalId};
use seltran_lower::LowerError;

#[test]
fn test_return_sum_is_one_function() {
    let module = emit(&return_sum(), b"return 1+2\n");
    assert_eq!(module.dispatch.len(), 1);
    assert_eq!(module.dispatch.symbol(TraversalId(0)), Some("seltran_fn_0"));
    assert_eq!(module.text.matches("static int seltran_fn_").count(), 1);
    assert!(!module.text.contains("savedpc += -"));
    assert!(module
        .text
        .contains("static const lua_CFunction seltran_functions[1] = {\n  seltran_fn_0,\n};"));
}

#[test]
fn test_sections_in_order() {
    let text = emit(&return_sum(), b"return 1+2\n").text;
    let positions: Vec<usize> = [
        "#include \"lvm.h\"",
        "static int seltran_fn_0 (lua_State *L)",
        "static const lua_CFunction seltran_functions[1]",
        "static const unsigned char SELTRAN_SOURCE[]",
        "#define SELTRAN_MODULE_NAME test",
        "LUAMOD_API int SELTRAN_LUAOPEN (lua_State *L)",
    ]
    .iter()
    .map(|needle| {
        text.find(needle)
            .unwrap_or_else(|| panic!("missing {needle:?}"))
    })
    .collect();
    assert!(positions.windows(2).all(|w| w[0] < w[1]), "{positions:?}");
}

#[test]
fn test_source_embedding() {
    let text = emit(&return_sum(), b"return 1+2\n").text;
    assert!(text.contains(
        "static const unsigned char SELTRAN_SOURCE[] = {\n  \
         114, 101, 116, 117, 114, 110,  32,  49,  43,  50,  10,   0,\n};\n\
         #define SELTRAN_SOURCE_LEN 11\n"
    ));
}

#[test]
fn test_source_with_nul_and_long_lines() {
    let source: Vec<u8> = b"a\0b".iter().copied().chain(vec![b'x'; 30]).collect();
    let text = emit(&return_sum(), &source).text;
    assert!(text.contains("#define SELTRAN_SOURCE_LEN 33"));
    assert!(text.contains("   97,   0,  98, 120,"));
    // 33 bytes plus the sentinel: rows of 16, 16 and 2.
    assert!(text.contains("\n  120,   0,\n};"));
}

#[test]
fn test_registration() {
    let text = emit(&return_sum(), b"").text;
    assert!(text.contains("#define SELTRAN_MODULE_NAME test\n"));
    assert!(text.contains("#define SELTRAN_CHUNKNAME \"@test.lua\"\n"));
    assert!(text.contains("#define SELTRAN_NFUNCTIONS 1\n"));
    assert!(text.contains("#define SELTRAN_LUAOPEN SELTRAN_CAT(luaopen_, SELTRAN_MODULE_NAME)"));
}

#[test]
fn test_unnamed_chunk_uses_module_name() {
    let mut p = return_sum();
    p.source = None;
    let text = emit(&p, b"").text;
    assert!(text.contains("#define SELTRAN_CHUNKNAME \"=test\"\n"));
}

#[test]
fn test_nested_functions_in_preorder() {
    let tree = nested_tree();
    let module = emit(&tree, b"");
    assert_eq!(module.dispatch.len(), 6);

    let symbols: Vec<&str> = module.dispatch.iter().map(|(_, s)| s).collect();
    assert_eq!(
        symbols,
        vec![
            "seltran_fn_0",
            "seltran_fn_1",
            "seltran_fn_2",
            "seltran_fn_3",
            "seltran_fn_4",
            "seltran_fn_5"
        ]
    );

    // Each function is preceded by its own header comment.
    let lines = [0, 10, 11, 12, 20, 21];
    for (i, line) in lines.iter().enumerate() {
        let header = format!("// linedefined = {line}\n// lastlinedefined = ");
        let at = module.text.find(&header).unwrap();
        let function = module.text.find(&format!("static int seltran_fn_{i} ")).unwrap();
        assert!(at < function, "function {i}");
    }
}

#[test]
fn test_loop_labels_and_pc_adjustments() {
    // for i=1,10 do end
    let p = chunk(
        &[
            abx(LoadK, 0, 0),
            abx(LoadK, 1, 1),
            abx(LoadK, 2, 0),
            asbx(ForPrep, 0, 0),
            asbx(ForLoop, 0, -1),
            abc(Return, 0, 1, 0),
        ],
        &[
            seltran_bytecode::Constant::Integer(1),
            seltran_bytecode::Constant::Integer(10),
        ],
    );
    let text = emit(&p, b"").text;
    for pc in 0..6 {
        assert!(text.contains(&format!("label_{pc}: {{")), "label {pc}");
    }
    // FORPREP lands right on the loop instruction, so no adjustment.
    let prep = text.find("label_3: {").unwrap();
    let step = text.find("label_4: {").unwrap();
    assert!(!text[prep..step].contains("savedpc +="));
    assert!(text[prep..step].contains("goto label_4;"));
    assert!(text[step..].contains("if (jump) {\n"));
    assert!(text[step..].contains("ci->u.l.savedpc += -1;\n"));
    assert!(text.contains("luaV_forlimit(plimit, &ilimit, ivalue(pstep), &stopnow)"));
}

#[test]
fn test_end_block() {
    let p = chunk(&[asbx(Jmp, 0, 0)], &[]);
    let text = emit(&p, b"").text;
    assert!(text.contains("goto label_1;"));
    let end = text.find("label_1: {").unwrap();
    assert!(text[end..].contains("int ret = 0;"));
    // The end block has no instruction to describe or fetch.
    let end_block = &text[end..text[end..].find("\n  }\n").unwrap() + end];
    assert!(!end_block.contains("savedpc++"));
}

#[test]
fn test_comments_can_be_disabled() {
    let options = EmitOptions { comments: false };
    let module = emit_module(&return_sum(), b"", &module_name("test"), &options).unwrap();
    assert!(!module.text.contains("// "));

    let commented = emit(&return_sum(), b"").text;
    assert!(commented.contains("// source = @test.lua"));
    assert!(commented.contains("// what = main"));
    assert!(commented.contains("// [1]\tLOADK"));
}

#[test]
fn test_lowering_error_names_function() {
    let mut tree = nested_tree();
    tree.protos[0].protos[0].code.insert(0, Instruction(0x3f));
    let err = emit_module(&tree, b"", &module_name("test"), &EmitOptions::default()).unwrap_err();
    assert_eq!(
        err,
        EmitError::Lower {
            id: TraversalId(2),
            line: 11,
            source: LowerError::UnknownOpcode {
                opcode: 0x3f,
                pc: 0
            }
        }
    );
    assert_eq!(
        err.to_string(),
        "function 2 (line 11): unknown opcode 63 at pc 0"
    );
}

#[test]
fn test_emission_is_deterministic() {
    let tree = nested_tree();
    assert_eq!(emit(&tree, b"src").text, emit(&tree, b"src").text);
}
