use super::helpers::*;
use seltran_lower::{Exit, Stmt};

#[test]
fn test_every_opcode_lowers() {
    let f = lower_ok(&every_opcode());
    // 57 words, two of them absorbed
    assert_eq!(f.code_len, 57);
    assert_eq!(f.blocks.len(), 55);
    assert!(!f.has_end_block());
}

#[test]
fn test_safepoints_are_followed_by_base_refresh() {
    let f = lower_ok(&every_opcode());
    for block in &f.blocks {
        for (i, stmt) in block.stmts.iter().enumerate() {
            if stmt.is_safepoint() {
                assert_eq!(
                    block.stmts.get(i + 1),
                    Some(&Stmt::RefreshBase),
                    "pc {}: {stmt:?} not followed by a base refresh",
                    block.pc
                );
            }
        }
    }
}

#[test]
fn test_every_block_checks_hooks_first() {
    let f = lower_ok(&every_opcode());
    for block in f.blocks.iter().filter(|b| !b.is_end()) {
        assert_eq!(
            &block.stmts[..3],
            &[Stmt::Fetch, Stmt::HookCheck, Stmt::RefreshBase],
            "pc {}",
            block.pc
        );
    }
}

#[test]
fn test_absorbed_words_are_never_blocks_or_targets() {
    let f = lower_ok(&every_opcode());
    for absorbed in [2, 52] {
        assert!(f.block_at(absorbed).is_none());
        for block in &f.blocks {
            assert!(
                !block.successors().contains(&absorbed),
                "pc {} reaches absorbed word {absorbed}",
                block.pc
            );
        }
    }
}

#[test]
fn test_targets_in_range() {
    let f = lower_ok(&every_opcode());
    for block in &f.blocks {
        for target in block.successors() {
            assert!(target <= f.code_len, "pc {} -> {target}", block.pc);
        }
    }
}

#[test]
fn test_tests_have_two_successors_skipping_one() {
    let f = lower_ok(&every_opcode());
    for pc in [31, 33, 35, 37, 39] {
        let block = f.block_at(pc).unwrap();
        assert!(matches!(block.exit, Exit::Branch { .. }), "pc {pc}");
        assert_eq!(block.successors(), vec![pc + 1, pc + 2], "pc {pc}");
    }
}

#[test]
fn test_lowering_is_deterministic() {
    let p = every_opcode();
    assert_eq!(lower_ok(&p), lower_ok(&p));
}
