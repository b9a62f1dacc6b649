#![no_main]

use libfuzzer_sys::fuzz_target;
use seltran_bytecode::{Instruction, Proto};
use seltran_codegen::{emit_module, EmitOptions, ModuleName};
use seltran_lower::{lower, Exit};

fuzz_target!(|data: &[u8]| {
    let mut proto = Proto::new();
    for word in data.chunks_exact(4) {
        let raw = u32::from_le_bytes([word[0], word[1], word[2], word[3]]);
        proto.emit(Instruction(raw), 1);
    }

    let Ok(lowered) = lower(&proto) else {
        return;
    };
    // Every successor is a block label.
    for block in &lowered.blocks {
        for target in block.successors() {
            assert!(lowered.block_at(target).is_some(), "dangling target {target}");
        }
        if let Exit::Branch { target, .. } | Exit::Goto { target } = &block.exit {
            assert!(*target <= lowered.code_len);
        }
    }

    let name = ModuleName::new("fuzz").unwrap();
    emit_module(&proto, data, &name, &EmitOptions::default()).unwrap();
});
