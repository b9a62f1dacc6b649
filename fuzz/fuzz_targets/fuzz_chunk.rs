#![no_main]

use libfuzzer_sys::fuzz_target;
use seltran_bytecode::chunk;

fuzz_target!(|data: &[u8]| {
    // Malformed chunks must be rejected with an error, never a panic or an
    // allocation sized by an untrusted count.
    if let Ok(proto) = chunk::undump(data, "=fuzz") {
        let again = chunk::undump(&chunk::dump(&proto, false), "=fuzz").unwrap();
        assert_eq!(again.tree_size(), proto.tree_size());
    }
});
