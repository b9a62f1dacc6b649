use super::helpers::*;
use pretty_assertions::assert_eq;
use seltran_bytecode::{chunk, Proto};
use seltran_codegen::{
    bind, preorder, BindError, ChunkLoader, LoadFailure, SourceLoader, TraversalId,
};

struct FailingLoader(LoadFailure);

impl SourceLoader for FailingLoader {
    fn load(&self, _: &[u8], _: &str) -> Result<Proto, LoadFailure> {
        Err(self.0.clone())
    }
}

#[test]
fn test_binder_numbering_matches_emitter() {
    let tree = nested_tree();
    let bytes = chunk::dump(&tree, false);
    let module = emit(&tree, &bytes);

    let bindings = bind(&ChunkLoader, &bytes, "=test", &module.dispatch).unwrap();
    assert_eq!(bindings.len(), module.dispatch.len());

    let emitted: Vec<(TraversalId, u32)> = preorder(&tree)
        .map(|(id, p)| (id, p.linedefined))
        .collect();
    let bound: Vec<(TraversalId, u32)> = bindings
        .iter()
        .map(|(id, p, _)| (id, p.linedefined))
        .collect();
    assert_eq!(bound, emitted);

    for (id, _, symbol) in bindings.iter() {
        assert_eq!(Some(symbol), module.dispatch.symbol(id));
    }
}

#[test]
fn test_single_function_binding() {
    let tree = return_sum();
    let bytes = chunk::dump(&tree, true);
    let module = emit(&tree, &bytes);
    let bindings = bind(&ChunkLoader, &bytes, "=test", &module.dispatch).unwrap();
    assert_eq!(bindings.symbol(TraversalId(0)), Some("seltran_fn_0"));
    assert_eq!(bindings.symbol(TraversalId(1)), None);
    assert_eq!(bindings.root().code, tree.code);
}

#[test]
fn test_count_mismatch_binds_nothing() {
    let small = emit(&return_sum(), b"");
    let bytes = chunk::dump(&nested_tree(), false);
    let err = bind(&ChunkLoader, &bytes, "=test", &small.dispatch).unwrap_err();
    assert_eq!(
        err,
        BindError::CountMismatch {
            expected: 1,
            found: 6
        }
    );
}

#[test]
fn test_tampered_source_fails_to_load() {
    let tree = nested_tree();
    let bytes = chunk::dump(&tree, false);
    let module = emit(&tree, &bytes);

    let truncated = &bytes[..bytes.len() - 5];
    let err = bind(&ChunkLoader, truncated, "=test", &module.dispatch).unwrap_err();
    assert!(matches!(err, BindError::Load(LoadFailure::Syntax(_))), "{err}");

    let mut corrupted = bytes.clone();
    corrupted[4] = 0x52;
    let err = bind(&ChunkLoader, &corrupted, "=test", &module.dispatch).unwrap_err();
    assert!(matches!(err, BindError::Load(LoadFailure::Syntax(_))), "{err}");
}

#[test]
fn test_loader_failures_propagate() {
    let module = emit(&return_sum(), b"");
    for failure in [
        LoadFailure::Memory,
        LoadFailure::Finalizer("boom".into()),
        LoadFailure::Syntax("unexpected symbol".into()),
    ] {
        let err = bind(&FailingLoader(failure.clone()), b"", "=test", &module.dispatch)
            .unwrap_err();
        assert_eq!(err, BindError::Load(failure));
    }
    assert_eq!(
        BindError::Load(LoadFailure::Memory).to_string(),
        "cannot load embedded source: not enough memory"
    );
}
