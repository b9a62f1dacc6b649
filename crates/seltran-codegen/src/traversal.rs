//! Preorder numbering of a prototype tree.
//!
//! The emitter names generated functions by these identifiers and the binder
//! installs them by the same identifiers, so both must number the tree with
//! this one routine.

use std::fmt;

use seltran_bytecode::Proto;

/// Position of a prototype in preorder: self before children, children in
/// declaration order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TraversalId(pub usize);

impl fmt::Display for TraversalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Iterator over `(id, prototype)` pairs in preorder.
pub struct Preorder<'a> {
    pending: Vec<&'a Proto>,
    next_id: usize,
}

impl<'a> Iterator for Preorder<'a> {
    type Item = (TraversalId, &'a Proto);

    fn next(&mut self) -> Option<Self::Item> {
        let proto = self.pending.pop()?;
        // Reversed so the first child is popped next.
        self.pending.extend(proto.protos.iter().rev());
        let id = TraversalId(self.next_id);
        self.next_id += 1;
        Some((id, proto))
    }
}

pub fn preorder(root: &Proto) -> Preorder<'_> {
    Preorder {
        pending: vec![root],
        next_id: 0,
    }
}
