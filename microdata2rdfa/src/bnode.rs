use oxrdf::BlankNode;

pub const AUTO_NODE_PREFIX: &str = "HTMLAutoNode";

/// Hands out `prefix000`, `prefix001`, ... for the lifetime of one conversion.
#[derive(Clone, Debug)]
pub struct BlankNodeAllocator {
    prefix: &'static str,
    next: usize,
}

impl Default for BlankNodeAllocator {
    fn default() -> Self {
        Self::new(AUTO_NODE_PREFIX)
    }
}

impl BlankNodeAllocator {
    pub fn new(prefix: &'static str) -> Self {
        Self { prefix, next: 0 }
    }

    pub fn allocate(&mut self) -> BlankNode {
        let id = self.next;
        self.next += 1;
        BlankNode::new_unchecked(format!("{}{id:03}", self.prefix))
    }
}
