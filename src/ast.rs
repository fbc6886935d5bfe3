//! The tree a pass operates on: node arena, scope tree and root chunk.

use serde_json::Value;

use crate::error::Result;
use crate::node::{NodeArena, NodeId, NodeKind};
use crate::printer;
use crate::scope::{ScopeId, ScopeTree};

#[derive(Debug)]
pub struct Ast {
    pub nodes: NodeArena,
    pub scopes: ScopeTree,
    root: NodeId,
}

impl Ast {
    /// Builds a tree from a serialized `Chunk`.
    pub fn from_serialized(value: &Value) -> Result<Self> {
        let mut ast = Ast {
            nodes: NodeArena::new(),
            scopes: ScopeTree::new(),
            root: NodeId::default(),
        };
        ast.root = ast.chunk_from_serialized(value)?;
        Ok(ast)
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Scope owned by the root chunk.
    pub fn root_scope(&self) -> ScopeId {
        self.nodes.scope(self.root)
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        self.nodes.kind(id)
    }

    pub fn to_serialized(&self) -> Result<Value> {
        self.node_to_serialized(self.root)
    }

    /// Deep copy of `id` placed in `scope`, built by a serialize round-trip.
    pub fn clone_node(&mut self, id: NodeId, scope: ScopeId) -> Result<NodeId> {
        let value = self.node_to_serialized(id)?;
        self.node_from_serialized(&value, scope)
    }

    /// Formatted Lua source of the whole tree.
    pub fn to_lua(&self, indent: usize) -> Result<String> {
        printer::print(self, self.root, indent)
    }

    /// Formatted Lua source of one node.
    pub fn node_to_lua(&self, id: NodeId, indent: usize) -> Result<String> {
        printer::print(self, id, indent)
    }
}
