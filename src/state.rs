//! Traversal state of an in-progress tree walk.

use tracing::trace;

use crate::node::NodeId;
use crate::scope::{ScopeId, ScopeTree, Storage, ValueAllocator};

/// Cursor over one walk: the current scope, the enclosing scopes and the
/// skip request a pre-visit hook may raise.
#[derive(Debug, Clone)]
pub struct LuaState {
    scope: ScopeId,
    stack: Vec<ScopeId>,
    depth: usize,
    pub skip: bool,
}

impl LuaState {
    pub fn new(scopes: &ScopeTree, scope: ScopeId) -> Self {
        LuaState {
            scope,
            stack: Vec::new(),
            depth: scopes.depth(scope),
            skip: false,
        }
    }

    pub fn scope(&self) -> ScopeId {
        self.scope
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Enters a block scope.
    ///
    /// The walker clears the scope when it reaches the owning node, before
    /// parameters and loop variables are declared into it.
    pub fn push(&mut self, scopes: &ScopeTree, scope: ScopeId) {
        self.stack.push(self.scope);
        self.scope = scope;
        self.depth = scopes.depth(scope);
    }

    /// Leaves the current block scope and clears it.
    pub fn pop(&mut self, scopes: &mut ScopeTree) {
        scopes.clear(self.scope);
        if let Some(scope) = self.stack.pop() {
            self.scope = scope;
            self.depth = scopes.depth(scope);
        }
    }

    /// Innermost scope of the walk where `name` is allocated.
    pub fn resolve(&self, scopes: &ScopeTree, name: &str) -> Option<ScopeId> {
        std::iter::once(self.scope)
            .chain(self.stack.iter().rev().copied())
            .find(|&scope| scopes.is_allocated(scope, name))
    }

    /// Scope that owns `name`: the walk's scopes first, then the global scope.
    pub fn owner_of(&self, scopes: &ScopeTree, name: &str) -> Option<ScopeId> {
        self.resolve(scopes, name).or_else(|| {
            let global = scopes.global();
            scopes.is_allocated(global, name).then_some(global)
        })
    }

    pub fn storage<'a>(&self, scopes: &'a ScopeTree, name: &str) -> Option<&'a Storage> {
        self.owner_of(scopes, name)
            .and_then(|scope| scopes.storage(scope, name))
    }

    pub fn is_allocated(&self, scopes: &ScopeTree, name: &str) -> bool {
        self.owner_of(scopes, name).is_some()
    }

    /// Not declared in any scope of the walk.
    pub fn is_global(&self, scopes: &ScopeTree, name: &str) -> bool {
        self.resolve(scopes, name).is_none()
    }

    pub fn is_unknown(&self, scopes: &ScopeTree, name: &str) -> bool {
        self.storage(scopes, name)
            .map_or(true, |storage| storage.is_unknown())
    }

    pub fn reference_count(&self, scopes: &ScopeTree, name: &str) -> usize {
        self.storage(scopes, name)
            .map_or(0, |storage| storage.reference_count())
    }

    pub fn last_reference(&self, scopes: &ScopeTree, name: &str) -> Option<NodeId> {
        self.storage(scopes, name)
            .and_then(|storage| storage.last_reference())
    }

    pub fn last_statement(&self, scopes: &ScopeTree, name: &str) -> Option<NodeId> {
        self.storage(scopes, name)
            .and_then(|storage| storage.last_statement())
    }

    pub fn first_statement(&self, scopes: &ScopeTree, name: &str) -> Option<NodeId> {
        self.storage(scopes, name)
            .and_then(|storage| storage.first_statement())
    }

    /// Current value of `name` without tracking a read.
    pub fn value(&self, scopes: &ScopeTree, name: &str) -> Option<NodeId> {
        self.storage(scopes, name).and_then(|storage| storage.value())
    }

    /// Declares `name` in the current scope.
    pub fn alloc(
        &self,
        scopes: &mut ScopeTree,
        values: &mut impl ValueAllocator,
        name: &str,
        is_unknown: bool,
        writer: Option<NodeId>,
    ) -> bool {
        let redefined = scopes.alloc(values, self.scope, name, is_unknown, writer);
        trace!(depth = self.depth, name, redefined, "declare");
        redefined
    }

    /// Tracked read of `name`; free names are allocated as unknown globals.
    pub fn read(&self, scopes: &mut ScopeTree, name: &str, reader: NodeId) -> Option<NodeId> {
        let scope = self.resolve(scopes, name).unwrap_or_else(|| scopes.global());
        if !scopes.is_allocated(scope, name) {
            scopes.alloc(&mut NoValues, scope, name, true, None);
        }
        trace!(depth = self.depth, name, "read");
        scopes.read(scope, name, Some(reader)).flatten()
    }

    /// Writes `value` to `name`; free names are allocated as globals.
    pub fn write(
        &self,
        scopes: &mut ScopeTree,
        name: &str,
        value: Option<NodeId>,
        writer: NodeId,
    ) -> bool {
        let scope = self.resolve(scopes, name).unwrap_or_else(|| scopes.global());
        if !scopes.is_allocated(scope, name) {
            scopes.alloc(&mut NoValues, scope, name, true, None);
        }
        trace!(depth = self.depth, name, "write");
        scopes.write(scope, name, value, Some(writer))
    }
}

/// Allocator for names that are always declared unknown.
struct NoValues;

impl ValueAllocator for NoValues {
    fn alloc_value(&mut self, _scope: ScopeId) -> NodeId {
        unreachable!("unknown allocations never request a value")
    }
}
