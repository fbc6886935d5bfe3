//! Lexical scopes and per-variable storage.
//!
//! Scopes form a tree mirroring block nesting. Each tree also has one global
//! scope that free names fall back to. A [`Storage`] records the current value
//! of a name together with the reads since the last write and the full write
//! history; the passes decide everything from those two lists.

use rustc_hash::FxHashMap;

use crate::node::NodeId;

/// Stable handle of a scope inside its [`ScopeTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(u32);

impl ScopeId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

/// Source of placeholder values for names declared without a known value.
///
/// Injected into [`ScopeTree::alloc`] so that scope code never needs to know
/// how nodes are built.
pub trait ValueAllocator {
    fn alloc_value(&mut self, scope: ScopeId) -> NodeId;
}

// ═══════════════════════════════════════════════════════════════════════════════
// STORAGE
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Default)]
pub struct Storage {
    value: Option<NodeId>,
    reads: Vec<NodeId>,
    writes: Vec<NodeId>,
    /// Every read since the declaration, across writes.
    history: Vec<NodeId>,
}

impl Storage {
    /// Current value, `None` when it is not statically known.
    pub fn value(&self) -> Option<NodeId> {
        self.value
    }

    pub fn is_unknown(&self) -> bool {
        self.value.is_none()
    }

    pub fn reads(&self) -> &[NodeId] {
        &self.reads
    }

    pub fn writes(&self) -> &[NodeId] {
        &self.writes
    }

    pub fn read_history(&self) -> &[NodeId] {
        &self.history
    }

    pub fn reference_count(&self) -> usize {
        self.reads.len()
    }

    pub fn last_reference(&self) -> Option<NodeId> {
        self.reads.last().copied()
    }

    pub fn first_statement(&self) -> Option<NodeId> {
        self.writes.first().copied()
    }

    pub fn last_statement(&self) -> Option<NodeId> {
        self.writes.last().copied()
    }

    pub fn write(&mut self, value: Option<NodeId>, writer: Option<NodeId>) {
        self.value = value;
        self.reads.clear();
        if let Some(writer) = writer {
            self.writes.push(writer);
        }
    }

    pub fn read(&mut self, reader: NodeId) {
        self.reads.push(reader);
        self.history.push(reader);
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SCOPE TREE
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Default)]
struct Scope {
    parent: Option<ScopeId>,
    owner: Option<NodeId>,
    storage: FxHashMap<String, Storage>,
    // Allocation order, so passes see names deterministically.
    keys: Vec<String>,
    /// A `goto` in this block jumps back to one of its labels.
    jumps_back: bool,
}

#[derive(Debug)]
pub struct ScopeTree {
    scopes: Vec<Scope>,
    global: ScopeId,
}

impl Default for ScopeTree {
    fn default() -> Self {
        Self::new()
    }
}

impl ScopeTree {
    pub fn new() -> Self {
        ScopeTree {
            scopes: vec![Scope::default()],
            global: ScopeId(0),
        }
    }

    pub fn create(&mut self, parent: Option<ScopeId>, owner: Option<NodeId>) -> ScopeId {
        let id = ScopeId(self.scopes.len() as u32);
        self.scopes.push(Scope {
            parent,
            owner,
            ..Scope::default()
        });
        id
    }

    pub fn global(&self) -> ScopeId {
        self.global
    }

    pub fn set_owner(&mut self, scope: ScopeId, owner: NodeId) {
        self.scopes[scope.index()].owner = Some(owner);
    }

    pub fn owner(&self, scope: ScopeId) -> Option<NodeId> {
        self.scopes[scope.index()].owner
    }

    pub fn jumps_back(&self, scope: ScopeId) -> bool {
        self.scopes[scope.index()].jumps_back
    }

    pub fn set_jumps_back(&mut self, scope: ScopeId, jumps_back: bool) {
        self.scopes[scope.index()].jumps_back = jumps_back;
    }

    pub fn parent(&self, scope: ScopeId) -> Option<ScopeId> {
        self.scopes[scope.index()].parent
    }

    /// Number of parent hops up to the root.
    pub fn depth(&self, scope: ScopeId) -> usize {
        let mut depth = 0;
        let mut current = self.parent(scope);
        while let Some(parent) = current {
            depth += 1;
            current = self.parent(parent);
        }
        depth
    }

    /// True when `other` is `scope` itself or lexically nested inside it.
    pub fn is_child(&self, scope: ScopeId, other: ScopeId) -> bool {
        let mut current = Some(other);
        while let Some(id) = current {
            if id == scope {
                return true;
            }
            current = self.parent(id);
        }
        false
    }

    /// True when `other` strictly encloses `scope`.
    pub fn is_parent(&self, scope: ScopeId, other: ScopeId) -> bool {
        other != scope && self.is_child(other, scope)
    }

    /// Scopes from `inner` up to, but excluding, `outer`.
    pub fn chain_between(&self, outer: ScopeId, inner: ScopeId) -> Vec<ScopeId> {
        let mut chain = Vec::new();
        let mut current = Some(inner);
        while let Some(id) = current {
            if id == outer {
                break;
            }
            chain.push(id);
            current = self.parent(id);
        }
        chain
    }

    /// Declares `name` in `scope`, resetting any previous storage.
    ///
    /// Returns whether the name was already allocated there.
    pub fn alloc(
        &mut self,
        values: &mut impl ValueAllocator,
        scope: ScopeId,
        name: &str,
        is_unknown: bool,
        writer: Option<NodeId>,
    ) -> bool {
        let value = if is_unknown {
            None
        } else {
            Some(values.alloc_value(scope))
        };
        let entry = &mut self.scopes[scope.index()];
        let redefined = entry.storage.contains_key(name);
        if !redefined {
            entry.keys.push(name.to_string());
        }
        entry.storage.insert(
            name.to_string(),
            Storage {
                value,
                writes: writer.into_iter().collect(),
                ..Storage::default()
            },
        );
        redefined
    }

    pub fn is_allocated(&self, scope: ScopeId, name: &str) -> bool {
        self.scopes[scope.index()].storage.contains_key(name)
    }

    pub fn storage(&self, scope: ScopeId, name: &str) -> Option<&Storage> {
        self.scopes[scope.index()].storage.get(name)
    }

    pub fn storage_mut(&mut self, scope: ScopeId, name: &str) -> Option<&mut Storage> {
        self.scopes[scope.index()].storage.get_mut(name)
    }

    /// Value of `name`, tracking a read when `reader` is given.
    ///
    /// The outer `None` means the name is not allocated here.
    pub fn read(&mut self, scope: ScopeId, name: &str, reader: Option<NodeId>) -> Option<Option<NodeId>> {
        let storage = self.storage_mut(scope, name)?;
        if let Some(reader) = reader {
            storage.read(reader);
        }
        Some(storage.value())
    }

    pub fn write(
        &mut self,
        scope: ScopeId,
        name: &str,
        value: Option<NodeId>,
        writer: Option<NodeId>,
    ) -> bool {
        match self.storage_mut(scope, name) {
            Some(storage) => {
                storage.write(value, writer);
                true
            }
            None => false,
        }
    }

    pub fn free(&mut self, scope: ScopeId, name: &str) {
        let entry = &mut self.scopes[scope.index()];
        if entry.storage.remove(name).is_some() {
            entry.keys.retain(|key| key != name);
        }
    }

    pub fn clear(&mut self, scope: ScopeId) {
        let entry = &mut self.scopes[scope.index()];
        entry.storage.clear();
        entry.keys.clear();
    }

    pub fn keys(&self, scope: ScopeId) -> Vec<String> {
        self.scopes[scope.index()].keys.clone()
    }
}
