//! Pass framework.
//!
//! A [`Step`] drives one [`Pass`] to a fixed point. Every iteration clears the
//! root and global scopes and walks the whole tree; the framework keeps the
//! scope bookkeeping (declarations, reads, writes) current so the pass hooks
//! only decide rewrites. A pass asks for another iteration by re-arming the
//! counter; the walk is bounded by a hard iteration cap.

mod fixup_function_name;
mod inline;
mod strip_dead_code;
mod table_constructor;

pub use fixup_function_name::FixupFunctionNameStep;
pub use inline::InlineStep;
pub use strip_dead_code::StripDeadCodeStep;
pub use table_constructor::TableConstructorStep;

use rustc_hash::FxHashSet;
use tracing::{debug, trace, warn};

use crate::ast::Ast;
use crate::error::Result;
use crate::node::{NodeId, NodeKind};
use crate::scope::{ScopeId, ScopeTree};
use crate::state::LuaState;
use crate::visitor::{walk, Visitor};

/// Lower bound of the per-pass iteration cap.
pub const MIN_ITERATIONS: usize = 32;

const BANNER: &str = "====================";

// ═══════════════════════════════════════════════════════════════════════════════
// CONTEXT
// ═══════════════════════════════════════════════════════════════════════════════

/// Iteration and removal state shared by a pass and its driver.
#[derive(Debug, Default)]
pub struct StepContext {
    iteration: usize,
    current_iteration: usize,
    changed: bool,
    pending: Vec<NodeId>,
}

impl StepContext {
    /// Requests one more iteration after the current one.
    pub fn rearm(&mut self) {
        self.iteration = 1;
    }

    pub fn mark_changed(&mut self) {
        self.changed = true;
    }

    pub fn is_changed(&self) -> bool {
        self.changed
    }

    /// 1-based number of the iteration in progress.
    pub fn current_iteration(&self) -> usize {
        self.current_iteration
    }

    pub fn is_pending(&self, node: NodeId) -> bool {
        self.pending.contains(&node)
    }

    /// Removes `node` from the nearest enclosing statement list holding it.
    ///
    /// A node that cannot be found yet is queued and dropped when its block
    /// finishes, or when its `if` statement is next visited.
    pub fn remove_node(&mut self, ast: &mut Ast, node: NodeId) {
        if self.is_pending(node) {
            return;
        }

        let mut scope = Some(ast.nodes.scope(node));
        while let Some(id) = scope {
            if let Some(owner) = ast.scopes.owner(id) {
                if ast.nodes.remove_child(owner, node) {
                    self.changed = true;
                    debug!(node = ast.nodes.type_name(node), "removed node");
                    return;
                }
            }
            scope = ast.scopes.parent(id);
        }

        debug!(node = ast.nodes.type_name(node), "pending remove node");
        self.pending.push(node);
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PASS
// ═══════════════════════════════════════════════════════════════════════════════

/// Rewrite hooks of a pass; every hook defaults to a no-op.
pub trait Pass {
    const NAME: &'static str;

    /// Runs before each walk of the tree.
    fn begin_iteration(&mut self, _ctx: &mut StepContext) {}

    fn pre_visit(
        &mut self,
        _ctx: &mut StepContext,
        _ast: &mut Ast,
        _node: NodeId,
        _state: &mut LuaState,
    ) -> Result<Option<NodeId>> {
        Ok(None)
    }

    fn post_visit(
        &mut self,
        _ctx: &mut StepContext,
        _ast: &mut Ast,
        _node: NodeId,
        _state: &mut LuaState,
    ) -> Result<Option<NodeId>> {
        Ok(None)
    }

    /// Runs after a `repeat` body, before its `until` condition is read.
    fn visit_until(
        &mut self,
        _ctx: &mut StepContext,
        _ast: &mut Ast,
        _repeat: NodeId,
        _state: &mut LuaState,
    ) -> Result<()> {
        Ok(())
    }

    fn post_visit_block(
        &mut self,
        _ctx: &mut StepContext,
        _ast: &mut Ast,
        _block: NodeId,
        _state: &mut LuaState,
    ) -> Result<Option<Vec<NodeId>>> {
        Ok(None)
    }
}

pub struct Step<P: Pass> {
    pass: P,
    ctx: StepContext,
}

impl<P: Pass> Step<P> {
    pub fn new(pass: P) -> Self {
        Step {
            pass,
            ctx: StepContext::default(),
        }
    }

    pub fn pass(&self) -> &P {
        &self.pass
    }

    /// Number of iterations the last `apply` ran.
    pub fn iterations(&self) -> usize {
        self.ctx.current_iteration
    }

    /// Runs the pass until it stops re-arming or hits the iteration cap.
    ///
    /// Returns whether the tree changed.
    pub fn apply(&mut self, ast: &mut Ast, max_iterations: usize) -> Result<bool> {
        let cap = max_iterations.max(MIN_ITERATIONS);
        debug!("{BANNER}[BEGIN {}]{BANNER}", P::NAME);

        self.ctx.changed = false;
        self.ctx.iteration = 1;
        self.ctx.current_iteration = 0;
        self.ctx.pending.clear();

        while self.ctx.iteration > 0 {
            self.ctx.iteration -= 1;

            if self.ctx.current_iteration >= cap {
                let dump = ast
                    .to_lua(2)
                    .unwrap_or_else(|e| format!("<unprintable tree: {e}>"));
                warn!("{BANNER}[CDUMP {}]{BANNER}\n{dump}", P::NAME);
                break;
            }
            self.ctx.current_iteration += 1;
            debug!("{BANNER}[IT{:03} {}]{BANNER}", self.ctx.current_iteration, P::NAME);

            self.pass.begin_iteration(&mut self.ctx);

            mark_back_edges(ast);
            let root_scope = ast.root_scope();
            let global = ast.scopes.global();
            ast.scopes.clear(root_scope);
            ast.scopes.clear(global);

            let mut state = LuaState::new(&ast.scopes, root_scope);
            let root = ast.root();
            walk(self, ast, root, &mut state)?;
        }

        debug!("{BANNER}[ENDED {}]{BANNER}", P::NAME);
        Ok(self.ctx.changed)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// BOOKKEEPING
// ═══════════════════════════════════════════════════════════════════════════════

/// Tracked read of `slot` when it holds a bare identifier.
fn read_identifier(ast: &mut Ast, state: &LuaState, slot: Option<NodeId>, reader: NodeId) {
    if let Some(name) = ast.nodes.slot_name(slot).map(str::to_string) {
        state.read(&mut ast.scopes, &name, reader);
    }
}

fn read_identifiers(ast: &mut Ast, state: &LuaState, slots: &[NodeId], reader: NodeId) {
    for &slot in slots {
        read_identifier(ast, state, Some(slot), reader);
    }
}

/// Declares the identifiers among `slots` as unknown in `scope`.
fn declare_unknown(ast: &mut Ast, scope: ScopeId, slots: &[NodeId], writer: NodeId) {
    for &slot in slots {
        let Some(name) = ast.nodes.name(slot).map(str::to_string) else {
            continue;
        };
        if ast.scopes.alloc(&mut ast.nodes, scope, &name, true, Some(writer)) {
            trace!(%name, "redefined");
        }
    }
}

impl<P: Pass> Step<P> {
    fn pre_bookkeeping(&mut self, ast: &mut Ast, node: NodeId, state: &mut LuaState) {
        let own = ast.nodes.scope(node);
        match ast.kind(node).clone() {
            NodeKind::IfClause { condition, .. }
            | NodeKind::ElseifClause { condition, .. }
            | NodeKind::While { condition, .. } => read_identifier(ast, state, condition, node),
            NodeKind::ForGeneric {
                variables,
                iterators,
                ..
            } => {
                declare_unknown(ast, own, &variables, node);
                read_identifiers(ast, state, &iterators, node);
            }
            NodeKind::ForNumeric {
                variable,
                start,
                end,
                step,
                ..
            } => {
                declare_unknown(ast, own, &variable.into_iter().collect::<Vec<_>>(), node);
                read_identifier(ast, state, start, node);
                read_identifier(ast, state, step, node);
                read_identifier(ast, state, end, node);
            }
            NodeKind::Function {
                identifier,
                is_local,
                parameters,
                ..
            } => {
                declare_unknown(ast, own, &parameters, node);
                if is_local {
                    if let Some(name) = ast.nodes.slot_name(identifier).map(str::to_string) {
                        state.alloc(&mut ast.scopes, &mut ast.nodes, &name, true, None);
                    }
                }
            }
            NodeKind::If { clauses } => {
                let remaining: Vec<NodeId> = clauses
                    .into_iter()
                    .filter(|clause| !self.ctx.is_pending(*clause))
                    .collect();
                if let NodeKind::If { clauses } = ast.nodes.kind_mut(node) {
                    *clauses = remaining.clone();
                }
                if remaining.is_empty() {
                    debug!("removed all clauses from if statement");
                    self.ctx.remove_node(ast, node);
                }
            }
            _ => {}
        }
    }

    /// Binds a function statement's name to the function itself.
    fn bind_function(&mut self, ast: &mut Ast, node: NodeId, state: &mut LuaState) {
        let NodeKind::Function { identifier, .. } = ast.kind(node) else {
            return;
        };
        let Some(name) = ast.nodes.slot_name(*identifier).map(str::to_string) else {
            return;
        };
        state.write(&mut ast.scopes, &name, Some(node), node);
        trace!(%name, "declare function");
    }

    fn post_bookkeeping(&mut self, ast: &mut Ast, node: NodeId, state: &mut LuaState) {
        match ast.kind(node).clone() {
            NodeKind::Assignment { variables, init } => {
                for (i, &variable) in variables.iter().enumerate() {
                    let value = init.get(i).copied();
                    read_identifier(ast, state, value, node);
                    if let Some(name) = ast.nodes.name(variable).map(str::to_string) {
                        state.write(&mut ast.scopes, &name, value, node);
                    }
                }
            }
            NodeKind::Local { variables, init } => {
                read_identifiers(ast, state, &init, node);
                for (i, &variable) in variables.iter().enumerate() {
                    let Some(name) = ast.nodes.name(variable).map(str::to_string) else {
                        continue;
                    };
                    match init.get(i) {
                        Some(&value) => {
                            state.alloc(&mut ast.scopes, &mut ast.nodes, &name, false, None);
                            state.write(&mut ast.scopes, &name, Some(value), node);
                        }
                        // Extra names of a multi-value init are unknown.
                        None if !init.is_empty() => {
                            state.alloc(&mut ast.scopes, &mut ast.nodes, &name, false, None);
                            state.write(&mut ast.scopes, &name, None, node);
                        }
                        None => {
                            state.alloc(&mut ast.scopes, &mut ast.nodes, &name, false, Some(node));
                        }
                    }
                }
            }
            NodeKind::Binary { left, right, .. } | NodeKind::Logical { left, right, .. } => {
                read_identifier(ast, state, left, node);
                read_identifier(ast, state, right, node);
            }
            NodeKind::Call {
                base, arguments, ..
            } => {
                read_identifier(ast, state, base, node);
                read_identifiers(ast, state, &arguments, node);
            }
            NodeKind::StringCall { base, .. }
            | NodeKind::TableCall { base, .. }
            | NodeKind::Member { base, .. } => read_identifier(ast, state, base, node),
            NodeKind::Index { base, index } => {
                read_identifier(ast, state, base, node);
                read_identifier(ast, state, index, node);
            }
            NodeKind::Return { arguments } => read_identifiers(ast, state, &arguments, node),
            NodeKind::TableKey { key, value } => {
                read_identifier(ast, state, key, node);
                read_identifier(ast, state, value, node);
            }
            NodeKind::TableKeyString { value, .. } | NodeKind::TableValue { value } => {
                read_identifier(ast, state, value, node)
            }
            NodeKind::Unary { argument, .. } => read_identifier(ast, state, argument, node),
            _ => {}
        }
    }
}

impl<P: Pass> Visitor for Step<P> {
    fn pre_visit(&mut self, ast: &mut Ast, node: NodeId, state: &mut LuaState) -> Result<Option<NodeId>> {
        trace!(depth = state.depth(), node = ast.nodes.type_name(node), "pre visit");
        self.pre_bookkeeping(ast, node, state);

        let replacement = self.pass.pre_visit(&mut self.ctx, ast, node, state)?;
        self.bind_function(ast, replacement.unwrap_or(node), state);
        Ok(replacement)
    }

    fn post_visit(&mut self, ast: &mut Ast, node: NodeId, state: &mut LuaState) -> Result<Option<NodeId>> {
        trace!(depth = state.depth(), node = ast.nodes.type_name(node), "post visit");
        self.post_bookkeeping(ast, node, state);
        self.pass.post_visit(&mut self.ctx, ast, node, state)
    }

    fn post_visit_block(
        &mut self,
        ast: &mut Ast,
        block: NodeId,
        state: &mut LuaState,
    ) -> Result<Option<Vec<NodeId>>> {
        trace!(depth = state.depth(), node = ast.nodes.type_name(block), "post visit block");

        if let NodeKind::Repeat { .. } = ast.kind(block) {
            self.pass.visit_until(&mut self.ctx, ast, block, state)?;
            if let NodeKind::Repeat { condition, .. } = ast.kind(block) {
                let condition = *condition;
                read_identifier(ast, state, condition, block);
            }
        }

        let body = self.pass.post_visit_block(&mut self.ctx, ast, block, state)?;
        if self.ctx.pending.is_empty() {
            return Ok(body);
        }

        let candidates = match &body {
            Some(body) => body.clone(),
            None => ast.nodes.body(block).cloned().unwrap_or_default(),
        };
        let removed: FxHashSet<NodeId> = candidates
            .iter()
            .copied()
            .filter(|stmt| self.ctx.is_pending(*stmt))
            .collect();
        if removed.is_empty() {
            return Ok(body);
        }

        self.ctx.pending.retain(|node| !removed.contains(node));
        self.ctx.changed = true;
        debug!(count = removed.len(), remain = self.ctx.pending.len(), "removed pending nodes");

        Ok(Some(
            candidates
                .into_iter()
                .filter(|stmt| !removed.contains(stmt))
                .collect(),
        ))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SHARED GUARDS
// ═══════════════════════════════════════════════════════════════════════════════

/// Scope a write statement binds in; a function declaration binds its name
/// outside its own scope.
pub(crate) fn write_scope(ast: &Ast, statement: NodeId) -> ScopeId {
    let scope = ast.nodes.scope(statement);
    if ast.kind(statement).is_function() {
        ast.scopes.parent(scope).unwrap_or(scope)
    } else {
        scope
    }
}

/// The write statement is visible from `use_scope`.
pub(crate) fn is_scope_valid(ast: &Ast, statement: NodeId, use_scope: ScopeId) -> bool {
    ast.scopes.is_child(write_scope(ast, statement), use_scope)
}

fn owners_between(ast: &Ast, outer: ScopeId, inner: ScopeId) -> impl Iterator<Item = &NodeKind> + '_ {
    let scopes: &ScopeTree = &ast.scopes;
    scopes
        .chain_between(outer, inner)
        .into_iter()
        .filter_map(move |scope| scopes.owner(scope))
        .map(move |owner| ast.kind(owner))
}

/// Some scope from `inner` up to (excluding) `outer` belongs to a loop, or
/// some scope from `inner` up to (including) `outer` loops through `goto`.
///
/// A backward `goto` in `outer` itself re-runs statements of the binding's
/// own block, so it counts too.
pub(crate) fn is_within_loop(ast: &Ast, outer: ScopeId, inner: ScopeId) -> bool {
    owners_between(ast, outer, inner).any(NodeKind::is_loop)
        || ast.scopes.jumps_back(outer)
        || ast
            .scopes
            .chain_between(outer, inner)
            .into_iter()
            .any(|scope| ast.scopes.jumps_back(scope))
}

/// Statement `stmt` contains a `goto label` outside nested functions.
fn jumps_to(ast: &Ast, stmt: NodeId, label: &str) -> bool {
    let mut stack = vec![stmt];
    while let Some(current) = stack.pop() {
        match ast.kind(current) {
            NodeKind::Goto { label: target } if ast.nodes.slot_name(*target) == Some(label) => return true,
            NodeKind::Function { .. } => {}
            _ => stack.extend(ast.nodes.children(current)),
        }
    }
    false
}

/// A label of `block` is the target of a `goto` in a later statement.
fn has_back_edge(ast: &Ast, block: NodeId) -> bool {
    let Some(body) = ast.nodes.body(block) else {
        return false;
    };
    body.iter().enumerate().any(|(at, &stmt)| {
        let NodeKind::Label { label } = ast.kind(stmt) else {
            return false;
        };
        let Some(name) = ast.nodes.slot_name(*label) else {
            return false;
        };
        body[at + 1..].iter().any(|&later| jumps_to(ast, later, name))
    })
}

/// Flags every block scope whose labels are reached by a backward `goto`.
fn mark_back_edges(ast: &mut Ast) {
    let blocks: Vec<NodeId> = ast
        .nodes
        .subtree(ast.root())
        .into_iter()
        .filter(|&id| ast.kind(id).is_code_block())
        .collect();
    for block in blocks {
        let jumps_back = has_back_edge(ast, block);
        let scope = ast.nodes.scope(block);
        ast.scopes.set_jumps_back(scope, jumps_back);
    }
}

/// Some scope from `inner` up to (excluding) `outer` belongs to a function.
pub(crate) fn is_within_function(ast: &Ast, outer: ScopeId, inner: ScopeId) -> bool {
    owners_between(ast, outer, inner).any(NodeKind::is_function)
}

/// Some function nested in `scope` has read `name` during this walk.
///
/// Such a closure may run after any later write, so no write of the name can
/// be retired.
pub(crate) fn is_captured(ast: &Ast, scope: ScopeId, name: &str) -> bool {
    ast.scopes.storage(scope, name).map_or(false, |storage| {
        storage
            .read_history()
            .iter()
            .any(|&read| is_within_function(ast, scope, ast.nodes.scope(read)))
    })
}

/// Every variable `value` reads is untouched since `value` was evaluated by
/// `statement`.
///
/// A rewrite clears the variable's reads, and any later read (an index or a
/// member base included) may mutate what it holds, so the evaluation site
/// must still be the variable's last read.
pub(crate) fn captures_live(ast: &Ast, state: &LuaState, value: NodeId, statement: NodeId) -> bool {
    let mut sites: FxHashSet<NodeId> = ast.nodes.subtree(value).into_iter().collect();
    sites.insert(statement);

    ast.nodes.references(value).into_iter().all(|reference| {
        let Some(name) = ast.nodes.name(reference) else {
            return true;
        };
        state
            .last_reference(&ast.scopes, name)
            .map_or(false, |read| sites.contains(&read))
    })
}

/// The statement declares or assigns exactly one variable from a value.
pub(crate) fn single_write(ast: &Ast, statement: NodeId) -> Option<(NodeId, NodeId)> {
    match ast.kind(statement) {
        NodeKind::Local { variables, init } | NodeKind::Assignment { variables, init }
            if variables.len() == 1 && !init.is_empty() =>
        {
            Some((variables[0], init[0]))
        }
        _ => None,
    }
}
