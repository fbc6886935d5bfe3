//! Inline substitution.
//!
//! A variable with exactly one read since its last write gets that read
//! replaced by a clone of the written value, and the write is retired. The
//! decision is made in two steps: when a block finishes, bindings with a
//! single read are recorded as candidates `(value, reader)`; during the next
//! walk the reader consumes its candidate while visiting the slot.

use tracing::{debug, trace};

use super::{
    captures_live, is_captured, is_scope_valid, is_within_function, is_within_loop, single_write, write_scope, Pass,
    StepContext,
};
use crate::ast::Ast;
use crate::error::Result;
use crate::node::{NodeId, NodeKind};
use crate::scope::ScopeId;
use crate::state::LuaState;

/// Values a slot refuses to receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Filter {
    Any,
    /// Closures and tables have identity; copying them into an operand or a
    /// call base would create a fresh one.
    NoFunctionOrTable,
}

impl Filter {
    fn excludes(self, kind: &NodeKind) -> bool {
        match self {
            Filter::Any => false,
            Filter::NoFunctionOrTable => kind.is_function() || kind.is_table_constructor(),
        }
    }
}

/// Where a slot sits: the node that read it, the scope the read happens in,
/// and whether the slot ends a value list.
#[derive(Debug, Clone, Copy)]
struct Site {
    node: NodeId,
    scope: ScopeId,
    tail: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Candidate {
    value: NodeId,
    target: NodeId,
    keep_declaration: bool,
    generation: usize,
}

#[derive(Debug, Default)]
pub struct InlineStep {
    candidates: Vec<Candidate>,
}

/// Moving `value` from `bound` to a read in `use_scope` keeps the number of
/// times it is evaluated.
///
/// Loop bodies and function bodies may run any number of times, so only
/// literals cross into them. That also keeps `...` inside the function it
/// belongs to.
fn evaluation_safe(ast: &Ast, value: NodeId, bound: ScopeId, use_scope: ScopeId) -> bool {
    ast.kind(value).is_literal()
        || !(is_within_loop(ast, bound, use_scope) || is_within_function(ast, bound, use_scope))
}

impl InlineStep {
    pub fn new() -> Self {
        Self::default()
    }

    fn add_candidate(&mut self, ctx: &mut StepContext, value: NodeId, target: NodeId, keep_declaration: bool) {
        let generation = ctx.current_iteration();
        if let Some(existing) = self
            .candidates
            .iter_mut()
            .find(|c| c.value == value && c.target == target)
        {
            existing.generation = generation;
            existing.keep_declaration |= keep_declaration;
            return;
        }

        debug!(value = value.index(), target = target.index(), keep_declaration, "add inline node");
        self.candidates.push(Candidate {
            value,
            target,
            keep_declaration,
            generation,
        });
        ctx.rearm();
    }

    fn consume(&mut self, value: NodeId, target: NodeId) -> Option<Candidate> {
        let at = self
            .candidates
            .iter()
            .position(|c| c.value == value && c.target == target)?;
        debug!(value = value.index(), target = target.index(), "consume inline node");
        Some(self.candidates.remove(at))
    }

    /// Another candidate still has to be substituted into `value`.
    fn awaits_inline(&self, value: NodeId) -> bool {
        self.candidates.iter().any(|c| c.target == value)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // CANDIDATES
    // ═══════════════════════════════════════════════════════════════════════════

    /// Records a candidate for `name` if its last write has a single read.
    fn check_identifier_inline(
        &mut self,
        ctx: &mut StepContext,
        ast: &Ast,
        scope: ScopeId,
        name: &str,
        state: &LuaState,
    ) {
        let Some(storage) = ast.scopes.storage(scope, name) else {
            return;
        };
        let (Some(last_ref), Some(statement)) = (storage.last_reference(), storage.last_statement()) else {
            return;
        };
        if state.is_global(&ast.scopes, name) || storage.reference_count() != 1 {
            trace!(%name, refs = storage.reference_count(), "inline condition not met");
            return;
        }
        // A closure of a name written more than once may run between writes.
        if storage.writes().len() > 1 && is_captured(ast, scope, name) {
            return;
        }

        let use_scope = ast.nodes.scope(last_ref);
        let bound = write_scope(ast, statement);

        match ast.kind(statement) {
            NodeKind::Local { .. } | NodeKind::Assignment { .. } => {
                let Some((_, value)) = single_write(ast, statement) else {
                    return;
                };
                if !is_scope_valid(ast, statement, use_scope) {
                    return;
                }
                if !evaluation_safe(ast, value, bound, use_scope) {
                    return;
                }
                if !captures_live(ast, state, value, statement) {
                    return;
                }
                trace!(%name, "inline assign");
                self.add_candidate(ctx, value, last_ref, false);
            }
            NodeKind::Function { .. } => {
                // Self recursion: the read sits inside the function, or the
                // body calls it by name.
                if ast.scopes.is_child(ast.nodes.scope(statement), use_scope)
                    || ast.nodes.mentions(statement, name)
                {
                    return;
                }
                if !is_scope_valid(ast, statement, use_scope)
                    || is_within_loop(ast, bound, use_scope)
                    || is_within_function(ast, bound, use_scope)
                {
                    return;
                }
                trace!(%name, "inline function");
                self.add_candidate(ctx, statement, last_ref, false);
            }
            _ => {}
        }
    }

    /// Folds the previous value of `name` into its single read, ahead of
    /// `statement` overwriting it.
    fn inline_prev_identifier(
        &mut self,
        ctx: &mut StepContext,
        ast: &Ast,
        statement: NodeId,
        name: &str,
        state: &LuaState,
    ) {
        if state.is_global(&ast.scopes, name) || state.reference_count(&ast.scopes, name) != 1 {
            return;
        }
        let (Some(last_ref), Some(prev), Some(owner)) = (
            state.last_reference(&ast.scopes, name),
            state.last_statement(&ast.scopes, name),
            state.owner_of(&ast.scopes, name),
        ) else {
            return;
        };
        if is_captured(ast, owner, name) {
            return;
        }

        let bound = write_scope(ast, prev);
        let use_scope = ast.nodes.scope(last_ref);
        if !is_scope_valid(ast, prev, use_scope)
            || is_within_loop(ast, bound, use_scope)
            || is_within_function(ast, bound, use_scope)
            // A rewrite inside a loop feeds the read on the next pass round.
            || is_within_loop(ast, bound, ast.nodes.scope(statement))
        {
            return;
        }

        match ast.kind(prev) {
            NodeKind::Local { .. } | NodeKind::Assignment { .. } => {
                let Some((variable, value)) = single_write(ast, prev) else {
                    return;
                };
                let self_referencing = ast
                    .nodes
                    .name(variable)
                    .map_or(false, |var| ast.nodes.has_reference(value, var));
                if self_referencing || !captures_live(ast, state, value, prev) {
                    return;
                }
                let keep_declaration = matches!(ast.kind(prev), NodeKind::Local { .. });
                self.add_candidate(ctx, value, last_ref, keep_declaration);
            }
            NodeKind::Function { .. } if !ast.nodes.mentions(prev, name) => {
                self.add_candidate(ctx, prev, last_ref, false);
            }
            _ => {}
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // SUBSTITUTION
    // ═══════════════════════════════════════════════════════════════════════════

    /// Retires the write a substituted value came from.
    fn retire_write(&self, ctx: &mut StepContext, ast: &mut Ast, statement: NodeId, keep_declaration: bool) {
        match ast.nodes.kind_mut(statement) {
            NodeKind::Local { variables, init } if keep_declaration && variables.len() == 1 => {
                init.clear();
                ctx.mark_changed();
            }
            // Other names of the declaration are still live.
            NodeKind::Local { variables, .. } if variables.len() > 1 => {}
            _ => ctx.remove_node(ast, statement),
        }
    }

    /// Clone of `value` fit for the slot at `site`.
    fn clone_value(&self, ast: &mut Ast, value: NodeId, scope: ScopeId, site: Site) -> Result<NodeId> {
        let clone = ast.clone_node(value, scope)?;
        match ast.nodes.kind_mut(clone) {
            NodeKind::Function {
                identifier,
                is_local,
                ..
            } => {
                *identifier = None;
                *is_local = false;
            }
            // The source write kept only the first value.
            NodeKind::Call { in_parens, .. }
            | NodeKind::TableCall { in_parens, .. }
            | NodeKind::StringCall { in_parens, .. }
            | NodeKind::VarargLiteral { in_parens, .. }
                if site.tail =>
            {
                *in_parens = true;
            }
            _ => {}
        }
        Ok(clone)
    }

    /// Substitutes a consumed candidate into `slot`, or returns it unchanged.
    fn resolve_inline(
        &mut self,
        ctx: &mut StepContext,
        ast: &mut Ast,
        site: Site,
        slot: NodeId,
        state: &LuaState,
        filter: Filter,
    ) -> Result<NodeId> {
        let Some(name) = ast.nodes.name(slot).map(str::to_string) else {
            return Ok(slot);
        };
        if state.is_global(&ast.scopes, &name) || state.is_unknown(&ast.scopes, &name) {
            return Ok(slot);
        }
        let (Some(value), Some(statement)) = (
            state.value(&ast.scopes, &name),
            state.last_statement(&ast.scopes, &name),
        ) else {
            return Ok(slot);
        };
        if filter.excludes(ast.kind(value)) || self.awaits_inline(value) {
            return Ok(slot);
        }
        if !is_scope_valid(ast, statement, site.scope) {
            return Ok(slot);
        }
        if !evaluation_safe(ast, value, write_scope(ast, statement), site.scope) {
            return Ok(slot);
        }
        let Some(candidate) = self.consume(value, site.node) else {
            return Ok(slot);
        };

        self.retire_write(ctx, ast, statement, candidate.keep_declaration);
        ctx.mark_changed();
        ctx.rearm();
        debug!(%name, value = ast.nodes.type_name(value), "resolve inline");

        let scope = ast.nodes.scope(slot);
        self.clone_value(ast, value, scope, site)
    }

    /// Substitutes the current value of `variable` into its own reassignment,
    /// as in `x = x + 1`, when nothing read it since its last write.
    fn resolve_reassign(
        &mut self,
        ctx: &mut StepContext,
        ast: &mut Ast,
        site: Site,
        slot: NodeId,
        variable: &str,
        state: &LuaState,
        filter: Filter,
    ) -> Result<NodeId> {
        if ast.nodes.name(slot) != Some(variable) {
            return Ok(slot);
        }
        if state.is_global(&ast.scopes, variable)
            || state.is_unknown(&ast.scopes, variable)
            || state.reference_count(&ast.scopes, variable) > 0
        {
            return Ok(slot);
        }
        let (Some(value), Some(statement)) = (
            state.value(&ast.scopes, variable),
            state.last_statement(&ast.scopes, variable),
        ) else {
            return Ok(slot);
        };
        if filter.excludes(ast.kind(value)) || self.awaits_inline(value) {
            return Ok(slot);
        }
        let Some(owner) = state.owner_of(&ast.scopes, variable) else {
            return Ok(slot);
        };
        let bound = write_scope(ast, statement);
        if is_captured(ast, owner, variable)
            || !is_scope_valid(ast, statement, site.scope)
            || is_within_loop(ast, bound, site.scope)
            || is_within_function(ast, bound, site.scope)
            || !captures_live(ast, state, value, statement)
        {
            return Ok(slot);
        }

        let keep_declaration = self
            .consume(value, site.node)
            .map_or(false, |c| c.keep_declaration)
            || matches!(ast.kind(statement), NodeKind::Local { .. });
        self.retire_write(ctx, ast, statement, keep_declaration);
        ctx.mark_changed();
        debug!(variable, value = ast.nodes.type_name(value), "resolve reassign");

        let scope = ast.nodes.scope(slot);
        self.clone_value(ast, value, scope, site)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // SLOTS
    // ═══════════════════════════════════════════════════════════════════════════

    fn inline_slot(
        &mut self,
        ctx: &mut StepContext,
        ast: &mut Ast,
        site: Site,
        slot: Option<NodeId>,
        state: &LuaState,
        filter: Filter,
    ) -> Result<Option<NodeId>> {
        let Some(slot) = slot else {
            return Ok(None);
        };
        let resolved = self.resolve_inline(ctx, ast, site, slot, state, filter)?;
        if resolved != slot {
            ast.nodes.replace_child(site.node, slot, resolved);
        }
        Ok(Some(resolved))
    }

    fn inline_list(
        &mut self,
        ctx: &mut StepContext,
        ast: &mut Ast,
        node: NodeId,
        slots: &[NodeId],
        state: &LuaState,
        filter: Filter,
    ) -> Result<()> {
        let scope = ast.nodes.scope(node);
        for (i, &slot) in slots.iter().enumerate() {
            let site = Site {
                node,
                scope,
                tail: i + 1 == slots.len(),
            };
            self.inline_slot(ctx, ast, site, Some(slot), state, filter)?;
        }
        Ok(())
    }

    fn reassign_slot(
        &mut self,
        ctx: &mut StepContext,
        ast: &mut Ast,
        site: Site,
        slot: Option<NodeId>,
        variable: &str,
        state: &LuaState,
        filter: Filter,
    ) -> Result<()> {
        let Some(slot) = slot else {
            return Ok(());
        };
        let resolved = self.resolve_reassign(ctx, ast, site, slot, variable, state, filter)?;
        if resolved != slot {
            ast.nodes.replace_child(site.node, slot, resolved);
        }
        Ok(())
    }

    /// Reassignment folding through the operands of `init`.
    fn reassign_expression(
        &mut self,
        ctx: &mut StepContext,
        ast: &mut Ast,
        init: NodeId,
        variable: &str,
        state: &LuaState,
    ) -> Result<()> {
        let site = Site {
            node: init,
            scope: ast.nodes.scope(init),
            tail: false,
        };
        let strict = Filter::NoFunctionOrTable;
        match ast.kind(init).clone() {
            NodeKind::Binary { left, right, .. } | NodeKind::Logical { left, right, .. } => {
                self.reassign_slot(ctx, ast, site, left, variable, state, strict)?;
                self.reassign_slot(ctx, ast, site, right, variable, state, strict)?;
            }
            NodeKind::Call {
                base, arguments, ..
            } => {
                self.reassign_call_base(ctx, ast, site, base, variable, state)?;
                let count = arguments.len();
                for (i, argument) in arguments.into_iter().enumerate() {
                    let site = Site {
                        tail: i + 1 == count,
                        ..site
                    };
                    self.reassign_slot(ctx, ast, site, Some(argument), variable, state, Filter::Any)?;
                }
            }
            NodeKind::StringCall { base, .. } | NodeKind::TableCall { base, .. } => {
                self.reassign_call_base(ctx, ast, site, base, variable, state)?;
            }
            NodeKind::Index { base, index } => {
                self.reassign_slot(ctx, ast, site, base, variable, state, strict)?;
                self.reassign_slot(ctx, ast, site, index, variable, state, strict)?;
            }
            NodeKind::Member { base, .. } => {
                self.reassign_slot(ctx, ast, site, base, variable, state, strict)?;
            }
            NodeKind::Unary { argument, .. } => {
                self.reassign_slot(ctx, ast, site, argument, variable, state, strict)?;
            }
            _ => {}
        }
        Ok(())
    }

    fn reassign_call_base(
        &mut self,
        ctx: &mut StepContext,
        ast: &mut Ast,
        site: Site,
        base: Option<NodeId>,
        variable: &str,
        state: &LuaState,
    ) -> Result<()> {
        let Some(base) = base else {
            return Ok(());
        };
        match ast.kind(base) {
            NodeKind::Index { .. } | NodeKind::Member { .. } => {
                self.reassign_expression(ctx, ast, base, variable, state)
            }
            _ => self.reassign_slot(ctx, ast, site, Some(base), variable, state, Filter::NoFunctionOrTable),
        }
    }

    fn visit_pre_assignment(
        &mut self,
        ctx: &mut StepContext,
        ast: &mut Ast,
        node: NodeId,
        variables: &[NodeId],
        init: &[NodeId],
        state: &LuaState,
    ) -> Result<()> {
        let scope = ast.nodes.scope(node);
        for (i, &variable) in variables.iter().enumerate() {
            let site = Site {
                node,
                scope,
                tail: i + 1 == init.len(),
            };
            let value = self.inline_slot(ctx, ast, site, init.get(i).copied(), state, Filter::Any)?;

            let Some(name) = ast.nodes.name(variable).map(str::to_string) else {
                continue;
            };
            self.inline_prev_identifier(ctx, ast, node, &name, state);
            if let Some(value) = value.or_else(|| init.first().copied()) {
                self.reassign_expression(ctx, ast, value, &name, state)?;
            }
        }
        Ok(())
    }
}

impl Pass for InlineStep {
    const NAME: &'static str = "InlineStep";

    fn begin_iteration(&mut self, ctx: &mut StepContext) {
        // Candidates live for the iteration after the one that found them.
        let current = ctx.current_iteration();
        self.candidates.retain(|c| c.generation + 1 >= current);
    }

    fn pre_visit(
        &mut self,
        ctx: &mut StepContext,
        ast: &mut Ast,
        node: NodeId,
        state: &mut LuaState,
    ) -> Result<Option<NodeId>> {
        let strict = Filter::NoFunctionOrTable;
        let site = Site {
            node,
            scope: ast.nodes.scope(node),
            tail: false,
        };

        match ast.kind(node).clone() {
            NodeKind::Assignment { variables, init } => {
                self.visit_pre_assignment(ctx, ast, node, &variables, &init, state)?;
            }
            NodeKind::Local { init, .. } => {
                self.inline_list(ctx, ast, node, &init, state, strict)?;
            }
            NodeKind::Binary { left, right, .. } | NodeKind::Logical { left, right, .. } => {
                self.inline_slot(ctx, ast, site, left, state, strict)?;
                self.inline_slot(ctx, ast, site, right, state, strict)?;
            }
            NodeKind::Call {
                base, arguments, ..
            } => {
                self.inline_slot(ctx, ast, site, base, state, strict)?;
                self.inline_list(ctx, ast, node, &arguments, state, Filter::Any)?;
            }
            NodeKind::IfClause { condition, .. }
            | NodeKind::ElseifClause { condition, .. }
            | NodeKind::While { condition, .. } => {
                self.inline_slot(ctx, ast, site, condition, state, strict)?;
            }
            NodeKind::ForNumeric { start, end, step, .. } => {
                // Bounds are evaluated once, before the loop starts.
                let outside = ast.scopes.parent(site.scope).unwrap_or(site.scope);
                let site = Site { scope: outside, ..site };
                self.inline_slot(ctx, ast, site, start, state, strict)?;
                self.inline_slot(ctx, ast, site, end, state, strict)?;
                self.inline_slot(ctx, ast, site, step, state, strict)?;
            }
            NodeKind::Function { identifier, .. } => {
                if let Some(name) = ast.nodes.slot_name(identifier).map(str::to_string) {
                    self.inline_prev_identifier(ctx, ast, node, &name, state);
                }
            }
            NodeKind::Index { base, index } => {
                self.inline_slot(ctx, ast, site, base, state, strict)?;
                self.inline_slot(ctx, ast, site, index, state, strict)?;
            }
            NodeKind::Member { base, .. }
            | NodeKind::StringCall { base, .. }
            | NodeKind::TableCall { base, .. } => {
                self.inline_slot(ctx, ast, site, base, state, strict)?;
            }
            NodeKind::Return { arguments } => {
                self.inline_list(ctx, ast, node, &arguments, state, Filter::Any)?;
            }
            NodeKind::TableKey { key, value } => {
                self.inline_slot(ctx, ast, site, key, state, strict)?;
                self.inline_slot(ctx, ast, site, value, state, Filter::Any)?;
            }
            NodeKind::TableKeyString { value, .. } => {
                self.inline_slot(ctx, ast, site, value, state, Filter::Any)?;
            }
            NodeKind::TableValue { value } => {
                let site = Site { tail: true, ..site };
                self.inline_slot(ctx, ast, site, value, state, Filter::Any)?;
            }
            NodeKind::Unary { argument, .. } => {
                self.inline_slot(ctx, ast, site, argument, state, strict)?;
            }
            _ => {}
        }
        Ok(None)
    }

    fn visit_until(
        &mut self,
        ctx: &mut StepContext,
        ast: &mut Ast,
        repeat: NodeId,
        state: &mut LuaState,
    ) -> Result<()> {
        if let NodeKind::Repeat { condition, .. } = ast.kind(repeat).clone() {
            let site = Site {
                node: repeat,
                scope: ast.nodes.scope(repeat),
                tail: false,
            };
            self.inline_slot(ctx, ast, site, condition, state, Filter::NoFunctionOrTable)?;
        }
        Ok(())
    }

    fn post_visit_block(
        &mut self,
        ctx: &mut StepContext,
        ast: &mut Ast,
        block: NodeId,
        state: &mut LuaState,
    ) -> Result<Option<Vec<NodeId>>> {
        let scope = ast.nodes.scope(block);
        for name in ast.scopes.keys(scope) {
            self.check_identifier_inline(ctx, ast, scope, &name, state);
        }
        Ok(None)
    }
}
