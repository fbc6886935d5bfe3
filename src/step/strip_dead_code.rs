//! Removes writes nothing reads.
//!
//! A binding whose last write has no reads by the end of its block is dead.
//! Side effects survive: a dead `local x = f()` becomes the call statement
//! `f()`, and any other impure init keeps its statement. Writes that are
//! overwritten before being read are dropped when the overwrite arrives.

use rustc_hash::FxHashSet;
use tracing::debug;

use super::{is_captured, is_within_function, is_within_loop, write_scope, Pass, StepContext};
use crate::ast::Ast;
use crate::error::Result;
use crate::node::{NodeId, NodeKind};
use crate::scope::ScopeId;
use crate::state::LuaState;

#[derive(Debug, Default)]
pub struct StripDeadCodeStep;

impl StripDeadCodeStep {
    pub fn new() -> Self {
        StripDeadCodeStep
    }
}

/// Puts `new` in place of `statement` in the nearest statement list holding it.
fn replace_statement(ast: &mut Ast, statement: NodeId, new: NodeId) -> bool {
    let mut scope = Some(ast.nodes.scope(statement));
    while let Some(id) = scope {
        if let Some(owner) = ast.scopes.owner(id) {
            if let Some(body) = ast.nodes.body_mut(owner) {
                if let Some(slot) = body.iter_mut().find(|stmt| **stmt == statement) {
                    *slot = new;
                    return true;
                }
            }
        }
        scope = ast.scopes.parent(id);
    }
    false
}

fn is_call(kind: &NodeKind) -> bool {
    matches!(
        kind,
        NodeKind::Call { .. } | NodeKind::TableCall { .. } | NodeKind::StringCall { .. }
    )
}

enum Verdict {
    Keep,
    Remove,
    /// Only the call of the init survives.
    KeepCall(NodeId),
    /// Some names of a multi-name local were dropped in place.
    Stripped,
}

impl StripDeadCodeStep {
    fn is_pure(&self, ast: &Ast, init: &[NodeId]) -> bool {
        init.iter().all(|&value| !ast.nodes.has_side_effects(value))
    }

    /// Every write of `name` happens outside loops and nested functions
    /// relative to `scope`, and no nested function ever reads it.
    ///
    /// A closure may run after any later write, so a name it reads has no
    /// provably dead write.
    fn writes_are_straight(&self, ast: &Ast, scope: ScopeId, name: &str) -> bool {
        let Some(storage) = ast.scopes.storage(scope, name) else {
            return false;
        };
        !is_captured(ast, scope, name)
            && storage.writes().iter().all(|&write| {
                let inner = write_scope(ast, write);
                !is_within_loop(ast, scope, inner) && !is_within_function(ast, scope, inner)
            })
    }

    fn judge(&self, ast: &mut Ast, scope: ScopeId, statement: NodeId) -> Verdict {
        match ast.kind(statement).clone() {
            NodeKind::Local { variables, init } if variables.len() > 1 => {
                self.strip_local(ast, scope, statement, variables, init)
            }
            NodeKind::Local { init, .. } | NodeKind::Assignment { init, .. } => match init.as_slice() {
                [] => Verdict::Remove,
                [value] if is_call(ast.kind(*value)) => Verdict::KeepCall(*value),
                _ if self.is_pure(ast, &init) => Verdict::Remove,
                _ => Verdict::Keep,
            },
            _ => Verdict::Keep,
        }
    }

    /// Drops the unread names of a multi-name local.
    ///
    /// A name goes together with its init, and only when that leaves the
    /// other names with the values they had.
    fn strip_local(
        &self,
        ast: &mut Ast,
        scope: ScopeId,
        statement: NodeId,
        mut variables: Vec<NodeId>,
        mut init: Vec<NodeId>,
    ) -> Verdict {
        let dead = |ast: &Ast, variable: NodeId| {
            ast.nodes.name(variable).map_or(false, |name| {
                ast.scopes.storage(scope, name).map_or(false, |storage| {
                    storage.reference_count() == 0 && storage.last_statement() == Some(statement)
                })
            })
        };

        if variables.iter().all(|&v| dead(&*ast, v)) {
            return if self.is_pure(ast, &init) {
                Verdict::Remove
            } else {
                Verdict::Keep
            };
        }

        let mut stripped = false;
        for i in (0..variables.len()).rev() {
            if variables.len() == 1 || !dead(&*ast, variables[i]) {
                continue;
            }
            let paired = init.len() == variables.len();
            if paired && !ast.nodes.has_side_effects(init[i]) {
                variables.remove(i);
                init.remove(i);
                stripped = true;
            } else if i >= init.len() && i + 1 == variables.len() {
                // Trailing name fed by the last multi-value init.
                variables.remove(i);
                stripped = true;
            }
        }
        if !stripped {
            return Verdict::Keep;
        }

        debug!(remain = variables.len(), "strip local variables");
        if let NodeKind::Local {
            variables: slot_variables,
            init: slot_init,
        } = ast.nodes.kind_mut(statement)
        {
            *slot_variables = variables;
            *slot_init = init;
        }
        Verdict::Stripped
    }

    /// Drops the previous unread write of a variable this assignment
    /// overwrites.
    fn strip_superseded(
        &self,
        ctx: &mut StepContext,
        ast: &mut Ast,
        node: NodeId,
        state: &LuaState,
    ) -> Option<NodeId> {
        let NodeKind::Assignment { variables, init } = ast.kind(node).clone() else {
            return None;
        };
        let [variable] = variables.as_slice() else {
            return None;
        };
        let name = ast.nodes.name(*variable)?.to_string();
        if state.is_global(&ast.scopes, &name) || state.reference_count(&ast.scopes, &name) > 0 {
            return None;
        }
        // The new value still needs the old one.
        if init.iter().any(|&value| ast.nodes.mentions(value, &name)) {
            return None;
        }

        let prev = state.last_statement(&ast.scopes, &name)?;
        if prev == node {
            return None;
        }
        // A closure may observe the previous value between the two writes.
        let owner = state.owner_of(&ast.scopes, &name)?;
        if is_captured(ast, owner, &name) {
            return None;
        }
        let (prev_is_local, prev_init) = match ast.kind(prev) {
            NodeKind::Local { variables, init } if variables.len() == 1 => (true, init.clone()),
            NodeKind::Assignment { variables, init } if variables.len() == 1 => (false, init.clone()),
            _ => return None,
        };
        if !self.is_pure(ast, &prev_init) {
            return None;
        }

        let scope = ast.nodes.scope(node);
        let prev_scope = write_scope(ast, prev);
        if !ast.scopes.is_child(prev_scope, scope) {
            return None;
        }
        let through_do = ast
            .scopes
            .chain_between(prev_scope, scope)
            .into_iter()
            .all(|id| {
                ast.scopes
                    .owner(id)
                    .map_or(false, |owner| matches!(ast.kind(owner), NodeKind::Do { .. }))
            });
        if !through_do {
            return None;
        }

        debug!(%name, "strip superseded write");
        if !prev_is_local {
            ctx.remove_node(ast, prev);
            return None;
        }
        if prev_scope != scope {
            // The declaration stays where it scopes the name.
            if let NodeKind::Local { init, .. } = ast.nodes.kind_mut(prev) {
                if !init.is_empty() {
                    init.clear();
                    ctx.mark_changed();
                }
            }
            return None;
        }

        ctx.remove_node(ast, prev);
        ctx.mark_changed();
        let declaration = ast
            .nodes
            .alloc(NodeKind::Local { variables, init }, scope, None);
        Some(declaration)
    }
}

impl Pass for StripDeadCodeStep {
    const NAME: &'static str = "StripDeadCodeStep";

    fn pre_visit(
        &mut self,
        ctx: &mut StepContext,
        ast: &mut Ast,
        node: NodeId,
        state: &mut LuaState,
    ) -> Result<Option<NodeId>> {
        Ok(self.strip_superseded(ctx, ast, node, state))
    }

    fn post_visit_block(
        &mut self,
        ctx: &mut StepContext,
        ast: &mut Ast,
        block: NodeId,
        state: &mut LuaState,
    ) -> Result<Option<Vec<NodeId>>> {
        let scope = ast.nodes.scope(block);
        let mut seen = FxHashSet::default();

        for name in ast.scopes.keys(scope) {
            if state.is_global(&ast.scopes, &name) {
                continue;
            }
            let Some(storage) = ast.scopes.storage(scope, &name) else {
                continue;
            };
            let Some(statement) = storage.last_statement() else {
                continue;
            };
            if storage.reference_count() > 0 || !seen.insert(statement) {
                continue;
            }

            match ast.kind(statement) {
                NodeKind::ForGeneric { .. } | NodeKind::ForNumeric { .. } | NodeKind::Function { .. } => {
                    continue
                }
                NodeKind::Assignment { variables, .. } if variables.len() > 1 => continue,
                _ => {}
            }
            if !self.writes_are_straight(ast, scope, &name) {
                continue;
            }

            match self.judge(ast, scope, statement) {
                Verdict::Keep => {}
                Verdict::Remove => {
                    debug!(%name, statement = ast.nodes.type_name(statement), "found dead code");
                    ctx.remove_node(ast, statement);
                    ctx.rearm();
                }
                Verdict::KeepCall(call) => {
                    match ast.nodes.kind_mut(call) {
                        NodeKind::Call { in_parens, .. }
                        | NodeKind::TableCall { in_parens, .. }
                        | NodeKind::StringCall { in_parens, .. } => *in_parens = false,
                        _ => {}
                    }
                    let call_scope = ast.nodes.scope(statement);
                    let replacement = ast.nodes.alloc(
                        NodeKind::CallStatement {
                            expression: Some(call),
                        },
                        call_scope,
                        None,
                    );
                    if replace_statement(ast, statement, replacement) {
                        debug!(%name, "dead write reduced to call");
                        ctx.mark_changed();
                        ctx.rearm();
                    }
                }
                Verdict::Stripped => {
                    ctx.mark_changed();
                    ctx.rearm();
                }
            }
        }
        Ok(None)
    }
}
