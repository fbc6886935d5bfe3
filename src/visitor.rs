use rustc_hash::FxHashSet;
use tracing::error;

use crate::ast::Ast;
use crate::error::{FormatError, Result};
use crate::node::{NodeId, NodeKind};
use crate::stack::ensure_sufficient_stack;
use crate::state::LuaState;

/// The Visitor trait defines the single traversal mechanism for Lua trees.
///
/// Rules:
/// 1. `pre_visit` runs before the children and may return a replacement node;
///    the children of the replacement are the ones walked.
/// 2. Setting `state.skip` in `pre_visit` prunes the children and `post_visit`.
/// 3. `post_visit_block` runs after a block's statements, while its scope is
///    still pushed, and may return a replacement statement list.
/// 4. `post_visit` runs last and may return a replacement node.
pub trait Visitor {
    fn pre_visit(&mut self, _ast: &mut Ast, _node: NodeId, _state: &mut LuaState) -> Result<Option<NodeId>> {
        Ok(None)
    }

    fn post_visit(&mut self, _ast: &mut Ast, _node: NodeId, _state: &mut LuaState) -> Result<Option<NodeId>> {
        Ok(None)
    }

    fn post_visit_block(
        &mut self,
        _ast: &mut Ast,
        _block: NodeId,
        _state: &mut LuaState,
    ) -> Result<Option<Vec<NodeId>>> {
        Ok(None)
    }
}

fn logged<T>(ast: &Ast, node: NodeId, phase: &str, result: Result<T>) -> Result<T> {
    if let Err(e) = &result {
        error!(node = ast.nodes.type_name(node), "{phase} failed: {e}");
    }
    result
}

/// Walks `node` and returns the node that should take its place.
pub fn walk<V: Visitor + ?Sized>(
    visitor: &mut V,
    ast: &mut Ast,
    node: NodeId,
    state: &mut LuaState,
) -> Result<NodeId> {
    ensure_sufficient_stack(|| walk_node(visitor, ast, node, state))
}

fn walk_node<V: Visitor + ?Sized>(
    visitor: &mut V,
    ast: &mut Ast,
    node: NodeId,
    state: &mut LuaState,
) -> Result<NodeId> {
    // Parameters and loop variables are declared during pre-visit, so the
    // block's scope is reset here rather than on push.
    if ast.kind(node).is_code_block() {
        ast.scopes.clear(ast.nodes.scope(node));
    }

    state.skip = false;
    let result = visitor.pre_visit(ast, node, state);
    let node = logged(ast, node, "pre visit", result)?.unwrap_or(node);

    if state.skip {
        state.skip = false;
        return Ok(node);
    }

    walk_children(visitor, ast, node, state)?;

    let result = visitor.post_visit(ast, node, state);
    Ok(logged(ast, node, "post visit", result)?.unwrap_or(node))
}

/// Walks a child slot and writes a replacement back into `parent`.
fn walk_slot<V: Visitor + ?Sized>(
    visitor: &mut V,
    ast: &mut Ast,
    parent: NodeId,
    child: NodeId,
    state: &mut LuaState,
) -> Result<()> {
    let replacement = walk(visitor, ast, child, state)?;
    if replacement != child {
        ast.nodes.replace_child(parent, child, replacement);
    }
    Ok(())
}

fn walk_slots<V: Visitor + ?Sized>(
    visitor: &mut V,
    ast: &mut Ast,
    parent: NodeId,
    children: Vec<NodeId>,
    state: &mut LuaState,
) -> Result<()> {
    for child in children {
        walk_slot(visitor, ast, parent, child, state)?;
    }
    Ok(())
}

pub fn walk_children<V: Visitor + ?Sized>(
    visitor: &mut V,
    ast: &mut Ast,
    node: NodeId,
    state: &mut LuaState,
) -> Result<()> {
    match ast.kind(node).clone() {
        NodeKind::Chunk { .. } | NodeKind::Do { .. } | NodeKind::ElseClause { .. } => {
            walk_block(visitor, ast, node, state)
        }
        NodeKind::IfClause { condition, .. }
        | NodeKind::ElseifClause { condition, .. }
        | NodeKind::While { condition, .. } => {
            walk_slots(visitor, ast, node, condition.into_iter().collect(), state)?;
            walk_block(visitor, ast, node, state)
        }
        // The `until` condition is resolved inside the loop scope.
        NodeKind::Repeat { .. } => walk_block(visitor, ast, node, state),
        NodeKind::Function {
            identifier,
            parameters,
            ..
        } => {
            let mut head: Vec<NodeId> = identifier.into_iter().collect();
            head.extend(parameters);
            walk_slots(visitor, ast, node, head, state)?;
            walk_block(visitor, ast, node, state)
        }
        NodeKind::ForNumeric {
            variable,
            start,
            end,
            step,
            ..
        } => {
            let head = [variable, start, end, step].into_iter().flatten().collect();
            walk_slots(visitor, ast, node, head, state)?;
            walk_block(visitor, ast, node, state)
        }
        NodeKind::ForGeneric {
            variables,
            iterators,
            ..
        } => {
            let mut head = variables;
            head.extend(iterators);
            walk_slots(visitor, ast, node, head, state)?;
            walk_block(visitor, ast, node, state)
        }
        _ => {
            let children = ast.nodes.children(node);
            walk_slots(visitor, ast, node, children, state)
        }
    }
}

/// Walks the statement list of `block` inside its scope.
///
/// Statements are tracked by identity: a callback may remove any statement,
/// including the one being visited, and the walk resumes at the next
/// surviving one.
pub fn walk_block<V: Visitor + ?Sized>(
    visitor: &mut V,
    ast: &mut Ast,
    block: NodeId,
    state: &mut LuaState,
) -> Result<()> {
    let type_name = ast.nodes.type_name(block);
    let missing_body = || FormatError::invalid_node(type_name, "not a block");

    let scope = ast.nodes.scope(block);
    state.push(&ast.scopes, scope);

    let mut visited: FxHashSet<NodeId> = FxHashSet::default();
    let mut cursor = 0;
    loop {
        let body = ast.nodes.body(block).ok_or_else(missing_body)?;
        let Some(&stmt) = body.get(cursor) else {
            break;
        };
        visited.insert(stmt);

        let result = walk(visitor, ast, stmt, state)?;
        visited.insert(result);

        let body = ast.nodes.body_mut(block).ok_or_else(missing_body)?;
        cursor = match body.iter().position(|&s| s == stmt) {
            Some(pos) => {
                body[pos] = result;
                pos + 1
            }
            // The statement is gone, possibly with its neighbours.
            None => body
                .iter()
                .position(|s| !visited.contains(s))
                .unwrap_or(body.len()),
        };
    }

    if let NodeKind::Repeat {
        condition: Some(condition),
        ..
    } = *ast.kind(block)
    {
        walk_slot(visitor, ast, block, condition, state)?;
    }

    let result = visitor.post_visit_block(ast, block, state);
    if let Some(body) = logged(ast, block, "post visit block", result)? {
        *ast.nodes.body_mut(block).ok_or_else(missing_body)? = body;
    }

    state.pop(&mut ast.scopes);
    Ok(())
}
