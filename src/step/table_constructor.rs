//! Folds field assignments into the table constructor they follow.
//!
//! ```lua
//! local t = {}
//! t.x = 1
//! t[2] = "b"
//! ```
//!
//! becomes `local t = {x = 1, [2] = "b"}`.

use tracing::debug;

use super::{captures_live, single_write, Pass, StepContext};
use crate::ast::Ast;
use crate::error::Result;
use crate::node::{NodeId, NodeKind};
use crate::state::LuaState;

#[derive(Debug, Default)]
pub struct TableConstructorStep;

impl TableConstructorStep {
    pub fn new() -> Self {
        TableConstructorStep
    }
}

/// The field a folded assignment contributes: key and value source nodes.
enum FieldSource {
    Keyed(NodeId, NodeId),
    Named(NodeId, NodeId),
}

fn field_source(ast: &Ast, target: NodeId, value: NodeId) -> Option<(NodeId, FieldSource)> {
    match ast.kind(target) {
        NodeKind::Index {
            base: Some(base),
            index: Some(index),
        } => {
            let literal_key = matches!(
                ast.kind(*index),
                NodeKind::BooleanLiteral { .. }
                    | NodeKind::NilLiteral { .. }
                    | NodeKind::NumericLiteral { .. }
                    | NodeKind::StringLiteral { .. }
            );
            literal_key.then_some((*base, FieldSource::Keyed(*index, value)))
        }
        NodeKind::Member {
            base: Some(base),
            identifier: Some(identifier),
            ..
        } => Some((*base, FieldSource::Named(*identifier, value))),
        _ => None,
    }
}

/// Statement position of `statement` inside the body of `block`.
fn position(ast: &Ast, block: Option<NodeId>, statement: NodeId) -> Option<usize> {
    ast.nodes
        .body(block?)?
        .iter()
        .position(|&stmt| stmt == statement)
}

impl Pass for TableConstructorStep {
    const NAME: &'static str = "TableConstructorStep";

    fn pre_visit(
        &mut self,
        ctx: &mut StepContext,
        ast: &mut Ast,
        node: NodeId,
        state: &mut LuaState,
    ) -> Result<Option<NodeId>> {
        let Some((target, value)) = single_write(ast, node) else {
            return Ok(None);
        };
        if !matches!(ast.kind(node), NodeKind::Assignment { .. }) {
            return Ok(None);
        }
        let Some((base, source)) = field_source(ast, target, value) else {
            return Ok(None);
        };
        let Some(name) = ast.nodes.name(base).map(str::to_string) else {
            return Ok(None);
        };
        if state.is_global(&ast.scopes, &name) || state.reference_count(&ast.scopes, &name) > 0 {
            return Ok(None);
        }

        let (Some(statement), Some(table)) = (
            state.last_statement(&ast.scopes, &name),
            state.value(&ast.scopes, &name),
        ) else {
            return Ok(None);
        };
        let scope = ast.nodes.scope(node);
        if !ast.kind(table).is_table_constructor()
            || single_write(ast, statement).map(|(_, init)| init) != Some(table)
            || ast.nodes.scope(statement) != scope
        {
            return Ok(None);
        }
        if ast.nodes.mentions(value, &name) || !captures_live(ast, state, table, statement) {
            return Ok(None);
        }

        // The declaration moves down to this assignment; the constructor's
        // fields must not observe anything that runs in between.
        let owner = ast.scopes.owner(scope);
        let (Some(at), Some(here)) = (position(ast, owner, statement), position(ast, owner, node)) else {
            return Ok(None);
        };
        if at + 1 != here && ast.nodes.has_side_effects(table) {
            return Ok(None);
        }

        // The assignment is dropped, so its key and value move into the field.
        let field = match source {
            FieldSource::Keyed(key, value) => NodeKind::TableKey {
                key: Some(key),
                value: Some(value),
            },
            FieldSource::Named(key, value) => NodeKind::TableKeyString {
                key: Some(key),
                value: Some(value),
            },
        };
        let field = ast.nodes.alloc(field, ast.nodes.scope(table), None);
        if let NodeKind::TableConstructor { fields } = ast.nodes.kind_mut(table) {
            fields.push(field);
        }
        debug!(%name, "fold table field");

        ctx.remove_node(ast, statement);
        ctx.mark_changed();
        ctx.rearm();
        Ok(Some(statement))
    }
}
