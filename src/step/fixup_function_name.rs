//! Turns `local f = function() end` into `local function f() end`.

use tracing::debug;

use super::{single_write, Pass, StepContext};
use crate::ast::Ast;
use crate::error::Result;
use crate::node::{NodeId, NodeKind};
use crate::state::LuaState;

#[derive(Debug, Default)]
pub struct FixupFunctionNameStep;

impl FixupFunctionNameStep {
    pub fn new() -> Self {
        FixupFunctionNameStep
    }
}

impl Pass for FixupFunctionNameStep {
    const NAME: &'static str = "FixupFunctionNameStep";

    fn pre_visit(
        &mut self,
        ctx: &mut StepContext,
        ast: &mut Ast,
        node: NodeId,
        state: &mut LuaState,
    ) -> Result<Option<NodeId>> {
        let is_local = match ast.kind(node) {
            NodeKind::Local { .. } => true,
            NodeKind::Assignment { .. } => false,
            _ => return Ok(None),
        };
        let Some((variable, function)) = single_write(ast, node) else {
            return Ok(None);
        };
        if !matches!(
            ast.kind(function),
            NodeKind::Function {
                identifier: None,
                ..
            }
        ) {
            return Ok(None);
        }

        match ast.kind(variable) {
            // A named local function sees itself; the anonymous one did not.
            NodeKind::Identifier { name } if ast.nodes.mentions(function, name) => return Ok(None),
            NodeKind::Identifier { .. } => {}
            NodeKind::Member { .. } if !is_local => {}
            _ => return Ok(None),
        }

        if let NodeKind::Function {
            identifier,
            is_local: local,
            ..
        } = ast.nodes.kind_mut(function)
        {
            *identifier = Some(variable);
            *local = is_local;
        }
        let scope = ast.nodes.scope(node);
        let fixed = ast.clone_node(function, scope)?;
        debug!(variable = ast.nodes.type_name(variable), is_local, "fixup function name");

        if is_local {
            if let Some(name) = ast.nodes.name(variable).map(str::to_string) {
                state.alloc(&mut ast.scopes, &mut ast.nodes, &name, true, None);
            }
        }
        state.skip = true;
        ctx.mark_changed();
        Ok(Some(fixed))
    }
}
