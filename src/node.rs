//! Node model for Lua syntax trees.
//!
//! Every production is one variant of [`NodeKind`]. Nodes live in a
//! [`NodeArena`] and refer to their children by [`NodeId`], so passes can
//! compare, remove and replace nodes by identity without juggling borrows.
//! A node that falls out of the tree simply becomes unreachable.

use serde::{Deserialize, Serialize};

use crate::operator::{BinaryOperator, LogicalOperator, UnaryOperator};
use crate::scope::{ScopeId, ValueAllocator};

/// Stable handle of a node inside its arena.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Position {
    pub line: u32,
    pub column: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Location {
    pub start: Position,
    pub end: Position,
}

/// `.` for field access, `:` for method access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Indexer {
    Dot,
    Colon,
}

impl Indexer {
    pub fn token(self) -> &'static str {
        match self {
            Indexer::Dot => ".",
            Indexer::Colon => ":",
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// NODE KINDS
// ═══════════════════════════════════════════════════════════════════════════════

/// One variant per Lua grammar production.
///
/// Optional slots may be empty while a pass is rewriting a node; serializing
/// or printing such a node fails with `InvalidNode`.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Chunk {
        body: Vec<NodeId>,
        comments: Vec<NodeId>,
    },
    Label {
        label: Option<NodeId>,
    },
    Break,
    Goto {
        label: Option<NodeId>,
    },
    Return {
        arguments: Vec<NodeId>,
    },
    If {
        clauses: Vec<NodeId>,
    },
    IfClause {
        condition: Option<NodeId>,
        body: Vec<NodeId>,
    },
    ElseifClause {
        condition: Option<NodeId>,
        body: Vec<NodeId>,
    },
    ElseClause {
        body: Vec<NodeId>,
    },
    While {
        condition: Option<NodeId>,
        body: Vec<NodeId>,
    },
    Do {
        body: Vec<NodeId>,
    },
    Repeat {
        condition: Option<NodeId>,
        body: Vec<NodeId>,
    },
    Local {
        variables: Vec<NodeId>,
        init: Vec<NodeId>,
    },
    Assignment {
        variables: Vec<NodeId>,
        init: Vec<NodeId>,
    },
    CallStatement {
        expression: Option<NodeId>,
    },
    Function {
        identifier: Option<NodeId>,
        is_local: bool,
        parameters: Vec<NodeId>,
        body: Vec<NodeId>,
    },
    ForNumeric {
        variable: Option<NodeId>,
        start: Option<NodeId>,
        end: Option<NodeId>,
        step: Option<NodeId>,
        body: Vec<NodeId>,
    },
    ForGeneric {
        variables: Vec<NodeId>,
        iterators: Vec<NodeId>,
        body: Vec<NodeId>,
    },
    Identifier {
        name: String,
    },
    StringLiteral {
        value: String,
        raw: String,
    },
    NumericLiteral {
        value: f64,
        raw: String,
    },
    BooleanLiteral {
        value: bool,
        raw: String,
    },
    NilLiteral {
        raw: String,
    },
    VarargLiteral {
        raw: String,
        in_parens: bool,
    },
    TableKey {
        key: Option<NodeId>,
        value: Option<NodeId>,
    },
    TableKeyString {
        key: Option<NodeId>,
        value: Option<NodeId>,
    },
    TableValue {
        value: Option<NodeId>,
    },
    TableConstructor {
        fields: Vec<NodeId>,
    },
    Unary {
        operator: UnaryOperator,
        argument: Option<NodeId>,
    },
    Binary {
        operator: BinaryOperator,
        left: Option<NodeId>,
        right: Option<NodeId>,
    },
    Logical {
        operator: LogicalOperator,
        left: Option<NodeId>,
        right: Option<NodeId>,
    },
    Member {
        indexer: Indexer,
        identifier: Option<NodeId>,
        base: Option<NodeId>,
    },
    Index {
        base: Option<NodeId>,
        index: Option<NodeId>,
    },
    Call {
        base: Option<NodeId>,
        arguments: Vec<NodeId>,
        in_parens: bool,
    },
    TableCall {
        base: Option<NodeId>,
        arguments: Option<NodeId>,
        in_parens: bool,
    },
    StringCall {
        base: Option<NodeId>,
        argument: Option<NodeId>,
        in_parens: bool,
    },
    Comment {
        value: String,
        raw: String,
    },
}

impl NodeKind {
    /// The serialized `type` tag of this production.
    pub fn type_name(&self) -> &'static str {
        match self {
            NodeKind::Chunk { .. } => "Chunk",
            NodeKind::Label { .. } => "LabelStatement",
            NodeKind::Break => "BreakStatement",
            NodeKind::Goto { .. } => "GotoStatement",
            NodeKind::Return { .. } => "ReturnStatement",
            NodeKind::If { .. } => "IfStatement",
            NodeKind::IfClause { .. } => "IfClause",
            NodeKind::ElseifClause { .. } => "ElseifClause",
            NodeKind::ElseClause { .. } => "ElseClause",
            NodeKind::While { .. } => "WhileStatement",
            NodeKind::Do { .. } => "DoStatement",
            NodeKind::Repeat { .. } => "RepeatStatement",
            NodeKind::Local { .. } => "LocalStatement",
            NodeKind::Assignment { .. } => "AssignmentStatement",
            NodeKind::CallStatement { .. } => "CallStatement",
            NodeKind::Function { .. } => "FunctionDeclaration",
            NodeKind::ForNumeric { .. } => "ForNumericStatement",
            NodeKind::ForGeneric { .. } => "ForGenericStatement",
            NodeKind::Identifier { .. } => "Identifier",
            NodeKind::StringLiteral { .. } => "StringLiteral",
            NodeKind::NumericLiteral { .. } => "NumericLiteral",
            NodeKind::BooleanLiteral { .. } => "BooleanLiteral",
            NodeKind::NilLiteral { .. } => "NilLiteral",
            NodeKind::VarargLiteral { .. } => "VarargLiteral",
            NodeKind::TableKey { .. } => "TableKey",
            NodeKind::TableKeyString { .. } => "TableKeyString",
            NodeKind::TableValue { .. } => "TableValue",
            NodeKind::TableConstructor { .. } => "TableConstructorExpression",
            NodeKind::Unary { .. } => "UnaryExpression",
            NodeKind::Binary { .. } => "BinaryExpression",
            NodeKind::Logical { .. } => "LogicalExpression",
            NodeKind::Member { .. } => "MemberExpression",
            NodeKind::Index { .. } => "IndexExpression",
            NodeKind::Call { .. } => "CallExpression",
            NodeKind::TableCall { .. } => "TableCallExpression",
            NodeKind::StringCall { .. } => "StringCallExpression",
            NodeKind::Comment { .. } => "Comment",
        }
    }

    /// Kinds that own a scope and a statement list.
    pub fn is_code_block(&self) -> bool {
        self.body().is_some()
    }

    pub fn is_loop(&self) -> bool {
        matches!(
            self,
            NodeKind::While { .. }
                | NodeKind::Repeat { .. }
                | NodeKind::ForNumeric { .. }
                | NodeKind::ForGeneric { .. }
        )
    }

    pub fn is_function(&self) -> bool {
        matches!(self, NodeKind::Function { .. })
    }

    pub fn is_literal(&self) -> bool {
        matches!(
            self,
            NodeKind::StringLiteral { .. }
                | NodeKind::NumericLiteral { .. }
                | NodeKind::BooleanLiteral { .. }
                | NodeKind::NilLiteral { .. }
        )
    }

    pub fn is_table_constructor(&self) -> bool {
        matches!(self, NodeKind::TableConstructor { .. })
    }

    /// Calls and varargs can produce several values.
    pub fn is_multi_value(&self) -> bool {
        match self {
            NodeKind::Call { in_parens, .. }
            | NodeKind::TableCall { in_parens, .. }
            | NodeKind::StringCall { in_parens, .. }
            | NodeKind::VarargLiteral { in_parens, .. } => !*in_parens,
            _ => false,
        }
    }

    pub fn body(&self) -> Option<&Vec<NodeId>> {
        match self {
            NodeKind::Chunk { body, .. }
            | NodeKind::IfClause { body, .. }
            | NodeKind::ElseifClause { body, .. }
            | NodeKind::ElseClause { body }
            | NodeKind::While { body, .. }
            | NodeKind::Do { body }
            | NodeKind::Repeat { body, .. }
            | NodeKind::Function { body, .. }
            | NodeKind::ForNumeric { body, .. }
            | NodeKind::ForGeneric { body, .. } => Some(body),
            _ => None,
        }
    }

    /// Every filled child slot, statement lists included.
    pub fn slots_mut(&mut self) -> Vec<&mut NodeId> {
        let mut out: Vec<&mut NodeId> = Vec::new();
        match self {
            NodeKind::Chunk { body, comments } => {
                out.extend(body.iter_mut());
                out.extend(comments.iter_mut());
            }
            NodeKind::Label { label } | NodeKind::Goto { label } => out.extend(label.iter_mut()),
            NodeKind::Return { arguments } => out.extend(arguments.iter_mut()),
            NodeKind::If { clauses } => out.extend(clauses.iter_mut()),
            NodeKind::IfClause { condition, body }
            | NodeKind::ElseifClause { condition, body }
            | NodeKind::While { condition, body }
            | NodeKind::Repeat { condition, body } => {
                out.extend(condition.iter_mut());
                out.extend(body.iter_mut());
            }
            NodeKind::ElseClause { body } | NodeKind::Do { body } => out.extend(body.iter_mut()),
            NodeKind::Local { variables, init } | NodeKind::Assignment { variables, init } => {
                out.extend(variables.iter_mut());
                out.extend(init.iter_mut());
            }
            NodeKind::CallStatement { expression } => out.extend(expression.iter_mut()),
            NodeKind::Function {
                identifier,
                parameters,
                body,
                ..
            } => {
                out.extend(identifier.iter_mut());
                out.extend(parameters.iter_mut());
                out.extend(body.iter_mut());
            }
            NodeKind::ForNumeric {
                variable,
                start,
                end,
                step,
                body,
            } => {
                out.extend(variable.iter_mut());
                out.extend(start.iter_mut());
                out.extend(end.iter_mut());
                out.extend(step.iter_mut());
                out.extend(body.iter_mut());
            }
            NodeKind::ForGeneric {
                variables,
                iterators,
                body,
            } => {
                out.extend(variables.iter_mut());
                out.extend(iterators.iter_mut());
                out.extend(body.iter_mut());
            }
            NodeKind::TableKey { key, value } | NodeKind::TableKeyString { key, value } => {
                out.extend(key.iter_mut());
                out.extend(value.iter_mut());
            }
            NodeKind::TableValue { value } => out.extend(value.iter_mut()),
            NodeKind::TableConstructor { fields } => out.extend(fields.iter_mut()),
            NodeKind::Unary { argument, .. } => out.extend(argument.iter_mut()),
            NodeKind::Binary { left, right, .. } | NodeKind::Logical { left, right, .. } => {
                out.extend(left.iter_mut());
                out.extend(right.iter_mut());
            }
            NodeKind::Member {
                identifier, base, ..
            } => {
                out.extend(base.iter_mut());
                out.extend(identifier.iter_mut());
            }
            NodeKind::Index { base, index } => {
                out.extend(base.iter_mut());
                out.extend(index.iter_mut());
            }
            NodeKind::Call {
                base, arguments, ..
            } => {
                out.extend(base.iter_mut());
                out.extend(arguments.iter_mut());
            }
            NodeKind::TableCall {
                base, arguments, ..
            } => {
                out.extend(base.iter_mut());
                out.extend(arguments.iter_mut());
            }
            NodeKind::StringCall { base, argument, .. } => {
                out.extend(base.iter_mut());
                out.extend(argument.iter_mut());
            }
            NodeKind::Break
            | NodeKind::Identifier { .. }
            | NodeKind::StringLiteral { .. }
            | NodeKind::NumericLiteral { .. }
            | NodeKind::BooleanLiteral { .. }
            | NodeKind::NilLiteral { .. }
            | NodeKind::VarargLiteral { .. }
            | NodeKind::Comment { .. } => {}
        }
        out
    }

    pub fn body_mut(&mut self) -> Option<&mut Vec<NodeId>> {
        match self {
            NodeKind::Chunk { body, .. }
            | NodeKind::IfClause { body, .. }
            | NodeKind::ElseifClause { body, .. }
            | NodeKind::ElseClause { body }
            | NodeKind::While { body, .. }
            | NodeKind::Do { body }
            | NodeKind::Repeat { body, .. }
            | NodeKind::Function { body, .. }
            | NodeKind::ForNumeric { body, .. }
            | NodeKind::ForGeneric { body, .. } => Some(body),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Node {
    pub kind: NodeKind,
    pub scope: ScopeId,
    pub loc: Option<Location>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// ARENA
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Default)]
pub struct NodeArena {
    nodes: Vec<Node>,
}

impl NodeArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc(&mut self, kind: NodeKind, scope: ScopeId, loc: Option<Location>) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node { kind, scope, loc });
        id
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    pub fn get_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.index()]
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.nodes[id.index()].kind
    }

    pub fn kind_mut(&mut self, id: NodeId) -> &mut NodeKind {
        &mut self.nodes[id.index()].kind
    }

    pub fn scope(&self, id: NodeId) -> ScopeId {
        self.nodes[id.index()].scope
    }

    pub fn type_name(&self, id: NodeId) -> &'static str {
        self.kind(id).type_name()
    }

    /// Name of an identifier node, `None` for anything else.
    pub fn name(&self, id: NodeId) -> Option<&str> {
        match self.kind(id) {
            NodeKind::Identifier { name } => Some(name),
            _ => None,
        }
    }

    pub fn is_identifier(&self, id: NodeId) -> bool {
        matches!(self.kind(id), NodeKind::Identifier { .. })
    }

    /// Identifier name of a slot that may be empty.
    pub fn slot_name(&self, slot: Option<NodeId>) -> Option<&str> {
        slot.and_then(|id| self.name(id))
    }

    pub fn body(&self, block: NodeId) -> Option<&Vec<NodeId>> {
        self.kind(block).body()
    }

    pub fn body_mut(&mut self, block: NodeId) -> Option<&mut Vec<NodeId>> {
        self.kind_mut(block).body_mut()
    }

    /// Removes `child` from the statement list of `block` by identity.
    pub fn remove_child(&mut self, block: NodeId, child: NodeId) -> bool {
        let Some(body) = self.body_mut(block) else {
            return false;
        };
        match body.iter().position(|&stmt| stmt == child) {
            Some(at) => {
                body.remove(at);
                true
            }
            None => false,
        }
    }

    /// Points the slot of `parent` holding `old` at `new`.
    pub fn replace_child(&mut self, parent: NodeId, old: NodeId, new: NodeId) -> bool {
        match self
            .kind_mut(parent)
            .slots_mut()
            .into_iter()
            .find(|slot| **slot == old)
        {
            Some(slot) => {
                *slot = new;
                true
            }
            None => false,
        }
    }

    /// Direct children in visiting order, empty slots skipped.
    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let opt = |slot: &Option<NodeId>, out: &mut Vec<NodeId>| {
            if let Some(child) = slot {
                out.push(*child);
            }
        };
        match self.kind(id) {
            NodeKind::Chunk { body, .. } | NodeKind::ElseClause { body } | NodeKind::Do { body } => {
                out.extend(body)
            }
            NodeKind::Label { label } | NodeKind::Goto { label } => opt(label, &mut out),
            NodeKind::Return { arguments } => out.extend(arguments),
            NodeKind::If { clauses } => out.extend(clauses),
            NodeKind::IfClause { condition, body }
            | NodeKind::ElseifClause { condition, body }
            | NodeKind::While { condition, body } => {
                opt(condition, &mut out);
                out.extend(body);
            }
            NodeKind::Repeat { condition, body } => {
                out.extend(body);
                opt(condition, &mut out);
            }
            NodeKind::Local { variables, init } | NodeKind::Assignment { variables, init } => {
                out.extend(variables);
                out.extend(init);
            }
            NodeKind::CallStatement { expression } => opt(expression, &mut out),
            NodeKind::Function {
                identifier,
                parameters,
                body,
                ..
            } => {
                opt(identifier, &mut out);
                out.extend(parameters);
                out.extend(body);
            }
            NodeKind::ForNumeric {
                variable,
                start,
                end,
                step,
                body,
            } => {
                opt(variable, &mut out);
                opt(start, &mut out);
                opt(end, &mut out);
                opt(step, &mut out);
                out.extend(body);
            }
            NodeKind::ForGeneric {
                variables,
                iterators,
                body,
            } => {
                out.extend(variables);
                out.extend(iterators);
                out.extend(body);
            }
            NodeKind::TableKey { key, value } | NodeKind::TableKeyString { key, value } => {
                opt(key, &mut out);
                opt(value, &mut out);
            }
            NodeKind::TableValue { value } => opt(value, &mut out),
            NodeKind::TableConstructor { fields } => out.extend(fields),
            NodeKind::Unary { argument, .. } => opt(argument, &mut out),
            NodeKind::Binary { left, right, .. } | NodeKind::Logical { left, right, .. } => {
                opt(left, &mut out);
                opt(right, &mut out);
            }
            NodeKind::Member {
                identifier, base, ..
            } => {
                opt(base, &mut out);
                opt(identifier, &mut out);
            }
            NodeKind::Index { base, index } => {
                opt(base, &mut out);
                opt(index, &mut out);
            }
            NodeKind::Call {
                base, arguments, ..
            } => {
                opt(base, &mut out);
                out.extend(arguments);
            }
            NodeKind::TableCall {
                base, arguments, ..
            } => {
                opt(base, &mut out);
                opt(arguments, &mut out);
            }
            NodeKind::StringCall { base, argument, .. } => {
                opt(base, &mut out);
                opt(argument, &mut out);
            }
            NodeKind::Break
            | NodeKind::Identifier { .. }
            | NodeKind::StringLiteral { .. }
            | NodeKind::NumericLiteral { .. }
            | NodeKind::BooleanLiteral { .. }
            | NodeKind::NilLiteral { .. }
            | NodeKind::VarargLiteral { .. }
            | NodeKind::Comment { .. } => {}
        }
        out
    }

    /// Child slots whose identifiers count as reads of this node.
    ///
    /// Declarations (loop variables, local names), field names and labels
    /// are not reads. Bodies of nested blocks are not exposed either.
    pub fn reference_slots(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let push = |slot: &Option<NodeId>, out: &mut Vec<NodeId>| {
            if let Some(child) = slot {
                out.push(*child);
            }
        };
        match self.kind(id) {
            NodeKind::Identifier { .. } => out.push(id),
            NodeKind::Return { arguments } => out.extend(arguments),
            NodeKind::If { clauses } => out.extend(clauses),
            NodeKind::IfClause { condition, .. }
            | NodeKind::ElseifClause { condition, .. }
            | NodeKind::While { condition, .. }
            | NodeKind::Repeat { condition, .. } => push(condition, &mut out),
            NodeKind::Local { init, .. } | NodeKind::Assignment { init, .. } => out.extend(init),
            NodeKind::CallStatement { expression } => push(expression, &mut out),
            NodeKind::ForNumeric {
                start, end, step, ..
            } => {
                push(start, &mut out);
                push(end, &mut out);
                push(step, &mut out);
            }
            NodeKind::ForGeneric { iterators, .. } => out.extend(iterators),
            NodeKind::TableKey { key, value } => {
                push(key, &mut out);
                push(value, &mut out);
            }
            NodeKind::TableKeyString { value, .. } | NodeKind::TableValue { value } => {
                push(value, &mut out)
            }
            NodeKind::TableConstructor { fields } => out.extend(fields),
            NodeKind::Unary { argument, .. } => push(argument, &mut out),
            NodeKind::Binary { left, right, .. } | NodeKind::Logical { left, right, .. } => {
                push(left, &mut out);
                push(right, &mut out);
            }
            NodeKind::Member { base, .. } => push(base, &mut out),
            NodeKind::Index { base, index } => {
                push(base, &mut out);
                push(index, &mut out);
            }
            NodeKind::Call {
                base, arguments, ..
            } => {
                push(base, &mut out);
                out.extend(arguments);
            }
            NodeKind::TableCall {
                base, arguments, ..
            } => {
                push(base, &mut out);
                push(arguments, &mut out);
            }
            NodeKind::StringCall { base, argument, .. } => {
                push(base, &mut out);
                push(argument, &mut out);
            }
            _ => {}
        }
        out
    }

    /// Identifiers read by this node, in child order.
    pub fn references(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if self.is_identifier(current) {
                out.push(current);
            } else {
                stack.extend(self.reference_slots(current).into_iter().rev());
            }
        }
        out
    }

    pub fn has_reference(&self, id: NodeId, name: &str) -> bool {
        self.references(id)
            .into_iter()
            .any(|r| self.name(r) == Some(name))
    }

    /// Deep search for an identifier named `name`, function bodies included.
    pub fn mentions(&self, id: NodeId, name: &str) -> bool {
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if self.name(current) == Some(name) {
                return true;
            }
            stack.extend(self.children(current));
        }
        false
    }

    /// Whether evaluating this expression may call into user code.
    pub fn has_side_effects(&self, id: NodeId) -> bool {
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            match self.kind(current) {
                NodeKind::Call { .. } | NodeKind::TableCall { .. } | NodeKind::StringCall { .. } => {
                    return true
                }
                // Building a closure runs nothing.
                NodeKind::Function { .. } => continue,
                _ => stack.extend(self.children(current)),
            }
        }
        false
    }

    /// Every node reachable from `id`, `id` included.
    pub fn subtree(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            out.push(current);
            stack.extend(self.children(current));
        }
        out
    }
}

impl ValueAllocator for NodeArena {
    fn alloc_value(&mut self, scope: ScopeId) -> NodeId {
        self.alloc(
            NodeKind::NilLiteral {
                raw: "nil".to_string(),
            },
            scope,
            None,
        )
    }
}
