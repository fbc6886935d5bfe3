//! Conversion between the arena and the serialized (luaparse) schema.
//!
//! Deserialization places every node in the scope Lua would resolve it in:
//! loop bounds, iterators and `if`/`while` conditions live in the enclosing
//! scope, while loop variables, parameters and `until` conditions live in the
//! scope of the block that declares them.

use serde_json::{Map, Value};

use crate::ast::Ast;
use crate::error::{FormatError, Result};
use crate::lexer::numeral_value;
use crate::node::{Indexer, Location, NodeId, NodeKind};
use crate::operator::{BinaryOperator, LogicalOperator, UnaryOperator};
use crate::scope::ScopeId;
use crate::stack::ensure_sufficient_stack;

type Object = Map<String, Value>;

fn object(value: &Value) -> Result<&Object> {
    value
        .as_object()
        .ok_or_else(|| FormatError::invalid_ast(format!("expected a node object, found {value}")))
}

fn type_tag(obj: &Object) -> Result<&str> {
    obj.get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| FormatError::invalid_ast("node without a type tag"))
}

fn location(obj: &Object) -> Result<Option<Location>> {
    match obj.get("loc") {
        None | Some(Value::Null) => Ok(None),
        Some(loc) => serde_json::from_value(loc.clone())
            .map(Some)
            .map_err(|e| FormatError::invalid_ast(format!("malformed loc: {e}"))),
    }
}

fn string_field(obj: &Object, ty: &str, field: &str) -> Result<String> {
    obj.get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| FormatError::invalid_ast(format!("{ty}.{field} is missing or not a string")))
}

fn raw_or(obj: &Object, default: impl FnOnce() -> String) -> String {
    obj.get("raw")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(default)
}

fn in_parens(obj: &Object) -> bool {
    obj.get("inParens").and_then(Value::as_bool).unwrap_or(false)
}

// ═══════════════════════════════════════════════════════════════════════════════
// DESERIALIZE
// ═══════════════════════════════════════════════════════════════════════════════

impl Ast {
    /// Builds the root chunk; its scope has no parent.
    pub(crate) fn chunk_from_serialized(&mut self, value: &Value) -> Result<NodeId> {
        let obj = object(value)?;
        let ty = type_tag(obj)?;
        if ty != "Chunk" {
            return Err(FormatError::invalid_ast(format!("expected Chunk, found {ty}")));
        }
        let own = self.scopes.create(None, None);
        self.block_from_serialized(obj, ty, own, own)
    }

    /// Builds the node described by `value` inside `scope`.
    pub fn node_from_serialized(&mut self, value: &Value, scope: ScopeId) -> Result<NodeId> {
        ensure_sufficient_stack(|| self.load_node(value, scope))
    }

    fn load_node(&mut self, value: &Value, scope: ScopeId) -> Result<NodeId> {
        let obj = object(value)?;
        let ty = type_tag(obj)?;
        let loc = location(obj)?;

        let kind = match ty {
            "Chunk" | "IfClause" | "ElseifClause" | "ElseClause" | "WhileStatement"
            | "DoStatement" | "RepeatStatement" | "FunctionDeclaration"
            | "ForNumericStatement" | "ForGenericStatement" => {
                let own = self.scopes.create(Some(scope), None);
                return self.block_from_serialized(obj, ty, own, scope);
            }
            "LabelStatement" => NodeKind::Label {
                label: Some(self.child(obj, ty, "label", scope)?),
            },
            "BreakStatement" => NodeKind::Break,
            "GotoStatement" => NodeKind::Goto {
                label: Some(self.child(obj, ty, "label", scope)?),
            },
            "ReturnStatement" => NodeKind::Return {
                arguments: self.child_list(obj, ty, "arguments", scope)?,
            },
            "IfStatement" => NodeKind::If {
                clauses: self.child_list(obj, ty, "clauses", scope)?,
            },
            "LocalStatement" => NodeKind::Local {
                variables: self.child_list(obj, ty, "variables", scope)?,
                init: self.child_list(obj, ty, "init", scope)?,
            },
            "AssignmentStatement" => NodeKind::Assignment {
                variables: self.child_list(obj, ty, "variables", scope)?,
                init: self.child_list(obj, ty, "init", scope)?,
            },
            "CallStatement" => NodeKind::CallStatement {
                expression: Some(self.child(obj, ty, "expression", scope)?),
            },
            "Identifier" => NodeKind::Identifier {
                name: string_field(obj, ty, "name")?,
            },
            "StringLiteral" => {
                let value = obj
                    .get("value")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                let raw = raw_or(obj, String::new);
                NodeKind::StringLiteral { value, raw }
            }
            "NumericLiteral" => {
                let raw = obj.get("raw").and_then(Value::as_str);
                let value = obj
                    .get("value")
                    .and_then(Value::as_f64)
                    .or_else(|| raw.and_then(numeral_value))
                    .ok_or_else(|| FormatError::invalid_ast("NumericLiteral.value is missing"))?;
                NodeKind::NumericLiteral {
                    value,
                    raw: raw.map_or_else(|| value.to_string(), str::to_string),
                }
            }
            "BooleanLiteral" => {
                let value = obj
                    .get("value")
                    .and_then(Value::as_bool)
                    .ok_or_else(|| FormatError::invalid_ast("BooleanLiteral.value is missing"))?;
                NodeKind::BooleanLiteral {
                    value,
                    raw: raw_or(obj, || value.to_string()),
                }
            }
            "NilLiteral" => NodeKind::NilLiteral {
                raw: raw_or(obj, || "nil".to_string()),
            },
            "VarargLiteral" => NodeKind::VarargLiteral {
                raw: raw_or(obj, || "...".to_string()),
                in_parens: in_parens(obj),
            },
            "TableKey" => NodeKind::TableKey {
                key: Some(self.child(obj, ty, "key", scope)?),
                value: Some(self.child(obj, ty, "value", scope)?),
            },
            "TableKeyString" => NodeKind::TableKeyString {
                key: Some(self.child(obj, ty, "key", scope)?),
                value: Some(self.child(obj, ty, "value", scope)?),
            },
            "TableValue" => NodeKind::TableValue {
                value: Some(self.child(obj, ty, "value", scope)?),
            },
            "TableConstructorExpression" => NodeKind::TableConstructor {
                fields: self.child_list(obj, ty, "fields", scope)?,
            },
            "UnaryExpression" => NodeKind::Unary {
                operator: UnaryOperator::from_token(&string_field(obj, ty, "operator")?)?,
                argument: Some(self.child(obj, ty, "argument", scope)?),
            },
            "BinaryExpression" => NodeKind::Binary {
                operator: BinaryOperator::from_token(&string_field(obj, ty, "operator")?)?,
                left: Some(self.child(obj, ty, "left", scope)?),
                right: Some(self.child(obj, ty, "right", scope)?),
            },
            "LogicalExpression" => NodeKind::Logical {
                operator: LogicalOperator::from_token(&string_field(obj, ty, "operator")?)?,
                left: Some(self.child(obj, ty, "left", scope)?),
                right: Some(self.child(obj, ty, "right", scope)?),
            },
            "MemberExpression" => {
                let indexer = match string_field(obj, ty, "indexer")?.as_str() {
                    "." => Indexer::Dot,
                    ":" => Indexer::Colon,
                    other => {
                        return Err(FormatError::invalid_ast(format!(
                            "MemberExpression.indexer '{other}' is not '.' or ':'"
                        )))
                    }
                };
                NodeKind::Member {
                    indexer,
                    identifier: Some(self.child(obj, ty, "identifier", scope)?),
                    base: Some(self.child(obj, ty, "base", scope)?),
                }
            }
            "IndexExpression" => NodeKind::Index {
                base: Some(self.child(obj, ty, "base", scope)?),
                index: Some(self.child(obj, ty, "index", scope)?),
            },
            "CallExpression" => NodeKind::Call {
                base: Some(self.child(obj, ty, "base", scope)?),
                arguments: self.child_list(obj, ty, "arguments", scope)?,
                in_parens: in_parens(obj),
            },
            "TableCallExpression" => NodeKind::TableCall {
                base: Some(self.child(obj, ty, "base", scope)?),
                arguments: Some(self.child(obj, ty, "arguments", scope)?),
                in_parens: in_parens(obj),
            },
            "StringCallExpression" => NodeKind::StringCall {
                base: Some(self.child(obj, ty, "base", scope)?),
                argument: Some(self.child(obj, ty, "argument", scope)?),
                in_parens: in_parens(obj),
            },
            "Comment" => NodeKind::Comment {
                value: string_field(obj, ty, "value")?,
                raw: raw_or(obj, String::new),
            },
            other => return Err(FormatError::invalid_ast(format!("unknown node type '{other}'"))),
        };

        Ok(self.nodes.alloc(kind, scope, loc))
    }

    /// Builds a block-bearing node owning `own`; `parent` receives the
    /// expressions Lua evaluates outside the block.
    fn block_from_serialized(
        &mut self,
        obj: &Object,
        ty: &str,
        own: ScopeId,
        parent: ScopeId,
    ) -> Result<NodeId> {
        let loc = location(obj)?;
        let id = self.nodes.alloc(NodeKind::Break, own, loc);
        self.scopes.set_owner(own, id);

        let kind = match ty {
            "Chunk" => {
                let body = self.child_list(obj, ty, "body", own)?;
                let comments = match obj.get("comments") {
                    None | Some(Value::Null) => Vec::new(),
                    Some(_) => self.child_list(obj, ty, "comments", own)?,
                };
                NodeKind::Chunk { body, comments }
            }
            "IfClause" => NodeKind::IfClause {
                condition: Some(self.child(obj, ty, "condition", parent)?),
                body: self.child_list(obj, ty, "body", own)?,
            },
            "ElseifClause" => NodeKind::ElseifClause {
                condition: Some(self.child(obj, ty, "condition", parent)?),
                body: self.child_list(obj, ty, "body", own)?,
            },
            "ElseClause" => NodeKind::ElseClause {
                body: self.child_list(obj, ty, "body", own)?,
            },
            "WhileStatement" => NodeKind::While {
                condition: Some(self.child(obj, ty, "condition", parent)?),
                body: self.child_list(obj, ty, "body", own)?,
            },
            "DoStatement" => NodeKind::Do {
                body: self.child_list(obj, ty, "body", own)?,
            },
            "RepeatStatement" => NodeKind::Repeat {
                condition: Some(self.child(obj, ty, "condition", own)?),
                body: self.child_list(obj, ty, "body", own)?,
            },
            "FunctionDeclaration" => NodeKind::Function {
                identifier: self.optional_child(obj, "identifier", own)?,
                is_local: obj.get("isLocal").and_then(Value::as_bool).unwrap_or(false),
                parameters: self.child_list(obj, ty, "parameters", own)?,
                body: self.child_list(obj, ty, "body", own)?,
            },
            "ForNumericStatement" => NodeKind::ForNumeric {
                variable: Some(self.child(obj, ty, "variable", own)?),
                start: Some(self.child(obj, ty, "start", parent)?),
                end: Some(self.child(obj, ty, "end", parent)?),
                step: self.optional_child(obj, "step", parent)?,
                body: self.child_list(obj, ty, "body", own)?,
            },
            "ForGenericStatement" => NodeKind::ForGeneric {
                variables: self.child_list(obj, ty, "variables", own)?,
                iterators: self.child_list(obj, ty, "iterators", parent)?,
                body: self.child_list(obj, ty, "body", own)?,
            },
            other => return Err(FormatError::invalid_ast(format!("'{other}' is not a block"))),
        };

        *self.nodes.kind_mut(id) = kind;
        Ok(id)
    }

    fn child(&mut self, obj: &Object, ty: &str, field: &str, scope: ScopeId) -> Result<NodeId> {
        self.optional_child(obj, field, scope)?
            .ok_or_else(|| FormatError::invalid_ast(format!("{ty}.{field} is missing")))
    }

    fn optional_child(&mut self, obj: &Object, field: &str, scope: ScopeId) -> Result<Option<NodeId>> {
        match obj.get(field) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => self.node_from_serialized(value, scope).map(Some),
        }
    }

    fn child_list(&mut self, obj: &Object, ty: &str, field: &str, scope: ScopeId) -> Result<Vec<NodeId>> {
        let items = obj
            .get(field)
            .and_then(Value::as_array)
            .ok_or_else(|| FormatError::invalid_ast(format!("{ty}.{field} is missing or not a list")))?;
        items
            .iter()
            .map(|item| self.node_from_serialized(item, scope))
            .collect()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SERIALIZE
// ═══════════════════════════════════════════════════════════════════════════════

impl Ast {
    pub fn node_to_serialized(&self, id: NodeId) -> Result<Value> {
        ensure_sufficient_stack(|| self.store_node(id))
    }

    fn store_node(&self, id: NodeId) -> Result<Value> {
        let node = self.nodes.get(id);
        let ty = node.kind.type_name();
        let mut out = Object::new();
        out.insert("type".into(), Value::from(ty));

        match &node.kind {
            NodeKind::Chunk { body, comments } => {
                out.insert("body".into(), self.list(body)?);
                out.insert("comments".into(), self.list(comments)?);
            }
            NodeKind::Label { label } | NodeKind::Goto { label } => {
                out.insert("label".into(), self.required(ty, *label, "label")?);
            }
            NodeKind::Break => {}
            NodeKind::Return { arguments } => {
                out.insert("arguments".into(), self.list(arguments)?);
            }
            NodeKind::If { clauses } => {
                out.insert("clauses".into(), self.list(clauses)?);
            }
            NodeKind::IfClause { condition, body }
            | NodeKind::ElseifClause { condition, body }
            | NodeKind::While { condition, body }
            | NodeKind::Repeat { condition, body } => {
                out.insert("condition".into(), self.required(ty, *condition, "condition")?);
                out.insert("body".into(), self.list(body)?);
            }
            NodeKind::ElseClause { body } | NodeKind::Do { body } => {
                out.insert("body".into(), self.list(body)?);
            }
            NodeKind::Local { variables, init } | NodeKind::Assignment { variables, init } => {
                out.insert("variables".into(), self.list(variables)?);
                out.insert("init".into(), self.list(init)?);
            }
            NodeKind::CallStatement { expression } => {
                out.insert("expression".into(), self.required(ty, *expression, "expression")?);
            }
            NodeKind::Function {
                identifier,
                is_local,
                parameters,
                body,
            } => {
                out.insert("identifier".into(), self.optional(*identifier)?);
                out.insert("isLocal".into(), Value::Bool(*is_local));
                out.insert("parameters".into(), self.list(parameters)?);
                out.insert("body".into(), self.list(body)?);
            }
            NodeKind::ForNumeric {
                variable,
                start,
                end,
                step,
                body,
            } => {
                out.insert("variable".into(), self.required(ty, *variable, "variable")?);
                out.insert("start".into(), self.required(ty, *start, "start")?);
                out.insert("end".into(), self.required(ty, *end, "end")?);
                out.insert("step".into(), self.optional(*step)?);
                out.insert("body".into(), self.list(body)?);
            }
            NodeKind::ForGeneric {
                variables,
                iterators,
                body,
            } => {
                out.insert("variables".into(), self.list(variables)?);
                out.insert("iterators".into(), self.list(iterators)?);
                out.insert("body".into(), self.list(body)?);
            }
            NodeKind::Identifier { name } => {
                out.insert("name".into(), Value::from(name.as_str()));
            }
            NodeKind::StringLiteral { value, raw } => {
                out.insert("value".into(), Value::from(value.as_str()));
                out.insert("raw".into(), Value::from(raw.as_str()));
            }
            NodeKind::NumericLiteral { value, raw } => {
                let number = serde_json::Number::from_f64(*value).map_or(Value::Null, Value::Number);
                out.insert("value".into(), number);
                out.insert("raw".into(), Value::from(raw.as_str()));
            }
            NodeKind::BooleanLiteral { value, raw } => {
                out.insert("value".into(), Value::Bool(*value));
                out.insert("raw".into(), Value::from(raw.as_str()));
            }
            NodeKind::NilLiteral { raw } => {
                out.insert("value".into(), Value::Null);
                out.insert("raw".into(), Value::from(raw.as_str()));
            }
            NodeKind::VarargLiteral { raw, in_parens } => {
                out.insert("value".into(), Value::from("..."));
                out.insert("raw".into(), Value::from(raw.as_str()));
                insert_parens(&mut out, *in_parens);
            }
            NodeKind::TableKey { key, value } | NodeKind::TableKeyString { key, value } => {
                out.insert("key".into(), self.required(ty, *key, "key")?);
                out.insert("value".into(), self.required(ty, *value, "value")?);
            }
            NodeKind::TableValue { value } => {
                out.insert("value".into(), self.required(ty, *value, "value")?);
            }
            NodeKind::TableConstructor { fields } => {
                out.insert("fields".into(), self.list(fields)?);
            }
            NodeKind::Unary { operator, argument } => {
                out.insert("operator".into(), Value::from(operator.token()));
                out.insert("argument".into(), self.required(ty, *argument, "argument")?);
            }
            NodeKind::Binary { operator, left, right } => {
                out.insert("operator".into(), Value::from(operator.token()));
                out.insert("left".into(), self.required(ty, *left, "left")?);
                out.insert("right".into(), self.required(ty, *right, "right")?);
            }
            NodeKind::Logical { operator, left, right } => {
                out.insert("operator".into(), Value::from(operator.token()));
                out.insert("left".into(), self.required(ty, *left, "left")?);
                out.insert("right".into(), self.required(ty, *right, "right")?);
            }
            NodeKind::Member {
                indexer,
                identifier,
                base,
            } => {
                out.insert("indexer".into(), Value::from(indexer.token()));
                out.insert("identifier".into(), self.required(ty, *identifier, "identifier")?);
                out.insert("base".into(), self.required(ty, *base, "base")?);
            }
            NodeKind::Index { base, index } => {
                out.insert("base".into(), self.required(ty, *base, "base")?);
                out.insert("index".into(), self.required(ty, *index, "index")?);
            }
            NodeKind::Call {
                base,
                arguments,
                in_parens,
            } => {
                out.insert("base".into(), self.required(ty, *base, "base")?);
                out.insert("arguments".into(), self.list(arguments)?);
                insert_parens(&mut out, *in_parens);
            }
            NodeKind::TableCall {
                base,
                arguments,
                in_parens,
            } => {
                out.insert("base".into(), self.required(ty, *base, "base")?);
                out.insert("arguments".into(), self.required(ty, *arguments, "arguments")?);
                insert_parens(&mut out, *in_parens);
            }
            NodeKind::StringCall {
                base,
                argument,
                in_parens,
            } => {
                out.insert("base".into(), self.required(ty, *base, "base")?);
                out.insert("argument".into(), self.required(ty, *argument, "argument")?);
                insert_parens(&mut out, *in_parens);
            }
            NodeKind::Comment { value, raw } => {
                out.insert("value".into(), Value::from(value.as_str()));
                out.insert("raw".into(), Value::from(raw.as_str()));
            }
        }

        if let Some(loc) = node.loc {
            out.insert("loc".into(), serde_json::to_value(loc)?);
        }
        Ok(Value::Object(out))
    }

    fn required(&self, ty: &'static str, slot: Option<NodeId>, field: &str) -> Result<Value> {
        match slot {
            Some(id) => self.node_to_serialized(id),
            None => Err(FormatError::invalid_node(ty, format!("missing {field}"))),
        }
    }

    fn optional(&self, slot: Option<NodeId>) -> Result<Value> {
        slot.map_or(Ok(Value::Null), |id| self.node_to_serialized(id))
    }

    fn list(&self, ids: &[NodeId]) -> Result<Value> {
        ids.iter()
            .map(|&id| self.node_to_serialized(id))
            .collect::<Result<Vec<_>>>()
            .map(Value::Array)
    }
}

fn insert_parens(out: &mut Object, in_parens: bool) {
    if in_parens {
        out.insert("inParens".into(), Value::Bool(true));
    }
}
