//! Lua source printer.
//!
//! Statements are padded by `indent * depth` of the scope they live in, so a
//! tree rewritten by the passes re-indents itself. Block headers and `end`
//! sit one level up from their body. Expressions are printed with the minimal
//! parentheses Lua's operator priorities require.

use crate::ast::Ast;
use crate::codec::opaque_byte;
use crate::error::{FormatError, Result};
use crate::node::{NodeId, NodeKind};
use crate::operator::{ATOM_PRIORITY, UNARY_PRIORITY};
use crate::stack::ensure_sufficient_stack;

/// Widest table constructor still printed on one line.
const MAX_INLINE_WIDTH: usize = 100;

/// Prints `id` as a chunk, statement or expression depending on its kind.
pub fn print(ast: &Ast, id: NodeId, indent: usize) -> Result<String> {
    let printer = Printer { ast, indent };
    match ast.kind(id) {
        NodeKind::Chunk { body, .. } => printer.body(body),
        kind if is_statement(kind) => printer.statement(id),
        _ => {
            let level = ast.scopes.depth(ast.nodes.scope(id));
            printer.expr(id, level)
        }
    }
}

fn is_statement(kind: &NodeKind) -> bool {
    matches!(
        kind,
        NodeKind::Label { .. }
            | NodeKind::Break
            | NodeKind::Goto { .. }
            | NodeKind::Return { .. }
            | NodeKind::If { .. }
            | NodeKind::IfClause { .. }
            | NodeKind::ElseifClause { .. }
            | NodeKind::ElseClause { .. }
            | NodeKind::While { .. }
            | NodeKind::Do { .. }
            | NodeKind::Repeat { .. }
            | NodeKind::Local { .. }
            | NodeKind::Assignment { .. }
            | NodeKind::CallStatement { .. }
            | NodeKind::Function { .. }
            | NodeKind::ForNumeric { .. }
            | NodeKind::ForGeneric { .. }
            | NodeKind::Comment { .. }
    )
}

/// Prefix expressions can be called or indexed without parentheses.
fn is_prefix(kind: &NodeKind) -> bool {
    match kind {
        NodeKind::Identifier { .. } | NodeKind::Member { .. } | NodeKind::Index { .. } => true,
        NodeKind::Call { .. } | NodeKind::TableCall { .. } | NodeKind::StringCall { .. } => true,
        _ => false,
    }
}

struct Printer<'a> {
    ast: &'a Ast,
    indent: usize,
}

impl<'a> Printer<'a> {
    fn kind(&self, id: NodeId) -> &'a NodeKind {
        self.ast.nodes.kind(id)
    }

    fn depth(&self, id: NodeId) -> usize {
        self.ast.scopes.depth(self.ast.nodes.scope(id))
    }

    fn pad(&self, level: usize) -> String {
        " ".repeat(self.indent * level)
    }

    fn required(&self, owner: NodeId, slot: Option<NodeId>, field: &str) -> Result<NodeId> {
        slot.ok_or_else(|| FormatError::invalid_node(self.ast.nodes.type_name(owner), format!("missing {field}")))
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // STATEMENTS
    // ═══════════════════════════════════════════════════════════════════════════

    fn body(&self, body: &[NodeId]) -> Result<String> {
        let lines = body
            .iter()
            .map(|&stmt| self.statement(stmt))
            .collect::<Result<Vec<_>>>()?;
        Ok(lines.join("\n"))
    }

    /// Header, body and footer of a block; an empty body folds onto one line.
    fn block(&self, header: String, body: &[NodeId], footer: &str, pad: &str) -> Result<String> {
        if body.is_empty() {
            return Ok(format!("{header} {footer}"));
        }
        Ok(format!("{header}\n{}\n{pad}{footer}", self.body(body)?))
    }

    fn statement(&self, id: NodeId) -> Result<String> {
        ensure_sufficient_stack(|| self.statement_inner(id))
    }

    fn statement_inner(&self, id: NodeId) -> Result<String> {
        let level = self.depth(id);
        let pad = self.pad(level);
        // Block-bearing statements live in their own scope, one level deeper.
        let up = level.saturating_sub(1);
        let outer = self.pad(up);

        Ok(match self.kind(id) {
            NodeKind::Local { variables, init } => {
                let mut out = format!("{pad}local {}", self.expr_list(variables, level)?);
                if !init.is_empty() {
                    out.push_str(&format!(" = {}", self.expr_list(init, level)?));
                }
                out
            }
            NodeKind::Assignment { variables, init } => format!(
                "{pad}{} = {}",
                self.expr_list(variables, level)?,
                self.expr_list(init, level)?
            ),
            NodeKind::CallStatement { expression } => {
                let expression = self.required(id, *expression, "expression")?;
                format!("{pad}{}", self.expr(expression, level)?)
            }
            NodeKind::Return { arguments } if arguments.is_empty() => format!("{pad}return"),
            NodeKind::Return { arguments } => {
                format!("{pad}return {}", self.expr_list(arguments, level)?)
            }
            NodeKind::Break => format!("{pad}break"),
            NodeKind::Goto { label } => {
                let label = self.required(id, *label, "label")?;
                format!("{pad}goto {}", self.expr(label, level)?)
            }
            NodeKind::Label { label } => {
                let label = self.required(id, *label, "label")?;
                format!("{pad}::{}::", self.expr(label, level)?)
            }
            NodeKind::Comment { value, raw } => {
                if raw.is_empty() {
                    format!("{pad}--{value}")
                } else {
                    format!("{pad}{raw}")
                }
            }
            NodeKind::If { clauses } => self.if_statement(clauses, &pad)?,
            NodeKind::IfClause { .. } | NodeKind::ElseifClause { .. } | NodeKind::ElseClause { .. } => {
                self.clause(id)?.join("\n")
            }
            NodeKind::While { condition, body } => {
                let condition = self.required(id, *condition, "condition")?;
                let header = format!("{outer}while {} do", self.expr(condition, up)?);
                self.block(header, body, "end", &outer)?
            }
            NodeKind::Do { body } => self.block(format!("{outer}do"), body, "end", &outer)?,
            NodeKind::Repeat { condition, body } => {
                let condition = self.required(id, *condition, "condition")?;
                let footer = format!("until {}", self.expr(condition, up)?);
                self.block(format!("{outer}repeat"), body, &footer, &outer)?
            }
            NodeKind::ForNumeric {
                variable,
                start,
                end,
                step,
                body,
            } => {
                let variable = self.required(id, *variable, "variable")?;
                let start = self.required(id, *start, "start")?;
                let end = self.required(id, *end, "end")?;
                let mut header = format!(
                    "{outer}for {} = {}, {}",
                    self.expr(variable, level)?,
                    self.expr(start, up)?,
                    self.expr(end, up)?
                );
                if let Some(step) = step {
                    header.push_str(&format!(", {}", self.expr(*step, up)?));
                }
                header.push_str(" do");
                self.block(header, body, "end", &outer)?
            }
            NodeKind::ForGeneric {
                variables,
                iterators,
                body,
            } => {
                let header = format!(
                    "{outer}for {} in {} do",
                    self.expr_list(variables, level)?,
                    self.expr_list(iterators, up)?
                );
                self.block(header, body, "end", &outer)?
            }
            NodeKind::Function { .. } => format!("{outer}{}", self.function(id)?),
            NodeKind::Chunk { body, .. } => self.body(body)?,
            // An expression in statement position is printed as-is.
            _ => format!("{pad}{}", self.expr(id, level)?),
        })
    }

    fn if_statement(&self, clauses: &[NodeId], pad: &str) -> Result<String> {
        if clauses.is_empty() {
            return Err(FormatError::invalid_node("IfStatement", "no clauses"));
        }
        let mut lines = Vec::new();
        for &clause in clauses {
            lines.extend(self.clause(clause)?);
        }
        let all_empty = clauses
            .iter()
            .all(|&clause| self.ast.nodes.body(clause).map_or(true, Vec::is_empty));
        if clauses.len() == 1 && all_empty {
            return Ok(format!("{} end", lines.join("\n")));
        }
        lines.push(format!("{pad}end"));
        Ok(lines.join("\n"))
    }

    /// Header line plus body lines of one `if` clause.
    fn clause(&self, id: NodeId) -> Result<Vec<String>> {
        let level = self.depth(id);
        let up = level.saturating_sub(1);
        let outer = self.pad(up);
        let (header, body) = match self.kind(id) {
            NodeKind::IfClause { condition, body } => {
                let condition = self.required(id, *condition, "condition")?;
                (format!("{outer}if {} then", self.expr(condition, up)?), body)
            }
            NodeKind::ElseifClause { condition, body } => {
                let condition = self.required(id, *condition, "condition")?;
                (format!("{outer}elseif {} then", self.expr(condition, up)?), body)
            }
            NodeKind::ElseClause { body } => (format!("{outer}else"), body),
            other => {
                return Err(FormatError::invalid_node(
                    "IfStatement",
                    format!("{} is not a clause", other.type_name()),
                ))
            }
        };
        let mut lines = vec![header];
        for &stmt in body {
            lines.push(self.statement(stmt)?);
        }
        Ok(lines)
    }

    /// `[local] function [name](params) body end`, unpadded header.
    fn function(&self, id: NodeId) -> Result<String> {
        let NodeKind::Function {
            identifier,
            is_local,
            parameters,
            body,
        } = self.kind(id)
        else {
            return Err(FormatError::invalid_node("FunctionDeclaration", "not a function"));
        };
        let level = self.depth(id);
        let outer = self.pad(level.saturating_sub(1));

        let mut header = String::new();
        if *is_local && identifier.is_some() {
            header.push_str("local ");
        }
        header.push_str("function");
        if let Some(identifier) = identifier {
            header.push(' ');
            header.push_str(&self.expr(*identifier, level)?);
        }
        header.push_str(&format!("({})", self.expr_list(parameters, level)?));
        self.block(header, body, "end", &outer)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // EXPRESSIONS
    // ═══════════════════════════════════════════════════════════════════════════

    fn expr_list(&self, ids: &[NodeId], level: usize) -> Result<String> {
        let parts = ids
            .iter()
            .map(|&id| self.expr(id, level))
            .collect::<Result<Vec<_>>>()?;
        Ok(parts.join(", "))
    }

    /// Binding powers `(left, right)` seen from outside the expression.
    fn priority(&self, id: NodeId) -> (u8, u8) {
        match self.kind(id) {
            NodeKind::Binary { operator, .. } => operator.priority(),
            NodeKind::Logical { operator, .. } => operator.priority(),
            NodeKind::Unary { .. } => (ATOM_PRIORITY, UNARY_PRIORITY),
            _ => (ATOM_PRIORITY, ATOM_PRIORITY),
        }
    }

    fn wrap(text: String, parens: bool) -> String {
        if parens {
            format!("({text})")
        } else {
            text
        }
    }

    fn operands(
        &self,
        id: NodeId,
        left: Option<NodeId>,
        right: Option<NodeId>,
        priority: (u8, u8),
        level: usize,
    ) -> Result<(String, String)> {
        let left = self.required(id, left, "left")?;
        let right = self.required(id, right, "right")?;
        let left_text = Self::wrap(self.expr(left, level)?, self.priority(left).1 < priority.0);
        let right_text = Self::wrap(self.expr(right, level)?, self.priority(right).0 <= priority.1);
        Ok((left_text, right_text))
    }

    fn prefix_base(&self, id: NodeId, base: Option<NodeId>, level: usize) -> Result<String> {
        let base = self.required(id, base, "base")?;
        Ok(Self::wrap(self.expr(base, level)?, !is_prefix(self.kind(base))))
    }

    fn expr(&self, id: NodeId, level: usize) -> Result<String> {
        ensure_sufficient_stack(|| self.expr_inner(id, level))
    }

    fn expr_inner(&self, id: NodeId, level: usize) -> Result<String> {
        Ok(match self.kind(id) {
            NodeKind::Identifier { name } => name.clone(),
            NodeKind::StringLiteral { value, raw } => string_literal(value, raw),
            NodeKind::NumericLiteral { value, raw } => {
                if raw.is_empty() {
                    value.to_string()
                } else {
                    raw.clone()
                }
            }
            NodeKind::BooleanLiteral { value, .. } => value.to_string(),
            NodeKind::NilLiteral { .. } => "nil".to_string(),
            NodeKind::VarargLiteral { in_parens, .. } => Self::wrap("...".to_string(), *in_parens),
            NodeKind::Function { .. } => self.function(id)?,
            NodeKind::TableConstructor { fields } => self.table(fields, level)?,
            NodeKind::TableKey { key, value } => {
                let key = self.required(id, *key, "key")?;
                let value = self.required(id, *value, "value")?;
                format!("[{}] = {}", self.expr(key, level)?, self.expr(value, level)?)
            }
            NodeKind::TableKeyString { key, value } => {
                let key = self.required(id, *key, "key")?;
                let value = self.required(id, *value, "value")?;
                format!("{} = {}", self.expr(key, level)?, self.expr(value, level)?)
            }
            NodeKind::TableValue { value } => {
                let value = self.required(id, *value, "value")?;
                self.expr(value, level)?
            }
            NodeKind::Unary { operator, argument } => {
                let argument = self.required(id, *argument, "argument")?;
                let text = Self::wrap(
                    self.expr(argument, level)?,
                    self.priority(argument).0 <= UNARY_PRIORITY,
                );
                let token = operator.token();
                if token == "not" || (token == "-" && text.starts_with('-')) {
                    format!("{token} {text}")
                } else {
                    format!("{token}{text}")
                }
            }
            NodeKind::Binary { operator, left, right } => {
                let (l, r) = self.operands(id, *left, *right, operator.priority(), level)?;
                format!("{l} {} {r}", operator.token())
            }
            NodeKind::Logical { operator, left, right } => {
                let (l, r) = self.operands(id, *left, *right, operator.priority(), level)?;
                format!("{l} {} {r}", operator.token())
            }
            NodeKind::Member {
                indexer,
                identifier,
                base,
            } => {
                let identifier = self.required(id, *identifier, "identifier")?;
                format!(
                    "{}{}{}",
                    self.prefix_base(id, *base, level)?,
                    indexer.token(),
                    self.expr(identifier, level)?
                )
            }
            NodeKind::Index { base, index } => {
                let index = self.required(id, *index, "index")?;
                format!("{}[{}]", self.prefix_base(id, *base, level)?, self.expr(index, level)?)
            }
            NodeKind::Call {
                base,
                arguments,
                in_parens,
            } => {
                let text = format!(
                    "{}({})",
                    self.prefix_base(id, *base, level)?,
                    self.expr_list(arguments, level)?
                );
                Self::wrap(text, *in_parens)
            }
            NodeKind::StringCall {
                base,
                argument,
                in_parens,
            } => {
                let argument = self.required(id, *argument, "argument")?;
                let text = format!("{}{}", self.prefix_base(id, *base, level)?, self.expr(argument, level)?);
                Self::wrap(text, *in_parens)
            }
            NodeKind::TableCall {
                base,
                arguments,
                in_parens,
            } => {
                let arguments = self.required(id, *arguments, "arguments")?;
                let text = format!("{}{}", self.prefix_base(id, *base, level)?, self.expr(arguments, level)?);
                Self::wrap(text, *in_parens)
            }
            other => {
                return Err(FormatError::invalid_node(
                    other.type_name(),
                    "statement used as an expression",
                ))
            }
        })
    }

    fn table(&self, fields: &[NodeId], level: usize) -> Result<String> {
        if fields.is_empty() {
            return Ok("{}".to_string());
        }
        let inline = format!("{{{}}}", self.expr_list(fields, level)?);
        if !inline.contains('\n') && inline.len() <= MAX_INLINE_WIDTH {
            return Ok(inline);
        }
        let pad = self.pad(level + 1);
        let lines = fields
            .iter()
            .map(|&field| Ok(format!("{pad}{}", self.expr(field, level + 1)?)))
            .collect::<Result<Vec<_>>>()?;
        Ok(format!("{{\n{}\n{}}}", lines.join(",\n"), self.pad(level)))
    }
}

fn has_opaque_bytes(value: &str) -> bool {
    value.chars().any(|c| opaque_byte(c).is_some())
}

fn string_literal(value: &str, raw: &str) -> String {
    if raw.starts_with('[') || (!raw.is_empty() && has_opaque_bytes(value)) {
        return raw.to_string();
    }
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for c in value.chars() {
        match c {
            '\x07' => out.push_str("\\a"),
            '\x08' => out.push_str("\\b"),
            '\x0C' => out.push_str("\\f"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\x0B' => out.push_str("\\v"),
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            ' '..='~' => out.push(c),
            c if (c as u32) < 0x100 => out.push_str(&format!("\\{:03}", c as u32)),
            c => match opaque_byte(c) {
                Some(byte) => out.push_str(&format!("\\{byte:03}")),
                // Anything wider is written back as its UTF-8 bytes.
                None => {
                    let mut buf = [0u8; 4];
                    for byte in c.encode_utf8(&mut buf).bytes() {
                        out.push_str(&format!("\\{byte:03}"));
                    }
                }
            },
        }
    }
    out.push('\'');
    out
}
