//! Lua 5.3 parser.
//!
//! Recursive descent over the token stream of [`crate::lexer`]. The output is
//! the serialized tree schema (`type` tags, `loc`, `inParens`) that
//! [`Ast::from_serialized`](crate::ast::Ast::from_serialized) consumes, so a
//! parsed chunk and a chunk loaded from JSON go through the same path.

use serde_json::{json, Map, Value};

use crate::error::{FormatError, Result};
use crate::lexer::{
    long_bracket_content, long_bracket_level, numeral_value, string_value, tokenize, Lexeme, LineIndex, Token,
};
use crate::operator::{BinaryOperator, LogicalOperator, UNARY_PRIORITY};
use crate::stack::ensure_sufficient_stack;

/// Parses `source` into a serialized `Chunk`.
pub fn parse(source: &str) -> Result<Value> {
    Parser::new(source)?.chunk()
}

fn binding_power(op: &str) -> Result<(u8, u8)> {
    match op {
        "and" | "or" => LogicalOperator::from_token(op).map(LogicalOperator::priority),
        _ => BinaryOperator::from_token(op).map(BinaryOperator::priority),
    }
}

/// Builds a node object, moving the children in.
fn object<const N: usize>(entries: [(&str, Value); N]) -> Value {
    let map: Map<String, Value> = entries
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect();
    Value::Object(map)
}

fn is_call(value: &Value) -> bool {
    matches!(
        value.get("type").and_then(Value::as_str),
        Some("CallExpression" | "StringCallExpression" | "TableCallExpression")
    )
}

fn is_assignable(value: &Value) -> bool {
    let in_parens = value.get("inParens").and_then(Value::as_bool).unwrap_or(false);
    !in_parens
        && matches!(
            value.get("type").and_then(Value::as_str),
            Some("Identifier" | "MemberExpression" | "IndexExpression")
        )
}

struct Parser<'src> {
    source: &'src str,
    lines: LineIndex,
    tokens: Vec<Lexeme>,
    pos: usize,
    comments: Vec<Value>,
}

impl<'src> Parser<'src> {
    fn new(source: &'src str) -> Result<Self> {
        let lines = LineIndex::new(source);
        let mut parser = Parser {
            source,
            lines,
            tokens: Vec::new(),
            pos: 0,
            comments: Vec::new(),
        };

        for lexeme in tokenize(source)? {
            if lexeme.token == Token::Comment {
                let raw = &source[lexeme.span.clone()];
                let body = &raw[2..];
                let value = if long_bracket_level(body).is_some() {
                    long_bracket_content(body)
                } else {
                    body
                };
                let comment = object([("value", Value::from(value)), ("raw", Value::from(raw))]);
                let comment = parser.located("Comment", lexeme.span.start, lexeme.span.end, comment);
                parser.comments.push(comment);
            } else {
                parser.tokens.push(lexeme);
            }
        }
        Ok(parser)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // TOKEN CURSOR
    // ═══════════════════════════════════════════════════════════════════════════

    fn peek(&self) -> Option<Token> {
        self.peek_at(0)
    }

    fn peek_at(&self, ahead: usize) -> Option<Token> {
        self.tokens.get(self.pos + ahead).map(|lexeme| lexeme.token)
    }

    fn check(&self, token: Token) -> bool {
        self.peek() == Some(token)
    }

    fn eat(&mut self, token: Token) -> bool {
        let found = self.check(token);
        if found {
            self.pos += 1;
        }
        found
    }

    fn advance(&mut self) -> Option<Lexeme> {
        let lexeme = self.tokens.get(self.pos).cloned();
        if lexeme.is_some() {
            self.pos += 1;
        }
        lexeme
    }

    fn text(&self, lexeme: &Lexeme) -> &'src str {
        self.source.get(lexeme.span.clone()).unwrap_or_default()
    }

    /// Byte offset where the next token starts.
    fn offset(&self) -> usize {
        self.tokens
            .get(self.pos)
            .map_or(self.source.len(), |lexeme| lexeme.span.start)
    }

    /// Byte offset where the last consumed token ends.
    fn last_end(&self) -> usize {
        self.pos
            .checked_sub(1)
            .and_then(|at| self.tokens.get(at))
            .map_or(0, |lexeme| lexeme.span.end)
    }

    fn error(&self, message: impl std::fmt::Display) -> FormatError {
        let at = self.lines.position(self.source, self.offset());
        let near = match self.tokens.get(self.pos) {
            Some(lexeme) => self.text(lexeme),
            None => "<eof>",
        };
        FormatError::syntax(at.line, at.column, format!("{message} near '{near}'"))
    }

    fn expect(&mut self, token: Token, what: &str) -> Result<Lexeme> {
        if self.check(token) {
            if let Some(lexeme) = self.advance() {
                return Ok(lexeme);
            }
        }
        Err(self.error(format!("'{what}' expected")))
    }

    /// `end` closing the block `opener` started at `start`.
    fn expect_end(&mut self, opener: &str, start: usize) -> Result<()> {
        if self.eat(Token::End) {
            return Ok(());
        }
        let line = self.lines.position(self.source, start).line;
        Err(self.error(format!("'end' expected (to close '{opener}' at line {line})")))
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // NODE BUILDING
    // ═══════════════════════════════════════════════════════════════════════════

    fn located(&self, ty: &str, start: usize, end: usize, mut value: Value) -> Value {
        if let Value::Object(map) = &mut value {
            let start = self.lines.position(self.source, start);
            let end = self.lines.position(self.source, end);
            map.insert("type".into(), Value::from(ty));
            map.insert(
                "loc".into(),
                json!({
                    "start": { "line": start.line, "column": start.column },
                    "end": { "line": end.line, "column": end.column },
                }),
            );
        }
        value
    }

    /// Tags `value` as a `ty` node spanning from `start` to the last token.
    fn finish(&self, ty: &str, start: usize, value: Value) -> Value {
        self.located(ty, start, self.last_end(), value)
    }

    fn name(&mut self) -> Result<Value> {
        let start = self.offset();
        let lexeme = self.expect(Token::Name, "<name>")?;
        let name = self.text(&lexeme);
        Ok(self.finish("Identifier", start, object([("name", Value::from(name))])))
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // STATEMENTS
    // ═══════════════════════════════════════════════════════════════════════════

    fn chunk(mut self) -> Result<Value> {
        let body = self.block()?;
        if self.peek().is_some() {
            return Err(self.error("'<eof>' expected"));
        }
        let comments = std::mem::take(&mut self.comments);
        Ok(self.located(
            "Chunk",
            0,
            self.source.len(),
            object([("body", Value::Array(body)), ("comments", Value::Array(comments))]),
        ))
    }

    fn block(&mut self) -> Result<Vec<Value>> {
        let mut body = Vec::new();
        loop {
            match self.peek() {
                None | Some(Token::End | Token::Else | Token::Elseif | Token::Until) => break,
                Some(Token::Return) => {
                    body.push(self.return_statement()?);
                    break;
                }
                Some(Token::Semicolon) => self.pos += 1,
                Some(_) => body.push(self.statement()?),
            }
        }
        Ok(body)
    }

    fn block_follows(&self) -> bool {
        matches!(
            self.peek(),
            None | Some(Token::End | Token::Else | Token::Elseif | Token::Until)
        )
    }

    fn return_statement(&mut self) -> Result<Value> {
        let start = self.offset();
        self.expect(Token::Return, "return")?;
        let arguments = if self.block_follows() || self.check(Token::Semicolon) {
            Vec::new()
        } else {
            self.expression_list()?
        };
        self.eat(Token::Semicolon);
        Ok(self.finish("ReturnStatement", start, object([("arguments", Value::Array(arguments))])))
    }

    fn statement(&mut self) -> Result<Value> {
        ensure_sufficient_stack(|| self.statement_inner())
    }

    fn statement_inner(&mut self) -> Result<Value> {
        let start = self.offset();
        match self.peek() {
            Some(Token::Break) => {
                self.pos += 1;
                Ok(self.finish("BreakStatement", start, object([])))
            }
            Some(Token::Goto) => {
                self.pos += 1;
                let label = self.name()?;
                Ok(self.finish("GotoStatement", start, object([("label", label)])))
            }
            Some(Token::DoubleColon) => {
                self.pos += 1;
                let label = self.name()?;
                self.expect(Token::DoubleColon, "::")?;
                Ok(self.finish("LabelStatement", start, object([("label", label)])))
            }
            Some(Token::Do) => {
                self.pos += 1;
                let body = self.block()?;
                self.expect_end("do", start)?;
                Ok(self.finish("DoStatement", start, object([("body", Value::Array(body))])))
            }
            Some(Token::While) => {
                self.pos += 1;
                let condition = self.expression()?;
                self.expect(Token::Do, "do")?;
                let body = self.block()?;
                self.expect_end("while", start)?;
                Ok(self.finish(
                    "WhileStatement",
                    start,
                    object([("condition", condition), ("body", Value::Array(body))]),
                ))
            }
            Some(Token::Repeat) => {
                self.pos += 1;
                let body = self.block()?;
                self.expect(Token::Until, "until")?;
                let condition = self.expression()?;
                Ok(self.finish(
                    "RepeatStatement",
                    start,
                    object([("body", Value::Array(body)), ("condition", condition)]),
                ))
            }
            Some(Token::If) => self.if_statement(),
            Some(Token::For) => self.for_statement(),
            Some(Token::Function) => {
                self.pos += 1;
                let identifier = self.function_name()?;
                self.function_body(start, identifier, false)
            }
            Some(Token::Local) => {
                self.pos += 1;
                if self.eat(Token::Function) {
                    let identifier = self.name()?;
                    return self.function_body(start, identifier, true);
                }
                let mut variables = vec![self.name()?];
                while self.eat(Token::Comma) {
                    variables.push(self.name()?);
                }
                let init = if self.eat(Token::Eq) {
                    self.expression_list()?
                } else {
                    Vec::new()
                };
                Ok(self.finish(
                    "LocalStatement",
                    start,
                    object([("variables", Value::Array(variables)), ("init", Value::Array(init))]),
                ))
            }
            _ => self.expression_statement(),
        }
    }

    fn if_statement(&mut self) -> Result<Value> {
        let start = self.offset();
        let mut clauses = Vec::new();

        self.expect(Token::If, "if")?;
        let condition = self.expression()?;
        self.expect(Token::Then, "then")?;
        let body = self.block()?;
        clauses.push(self.finish("IfClause", start, object([("condition", condition), ("body", Value::Array(body))])));

        loop {
            let clause_start = self.offset();
            if self.eat(Token::Elseif) {
                let condition = self.expression()?;
                self.expect(Token::Then, "then")?;
                let body = self.block()?;
                clauses.push(self.finish(
                    "ElseifClause",
                    clause_start,
                    object([("condition", condition), ("body", Value::Array(body))]),
                ));
            } else if self.eat(Token::Else) {
                let body = self.block()?;
                clauses.push(self.finish("ElseClause", clause_start, object([("body", Value::Array(body))])));
                break;
            } else {
                break;
            }
        }

        self.expect_end("if", start)?;
        Ok(self.finish("IfStatement", start, object([("clauses", Value::Array(clauses))])))
    }

    fn for_statement(&mut self) -> Result<Value> {
        let start = self.offset();
        self.expect(Token::For, "for")?;
        let first = self.name()?;

        if self.eat(Token::Eq) {
            let from = self.expression()?;
            self.expect(Token::Comma, ",")?;
            let to = self.expression()?;
            let step = if self.eat(Token::Comma) {
                self.expression()?
            } else {
                Value::Null
            };
            self.expect(Token::Do, "do")?;
            let body = self.block()?;
            self.expect_end("for", start)?;
            return Ok(self.finish(
                "ForNumericStatement",
                start,
                object([
                    ("variable", first),
                    ("start", from),
                    ("end", to),
                    ("step", step),
                    ("body", Value::Array(body)),
                ]),
            ));
        }

        let mut variables = vec![first];
        while self.eat(Token::Comma) {
            variables.push(self.name()?);
        }
        self.expect(Token::In, "in")?;
        let iterators = self.expression_list()?;
        self.expect(Token::Do, "do")?;
        let body = self.block()?;
        self.expect_end("for", start)?;
        Ok(self.finish(
            "ForGenericStatement",
            start,
            object([
                ("variables", Value::Array(variables)),
                ("iterators", Value::Array(iterators)),
                ("body", Value::Array(body)),
            ]),
        ))
    }

    /// `a.b.c` or `a.b:c` after `function`.
    fn function_name(&mut self) -> Result<Value> {
        let start = self.offset();
        let mut base = self.name()?;
        loop {
            let indexer = match self.peek() {
                Some(Token::Dot) => ".",
                Some(Token::Colon) => ":",
                _ => break,
            };
            self.pos += 1;
            let identifier = self.name()?;
            base = self.finish(
                "MemberExpression",
                start,
                object([("indexer", Value::from(indexer)), ("identifier", identifier), ("base", base)]),
            );
            if indexer == ":" {
                break;
            }
        }
        Ok(base)
    }

    fn function_body(&mut self, start: usize, identifier: Value, is_local: bool) -> Result<Value> {
        self.expect(Token::LParen, "(")?;
        let mut parameters = Vec::new();
        if !self.check(Token::RParen) {
            loop {
                if self.check(Token::Ellipsis) {
                    let at = self.offset();
                    self.pos += 1;
                    parameters.push(self.finish("VarargLiteral", at, object([("value", Value::from("...")), ("raw", Value::from("..."))])));
                    break;
                }
                parameters.push(self.name()?);
                if !self.eat(Token::Comma) {
                    break;
                }
            }
        }
        self.expect(Token::RParen, ")")?;
        let body = self.block()?;
        self.expect_end("function", start)?;
        Ok(self.finish(
            "FunctionDeclaration",
            start,
            object([
                ("identifier", identifier),
                ("isLocal", Value::Bool(is_local)),
                ("parameters", Value::Array(parameters)),
                ("body", Value::Array(body)),
            ]),
        ))
    }

    fn expression_statement(&mut self) -> Result<Value> {
        let start = self.offset();
        let first = self.suffixed_expression()?;

        if self.check(Token::Eq) || self.check(Token::Comma) {
            let mut variables = vec![first];
            while self.eat(Token::Comma) {
                variables.push(self.suffixed_expression()?);
            }
            if !variables.iter().all(is_assignable) {
                return Err(self.error("syntax error"));
            }
            self.expect(Token::Eq, "=")?;
            let init = self.expression_list()?;
            return Ok(self.finish(
                "AssignmentStatement",
                start,
                object([("variables", Value::Array(variables)), ("init", Value::Array(init))]),
            ));
        }

        if !is_call(&first) {
            return Err(self.error("syntax error"));
        }
        Ok(self.finish("CallStatement", start, object([("expression", first)])))
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // EXPRESSIONS
    // ═══════════════════════════════════════════════════════════════════════════

    fn expression_list(&mut self) -> Result<Vec<Value>> {
        let mut list = vec![self.expression()?];
        while self.eat(Token::Comma) {
            list.push(self.expression()?);
        }
        Ok(list)
    }

    fn expression(&mut self) -> Result<Value> {
        self.subexpression(0)
    }

    /// Operator-precedence climb: binary operators whose left binding power
    /// exceeds `limit` are folded into the left operand.
    fn subexpression(&mut self, limit: u8) -> Result<Value> {
        ensure_sufficient_stack(|| self.subexpression_inner(limit))
    }

    fn subexpression_inner(&mut self, limit: u8) -> Result<Value> {
        let start = self.offset();
        let mut left = match self.peek().and_then(Token::unary_operator) {
            Some(operator) => {
                self.pos += 1;
                let argument = self.subexpression(UNARY_PRIORITY)?;
                self.finish(
                    "UnaryExpression",
                    start,
                    object([("operator", Value::from(operator)), ("argument", argument)]),
                )
            }
            None => self.simple_expression()?,
        };

        while let Some(operator) = self.peek().and_then(Token::binary_operator) {
            let (left_power, right_power) = binding_power(operator)?;
            if left_power <= limit {
                break;
            }
            self.pos += 1;
            let right = self.subexpression(right_power)?;
            let ty = match operator {
                "and" | "or" => "LogicalExpression",
                _ => "BinaryExpression",
            };
            left = self.finish(
                ty,
                start,
                object([("operator", Value::from(operator)), ("left", left), ("right", right)]),
            );
        }
        Ok(left)
    }

    fn simple_expression(&mut self) -> Result<Value> {
        let start = self.offset();
        let literal = |parser: &mut Self, ty: &str, value: Value| -> Result<Value> {
            let lexeme = parser.advance();
            let raw = lexeme.as_ref().map_or("", |lexeme| parser.text(lexeme));
            Ok(parser.finish(ty, start, object([("value", value), ("raw", Value::from(raw))])))
        };

        match self.peek() {
            Some(Token::Number) => {
                let raw = self.tokens.get(self.pos).map_or("", |lexeme| self.text(lexeme));
                let value = numeral_value(raw).ok_or_else(|| self.error("malformed number"))?;
                literal(self, "NumericLiteral", json!(value))
            }
            Some(Token::String) => {
                let raw = self.tokens.get(self.pos).map_or("", |lexeme| self.text(lexeme));
                let value = string_value(raw).map_err(|message| self.error(message))?;
                literal(self, "StringLiteral", Value::from(value))
            }
            Some(Token::LongString) => {
                let raw = self.tokens.get(self.pos).map_or("", |lexeme| self.text(lexeme));
                literal(self, "StringLiteral", Value::from(long_bracket_content(raw)))
            }
            Some(Token::Nil) => literal(self, "NilLiteral", Value::Null),
            Some(Token::True) => literal(self, "BooleanLiteral", Value::Bool(true)),
            Some(Token::False) => literal(self, "BooleanLiteral", Value::Bool(false)),
            Some(Token::Ellipsis) => literal(self, "VarargLiteral", Value::from("...")),
            Some(Token::LBrace) => self.table_constructor(),
            Some(Token::Function) => {
                self.pos += 1;
                self.function_body(start, Value::Null, false)
            }
            _ => self.suffixed_expression(),
        }
    }

    fn primary_expression(&mut self) -> Result<Value> {
        match self.peek() {
            Some(Token::Name) => self.name(),
            Some(Token::LParen) => {
                self.pos += 1;
                let mut inner = self.expression()?;
                self.expect(Token::RParen, ")")?;
                if let Value::Object(map) = &mut inner {
                    map.insert("inParens".into(), Value::Bool(true));
                }
                Ok(inner)
            }
            _ => Err(self.error("unexpected symbol")),
        }
    }

    fn suffixed_expression(&mut self) -> Result<Value> {
        let start = self.offset();
        let mut base = self.primary_expression()?;
        loop {
            base = match self.peek() {
                Some(Token::Dot) => {
                    self.pos += 1;
                    let identifier = self.name()?;
                    self.finish(
                        "MemberExpression",
                        start,
                        object([("indexer", Value::from(".")), ("identifier", identifier), ("base", base)]),
                    )
                }
                Some(Token::LBracket) => {
                    self.pos += 1;
                    let index = self.expression()?;
                    self.expect(Token::RBracket, "]")?;
                    self.finish("IndexExpression", start, object([("base", base), ("index", index)]))
                }
                Some(Token::Colon) => {
                    self.pos += 1;
                    let identifier = self.name()?;
                    let method = self.finish(
                        "MemberExpression",
                        start,
                        object([("indexer", Value::from(":")), ("identifier", identifier), ("base", base)]),
                    );
                    self.call_arguments(start, method)?
                }
                Some(Token::LParen | Token::String | Token::LongString | Token::LBrace) => {
                    self.call_arguments(start, base)?
                }
                _ => return Ok(base),
            };
        }
    }

    fn call_arguments(&mut self, start: usize, base: Value) -> Result<Value> {
        match self.peek() {
            Some(Token::LParen) => {
                self.pos += 1;
                let arguments = if self.check(Token::RParen) {
                    Vec::new()
                } else {
                    self.expression_list()?
                };
                self.expect(Token::RParen, ")")?;
                Ok(self.finish(
                    "CallExpression",
                    start,
                    object([("base", base), ("arguments", Value::Array(arguments))]),
                ))
            }
            Some(Token::String | Token::LongString) => {
                let argument = self.simple_expression()?;
                Ok(self.finish(
                    "StringCallExpression",
                    start,
                    object([("base", base), ("argument", argument)]),
                ))
            }
            Some(Token::LBrace) => {
                let arguments = self.table_constructor()?;
                Ok(self.finish(
                    "TableCallExpression",
                    start,
                    object([("base", base), ("arguments", arguments)]),
                ))
            }
            _ => Err(self.error("function arguments expected")),
        }
    }

    fn table_constructor(&mut self) -> Result<Value> {
        let start = self.offset();
        self.expect(Token::LBrace, "{")?;
        let mut fields = Vec::new();

        while !self.check(Token::RBrace) {
            let field_start = self.offset();
            let field = if self.eat(Token::LBracket) {
                let key = self.expression()?;
                self.expect(Token::RBracket, "]")?;
                self.expect(Token::Eq, "=")?;
                let value = self.expression()?;
                self.finish("TableKey", field_start, object([("key", key), ("value", value)]))
            } else if self.check(Token::Name) && self.peek_at(1) == Some(Token::Eq) {
                let key = self.name()?;
                self.pos += 1;
                let value = self.expression()?;
                self.finish("TableKeyString", field_start, object([("key", key), ("value", value)]))
            } else {
                let value = self.expression()?;
                self.finish("TableValue", field_start, object([("value", value)]))
            };
            fields.push(field);

            if !self.eat(Token::Comma) && !self.eat(Token::Semicolon) {
                break;
            }
        }

        self.expect(Token::RBrace, "}")?;
        Ok(self.finish("TableConstructorExpression", start, object([("fields", Value::Array(fields))])))
    }
}
