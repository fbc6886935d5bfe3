//! Operator kinds and their Lua tokens.
//!
//! Every table is total in both directions for the operators Lua 5.3 knows;
//! any other token fails with `InvalidOperator`.

use crate::error::{FormatError, Result};

/// Binding power of a unary operator (`not`, `-`, `~`, `#`).
pub const UNARY_PRIORITY: u8 = 12;

/// Binding power of anything that is not an operator application.
pub const ATOM_PRIORITY: u8 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOperator {
    Add,
    Sub,
    Mul,
    Mod,
    Pow,
    Div,
    IDiv,
    BAnd,
    BOr,
    BXor,
    Shl,
    Shr,
    Concat,
    Ne,
    Eq,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOperator {
    Not,
    Minus,
    BNot,
    Len,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicalOperator {
    Or,
    And,
}

impl BinaryOperator {
    pub const ALL: [BinaryOperator; 19] = [
        BinaryOperator::Add,
        BinaryOperator::Sub,
        BinaryOperator::Mul,
        BinaryOperator::Mod,
        BinaryOperator::Pow,
        BinaryOperator::Div,
        BinaryOperator::IDiv,
        BinaryOperator::BAnd,
        BinaryOperator::BOr,
        BinaryOperator::BXor,
        BinaryOperator::Shl,
        BinaryOperator::Shr,
        BinaryOperator::Concat,
        BinaryOperator::Ne,
        BinaryOperator::Eq,
        BinaryOperator::Lt,
        BinaryOperator::Le,
        BinaryOperator::Gt,
        BinaryOperator::Ge,
    ];

    pub fn from_token(token: &str) -> Result<Self> {
        Ok(match token {
            "+" => BinaryOperator::Add,
            "-" => BinaryOperator::Sub,
            "*" => BinaryOperator::Mul,
            "%" => BinaryOperator::Mod,
            "^" => BinaryOperator::Pow,
            "/" => BinaryOperator::Div,
            "//" => BinaryOperator::IDiv,
            "&" => BinaryOperator::BAnd,
            "|" => BinaryOperator::BOr,
            "~" => BinaryOperator::BXor,
            "<<" => BinaryOperator::Shl,
            ">>" => BinaryOperator::Shr,
            ".." => BinaryOperator::Concat,
            "~=" => BinaryOperator::Ne,
            "==" => BinaryOperator::Eq,
            "<" => BinaryOperator::Lt,
            "<=" => BinaryOperator::Le,
            ">" => BinaryOperator::Gt,
            ">=" => BinaryOperator::Ge,
            other => return Err(FormatError::InvalidOperator(other.to_string())),
        })
    }

    pub fn token(self) -> &'static str {
        match self {
            BinaryOperator::Add => "+",
            BinaryOperator::Sub => "-",
            BinaryOperator::Mul => "*",
            BinaryOperator::Mod => "%",
            BinaryOperator::Pow => "^",
            BinaryOperator::Div => "/",
            BinaryOperator::IDiv => "//",
            BinaryOperator::BAnd => "&",
            BinaryOperator::BOr => "|",
            BinaryOperator::BXor => "~",
            BinaryOperator::Shl => "<<",
            BinaryOperator::Shr => ">>",
            BinaryOperator::Concat => "..",
            BinaryOperator::Ne => "~=",
            BinaryOperator::Eq => "==",
            BinaryOperator::Lt => "<",
            BinaryOperator::Le => "<=",
            BinaryOperator::Gt => ">",
            BinaryOperator::Ge => ">=",
        }
    }

    /// Lua 5.3 `(left, right)` binding powers, as used by the reference parser.
    pub fn priority(self) -> (u8, u8) {
        match self {
            BinaryOperator::Add | BinaryOperator::Sub => (10, 10),
            BinaryOperator::Mul
            | BinaryOperator::Mod
            | BinaryOperator::Div
            | BinaryOperator::IDiv => (11, 11),
            BinaryOperator::Pow => (14, 13),
            BinaryOperator::BAnd => (6, 6),
            BinaryOperator::BOr => (4, 4),
            BinaryOperator::BXor => (5, 5),
            BinaryOperator::Shl | BinaryOperator::Shr => (7, 7),
            BinaryOperator::Concat => (9, 8),
            BinaryOperator::Ne
            | BinaryOperator::Eq
            | BinaryOperator::Lt
            | BinaryOperator::Le
            | BinaryOperator::Gt
            | BinaryOperator::Ge => (3, 3),
        }
    }

    pub fn is_right_associative(self) -> bool {
        matches!(self, BinaryOperator::Pow | BinaryOperator::Concat)
    }
}

impl UnaryOperator {
    pub const ALL: [UnaryOperator; 4] = [
        UnaryOperator::Not,
        UnaryOperator::Minus,
        UnaryOperator::BNot,
        UnaryOperator::Len,
    ];

    pub fn from_token(token: &str) -> Result<Self> {
        Ok(match token {
            "not" => UnaryOperator::Not,
            "-" => UnaryOperator::Minus,
            "~" => UnaryOperator::BNot,
            "#" => UnaryOperator::Len,
            other => return Err(FormatError::InvalidOperator(other.to_string())),
        })
    }

    pub fn token(self) -> &'static str {
        match self {
            UnaryOperator::Not => "not",
            UnaryOperator::Minus => "-",
            UnaryOperator::BNot => "~",
            UnaryOperator::Len => "#",
        }
    }
}

impl LogicalOperator {
    pub const ALL: [LogicalOperator; 2] = [LogicalOperator::Or, LogicalOperator::And];

    pub fn from_token(token: &str) -> Result<Self> {
        match token {
            "or" => Ok(LogicalOperator::Or),
            "and" => Ok(LogicalOperator::And),
            other => Err(FormatError::InvalidOperator(other.to_string())),
        }
    }

    pub fn token(self) -> &'static str {
        match self {
            LogicalOperator::Or => "or",
            LogicalOperator::And => "and",
        }
    }

    pub fn priority(self) -> (u8, u8) {
        match self {
            LogicalOperator::Or => (1, 1),
            LogicalOperator::And => (2, 2),
        }
    }
}
