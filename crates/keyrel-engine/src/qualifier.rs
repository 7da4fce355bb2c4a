//! Recognition of pushdown-eligible filter conditions.
//!
//! The host hands over its restriction clauses as [`Expr`] trees. Only one
//! shape can be answered with a direct key lookup: `key = 'constant'`,
//! a text-equality operator whose left side is the `key` column and whose
//! right side is a text constant. Everything else is left for the host to
//! evaluate on the returned rows.

use keyrel_types::{KEY_COLUMN, TableSchema, Value};

/// Comparison operator of a binary condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operator {
    /// Text equality (`text = text`).
    TextEq,
    /// Any other operator, by name.
    Other(String),
}

/// A restriction clause in the host's expression form.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Reference to a column by zero-based position.
    Column(usize),
    /// Constant value.
    Const(Value),
    /// Operator applied to arguments.
    Op {
        /// The operator.
        op: Operator,
        /// Operands in order.
        args: Vec<Self>,
    },
    /// Conjunction.
    And(Vec<Self>),
    /// Disjunction.
    Or(Vec<Self>),
    /// Negation.
    Not(Box<Self>),
}

impl Expr {
    /// `column = 'value'` with text equality.
    pub fn text_eq(column: usize, value: impl Into<String>) -> Self {
        Self::Op {
            op: Operator::TextEq,
            args: vec![Self::Column(column), Self::Const(Value::text(value))],
        }
    }
}

/// A condition the scan engine can answer by direct lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Qualifier {
    /// Column the condition applies to.
    pub column: String,
    /// Constant the column must equal.
    pub value: String,
}

/// Inspect one clause and return the lookup it allows, if any.
pub fn extract(expr: &Expr, schema: &TableSchema) -> Option<Qualifier> {
    let Expr::Op {
        op: Operator::TextEq,
        args,
    } = expr
    else {
        return None;
    };
    let [Expr::Column(index), Expr::Const(Value::Text(value))] = args.as_slice() else {
        return None;
    };
    let column = schema.column(*index)?;
    if column.name != KEY_COLUMN {
        return None;
    }
    Some(Qualifier {
        column: column.name.clone(),
        value: value.clone(),
    })
}

/// The first eligible clause in a list of restrictions.
pub fn extract_first(clauses: &[Expr], schema: &TableSchema) -> Option<Qualifier> {
    clauses.iter().find_map(|clause| extract(clause, schema))
}
