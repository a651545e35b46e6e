//! Typed SELECT tree for mart queries.
//!
//! Identifiers and parameter values live in different node types, so a value
//! can only ever reach the query text as a placeholder.

use crate::value::Value;

/// An aggregate query over a single mart table.
#[derive(Debug, Clone, PartialEq)]
pub struct Select {
    pub items: Vec<SelectItem>,
    pub from: String,
    /// Conjunction of predicates.
    pub filter: Vec<Predicate>,
    pub group_by: Vec<String>,
    /// Conjunction of predicates over grouped output.
    pub having: Vec<Predicate>,
    pub order_by: Vec<OrderItem>,
    pub limit: u64,
}

impl Select {
    pub fn new(from: impl Into<String>, limit: u64) -> Self {
        Self {
            items: Vec::new(),
            from: from.into(),
            filter: Vec::new(),
            group_by: Vec::new(),
            having: Vec::new(),
            order_by: Vec::new(),
            limit,
        }
    }
}

/// An entry in the SELECT list.
#[derive(Debug, Clone, PartialEq)]
pub enum SelectItem {
    /// Pre-formed aggregate expression, rendered as given.
    Metric(String),
    /// Plain column reference.
    Column(String),
    /// Computed grouping key, `expr AS alias`. Grouped by its alias.
    Derived { expr: String, alias: String },
}

/// Comparison operators accepted in filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    IsNull,
    NotNull,
}

impl CompareOp {
    /// Look up a request operator. Unknown names yield `None`.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "eq" => Some(CompareOp::Eq),
            "ne" | "neq" => Some(CompareOp::Ne),
            "gt" => Some(CompareOp::Gt),
            "gte" => Some(CompareOp::Gte),
            "lt" => Some(CompareOp::Lt),
            "lte" => Some(CompareOp::Lte),
            "in" => Some(CompareOp::In),
            "is_null" => Some(CompareOp::IsNull),
            "not_null" => Some(CompareOp::NotNull),
            _ => None,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "!=",
            CompareOp::Gt => ">",
            CompareOp::Gte => ">=",
            CompareOp::Lt => "<",
            CompareOp::Lte => "<=",
            CompareOp::In => "IN",
            CompareOp::IsNull => "IS NULL",
            CompareOp::NotNull => "IS NOT NULL",
        }
    }

    /// True when the operator takes a list operand.
    pub fn is_list(&self) -> bool {
        matches!(self, CompareOp::In)
    }

    /// True when the operator takes no operand at all.
    pub fn is_unary(&self) -> bool {
        matches!(self, CompareOp::IsNull | CompareOp::NotNull)
    }
}

/// Right-hand side of a predicate. Always bound, never inlined.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// Unary operators such as `IS NULL`.
    Absent,
    Param(Value),
    List(Vec<Value>),
}

/// `column <op> operand`
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub column: String,
    pub op: CompareOp,
    pub operand: Operand,
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    /// Case-insensitive parse of `asc` / `desc`.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "asc" => Some(SortOrder::Asc),
            "desc" => Some(SortOrder::Desc),
            _ => None,
        }
    }
}

impl std::fmt::Display for SortOrder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SortOrder::Asc => write!(f, "ASC"),
            SortOrder::Desc => write!(f, "DESC"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderItem {
    pub column: String,
    pub order: SortOrder,
}
