//! SQL serializer for the SELECT tree.
//!
//! Rendering goes through a [`SqlWriter`], whose only way to emit a `?` is
//! to take the value that binds it. Placeholder count and parameter order
//! therefore always match the text.

use crate::query::ast::*;
use crate::value::Value;

use serde::Serialize;

/// Query text plus its positional parameters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompiledQuery {
    pub sql: String,
    pub params: Vec<Value>,
}

impl CompiledQuery {
    /// Number of `?` placeholders in the text.
    pub fn placeholder_count(&self) -> usize {
        self.sql.matches('?').count()
    }
}

/// Accumulates query text and bound values side by side.
#[derive(Debug, Default)]
pub struct SqlWriter {
    sql: String,
    params: Vec<Value>,
}

impl SqlWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append raw text (keywords, identifiers, trusted expressions).
    pub fn push(&mut self, text: &str) -> &mut Self {
        self.sql.push_str(text);
        self
    }

    /// Append a placeholder bound to `value`.
    pub fn bind(&mut self, value: Value) -> &mut Self {
        self.sql.push('?');
        self.params.push(value);
        self
    }

    /// Write `items` separated by `sep`.
    pub fn join<T: ToSql>(&mut self, items: &[T], sep: &str) -> &mut Self {
        for (i, item) in items.iter().enumerate() {
            if i > 0 {
                self.push(sep);
            }
            item.write_sql(self);
        }
        self
    }

    pub fn finish(self) -> CompiledQuery {
        CompiledQuery {
            sql: self.sql,
            params: self.params,
        }
    }
}

/// Trait for converting tree nodes to SQL.
pub trait ToSql {
    fn write_sql(&self, out: &mut SqlWriter);

    /// Render this node on its own.
    fn to_sql(&self) -> CompiledQuery {
        let mut out = SqlWriter::new();
        self.write_sql(&mut out);
        out.finish()
    }
}

impl ToSql for Select {
    fn write_sql(&self, out: &mut SqlWriter) {
        out.push("SELECT ").join(&self.items, ", ");
        out.push(" FROM ").push(&self.from);

        if !self.filter.is_empty() {
            out.push(" WHERE ").join(&self.filter, " AND ");
        }

        if !self.group_by.is_empty() {
            out.push(" GROUP BY ").push(&self.group_by.join(", "));
        }

        if !self.having.is_empty() {
            out.push(" HAVING ").join(&self.having, " AND ");
        }

        if !self.order_by.is_empty() {
            out.push(" ORDER BY ").join(&self.order_by, ", ");
        }

        out.push(&format!(" LIMIT {}", self.limit));
    }
}

impl ToSql for SelectItem {
    fn write_sql(&self, out: &mut SqlWriter) {
        match self {
            SelectItem::Metric(expr) => out.push(expr),
            SelectItem::Column(name) => out.push(name),
            SelectItem::Derived { expr, alias } => out.push(expr).push(" AS ").push(alias),
        };
    }
}

impl ToSql for Predicate {
    fn write_sql(&self, out: &mut SqlWriter) {
        out.push(&self.column).push(" ").push(self.op.symbol());
        match &self.operand {
            Operand::Absent => {}
            Operand::Param(value) => {
                out.push(" ").bind(value.clone());
            }
            Operand::List(values) => {
                out.push(" (");
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        out.push(", ");
                    }
                    out.bind(value.clone());
                }
                out.push(")");
            }
        }
    }
}

impl ToSql for OrderItem {
    fn write_sql(&self, out: &mut SqlWriter) {
        out.push(&self.column).push(" ").push(&self.order.to_string());
    }
}
