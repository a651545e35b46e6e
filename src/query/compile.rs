//! Query compiler: [`QueryRequest`] → [`Select`] tree → [`CompiledQuery`].
//!
//! Compilation is pure. Filter values are always bound; metric expressions and
//! column names are rendered as given, so callers outside a trusted boundary
//! must allow-list them before they get here.

use crate::error::{MartError, MartResult};
use crate::query::ast::*;
use crate::query::request::{Filter, QueryRequest};
use crate::query::transpiler::{CompiledQuery, ToSql};
use crate::value::Value;

/// LIMIT applied when a request does not set one.
pub const DEFAULT_LIMIT: u64 = 100;

/// Compiles requests against one fixed mart table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryCompiler {
    table: String,
    default_limit: u64,
}

impl QueryCompiler {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            default_limit: DEFAULT_LIMIT,
        }
    }

    pub fn with_default_limit(mut self, limit: u64) -> Self {
        self.default_limit = limit;
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Compile a request to SQL text and ordered parameters.
    pub fn compile(&self, request: &QueryRequest) -> MartResult<CompiledQuery> {
        Ok(self.plan(request)?.to_sql())
    }

    /// Build the SELECT tree for a request.
    pub fn plan(&self, request: &QueryRequest) -> MartResult<Select> {
        let limit = request.limit.unwrap_or(self.default_limit);
        if limit == 0 {
            return Err(MartError::InvalidRequest("limit must be a positive integer".into()));
        }

        let mut select = Select::new(self.table.clone(), limit);

        for (i, metric) in request.metrics.iter().enumerate() {
            if metric.trim().is_empty() {
                return Err(MartError::InvalidRequest(format!("metric {} is empty", i)));
            }
            select.items.push(SelectItem::Metric(metric.clone()));
        }
        for dimension in &request.dimensions {
            if dimension.trim().is_empty() {
                return Err(MartError::InvalidRequest("dimension name is empty".into()));
            }
            match split_alias(dimension) {
                Some((expr, alias)) => {
                    select.group_by.push(alias.to_string());
                    select.items.push(SelectItem::Derived {
                        expr: expr.to_string(),
                        alias: alias.to_string(),
                    });
                }
                None => {
                    select.group_by.push(dimension.clone());
                    select.items.push(SelectItem::Column(dimension.clone()));
                }
            }
        }
        if select.items.is_empty() {
            return Err(MartError::InvalidRequest(
                "request needs at least one metric or dimension".into(),
            ));
        }

        for filter in &request.filters {
            select.filter.push(predicate(filter)?);
        }
        for filter in &request.having {
            select.having.push(predicate(filter)?);
        }
        if !select.having.is_empty() && select.group_by.is_empty() {
            return Err(MartError::InvalidRequest("having needs at least one dimension".into()));
        }

        for entry in &request.order_by {
            let order = SortOrder::from_name(&entry.direction).ok_or_else(|| {
                MartError::InvalidOrderDirection {
                    column: entry.column.clone(),
                    direction: entry.direction.clone(),
                }
            })?;
            select.order_by.push(OrderItem {
                column: entry.column.clone(),
                order,
            });
        }

        Ok(select)
    }
}

fn predicate(filter: &Filter) -> MartResult<Predicate> {
    let op = CompareOp::from_name(&filter.operator)
        .ok_or_else(|| MartError::UnsupportedOperator(filter.operator.clone()))?;
    if filter.field.trim().is_empty() {
        return Err(MartError::InvalidRequest("filter field is empty".into()));
    }

    let invalid = |reason: &str| {
        MartError::InvalidRequest(format!("filter on '{}': {}", filter.field, reason))
    };

    let operand = if op.is_unary() {
        if !filter.value.is_null() {
            return Err(invalid("operator takes no value"));
        }
        Operand::Absent
    } else if op.is_list() {
        let items = filter
            .value
            .as_array()
            .ok_or_else(|| invalid("operator 'in' needs a list value"))?;
        if items.is_empty() {
            return Err(invalid("list value is empty"));
        }
        let values = items
            .iter()
            .map(|item| Value::from_json(item).ok_or_else(|| invalid("list items must be scalars")))
            .collect::<MartResult<Vec<_>>>()?;
        Operand::List(values)
    } else {
        let value = Value::from_json(&filter.value)
            .ok_or_else(|| invalid("operator needs a scalar value"))?;
        Operand::Param(value)
    };

    Ok(Predicate {
        column: filter.field.clone(),
        op,
        operand,
    })
}

/// Split `expr AS alias` on its last `AS`. Plain column names yield `None`.
fn split_alias(dimension: &str) -> Option<(&str, &str)> {
    let at = dimension.to_ascii_lowercase().rfind(" as ")?;
    let expr = dimension[..at].trim();
    let alias = dimension[at + 4..].trim();
    if expr.is_empty() || alias.is_empty() {
        return None;
    }
    Some((expr, alias))
}
