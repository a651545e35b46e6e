//! Structured analytical requests, as received from callers.

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// One filter: `field <operator> value`.
///
/// `field` is always rendered as an identifier and `value` is always bound
/// as a parameter. `is_null` / `not_null` take no value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub field: String,
    pub operator: String,
    #[serde(default)]
    pub value: serde_json::Value,
}

impl Filter {
    pub fn new(
        field: impl Into<String>,
        operator: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        Self {
            field: field.into(),
            operator: operator.into(),
            value: value.into(),
        }
    }

    /// A filter whose operator takes no value, e.g. `not_null`.
    pub fn unary(field: impl Into<String>, operator: impl Into<String>) -> Self {
        Self::new(field, operator, serde_json::Value::Null)
    }
}

/// A requested ordering on an output column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub column: String,
    pub direction: String,
}

/// A generic aggregate query over the mart.
///
/// `order_by` is a JSON object of `column → direction`; key order is kept.
/// A dimension may be `expr AS alias`, in which case it is grouped by alias.
/// `having` filters apply to output columns after grouping.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct QueryRequest {
    #[serde(default)]
    pub metrics: Vec<String>,
    #[serde(default)]
    pub dimensions: Vec<String>,
    #[serde(default)]
    pub filters: Vec<Filter>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub having: Vec<Filter>,
    #[serde(
        default,
        serialize_with = "serialize_order_by",
        deserialize_with = "deserialize_order_by"
    )]
    pub order_by: Vec<OrderBy>,
    #[serde(default)]
    pub limit: Option<u64>,
}

impl QueryRequest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an aggregate expression, e.g. `SUM(sale_total_amount) AS faturamento`.
    pub fn metric(mut self, expr: impl Into<String>) -> Self {
        self.metrics.push(expr.into());
        self
    }

    /// Add a grouping column.
    pub fn dimension(mut self, column: impl Into<String>) -> Self {
        self.dimensions.push(column.into());
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn having(mut self, filter: Filter) -> Self {
        self.having.push(filter);
        self
    }

    pub fn order_by(mut self, column: impl Into<String>, direction: impl Into<String>) -> Self {
        self.order_by.push(OrderBy {
            column: column.into(),
            direction: direction.into(),
        });
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Parse a request from JSON text.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

fn serialize_order_by<S: Serializer>(order_by: &[OrderBy], serializer: S) -> Result<S::Ok, S::Error> {
    let mut map = serializer.serialize_map(Some(order_by.len()))?;
    for entry in order_by {
        map.serialize_entry(&entry.column, &entry.direction)?;
    }
    map.end()
}

fn deserialize_order_by<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<OrderBy>, D::Error> {
    struct OrderByVisitor;

    impl<'de> Visitor<'de> for OrderByVisitor {
        type Value = Vec<OrderBy>;

        fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
            f.write_str("a map of column name to direction")
        }

        fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
            let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
            while let Some((column, direction)) = access.next_entry::<String, String>()? {
                entries.push(OrderBy { column, direction });
            }
            Ok(entries)
        }

        fn visit_unit<E: serde::de::Error>(self) -> Result<Self::Value, E> {
            Ok(Vec::new())
        }
    }

    deserializer.deserialize_any(OrderByVisitor)
}
