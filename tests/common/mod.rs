#![allow(dead_code)]

use chrono::{NaiveDate, NaiveDateTime};
use salesmart::etl::{Column, ColumnType, FlattenPolicy, MartLayout, TableSpec, VecConnector};
use salesmart::value::Value;

pub fn ts(s: &str) -> Value {
    Value::Timestamp(NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap())
}

pub fn date(s: &str) -> Value {
    Value::Date(NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap())
}

pub fn split_specs() -> Vec<TableSpec> {
    MartLayout::Split.table_specs(&FlattenPolicy::default())
}

pub fn sales_columns() -> Vec<Column> {
    vec![
        Column::new("sale_id", ColumnType::Integer),
        Column::new("sale_created_at", ColumnType::Timestamp),
        Column::new("mes_ano", ColumnType::Text),
        Column::new("data_venda", ColumnType::Date),
        Column::new("sale_total_amount", ColumnType::Float),
        Column::new("delivery_seconds", ColumnType::Integer),
        Column::new("store_name", ColumnType::Text),
        Column::new("channel_name", ColumnType::Text),
        Column::new("customer_id", ColumnType::Integer),
        Column::new("payment_type", ColumnType::Text),
    ]
}

/// Five completed sales across two stores, two channels and two months.
pub fn sales_rows() -> Vec<Vec<Value>> {
    let sale = |id: i64, at: &str, day: &str, amount: f64, store: &str, channel: &str, customer: Option<i64>| {
        vec![
            Value::Int(id),
            ts(at),
            Value::from(&day[..7]),
            date(day),
            Value::Float(amount),
            Value::Int(1800),
            Value::from(store),
            Value::from(channel),
            Value::from(customer),
            // Anonymous counter sales carry no payment record.
            Value::from(customer.map(|_| "Dinheiro")),
        ]
    };
    vec![
        sale(1, "2025-04-30 20:15:00", "2025-04-30", 50.0, "Loja 1", "iFood", Some(10)),
        sale(2, "2025-05-01 12:00:00", "2025-05-01", 100.0, "Loja 1", "Presencial", Some(10)),
        sale(3, "2025-05-01 19:30:00", "2025-05-01", 30.0, "Loja 2", "iFood", Some(11)),
        sale(4, "2025-05-02 21:45:00", "2025-05-02", 70.0, "Loja 1", "iFood", None),
        sale(5, "2025-05-02 13:10:00", "2025-05-02", 20.0, "Loja 2", "iFood", Some(11)),
    ]
}

pub fn product_columns() -> Vec<Column> {
    vec![
        Column::new("sale_id", ColumnType::Integer),
        Column::new("mes_ano", ColumnType::Text),
        Column::new("store_name", ColumnType::Text),
        Column::new("product_id", ColumnType::Integer),
        Column::new("product_name", ColumnType::Text),
        Column::new("product_quantity", ColumnType::Integer),
        Column::new("product_total_price", ColumnType::Float),
    ]
}

pub fn product_rows() -> Vec<Vec<Value>> {
    let line = |sale: i64, month: &str, store: &str, id: i64, name: &str, qty: i64, total: f64| {
        vec![
            Value::Int(sale),
            Value::from(month),
            Value::from(store),
            Value::Int(id),
            Value::from(name),
            Value::Int(qty),
            Value::Float(total),
        ]
    };
    vec![
        line(1, "2025-04", "Loja 1", 7, "X-Burguer", 2, 40.0),
        line(1, "2025-04", "Loja 1", 9, "Refrigerante", 1, 10.0),
        line(2, "2025-05", "Loja 1", 7, "X-Burguer", 5, 100.0),
        line(3, "2025-05", "Loja 2", 8, "Pizza", 1, 30.0),
        line(4, "2025-05", "Loja 1", 8, "Pizza", 2, 70.0),
        line(5, "2025-05", "Loja 2", 9, "Refrigerante", 2, 20.0),
    ]
}

/// A connector that answers both split-layout queries.
pub fn split_connector() -> VecConnector {
    let specs = split_specs();
    VecConnector::new()
        .with_table(specs[0].query.clone(), sales_columns(), sales_rows())
        .with_table(specs[1].query.clone(), product_columns(), product_rows())
}

pub fn delivery_columns() -> Vec<Column> {
    vec![
        Column::new("sale_id", ColumnType::Integer),
        Column::new("channel_type", ColumnType::Text),
        Column::new("delivery_neighborhood", ColumnType::Text),
        Column::new("delivery_seconds", ColumnType::Integer),
    ]
}

/// Centro: 7 deliveries at 20 min. Savassi: 6 at 40 min. Pampulha: 3 at 60 min.
/// Also 6 deliveries with no neighborhood and 6 counter sales in Centro at 90 min.
pub fn delivery_rows() -> Vec<Vec<Value>> {
    let groups: [(&str, Option<&str>, i64, i64); 5] = [
        ("D", Some("Centro"), 1200, 7),
        ("D", Some("Savassi"), 2400, 6),
        ("D", Some("Pampulha"), 3600, 3),
        ("D", None, 600, 6),
        ("P", Some("Centro"), 5400, 6),
    ];
    let mut rows = Vec::new();
    for (channel_type, neighborhood, seconds, count) in groups {
        for _ in 0..count {
            rows.push(vec![
                Value::Int(rows.len() as i64 + 1),
                Value::from(channel_type),
                Value::from(neighborhood),
                Value::Int(seconds),
            ]);
        }
    }
    rows
}

