mod common;

use common::*;
use pretty_assertions::assert_eq;
use salesmart::prelude::*;
use serde_json::json;
use std::path::PathBuf;

async fn build_mart(dir: &tempfile::TempDir) -> PathBuf {
    let mart = dir.path().join("analytics.db");
    let report = Pipeline::new(2)
        .unwrap()
        .run(&split_connector(), &mart, &split_specs())
        .await
        .unwrap();
    assert!(!report.has_failures(), "{:?}", report);
    mart
}

fn column(records: &[Record], name: &str) -> Vec<serde_json::Value> {
    records.iter().map(|r| r.get(name).cloned().unwrap_or_default()).collect()
}

#[tokio::test]
async fn test_store_ranking() {
    let dir = tempfile::tempdir().unwrap();
    let reader = MartReader::open(build_mart(&dir).await).await.unwrap();

    let compiled = Report::SalesByStore.compile(&ReportArgs::default()).unwrap();
    let records = reader.execute(&compiled).await.unwrap();

    assert_eq!(column(&records, "store_name"), vec![json!("Loja 1"), json!("Loja 2")]);
    assert_eq!(column(&records, "faturamento"), vec![json!(220.0), json!(50.0)]);
    assert_eq!(column(&records, "total_vendas"), vec![json!(3), json!(2)]);
    assert_eq!(
        records[0].columns().collect::<Vec<_>>(),
        vec!["faturamento", "total_vendas", "store_name"]
    );
    reader.close().await;
}

#[tokio::test]
async fn test_kpi_summary() {
    let dir = tempfile::tempdir().unwrap();
    let reader = MartReader::open(build_mart(&dir).await).await.unwrap();

    let response = reader
        .run(&Report::KpiSummary.compile(&ReportArgs::default()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.count, 1);
    let kpis = &response.data[0];
    assert_eq!(kpis.get("faturamento_total"), Some(&json!(270.0)));
    assert_eq!(kpis.get("ticket_medio"), Some(&json!(54.0)));
    assert_eq!(kpis.get("total_vendas"), Some(&json!(5)));
    assert_eq!(kpis.get("avg_tempo_entrega_min"), Some(&json!(30.0)));
    reader.close().await;
}

#[tokio::test]
async fn test_daily_drill_down_is_scoped_to_month() {
    let dir = tempfile::tempdir().unwrap();
    let reader = MartReader::open(build_mart(&dir).await).await.unwrap();

    let args = ReportArgs {
        month: Some("2025-05".into()),
        ..ReportArgs::default()
    };
    let records = reader.execute(&Report::SalesByDay.compile(&args).unwrap()).await.unwrap();

    assert_eq!(
        column(&records, "data_venda"),
        vec![json!("2025-05-01"), json!("2025-05-01"), json!("2025-05-02")]
    );
    assert_eq!(
        column(&records, "channel_name"),
        vec![json!("Presencial"), json!("iFood"), json!("iFood")]
    );
    assert_eq!(column(&records, "faturamento"), vec![json!(100.0), json!(30.0), json!(90.0)]);
    reader.close().await;
}

#[tokio::test]
async fn test_top_products_reads_product_fact() {
    let dir = tempfile::tempdir().unwrap();
    let reader = MartReader::open(build_mart(&dir).await).await.unwrap();

    let compiled = Report::TopProductsByRevenue.compile(&ReportArgs::default()).unwrap();
    assert!(compiled.sql.contains("FROM fct_product_sales"));
    let records = reader.execute(&compiled).await.unwrap();

    assert_eq!(
        column(&records, "product_name"),
        vec![json!("X-Burguer"), json!("Pizza"), json!("Refrigerante")]
    );
    assert_eq!(column(&records, "faturamento"), vec![json!(140.0), json!(100.0), json!(30.0)]);
    reader.close().await;
}

#[tokio::test]
async fn test_generic_request_with_filters() {
    let dir = tempfile::tempdir().unwrap();
    let reader = MartReader::open(build_mart(&dir).await).await.unwrap();

    let request = QueryRequest::from_json(
        r#"{
            "metrics": ["COUNT(sale_id) AS total_vendas"],
            "dimensions": ["channel_name"],
            "filters": [
                {"field": "store_name", "operator": "in", "value": ["Loja 1", "Loja 2"]},
                {"field": "sale_total_amount", "operator": "gte", "value": 30}
            ],
            "order_by": {"total_vendas": "desc"},
            "limit": 5
        }"#,
    )
    .unwrap();
    let compiled = QueryCompiler::new("fct_sales").compile(&request).unwrap();
    assert_eq!(
        compiled.sql,
        "SELECT COUNT(sale_id) AS total_vendas, channel_name FROM fct_sales \
         WHERE store_name IN (?, ?) AND sale_total_amount >= ? \
         GROUP BY channel_name ORDER BY total_vendas DESC LIMIT 5"
    );

    let response = reader.run(&compiled).await.unwrap();
    assert_eq!(response.params.len(), 3);
    assert_eq!(column(&response.data, "channel_name"), vec![json!("iFood"), json!("Presencial")]);
    assert_eq!(column(&response.data, "total_vendas"), vec![json!(3), json!(1)]);

    let body = serde_json::to_value(&response).unwrap();
    assert_eq!(body["count"], json!(2));
    assert_eq!(body["params"], json!(["Loja 1", "Loja 2", 30]));
    assert_eq!(body["data"][0], json!({"total_vendas": 3, "channel_name": "iFood"}));
    reader.close().await;
}

#[tokio::test]
async fn test_bad_column_surfaces_execution_error() {
    let dir = tempfile::tempdir().unwrap();
    let reader = MartReader::open(build_mart(&dir).await).await.unwrap();

    let request = QueryRequest::new().metric("SUM(gorjeta) AS total");
    let compiled = salesmart::compile("fct_sales", &request).unwrap();
    let err = reader.execute(&compiled).await.unwrap_err();

    match err {
        MartError::QueryExecution { sql, message } => {
            assert_eq!(sql, compiled.sql);
            assert!(message.contains("gorjeta"), "{}", message);
        }
        other => panic!("expected QueryExecution, got {:?}", other),
    }
    assert!(!MartError::execution("SELECT 1", "x").is_request_error());
    reader.close().await;
}

#[tokio::test]
async fn test_top_customers_enriched() {
    let dir = tempfile::tempdir().unwrap();
    let reader = MartReader::open(build_mart(&dir).await).await.unwrap();

    let mut records = reader
        .execute(&Report::TopCustomers.compile(&ReportArgs::default()).unwrap())
        .await
        .unwrap();
    let directory = StaticDirectory::new([CustomerContact {
        customer_id: 10,
        name: Some("Ana".into()),
        contact: Some("ana@example.com".into()),
    }]);
    enrich_records(&mut records, "customer_id", &directory).await.unwrap();

    let ana = records.iter().find(|r| r.get("customer_id") == Some(&json!(10))).unwrap();
    assert_eq!(ana.get("total_vendas"), Some(&json!(2)));
    assert_eq!(ana.get("ultima_compra_data"), Some(&json!("2025-05-01 12:00:00")));
    assert_eq!(ana.get("customer_name"), Some(&json!("Ana")));

    let anonymous = records.iter().find(|r| r.get("customer_id") == Some(&json!(null))).unwrap();
    assert_eq!(anonymous.get("contact"), Some(&json!(null)));
    reader.close().await;
}

#[tokio::test]
async fn test_missing_payments_get_their_own_bucket() {
    let dir = tempfile::tempdir().unwrap();
    let reader = MartReader::open(build_mart(&dir).await).await.unwrap();

    let records = reader
        .execute(&Report::SalesByPaymentType.compile(&ReportArgs::default()).unwrap())
        .await
        .unwrap();

    assert_eq!(
        column(&records, "forma_pagamento"),
        vec![json!("Dinheiro"), json!("Não Identificado")]
    );
    assert_eq!(column(&records, "faturamento"), vec![json!(200.0), json!(70.0)]);
    reader.close().await;
}

#[tokio::test]
async fn test_delivery_by_neighborhood_worst_and_best() {
    let dir = tempfile::tempdir().unwrap();
    let mart = dir.path().join("deliveries.db");
    let spec = split_specs().remove(0);
    let connector = VecConnector::new().with_table(spec.query.clone(), delivery_columns(), delivery_rows());
    Pipeline::new(8).unwrap().run(&connector, &mart, &[spec]).await.unwrap();
    let reader = MartReader::open(&mart).await.unwrap();

    let worst = reader
        .execute(&Report::DeliveryByNeighborhood.compile(&ReportArgs::default()).unwrap())
        .await
        .unwrap();
    assert_eq!(
        column(&worst, "delivery_neighborhood"),
        vec![json!("Savassi"), json!("Centro")]
    );
    assert_eq!(column(&worst, "tempo_medio_min"), vec![json!(40.0), json!(20.0)]);
    assert_eq!(column(&worst, "total_entregas"), vec![json!(6), json!(7)]);

    let args = ReportArgs {
        ascending: true,
        ..ReportArgs::default()
    };
    let best = reader
        .execute(&Report::DeliveryByNeighborhood.compile(&args).unwrap())
        .await
        .unwrap();
    assert_eq!(
        column(&best, "delivery_neighborhood"),
        vec![json!("Centro"), json!("Savassi")]
    );
    reader.close().await;
}

