//! Catalog of fixed dashboard reports.
//!
//! Every report is a [`QueryRequest`] built from a fixed vocabulary of mart
//! columns, so the only caller-supplied input (e.g. a month bucket) is bound
//! as a parameter.

use crate::error::{MartError, MartResult};
use crate::etl::flatten::{FCT_PRODUCT_SALES_TABLE, FCT_SALES_TABLE};
use crate::query::compile::QueryCompiler;
use crate::query::request::{Filter, QueryRequest};
use crate::query::transpiler::CompiledQuery;

/// Upper bound used where a report returns every group.
const ALL_GROUPS: u64 = 1000;

/// Named reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Report {
    KpiSummary,
    SalesByStore,
    SalesByChannel,
    SalesByMonth,
    TopProductsByRevenue,
    SalesByPaymentType,
    SalesByDay,
    TopCustomers,
    DeliveryByNeighborhood,
}

/// Caller-supplied report arguments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportArgs {
    /// Month bucket `YYYY-MM`, required by [`Report::SalesByDay`].
    pub month: Option<String>,
    /// Best-first instead of worst-first for [`Report::DeliveryByNeighborhood`].
    pub ascending: bool,
}

/// Neighborhoods with this many deliveries or fewer are left out.
const MIN_NEIGHBORHOOD_DELIVERIES: i64 = 5;

impl Report {
    pub const ALL: [Report; 9] = [
        Report::KpiSummary,
        Report::SalesByStore,
        Report::SalesByChannel,
        Report::SalesByMonth,
        Report::TopProductsByRevenue,
        Report::SalesByPaymentType,
        Report::SalesByDay,
        Report::TopCustomers,
        Report::DeliveryByNeighborhood,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Report::KpiSummary => "kpi_summary",
            Report::SalesByStore => "sales_by_store",
            Report::SalesByChannel => "sales_by_channel",
            Report::SalesByMonth => "sales_by_month",
            Report::TopProductsByRevenue => "top_products_by_revenue",
            Report::SalesByPaymentType => "sales_by_payment_type",
            Report::SalesByDay => "sales_by_day",
            Report::TopCustomers => "top_customers",
            Report::DeliveryByNeighborhood => "delivery_by_neighborhood",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Report::KpiSummary => "Revenue, average ticket, sale count and delivery time",
            Report::SalesByStore => "Revenue and sale count per store",
            Report::SalesByChannel => "Revenue and sale count per channel",
            Report::SalesByMonth => "Revenue per month",
            Report::TopProductsByRevenue => "Top 20 products by revenue",
            Report::SalesByPaymentType => "Revenue per payment type",
            Report::SalesByDay => "Daily revenue per channel for one month (--month YYYY-MM)",
            Report::TopCustomers => "Customers by purchase count with last purchase",
            Report::DeliveryByNeighborhood => {
                "Average delivery minutes per neighborhood, worst first (--ascending for best)"
            }
        }
    }

    pub fn from_name(name: &str) -> MartResult<Self> {
        Report::ALL
            .into_iter()
            .find(|r| r.name() == name)
            .ok_or_else(|| MartError::UnknownReport(name.to_string()))
    }

    /// Mart table this report reads.
    pub fn table(&self) -> &'static str {
        match self {
            Report::TopProductsByRevenue => FCT_PRODUCT_SALES_TABLE,
            _ => FCT_SALES_TABLE,
        }
    }

    /// The request behind this report.
    pub fn request(&self, args: &ReportArgs) -> MartResult<QueryRequest> {
        let request = match self {
            Report::KpiSummary => QueryRequest::new()
                .metric("SUM(sale_total_amount) AS faturamento_total")
                .metric("AVG(sale_total_amount) AS ticket_medio")
                .metric("COUNT(sale_id) AS total_vendas")
                .metric("AVG(delivery_seconds / 60.0) AS avg_tempo_entrega_min")
                .limit(1),
            Report::SalesByStore => QueryRequest::new()
                .metric("SUM(sale_total_amount) AS faturamento")
                .metric("COUNT(sale_id) AS total_vendas")
                .dimension("store_name")
                .order_by("faturamento", "desc")
                .limit(ALL_GROUPS),
            Report::SalesByChannel => QueryRequest::new()
                .metric("SUM(sale_total_amount) AS faturamento")
                .metric("COUNT(sale_id) AS total_vendas")
                .dimension("channel_name")
                .order_by("faturamento", "desc")
                .limit(ALL_GROUPS),
            Report::SalesByMonth => QueryRequest::new()
                .metric("SUM(sale_total_amount) AS faturamento")
                .dimension("mes_ano")
                .order_by("mes_ano", "asc")
                .limit(ALL_GROUPS),
            Report::TopProductsByRevenue => QueryRequest::new()
                .metric("SUM(product_total_price) AS faturamento")
                .dimension("product_name")
                .order_by("faturamento", "desc")
                .limit(20),
            Report::SalesByPaymentType => QueryRequest::new()
                .metric("SUM(sale_total_amount) AS faturamento")
                .dimension("COALESCE(payment_type, 'Não Identificado') AS forma_pagamento")
                .order_by("faturamento", "desc")
                .limit(ALL_GROUPS),
            Report::SalesByDay => {
                let month = args.month.as_deref().ok_or_else(|| {
                    MartError::InvalidRequest("report 'sales_by_day' needs a month (YYYY-MM)".into())
                })?;
                QueryRequest::new()
                    .metric("SUM(sale_total_amount) AS faturamento")
                    .dimension("data_venda")
                    .dimension("channel_name")
                    .filter(Filter::new("mes_ano", "eq", month))
                    .order_by("data_venda", "asc")
                    .order_by("channel_name", "asc")
                    .limit(ALL_GROUPS)
            }
            Report::TopCustomers => QueryRequest::new()
                .metric("COUNT(sale_id) AS total_vendas")
                .metric("MAX(sale_created_at) AS ultima_compra_data")
                .dimension("customer_id")
                .order_by("total_vendas", "desc")
                .limit(100),
            Report::DeliveryByNeighborhood => QueryRequest::new()
                .metric("AVG(delivery_seconds / 60.0) AS tempo_medio_min")
                .metric("COUNT(sale_id) AS total_entregas")
                .dimension("delivery_neighborhood")
                .filter(Filter::new("channel_type", "eq", "D"))
                .filter(Filter::unary("delivery_neighborhood", "not_null"))
                .having(Filter::new("total_entregas", "gt", MIN_NEIGHBORHOOD_DELIVERIES))
                .order_by("tempo_medio_min", if args.ascending { "asc" } else { "desc" })
                .limit(20),
        };
        Ok(request)
    }

    /// Compile this report against its table.
    pub fn compile(&self, args: &ReportArgs) -> MartResult<CompiledQuery> {
        QueryCompiler::new(self.table()).compile(&self.request(args)?)
    }
}
