//! Flattening queries: the join that turns normalized sales into mart rows.
//!
//! Two layouts share the same fragments:
//!
//! | Layout  | Tables                              | Grain                    |
//! |---------|-------------------------------------|--------------------------|
//! | `Flat`  | `sales_mart`                        | sale × product line      |
//! | `Split` | `fct_sales`, `fct_product_sales`    | sale; sale × product line |
//!
//! Both restrict to completed sales with the same predicate and join sales to
//! product lines on the same key, so figures from either layout reconcile.

use serde::Deserialize;

/// Terminal status of a sale that counts toward revenue.
pub const COMPLETED_STATUS: &str = "COMPLETED";

/// Join key between the sale grain and the product grain.
pub const SALE_JOIN_KEY: &str = "sale_id";

/// Table name of the single-table layout.
pub const SALES_MART_TABLE: &str = "sales_mart";
/// Sale-grain fact table of the split layout.
pub const FCT_SALES_TABLE: &str = "fct_sales";
/// Product-grain fact table of the split layout.
pub const FCT_PRODUCT_SALES_TABLE: &str = "fct_product_sales";

/// How a payment type is attached to a sale that may have several payments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentPolicy {
    /// Whichever payment the source returns first. Order is unspecified.
    #[default]
    FirstFound,
    /// The payment with the lowest id.
    LowestPaymentId,
}

/// What happens to completed sales with no product lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductlessSales {
    /// Inner join: the sale contributes no rows.
    #[default]
    Drop,
    /// Left join: one row with null product columns.
    Keep,
}

/// Policy knobs baked into every flattening query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FlattenPolicy {
    pub payment: PaymentPolicy,
    pub productless_sales: ProductlessSales,
    /// Only sales with `id <= max_sale_id` (sampled builds).
    pub max_sale_id: Option<i64>,
}

/// Which set of mart tables to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MartLayout {
    Flat,
    #[default]
    Split,
}

impl std::str::FromStr for MartLayout {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "flat" => Ok(MartLayout::Flat),
            "split" => Ok(MartLayout::Split),
            other => Err(format!("unknown layout '{}', expected flat or split", other)),
        }
    }
}

/// One unit of pipeline work: a source query and the mart table it fills.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSpec {
    pub query: String,
    pub table_name: String,
}

impl TableSpec {
    pub fn new(query: impl Into<String>, table_name: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            table_name: table_name.into(),
        }
    }
}

impl MartLayout {
    /// Ordered table specs for this layout.
    pub fn table_specs(&self, policy: &FlattenPolicy) -> Vec<TableSpec> {
        match self {
            MartLayout::Flat => vec![TableSpec::new(sales_mart_query(policy), SALES_MART_TABLE)],
            MartLayout::Split => vec![
                TableSpec::new(fct_sales_query(policy), FCT_SALES_TABLE),
                TableSpec::new(fct_product_sales_query(policy), FCT_PRODUCT_SALES_TABLE),
            ],
        }
    }

    pub fn table_names(&self) -> Vec<&'static str> {
        match self {
            MartLayout::Flat => vec![SALES_MART_TABLE],
            MartLayout::Split => vec![FCT_SALES_TABLE, FCT_PRODUCT_SALES_TABLE],
        }
    }
}

/// `WHERE` body restricting `sales s` to the completed (and sampled) set.
pub fn completed_sales_filter(policy: &FlattenPolicy) -> String {
    let mut filter = format!("s.sale_status_desc = '{}'", COMPLETED_STATUS);
    if let Some(max) = policy.max_sale_id {
        filter.push_str(&format!(" AND s.id <= {}", max));
    }
    filter
}

/// Scalar subquery attaching exactly one payment type to a sale.
pub fn payment_type_subquery(policy: PaymentPolicy) -> String {
    let order = match policy {
        PaymentPolicy::FirstFound => "",
        PaymentPolicy::LowestPaymentId => " ORDER BY p.id",
    };
    format!(
        "(SELECT pt.description FROM payments p \
         JOIN payment_types pt ON p.payment_type_id = pt.id \
         WHERE p.sale_id = s.id{} LIMIT 1)",
        order
    )
}

/// Join between a sale-grain CTE and `products_base`.
pub fn product_join(sales_alias: &str, policy: ProductlessSales) -> String {
    let kind = match policy {
        ProductlessSales::Drop => "JOIN",
        ProductlessSales::Keep => "LEFT JOIN",
    };
    format!(
        "{} products_base pb ON {}.{} = pb.{}",
        kind, sales_alias, SALE_JOIN_KEY, SALE_JOIN_KEY
    )
}

const CALENDAR_COLUMNS: &str = "\
        EXTRACT(DOW FROM s.created_at)::int AS dia_da_semana,
        CASE EXTRACT(DOW FROM s.created_at)::int
            WHEN 0 THEN 'Domingo'
            WHEN 1 THEN 'Segunda'
            WHEN 2 THEN 'Terça'
            WHEN 3 THEN 'Quarta'
            WHEN 4 THEN 'Quinta'
            WHEN 5 THEN 'Sexta'
            WHEN 6 THEN 'Sábado'
        END AS dia_da_semana_nome,
        TO_CHAR(s.created_at, 'YYYY-MM') AS mes_ano,
        EXTRACT(HOUR FROM s.created_at)::int AS hora_do_dia,
        DATE(s.created_at) AS data_venda,
        CASE
            WHEN EXTRACT(HOUR FROM s.created_at) BETWEEN 0 AND 5 THEN 'Madrugada'
            WHEN EXTRACT(HOUR FROM s.created_at) BETWEEN 6 AND 11 THEN 'Manhã'
            WHEN EXTRACT(HOUR FROM s.created_at) BETWEEN 12 AND 17 THEN 'Almoço'
            ELSE 'Jantar'
        END AS periodo_do_dia";

const SALE_MEASURES: &str = "\
        s.sale_status_desc,
        s.total_amount::float8 AS sale_total_amount,
        s.total_discount::float8 AS total_discount,
        s.discount_reason,
        s.delivery_fee::float8 AS delivery_fee,
        s.service_tax_fee::float8 AS service_tax_fee,
        s.production_seconds,
        s.delivery_seconds";

const SALE_FROM: &str = "\
    FROM sales s
    JOIN stores st ON s.store_id = st.id
    JOIN channels ch ON s.channel_id = ch.id
    LEFT JOIN delivery_addresses da ON s.id = da.sale_id";

/// Product lines with customizations collapsed to one row per line.
fn products_base_cte() -> &'static str {
    "products_base AS (
    SELECT
        ps.sale_id,
        p.id AS product_id,
        p.name AS product_name,
        cat.name AS product_category,
        ps.quantity AS product_quantity,
        ps.base_price::float8 AS product_base_price,
        ps.total_price::float8 AS product_total_price,
        STRING_AGG(i.name, ', ') AS items_names,
        SUM(ips.additional_price)::float8 AS items_total_additional_price
    FROM product_sales ps
    JOIN products p ON ps.product_id = p.id
    LEFT JOIN categories cat ON p.category_id = cat.id
    LEFT JOIN item_product_sales ips ON ps.id = ips.product_sale_id
    LEFT JOIN items i ON ips.item_id = i.id
    GROUP BY ps.id, ps.sale_id, p.id, p.name, cat.name, ps.quantity, ps.base_price, ps.total_price
)"
}

/// Full sale-grain projection, used by `sales_mart` and `fct_sales`.
fn sales_base_cte(policy: &FlattenPolicy) -> String {
    format!(
        "sales_base AS (
    SELECT
        s.id AS sale_id,
        s.created_at AS sale_created_at,
{calendar},
{measures},
        st.name AS store_name,
        st.city AS store_city,
        ch.name AS channel_name,
        ch.type AS channel_type,
        s.customer_id,
        da.neighborhood AS delivery_neighborhood,
        da.city AS delivery_city,
        {payment} AS payment_type
{from}
    WHERE {filter}
)",
        calendar = CALENDAR_COLUMNS,
        measures = SALE_MEASURES,
        payment = payment_type_subquery(policy.payment),
        from = SALE_FROM,
        filter = completed_sales_filter(policy),
    )
}

/// Slim sale dimensions repeated on each product line of `fct_product_sales`.
fn sales_dims_cte(policy: &FlattenPolicy) -> String {
    format!(
        "sales_dims AS (
    SELECT
        s.id AS sale_id,
        s.created_at AS sale_created_at,
        TO_CHAR(s.created_at, 'YYYY-MM') AS mes_ano,
        DATE(s.created_at) AS data_venda,
        st.name AS store_name,
        ch.name AS channel_name,
        ch.type AS channel_type,
        da.neighborhood AS delivery_neighborhood
{from}
    WHERE {filter}
)",
        from = SALE_FROM,
        filter = completed_sales_filter(policy),
    )
}

const PRODUCT_COLUMNS: &str = "\
    pb.product_id,
    pb.product_name,
    pb.product_category,
    pb.product_quantity,
    pb.product_base_price,
    pb.product_total_price,
    pb.items_names";

/// Single fully-flattened table: sale attributes repeated per product line.
pub fn sales_mart_query(policy: &FlattenPolicy) -> String {
    format!(
        "WITH {sales},
{products}
SELECT
    sb.*,
{product_columns},
    pb.items_total_additional_price
FROM sales_base sb
{join}",
        sales = sales_base_cte(policy),
        products = products_base_cte(),
        product_columns = PRODUCT_COLUMNS,
        join = product_join("sb", policy.productless_sales),
    )
}

/// Sale-grain fact: one row per completed sale.
pub fn fct_sales_query(policy: &FlattenPolicy) -> String {
    format!("WITH {}\nSELECT * FROM sales_base", sales_base_cte(policy))
}

/// Product-grain fact: one row per product line, with sale dimensions.
pub fn fct_product_sales_query(policy: &FlattenPolicy) -> String {
    format!(
        "WITH {products},
{dims}
SELECT
    sd.*,
{product_columns}
FROM sales_dims sd
{join}",
        products = products_base_cte(),
        dims = sales_dims_cte(policy),
        product_columns = PRODUCT_COLUMNS,
        join = product_join("sd", policy.productless_sales),
    )
}
