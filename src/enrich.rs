//! Customer enrichment: attach name/contact details to aggregate rows.
//!
//! The directory is an external collaborator. A customer present in the mart
//! but absent from the directory is a normal outcome and yields null fields.

use crate::engine::Record;
use crate::error::MartResult;

use serde::Serialize;
use std::collections::{BTreeSet, HashMap};

/// Contact details for one customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CustomerContact {
    pub customer_id: i64,
    pub name: Option<String>,
    pub contact: Option<String>,
}

/// Looks up customers by identifier.
#[allow(async_fn_in_trait)]
pub trait CustomerDirectory {
    async fn lookup(&self, ids: &[i64]) -> MartResult<Vec<CustomerContact>>;
}

/// A directory backed by an in-memory map.
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    customers: HashMap<i64, CustomerContact>,
}

impl StaticDirectory {
    pub fn new(contacts: impl IntoIterator<Item = CustomerContact>) -> Self {
        Self {
            customers: contacts.into_iter().map(|c| (c.customer_id, c)).collect(),
        }
    }
}

impl CustomerDirectory for StaticDirectory {
    async fn lookup(&self, ids: &[i64]) -> MartResult<Vec<CustomerContact>> {
        Ok(ids.iter().filter_map(|id| self.customers.get(id).cloned()).collect())
    }
}

/// Outcome of an enrichment pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EnrichStats {
    pub matched: usize,
    pub unmatched: usize,
}

/// Append `customer_name` and `contact` to every record, keyed by `id_column`.
///
/// Records whose id is null or non-integer are counted as unmatched.
pub async fn enrich_records<D: CustomerDirectory>(
    records: &mut [Record],
    id_column: &str,
    directory: &D,
) -> MartResult<EnrichStats> {
    let ids: BTreeSet<i64> = records
        .iter()
        .filter_map(|r| r.get(id_column).and_then(|v| v.as_i64()))
        .collect();
    let ids: Vec<i64> = ids.into_iter().collect();

    let contacts: HashMap<i64, CustomerContact> = if ids.is_empty() {
        HashMap::new()
    } else {
        directory
            .lookup(&ids)
            .await?
            .into_iter()
            .map(|c| (c.customer_id, c))
            .collect()
    };

    let mut stats = EnrichStats::default();
    for record in records.iter_mut() {
        let contact = record
            .get(id_column)
            .and_then(|v| v.as_i64())
            .and_then(|id| contacts.get(&id));

        match contact {
            Some(c) => {
                stats.matched += 1;
                let name = c.name.clone().map(serde_json::Value::String).unwrap_or_default();
                let info = c.contact.clone().map(serde_json::Value::String).unwrap_or_default();
                record.push("customer_name", name);
                record.push("contact", info);
            }
            None => {
                stats.unmatched += 1;
                record.push("customer_name", serde_json::Value::Null);
                record.push("contact", serde_json::Value::Null);
            }
        }
    }

    Ok(stats)
}
