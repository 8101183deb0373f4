use anyhow::Result;
use jiff::Timestamp;
use serde::{Deserialize, Serialize};

use super::{parse_key, range_iter, Database, Iter, TryFromKeyValue};
use crate::query::translate::Predicate;
use crate::query::FieldValue;

/// A stored customer record; its id lives in the partition key.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub(crate) struct Customer {
    pub(crate) name: String,
    pub(crate) email: String,
    pub(crate) total_spend: f64,
    pub(crate) last_visit: Timestamp,
    pub(crate) tags: Vec<String>,
    pub(crate) created_at: Timestamp,
}

impl Customer {
    /// Resolves a registry field name to its value on this record. Arms here
    /// mirror the entries of [`crate::query::FIELDS`].
    pub(crate) fn field(&self, name: &str) -> Option<FieldValue<'_>> {
        match name {
            "totalSpend" => Some(FieldValue::Number(self.total_spend)),
            "lastVisit" => Some(FieldValue::Date(self.last_visit)),
            "tags" => Some(FieldValue::Tags(&self.tags)),
            _ => None,
        }
    }
}

impl Database {
    pub(crate) fn insert_customer(&self, customer: &Customer) -> Result<u64> {
        let id = self.generate_id()?;
        Database::insert(&self.customer_partition, id, customer)?;
        Ok(id)
    }

    pub(crate) fn customer(&self, id: u64) -> Result<Option<Customer>> {
        Database::get(&self.customer_partition, id)
    }

    pub(crate) fn update_customer(&self, id: u64, customer: &Customer) -> Result<bool> {
        if self.customer_partition.get(id.to_be_bytes())?.is_none() {
            return Ok(false);
        }
        Database::insert(&self.customer_partition, id, customer)?;
        Ok(true)
    }

    pub(crate) fn delete_customer(&self, id: u64) -> Result<bool> {
        Database::remove(&self.customer_partition, id)
    }

    pub(crate) fn customers<T: TryFromKeyValue>(
        &self,
        start: Option<u64>,
        end: Option<u64>,
    ) -> Iter<T> {
        range_iter(&self.customer_partition, start, end)
    }

    pub(crate) fn customer_count(&self) -> u64 {
        self.customer_partition.len() as u64
    }

    /// Preview: how many customers the predicate matches right now.
    /// Read-only; two calls with no intervening writes return the same count.
    pub(crate) fn count_matching(&self, predicate: &Predicate) -> Result<u64> {
        let mut count = 0;
        for item in self.customer_partition.iter() {
            let (_, value) = item?;
            let customer: Customer = bincode::deserialize(&value)?;
            if predicate.matches(&customer) {
                count += 1;
            }
        }
        Ok(count)
    }

    /// Materialization: the ids of every matching customer at the moment of
    /// the call, in ascending id order. There is no snapshot isolation; a
    /// later call may see different data.
    pub(crate) fn matching_ids(&self, predicate: &Predicate) -> Result<Vec<u64>> {
        let mut ids = Vec::new();
        for item in self.customer_partition.iter() {
            let (key, value) = item?;
            let customer: Customer = bincode::deserialize(&value)?;
            if predicate.matches(&customer) {
                ids.push(parse_key(&key)?);
            }
        }
        Ok(ids)
    }
}
