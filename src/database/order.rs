use anyhow::Result;
use jiff::Timestamp;
use serde::{Deserialize, Serialize};

use super::{range_iter, Database, Iter, TryFromKeyValue};

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub(crate) struct Order {
    pub(crate) customer_id: u64,
    pub(crate) amount: f64,
    pub(crate) items: Vec<OrderItem>,
    pub(crate) order_date: Timestamp,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub(crate) struct OrderItem {
    pub(crate) name: String,
    pub(crate) quantity: u32,
    pub(crate) price: f64,
}

impl Database {
    pub(crate) fn insert_order(&self, order: &Order) -> Result<u64> {
        let id = self.generate_id()?;
        Database::insert(&self.order_partition, id, order)?;
        Ok(id)
    }

    pub(crate) fn order(&self, id: u64) -> Result<Option<Order>> {
        Database::get(&self.order_partition, id)
    }

    pub(crate) fn delete_order(&self, id: u64) -> Result<bool> {
        Database::remove(&self.order_partition, id)
    }

    pub(crate) fn orders<T: TryFromKeyValue>(
        &self,
        start: Option<u64>,
        end: Option<u64>,
    ) -> Iter<T> {
        range_iter(&self.order_partition, start, end)
    }
}
