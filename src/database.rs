pub(crate) mod campaign;
pub(crate) mod customer;
pub(crate) mod order;
pub(crate) mod segment;

use std::marker::PhantomData;
use std::path::Path;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::{Db, Tree};

/// Handle to the document store: one keyed partition per entity. Cloning is
/// cheap and every component receives its own handle; nothing in the crate
/// holds a global connection.
#[derive(Clone)]
pub(crate) struct Database {
    db: Db,
    customer_partition: Tree,
    order_partition: Tree,
    segment_partition: Tree,
    campaign_partition: Tree,
}

impl Database {
    pub(crate) fn connect(path: &Path) -> Result<Database> {
        let db = sled::open(path)?;
        let customer_partition = db.open_tree("customers")?;
        let order_partition = db.open_tree("orders")?;
        let segment_partition = db.open_tree("segments")?;
        let campaign_partition = db.open_tree("campaigns")?;
        Ok(Database {
            db,
            customer_partition,
            order_partition,
            segment_partition,
            campaign_partition,
        })
    }

    /// Ids are monotonic, so big-endian keys keep every partition in
    /// creation order and reverse iteration yields newest first.
    fn generate_id(&self) -> Result<u64> {
        Ok(self.db.generate_id()?)
    }

    fn insert<T: Serialize>(partition: &Tree, id: u64, value: &T) -> Result<()> {
        partition.insert(id.to_be_bytes(), bincode::serialize(value)?)?;
        Ok(())
    }

    fn get<T: DeserializeOwned>(partition: &Tree, id: u64) -> Result<Option<T>> {
        partition
            .get(id.to_be_bytes())?
            .map(|value| Ok(bincode::deserialize(&value)?))
            .transpose()
    }

    fn remove(partition: &Tree, id: u64) -> Result<bool> {
        Ok(partition.remove(id.to_be_bytes())?.is_some())
    }
}

pub(crate) fn parse_key(key: &[u8]) -> Result<u64> {
    let bytes: [u8; 8] = key.try_into().context("key is not a big-endian u64")?;
    Ok(u64::from_be_bytes(bytes))
}

/// Builds an API node from a raw key/value pair read from a partition.
pub(crate) trait TryFromKeyValue: Sized {
    fn try_from_key_value(key: &[u8], value: &[u8]) -> Result<Self>;
}

pub(crate) struct Iter<T> {
    inner: sled::Iter,
    _marker: PhantomData<T>,
}

impl<T> Iter<T> {
    fn new(inner: sled::Iter) -> Self {
        Iter {
            inner,
            _marker: PhantomData,
        }
    }
}

impl<T: TryFromKeyValue> Iterator for Iter<T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|item| {
            let (key, value) = item?;
            T::try_from_key_value(&key, &value)
        })
    }
}

impl<T: TryFromKeyValue> DoubleEndedIterator for Iter<T> {
    fn next_back(&mut self) -> Option<Self::Item> {
        self.inner.next_back().map(|item| {
            let (key, value) = item?;
            T::try_from_key_value(&key, &value)
        })
    }
}

/// Range scan over a partition; `start` is inclusive, `end` exclusive.
fn range_iter<T>(partition: &Tree, start: Option<u64>, end: Option<u64>) -> Iter<T> {
    let start = start.unwrap_or(0).to_be_bytes().to_vec();
    if let Some(end) = end {
        Iter::new(partition.range(start..end.to_be_bytes().to_vec()))
    } else {
        Iter::new(partition.range(start..))
    }
}
