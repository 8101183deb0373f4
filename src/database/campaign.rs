use anyhow::Result;
use jiff::Timestamp;
use serde::{Deserialize, Serialize};

use super::{parse_key, Database};

/// A stored campaign. `applied_to` is the customer id set frozen at
/// creation time; it is never recomputed, even if the segment or the
/// customers change afterwards.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub(crate) struct Campaign {
    pub(crate) name: String,
    pub(crate) message: String,
    pub(crate) segment_id: u64,
    pub(crate) applied_to: Vec<u64>,
    pub(crate) created_by: String,
    pub(crate) created_at: Timestamp,
}

impl Database {
    pub(crate) fn insert_campaign(&self, campaign: &Campaign) -> Result<u64> {
        let id = self.generate_id()?;
        Database::insert(&self.campaign_partition, id, campaign)?;
        Ok(id)
    }

    pub(crate) fn campaign(&self, id: u64) -> Result<Option<Campaign>> {
        Database::get(&self.campaign_partition, id)
    }

    pub(crate) fn campaigns(
        &self,
    ) -> impl DoubleEndedIterator<Item = Result<(u64, Campaign)>> + 'static {
        self.campaign_partition.iter().map(|item| {
            let (key, value) = item?;
            Ok((parse_key(&key)?, bincode::deserialize(&value)?))
        })
    }
}
