use anyhow::Result;
use jiff::Timestamp;
use serde::{Deserialize, Serialize};

use super::{parse_key, Database};
use crate::query::FilterNode;

/// A stored segment: a named filter tree owned by its creator. Immutable
/// once created; there is deliberately no update operation.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub(crate) struct Segment {
    pub(crate) name: String,
    pub(crate) query: FilterNode,
    pub(crate) created_by: String,
    pub(crate) created_at: Timestamp,
}

impl Database {
    pub(crate) fn insert_segment(&self, segment: &Segment) -> Result<u64> {
        let id = self.generate_id()?;
        // The filter tree is a serde-untagged union, which needs a
        // self-describing format; segments are stored as JSON rather than
        // bincode for that reason.
        self.segment_partition
            .insert(id.to_be_bytes(), serde_json::to_vec(segment)?)?;
        Ok(id)
    }

    pub(crate) fn segment(&self, id: u64) -> Result<Option<Segment>> {
        self.segment_partition
            .get(id.to_be_bytes())?
            .map(|value| Ok(serde_json::from_slice(&value)?))
            .transpose()
    }

    pub(crate) fn segments(
        &self,
    ) -> impl DoubleEndedIterator<Item = Result<(u64, Segment)>> + 'static {
        self.segment_partition.iter().map(|item| {
            let (key, value) = item?;
            Ok((parse_key(&key)?, serde_json::from_slice(&value)?))
        })
    }
}
