use std::sync::Arc;

use async_graphql::{Context, Json, Object, Result, SimpleObject, ID};
use jiff::Timestamp;
use tracing::info;

use super::{actor, DateTimeUtc};
use crate::database::{self, Database};
use crate::llm::{self, TextGenerator};
use crate::query::{translate::translate, validate, FilterNode};

#[derive(SimpleObject)]
pub(crate) struct Segment {
    pub(crate) id: ID,
    pub(crate) name: String,
    pub(crate) query: Json<FilterNode>,
    pub(crate) created_by: String,
    pub(crate) created_at: DateTimeUtc,
}

impl Segment {
    fn from_record(id: u64, record: database::segment::Segment) -> Self {
        Self {
            id: ID(id.to_string()),
            name: record.name,
            query: Json(record.query),
            created_by: record.created_by,
            created_at: DateTimeUtc(record.created_at),
        }
    }
}

#[derive(SimpleObject)]
pub(crate) struct Preview {
    pub(crate) count: u64,
}

#[derive(Default)]
pub(crate) struct SegmentQuery;

#[Object]
impl SegmentQuery {
    /// The acting user's segments, newest first.
    async fn segments(&self, ctx: &Context<'_>) -> Result<Vec<Segment>> {
        let user = actor(ctx)?;
        let db = ctx.data::<Database>()?;
        let mut segments = Vec::new();
        for item in db.segments().rev() {
            let (id, record) = item.map_err(|e| format!("failed to read database: {e}"))?;
            if record.created_by == user {
                segments.push(Segment::from_record(id, record));
            }
        }
        Ok(segments)
    }
}

#[derive(Default)]
pub(crate) struct SegmentMutation;

#[Object]
impl SegmentMutation {
    /// Validates a filter tree and returns how many customers it matches
    /// right now, without persisting anything. Cheap and side-effect-free so
    /// the segment builder can call it on every edit.
    async fn preview_segment(
        &self,
        ctx: &Context<'_>,
        query: Json<FilterNode>,
    ) -> Result<Preview> {
        actor(ctx)?;
        let db = ctx.data::<Database>()?;
        validate(&query.0)?;
        let predicate = translate(&query.0)?;
        let count = db
            .count_matching(&predicate)
            .map_err(|e| format!("failed to read database: {e}"))?;
        Ok(Preview { count })
    }

    async fn create_segment(
        &self,
        ctx: &Context<'_>,
        name: String,
        query: Json<FilterNode>,
    ) -> Result<Segment> {
        let user = actor(ctx)?;
        let db = ctx.data::<Database>()?;
        if name.trim().is_empty() {
            return Err("segment name is required".into());
        }
        validate(&query.0)?;
        let record = database::segment::Segment {
            name: name.trim().to_string(),
            query: query.0,
            created_by: user.to_string(),
            created_at: Timestamp::now(),
        };
        let id = db
            .insert_segment(&record)
            .map_err(|e| format!("failed to write database: {e}"))?;
        info!("segment {id} created by {user}");
        Ok(Segment::from_record(id, record))
    }

    /// Asks the language model to turn a free-text description into a filter
    /// tree. The model's output is untrusted; it goes through the same
    /// validation gate as client-built queries before being returned.
    async fn parse_segment(&self, ctx: &Context<'_>, text: String) -> Result<Json<FilterNode>> {
        actor(ctx)?;
        let generator = ctx.data::<Arc<dyn TextGenerator>>()?;
        let reply = generator.generate(&llm::segment_prompt(&text)).await?;
        let node = llm::parse_segment_reply(&reply)?;
        validate(&node)?;
        Ok(Json(node))
    }
}
