use std::sync::Arc;

use async_graphql::{ComplexObject, Context, Object, Result, SimpleObject, ID};
use jiff::Timestamp;
use tracing::info;

use super::{actor, customer::Customer, parse_id, DateTimeUtc};
use crate::database::{self, Database};
use crate::llm::{self, TextGenerator};
use crate::query::translate::translate;

/// An outreach record. `appliedTo` is the audience frozen at creation time:
/// a historical record of who was targeted, never a live view.
#[derive(SimpleObject)]
#[graphql(complex)]
pub(crate) struct Campaign {
    pub(crate) id: ID,
    pub(crate) name: String,
    pub(crate) message: String,
    pub(crate) segment_id: ID,
    pub(crate) applied_to: Vec<ID>,
    pub(crate) created_by: String,
    pub(crate) created_at: DateTimeUtc,
}

#[ComplexObject]
impl Campaign {
    /// Name of the segment this campaign targeted, if it still exists.
    async fn segment_name(&self, ctx: &Context<'_>) -> Result<Option<String>> {
        let db = ctx.data::<Database>()?;
        let id = parse_id(&self.segment_id)?;
        let segment = db
            .segment(id)
            .map_err(|e| format!("failed to read database: {e}"))?;
        Ok(segment.map(|segment| segment.name))
    }

    /// The frozen audience, resolved to customer records. Customers deleted
    /// since the campaign was created are skipped.
    async fn audience(&self, ctx: &Context<'_>) -> Result<Vec<Customer>> {
        let db = ctx.data::<Database>()?;
        let mut customers = Vec::new();
        for id in &self.applied_to {
            let id = parse_id(id)?;
            if let Some(record) = db
                .customer(id)
                .map_err(|e| format!("failed to read database: {e}"))?
            {
                customers.push(Customer::from_record(id, record));
            }
        }
        Ok(customers)
    }
}

impl Campaign {
    fn from_record(id: u64, record: database::campaign::Campaign) -> Self {
        Self {
            id: ID(id.to_string()),
            name: record.name,
            message: record.message,
            segment_id: ID(record.segment_id.to_string()),
            applied_to: record
                .applied_to
                .into_iter()
                .map(|id| ID(id.to_string()))
                .collect(),
            created_by: record.created_by,
            created_at: DateTimeUtc(record.created_at),
        }
    }
}

#[derive(Default)]
pub(crate) struct CampaignQuery;

#[Object]
impl CampaignQuery {
    /// The acting user's campaigns, newest first.
    async fn campaigns(&self, ctx: &Context<'_>) -> Result<Vec<Campaign>> {
        let user = actor(ctx)?;
        let db = ctx.data::<Database>()?;
        let mut campaigns = Vec::new();
        for item in db.campaigns().rev() {
            let (id, record) = item.map_err(|e| format!("failed to read database: {e}"))?;
            if record.created_by == user {
                campaigns.push(Campaign::from_record(id, record));
            }
        }
        Ok(campaigns)
    }

    async fn campaign(&self, ctx: &Context<'_>, id: ID) -> Result<Campaign> {
        let db = ctx.data::<Database>()?;
        let id = parse_id(&id)?;
        let record = db
            .campaign(id)
            .map_err(|e| format!("failed to read database: {e}"))?
            .ok_or("campaign not found")?;
        Ok(Campaign::from_record(id, record))
    }
}

#[derive(Default)]
pub(crate) struct CampaignMutation;

#[Object]
impl CampaignMutation {
    /// Resolves the segment, evaluates its query against the customers as
    /// they are right now, and persists the matching id set frozen onto the
    /// new campaign. The read and the write are not transactional; customers
    /// may change in between, and the snapshot simply reflects the read.
    async fn create_campaign(
        &self,
        ctx: &Context<'_>,
        name: String,
        segment_id: ID,
        message: String,
    ) -> Result<Campaign> {
        let user = actor(ctx)?;
        let db = ctx.data::<Database>()?;
        if name.trim().is_empty() {
            return Err("campaign name is required".into());
        }
        if message.trim().is_empty() {
            return Err("campaign message is required".into());
        }
        let segment_key = parse_id(&segment_id)?;
        let segment = db
            .segment(segment_key)
            .map_err(|e| format!("failed to read database: {e}"))?
            .ok_or("segment not found")?;
        let predicate = translate(&segment.query)?;
        let applied_to = db
            .matching_ids(&predicate)
            .map_err(|e| format!("failed to read database: {e}"))?;
        let record = database::campaign::Campaign {
            name: name.trim().to_string(),
            message,
            segment_id: segment_key,
            applied_to,
            created_by: user.to_string(),
            created_at: Timestamp::now(),
        };
        let id = db
            .insert_campaign(&record)
            .map_err(|e| format!("failed to write database: {e}"))?;
        info!(
            "campaign {id} created by {user}, targeting {} customers",
            record.applied_to.len()
        );
        Ok(Campaign::from_record(id, record))
    }

    /// Asks the language model for three message variants for a campaign
    /// goal.
    async fn suggest_messages(&self, ctx: &Context<'_>, goal: String) -> Result<Vec<String>> {
        actor(ctx)?;
        let generator = ctx.data::<Arc<dyn TextGenerator>>()?;
        let reply = generator.generate(&llm::suggest_prompt(&goal)).await?;
        Ok(llm::parse_suggestions(&reply)?)
    }
}
