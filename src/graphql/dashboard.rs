use std::collections::HashSet;

use async_graphql::{Context, Object, Result, SimpleObject};
use jiff::{SignedDuration, Timestamp};

use super::{actor, DateTimeUtc};
use crate::database::Database;

const RECENT_LIMIT: usize = 3;

#[derive(SimpleObject)]
pub(crate) struct DashboardMetrics {
    pub(crate) total_customers: u64,
    pub(crate) total_segments: u64,
    pub(crate) total_campaigns: u64,
    /// Unique customers targeted by the acting user's campaigns created in
    /// the last seven days.
    pub(crate) reach_last_7_days: u64,
    pub(crate) recent_segments: Vec<RecentSegment>,
    pub(crate) recent_campaigns: Vec<RecentCampaign>,
}

#[derive(SimpleObject)]
pub(crate) struct RecentSegment {
    pub(crate) name: String,
    pub(crate) created_at: DateTimeUtc,
}

#[derive(SimpleObject)]
pub(crate) struct RecentCampaign {
    pub(crate) name: String,
    pub(crate) audience_size: u64,
    pub(crate) created_at: DateTimeUtc,
}

#[derive(Default)]
pub(crate) struct DashboardQuery;

#[Object]
impl DashboardQuery {
    async fn dashboard(&self, ctx: &Context<'_>) -> Result<DashboardMetrics> {
        let user = actor(ctx)?;
        let db = ctx.data::<Database>()?;
        let one_week_ago = Timestamp::now() - SignedDuration::from_hours(24 * 7);

        let mut total_segments = 0;
        let mut recent_segments = Vec::new();
        for item in db.segments().rev() {
            let (_, segment) = item.map_err(|e| format!("failed to read database: {e}"))?;
            if segment.created_by != user {
                continue;
            }
            total_segments += 1;
            if recent_segments.len() < RECENT_LIMIT {
                recent_segments.push(RecentSegment {
                    name: segment.name,
                    created_at: DateTimeUtc(segment.created_at),
                });
            }
        }

        let mut total_campaigns = 0;
        let mut recent_campaigns = Vec::new();
        let mut reached = HashSet::new();
        for item in db.campaigns().rev() {
            let (_, campaign) = item.map_err(|e| format!("failed to read database: {e}"))?;
            if campaign.created_by != user {
                continue;
            }
            total_campaigns += 1;
            if campaign.created_at >= one_week_ago {
                reached.extend(campaign.applied_to.iter().copied());
            }
            if recent_campaigns.len() < RECENT_LIMIT {
                recent_campaigns.push(RecentCampaign {
                    name: campaign.name,
                    audience_size: campaign.applied_to.len() as u64,
                    created_at: DateTimeUtc(campaign.created_at),
                });
            }
        }

        Ok(DashboardMetrics {
            total_customers: db.customer_count(),
            total_segments,
            total_campaigns,
            reach_last_7_days: reached.len() as u64,
            recent_segments,
            recent_campaigns,
        })
    }
}
