//! Form 6765 Section G formatter: wage bucket classification per activity,
//! Line 49(f) descriptions, and persistence of the summary rows.

use chrono::{DateTime, Utc};
use db::models::{
    business_year::Business,
    employee::RoleKind,
    federal_credit::{FederalCreditRow, UpsertFederalCredit},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};
use ts_rs::TS;
use uuid::Uuid;

use super::{
    aggregator::{ActivityQre, compute_fresh},
    openai_api::{Line49fContext, OpenAiApiClient},
    store::{AllocationStore, StoreError},
};

/// Subcomponent grouping vocabulary used on Line 49 when no richer
/// taxonomy exists for the engagement.
const SUBCOMPONENT_GROUP_TAXONOMY: &str =
    "procedural subcomponents, diagnostic tools, workflow protocols";

const DEFAULT_SHRINKBACK_PERCENT: f64 = 100.0;

const DEFAULT_GUIDELINE_NOTES: &str =
    "Research was performed under established experimental protocols.";

#[derive(Debug, Error)]
pub enum SectionGError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("unknown business year: {0}")]
    UnknownBusinessYear(Uuid),
    #[error("business year {0} has no business profile")]
    MissingBusinessProfile(Uuid),
    #[error("QRE totals for business year {0} are locked; Section G rows are frozen")]
    YearLocked(Uuid),
    #[error("failed to serialize QRE snapshot: {0}")]
    Snapshot(#[from] serde_json::Error),
}

/// Section G wage line for one employee's QRE
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
pub enum WageBucket {
    /// Line 50, direct research wages
    Direct,
    /// Line 51, direct supervision wages
    Supervision,
    /// Line 52, direct support wages
    Support,
}

impl WageBucket {
    /// Classify an employee into a Section G wage line.
    ///
    /// Ownership outranks title: an owner is treated as performing direct
    /// research regardless of their stated role.
    pub fn classify(role: RoleKind, is_owner: bool) -> Self {
        if is_owner {
            return Self::Direct;
        }
        match role {
            RoleKind::ResearchLeader => Self::Direct,
            RoleKind::Supervisor => Self::Supervision,
            RoleKind::Admin => Self::Support,
            RoleKind::Other => Self::Direct,
        }
    }
}

/// One Section G business component row (Lines 49-52)
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct SectionGRow {
    pub research_activity_id: Option<Uuid>,
    pub research_activity_name: String,
    pub line_49f_description: String,
    pub direct_research_wages: i64,
    pub supervision_wages: i64,
    pub support_wages: i64,
    pub supplies_expenses: i64,
    pub contractor_expenses: i64,
    pub total_qre: i64,
    pub subcomponent_count: i64,
    pub subcomponent_groups: String,
    pub applied_percent: f64,
    pub ai_generation_timestamp: Option<DateTime<Utc>>,
}

impl SectionGRow {
    /// Total wages (Line 53): the sum of Lines 50-52
    pub fn total_wages(&self) -> i64 {
        self.direct_research_wages + self.supervision_wages + self.support_wages
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct SectionGReport {
    pub business_year_id: Uuid,
    pub year: i32,
    pub locked: bool,
    pub rows: Vec<SectionGRow>,
}

pub struct SectionGService<S> {
    store: S,
    openai: Option<OpenAiApiClient>,
}

impl<S: AllocationStore> SectionGService<S> {
    pub fn new(store: S, openai: Option<OpenAiApiClient>) -> Self {
        Self { store, openai }
    }

    /// Render Section G rows for a business year.
    ///
    /// Locked years are served from the persisted rows; unlocked years are
    /// recomputed from the current allocation snapshot without persisting.
    pub async fn report(&self, business_year_id: Uuid) -> Result<SectionGReport, SectionGError> {
        let year = self
            .store
            .fetch_business_year(business_year_id)
            .await?
            .ok_or(SectionGError::UnknownBusinessYear(business_year_id))?;

        if year.locked_totals().is_some() {
            let rows = self
                .store
                .fetch_federal_credit_rows(business_year_id)
                .await?
                .into_iter()
                .map(row_from_persisted)
                .collect();
            return Ok(SectionGReport {
                business_year_id,
                year: year.year,
                locked: true,
                rows,
            });
        }

        let rows = self.build_rows(business_year_id).await?;
        Ok(SectionGReport {
            business_year_id,
            year: year.year,
            locked: false,
            rows,
        })
    }

    /// Compute Section G rows and persist them via the keyed upsert.
    ///
    /// Saving is idempotent per (business year, client, activity name): a
    /// repeat save overwrites the existing row rather than duplicating it.
    pub async fn save(&self, business_year_id: Uuid) -> Result<Vec<FederalCreditRow>, SectionGError> {
        let year = self
            .store
            .fetch_business_year(business_year_id)
            .await?
            .ok_or(SectionGError::UnknownBusinessYear(business_year_id))?;
        if year.locked_totals().is_some() {
            return Err(SectionGError::YearLocked(business_year_id));
        }

        let business = self
            .store
            .fetch_business_profile(business_year_id)
            .await?
            .ok_or(SectionGError::MissingBusinessProfile(business_year_id))?;

        let snapshot = self.store.fetch_year_snapshot(business_year_id).await?;
        let (_, activities, _) = compute_fresh(&snapshot);

        let mut saved = Vec::with_capacity(activities.len());
        for activity in &activities {
            let narrative = self.narrative_for(activity, &business).await;
            let payload = upsert_payload(business_year_id, &business, activity, narrative)?;
            saved.push(self.store.upsert_federal_credit(&payload).await?);
        }

        info!(
            business_year_id = %business_year_id,
            row_count = saved.len(),
            "Section G rows saved"
        );
        Ok(saved)
    }

    async fn build_rows(&self, business_year_id: Uuid) -> Result<Vec<SectionGRow>, SectionGError> {
        let business = self.store.fetch_business_profile(business_year_id).await?;
        let snapshot = self.store.fetch_year_snapshot(business_year_id).await?;
        let (_, activities, _) = compute_fresh(&snapshot);

        let mut rows = Vec::with_capacity(activities.len());
        for activity in &activities {
            let narrative = match &business {
                Some(business) => self.narrative_for(activity, business).await,
                None => Narrative::fallback(activity, None),
            };
            rows.push(row_from_activity(activity, narrative));
        }
        Ok(rows)
    }

    /// Generate the Line 49(f) description, falling back to the template
    /// when no client is configured or the API call fails.
    async fn narrative_for(&self, activity: &ActivityQre, business: &Business) -> Narrative {
        let Some(client) = &self.openai else {
            return Narrative::fallback(activity, business.industry.as_deref());
        };

        let ctx = line49f_context(activity, business.industry.as_deref());
        match client.generate_line49f(&ctx).await {
            Ok(description) => Narrative {
                description,
                prompt: Some(serde_json::to_string(&ctx).unwrap_or_default()),
                generated_at: Some(Utc::now()),
            },
            Err(e) => {
                warn!(
                    activity = %activity.activity_title,
                    error = %e,
                    "Line 49(f) generation failed; using fallback description"
                );
                Narrative::fallback(activity, business.industry.as_deref())
            }
        }
    }
}

struct Narrative {
    description: String,
    prompt: Option<String>,
    generated_at: Option<DateTime<Utc>>,
}

impl Narrative {
    fn fallback(activity: &ActivityQre, industry: Option<&str>) -> Self {
        Self {
            description: fallback_line49f(activity, industry),
            prompt: None,
            generated_at: None,
        }
    }
}

/// Deterministic Line 49(f) description used when AI generation is
/// unavailable. Same inputs always produce the same text.
fn fallback_line49f(activity: &ActivityQre, industry: Option<&str>) -> String {
    let notes = activity
        .general_description
        .as_deref()
        .unwrap_or(DEFAULT_GUIDELINE_NOTES);
    format!(
        "The company evaluated {count} {groups} to resolve technical uncertainty in {name}. \
         Experimental testing was conducted using systematic research methodologies within \
         the {industry} industry. {notes}",
        count = activity.subcomponent_count(),
        groups = SUBCOMPONENT_GROUP_TAXONOMY,
        name = activity.activity_title,
        industry = industry.unwrap_or("General"),
        notes = notes,
    )
    .trim()
    .to_string()
}

fn line49f_context(activity: &ActivityQre, industry: Option<&str>) -> Line49fContext {
    Line49fContext {
        research_activity_name: activity.activity_title.clone(),
        subcomponent_count: activity.subcomponent_count(),
        subcomponent_groups: SUBCOMPONENT_GROUP_TAXONOMY.to_string(),
        shrinkback_percent: DEFAULT_SHRINKBACK_PERCENT,
        guideline_notes: activity
            .general_description
            .clone()
            .unwrap_or_else(|| DEFAULT_GUIDELINE_NOTES.to_string()),
        industry: industry.unwrap_or("General").to_string(),
    }
}

/// Split an activity's employee QRE across the three Section G wage lines.
fn wage_buckets(activity: &ActivityQre) -> (i64, i64, i64) {
    let mut direct = 0;
    let mut supervision = 0;
    let mut support = 0;
    for entry in &activity.employees {
        let role = entry.role.unwrap_or_default();
        match WageBucket::classify(role, entry.is_owner) {
            WageBucket::Direct => direct += entry.calculated_qre,
            WageBucket::Supervision => supervision += entry.calculated_qre,
            WageBucket::Support => support += entry.calculated_qre,
        }
    }
    (direct, supervision, support)
}

/// Mean applied percentage over the activity's entries
fn mean_applied_percent(activity: &ActivityQre) -> f64 {
    let entries: Vec<f64> = activity
        .employees
        .iter()
        .chain(&activity.contractors)
        .chain(&activity.supplies)
        .map(|e| e.applied_percentage)
        .collect();
    if entries.is_empty() {
        0.0
    } else {
        entries.iter().sum::<f64>() / entries.len() as f64
    }
}

fn row_from_activity(activity: &ActivityQre, narrative: Narrative) -> SectionGRow {
    let (direct, supervision, support) = wage_buckets(activity);
    SectionGRow {
        research_activity_id: Some(activity.activity_id),
        research_activity_name: activity.activity_title.clone(),
        line_49f_description: narrative.description,
        direct_research_wages: direct,
        supervision_wages: supervision,
        support_wages: support,
        supplies_expenses: activity.supply_qre(),
        contractor_expenses: activity.contractor_qre(),
        total_qre: activity.total_qre,
        subcomponent_count: activity.subcomponent_count() as i64,
        subcomponent_groups: SUBCOMPONENT_GROUP_TAXONOMY.to_string(),
        applied_percent: mean_applied_percent(activity),
        ai_generation_timestamp: narrative.generated_at,
    }
}

fn row_from_persisted(row: FederalCreditRow) -> SectionGRow {
    SectionGRow {
        research_activity_id: row.research_activity_id,
        research_activity_name: row.research_activity_name,
        line_49f_description: row.line_49f_description.unwrap_or_default(),
        direct_research_wages: row.direct_research_wages,
        supervision_wages: row.supervision_wages,
        support_wages: row.support_wages,
        supplies_expenses: row.supplies_expenses,
        contractor_expenses: row.contractor_expenses,
        total_qre: row.total_qre,
        subcomponent_count: row.subcomponent_count,
        subcomponent_groups: row.subcomponent_groups.unwrap_or_default(),
        applied_percent: row.applied_percent,
        ai_generation_timestamp: row.ai_generation_timestamp,
    }
}

fn upsert_payload(
    business_year_id: Uuid,
    business: &Business,
    activity: &ActivityQre,
    narrative: Narrative,
) -> Result<UpsertFederalCredit, SectionGError> {
    let (direct, supervision, support) = wage_buckets(activity);
    Ok(UpsertFederalCredit {
        business_year_id,
        client_id: business.client_id,
        research_activity_id: Some(activity.activity_id),
        research_activity_name: activity.activity_title.clone(),
        direct_research_wages: direct,
        supervision_wages: supervision,
        support_wages: support,
        supplies_expenses: activity.supply_qre(),
        contractor_expenses: activity.contractor_qre(),
        total_qre: activity.total_qre,
        subcomponent_count: activity.subcomponent_count() as i64,
        subcomponent_groups: Some(SUBCOMPONENT_GROUP_TAXONOMY.to_string()),
        applied_percent: mean_applied_percent(activity),
        line_49f_description: Some(narrative.description),
        ai_generation_timestamp: narrative.generated_at,
        ai_prompt_used: narrative.prompt,
        industry_type: business.industry.clone(),
        focus_area: business.focus.clone(),
        general_description: activity.general_description.clone(),
        data_snapshot: Some(serde_json::to_string(activity)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_util::{EmployeeSpec, FakeStore, FixtureSpec, snapshot_fixture};

    fn role(kind: RoleKind, is_owner: bool) -> EmployeeSpec {
        EmployeeSpec {
            wage: 100_000.0,
            role: kind,
            is_owner,
        }
    }

    #[test]
    fn classification_follows_line_priority() {
        assert_eq!(
            WageBucket::classify(RoleKind::ResearchLeader, false),
            WageBucket::Direct
        );
        assert_eq!(
            WageBucket::classify(RoleKind::Supervisor, false),
            WageBucket::Supervision
        );
        assert_eq!(WageBucket::classify(RoleKind::Admin, false), WageBucket::Support);
        assert_eq!(WageBucket::classify(RoleKind::Other, false), WageBucket::Direct);
    }

    #[test]
    fn ownership_outranks_role() {
        // An owner with a supervisor title still lands on Line 50
        assert_eq!(
            WageBucket::classify(RoleKind::Supervisor, true),
            WageBucket::Direct
        );
        assert_eq!(WageBucket::classify(RoleKind::Admin, true), WageBucket::Direct);
    }

    #[tokio::test]
    async fn wages_split_across_lines() {
        // Four $100k employees at 16% applied: $16,000 each
        let mut spec = FixtureSpec::default();
        spec.employees = vec![
            role(RoleKind::ResearchLeader, false),
            role(RoleKind::Supervisor, false),
            role(RoleKind::Admin, false),
            role(RoleKind::Supervisor, true), // owner
        ];
        spec.contractor_amounts = vec![];
        spec.supply_amounts = vec![];
        let store = FakeStore::with_snapshot(snapshot_fixture(spec));
        let business_year_id = store.business_year_id;

        let service = SectionGService::new(store, None);
        let report = service.report(business_year_id).await.unwrap();

        assert_eq!(report.rows.len(), 1);
        let row = &report.rows[0];
        assert_eq!(row.direct_research_wages, 32_000); // leader + owner
        assert_eq!(row.supervision_wages, 16_000);
        assert_eq!(row.support_wages, 16_000);
        assert_eq!(row.total_wages(), 64_000);
        assert_eq!(row.total_qre, 64_000);
    }

    #[tokio::test]
    async fn fallback_description_is_deterministic() {
        let store = FakeStore::with_snapshot(snapshot_fixture(FixtureSpec::default()));
        let business_year_id = store.business_year_id;

        let service = SectionGService::new(store, None);
        let first = service.report(business_year_id).await.unwrap();
        let second = service.report(business_year_id).await.unwrap();

        let description = &first.rows[0].line_49f_description;
        assert_eq!(description, &second.rows[0].line_49f_description);
        assert!(description.contains("Clinical Protocol Development"));
        assert!(description.contains("evaluated 1"));
        assert!(description.contains("Healthcare"));
        assert!(first.rows[0].ai_generation_timestamp.is_none());
    }

    #[tokio::test]
    async fn save_is_idempotent_per_activity_key() {
        let store = FakeStore::with_snapshot(snapshot_fixture(FixtureSpec::default()));
        let business_year_id = store.business_year_id;

        let service = SectionGService::new(store.clone(), None);
        let first = service.save(business_year_id).await.unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(store.upsert_count(), 1);

        // Second save overwrites in place rather than duplicating
        let second = service.save(business_year_id).await.unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(store.upsert_count(), 1);
        assert_eq!(second[0].total_qre, first[0].total_qre);
    }

    #[tokio::test]
    async fn save_rejects_unknown_business_year() {
        let store = FakeStore::with_snapshot(snapshot_fixture(FixtureSpec::default()));
        let service = SectionGService::new(store, None);
        let err = service.save(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, SectionGError::UnknownBusinessYear(_)));
    }

    #[tokio::test]
    async fn locked_year_serves_persisted_rows() {
        use crate::services::aggregator::QreTotals;

        let mut store = FakeStore::with_snapshot(snapshot_fixture(FixtureSpec::default()));
        let business_year_id = store.business_year_id;

        // Persist rows first, then lock the year
        let service = SectionGService::new(store.clone(), None);
        service.save(business_year_id).await.unwrap();
        store.lock_totals(QreTotals {
            employee_qre: 16_000,
            contractor_qre: 5_200,
            supply_qre: 3_250,
        });

        let service = SectionGService::new(store, None);
        let report = service.report(business_year_id).await.unwrap();
        assert!(report.locked);
        assert_eq!(report.rows.len(), 1);
        assert_eq!(report.rows[0].total_qre, 16_000 + 5_200 + 3_250);

        let err = service.save(business_year_id).await.unwrap_err();
        assert!(matches!(err, SectionGError::YearLocked(_)));
    }
}
