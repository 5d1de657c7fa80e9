//! Lookup from normalised payment reference to candidate applications.

use super::reference::normalize_reference;
use super::statement::StatementRow;
use crate::models::Application;
use crate::services::store::ApplicationStore;
use service_core::error::AppError;
use std::collections::{HashMap, HashSet};
use tracing::{debug, instrument};

/// Applications grouped by normalised reference, restricted to references
/// that appear in the current upload. Store order is kept inside each group.
#[derive(Debug, Default)]
pub struct ApplicationIndex {
    by_reference: HashMap<String, Vec<Application>>,
}

impl ApplicationIndex {
    pub fn build(
        applications: impl IntoIterator<Item = Application>,
        upload_references: &HashSet<String>,
    ) -> Self {
        let mut by_reference: HashMap<String, Vec<Application>> = HashMap::new();
        for application in applications {
            let Some(reference) = application.payment_reference.as_deref() else {
                continue;
            };
            let key = normalize_reference(reference);
            if key.is_empty() || !upload_references.contains(&key) {
                continue;
            }
            by_reference.entry(key).or_default().push(application);
        }
        Self { by_reference }
    }

    /// Query the store once for every referenced application and index the
    /// ones the upload mentions.
    #[instrument(skip_all, fields(rows = rows.len()))]
    pub async fn load(
        store: &dyn ApplicationStore,
        rows: &[StatementRow],
    ) -> Result<Self, AppError> {
        let upload_references: HashSet<String> = rows
            .iter()
            .filter_map(|row| row.reference.as_deref())
            .map(normalize_reference)
            .filter(|key| !key.is_empty())
            .collect();

        if upload_references.is_empty() {
            return Ok(Self::default());
        }

        let applications = store.find_applications_with_reference().await?;
        let index = Self::build(applications, &upload_references);
        debug!(
            references = upload_references.len(),
            indexed = index.len(),
            "Application index built"
        );
        Ok(index)
    }

    pub fn candidates(&self, key: &str) -> &[Application] {
        self.by_reference.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of distinct references with at least one candidate.
    pub fn len(&self) -> usize {
        self.by_reference.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_reference.is_empty()
    }
}

/// First unsettled candidate, falling back to the first one.
pub fn select_candidate(candidates: &[Application]) -> Option<&Application> {
    candidates
        .iter()
        .find(|application| !application.status().is_settled())
        .or_else(|| candidates.first())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ApplicationStatus;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use uuid::Uuid;

    fn application(reference: Option<&str>, status: ApplicationStatus) -> Application {
        let now = Utc::now();
        Application {
            id: Uuid::new_v4(),
            shareholder_first_name: "Grace".to_string(),
            shareholder_last_name: "Hopper".to_string(),
            shareholder_email: "grace@example.com".to_string(),
            amount: Decimal::from(500),
            shares: 500,
            status: status.as_str().to_string(),
            payment_reference: reference.map(str::to_string),
            is_paid: status.is_settled(),
            paid_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn refs(keys: &[&str]) -> HashSet<String> {
        keys.iter().map(|k| k.to_string()).collect()
    }

    #[test]
    fn groups_by_normalised_reference_in_store_order() {
        let first = application(Some("MAY-0001-AAAA"), ApplicationStatus::Paid);
        let second = application(Some("may0001aaaa"), ApplicationStatus::Pending);
        let other = application(Some("MAY-0002-BBBB"), ApplicationStatus::Pending);
        let unreferenced = application(None, ApplicationStatus::Pending);
        let (first_id, second_id) = (first.id, second.id);

        let index = ApplicationIndex::build(
            vec![first, second, other, unreferenced],
            &refs(&["MAY0001AAAA"]),
        );

        assert_eq!(index.len(), 1);
        let ids: Vec<Uuid> = index.candidates("MAY0001AAAA").iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![first_id, second_id]);
        assert!(index.candidates("MAY0002BBBB").is_empty());
    }

    #[test]
    fn prefers_first_unsettled_candidate() {
        let candidates = vec![
            application(Some("R"), ApplicationStatus::Paid),
            application(Some("R"), ApplicationStatus::Pending),
            application(Some("R"), ApplicationStatus::Draft),
        ];
        let selected = select_candidate(&candidates).unwrap();
        assert_eq!(selected.id, candidates[1].id);
    }

    #[test]
    fn falls_back_to_first_when_all_settled() {
        let candidates = vec![
            application(Some("R"), ApplicationStatus::Completed),
            application(Some("R"), ApplicationStatus::Paid),
        ];
        let selected = select_candidate(&candidates).unwrap();
        assert_eq!(selected.id, candidates[0].id);
        assert!(select_candidate(&[]).is_none());
    }
}
