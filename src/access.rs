//! Visibility rules: which documents and evaluations an identity may see.

use std::collections::HashSet;

use uuid::Uuid;

use crate::auth::Identity;
use crate::error::{CoreError, CoreResult};
use crate::models::{Document, Evaluation, Role};
use crate::store::DocumentStore;

/// The store query matching an identity's visibility rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentScope {
    OwnedBy(Uuid),
    AssignedTo(Uuid),
    All,
}

impl DocumentScope {
    pub fn for_identity(identity: &Identity) -> Self {
        match identity.role {
            Role::Grantee => DocumentScope::OwnedBy(identity.user_id),
            Role::Reviewer => DocumentScope::AssignedTo(identity.user_id),
            Role::Admin => DocumentScope::All,
        }
    }

    pub fn load(self, store: &dyn DocumentStore) -> CoreResult<Vec<Document>> {
        match self {
            DocumentScope::OwnedBy(owner_id) => store.list_by_owner(owner_id),
            DocumentScope::AssignedTo(reviewer_id) => store.list_by_assignee(reviewer_id),
            DocumentScope::All => store.list_all(),
        }
    }
}

pub fn can_see(identity: &Identity, document: &Document) -> bool {
    match identity.role {
        Role::Grantee => document.owner_id == identity.user_id,
        Role::Reviewer => document.assigned_reviewer_id == Some(identity.user_id),
        Role::Admin => true,
    }
}

/// Keeps only what `identity` may see, newest first (ties by id descending).
pub fn list_visible(identity: &Identity, documents: Vec<Document>) -> Vec<Document> {
    let mut visible: Vec<Document> = documents
        .into_iter()
        .filter(|document| can_see(identity, document))
        .collect();
    visible.sort_by(Document::newest_first);
    visible
}

/// Direct lookup by id.
///
/// Grantees and reviewers get `Forbidden` both for documents outside their
/// set and for ids that do not exist, so the answer never confirms that a
/// document exists. Admins see everything and get `NotFound` for missing ids.
pub fn fetch_visible(
    identity: &Identity,
    store: &dyn DocumentStore,
    document_id: Uuid,
) -> CoreResult<Document> {
    let document = match store.get_document(document_id) {
        Ok(document) => document,
        Err(CoreError::NotFound(reason)) => {
            return Err(match identity.role {
                Role::Admin => CoreError::NotFound(reason),
                Role::Grantee | Role::Reviewer => CoreError::Forbidden("document_not_visible"),
            })
        }
        Err(err) => return Err(err),
    };

    if can_see(identity, &document) {
        Ok(document)
    } else {
        tracing::debug!(
            user_id = %identity.user_id,
            role = %identity.role,
            document_id = %document_id,
            "document lookup outside visible set"
        );
        Err(CoreError::Forbidden("document_not_visible"))
    }
}

/// One history entry as shown to a caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisibleEvaluation {
    pub evaluation: Evaluation,
    /// False once the same reviewer has resubmitted for this document.
    pub current: bool,
}

/// Evaluations of a document the caller is allowed to see.
///
/// Owners and admins get the full history, oldest first, superseded entries
/// flagged. Reviewers get the current entry of each reviewer only.
pub fn visible_evaluations(
    identity: &Identity,
    history: Vec<Evaluation>,
    current: &[Evaluation],
) -> Vec<VisibleEvaluation> {
    let current_ids: HashSet<Uuid> = current.iter().map(|entry| entry.id).collect();
    let entries = history.into_iter().map(|evaluation| VisibleEvaluation {
        current: current_ids.contains(&evaluation.id),
        evaluation,
    });

    match identity.role {
        Role::Grantee | Role::Admin => entries.collect(),
        Role::Reviewer => entries.filter(|entry| entry.current).collect(),
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use super::*;
    use crate::models::{EvaluationStatus, NewDocument, NewUser};
    use crate::store::MemoryStore;

    fn identity(role: Role) -> Identity {
        Identity {
            user_id: Uuid::new_v4(),
            role,
            email: format!("{role}@example.com"),
        }
    }

    fn document(owner: Uuid, reviewer: Option<Uuid>, minutes: i64) -> Document {
        Document {
            id: Uuid::new_v4(),
            title: "Budget".to_string(),
            organization: "Acme".to_string(),
            storage_ref: "documents/x".to_string(),
            owner_id: owner,
            assigned_reviewer_id: reviewer,
            created_at: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
                + Duration::minutes(minutes),
        }
    }

    fn evaluation(reviewer: Uuid, comment: &str) -> Evaluation {
        Evaluation {
            id: Uuid::new_v4(),
            document_id: Uuid::new_v4(),
            reviewer_id: reviewer,
            status: EvaluationStatus::Approved,
            comment: comment.to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn grantee_sees_only_owned_documents() {
        let grantee = identity(Role::Grantee);
        let mine = document(grantee.user_id, None, 0);
        let other = document(Uuid::new_v4(), None, 1);

        let visible = list_visible(&grantee, vec![mine.clone(), other]);
        assert_eq!(visible, vec![mine]);
    }

    #[test]
    fn reviewer_sees_only_assigned_documents() {
        let reviewer = identity(Role::Reviewer);
        let assigned = document(Uuid::new_v4(), Some(reviewer.user_id), 0);
        let elsewhere = document(Uuid::new_v4(), Some(Uuid::new_v4()), 1);
        let unassigned = document(Uuid::new_v4(), None, 2);

        let visible = list_visible(&reviewer, vec![assigned.clone(), elsewhere, unassigned]);
        assert_eq!(visible, vec![assigned]);
    }

    #[test]
    fn admin_sees_everything_newest_first() {
        let admin = identity(Role::Admin);
        let older = document(Uuid::new_v4(), None, 0);
        let newer = document(Uuid::new_v4(), None, 5);

        let visible = list_visible(&admin, vec![older.clone(), newer.clone()]);
        assert_eq!(visible, vec![newer, older]);
    }

    #[test]
    fn equal_timestamps_order_by_id_descending() {
        let admin = identity(Role::Admin);
        let a = document(Uuid::new_v4(), None, 0);
        let b = document(Uuid::new_v4(), None, 0);

        let visible = list_visible(&admin, vec![a.clone(), b.clone()]);
        let (high, low) = if a.id > b.id { (a, b) } else { (b, a) };
        assert_eq!(visible, vec![high, low]);
    }

    #[test]
    fn scope_matches_role() {
        let grantee = identity(Role::Grantee);
        let reviewer = identity(Role::Reviewer);
        assert_eq!(
            DocumentScope::for_identity(&grantee),
            DocumentScope::OwnedBy(grantee.user_id)
        );
        assert_eq!(
            DocumentScope::for_identity(&reviewer),
            DocumentScope::AssignedTo(reviewer.user_id)
        );
        assert_eq!(
            DocumentScope::for_identity(&identity(Role::Admin)),
            DocumentScope::All
        );
    }

    #[test]
    fn direct_lookup_outside_visible_set_is_forbidden() {
        let store = MemoryStore::new();
        let owner = store
            .create_user(NewUser {
                id: Uuid::new_v4(),
                email: "g@example.com".to_string(),
                password_hash: String::new(),
                full_name: None,
                role: Role::Grantee,
            })
            .unwrap();
        let doc = store
            .create_document(NewDocument {
                id: Uuid::new_v4(),
                title: "t".to_string(),
                organization: "o".to_string(),
                storage_ref: "r".to_string(),
                owner_id: owner.id,
            })
            .unwrap();

        let stranger = identity(Role::Grantee);
        assert_eq!(
            fetch_visible(&stranger, &store, doc.id),
            Err(CoreError::Forbidden("document_not_visible"))
        );
        assert_eq!(
            fetch_visible(&identity(Role::Reviewer), &store, doc.id),
            Err(CoreError::Forbidden("document_not_visible"))
        );

        let owner_identity = Identity {
            user_id: owner.id,
            role: Role::Grantee,
            email: owner.email.clone(),
        };
        assert_eq!(fetch_visible(&owner_identity, &store, doc.id), Ok(doc.clone()));
        assert_eq!(fetch_visible(&identity(Role::Admin), &store, doc.id), Ok(doc));
    }

    #[test]
    fn missing_documents_only_surface_as_not_found_for_admins() {
        let store = MemoryStore::new();
        let missing = Uuid::new_v4();
        assert_eq!(
            fetch_visible(&identity(Role::Grantee), &store, missing),
            Err(CoreError::Forbidden("document_not_visible"))
        );
        assert_eq!(
            fetch_visible(&identity(Role::Admin), &store, missing),
            Err(CoreError::NotFound("document_not_found"))
        );
    }

    #[test]
    fn owners_see_superseded_entries_reviewers_do_not() {
        let reviewer_id = Uuid::new_v4();
        let first = evaluation(reviewer_id, "first");
        let second = evaluation(reviewer_id, "second");
        let history = vec![first.clone(), second.clone()];
        let current = vec![second.clone()];

        let owner_view = visible_evaluations(&identity(Role::Grantee), history.clone(), &current);
        assert_eq!(owner_view.len(), 2);
        assert!(!owner_view[0].current);
        assert!(owner_view[1].current);

        let reviewer_view = visible_evaluations(&identity(Role::Reviewer), history, &current);
        assert_eq!(reviewer_view.len(), 1);
        assert_eq!(reviewer_view[0].evaluation, second);
    }
}
