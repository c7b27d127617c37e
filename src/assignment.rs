//! Binding reviewers to documents.

use uuid::Uuid;

use crate::auth::Identity;
use crate::error::{CoreError, CoreResult};
use crate::models::{Document, Role};
use crate::store::DocumentStore;

fn require_admin(identity: &Identity) -> CoreResult<()> {
    match identity.role {
        Role::Admin => Ok(()),
        Role::Grantee | Role::Reviewer => Err(CoreError::Forbidden("admin_required")),
    }
}

/// Binds `reviewer_id` to the document, replacing any previous reviewer.
///
/// Assigning the reviewer that is already bound performs no write.
pub fn assign(
    store: &dyn DocumentStore,
    identity: &Identity,
    document_id: Uuid,
    reviewer_id: Uuid,
) -> CoreResult<Document> {
    require_admin(identity)?;

    let reviewer = match store.get_user(reviewer_id) {
        Ok(user) => user,
        Err(CoreError::NotFound(_)) => return Err(CoreError::InvalidInput("not_a_reviewer")),
        Err(err) => return Err(err),
    };
    match reviewer.role {
        Role::Reviewer => {}
        Role::Grantee | Role::Admin => return Err(CoreError::InvalidInput("not_a_reviewer")),
    }

    let mut document = store.get_document(document_id)?;
    if document.assigned_reviewer_id == Some(reviewer_id) {
        return Ok(document);
    }

    let previous = document.assigned_reviewer_id.replace(reviewer_id);
    let updated = store.update_document(&document)?;
    tracing::info!(
        document_id = %document_id,
        reviewer_id = %reviewer_id,
        previous_reviewer_id = ?previous,
        admin_id = %identity.user_id,
        "reviewer assigned"
    );
    Ok(updated)
}

/// Clears the assignment. Unassigning an unassigned document is a no-op.
pub fn unassign(
    store: &dyn DocumentStore,
    identity: &Identity,
    document_id: Uuid,
) -> CoreResult<Document> {
    require_admin(identity)?;

    let mut document = store.get_document(document_id)?;
    let Some(previous) = document.assigned_reviewer_id.take() else {
        return Ok(document);
    };

    let updated = store.update_document(&document)?;
    tracing::info!(
        document_id = %document_id,
        previous_reviewer_id = %previous,
        admin_id = %identity.user_id,
        "reviewer unassigned"
    );
    Ok(updated)
}
