//! Evaluation submission.
//!
//! Per (document, reviewer) pair the only states are "no evaluation" and
//! "evaluated"; resubmitting moves from evaluated to evaluated and supersedes
//! the previous entry without deleting it.

use serde::Deserialize;
use uuid::Uuid;

use crate::auth::Identity;
use crate::error::{CoreError, CoreResult};
use crate::models::{Evaluation, EvaluationStatus, NewEvaluation, Role};
use crate::store::DocumentStore;

#[derive(Debug, Clone, Deserialize)]
pub struct EvaluationInput {
    pub status: String,
    pub comment: String,
}

impl EvaluationInput {
    pub fn new(status: impl Into<String>, comment: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            comment: comment.into(),
        }
    }

    fn validate(&self) -> CoreResult<(EvaluationStatus, String)> {
        let status = self
            .status
            .parse()
            .map_err(|_| CoreError::InvalidInput("invalid_status"))?;
        let comment = self.comment.trim();
        if comment.is_empty() {
            return Err(CoreError::InvalidInput("empty_comment"));
        }
        Ok((status, comment.to_string()))
    }
}

/// Records `identity`'s verdict on a document.
///
/// Checks run in order and the first failure wins: caller is a reviewer,
/// caller is the document's assigned reviewer, input is well formed.
pub fn submit(
    store: &dyn DocumentStore,
    identity: &Identity,
    document_id: Uuid,
    input: &EvaluationInput,
) -> CoreResult<Evaluation> {
    match identity.role {
        Role::Reviewer => {}
        Role::Grantee | Role::Admin => return Err(CoreError::Forbidden("not_a_reviewer")),
    }

    let document = match store.get_document(document_id) {
        Ok(document) => document,
        Err(CoreError::NotFound(_)) => return Err(CoreError::Forbidden("not_assigned")),
        Err(err) => return Err(err),
    };
    if document.assigned_reviewer_id != Some(identity.user_id) {
        tracing::warn!(
            document_id = %document_id,
            reviewer_id = %identity.user_id,
            "evaluation rejected: reviewer not assigned"
        );
        return Err(CoreError::Forbidden("not_assigned"));
    }

    let (status, comment) = input.validate()?;
    let evaluation = store.upsert_evaluation(NewEvaluation {
        id: Uuid::new_v4(),
        document_id,
        reviewer_id: identity.user_id,
        status,
        comment,
    })?;

    tracing::info!(
        document_id = %document_id,
        reviewer_id = %identity.user_id,
        evaluation_id = %evaluation.id,
        status = %evaluation.status,
        "evaluation recorded"
    );
    Ok(evaluation)
}
