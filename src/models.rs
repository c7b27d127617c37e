use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Grantee,
    Reviewer,
    Admin,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Grantee, Role::Reviewer, Role::Admin];

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Grantee => "grantee",
            Role::Reviewer => "reviewer",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = UnknownVariant;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        Role::ALL
            .into_iter()
            .find(|role| role.as_str() == normalized)
            .ok_or(UnknownVariant)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationStatus {
    Approved,
    NeedsRevision,
    Rejected,
}

impl EvaluationStatus {
    pub const ALL: [EvaluationStatus; 3] = [
        EvaluationStatus::Approved,
        EvaluationStatus::NeedsRevision,
        EvaluationStatus::Rejected,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EvaluationStatus::Approved => "approved",
            EvaluationStatus::NeedsRevision => "needs_revision",
            EvaluationStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for EvaluationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EvaluationStatus {
    type Err = UnknownVariant;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        EvaluationStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == normalized)
            .ok_or(UnknownVariant)
    }
}

/// Returned when a stored or submitted string names no known enum variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnknownVariant;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub full_name: Option<String>,
    pub password_hash: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub full_name: Option<String>,
    pub role: Role,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub id: Uuid,
    pub title: String,
    pub organization: String,
    pub storage_ref: String,
    pub owner_id: Uuid,
    pub assigned_reviewer_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl Document {
    /// Listing order: most recently created first, ties broken by id descending.
    pub fn newest_first(a: &Document, b: &Document) -> Ordering {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.id.cmp(&a.id))
    }
}

#[derive(Debug, Clone)]
pub struct NewDocument {
    pub id: Uuid,
    pub title: String,
    pub organization: String,
    pub storage_ref: String,
    pub owner_id: Uuid,
}

/// One entry of a document's append-only evaluation log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Evaluation {
    pub id: Uuid,
    pub document_id: Uuid,
    pub reviewer_id: Uuid,
    pub status: EvaluationStatus,
    pub comment: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewEvaluation {
    pub id: Uuid,
    pub document_id: Uuid,
    pub reviewer_id: Uuid,
    pub status: EvaluationStatus,
    pub comment: String,
}
