use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;
use uuid::Uuid;

use super::DocumentStore;
use crate::error::{CoreError, CoreResult};
use crate::models::{Document, Evaluation, NewDocument, NewEvaluation, NewUser, User};

/// Process-local store. Every mutation runs under one write lock, which makes
/// assignment updates and evaluation upserts atomic.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    users: HashMap<Uuid, User>,
    documents: HashMap<Uuid, Document>,
    /// Append-only, in submission order.
    evaluations: Vec<Evaluation>,
    /// (document, reviewer) -> index into `evaluations`.
    current: HashMap<(Uuid, Uuid), usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> CoreResult<RwLockReadGuard<'_, Inner>> {
        self.inner
            .read()
            .map_err(|_| CoreError::storage("memory store lock poisoned"))
    }

    fn write(&self) -> CoreResult<RwLockWriteGuard<'_, Inner>> {
        self.inner
            .write()
            .map_err(|_| CoreError::storage("memory store lock poisoned"))
    }
}

impl Inner {
    fn documents_where(&self, predicate: impl Fn(&Document) -> bool) -> Vec<Document> {
        let mut documents: Vec<Document> = self
            .documents
            .values()
            .filter(|document| predicate(document))
            .cloned()
            .collect();
        documents.sort_by(Document::newest_first);
        documents
    }
}

impl DocumentStore for MemoryStore {
    fn create_user(&self, user: NewUser) -> CoreResult<User> {
        let mut inner = self.write()?;
        if inner.users.contains_key(&user.id) {
            return Err(CoreError::InvalidInput("duplicate_id"));
        }
        if inner.users.values().any(|existing| existing.email == user.email) {
            return Err(CoreError::InvalidInput("email_taken"));
        }

        let created = User {
            id: user.id,
            email: user.email,
            full_name: user.full_name,
            password_hash: user.password_hash,
            role: user.role,
            created_at: Utc::now(),
        };
        inner.users.insert(created.id, created.clone());
        Ok(created)
    }

    fn get_user(&self, id: Uuid) -> CoreResult<User> {
        self.read()?
            .users
            .get(&id)
            .cloned()
            .ok_or(CoreError::NotFound("user_not_found"))
    }

    fn find_user_by_email(&self, email: &str) -> CoreResult<Option<User>> {
        Ok(self
            .read()?
            .users
            .values()
            .find(|user| user.email == email)
            .cloned())
    }

    fn list_users(&self) -> CoreResult<Vec<User>> {
        let mut users: Vec<User> = self.read()?.users.values().cloned().collect();
        users.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.email.cmp(&b.email))
        });
        Ok(users)
    }

    fn create_document(&self, document: NewDocument) -> CoreResult<Document> {
        let mut inner = self.write()?;
        if inner.documents.contains_key(&document.id) {
            return Err(CoreError::InvalidInput("duplicate_id"));
        }
        if !inner.users.contains_key(&document.owner_id) {
            return Err(CoreError::NotFound("owner_not_found"));
        }

        let created = Document {
            id: document.id,
            title: document.title,
            organization: document.organization,
            storage_ref: document.storage_ref,
            owner_id: document.owner_id,
            assigned_reviewer_id: None,
            created_at: Utc::now(),
        };
        inner.documents.insert(created.id, created.clone());
        Ok(created)
    }

    fn get_document(&self, id: Uuid) -> CoreResult<Document> {
        self.read()?
            .documents
            .get(&id)
            .cloned()
            .ok_or(CoreError::NotFound("document_not_found"))
    }

    fn update_document(&self, document: &Document) -> CoreResult<Document> {
        let mut inner = self.write()?;
        if let Some(reviewer_id) = document.assigned_reviewer_id {
            if !inner.users.contains_key(&reviewer_id) {
                return Err(CoreError::NotFound("reviewer_not_found"));
            }
        }

        let stored = inner
            .documents
            .get_mut(&document.id)
            .ok_or(CoreError::NotFound("document_not_found"))?;
        stored.title = document.title.clone();
        stored.organization = document.organization.clone();
        stored.assigned_reviewer_id = document.assigned_reviewer_id;
        Ok(stored.clone())
    }

    fn list_by_owner(&self, owner_id: Uuid) -> CoreResult<Vec<Document>> {
        Ok(self
            .read()?
            .documents_where(|document| document.owner_id == owner_id))
    }

    fn list_by_assignee(&self, reviewer_id: Uuid) -> CoreResult<Vec<Document>> {
        Ok(self
            .read()?
            .documents_where(|document| document.assigned_reviewer_id == Some(reviewer_id)))
    }

    fn list_all(&self) -> CoreResult<Vec<Document>> {
        Ok(self.read()?.documents_where(|_| true))
    }

    fn upsert_evaluation(&self, evaluation: NewEvaluation) -> CoreResult<Evaluation> {
        let mut inner = self.write()?;
        if !inner.documents.contains_key(&evaluation.document_id) {
            return Err(CoreError::NotFound("document_not_found"));
        }
        if !inner.users.contains_key(&evaluation.reviewer_id) {
            return Err(CoreError::NotFound("reviewer_not_found"));
        }
        if inner.evaluations.iter().any(|entry| entry.id == evaluation.id) {
            return Err(CoreError::InvalidInput("duplicate_id"));
        }

        let entry = Evaluation {
            id: evaluation.id,
            document_id: evaluation.document_id,
            reviewer_id: evaluation.reviewer_id,
            status: evaluation.status,
            comment: evaluation.comment,
            created_at: Utc::now(),
        };
        let position = inner.evaluations.len();
        inner.evaluations.push(entry.clone());
        inner
            .current
            .insert((entry.document_id, entry.reviewer_id), position);
        Ok(entry)
    }

    fn list_evaluations(&self, document_id: Uuid) -> CoreResult<Vec<Evaluation>> {
        let mut history: Vec<Evaluation> = self
            .read()?
            .evaluations
            .iter()
            .filter(|entry| entry.document_id == document_id)
            .cloned()
            .collect();
        // stable: equal timestamps keep submission order
        history.sort_by_key(|entry| entry.created_at);
        Ok(history)
    }

    fn list_current_evaluations(&self, document_id: Uuid) -> CoreResult<Vec<Evaluation>> {
        let inner = self.read()?;
        let mut positions: Vec<usize> = inner
            .current
            .iter()
            .filter(|((document, _), _)| *document == document_id)
            .map(|(_, position)| *position)
            .collect();
        positions.sort_unstable();
        Ok(positions
            .into_iter()
            .map(|position| inner.evaluations[position].clone())
            .collect())
    }
}
