//! The operations the transport layer calls into.
//!
//! Every operation that acts on documents takes the caller's [`Identity`]
//! explicitly; nothing is read from ambient session state.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::access::{self, DocumentScope, VisibleEvaluation};
use crate::assignment;
use crate::auth::{password, AccessToken, Identity, IdentityContext};
use crate::error::{CoreError, CoreResult};
use crate::models::{Document, Evaluation, EvaluationStatus, NewDocument, NewUser, Role, User};
use crate::store::DocumentStore;
use crate::workflow::{self, EvaluationInput};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserView {
    pub id: Uuid,
    pub email: String,
    pub full_name: Option<String>,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserView {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            full_name: user.full_name,
            role: user.role,
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EvaluationView {
    pub id: Uuid,
    pub document_id: Uuid,
    pub reviewer_id: Uuid,
    pub reviewer_email: Option<String>,
    pub status: EvaluationStatus,
    pub comment: String,
    pub created_at: DateTime<Utc>,
    pub current: bool,
}

impl EvaluationView {
    fn new(evaluation: Evaluation, reviewer_email: Option<String>, current: bool) -> Self {
        Self {
            id: evaluation.id,
            document_id: evaluation.document_id,
            reviewer_id: evaluation.reviewer_id,
            reviewer_email,
            status: evaluation.status,
            comment: evaluation.comment,
            created_at: evaluation.created_at,
            current,
        }
    }
}

/// A document joined with the data a caller needs to display it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentView {
    pub id: Uuid,
    pub title: String,
    pub organization: String,
    pub storage_ref: String,
    pub owner_id: Uuid,
    pub uploaded_by: Option<String>,
    pub assigned_reviewer_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_reviewer_email: Option<String>,
    pub created_at: DateTime<Utc>,
    pub evaluations: Vec<EvaluationView>,
}

/// Caches user emails for the duration of one read-time join.
struct EmailDirectory<'a> {
    store: &'a dyn DocumentStore,
    known: HashMap<Uuid, Option<String>>,
}

impl<'a> EmailDirectory<'a> {
    fn new(store: &'a dyn DocumentStore) -> Self {
        Self {
            store,
            known: HashMap::new(),
        }
    }

    fn email(&mut self, user_id: Uuid) -> CoreResult<Option<String>> {
        if let Some(email) = self.known.get(&user_id) {
            return Ok(email.clone());
        }
        let email = match self.store.get_user(user_id) {
            Ok(user) => Some(user.email),
            Err(CoreError::NotFound(_)) => None,
            Err(err) => return Err(err),
        };
        self.known.insert(user_id, email.clone());
        Ok(email)
    }
}

fn normalize_email(email: &str) -> CoreResult<String> {
    let email = email.trim().to_lowercase();
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.is_empty()
                && !domain.contains('@')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    };
    if valid {
        Ok(email)
    } else {
        Err(CoreError::InvalidInput("invalid_email"))
    }
}

fn require_text(value: &str, reason: &'static str) -> CoreResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(CoreError::InvalidInput(reason))
    } else {
        Ok(trimmed.to_string())
    }
}

/// A window over an ordered listing, applied after visibility filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub offset: usize,
    pub limit: usize,
}

impl Page {
    pub const DEFAULT_LIMIT: usize = 100;

    pub fn new(offset: Option<usize>, limit: Option<usize>) -> Self {
        Self {
            offset: offset.unwrap_or(0),
            limit: limit.unwrap_or(Self::DEFAULT_LIMIT),
        }
    }

    fn apply<T>(self, items: Vec<T>) -> Vec<T> {
        items
            .into_iter()
            .skip(self.offset)
            .take(self.limit)
            .collect()
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(None, None)
    }
}

#[derive(Clone)]
pub struct ReviewService {
    store: Arc<dyn DocumentStore>,
    identity: IdentityContext,
}

impl ReviewService {
    pub fn new(store: Arc<dyn DocumentStore>, identity: IdentityContext) -> Self {
        Self { store, identity }
    }

    pub fn identity(&self) -> &IdentityContext {
        &self.identity
    }

    pub fn store(&self) -> &dyn DocumentStore {
        self.store.as_ref()
    }

    pub fn register(
        &self,
        email: &str,
        password: &str,
        role: &str,
        full_name: Option<&str>,
    ) -> CoreResult<UserView> {
        let email = normalize_email(email)?;
        let full_name = full_name
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string);
        if password.is_empty() {
            return Err(CoreError::InvalidInput("empty_password"));
        }
        let role: Role = role
            .parse()
            .map_err(|_| CoreError::InvalidInput("invalid_role"))?;

        if self.store.find_user_by_email(&email)?.is_some() {
            return Err(CoreError::InvalidInput("email_taken"));
        }

        let password_hash = password::hash_password(password).map_err(CoreError::storage)?;
        let user = self.store.create_user(NewUser {
            id: Uuid::new_v4(),
            email,
            password_hash,
            full_name,
            role,
        })?;
        tracing::info!(user_id = %user.id, role = %user.role, "user registered");
        Ok(user.into())
    }

    /// Unknown emails and wrong passwords are indistinguishable to the caller.
    pub fn login(&self, email: &str, password: &str) -> CoreResult<AccessToken> {
        let email = email.trim().to_lowercase();
        let user = self
            .store
            .find_user_by_email(&email)?
            .ok_or(CoreError::Unauthenticated("invalid_login"))?;

        let valid = password::verify_password(password, &user.password_hash)
            .map_err(|_| CoreError::Unauthenticated("invalid_login"))?;
        if !valid {
            tracing::debug!(user_id = %user.id, "login rejected: wrong password");
            return Err(CoreError::Unauthenticated("invalid_login"));
        }

        self.identity.issue(&user)
    }

    /// Runs every upload precondition; callers use it before storing any bytes.
    pub fn check_upload(
        &self,
        identity: &Identity,
        title: &str,
        organization: &str,
    ) -> CoreResult<(String, String)> {
        match identity.role {
            Role::Grantee => {}
            Role::Reviewer | Role::Admin => return Err(CoreError::Forbidden("grantee_required")),
        }
        let title = require_text(title, "empty_title")?;
        let organization = require_text(organization, "empty_organization")?;
        Ok((title, organization))
    }

    pub fn upload_document(
        &self,
        identity: &Identity,
        title: &str,
        organization: &str,
        storage_ref: &str,
    ) -> CoreResult<DocumentView> {
        let (title, organization) = self.check_upload(identity, title, organization)?;
        let storage_ref = require_text(storage_ref, "empty_file_ref")?;

        let document = self.store.create_document(NewDocument {
            id: Uuid::new_v4(),
            title,
            organization,
            storage_ref,
            owner_id: identity.user_id,
        })?;
        tracing::info!(
            document_id = %document.id,
            owner_id = %document.owner_id,
            "document uploaded"
        );
        self.view(identity, document, &mut EmailDirectory::new(self.store()))
    }

    pub fn list_documents(
        &self,
        identity: &Identity,
        page: Page,
    ) -> CoreResult<Vec<DocumentView>> {
        let scoped = DocumentScope::for_identity(identity).load(self.store())?;
        let visible = page.apply(access::list_visible(identity, scoped));

        let mut emails = EmailDirectory::new(self.store());
        visible
            .into_iter()
            .map(|document| self.view(identity, document, &mut emails))
            .collect()
    }

    pub fn get_document(&self, identity: &Identity, document_id: Uuid) -> CoreResult<DocumentView> {
        let document = access::fetch_visible(identity, self.store(), document_id)?;
        self.view(identity, document, &mut EmailDirectory::new(self.store()))
    }

    /// The raw record, for callers that need `storage_ref` (downloads).
    pub fn visible_document(&self, identity: &Identity, document_id: Uuid) -> CoreResult<Document> {
        access::fetch_visible(identity, self.store(), document_id)
    }

    pub fn list_evaluations(
        &self,
        identity: &Identity,
        document_id: Uuid,
    ) -> CoreResult<Vec<EvaluationView>> {
        let document = access::fetch_visible(identity, self.store(), document_id)?;
        self.evaluation_views(identity, &document, &mut EmailDirectory::new(self.store()))
    }

    pub fn assign_reviewer(
        &self,
        identity: &Identity,
        document_id: Uuid,
        reviewer_id: Uuid,
    ) -> CoreResult<DocumentView> {
        let document = assignment::assign(self.store(), identity, document_id, reviewer_id)?;
        self.view(identity, document, &mut EmailDirectory::new(self.store()))
    }

    pub fn unassign_reviewer(
        &self,
        identity: &Identity,
        document_id: Uuid,
    ) -> CoreResult<DocumentView> {
        let document = assignment::unassign(self.store(), identity, document_id)?;
        self.view(identity, document, &mut EmailDirectory::new(self.store()))
    }

    pub fn submit_evaluation(
        &self,
        identity: &Identity,
        document_id: Uuid,
        input: &EvaluationInput,
    ) -> CoreResult<Evaluation> {
        workflow::submit(self.store(), identity, document_id, input)
    }

    pub fn list_users(
        &self,
        identity: &Identity,
        role: Option<Role>,
        page: Page,
    ) -> CoreResult<Vec<UserView>> {
        match identity.role {
            Role::Admin => {}
            Role::Grantee | Role::Reviewer => return Err(CoreError::Forbidden("admin_required")),
        }
        let users: Vec<User> = self
            .store
            .list_users()?
            .into_iter()
            .filter(|user| role.map_or(true, |wanted| user.role == wanted))
            .collect();
        Ok(page.apply(users).into_iter().map(UserView::from).collect())
    }

    fn evaluation_views(
        &self,
        identity: &Identity,
        document: &Document,
        emails: &mut EmailDirectory<'_>,
    ) -> CoreResult<Vec<EvaluationView>> {
        let history = self.store.list_evaluations(document.id)?;
        let current = self.store.list_current_evaluations(document.id)?;

        access::visible_evaluations(identity, history, &current)
            .into_iter()
            .map(|VisibleEvaluation { evaluation, current }| -> CoreResult<EvaluationView> {
                let reviewer_email = emails.email(evaluation.reviewer_id)?;
                Ok(EvaluationView::new(evaluation, reviewer_email, current))
            })
            .collect()
    }

    fn view(
        &self,
        identity: &Identity,
        document: Document,
        emails: &mut EmailDirectory<'_>,
    ) -> CoreResult<DocumentView> {
        let evaluations = self.evaluation_views(identity, &document, emails)?;
        let uploaded_by = emails.email(document.owner_id)?;
        let assigned_reviewer_email = match (identity.role, document.assigned_reviewer_id) {
            (Role::Admin | Role::Grantee, Some(reviewer_id)) => emails.email(reviewer_id)?,
            (Role::Admin | Role::Grantee, None) | (Role::Reviewer, _) => None,
        };

        Ok(DocumentView {
            id: document.id,
            title: document.title,
            organization: document.organization,
            storage_ref: document.storage_ref,
            owner_id: document.owner_id,
            uploaded_by,
            assigned_reviewer_id: document.assigned_reviewer_id,
            assigned_reviewer_email,
            created_at: document.created_at,
            evaluations,
        })
    }
}
