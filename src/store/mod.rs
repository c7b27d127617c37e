//! Persistence for users, documents and the evaluation log.
//!
//! Stores enforce storage-level invariants only: unique ids and emails, and
//! that every referenced user or document exists. Who may do what is decided
//! before a call reaches this layer.

use uuid::Uuid;

use crate::error::CoreResult;
use crate::models::{Document, Evaluation, NewDocument, NewEvaluation, NewUser, User};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

pub trait DocumentStore: Send + Sync + 'static {
    /// Fails with `InvalidInput("email_taken")` when the email is already registered.
    fn create_user(&self, user: NewUser) -> CoreResult<User>;

    fn get_user(&self, id: Uuid) -> CoreResult<User>;

    fn find_user_by_email(&self, email: &str) -> CoreResult<Option<User>>;

    /// Oldest account first.
    fn list_users(&self) -> CoreResult<Vec<User>>;

    fn create_document(&self, document: NewDocument) -> CoreResult<Document>;

    fn get_document(&self, id: Uuid) -> CoreResult<Document>;

    /// Writes the mutable columns (title, organization, assigned reviewer) in
    /// one atomic step. The owner is never rewritten.
    fn update_document(&self, document: &Document) -> CoreResult<Document>;

    /// Newest first, ties broken by id descending. Same for the other listings.
    fn list_by_owner(&self, owner_id: Uuid) -> CoreResult<Vec<Document>>;

    fn list_by_assignee(&self, reviewer_id: Uuid) -> CoreResult<Vec<Document>>;

    fn list_all(&self) -> CoreResult<Vec<Document>>;

    /// Appends to the evaluation log and makes the new entry the current one
    /// for its (document, reviewer) pair, atomically.
    fn upsert_evaluation(&self, evaluation: NewEvaluation) -> CoreResult<Evaluation>;

    /// Full history of a document, oldest first, superseded entries included.
    fn list_evaluations(&self, document_id: Uuid) -> CoreResult<Vec<Evaluation>>;

    /// One entry per reviewer: the latest they submitted for the document.
    fn list_current_evaluations(&self, document_id: Uuid) -> CoreResult<Vec<Evaluation>>;
}
