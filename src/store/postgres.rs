use chrono::{DateTime, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, PooledConnection};
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use uuid::Uuid;

use super::DocumentStore;
use crate::db::PgPool;
use crate::error::{CoreError, CoreResult};
use crate::models::{Document, Evaluation, NewDocument, NewEvaluation, NewUser, User};
use crate::schema::{documents, evaluation_current, evaluations, users};

type PgPooledConnection = PooledConnection<ConnectionManager<PgConnection>>;

/// Every evaluation column except `seq`, which only orders the log.
const EVALUATION_COLUMNS: (
    evaluations::id,
    evaluations::document_id,
    evaluations::reviewer_id,
    evaluations::status,
    evaluations::comment,
    evaluations::created_at,
) = (
    evaluations::id,
    evaluations::document_id,
    evaluations::reviewer_id,
    evaluations::status,
    evaluations::comment,
    evaluations::created_at,
);

#[derive(Debug, Queryable)]
struct UserRow {
    id: Uuid,
    email: String,
    full_name: Option<String>,
    password_hash: String,
    role: String,
    created_at: DateTime<Utc>,
}

#[derive(Insertable)]
#[diesel(table_name = users)]
struct NewUserRow<'a> {
    id: Uuid,
    email: &'a str,
    full_name: Option<&'a str>,
    password_hash: &'a str,
    role: &'a str,
}

#[derive(Debug, Queryable)]
struct DocumentRow {
    id: Uuid,
    title: String,
    organization: String,
    storage_ref: String,
    owner_id: Uuid,
    assigned_reviewer_id: Option<Uuid>,
    created_at: DateTime<Utc>,
}

#[derive(Insertable)]
#[diesel(table_name = documents)]
struct NewDocumentRow<'a> {
    id: Uuid,
    title: &'a str,
    organization: &'a str,
    storage_ref: &'a str,
    owner_id: Uuid,
}

#[derive(Debug, Queryable)]
struct EvaluationRow {
    id: Uuid,
    document_id: Uuid,
    reviewer_id: Uuid,
    status: String,
    comment: String,
    created_at: DateTime<Utc>,
}

#[derive(Insertable)]
#[diesel(table_name = evaluations)]
struct NewEvaluationRow<'a> {
    id: Uuid,
    document_id: Uuid,
    reviewer_id: Uuid,
    status: &'a str,
    comment: &'a str,
}

impl TryFrom<UserRow> for User {
    type Error = CoreError;

    fn try_from(row: UserRow) -> CoreResult<Self> {
        let role = row
            .role
            .parse()
            .map_err(|_| CoreError::storage(format!("unknown role {:?} in users", row.role)))?;
        Ok(User {
            id: row.id,
            email: row.email,
            full_name: row.full_name,
            password_hash: row.password_hash,
            role,
            created_at: row.created_at,
        })
    }
}

impl From<DocumentRow> for Document {
    fn from(row: DocumentRow) -> Self {
        Document {
            id: row.id,
            title: row.title,
            organization: row.organization,
            storage_ref: row.storage_ref,
            owner_id: row.owner_id,
            assigned_reviewer_id: row.assigned_reviewer_id,
            created_at: row.created_at,
        }
    }
}

impl TryFrom<EvaluationRow> for Evaluation {
    type Error = CoreError;

    fn try_from(row: EvaluationRow) -> CoreResult<Self> {
        let status = row.status.parse().map_err(|_| {
            CoreError::storage(format!("unknown status {:?} in evaluations", row.status))
        })?;
        Ok(Evaluation {
            id: row.id,
            document_id: row.document_id,
            reviewer_id: row.reviewer_id,
            status,
            comment: row.comment,
            created_at: row.created_at,
        })
    }
}

fn map_violation(err: DieselError, foreign_key: &'static str) -> CoreError {
    match err {
        DieselError::DatabaseError(DatabaseErrorKind::ForeignKeyViolation, _) => {
            CoreError::NotFound(foreign_key)
        }
        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
            CoreError::InvalidInput("duplicate_id")
        }
        other => CoreError::from(other),
    }
}

fn into_evaluations(rows: Vec<EvaluationRow>) -> CoreResult<Vec<Evaluation>> {
    rows.into_iter().map(Evaluation::try_from).collect()
}

/// Postgres-backed store over an r2d2 pool.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn conn(&self) -> CoreResult<PgPooledConnection> {
        self.pool
            .get()
            .map_err(|err| CoreError::storage(format!("database pool error: {err}")))
    }

    fn load_documents<F>(&self, filter: F) -> CoreResult<Vec<Document>>
    where
        F: FnOnce(documents::BoxedQuery<'static, diesel::pg::Pg>) -> documents::BoxedQuery<'static, diesel::pg::Pg>,
    {
        let mut conn = self.conn()?;
        let query = filter(documents::table.into_boxed())
            .order((documents::created_at.desc(), documents::id.desc()));
        let rows: Vec<DocumentRow> = query.load(&mut conn)?;
        Ok(rows.into_iter().map(Document::from).collect())
    }
}

impl DocumentStore for PgStore {
    fn create_user(&self, user: NewUser) -> CoreResult<User> {
        let mut conn = self.conn()?;
        let row = NewUserRow {
            id: user.id,
            email: &user.email,
            full_name: user.full_name.as_deref(),
            password_hash: &user.password_hash,
            role: user.role.as_str(),
        };

        let created: UserRow = diesel::insert_into(users::table)
            .values(&row)
            .get_result(&mut conn)
            .map_err(|err| match err {
                DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, ref info)
                    if info.constraint_name() == Some("users_email_key") =>
                {
                    CoreError::InvalidInput("email_taken")
                }
                other => map_violation(other, "user_not_found"),
            })?;
        User::try_from(created)
    }

    fn get_user(&self, id: Uuid) -> CoreResult<User> {
        let mut conn = self.conn()?;
        let row: UserRow = users::table
            .find(id)
            .first(&mut conn)
            .optional()?
            .ok_or(CoreError::NotFound("user_not_found"))?;
        User::try_from(row)
    }

    fn find_user_by_email(&self, email: &str) -> CoreResult<Option<User>> {
        let mut conn = self.conn()?;
        users::table
            .filter(users::email.eq(email))
            .first::<UserRow>(&mut conn)
            .optional()?
            .map(User::try_from)
            .transpose()
    }

    fn list_users(&self) -> CoreResult<Vec<User>> {
        let mut conn = self.conn()?;
        let rows: Vec<UserRow> = users::table
            .order((users::created_at.asc(), users::email.asc()))
            .load(&mut conn)?;
        rows.into_iter().map(User::try_from).collect()
    }

    fn create_document(&self, document: NewDocument) -> CoreResult<Document> {
        let mut conn = self.conn()?;
        let row = NewDocumentRow {
            id: document.id,
            title: &document.title,
            organization: &document.organization,
            storage_ref: &document.storage_ref,
            owner_id: document.owner_id,
        };

        let created: DocumentRow = diesel::insert_into(documents::table)
            .values(&row)
            .get_result(&mut conn)
            .map_err(|err| map_violation(err, "owner_not_found"))?;
        Ok(created.into())
    }

    fn get_document(&self, id: Uuid) -> CoreResult<Document> {
        let mut conn = self.conn()?;
        let row: DocumentRow = documents::table
            .find(id)
            .first(&mut conn)
            .optional()?
            .ok_or(CoreError::NotFound("document_not_found"))?;
        Ok(row.into())
    }

    fn update_document(&self, document: &Document) -> CoreResult<Document> {
        let mut conn = self.conn()?;
        let updated: DocumentRow = diesel::update(documents::table.find(document.id))
            .set((
                documents::title.eq(&document.title),
                documents::organization.eq(&document.organization),
                documents::assigned_reviewer_id.eq(document.assigned_reviewer_id),
            ))
            .get_result(&mut conn)
            .optional()
            .map_err(|err| map_violation(err, "reviewer_not_found"))?
            .ok_or(CoreError::NotFound("document_not_found"))?;
        Ok(updated.into())
    }

    fn list_by_owner(&self, owner_id: Uuid) -> CoreResult<Vec<Document>> {
        self.load_documents(|query| query.filter(documents::owner_id.eq(owner_id)))
    }

    fn list_by_assignee(&self, reviewer_id: Uuid) -> CoreResult<Vec<Document>> {
        self.load_documents(|query| query.filter(documents::assigned_reviewer_id.eq(reviewer_id)))
    }

    fn list_all(&self) -> CoreResult<Vec<Document>> {
        self.load_documents(|query| query)
    }

    fn upsert_evaluation(&self, evaluation: NewEvaluation) -> CoreResult<Evaluation> {
        let mut conn = self.conn()?;
        conn.transaction::<_, CoreError, _>(|conn| {
            let row: EvaluationRow = diesel::insert_into(evaluations::table)
                .values(&NewEvaluationRow {
                    id: evaluation.id,
                    document_id: evaluation.document_id,
                    reviewer_id: evaluation.reviewer_id,
                    status: evaluation.status.as_str(),
                    comment: &evaluation.comment,
                })
                .returning(EVALUATION_COLUMNS)
                .get_result(conn)
                .map_err(|err| map_violation(err, "referenced_record_missing"))?;

            diesel::insert_into(evaluation_current::table)
                .values((
                    evaluation_current::document_id.eq(row.document_id),
                    evaluation_current::reviewer_id.eq(row.reviewer_id),
                    evaluation_current::evaluation_id.eq(row.id),
                    evaluation_current::updated_at.eq(row.created_at),
                ))
                .on_conflict((evaluation_current::document_id, evaluation_current::reviewer_id))
                .do_update()
                .set((
                    evaluation_current::evaluation_id.eq(row.id),
                    evaluation_current::updated_at.eq(row.created_at),
                ))
                .execute(conn)?;

            Evaluation::try_from(row)
        })
    }

    fn list_evaluations(&self, document_id: Uuid) -> CoreResult<Vec<Evaluation>> {
        let mut conn = self.conn()?;
        let rows: Vec<EvaluationRow> = evaluations::table
            .filter(evaluations::document_id.eq(document_id))
            .order((evaluations::created_at.asc(), evaluations::seq.asc()))
            .select(EVALUATION_COLUMNS)
            .load(&mut conn)?;
        into_evaluations(rows)
    }

    fn list_current_evaluations(&self, document_id: Uuid) -> CoreResult<Vec<Evaluation>> {
        let mut conn = self.conn()?;
        let rows: Vec<EvaluationRow> = evaluation_current::table
            .inner_join(evaluations::table)
            .filter(evaluation_current::document_id.eq(document_id))
            .order((evaluations::created_at.asc(), evaluations::seq.asc()))
            .select(EVALUATION_COLUMNS)
            .load(&mut conn)?;
        into_evaluations(rows)
    }
}
