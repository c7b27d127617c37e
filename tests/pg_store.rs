//! Exercises `PgStore` against a real database. Skipped unless
//! `TEST_DATABASE_URL` points at a Postgres instance the tests may truncate.

use std::env;
use std::sync::{Mutex, MutexGuard};

use anyhow::{anyhow, Context, Result};
use diesel::connection::SimpleConnection;
use once_cell::sync::Lazy;
use reviewdesk::db;
use reviewdesk::models::{
    Document, EvaluationStatus, NewDocument, NewEvaluation, NewUser, Role, User,
};
use reviewdesk::store::{DocumentStore, PgStore};
use reviewdesk::CoreError;
use uuid::Uuid;

static DB_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

fn acquire_db_lock() -> MutexGuard<'static, ()> {
    DB_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn store() -> Result<Option<PgStore>> {
    let Ok(database_url) = env::var("TEST_DATABASE_URL") else {
        eprintln!("TEST_DATABASE_URL not set; skipping postgres store test");
        return Ok(None);
    };
    let pool = db::init_pool_with_size(&database_url, db::DEFAULT_MAX_POOL_SIZE)?;
    db::run_migrations(&pool)?;
    let mut conn = pool
        .get()
        .map_err(|err| anyhow!("failed to acquire connection: {err}"))?;
    conn.batch_execute(
        "TRUNCATE TABLE evaluation_current, evaluations, documents, users RESTART IDENTITY CASCADE;",
    )
    .context("failed to truncate tables")?;
    Ok(Some(PgStore::new(pool)))
}

fn user(store: &PgStore, email: &str, role: Role) -> Result<User> {
    Ok(store.create_user(NewUser {
        id: Uuid::new_v4(),
        email: email.to_string(),
        password_hash: "hash".to_string(),
        full_name: None,
        role,
    })?)
}

fn document(store: &PgStore, owner: &User, title: &str) -> Result<Document> {
    Ok(store.create_document(NewDocument {
        id: Uuid::new_v4(),
        title: title.to_string(),
        organization: "Acme".to_string(),
        storage_ref: format!("documents/{}/{title}.pdf", owner.id),
        owner_id: owner.id,
    })?)
}

fn evaluation(
    document: &Document,
    reviewer: &User,
    status: EvaluationStatus,
    comment: &str,
) -> NewEvaluation {
    NewEvaluation {
        id: Uuid::new_v4(),
        document_id: document.id,
        reviewer_id: reviewer.id,
        status,
        comment: comment.to_string(),
    }
}

#[test]
fn users_are_unique_by_email() -> Result<()> {
    let _lock = acquire_db_lock();
    let Some(store) = store()? else {
        return Ok(());
    };

    let admin = user(&store, "admin@example.org", Role::Admin)?;
    let found = store
        .find_user_by_email("admin@example.org")?
        .expect("user stored");
    assert_eq!(found.id, admin.id);
    assert_eq!(found.role, Role::Admin);
    assert!(store.find_user_by_email("missing@example.org")?.is_none());

    let duplicate = user(&store, "admin@example.org", Role::Grantee);
    let err = duplicate.unwrap_err().downcast::<CoreError>()?;
    assert_eq!(err, CoreError::InvalidInput("email_taken"));

    assert!(matches!(
        store.get_user(Uuid::new_v4()),
        Err(CoreError::NotFound(_))
    ));

    let named = store.create_user(NewUser {
        id: Uuid::new_v4(),
        email: "named@example.org".to_string(),
        password_hash: "hash".to_string(),
        full_name: Some("Named Person".to_string()),
        role: Role::Reviewer,
    })?;
    assert_eq!(
        store.get_user(named.id)?.full_name.as_deref(),
        Some("Named Person")
    );
    assert_eq!(found.full_name, None);
    Ok(())
}

#[test]
fn document_queries_follow_owner_and_assignee() -> Result<()> {
    let _lock = acquire_db_lock();
    let Some(store) = store()? else {
        return Ok(());
    };

    let grantee = user(&store, "g@example.org", Role::Grantee)?;
    let reviewer = user(&store, "r@example.org", Role::Reviewer)?;
    let first = document(&store, &grantee, "first")?;
    let mut second = document(&store, &grantee, "second")?;

    second.assigned_reviewer_id = Some(reviewer.id);
    let updated = store.update_document(&second)?;
    assert_eq!(updated.assigned_reviewer_id, Some(reviewer.id));
    assert_eq!(updated.title, "second");

    let owned = store.list_by_owner(grantee.id)?;
    assert_eq!(
        owned.iter().map(|d| d.id).collect::<Vec<_>>(),
        vec![second.id, first.id]
    );
    let assigned = store.list_by_assignee(reviewer.id)?;
    assert_eq!(assigned.len(), 1);
    assert_eq!(assigned[0].id, second.id);
    assert_eq!(store.list_all()?.len(), 2);

    let orphan = store.create_document(NewDocument {
        id: Uuid::new_v4(),
        title: "orphan".to_string(),
        organization: "Acme".to_string(),
        storage_ref: "documents/x".to_string(),
        owner_id: Uuid::new_v4(),
    });
    assert!(matches!(orphan, Err(CoreError::NotFound(_))));
    Ok(())
}

#[test]
fn evaluations_keep_history_and_one_current_row() -> Result<()> {
    let _lock = acquire_db_lock();
    let Some(store) = store()? else {
        return Ok(());
    };

    let grantee = user(&store, "g@example.org", Role::Grantee)?;
    let reviewer = user(&store, "r@example.org", Role::Reviewer)?;
    let doc = document(&store, &grantee, "proposal")?;

    let first = store.upsert_evaluation(evaluation(
        &doc,
        &reviewer,
        EvaluationStatus::NeedsRevision,
        "more detail",
    ))?;
    let second = store.upsert_evaluation(evaluation(
        &doc,
        &reviewer,
        EvaluationStatus::Approved,
        "good",
    ))?;

    let history = store.list_evaluations(doc.id)?;
    assert_eq!(
        history.iter().map(|e| e.id).collect::<Vec<_>>(),
        vec![first.id, second.id]
    );

    let current = store.list_current_evaluations(doc.id)?;
    assert_eq!(current.len(), 1);
    assert_eq!(current[0].id, second.id);
    assert_eq!(current[0].status, EvaluationStatus::Approved);
    Ok(())
}
