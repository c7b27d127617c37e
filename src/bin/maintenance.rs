use std::env;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use tracing_subscriber::EnvFilter;

use reviewdesk::{
    auth::{jwt::JwtService, IdentityContext},
    config::AppConfig,
    db,
    service::ReviewService,
    store::{DocumentStore, PgStore},
};

const USAGE: &str = "Usage:
  maintenance create-user <email> <password> <role> [full name]
  maintenance list-users";

fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let args: Vec<String> = env::args().skip(1).collect();
    match args.iter().map(String::as_str).collect::<Vec<_>>().as_slice() {
        ["create-user", email, password, role] => create_user(email, password, role, None),
        ["create-user", email, password, role, full_name] => {
            create_user(email, password, role, Some(*full_name))
        }
        ["list-users"] => list_users(),
        [cmd, ..] => bail!("unknown or incomplete command: {cmd}\n{USAGE}"),
        [] => bail!("{USAGE}"),
    }
}

fn connect() -> Result<(AppConfig, PgStore)> {
    let config = AppConfig::from_env()?;
    let database_url = config
        .database_url
        .clone()
        .context("DATABASE_URL must be set for maintenance commands")?;
    tracing::info!(
        component = "maintenance",
        database_url = %config.redacted_database_url(),
        "loaded configuration"
    );
    let pool = db::init_pool(&database_url)?;
    db::run_migrations(&pool)?;
    Ok((config, PgStore::new(pool)))
}

/// Creates an account directly in the database, e.g. the first admin.
fn create_user(email: &str, password: &str, role: &str, full_name: Option<&str>) -> Result<()> {
    let (config, store) = connect()?;
    let jwt = JwtService::from_config(&config)?;
    let service = ReviewService::new(Arc::new(store), IdentityContext::new(jwt));

    let user = service
        .register(email, password, role, full_name)
        .map_err(|err| anyhow!("failed to create user: {err}"))?;
    println!("{}\t{}\t{}", user.id, user.email, user.role);
    Ok(())
}

fn list_users() -> Result<()> {
    let (_, store) = connect()?;
    let users = store
        .list_users()
        .map_err(|err| anyhow!("failed to list users: {err}"))?;

    if users.is_empty() {
        println!("No users found.");
        return Ok(());
    }
    for user in users {
        println!(
            "{}\t{}\t{}\t{}\t{}",
            user.id,
            user.email,
            user.full_name.as_deref().unwrap_or("-"),
            user.role,
            user.created_at.to_rfc3339()
        );
    }
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}
