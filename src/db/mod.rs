pub mod models;
pub mod queries;

use std::str::FromStr;

use anyhow::Context;
use sqlx::any::{AnyConnectOptions, AnyPoolOptions};
use sqlx::{AnyPool, ConnectOptions, Executor};

use crate::config::Config;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./src/db/migrations");

pub async fn connect_and_migrate(config: &Config) -> anyhow::Result<AnyPool> {
    sqlx::any::install_default_drivers();

    let db_url = normalized_db_url(&config.db_url);
    let is_sqlite = db_url.starts_with("sqlite:");

    let connect_options = AnyConnectOptions::from_str(&db_url)
        .with_context(|| format!("invalid SYNCRO_DB_URL: {}", config.db_url))?
        .disable_statement_logging();

    // Pragmas are per connection, so a sqlite pool is pinned to one connection
    // to keep foreign key enforcement (and the cascades it drives) reliable.
    let max_connections = if is_sqlite { 1 } else { 8 };
    let pool = AnyPoolOptions::new()
        .max_connections(max_connections)
        .connect_with(connect_options)
        .await
        .context("failed to establish sqlx AnyPool")?;

    if is_sqlite {
        pool.execute("PRAGMA foreign_keys = ON;")
            .await
            .context("failed to enable sqlite foreign keys")?;
        pool.execute("PRAGMA journal_mode = WAL;")
            .await
            .context("failed to set sqlite WAL mode")?;
    }

    MIGRATOR
        .run(&pool)
        .await
        .context("failed to run migrations")?;

    Ok(pool)
}

fn normalized_db_url(db_url: &str) -> String {
    let Some(path_and_query) = db_url.strip_prefix("sqlite://") else {
        return db_url.to_string();
    };

    let (path, query) = match path_and_query.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (path_and_query, None),
    };

    let mut path = path.replace('\\', "/");
    let has_windows_drive_prefix = path.len() >= 2
        && path.as_bytes()[0].is_ascii_alphabetic()
        && path.as_bytes()[1] == b':';
    if has_windows_drive_prefix {
        path.insert(0, '/');
    }

    format!("sqlite://{path}?{}", query.unwrap_or("mode=rwc"))
}
