use chrono::{DateTime, TimeZone, Utc};
use log::{debug, error, info, warn};
use rocket::{
    fairing::{self, AdHoc},
    serde::{
        de::DeserializeOwned,
        json::{serde_json, Json, Value},
    },
    Build, Rocket,
};
use rocket_db_pools::{Connection, Database};
use sqlx::{sqlite::SqliteRow, Row, SqliteConnection, SqlitePool};

use crate::Result;

#[derive(Database)]
#[database("fitsocial")]
pub struct Db(SqlitePool);

/// An embedded schema script, applied at most once per database.
struct Migration {
    name: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[Migration {
    name: "0001_setup_tables",
    sql: include_str!("../migrations/0001_setup_tables/up.sql"),
}];

/// Every table holding user data, children before parents.
const TABLES: &[&str] = &[
    "comments",
    "exercises",
    "likes",
    "stars",
    "workouts",
    "credentials",
    "users",
];

/// Opens the pool and brings the schema up to date before launch.
pub fn stage() -> AdHoc {
    AdHoc::on_ignite("SQLite store", |rocket| async {
        rocket
            .attach(Db::init())
            .attach(AdHoc::try_on_ignite("Migrations", run_migrations))
    })
}

async fn run_migrations(rocket: Rocket<Build>) -> fairing::Result {
    let Some(db) = Db::fetch(&rocket) else {
        error!("Database pool missing at migration time");
        return Err(rocket);
    };
    match migrate(&**db).await {
        Ok(()) => Ok(rocket),
        Err(e) => {
            error!("Failed to migrate database: {}", e);
            Err(rocket)
        }
    }
}

/// Splits a script into statements, dropping `--` comment lines.
fn split_statements(sql: &str) -> Vec<String> {
    let script: String = sql
        .lines()
        .filter(|line| !line.trim_start().starts_with("--"))
        .flat_map(|line| [line, "\n"])
        .collect();
    script
        .split(';')
        .map(str::trim)
        .filter(|statement| !statement.is_empty())
        .map(str::to_owned)
        .collect()
}

impl Migration {
    async fn is_recorded(&self, pool: &SqlitePool) -> sqlx::Result<bool> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM _migrations WHERE name = ?")
            .bind(self.name)
            .fetch_one(pool)
            .await?;
        Ok(count > 0)
    }

    /// Runs the script and records it; a failing statement rolls back both.
    async fn apply(&self, pool: &SqlitePool) -> sqlx::Result<()> {
        let mut tx = pool.begin().await?;
        for statement in split_statements(self.sql) {
            sqlx::query(&statement).execute(&mut *tx).await?;
        }
        sqlx::query("INSERT INTO _migrations (name, applied_at) VALUES (?, ?)")
            .bind(self.name)
            .bind(Utc::now().timestamp_millis())
            .execute(&mut *tx)
            .await?;
        tx.commit().await
    }
}

/// Brings the store up to date with every bundled migration.
pub async fn migrate(pool: &SqlitePool) -> sqlx::Result<()> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS _migrations (name TEXT NOT NULL PRIMARY KEY, applied_at INTEGER NOT NULL)",
    )
    .execute(pool)
    .await?;

    for migration in MIGRATIONS {
        if migration.is_recorded(pool).await? {
            debug!("{} is already applied", migration.name);
            continue;
        }
        migration.apply(pool).await?;
        info!("Applied migration {}", migration.name);
    }
    Ok(())
}

/// Deletes every row of every collection in one transaction.
pub async fn nuke(conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    let mut tx = sqlx::Connection::begin(conn).await?;
    for table in TABLES {
        let deleted = sqlx::query(&format!("DELETE FROM {table}"))
            .execute(&mut *tx)
            .await?
            .rows_affected();
        debug!("nuke: removed {} rows from {}", deleted, table);
    }
    tx.commit().await
}

/// Wipes the whole store. Unauthenticated.
#[get("/nukedb")]
pub async fn nukedb(mut db: Connection<Db>) -> Result<Json<Value>> {
    warn!("Wiping every collection");
    nuke(&mut db).await?;
    Ok(Json(Value::Object(Default::default())))
}

pub(crate) fn decode_json<T: DeserializeOwned>(row: &SqliteRow, column: &str) -> sqlx::Result<T> {
    let raw: String = row.try_get(column)?;
    serde_json::from_str(&raw).map_err(|e| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: Box::new(e),
    })
}

pub(crate) fn decode_timestamp(row: &SqliteRow, column: &str) -> sqlx::Result<DateTime<Utc>> {
    let millis: i64 = row.try_get(column)?;
    Utc.timestamp_millis_opt(millis)
        .single()
        .ok_or_else(|| sqlx::Error::ColumnDecode {
            index: column.to_string(),
            source: format!("timestamp out of range: {millis}").into(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statements_skip_comments_and_blank_lines() {
        let sql = "-- header\nCREATE TABLE a (id TEXT);\n\n-- more\nCREATE INDEX a_id ON a (id);\n";
        let statements = split_statements(sql);
        assert_eq!(
            statements,
            vec!["CREATE TABLE a (id TEXT)", "CREATE INDEX a_id ON a (id)"]
        );
    }

    #[test]
    fn bundled_migration_creates_every_collection() {
        let statements = split_statements(MIGRATIONS[0].sql);
        for table in TABLES {
            let create = format!("CREATE TABLE IF NOT EXISTS {table} (");
            assert!(
                statements.iter().any(|s| s.starts_with(&create)),
                "missing table {table}"
            );
        }
    }

    #[rocket::async_test]
    async fn migrating_twice_applies_each_script_once() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("m.db").display());
        let pool = SqlitePool::connect(&url).await.unwrap();

        migrate(&pool).await.unwrap();
        migrate(&pool).await.unwrap();

        let recorded = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM _migrations")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(recorded, MIGRATIONS.len() as i64);
        let users = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(users, 0);
    }
}
