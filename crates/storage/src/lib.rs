use std::{borrow::Cow, str::FromStr, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{
    migrate::MigrateError,
    pool::PoolConnection,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous},
    Executor, Sqlite, SqlitePool,
};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;

use staffdir_core::{
    Department, DepartmentStore, NewDepartment, NewProfile, Profile, ProfileStore, RecordId,
    StoreError,
};

/// Top-level database handle that owns the SQLite connection pool.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Establishes a new SQLite connection pool for the provided connection string.
    ///
    /// Pragmas are applied to every pooled connection through the options.
    pub async fn connect(database_url: &str) -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(StorageError::Connect)?
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_millis(5000));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(StorageError::Connect)?;

        Ok(Self { pool })
    }

    /// Applies migrations located under `migrations/`.
    pub async fn run_migrations(&self) -> Result<(), StorageError> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(StorageError::Migration)?;
        Ok(())
    }

    /// Returns a pool-backed handle for profile records.
    pub fn profiles(&self) -> ProfileRepository {
        ProfileRepository {
            pool: self.pool.clone(),
        }
    }

    /// Returns a pool-backed handle for department records.
    pub fn departments(&self) -> DepartmentRepository {
        DepartmentRepository {
            pool: self.pool.clone(),
        }
    }

    /// Begins a write transaction that serves both store traits until it is
    /// committed. Dropping it without committing rolls everything back.
    pub async fn unit_of_work(&self) -> Result<UnitOfWork, StorageError> {
        UnitOfWork::begin(&self.pool).await
    }

    /// Exposes the inner pool when lower level access is required.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// General storage level errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to connect to sqlite: {0}")]
    Connect(sqlx::Error),
    #[error("failed to run database migrations: {0}")]
    Migration(MigrateError),
    #[error("{table} row {id} does not exist")]
    MissingRow { table: &'static str, id: RecordId },
    #[error("department {0} referenced by profile does not exist")]
    MissingDepartment(RecordId),
    #[error("unit of work already finished")]
    Finished,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl From<StorageError> for StoreError {
    fn from(err: StorageError) -> Self {
        StoreError::backend(err)
    }
}

/// Repository for department rows, backed by the pool.
#[derive(Clone)]
pub struct DepartmentRepository {
    pool: SqlitePool,
}

#[async_trait]
impl DepartmentStore for DepartmentRepository {
    async fn find_by_id(&self, id: RecordId) -> Result<Option<Department>, StoreError> {
        Ok(fetch_department(&self.pool, id).await?)
    }

    async fn insert(&self, department: NewDepartment) -> Result<Department, StoreError> {
        Ok(insert_department(&self.pool, &department).await?)
    }

    async fn list(&self) -> Result<Vec<Department>, StoreError> {
        Ok(list_departments(&self.pool).await?)
    }
}

/// Repository for profile rows, backed by the pool.
#[derive(Clone)]
pub struct ProfileRepository {
    pool: SqlitePool,
}

#[async_trait]
impl ProfileStore for ProfileRepository {
    async fn find_by_id(&self, id: RecordId) -> Result<Option<Profile>, StoreError> {
        Ok(fetch_profile(&self.pool, id).await?)
    }

    async fn insert(&self, profile: NewProfile) -> Result<Profile, StoreError> {
        Ok(insert_profile(&self.pool, &profile).await?)
    }

    async fn save(&self, profile: Profile) -> Result<Profile, StoreError> {
        update_profile(&self.pool, &profile).await?;
        Ok(refetch_profile(&self.pool, profile.id).await?)
    }

    async fn list(&self) -> Result<Vec<Profile>, StoreError> {
        Ok(list_profiles(&self.pool).await?)
    }
}

/// A single SQLite transaction exposing both store traits.
///
/// The transaction is opened with `BEGIN IMMEDIATE`, so the write lock is
/// held before the first read. Concurrent units of work queue on the busy
/// timeout instead of failing on a stale WAL snapshot when they write.
pub struct UnitOfWork {
    conn: Mutex<Option<PoolConnection<Sqlite>>>,
}

impl UnitOfWork {
    async fn begin(pool: &SqlitePool) -> Result<Self, StorageError> {
        let mut conn = pool.acquire().await?;
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;
        Ok(Self {
            conn: Mutex::new(Some(conn)),
        })
    }

    pub async fn commit(self) -> Result<(), StorageError> {
        self.finish("COMMIT").await?;
        debug!(stage = "storage", "unit of work committed");
        Ok(())
    }

    pub async fn rollback(self) -> Result<(), StorageError> {
        self.finish("ROLLBACK").await?;
        debug!(stage = "storage", "unit of work rolled back");
        Ok(())
    }

    async fn finish(mut self, statement: &'static str) -> Result<(), StorageError> {
        let mut conn = self.conn.get_mut().take().ok_or(StorageError::Finished)?;
        if let Err(err) = sqlx::query(statement).execute(&mut *conn).await {
            // Never hand a connection with an open transaction back to the pool.
            drop(conn.detach());
            return Err(err.into());
        }
        Ok(())
    }
}

impl Drop for UnitOfWork {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.get_mut().take() {
            // Closing the detached connection rolls the open transaction back.
            drop(conn.detach());
            debug!(stage = "storage", "unit of work dropped without commit");
        }
    }
}

#[async_trait]
impl DepartmentStore for UnitOfWork {
    async fn find_by_id(&self, id: RecordId) -> Result<Option<Department>, StoreError> {
        let mut guard = self.conn.lock().await;
        let conn = guard.as_mut().ok_or(StorageError::Finished)?;
        Ok(fetch_department(&mut **conn, id).await?)
    }

    async fn insert(&self, department: NewDepartment) -> Result<Department, StoreError> {
        let mut guard = self.conn.lock().await;
        let conn = guard.as_mut().ok_or(StorageError::Finished)?;
        Ok(insert_department(&mut **conn, &department).await?)
    }

    async fn list(&self) -> Result<Vec<Department>, StoreError> {
        let mut guard = self.conn.lock().await;
        let conn = guard.as_mut().ok_or(StorageError::Finished)?;
        Ok(list_departments(&mut **conn).await?)
    }
}

#[async_trait]
impl ProfileStore for UnitOfWork {
    async fn find_by_id(&self, id: RecordId) -> Result<Option<Profile>, StoreError> {
        let mut guard = self.conn.lock().await;
        let conn = guard.as_mut().ok_or(StorageError::Finished)?;
        Ok(fetch_profile(&mut **conn, id).await?)
    }

    async fn insert(&self, profile: NewProfile) -> Result<Profile, StoreError> {
        let mut guard = self.conn.lock().await;
        let conn = guard.as_mut().ok_or(StorageError::Finished)?;
        Ok(insert_profile(&mut **conn, &profile).await?)
    }

    async fn save(&self, profile: Profile) -> Result<Profile, StoreError> {
        let mut guard = self.conn.lock().await;
        let conn = guard.as_mut().ok_or(StorageError::Finished)?;
        update_profile(&mut **conn, &profile).await?;
        Ok(refetch_profile(&mut **conn, profile.id).await?)
    }

    async fn list(&self) -> Result<Vec<Profile>, StoreError> {
        let mut guard = self.conn.lock().await;
        let conn = guard.as_mut().ok_or(StorageError::Finished)?;
        Ok(list_profiles(&mut **conn).await?)
    }
}

const PROFILE_BY_ID: &str = r#"
SELECT p.id,
       p.name,
       p.created_at,
       p.updated_at,
       d.id AS department_id,
       d.name AS department_name,
       d.created_at AS department_created_at
  FROM profiles AS p
  LEFT JOIN departments AS d
    ON d.id = p.department_id
 WHERE p.id = ?
"#;

const PROFILE_LIST: &str = r#"
SELECT p.id,
       p.name,
       p.created_at,
       p.updated_at,
       d.id AS department_id,
       d.name AS department_name,
       d.created_at AS department_created_at
  FROM profiles AS p
  LEFT JOIN departments AS d
    ON d.id = p.department_id
 ORDER BY p.id
"#;

/// Profile row joined with its department columns.
#[derive(Debug, sqlx::FromRow)]
struct ProfileRow {
    id: i64,
    name: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    department_id: Option<i64>,
    department_name: Option<String>,
    department_created_at: Option<DateTime<Utc>>,
}

impl ProfileRow {
    fn into_domain(self) -> Profile {
        let department = match (
            self.department_id,
            self.department_name,
            self.department_created_at,
        ) {
            (Some(id), Some(name), Some(created_at)) => Some(Department {
                id,
                name,
                created_at,
            }),
            _ => None,
        };
        Profile {
            id: self.id,
            name: self.name,
            department,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Columns returned by a profile insert; new profiles have no department.
#[derive(Debug, sqlx::FromRow)]
struct InsertedProfileRow {
    id: i64,
    name: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
struct DepartmentRow {
    id: i64,
    name: String,
    created_at: DateTime<Utc>,
}

impl DepartmentRow {
    fn into_domain(self) -> Department {
        Department {
            id: self.id,
            name: self.name,
            created_at: self.created_at,
        }
    }
}

async fn fetch_department<'e, E>(
    executor: E,
    id: RecordId,
) -> Result<Option<Department>, StorageError>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query_as::<_, DepartmentRow>(
        "SELECT id, name, created_at FROM departments WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(executor)
    .await?;

    Ok(row.map(DepartmentRow::into_domain))
}

async fn insert_department<'e, E>(
    executor: E,
    department: &NewDepartment,
) -> Result<Department, StorageError>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query_as::<_, DepartmentRow>(
        "INSERT INTO departments (name, created_at) VALUES (?, ?) \
         RETURNING id, name, created_at",
    )
    .bind(&department.name)
    .bind(to_rfc3339(department.created_at))
    .fetch_one(executor)
    .await?;

    Ok(row.into_domain())
}

async fn list_departments<'e, E>(executor: E) -> Result<Vec<Department>, StorageError>
where
    E: Executor<'e, Database = Sqlite>,
{
    let rows = sqlx::query_as::<_, DepartmentRow>(
        "SELECT id, name, created_at FROM departments ORDER BY id",
    )
    .fetch_all(executor)
    .await?;

    Ok(rows.into_iter().map(DepartmentRow::into_domain).collect())
}

async fn fetch_profile<'e, E>(executor: E, id: RecordId) -> Result<Option<Profile>, StorageError>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query_as::<_, ProfileRow>(PROFILE_BY_ID)
        .bind(id)
        .fetch_optional(executor)
        .await?;

    Ok(row.map(ProfileRow::into_domain))
}

async fn refetch_profile<'e, E>(executor: E, id: RecordId) -> Result<Profile, StorageError>
where
    E: Executor<'e, Database = Sqlite>,
{
    fetch_profile(executor, id)
        .await?
        .ok_or(StorageError::MissingRow {
            table: "profiles",
            id,
        })
}

async fn insert_profile<'e, E>(executor: E, profile: &NewProfile) -> Result<Profile, StorageError>
where
    E: Executor<'e, Database = Sqlite>,
{
    let created_at = to_rfc3339(profile.created_at);
    let row = sqlx::query_as::<_, InsertedProfileRow>(
        "INSERT INTO profiles (name, department_id, created_at, updated_at) \
         VALUES (?, NULL, ?, ?) \
         RETURNING id, name, created_at, updated_at",
    )
    .bind(&profile.name)
    .bind(&created_at)
    .bind(&created_at)
    .fetch_one(executor)
    .await?;

    Ok(Profile {
        id: row.id,
        name: row.name,
        department: None,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}

async fn list_profiles<'e, E>(executor: E) -> Result<Vec<Profile>, StorageError>
where
    E: Executor<'e, Database = Sqlite>,
{
    let rows = sqlx::query_as::<_, ProfileRow>(PROFILE_LIST)
        .fetch_all(executor)
        .await?;

    Ok(rows.into_iter().map(ProfileRow::into_domain).collect())
}

async fn update_profile<'e, E>(executor: E, profile: &Profile) -> Result<(), StorageError>
where
    E: Executor<'e, Database = Sqlite>,
{
    let department_id = profile.department_id();
    let result = sqlx::query(
        "UPDATE profiles SET name = ?, department_id = ?, updated_at = ? WHERE id = ?",
    )
    .bind(&profile.name)
    .bind(department_id)
    .bind(to_rfc3339(profile.updated_at))
    .bind(profile.id)
    .execute(executor)
    .await;

    match result {
        Ok(done) if done.rows_affected() == 0 => Err(StorageError::MissingRow {
            table: "profiles",
            id: profile.id,
        }),
        Ok(_) => Ok(()),
        Err(sqlx::Error::Database(db_err)) => {
            if db_err.code() == Some(Cow::Borrowed("787")) {
                if let Some(id) = department_id {
                    return Err(StorageError::MissingDepartment(id));
                }
            }
            Err(StorageError::Database(sqlx::Error::Database(db_err)))
        }
        Err(err) => Err(StorageError::Database(err)),
    }
}

fn to_rfc3339(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}
