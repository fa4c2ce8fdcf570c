//! Job repository: CRUD operations for the `jobs` table.

use rusqlite::{params, Connection, Row};

use super::{Database, DatabaseError};

/// A raw job row from the database.
#[derive(Debug, Clone)]
pub struct JobRow {
    pub id: String,
    pub user_id: String,
    pub video_id: Option<String>,
    pub job_type: String,
    pub status: String,
    pub progress: f64,
    pub config: Option<String>,
    pub result: Option<String>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub retry_count: u32,
    pub max_retries: u32,
    pub created_at: String,
    pub updated_at: String,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
}

impl JobRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            user_id: row.get("user_id")?,
            video_id: row.get("video_id")?,
            job_type: row.get("job_type")?,
            status: row.get("status")?,
            progress: row.get("progress")?,
            config: row.get("config")?,
            result: row.get("result")?,
            error_code: row.get("error_code")?,
            error_message: row.get("error_message")?,
            retry_count: row.get("retry_count")?,
            max_retries: row.get("max_retries")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
            started_at: row.get("started_at")?,
            completed_at: row.get("completed_at")?,
        })
    }
}

/// Query filter parameters for job listing.
#[derive(Debug, Default, Clone)]
pub struct JobFilter {
    pub user_id: Option<String>,
    pub video_id: Option<String>,
    pub job_type: Option<String>,
    pub status: Option<String>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

/// Inserts a new job row.
pub fn insert(db: &Database, job: &JobRow) -> Result<(), DatabaseError> {
    db.with_conn(|conn| insert_with_conn(conn, job))
}

pub(crate) fn insert_with_conn(conn: &Connection, job: &JobRow) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO jobs (id, user_id, video_id, job_type, status, progress, config,
         result, error_code, error_message, retry_count, max_retries, created_at,
         updated_at, started_at, completed_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
        params![
            job.id,
            job.user_id,
            job.video_id,
            job.job_type,
            job.status,
            job.progress,
            job.config,
            job.result,
            job.error_code,
            job.error_message,
            job.retry_count,
            job.max_retries,
            job.created_at,
            job.updated_at,
            job.started_at,
            job.completed_at,
        ],
    )?;
    Ok(())
}

/// Updates an existing job row. All fields except `id`, `user_id`, `video_id`,
/// `job_type`, `config` and `created_at` are overwritten; those are fixed at
/// creation.
pub fn update(db: &Database, job: &JobRow) -> Result<(), DatabaseError> {
    db.with_conn(|conn| update_with_conn(conn, job))
}

pub(crate) fn update_with_conn(conn: &Connection, job: &JobRow) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE jobs SET status=?2, progress=?3, result=?4, error_code=?5,
         error_message=?6, retry_count=?7, max_retries=?8, updated_at=?9,
         started_at=?10, completed_at=?11
         WHERE id=?1",
        params![
            job.id,
            job.status,
            job.progress,
            job.result,
            job.error_code,
            job.error_message,
            job.retry_count,
            job.max_retries,
            job.updated_at,
            job.started_at,
            job.completed_at,
        ],
    )?;
    Ok(())
}

/// Finds a job by its ID.
pub fn find_by_id(db: &Database, id: &str) -> Result<Option<JobRow>, DatabaseError> {
    db.with_conn(|conn| find_by_id_with_conn(conn, id))
}

pub(crate) fn find_by_id_with_conn(
    conn: &Connection,
    id: &str,
) -> Result<Option<JobRow>, DatabaseError> {
    let mut stmt = conn.prepare("SELECT * FROM jobs WHERE id = ?1")?;
    let mut rows = stmt.query_map(params![id], JobRow::from_row)?;
    match rows.next() {
        Some(Ok(row)) => Ok(Some(row)),
        Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
        None => Ok(None),
    }
}

/// Queries jobs with filters, returning (rows, total_count).
pub fn query(db: &Database, filter: &JobFilter) -> Result<(Vec<JobRow>, u64), DatabaseError> {
    db.with_conn(|conn| {
        let mut conditions = Vec::new();
        let mut param_values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

        if let Some(ref user_id) = filter.user_id {
            conditions.push(format!("user_id = ?{}", param_values.len() + 1));
            param_values.push(Box::new(user_id.clone()));
        }
        if let Some(ref video_id) = filter.video_id {
            conditions.push(format!("video_id = ?{}", param_values.len() + 1));
            param_values.push(Box::new(video_id.clone()));
        }
        if let Some(ref job_type) = filter.job_type {
            conditions.push(format!("job_type = ?{}", param_values.len() + 1));
            param_values.push(Box::new(job_type.clone()));
        }
        if let Some(ref status) = filter.status {
            conditions.push(format!("status = ?{}", param_values.len() + 1));
            param_values.push(Box::new(status.clone()));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        // Count total matching rows.
        let count_sql = format!("SELECT COUNT(*) FROM jobs {}", where_clause);
        let params_ref: Vec<&dyn rusqlite::types::ToSql> =
            param_values.iter().map(|p| p.as_ref()).collect();
        let total: u64 = conn.query_row(&count_sql, params_ref.as_slice(), |r| r.get(0))?;

        // Fetch paginated results.
        let limit = filter.limit.unwrap_or(100) as i64;
        let offset = filter.offset.unwrap_or(0) as i64;
        param_values.push(Box::new(limit));
        param_values.push(Box::new(offset));
        let query_sql = format!(
            "SELECT * FROM jobs {} ORDER BY created_at DESC LIMIT ?{} OFFSET ?{}",
            where_clause,
            param_values.len() - 1,
            param_values.len()
        );

        let params_ref: Vec<&dyn rusqlite::types::ToSql> =
            param_values.iter().map(|p| p.as_ref()).collect();
        let mut stmt = conn.prepare(&query_sql)?;
        let rows: Vec<JobRow> = stmt
            .query_map(params_ref.as_slice(), JobRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok((rows, total))
    })
}

/// Counts jobs with the given status.
pub fn count_by_status(db: &Database, status: &str) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let count: u64 = conn.query_row(
            "SELECT COUNT(*) FROM jobs WHERE status = ?1",
            params![status],
            |r| r.get(0),
        )?;
        Ok(count)
    })
}

/// Deletes terminal jobs whose completed_at is before the cutoff.
/// Steps are removed by the foreign key cascade. Returns the number deleted.
pub fn delete_terminal_before(db: &Database, cutoff: &str) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let deleted = conn.execute(
            "DELETE FROM jobs
             WHERE status IN ('completed', 'failed', 'cancelled') AND completed_at < ?1",
            params![cutoff],
        )?;
        Ok(deleted as u64)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Database {
        Database::open_in_memory().expect("Failed to create test database")
    }

    fn sample_job(id: &str) -> JobRow {
        JobRow {
            id: id.to_string(),
            user_id: "user-1".to_string(),
            video_id: Some("video-1".to_string()),
            job_type: "dubbing".to_string(),
            status: "pending".to_string(),
            progress: 0.0,
            config: Some(r#"{"target_language":"ko"}"#.to_string()),
            result: None,
            error_code: None,
            error_message: None,
            retry_count: 0,
            max_retries: 3,
            created_at: "2026-01-01T00:00:00+00:00".to_string(),
            updated_at: "2026-01-01T00:00:00+00:00".to_string(),
            started_at: None,
            completed_at: None,
        }
    }

    #[test]
    fn test_insert_and_find() {
        let db = test_db();
        let job = sample_job("job-1");
        insert(&db, &job).unwrap();

        let found = find_by_id(&db, "job-1").unwrap();
        assert!(found.is_some());
        let found = found.unwrap();
        assert_eq!(found.user_id, "user-1");
        assert_eq!(found.status, "pending");
        assert_eq!(found.config.as_deref(), Some(r#"{"target_language":"ko"}"#));
    }

    #[test]
    fn test_find_nonexistent() {
        let db = test_db();
        let found = find_by_id(&db, "nonexistent").unwrap();
        assert!(found.is_none());
    }

    #[test]
    fn test_update() {
        let db = test_db();
        let mut job = sample_job("job-2");
        insert(&db, &job).unwrap();

        job.status = "completed".to_string();
        job.progress = 100.0;
        job.result = Some(r#"{"dubbed_video_url":"s3://out.mp4"}"#.to_string());
        job.completed_at = Some("2026-01-01T01:00:00+00:00".to_string());
        update(&db, &job).unwrap();

        let found = find_by_id(&db, "job-2").unwrap().unwrap();
        assert_eq!(found.status, "completed");
        assert_eq!(found.progress, 100.0);
        assert!(found.result.is_some());
        assert!(found.completed_at.is_some());
    }

    #[test]
    fn test_query_no_filter() {
        let db = test_db();
        insert(&db, &sample_job("q1")).unwrap();
        insert(&db, &sample_job("q2")).unwrap();
        insert(&db, &sample_job("q3")).unwrap();

        let (rows, total) = query(&db, &JobFilter::default()).unwrap();
        assert_eq!(total, 3);
        assert_eq!(rows.len(), 3);
    }

    #[test]
    fn test_query_with_status_filter() {
        let db = test_db();
        insert(&db, &sample_job("s1")).unwrap();

        let mut completed_job = sample_job("s2");
        completed_job.status = "completed".to_string();
        insert(&db, &completed_job).unwrap();

        let (rows, total) = query(
            &db,
            &JobFilter {
                status: Some("completed".to_string()),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(total, 1);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, "s2");
    }

    #[test]
    fn test_query_by_user_and_video() {
        let db = test_db();
        insert(&db, &sample_job("u1")).unwrap();

        let mut other = sample_job("u2");
        other.user_id = "user-2".to_string();
        other.video_id = Some("video-9".to_string());
        insert(&db, &other).unwrap();

        let (rows, _) = query(
            &db,
            &JobFilter {
                user_id: Some("user-2".to_string()),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, "u2");

        let (rows, _) = query(
            &db,
            &JobFilter {
                video_id: Some("video-1".to_string()),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, "u1");
    }

    #[test]
    fn test_query_pagination() {
        let db = test_db();
        for i in 0..10 {
            let mut job = sample_job(&format!("p{}", i));
            job.created_at = format!("2026-01-{:02}T00:00:00+00:00", i + 1);
            insert(&db, &job).unwrap();
        }

        let (rows, total) = query(
            &db,
            &JobFilter {
                limit: Some(3),
                offset: Some(0),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(total, 10);
        assert_eq!(rows.len(), 3);
        // Newest first.
        assert_eq!(rows[0].id, "p9");
    }

    #[test]
    fn test_count_by_status() {
        let db = test_db();
        insert(&db, &sample_job("c1")).unwrap();
        insert(&db, &sample_job("c2")).unwrap();

        let mut failed = sample_job("c3");
        failed.status = "failed".to_string();
        insert(&db, &failed).unwrap();

        assert_eq!(count_by_status(&db, "pending").unwrap(), 2);
        assert_eq!(count_by_status(&db, "failed").unwrap(), 1);
        assert_eq!(count_by_status(&db, "completed").unwrap(), 0);
    }

    #[test]
    fn test_delete_terminal_before() {
        let db = test_db();

        let mut old = sample_job("old-1");
        old.status = "completed".to_string();
        old.completed_at = Some("2025-01-01T00:00:00+00:00".to_string());
        insert(&db, &old).unwrap();

        let mut recent = sample_job("new-1");
        recent.status = "completed".to_string();
        recent.completed_at = Some("2026-06-01T00:00:00+00:00".to_string());
        insert(&db, &recent).unwrap();

        // Active job, must never be cleaned up.
        insert(&db, &sample_job("active-1")).unwrap();

        let deleted = delete_terminal_before(&db, "2026-01-01T00:00:00+00:00").unwrap();
        assert_eq!(deleted, 1);
        assert!(find_by_id(&db, "old-1").unwrap().is_none());
        assert!(find_by_id(&db, "new-1").unwrap().is_some());
        assert!(find_by_id(&db, "active-1").unwrap().is_some());
    }
}
