//! Step repository: CRUD operations for the `job_steps` table.

use rusqlite::{params, Connection, Row};

use super::{Database, DatabaseError};

/// A raw job step row from the database.
#[derive(Debug, Clone)]
pub struct StepRow {
    pub job_id: String,
    pub step_name: String,
    pub step_order: u32,
    pub weight: f64,
    pub status: String,
    pub progress: f64,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub input_data: Option<String>,
    pub output_data: Option<String>,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
    pub updated_at: String,
}

impl StepRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            job_id: row.get("job_id")?,
            step_name: row.get("step_name")?,
            step_order: row.get("step_order")?,
            weight: row.get("weight")?,
            status: row.get("status")?,
            progress: row.get("progress")?,
            error_code: row.get("error_code")?,
            error_message: row.get("error_message")?,
            input_data: row.get("input_data")?,
            output_data: row.get("output_data")?,
            started_at: row.get("started_at")?,
            completed_at: row.get("completed_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

pub(crate) fn insert_with_conn(conn: &Connection, step: &StepRow) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO job_steps (job_id, step_name, step_order, weight, status, progress,
         error_code, error_message, input_data, output_data, started_at, completed_at,
         updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        params![
            step.job_id,
            step.step_name,
            step.step_order,
            step.weight,
            step.status,
            step.progress,
            step.error_code,
            step.error_message,
            step.input_data,
            step.output_data,
            step.started_at,
            step.completed_at,
            step.updated_at,
        ],
    )?;
    Ok(())
}

pub(crate) fn update_with_conn(conn: &Connection, step: &StepRow) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE job_steps SET status=?3, progress=?4, error_code=?5, error_message=?6,
         input_data=?7, output_data=?8, started_at=?9, completed_at=?10, updated_at=?11
         WHERE job_id=?1 AND step_name=?2",
        params![
            step.job_id,
            step.step_name,
            step.status,
            step.progress,
            step.error_code,
            step.error_message,
            step.input_data,
            step.output_data,
            step.started_at,
            step.completed_at,
            step.updated_at,
        ],
    )?;
    Ok(())
}

/// Returns all steps for a job ordered by step_order.
pub fn find_by_job(db: &Database, job_id: &str) -> Result<Vec<StepRow>, DatabaseError> {
    db.with_conn(|conn| find_by_job_with_conn(conn, job_id))
}

pub(crate) fn find_by_job_with_conn(
    conn: &Connection,
    job_id: &str,
) -> Result<Vec<StepRow>, DatabaseError> {
    let mut stmt =
        conn.prepare("SELECT * FROM job_steps WHERE job_id = ?1 ORDER BY step_order ASC")?;
    let rows: Vec<StepRow> = stmt
        .query_map(params![job_id], StepRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Finds one step by (job_id, step_name).
pub fn find_one(
    db: &Database,
    job_id: &str,
    step_name: &str,
) -> Result<Option<StepRow>, DatabaseError> {
    db.with_conn(|conn| find_one_with_conn(conn, job_id, step_name))
}

pub(crate) fn find_one_with_conn(
    conn: &Connection,
    job_id: &str,
    step_name: &str,
) -> Result<Option<StepRow>, DatabaseError> {
    let mut stmt =
        conn.prepare("SELECT * FROM job_steps WHERE job_id = ?1 AND step_name = ?2")?;
    let mut rows = stmt.query_map(params![job_id, step_name], StepRow::from_row)?;
    match rows.next() {
        Some(Ok(row)) => Ok(Some(row)),
        Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
        None => Ok(None),
    }
}

/// Returns true if any steps exist for the job.
pub fn exists_for_job(db: &Database, job_id: &str) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| exists_for_job_with_conn(conn, job_id))
}

pub(crate) fn exists_for_job_with_conn(
    conn: &Connection,
    job_id: &str,
) -> Result<bool, DatabaseError> {
    let count: u32 = conn.query_row(
        "SELECT COUNT(*) FROM job_steps WHERE job_id = ?1",
        params![job_id],
        |r| r.get(0),
    )?;
    Ok(count > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::job_repo;

    fn test_db() -> Database {
        let db = Database::open_in_memory().expect("Failed to create test database");
        let job = job_repo::JobRow {
            id: "job-1".to_string(),
            user_id: "user-1".to_string(),
            video_id: None,
            job_type: "dubbing".to_string(),
            status: "pending".to_string(),
            progress: 0.0,
            config: None,
            result: None,
            error_code: None,
            error_message: None,
            retry_count: 0,
            max_retries: 3,
            created_at: "2026-01-01T00:00:00+00:00".to_string(),
            updated_at: "2026-01-01T00:00:00+00:00".to_string(),
            started_at: None,
            completed_at: None,
        };
        job_repo::insert(&db, &job).unwrap();
        db
    }

    fn sample_step(name: &str, order: u32, weight: f64) -> StepRow {
        StepRow {
            job_id: "job-1".to_string(),
            step_name: name.to_string(),
            step_order: order,
            weight,
            status: "pending".to_string(),
            progress: 0.0,
            error_code: None,
            error_message: None,
            input_data: None,
            output_data: None,
            started_at: None,
            completed_at: None,
            updated_at: "2026-01-01T00:00:00+00:00".to_string(),
        }
    }

    #[test]
    fn test_insert_and_find_ordered() {
        let db = test_db();
        db.with_conn(|conn| {
            insert_with_conn(conn, &sample_step("translate", 2, 15.0))?;
            insert_with_conn(conn, &sample_step("speech_recognition", 1, 15.0))?;
            insert_with_conn(conn, &sample_step("merge_audio", 3, 10.0))?;
            Ok(())
        })
        .unwrap();

        let steps = find_by_job(&db, "job-1").unwrap();
        assert_eq!(steps.len(), 3);
        assert_eq!(steps[0].step_name, "speech_recognition");
        assert_eq!(steps[1].step_name, "translate");
        assert_eq!(steps[2].step_name, "merge_audio");
    }

    #[test]
    fn test_find_one() {
        let db = test_db();
        db.with_conn(|conn| insert_with_conn(conn, &sample_step("translate", 1, 15.0)))
            .unwrap();

        let step = find_one(&db, "job-1", "translate").unwrap();
        assert!(step.is_some());
        assert_eq!(step.unwrap().weight, 15.0);

        assert!(find_one(&db, "job-1", "missing").unwrap().is_none());
    }

    #[test]
    fn test_update() {
        let db = test_db();
        db.with_conn(|conn| insert_with_conn(conn, &sample_step("translate", 1, 15.0)))
            .unwrap();

        let mut step = find_one(&db, "job-1", "translate").unwrap().unwrap();
        step.status = "completed".to_string();
        step.progress = 100.0;
        step.output_data = Some(r#"{"segments":42}"#.to_string());
        step.completed_at = Some("2026-01-01T00:05:00+00:00".to_string());
        db.with_conn(|conn| update_with_conn(conn, &step)).unwrap();

        let found = find_one(&db, "job-1", "translate").unwrap().unwrap();
        assert_eq!(found.status, "completed");
        assert_eq!(found.progress, 100.0);
        assert_eq!(found.output_data.as_deref(), Some(r#"{"segments":42}"#));
    }

    #[test]
    fn test_exists_for_job() {
        let db = test_db();
        assert!(!exists_for_job(&db, "job-1").unwrap());

        db.with_conn(|conn| insert_with_conn(conn, &sample_step("asr", 1, 10.0)))
            .unwrap();
        assert!(exists_for_job(&db, "job-1").unwrap());
    }

    #[test]
    fn test_duplicate_step_name_rejected() {
        let db = test_db();
        db.with_conn(|conn| insert_with_conn(conn, &sample_step("asr", 1, 10.0)))
            .unwrap();

        let dup = db.with_conn(|conn| insert_with_conn(conn, &sample_step("asr", 2, 10.0)));
        assert!(dup.is_err());
    }
}
