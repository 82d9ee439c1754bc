//! # Run Store
//!
//! Single SQLite database for run history and phase results, at
//! `.symphony/symphony.db` by default.

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::project::{PhaseResult, ProjectBrief, RunReport, RunStatus};

/// Schema version for migrations
const SCHEMA_VERSION: i32 = 1;

/// Database manager for run state
pub struct SymphonyDb {
    conn: Arc<Mutex<Connection>>,
}

impl SymphonyDb {
    /// Open or create the database at `.symphony/symphony.db`
    pub fn open() -> Result<Self> {
        Self::open_at(".symphony/symphony.db")
    }

    /// Open database at a specific path
    pub fn open_at<P: AsRef<Path>>(path: P) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).ok();
        }

        let conn = Connection::open(path.as_ref()).context("Failed to open symphony database")?;
        Self::from_connection(conn)
    }

    /// In-memory database (useful for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// Get a shared connection for use by managers
    pub fn connection(&self) -> Arc<Mutex<Connection>> {
        Arc::clone(&self.conn)
    }

    /// Run schema migrations
    fn run_migrations(&self) -> Result<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER PRIMARY KEY)",
            [],
        )?;

        let current_version: i32 = conn
            .query_row(
                "SELECT COALESCE(MAX(version), 0) FROM schema_version",
                [],
                |row| row.get(0),
            )
            .unwrap_or(0);

        if current_version < SCHEMA_VERSION {
            Self::migrate_v1(&conn)?;
            conn.execute(
                "INSERT OR REPLACE INTO schema_version (version) VALUES (?1)",
                [SCHEMA_VERSION],
            )?;
        }

        Ok(())
    }

    /// Migration to version 1 - complete schema
    fn migrate_v1(conn: &Connection) -> Result<()> {
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS runs (
                id TEXT PRIMARY KEY,
                brief TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'running',
                project_name TEXT,
                report TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
            [],
        )?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS phase_results (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                run_id TEXT NOT NULL,
                phase TEXT NOT NULL,
                seq INTEGER NOT NULL,
                status TEXT NOT NULL,
                model TEXT,
                latency_ms INTEGER,
                payload TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
            [],
        )?;

        Ok(())
    }
}

/// A row from the runs table
#[derive(Debug, Clone, serde::Serialize)]
pub struct RunRecord {
    pub id: String,
    pub brief: String,
    pub status: RunStatus,
    pub project_name: Option<String>,
    pub report: Option<RunReport>,
    pub created_at: String,
    pub updated_at: String,
}

/// Read/write operations for runs
pub struct RunManager<'a> {
    db: &'a SymphonyDb,
}

impl<'a> RunManager<'a> {
    pub fn new(db: &'a SymphonyDb) -> Self {
        Self { db }
    }

    /// Insert a new run in `running` state
    pub fn create(&self, run_id: &str, brief: &ProjectBrief) -> Result<()> {
        let conn = self.db.connection();
        let conn = conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        conn.execute(
            "INSERT INTO runs (id, brief, status, created_at, updated_at)
             VALUES (?1, ?2, 'running', ?3, ?4)",
            params![
                run_id,
                brief.description,
                brief.submitted_at.to_rfc3339(),
                Utc::now().to_rfc3339()
            ],
        )
        .context("Failed to create run")?;

        Ok(())
    }

    pub fn set_status(&self, run_id: &str, status: RunStatus) -> Result<()> {
        let conn = self.db.connection();
        let conn = conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        conn.execute(
            "UPDATE runs SET status = ?2, updated_at = ?3 WHERE id = ?1",
            params![run_id, status_str(status), Utc::now().to_rfc3339()],
        )
        .context("Failed to update run status")?;

        Ok(())
    }

    /// Store the final report and terminal status
    pub fn finish(&self, run_id: &str, report: &RunReport) -> Result<()> {
        let conn = self.db.connection();
        let conn = conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        let report_json = serde_json::to_string(report)?;
        conn.execute(
            "UPDATE runs SET status = ?2, project_name = ?3, report = ?4, updated_at = ?5
             WHERE id = ?1",
            params![
                run_id,
                status_str(report.status),
                report.project_name,
                report_json,
                Utc::now().to_rfc3339()
            ],
        )
        .context("Failed to store run report")?;

        Ok(())
    }

    pub fn add_phase_result(&self, run_id: &str, seq: usize, result: &PhaseResult) -> Result<()> {
        let conn = self.db.connection();
        let conn = conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        let payload = serde_json::to_string(&result.data)?;
        let status = match result.status {
            crate::project::TaskStatus::Completed => "completed",
            crate::project::TaskStatus::Failed => "failed",
        };
        conn.execute(
            "INSERT INTO phase_results (run_id, phase, seq, status, model, latency_ms, payload, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                run_id,
                result.phase,
                seq as i64,
                status,
                result.model_used,
                result.latency_ms.map(|l| l as i64),
                payload,
                result.completed_at.to_rfc3339()
            ],
        )
        .context("Failed to store phase result")?;

        Ok(())
    }

    pub fn load(&self, run_id: &str) -> Result<RunRecord> {
        let conn = self.db.connection();
        let conn = conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        conn.query_row(
            "SELECT id, brief, status, project_name, report, created_at, updated_at
             FROM runs WHERE id = ?1",
            params![run_id],
            row_to_record,
        )
        .with_context(|| format!("Run not found: {run_id}"))
    }

    /// Most recent runs first
    pub fn list(&self, limit: usize) -> Result<Vec<RunRecord>> {
        let conn = self.db.connection();
        let conn = conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        let mut stmt = conn.prepare(
            "SELECT id, brief, status, project_name, report, created_at, updated_at
             FROM runs ORDER BY created_at DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], row_to_record)?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    /// Phase payloads for a run, in sequence order
    pub fn phase_results(&self, run_id: &str) -> Result<Vec<(String, serde_json::Value)>> {
        let conn = self.db.connection();
        let conn = conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        let mut stmt = conn.prepare(
            "SELECT phase, payload FROM phase_results WHERE run_id = ?1 ORDER BY seq ASC",
        )?;
        let rows = stmt.query_map(params![run_id], |row| {
            let phase: String = row.get(0)?;
            let payload: String = row.get(1)?;
            Ok((phase, payload))
        })?;

        let mut results = Vec::new();
        for row in rows {
            let (phase, payload) = row?;
            results.push((phase, serde_json::from_str(&payload)?));
        }
        Ok(results)
    }
}

fn status_str(status: RunStatus) -> &'static str {
    match status {
        RunStatus::Running => "running",
        RunStatus::Success => "success",
        RunStatus::Failed => "failed",
    }
}

fn parse_status(status: &str) -> RunStatus {
    match status {
        "success" => RunStatus::Success,
        "failed" => RunStatus::Failed,
        _ => RunStatus::Running,
    }
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<RunRecord> {
    let status: String = row.get(2)?;
    let report: Option<String> = row.get(4)?;
    Ok(RunRecord {
        id: row.get(0)?,
        brief: row.get(1)?,
        status: parse_status(&status),
        project_name: row.get(3)?,
        report: report.and_then(|r| serde_json::from_str(&r).ok()),
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

/// Run ids sort chronologically and stay unique under concurrent starts.
pub fn generate_run_id() -> String {
    use std::collections::hash_map::RandomState;
    use std::hash::{BuildHasher, Hasher};
    let suffix = RandomState::new().build_hasher().finish() as u32;
    format!("{}_{:08x}", Utc::now().format("%Y%m%d_%H%M%S"), suffix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::TaskStatus;

    fn sample_report(run_id: &str, status: RunStatus) -> RunReport {
        RunReport {
            run_id: run_id.to_string(),
            project_name: "Sample".to_string(),
            status,
            brief: "build a sample".to_string(),
            phases: vec![],
            final_project: None,
            iterations: 1,
            restarts: 0,
            finished_at: Utc::now(),
        }
    }

    #[test]
    fn test_create_and_load_run() {
        let db = SymphonyDb::open_in_memory().unwrap();
        let mgr = RunManager::new(&db);

        mgr.create("run-1", &ProjectBrief::new("build a sample")).unwrap();
        let record = mgr.load("run-1").unwrap();
        assert_eq!(record.status, RunStatus::Running);
        assert_eq!(record.brief, "build a sample");
        assert!(record.report.is_none());
    }

    #[test]
    fn test_finish_stores_report() {
        let db = SymphonyDb::open_in_memory().unwrap();
        let mgr = RunManager::new(&db);

        mgr.create("run-1", &ProjectBrief::new("brief")).unwrap();
        mgr.finish("run-1", &sample_report("run-1", RunStatus::Success))
            .unwrap();

        let record = mgr.load("run-1").unwrap();
        assert_eq!(record.status, RunStatus::Success);
        assert_eq!(record.project_name.as_deref(), Some("Sample"));
        assert_eq!(record.report.unwrap().iterations, 1);
    }

    #[test]
    fn test_phase_results_ordered_by_seq() {
        let db = SymphonyDb::open_in_memory().unwrap();
        let mgr = RunManager::new(&db);
        mgr.create("run-1", &ProjectBrief::new("brief")).unwrap();

        let first = PhaseResult::new(
            "analysis",
            TaskStatus::Completed,
            serde_json::json!({"n": 1}),
        );
        let second = PhaseResult::new(
            "specialists",
            TaskStatus::Completed,
            serde_json::json!({"n": 2}),
        );
        mgr.add_phase_result("run-1", 0, &first).unwrap();
        mgr.add_phase_result("run-1", 1, &second).unwrap();

        let results = mgr.phase_results("run-1").unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0, "analysis");
        assert_eq!(results[1].1["n"], 2);
    }

    #[test]
    fn test_list_returns_recent_runs() {
        let db = SymphonyDb::open_in_memory().unwrap();
        let mgr = RunManager::new(&db);
        mgr.create("run-a", &ProjectBrief::new("first")).unwrap();
        mgr.create("run-b", &ProjectBrief::new("second")).unwrap();

        let runs = mgr.list(10).unwrap();
        assert_eq!(runs.len(), 2);
    }

    #[test]
    fn test_load_missing_run_errors() {
        let db = SymphonyDb::open_in_memory().unwrap();
        let mgr = RunManager::new(&db);
        assert!(mgr.load("nope").is_err());
    }

    #[test]
    fn test_generate_run_id_shape() {
        let id = generate_run_id();
        // date_time_suffix: 15 chars of timestamp + underscore + 8 hex.
        assert_eq!(id.len(), 15 + 1 + 8);
        assert_ne!(generate_run_id(), id);
    }
}
