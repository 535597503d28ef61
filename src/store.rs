//! SQLite persistence for verification requests, the audit trail and the
//! officer roster.
//!
//! Every write is a single statement, so each row lands whole or not at
//! all. The schema itself enforces the state-machine and audit invariants
//! so that a bug above this layer cannot persist an inconsistent row.

use crate::error::StoreError;
use crate::models::{
    AuditLog, AuditPage, Officer, RequestStatus, Role, ScoredResult, VerificationRequest, Verdict,
};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS officers (
    id TEXT PRIMARY KEY,
    email TEXT NOT NULL,
    full_name TEXT NOT NULL,
    department TEXT,
    role TEXT NOT NULL CHECK (role IN ('OFFICER', 'ADMIN')),
    is_active INTEGER NOT NULL DEFAULT 1
);

CREATE TABLE IF NOT EXISTS verification_requests (
    id TEXT PRIMARY KEY,
    created_at TEXT NOT NULL,
    status TEXT NOT NULL CHECK (status IN ('PROCESSING', 'COMPLETED', 'FAILED')),
    document_type TEXT,
    fraud_flag INTEGER NOT NULL DEFAULT 0,
    recommendation TEXT CHECK (recommendation IN ('APPROVE', 'REVIEW', 'REJECT')),
    diagnostic TEXT,
    result_json TEXT,
    CHECK ((status = 'COMPLETED') = (recommendation IS NOT NULL))
);

CREATE TABLE IF NOT EXISTS audit_logs (
    id TEXT PRIMARY KEY,
    request_id TEXT REFERENCES verification_requests(id) ON DELETE SET NULL,
    officer_id TEXT REFERENCES officers(id) ON DELETE SET NULL,
    officer_decision TEXT NOT NULL CHECK (officer_decision IN ('APPROVE', 'REVIEW', 'REJECT')),
    was_overridden INTEGER NOT NULL,
    override_reason TEXT,
    latency_ms INTEGER NOT NULL CHECK (latency_ms >= 0),
    created_at TEXT NOT NULL,
    CHECK ((was_overridden = 1) = (override_reason IS NOT NULL AND length(trim(override_reason)) > 0))
);

CREATE INDEX IF NOT EXISTS idx_requests_created_at ON verification_requests(created_at);
CREATE INDEX IF NOT EXISTS idx_audit_created_at ON audit_logs(created_at);
CREATE INDEX IF NOT EXISTS idx_audit_request ON audit_logs(request_id);
";

pub fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("bad timestamp {raw:?}: {e}")))
}

fn parse_enum<T: FromStr<Err = String>>(raw: &str) -> Result<T, StoreError> {
    raw.parse().map_err(StoreError::Corrupt)
}

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: &str) -> Result<Self, StoreError> {
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Runs `op` against the store on tokio's blocking pool, keeping
    /// SQLite I/O and the connection lock off the async workers.
    pub async fn run<T, F>(self: &Arc<Self>, op: F) -> Result<T, StoreError>
    where
        F: FnOnce(&SqliteStore) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let store = Arc::clone(self);
        tokio::task::spawn_blocking(move || op(&store))
            .await
            .map_err(|e| StoreError::Worker(e.to_string()))?
    }

    // --- verification requests -------------------------------------------

    pub fn insert_processing(&self, id: &str, created_at: DateTime<Utc>) -> Result<(), StoreError> {
        self.conn()?.execute(
            "INSERT INTO verification_requests (id, created_at, status) VALUES (?1, ?2, 'PROCESSING')",
            params![id, timestamp(created_at)],
        )?;
        Ok(())
    }

    /// Moves a PROCESSING request to COMPLETED in one statement. Returns
    /// false if the request was not PROCESSING.
    pub fn complete(
        &self,
        id: &str,
        recommendation: Verdict,
        fraud_flag: bool,
        result: &ScoredResult,
    ) -> Result<bool, StoreError> {
        let result_json = serde_json::to_string(result)
            .map_err(|e| StoreError::Corrupt(format!("cannot encode result: {e}")))?;
        let changed = self.conn()?.execute(
            "UPDATE verification_requests
             SET status = 'COMPLETED', document_type = ?2, fraud_flag = ?3,
                 recommendation = ?4, result_json = ?5, diagnostic = NULL
             WHERE id = ?1 AND status = 'PROCESSING'",
            params![
                id,
                result.extraction.document_type,
                fraud_flag,
                recommendation.as_str(),
                result_json
            ],
        )?;
        Ok(changed == 1)
    }

    /// Moves a PROCESSING request to FAILED. Returns false if the request
    /// was not PROCESSING.
    pub fn fail(&self, id: &str, diagnostic: &str) -> Result<bool, StoreError> {
        let changed = self.conn()?.execute(
            "UPDATE verification_requests SET status = 'FAILED', diagnostic = ?2
             WHERE id = ?1 AND status = 'PROCESSING'",
            params![id, diagnostic],
        )?;
        Ok(changed == 1)
    }

    pub fn get_request(&self, id: &str) -> Result<Option<VerificationRequest>, StoreError> {
        let conn = self.conn()?;
        let raw = conn
            .query_row(
                "SELECT id, created_at, status, document_type, fraud_flag, recommendation,
                        diagnostic, result_json
                 FROM verification_requests WHERE id = ?1",
                params![id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, bool>(4)?,
                        row.get::<_, Option<String>>(5)?,
                        row.get::<_, Option<String>>(6)?,
                        row.get::<_, Option<String>>(7)?,
                    ))
                },
            )
            .optional()?;

        let Some((id, created_at, status, document_type, fraud_flag, recommendation, diagnostic, result_json)) =
            raw
        else {
            return Ok(None);
        };

        let result = result_json
            .map(|json| {
                serde_json::from_str::<ScoredResult>(&json)
                    .map_err(|e| StoreError::Corrupt(format!("bad result payload for {id}: {e}")))
            })
            .transpose()?;

        Ok(Some(VerificationRequest {
            created_at: parse_timestamp(&created_at)?,
            status: parse_enum::<RequestStatus>(&status)?,
            recommendation: recommendation.as_deref().map(parse_enum::<Verdict>).transpose()?,
            id,
            document_type,
            fraud_flag,
            diagnostic,
            result,
        }))
    }

    /// Deletes terminal requests created before `cutoff`. Audit rows that
    /// referenced them survive with a null `request_id`.
    pub fn purge_requests_before(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError> {
        let removed = self.conn()?.execute(
            "DELETE FROM verification_requests WHERE created_at < ?1 AND status != 'PROCESSING'",
            params![timestamp(cutoff)],
        )?;
        Ok(removed)
    }

    // --- audit trail -----------------------------------------------------

    pub fn insert_audit(&self, log: &AuditLog) -> Result<(), StoreError> {
        self.conn()?.execute(
            "INSERT INTO audit_logs
             (id, request_id, officer_id, officer_decision, was_overridden, override_reason,
              latency_ms, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                log.id,
                log.request_id,
                log.officer_id,
                log.officer_decision.as_str(),
                log.was_overridden,
                log.override_reason,
                i64::try_from(log.latency_ms).unwrap_or(i64::MAX),
                timestamp(log.created_at)
            ],
        )?;
        Ok(())
    }

    /// One page of the audit trail, newest first. `page` is 1-based.
    pub fn list_audit(&self, page: u32, page_size: u32) -> Result<AuditPage, StoreError> {
        let conn = self.conn()?;
        let total: i64 = conn.query_row("SELECT COUNT(*) FROM audit_logs", [], |row| row.get(0))?;
        let offset = i64::from(page.saturating_sub(1)) * i64::from(page_size);

        let mut stmt = conn.prepare(
            "SELECT a.id, a.request_id, a.officer_id, a.officer_decision, a.was_overridden,
                    a.override_reason, a.latency_ms, a.created_at, r.document_type
             FROM audit_logs a
             LEFT JOIN verification_requests r ON r.id = a.request_id
             ORDER BY a.created_at DESC, a.rowid DESC
             LIMIT ?1 OFFSET ?2",
        )?;
        let rows = stmt.query_map(params![i64::from(page_size), offset], raw_audit)?;

        let mut logs = Vec::new();
        for row in rows {
            logs.push(row?.into_log()?);
        }

        Ok(AuditPage {
            logs,
            total: total.max(0) as u64,
            page,
            page_size,
        })
    }

    // --- officers --------------------------------------------------------

    pub fn upsert_officer(&self, officer: &Officer) -> Result<(), StoreError> {
        self.conn()?.execute(
            "INSERT INTO officers (id, email, full_name, department, role, is_active)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(id) DO UPDATE SET
                email = excluded.email, full_name = excluded.full_name,
                department = excluded.department, role = excluded.role,
                is_active = excluded.is_active",
            params![
                officer.id,
                officer.email,
                officer.full_name,
                officer.department,
                officer.role.as_str(),
                officer.is_active
            ],
        )?;
        Ok(())
    }

    /// Narrow lookup used while authenticating. It reads the profile row
    /// directly and never consults role checks.
    pub fn officer_profile(&self, id: &str) -> Result<Option<Officer>, StoreError> {
        let conn = self.conn()?;
        let raw = conn
            .query_row(
                "SELECT id, email, full_name, department, role, is_active FROM officers WHERE id = ?1",
                params![id],
                raw_officer,
            )
            .optional()?;
        raw.map(RawOfficer::into_officer).transpose()
    }

    pub fn list_officers(&self) -> Result<Vec<Officer>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, email, full_name, department, role, is_active FROM officers ORDER BY id",
        )?;
        let rows = stmt.query_map([], raw_officer)?;
        let mut officers = Vec::new();
        for row in rows {
            officers.push(row?.into_officer()?);
        }
        Ok(officers)
    }

    /// Deletes a profile. Audit rows keep their history with a null
    /// `officer_id`.
    pub fn remove_officer(&self, id: &str) -> Result<bool, StoreError> {
        let removed = self
            .conn()?
            .execute("DELETE FROM officers WHERE id = ?1", params![id])?;
        Ok(removed == 1)
    }

    pub fn statistics(&self) -> Result<crate::statistics::VerificationStats, StoreError> {
        let conn = self.conn()?;
        crate::statistics::collect(&conn)
    }
}

struct RawAudit {
    id: String,
    request_id: Option<String>,
    officer_id: Option<String>,
    officer_decision: String,
    was_overridden: bool,
    override_reason: Option<String>,
    latency_ms: i64,
    created_at: String,
    document_type: Option<String>,
}

fn raw_audit(row: &Row<'_>) -> rusqlite::Result<RawAudit> {
    Ok(RawAudit {
        id: row.get(0)?,
        request_id: row.get(1)?,
        officer_id: row.get(2)?,
        officer_decision: row.get(3)?,
        was_overridden: row.get(4)?,
        override_reason: row.get(5)?,
        latency_ms: row.get(6)?,
        created_at: row.get(7)?,
        document_type: row.get(8)?,
    })
}

impl RawAudit {
    fn into_log(self) -> Result<AuditLog, StoreError> {
        Ok(AuditLog {
            officer_decision: parse_enum(&self.officer_decision)?,
            latency_ms: self.latency_ms.max(0) as u64,
            created_at: parse_timestamp(&self.created_at)?,
            id: self.id,
            request_id: self.request_id,
            officer_id: self.officer_id,
            was_overridden: self.was_overridden,
            override_reason: self.override_reason,
            document_type: self.document_type,
        })
    }
}

struct RawOfficer {
    id: String,
    email: String,
    full_name: String,
    department: Option<String>,
    role: String,
    is_active: bool,
}

fn raw_officer(row: &Row<'_>) -> rusqlite::Result<RawOfficer> {
    Ok(RawOfficer {
        id: row.get(0)?,
        email: row.get(1)?,
        full_name: row.get(2)?,
        department: row.get(3)?,
        role: row.get(4)?,
        is_active: row.get(5)?,
    })
}

impl RawOfficer {
    fn into_officer(self) -> Result<Officer, StoreError> {
        Ok(Officer {
            role: parse_enum::<Role>(&self.role)?,
            id: self.id,
            email: self.email,
            full_name: self.full_name,
            department: self.department,
            is_active: self.is_active,
        })
    }
}
