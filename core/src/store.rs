//! SQLite audit store for finished assessments.
//!
//! RULE: Only store.rs talks to the database.
//! The engine never calls it; the runner persists each assessment the
//! orchestrator returns.

use crate::{
    error::{AmlError, AmlResult},
    event::AssessmentEvent,
    model::RiskAssessment,
};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection};

pub struct AuditStore {
    conn: Connection,
}

impl AuditStore {
    /// Open (or create) the audit database at `path`.
    pub fn open(path: &str) -> AmlResult<Self> {
        let conn = Connection::open(path)?;
        // WAL mode: better concurrent read performance.
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> AmlResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> AmlResult<()> {
        self.conn.execute_batch(include_str!("../../migrations/001_audit.sql"))?;
        Ok(())
    }

    // ── Assessments ────────────────────────────────────────────

    /// Persist an assessment and its audit trail atomically.
    /// Returns the row id.
    pub fn insert_assessment(&self, assessment: &RiskAssessment) -> AmlResult<i64> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO assessment
                (transaction_id, customer_id, risk_score, risk_level, recommendation,
                 flag_count, assessed_at, payload)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                assessment.transaction_id,
                assessment.customer_id,
                assessment.risk_score as i64,
                assessment.risk_level.as_str(),
                assessment.recommendation.as_str(),
                assessment.flags.len() as i64,
                timestamp(assessment.assessed_at),
                serde_json::to_string(assessment)?,
            ],
        )?;
        let id = tx.last_insert_rowid();

        for (seq, event) in assessment.audit_trail.iter().enumerate() {
            tx.execute(
                "INSERT INTO assessment_event (assessment_id, seq, stage, event_type, payload)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    id,
                    seq as i64,
                    event.stage().name(),
                    event.event_type(),
                    serde_json::to_string(event)?,
                ],
            )?;
        }
        tx.commit()?;
        Ok(id)
    }

    /// Assessments with `assessed_at` in `[start, end]`, oldest first.
    pub fn assessments_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> AmlResult<Vec<RiskAssessment>> {
        let mut stmt = self.conn.prepare(
            "SELECT payload FROM assessment
             WHERE assessed_at >= ?1 AND assessed_at <= ?2
             ORDER BY assessed_at ASC, id ASC",
        )?;
        let payloads = stmt
            .query_map(params![timestamp(start), timestamp(end)], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        payloads
            .iter()
            .map(|p| serde_json::from_str::<RiskAssessment>(p).map_err(AmlError::from))
            .collect()
    }

    pub fn assessment_count(&self) -> AmlResult<usize> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM assessment", [], |row| row.get(0))?;
        Ok(n as usize)
    }

    /// The stored audit trail of one assessment row, in order.
    pub fn audit_events(&self, assessment_id: i64) -> AmlResult<Vec<AssessmentEvent>> {
        let mut stmt = self.conn.prepare(
            "SELECT payload FROM assessment_event
             WHERE assessment_id = ?1 ORDER BY seq ASC",
        )?;
        let payloads = stmt
            .query_map(params![assessment_id], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        payloads
            .iter()
            .map(|p| serde_json::from_str::<AssessmentEvent>(p).map_err(AmlError::from))
            .collect()
    }
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}
