//! SQLite-backed persistent store for orders, phase executions, the cost
//! ledger, and per-phase citation result sets.
//!
//! The status compare-and-swap is a single conditional UPDATE
//! (`... WHERE id = ? AND status_version = ?`), not a read-then-write round
//! trip, so the race window between racing writers is closed entirely. A
//! zero-row update on an existing order is a `ConcurrencyConflict` and the
//! caller refetches; it is never a silent overwrite.
//!
//! Cost-ledger writes are append-only and unconditioned; aggregates over
//! them are eventually consistent under concurrency.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::citations::{CaseLawCitation, StatutoryCitation};
use crate::cost::{CostEntry, CostSource, CostTotals};
use crate::errors::EngineError;
use crate::order::{Order, OrderStatus};
use crate::phase::PhaseCode;
use crate::tier::{ExecutionTier, PricingTier};

/// Status of one phase execution attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    InProgress,
    Completed,
    Blocked,
    Failed,
    RequiresReview,
}

impl ExecutionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ExecutionStatus::Pending => "pending",
            ExecutionStatus::InProgress => "in_progress",
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::Blocked => "blocked",
            ExecutionStatus::Failed => "failed",
            ExecutionStatus::RequiresReview => "requires_review",
        }
    }

    pub fn parse(s: &str) -> Option<ExecutionStatus> {
        use ExecutionStatus::*;
        [Pending, InProgress, Completed, Blocked, Failed, RequiresReview]
            .into_iter()
            .find(|status| status.as_str() == s)
    }
}

/// One row per phase attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseExecution {
    pub id: i64,
    pub order_id: Uuid,
    pub phase: PhaseCode,
    pub attempt: u32,
    pub status: ExecutionStatus,
    pub quality_score: Option<f64>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

/// Citation results captured for one phase of one order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CitationResults {
    pub statutory: Vec<StatutoryCitation>,
    pub caselaw: Vec<CaseLawCitation>,
}

pub struct EngineStore {
    conn: Arc<Mutex<Connection>>,
}

impl EngineStore {
    pub fn open(path: &Path) -> Result<Self, EngineError> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// In-memory store for tests and dry runs.
    pub fn open_in_memory() -> Result<Self, EngineError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, EngineError> {
        init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    // ----- orders -----

    pub fn insert_order(&self, order: &Order) -> Result<(), EngineError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO orders (
                id, order_number, status, status_version, motion_type,
                paid_tier, execution_tier, current_phase, amount_paid_cents,
                cost_cap_triggered, hold_reason, hold_escalated,
                hold_expires_at, revision_count, legal_hold, recipient_email,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)",
            params![
                order.id.to_string(),
                order.order_number,
                order.status.as_str(),
                order.status_version,
                order.motion_type,
                order.paid_tier.as_str(),
                order.execution_tier.as_str(),
                order.current_phase.map(|p| p.code()),
                order.amount_paid_cents,
                order.cost_cap_triggered,
                order.hold_reason,
                order.hold_escalated,
                order.hold_expires_at.map(|t| t.to_rfc3339()),
                order.revision_count,
                order.legal_hold,
                order.recipient_email,
                order.created_at.to_rfc3339(),
                order.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn get_order(&self, order_id: Uuid) -> Result<Order, EngineError> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT id, order_number, status, status_version, motion_type,
                    paid_tier, execution_tier, current_phase, amount_paid_cents,
                    cost_cap_triggered, hold_reason, hold_escalated,
                    hold_expires_at, revision_count, legal_hold, recipient_email,
                    created_at, updated_at
             FROM orders WHERE id = ?1",
            params![order_id.to_string()],
            row_to_order,
        )
        .optional()?
        .ok_or(EngineError::OrderNotFound {
            order_id: order_id.to_string(),
        })
    }

    /// Commit a mutated order snapshot with optimistic concurrency.
    ///
    /// The snapshot's `status_version` is the version the caller observed
    /// at read time. The update applies atomically only if that version is
    /// still current; on success the snapshot's version is bumped to match
    /// the row. A lost race yields `ConcurrencyConflict` and the caller
    /// refetches and retries.
    pub fn commit_order(&self, order: &mut Order) -> Result<(), EngineError> {
        let expected = order.status_version;
        order.updated_at = Utc::now();
        let changed = {
            let conn = self.conn.lock().unwrap();
            conn.execute(
                "UPDATE orders SET
                    status = ?1, current_phase = ?2, amount_paid_cents = ?3,
                    cost_cap_triggered = ?4, hold_reason = ?5,
                    hold_escalated = ?6, hold_expires_at = ?7,
                    revision_count = ?8, legal_hold = ?9, updated_at = ?10,
                    status_version = status_version + 1
                 WHERE id = ?11 AND status_version = ?12",
                params![
                    order.status.as_str(),
                    order.current_phase.map(|p| p.code()),
                    order.amount_paid_cents,
                    order.cost_cap_triggered,
                    order.hold_reason,
                    order.hold_escalated,
                    order.hold_expires_at.map(|t| t.to_rfc3339()),
                    order.revision_count,
                    order.legal_hold,
                    order.updated_at.to_rfc3339(),
                    order.id.to_string(),
                    expected,
                ],
            )?
        };

        match changed {
            1 => {
                order.status_version = expected + 1;
                Ok(())
            }
            0 => {
                // Distinguish a lost race from a missing row.
                let exists = {
                    let conn = self.conn.lock().unwrap();
                    conn.query_row(
                        "SELECT 1 FROM orders WHERE id = ?1",
                        params![order.id.to_string()],
                        |_| Ok(()),
                    )
                    .optional()?
                    .is_some()
                };
                if exists {
                    Err(EngineError::ConcurrencyConflict {
                        order_id: order.id.to_string(),
                        expected,
                    })
                } else {
                    Err(EngineError::OrderNotFound {
                        order_id: order.id.to_string(),
                    })
                }
            }
            n => unreachable!("CAS update touched {n} rows for a primary-key match"),
        }
    }

    /// Orders currently parked on hold, for the scheduled sweep.
    pub fn orders_on_hold(&self) -> Result<Vec<Order>, EngineError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, order_number, status, status_version, motion_type,
                    paid_tier, execution_tier, current_phase, amount_paid_cents,
                    cost_cap_triggered, hold_reason, hold_escalated,
                    hold_expires_at, revision_count, legal_hold, recipient_email,
                    created_at, updated_at
             FROM orders WHERE status = ?1",
        )?;
        let orders = stmt
            .query_map(params![OrderStatus::HoldPending.as_str()], row_to_order)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(orders)
    }

    /// All orders, for the free-text search surface.
    pub fn all_orders(&self) -> Result<Vec<Order>, EngineError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, order_number, status, status_version, motion_type,
                    paid_tier, execution_tier, current_phase, amount_paid_cents,
                    cost_cap_triggered, hold_reason, hold_escalated,
                    hold_expires_at, revision_count, legal_hold, recipient_email,
                    created_at, updated_at
             FROM orders ORDER BY created_at",
        )?;
        let orders = stmt
            .query_map([], row_to_order)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(orders)
    }

    // ----- phase executions -----

    pub fn insert_phase_execution(
        &self,
        order_id: Uuid,
        phase: PhaseCode,
        attempt: u32,
    ) -> Result<i64, EngineError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO phase_executions (
                order_id, phase, attempt, status, quality_score,
                started_at, finished_at, error_message
            ) VALUES (?1, ?2, ?3, ?4, NULL, ?5, NULL, NULL)",
            params![
                order_id.to_string(),
                phase.code(),
                attempt,
                ExecutionStatus::InProgress.as_str(),
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn finish_phase_execution(
        &self,
        execution_id: i64,
        status: ExecutionStatus,
        quality_score: Option<f64>,
        error_message: Option<&str>,
    ) -> Result<(), EngineError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE phase_executions
             SET status = ?1, quality_score = ?2, finished_at = ?3, error_message = ?4
             WHERE id = ?5",
            params![
                status.as_str(),
                quality_score,
                Utc::now().to_rfc3339(),
                error_message,
                execution_id,
            ],
        )?;
        Ok(())
    }

    pub fn phase_executions(&self, order_id: Uuid) -> Result<Vec<PhaseExecution>, EngineError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, order_id, phase, attempt, status, quality_score,
                    started_at, finished_at, error_message
             FROM phase_executions WHERE order_id = ?1 ORDER BY id",
        )?;
        let rows = stmt
            .query_map(params![order_id.to_string()], row_to_execution)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Whether the phase already has a completed attempt (idempotent
    /// re-delivery of a scheduler step short-circuits on this).
    pub fn has_completed_execution(
        &self,
        order_id: Uuid,
        phase: PhaseCode,
    ) -> Result<bool, EngineError> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM phase_executions
             WHERE order_id = ?1 AND phase = ?2 AND status = ?3",
            params![
                order_id.to_string(),
                phase.code(),
                ExecutionStatus::Completed.as_str()
            ],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    pub fn attempt_count(&self, order_id: Uuid, phase: PhaseCode) -> Result<u32, EngineError> {
        let conn = self.conn.lock().unwrap();
        let count: u32 = conn.query_row(
            "SELECT COUNT(*) FROM phase_executions WHERE order_id = ?1 AND phase = ?2",
            params![order_id.to_string(), phase.code()],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    // ----- cost ledger -----

    /// Append one ledger row. Never updates, never deletes.
    pub fn append_cost_entry(&self, entry: &CostEntry) -> Result<(), EngineError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO cost_entries (
                order_id, phase, model, tier, revision_cycle, input_tokens,
                output_tokens, cost_cents, source, attempt, metadata, recorded_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                entry.order_id.to_string(),
                entry.phase.code(),
                entry.model,
                entry.tier,
                entry.revision_cycle,
                entry.input_tokens as i64,
                entry.output_tokens as i64,
                entry.cost_cents,
                entry.source.as_str(),
                entry.attempt,
                entry.metadata.to_string(),
                entry.recorded_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Lifetime cost split for an order.
    pub fn order_cost_totals(&self, order_id: Uuid) -> Result<CostTotals, EngineError> {
        let conn = self.conn.lock().unwrap();
        let totals = conn.query_row(
            "SELECT
                COALESCE(SUM(CASE WHEN source = 'primary' THEN cost_cents ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN source = 'retry' THEN cost_cents ELSE 0 END), 0)
             FROM cost_entries WHERE order_id = ?1",
            params![order_id.to_string()],
            |row| {
                Ok(CostTotals {
                    primary_cents: row.get(0)?,
                    retry_cents: row.get(1)?,
                })
            },
        )?;
        Ok(totals)
    }

    /// Cost split for one revision cycle of an order.
    pub fn cycle_cost_totals(
        &self,
        order_id: Uuid,
        revision_cycle: u32,
    ) -> Result<CostTotals, EngineError> {
        let conn = self.conn.lock().unwrap();
        let totals = conn.query_row(
            "SELECT
                COALESCE(SUM(CASE WHEN source = 'primary' THEN cost_cents ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN source = 'retry' THEN cost_cents ELSE 0 END), 0)
             FROM cost_entries WHERE order_id = ?1 AND revision_cycle = ?2",
            params![order_id.to_string(), revision_cycle],
            |row| {
                Ok(CostTotals {
                    primary_cents: row.get(0)?,
                    retry_cents: row.get(1)?,
                })
            },
        )?;
        Ok(totals)
    }

    pub fn cost_entries(&self, order_id: Uuid) -> Result<Vec<CostEntry>, EngineError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT order_id, phase, model, tier, revision_cycle, input_tokens,
                    output_tokens, cost_cents, source, attempt, metadata, recorded_at
             FROM cost_entries WHERE order_id = ?1 ORDER BY id",
        )?;
        let rows = stmt
            .query_map(params![order_id.to_string()], row_to_cost_entry)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    // ----- citation results -----

    pub fn save_citation_results(
        &self,
        order_id: Uuid,
        phase: PhaseCode,
        results: &CitationResults,
    ) -> Result<(), EngineError> {
        let payload = serde_json::to_string(results)?;
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO citation_results (order_id, phase, payload, recorded_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(order_id, phase) DO UPDATE SET
                payload = excluded.payload, recorded_at = excluded.recorded_at",
            params![
                order_id.to_string(),
                phase.code(),
                payload,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn citation_results(
        &self,
        order_id: Uuid,
        phase: PhaseCode,
    ) -> Result<Option<CitationResults>, EngineError> {
        let payload: Option<String> = {
            let conn = self.conn.lock().unwrap();
            conn.query_row(
                "SELECT payload FROM citation_results WHERE order_id = ?1 AND phase = ?2",
                params![order_id.to_string(), phase.code()],
                |row| row.get(0),
            )
            .optional()?
        };
        match payload {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }
}

fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS orders (
            id TEXT PRIMARY KEY,
            order_number TEXT NOT NULL,
            status TEXT NOT NULL,
            status_version INTEGER NOT NULL,
            motion_type TEXT NOT NULL,
            paid_tier TEXT NOT NULL,
            execution_tier TEXT NOT NULL,
            current_phase TEXT,
            amount_paid_cents INTEGER NOT NULL,
            cost_cap_triggered INTEGER NOT NULL,
            hold_reason TEXT,
            hold_escalated INTEGER NOT NULL,
            hold_expires_at TEXT,
            revision_count INTEGER NOT NULL,
            legal_hold INTEGER NOT NULL,
            recipient_email TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_orders_status ON orders(status);

        CREATE TABLE IF NOT EXISTS phase_executions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            order_id TEXT NOT NULL,
            phase TEXT NOT NULL,
            attempt INTEGER NOT NULL,
            status TEXT NOT NULL,
            quality_score REAL,
            started_at TEXT NOT NULL,
            finished_at TEXT,
            error_message TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_phase_executions_order
            ON phase_executions(order_id, phase);

        CREATE TABLE IF NOT EXISTS cost_entries (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            order_id TEXT NOT NULL,
            phase TEXT NOT NULL,
            model TEXT NOT NULL,
            tier TEXT NOT NULL,
            revision_cycle INTEGER NOT NULL,
            input_tokens INTEGER NOT NULL,
            output_tokens INTEGER NOT NULL,
            cost_cents INTEGER NOT NULL,
            source TEXT NOT NULL,
            attempt INTEGER NOT NULL,
            metadata TEXT NOT NULL,
            recorded_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_cost_entries_order
            ON cost_entries(order_id, revision_cycle);

        CREATE TABLE IF NOT EXISTS citation_results (
            order_id TEXT NOT NULL,
            phase TEXT NOT NULL,
            payload TEXT NOT NULL,
            recorded_at TEXT NOT NULL,
            PRIMARY KEY (order_id, phase)
        );",
    )
}

/// Stored text that no longer maps onto a domain enum.
#[derive(Debug, thiserror::Error)]
#[error("invalid stored value: {0}")]
struct BadStoredValue(String);

fn bad_column<E>(err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(err))
}

fn parse_timestamp(raw: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(bad_column)
}

fn row_to_order(row: &rusqlite::Row<'_>) -> rusqlite::Result<Order> {
    let id: String = row.get(0)?;
    let status: String = row.get(2)?;
    let paid_tier: String = row.get(5)?;
    let execution_tier: String = row.get(6)?;
    let current_phase: Option<String> = row.get(7)?;
    let hold_expires_at: Option<String> = row.get(12)?;
    let created_at: String = row.get(16)?;
    let updated_at: String = row.get(17)?;

    Ok(Order {
        id: Uuid::parse_str(&id).map_err(bad_column)?,
        order_number: row.get(1)?,
        status: OrderStatus::parse(&status)
            .ok_or_else(|| bad_column(BadStoredValue(status.clone())))?,
        status_version: row.get(3)?,
        motion_type: row.get(4)?,
        paid_tier: PricingTier::parse(&paid_tier).map_err(bad_column)?,
        execution_tier: ExecutionTier::parse(&execution_tier).map_err(bad_column)?,
        current_phase: current_phase
            .map(|code| PhaseCode::parse(&code).map_err(bad_column))
            .transpose()?,
        amount_paid_cents: row.get(8)?,
        cost_cap_triggered: row.get(9)?,
        hold_reason: row.get(10)?,
        hold_escalated: row.get(11)?,
        hold_expires_at: hold_expires_at.map(parse_timestamp).transpose()?,
        revision_count: row.get(13)?,
        legal_hold: row.get(14)?,
        recipient_email: row.get(15)?,
        created_at: parse_timestamp(created_at)?,
        updated_at: parse_timestamp(updated_at)?,
    })
}

fn row_to_execution(row: &rusqlite::Row<'_>) -> rusqlite::Result<PhaseExecution> {
    let order_id: String = row.get(1)?;
    let phase: String = row.get(2)?;
    let status: String = row.get(4)?;
    let started_at: String = row.get(6)?;
    let finished_at: Option<String> = row.get(7)?;

    Ok(PhaseExecution {
        id: row.get(0)?,
        order_id: Uuid::parse_str(&order_id).map_err(bad_column)?,
        phase: PhaseCode::parse(&phase).map_err(bad_column)?,
        attempt: row.get(3)?,
        status: ExecutionStatus::parse(&status)
            .ok_or_else(|| bad_column(BadStoredValue(status.clone())))?,
        quality_score: row.get(5)?,
        started_at: parse_timestamp(started_at)?,
        finished_at: finished_at.map(parse_timestamp).transpose()?,
        error_message: row.get(8)?,
    })
}

fn row_to_cost_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<CostEntry> {
    let order_id: String = row.get(0)?;
    let phase: String = row.get(1)?;
    let source: String = row.get(8)?;
    let metadata: String = row.get(10)?;
    let recorded_at: String = row.get(11)?;

    Ok(CostEntry {
        order_id: Uuid::parse_str(&order_id).map_err(bad_column)?,
        phase: PhaseCode::parse(&phase).map_err(bad_column)?,
        model: row.get(2)?,
        tier: row.get(3)?,
        revision_cycle: row.get(4)?,
        input_tokens: row.get::<_, i64>(5)? as u64,
        output_tokens: row.get::<_, i64>(6)? as u64,
        cost_cents: row.get(7)?,
        source: CostSource::parse(&source)
            .ok_or_else(|| bad_column(BadStoredValue(source.clone())))?,
        attempt: row.get(9)?,
        metadata: serde_json::from_str(&metadata).map_err(bad_column)?,
        recorded_at: parse_timestamp(recorded_at)?,
    })
}
