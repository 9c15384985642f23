use crate::{EndReason, RoundSnapshot, RunId, RunRecord};
use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Transaction};
use std::collections::BTreeMap;
use std::path::Path;
use tft_state::RoundLabel;
use tracing::{info, warn};

const CURRENT_SCHEMA_VERSION: i32 = 1;

/// Append-only store for runs and their round snapshots.
///
/// Takes `&mut self` so a store has exactly one writer.
pub trait RunStore: Send {
    fn start_run(&mut self, started_at: DateTime<Utc>) -> Result<RunId>;

    fn append_round(&mut self, run_id: RunId, snapshot: &RoundSnapshot) -> Result<()>;

    /// Sets end time and reason once; returns the run's snapshot count
    fn close_run(&mut self, run_id: RunId, reason: EndReason, ended_at: DateTime<Utc>) -> Result<u32>;
}

pub struct SqliteRecorder {
    conn: Connection,
}

impl SqliteRecorder {
    /// Open (or create) the run store and close runs left open by an earlier process
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create run store directory {}", parent.display())
            })?;
        }

        let mut conn = Connection::open(path)
            .with_context(|| format!("failed to open run store {}", path.display()))?;
        if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
            warn!("Failed to enable WAL mode: {err}");
        }
        conn.pragma_update(None, "foreign_keys", "ON")
            .context("failed to enable foreign keys")?;
        run_migrations(&mut conn).context("failed to run run store migrations")?;

        let mut recorder = Self { conn };
        let stale = recorder.close_stale_runs(Utc::now())?;
        if stale > 0 {
            warn!("Closed {} run(s) left open by a previous session", stale);
        }
        info!("Run store opened at {}", path.display());
        Ok(recorder)
    }

    /// Reader for history queries alongside the writer; never migrates or closes runs
    pub fn open_read_only(path: &Path) -> Result<Self> {
        // Read-write flags without CREATE so WAL shared memory can be set up;
        // query_only blocks writes.
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .with_context(|| format!("failed to open run store {} read-only", path.display()))?;
        conn.pragma_update(None, "query_only", true)
            .context("failed to set query_only")?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory().context("failed to open in-memory run store")?;
        conn.pragma_update(None, "foreign_keys", "ON")
            .context("failed to enable foreign keys")?;
        run_migrations(&mut conn)?;
        Ok(Self { conn })
    }

    /// Mark every open run as abandoned
    pub fn close_stale_runs(&mut self, ended_at: DateTime<Utc>) -> Result<usize> {
        let closed = self
            .conn
            .execute(
                "UPDATE runs
                 SET ended_at = ?1,
                     end_reason = 'abandoned',
                     rounds_completed = (SELECT COUNT(*) FROM run_rounds WHERE run_id = runs.id)
                 WHERE end_reason IS NULL",
                params![ended_at.to_rfc3339()],
            )
            .context("failed to close stale runs")?;
        Ok(closed)
    }

    /// Most recent runs first
    pub fn runs(&self, limit: usize) -> Result<Vec<RunRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, started_at, ended_at, rounds_completed, end_reason
             FROM runs ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, Option<String>>(4)?,
            ))
        })?;

        let mut runs = Vec::new();
        for row in rows {
            let (id, started_at, ended_at, rounds_completed, end_reason) = row?;
            runs.push(RunRecord {
                id,
                started_at: parse_datetime(&started_at)?,
                ended_at: ended_at.as_deref().map(parse_datetime).transpose()?,
                rounds_completed: to_u32(rounds_completed)?,
                end_reason: end_reason.as_deref().map(str::parse).transpose()?,
            });
        }
        Ok(runs)
    }

    /// Snapshots of one run in round order
    pub fn rounds(&self, run_id: RunId) -> Result<Vec<RoundSnapshot>> {
        let mut stmt = self.conn.prepare(
            "SELECT round_label, gold, level, lives, component_count, shop, items_built, life_lost
             FROM run_rounds WHERE run_id = ?1 ORDER BY round_number",
        )?;
        let rows = stmt.query_map(params![run_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, Option<u32>>(1)?,
                row.get::<_, Option<u32>>(2)?,
                row.get::<_, Option<u32>>(3)?,
                row.get::<_, u32>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, u32>(6)?,
                row.get::<_, bool>(7)?,
            ))
        })?;

        let mut snapshots = Vec::new();
        for row in rows {
            let (label, gold, level, lives, component_count, shop, items_built, life_lost) = row?;
            snapshots.push(RoundSnapshot {
                round: RoundLabel::parse(&label)
                    .ok_or_else(|| anyhow!("invalid round label '{label}' in run {run_id}"))?,
                gold,
                level,
                lives,
                component_count,
                shop: serde_json::from_str(&shop)
                    .with_context(|| format!("invalid shop JSON in run {run_id}"))?,
                items_built,
                life_lost,
            });
        }
        Ok(snapshots)
    }

    /// Recent runs with their snapshots, keyed by run id
    pub fn history(&self, limit: usize) -> Result<(Vec<RunRecord>, BTreeMap<RunId, Vec<RoundSnapshot>>)> {
        let runs = self.runs(limit)?;
        let mut rounds = BTreeMap::new();
        for run in &runs {
            rounds.insert(run.id, self.rounds(run.id)?);
        }
        Ok((runs, rounds))
    }
}

impl RunStore for SqliteRecorder {
    fn start_run(&mut self, started_at: DateTime<Utc>) -> Result<RunId> {
        let tx = self.conn.transaction()?;
        let open: i64 = tx.query_row(
            "SELECT COUNT(*) FROM runs WHERE end_reason IS NULL",
            [],
            |row| row.get(0),
        )?;
        if open > 0 {
            bail!("cannot start a run while another run is active");
        }
        tx.execute(
            "INSERT INTO runs (started_at, rounds_completed) VALUES (?1, 0)",
            params![started_at.to_rfc3339()],
        )
        .context("failed to insert run")?;
        let id = tx.last_insert_rowid();
        tx.commit()?;
        Ok(id)
    }

    fn append_round(&mut self, run_id: RunId, snapshot: &RoundSnapshot) -> Result<()> {
        let round_number = snapshot.round.absolute();
        let shop = serde_json::to_string(&snapshot.shop)?;

        let tx = self.conn.transaction()?;
        ensure_open(&tx, run_id)?;
        let last: Option<u32> = tx.query_row(
            "SELECT MAX(round_number) FROM run_rounds WHERE run_id = ?1",
            params![run_id],
            |row| row.get(0),
        )?;
        if let Some(last) = last {
            if round_number <= last {
                bail!(
                    "round {} already covered in run {} (last recorded {})",
                    snapshot.round,
                    run_id,
                    last
                );
            }
        }
        tx.execute(
            "INSERT INTO run_rounds
             (run_id, round_number, round_label, gold, level, lives, component_count,
              shop, items_built, life_lost, recorded_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                run_id,
                round_number,
                snapshot.round.to_string(),
                snapshot.gold,
                snapshot.level,
                snapshot.lives,
                snapshot.component_count,
                shop,
                snapshot.items_built,
                snapshot.life_lost,
                Utc::now().to_rfc3339(),
            ],
        )
        .with_context(|| format!("failed to record round {} of run {}", snapshot.round, run_id))?;
        tx.commit()?;
        Ok(())
    }

    fn close_run(&mut self, run_id: RunId, reason: EndReason, ended_at: DateTime<Utc>) -> Result<u32> {
        let tx = self.conn.transaction()?;
        let updated = tx.execute(
            "UPDATE runs
             SET ended_at = ?1,
                 end_reason = ?2,
                 rounds_completed = (SELECT COUNT(*) FROM run_rounds WHERE run_id = ?3)
             WHERE id = ?3 AND end_reason IS NULL",
            params![ended_at.to_rfc3339(), reason.as_str(), run_id],
        )?;
        if updated == 0 {
            bail!("run {} is not open", run_id);
        }
        let rounds: i64 = tx.query_row(
            "SELECT rounds_completed FROM runs WHERE id = ?1",
            params![run_id],
            |row| row.get(0),
        )?;
        tx.commit()?;
        to_u32(rounds)
    }
}

fn ensure_open(tx: &Transaction<'_>, run_id: RunId) -> Result<()> {
    let reason: Option<Option<String>> = tx
        .query_row(
            "SELECT end_reason FROM runs WHERE id = ?1",
            params![run_id],
            |row| row.get(0),
        )
        .optional()?;
    match reason {
        None => bail!("run {} does not exist", run_id),
        Some(Some(reason)) => bail!("run {} is already closed ({})", run_id, reason),
        Some(None) => Ok(()),
    }
}

fn run_migrations(conn: &mut Connection) -> Result<()> {
    let mut version: i32 = conn
        .pragma_query_value(None, "user_version", |row| row.get(0))
        .context("failed to read user_version pragma")?;

    if version > CURRENT_SCHEMA_VERSION {
        bail!(
            "run store version ({}) is newer than supported schema ({})",
            version,
            CURRENT_SCHEMA_VERSION
        );
    }
    if version == CURRENT_SCHEMA_VERSION {
        return Ok(());
    }

    let tx = conn
        .transaction()
        .context("failed to open migration transaction")?;
    while version < CURRENT_SCHEMA_VERSION {
        let next_version = version + 1;
        apply_migration(&tx, next_version)
            .with_context(|| format!("migration to version {next_version} failed"))?;
        version = next_version;
    }
    tx.pragma_update(None, "user_version", CURRENT_SCHEMA_VERSION)
        .context("failed to update user_version pragma")?;
    tx.commit().context("failed to commit migrations")?;
    Ok(())
}

fn apply_migration(tx: &Transaction<'_>, version: i32) -> Result<()> {
    match version {
        1 => tx
            .execute_batch(include_str!("schemas/schema_v1.sql"))
            .context("failed to execute schema_v1.sql"),
        _ => bail!("no migration for version {}", version),
    }
}

fn parse_datetime(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|err| anyhow!("invalid datetime '{value}': {err}"))
}

fn to_u32(value: i64) -> Result<u32> {
    u32::try_from(value).map_err(|_| anyhow!("value {value} out of range"))
}
