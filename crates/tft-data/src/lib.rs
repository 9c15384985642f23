use anyhow::{anyhow, Context, Result};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{info, warn};

/// Enemy unit on a scripted PvE board
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnemyUnit {
    pub character: String,
    /// 1-3
    pub star_level: u8,
    pub row: Option<u32>,
    pub col: Option<u32>,
    pub items: Vec<String>,
    pub mod_health: Option<f64>,
    pub mod_ad: Option<f64>,
    pub mod_ap: Option<f64>,
}

/// Static metadata for one round of the trials
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundInfo {
    pub stage: u32,
    pub round_in_stage: u32,
    /// minion, standard, augment or boss
    pub round_type: String,
    /// gold or prismatic on augment rounds
    pub augment_tier: Option<String>,
}

/// Augment record flagged for this mode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Augment {
    pub api_name: String,
    pub name: String,
    pub description: Option<String>,
    pub effects: serde_json::Value,
    pub associated_traits: Vec<String>,
}

/// Tables the reference queries read
pub const REFERENCE_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS augments (
        api_name TEXT PRIMARY KEY,
        name TEXT,
        description TEXT,
        effects TEXT,
        associated_traits TEXT,
        in_tockers INTEGER NOT NULL DEFAULT 0
    );

    CREATE TABLE IF NOT EXISTS tocker_rounds (
        round_number INTEGER PRIMARY KEY,
        stage INTEGER NOT NULL,
        round_in_stage INTEGER NOT NULL,
        round_type TEXT NOT NULL,
        augment_tier TEXT,
        notes TEXT
    );

    CREATE TABLE IF NOT EXISTS enemy_boards (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        round_name TEXT NOT NULL,
        round_number INTEGER,
        variant TEXT
    );

    CREATE TABLE IF NOT EXISTS enemy_units (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        board_id INTEGER NOT NULL,
        character TEXT NOT NULL,
        star_level INTEGER NOT NULL DEFAULT 1,
        row INTEGER,
        col INTEGER,
        items TEXT,
        mod_health REAL,
        mod_ad REAL,
        mod_ap REAL,
        FOREIGN KEY (board_id) REFERENCES enemy_boards(id)
    );
";

/// Read-only view of the reference dataset
pub struct ReferenceStore {
    conn: Mutex<Connection>,
}

impl ReferenceStore {
    /// Open an existing dataset file read-only
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)
            .with_context(|| format!("Failed to open reference dataset {}", path.display()))?;
        info!("Reference dataset opened: {}", path.display());
        Ok(Self::from_connection(conn))
    }

    /// In-memory dataset holding only the round structure, for running without `tft.db`
    pub fn standard_rounds(total_rounds: u32) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        install_schema(&conn)?;
        seed_round_structure(&conn, total_rounds)?;
        Ok(Self::from_connection(conn))
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("reference dataset lock poisoned"))
    }

    /// Units of every recorded board for `round_number`, board by board in insertion
    /// order. Rounds with variant boards list each variant's units in turn.
    /// Rounds without a board give an empty list.
    pub fn enemy_board(&self, round_number: u32) -> Result<Vec<EnemyUnit>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT eu.character, eu.star_level, eu.row, eu.col,
                    eu.items, eu.mod_health, eu.mod_ad, eu.mod_ap
             FROM enemy_units eu
             JOIN enemy_boards eb ON eb.id = eu.board_id
             WHERE eb.round_number = ?1
             ORDER BY eb.id, eu.id",
        )?;
        let rows = stmt.query_map(params![round_number], |row| {
            let star: i64 = row.get(1)?;
            let items: Option<String> = row.get(4)?;
            Ok(EnemyUnit {
                character: row.get(0)?,
                star_level: star.clamp(1, 3) as u8,
                row: row.get(2)?,
                col: row.get(3)?,
                items: parse_string_list(items.as_deref(), "enemy_units.items"),
                mod_health: row.get(5)?,
                mod_ad: row.get(6)?,
                mod_ap: row.get(7)?,
            })
        })?;

        let mut units = Vec::new();
        for unit in rows {
            units.push(unit?);
        }
        Ok(units)
    }

    pub fn round_info(&self, round_number: u32) -> Result<Option<RoundInfo>> {
        let conn = self.conn()?;
        let info = conn
            .query_row(
                "SELECT stage, round_in_stage, round_type, augment_tier
                 FROM tocker_rounds WHERE round_number = ?1",
                params![round_number],
                |row| {
                    Ok(RoundInfo {
                        stage: row.get(0)?,
                        round_in_stage: row.get(1)?,
                        round_type: row.get(2)?,
                        augment_tier: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(info)
    }

    /// Augments flagged for this mode, ordered by display name
    pub fn eligible_augments(&self) -> Result<Vec<Augment>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT api_name, name, description, effects, associated_traits
             FROM augments WHERE in_tockers = 1
             ORDER BY name",
        )?;
        let rows = stmt.query_map([], |row| {
            let api_name: String = row.get(0)?;
            let name: Option<String> = row.get(1)?;
            let effects: Option<String> = row.get(3)?;
            let traits: Option<String> = row.get(4)?;
            Ok(Augment {
                name: name.unwrap_or_else(|| api_name.clone()),
                api_name,
                description: row.get(2)?,
                effects: effects
                    .and_then(|e| serde_json::from_str(&e).ok())
                    .unwrap_or(serde_json::Value::Null),
                associated_traits: parse_string_list(traits.as_deref(), "augments.associated_traits"),
            })
        })?;

        let mut augments = Vec::new();
        for augment in rows {
            augments.push(augment?);
        }
        Ok(augments)
    }
}

/// Create the reference tables if they are missing
pub fn install_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(REFERENCE_SCHEMA)
        .context("Failed to create reference tables")
}

/// Insert the standard round structure: 10 rounds per stage, rounds 1-1 and 1-2
/// are minion rounds, round 5 of each stage is an augment round (gold through
/// stage 2, prismatic after) and round 10 is a boss.
pub fn seed_round_structure(conn: &Connection, total_rounds: u32) -> Result<usize> {
    let mut stmt = conn.prepare(
        "INSERT OR REPLACE INTO tocker_rounds
         (round_number, stage, round_in_stage, round_type, augment_tier)
         VALUES (?1, ?2, ?3, ?4, ?5)",
    )?;
    for round_number in 1..=total_rounds {
        let stage = (round_number - 1) / 10 + 1;
        let r = (round_number - 1) % 10 + 1;
        let round_type = match (stage, r) {
            (1, 1..=2) => "minion",
            (_, 5) => "augment",
            (_, 10) => "boss",
            _ => "standard",
        };
        let augment_tier = match (round_type, stage) {
            ("augment", 1..=2) => Some("gold"),
            ("augment", _) => Some("prismatic"),
            _ => None,
        };
        stmt.execute(params![round_number, stage, r, round_type, augment_tier])?;
    }
    Ok(total_rounds as usize)
}

fn parse_string_list(raw: Option<&str>, column: &str) -> Vec<String> {
    match raw {
        None | Some("") => Vec::new(),
        Some(text) => serde_json::from_str(text).unwrap_or_else(|e| {
            warn!("Malformed JSON list in {}: {}", column, e);
            Vec::new()
        }),
    }
}
