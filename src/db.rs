use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use tracing::debug;

use crate::entities::{Group, Member, NewGroup, NewRound, NewUser, Round, User};
use crate::error::{Error, Result};

/// Open (or create) the database file and make sure the schema exists
pub fn open_database(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)?;
    setup_database(&conn)?;
    Ok(conn)
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;

    // ==========================================================================
    // Users
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            email TEXT UNIQUE NOT NULL,
            username TEXT UNIQUE NOT NULL,
            hashed_password TEXT NOT NULL,
            is_active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Groups + ordered membership (position = rotation order)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS groups (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            created_by_id INTEGER NOT NULL REFERENCES users(id),
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS group_members (
            group_id INTEGER NOT NULL REFERENCES groups(id),
            user_id INTEGER NOT NULL REFERENCES users(id),
            position INTEGER NOT NULL,
            joined_at TEXT NOT NULL,
            PRIMARY KEY (group_id, user_id),
            UNIQUE (group_id, position)
        )",
        [],
    )?;

    // ==========================================================================
    // Rounds (append-only)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS rounds (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            group_id INTEGER NOT NULL REFERENCES groups(id),
            paid_by_id INTEGER NOT NULL REFERENCES users(id),
            amount INTEGER NOT NULL CHECK (amount >= 0),
            date TEXT NOT NULL,
            notes TEXT
        )",
        [],
    )?;

    // ==========================================================================
    // Indexes
    // ==========================================================================
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_groups_name ON groups(name)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_rounds_group_date ON rounds(group_id, date, id)",
        [],
    )?;

    Ok(())
}

// ============================================================================
// Timestamps
// ============================================================================

// Fixed-width UTC text so that ORDER BY on the column is chronological.
// Values handed back to callers go through `now_micros` or `trunc_subsecs(6)`
// first, so they equal what a later read returns.
fn now_micros() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

// ============================================================================
// Users
// ============================================================================

const USER_COLUMNS: &str = "id, email, username, hashed_password, is_active, created_at";

fn user_from_row(row: &Row) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        email: row.get(1)?,
        username: row.get(2)?,
        hashed_password: row.get(3)?,
        is_active: row.get(4)?,
        created_at: parse_timestamp(row, 5)?,
    })
}

/// Insert a user whose password has already been hashed
pub fn insert_user(conn: &Connection, new_user: &NewUser, hashed_password: &str) -> Result<User> {
    new_user.validate()?;

    if get_user_by_email(conn, &new_user.email)?.is_some() {
        return Err(Error::Conflict("Email already registered".to_string()));
    }

    let created_at = now_micros();
    let result = conn.execute(
        "INSERT INTO users (email, username, hashed_password, is_active, created_at)
         VALUES (?1, ?2, ?3, 1, ?4)",
        params![
            new_user.email,
            new_user.username,
            hashed_password,
            format_timestamp(created_at),
        ],
    );

    match result {
        Ok(_) => {}
        Err(e) if is_constraint_violation(&e) => {
            return Err(Error::Conflict("Username already taken".to_string()));
        }
        Err(e) => return Err(e.into()),
    }

    let user = User {
        id: conn.last_insert_rowid(),
        email: new_user.email.clone(),
        username: new_user.username.clone(),
        hashed_password: hashed_password.to_string(),
        is_active: true,
        created_at,
    };
    debug!(user_id = user.id, username = %user.username, "user created");

    Ok(user)
}

pub fn get_user(conn: &Connection, user_id: i64) -> Result<Option<User>> {
    let user = conn
        .query_row(
            &format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS),
            [user_id],
            user_from_row,
        )
        .optional()?;

    Ok(user)
}

pub fn get_user_by_email(conn: &Connection, email: &str) -> Result<Option<User>> {
    let user = conn
        .query_row(
            &format!("SELECT {} FROM users WHERE email = ?1", USER_COLUMNS),
            [email],
            user_from_row,
        )
        .optional()?;

    Ok(user)
}

fn user_exists(conn: &Connection, user_id: i64) -> Result<bool> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM users WHERE id = ?1)",
        [user_id],
        |row| row.get(0),
    )?;
    Ok(exists)
}

// ============================================================================
// Groups & membership
// ============================================================================

pub fn insert_group(conn: &Connection, new_group: &NewGroup) -> Result<Group> {
    if new_group.name.trim().is_empty() {
        return Err(Error::Validation("group name must not be empty".to_string()));
    }

    let tx = conn.unchecked_transaction()?;

    if !user_exists(&tx, new_group.created_by_id)? {
        return Err(Error::not_found("User"));
    }

    let created_at = now_micros();
    tx.execute(
        "INSERT INTO groups (name, created_by_id, created_at) VALUES (?1, ?2, ?3)",
        params![new_group.name, new_group.created_by_id, format_timestamp(created_at)],
    )?;
    let id = tx.last_insert_rowid();
    tx.commit()?;

    debug!(group_id = id, name = %new_group.name, "group created");

    Ok(Group {
        id,
        name: new_group.name.clone(),
        created_by_id: new_group.created_by_id,
        created_at,
        members: Vec::new(),
    })
}

fn group_from_row(row: &Row) -> rusqlite::Result<Group> {
    Ok(Group {
        id: row.get(0)?,
        name: row.get(1)?,
        created_by_id: row.get(2)?,
        created_at: parse_timestamp(row, 3)?,
        members: Vec::new(),
    })
}

/// Load a group together with its ordered member sequence
pub fn get_group(conn: &Connection, group_id: i64) -> Result<Option<Group>> {
    let group = conn
        .query_row(
            "SELECT id, name, created_by_id, created_at FROM groups WHERE id = ?1",
            [group_id],
            group_from_row,
        )
        .optional()?;

    match group {
        Some(mut group) => {
            group.members = get_members(conn, group.id)?;
            Ok(Some(group))
        }
        None => Ok(None),
    }
}

pub fn group_exists(conn: &Connection, group_id: i64) -> Result<bool> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM groups WHERE id = ?1)",
        [group_id],
        |row| row.get(0),
    )?;
    Ok(exists)
}

/// Page through groups in creation order
pub fn list_groups(conn: &Connection, skip: usize, limit: usize) -> Result<Vec<Group>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, created_by_id, created_at
         FROM groups
         ORDER BY id
         LIMIT ?1 OFFSET ?2",
    )?;

    let mut groups = stmt
        .query_map(params![limit as i64, skip as i64], group_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    for group in &mut groups {
        group.members = get_members(conn, group.id)?;
    }

    Ok(groups)
}

/// The group's member sequence in rotation order
pub fn get_members(conn: &Connection, group_id: i64) -> Result<Vec<Member>> {
    let mut stmt = conn.prepare(
        "SELECT u.id, u.email, u.username, u.hashed_password, u.is_active, u.created_at,
                gm.position
         FROM group_members gm
         JOIN users u ON u.id = gm.user_id
         WHERE gm.group_id = ?1
         ORDER BY gm.position",
    )?;

    let members = stmt
        .query_map([group_id], |row| {
            let position: i64 = row.get(6)?;
            Ok(Member {
                position: position as usize,
                user: user_from_row(row)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(members)
}

/// Append a user to the end of a group's rotation
pub fn add_member(conn: &Connection, group_id: i64, user_id: i64) -> Result<Member> {
    let tx = conn.unchecked_transaction()?;

    let user = get_user(&tx, user_id)?;
    let user = match (group_exists(&tx, group_id)?, user) {
        (true, Some(user)) => user,
        _ => return Err(Error::not_found("Group or user")),
    };

    let position: i64 = tx.query_row(
        "SELECT COUNT(*) FROM group_members WHERE group_id = ?1",
        [group_id],
        |row| row.get(0),
    )?;

    let result = tx.execute(
        "INSERT INTO group_members (group_id, user_id, position, joined_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![group_id, user_id, position, format_timestamp(Utc::now())],
    );

    match result {
        Ok(_) => {}
        Err(e) if is_constraint_violation(&e) => {
            return Err(Error::Conflict("User is already a member of this group".to_string()));
        }
        Err(e) => return Err(e.into()),
    }
    tx.commit()?;

    debug!(group_id, user_id, position, "member added");

    Ok(Member {
        position: position as usize,
        user,
    })
}

// ============================================================================
// Rounds
// ============================================================================

const ROUND_COLUMNS: &str = "id, group_id, paid_by_id, amount, date, notes";

fn round_from_row(row: &Row) -> rusqlite::Result<Round> {
    Ok(Round {
        id: row.get(0)?,
        group_id: row.get(1)?,
        paid_by_id: row.get(2)?,
        amount: row.get(3)?,
        date: parse_timestamp(row, 4)?,
        notes: row.get(5)?,
    })
}

/// Record a round stamped with the current time
pub fn insert_round(conn: &Connection, new_round: &NewRound) -> Result<Round> {
    insert_round_at(conn, new_round, Utc::now())
}

/// Record a round with an explicit timestamp (imports, tests)
pub fn insert_round_at(conn: &Connection, new_round: &NewRound, date: DateTime<Utc>) -> Result<Round> {
    new_round.validate()?;
    let date = date.trunc_subsecs(6);

    let tx = conn.unchecked_transaction()?;

    if !group_exists(&tx, new_round.group_id)? {
        return Err(Error::not_found("Group"));
    }
    if !user_exists(&tx, new_round.paid_by_id)? {
        return Err(Error::not_found("User"));
    }

    tx.execute(
        "INSERT INTO rounds (group_id, paid_by_id, amount, date, notes)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            new_round.group_id,
            new_round.paid_by_id,
            new_round.amount,
            format_timestamp(date),
            new_round.notes,
        ],
    )?;
    let id = tx.last_insert_rowid();
    tx.commit()?;

    debug!(round_id = id, group_id = new_round.group_id, paid_by_id = new_round.paid_by_id, "round recorded");

    Ok(Round {
        id,
        group_id: new_round.group_id,
        paid_by_id: new_round.paid_by_id,
        amount: new_round.amount,
        date,
        notes: new_round.notes.clone(),
    })
}

/// Most recent round of a group: latest date, then highest id
pub fn get_last_round(conn: &Connection, group_id: i64) -> Result<Option<Round>> {
    let round = conn
        .query_row(
            &format!(
                "SELECT {} FROM rounds
                 WHERE group_id = ?1
                 ORDER BY date DESC, id DESC
                 LIMIT 1",
                ROUND_COLUMNS
            ),
            [group_id],
            round_from_row,
        )
        .optional()?;

    Ok(round)
}

/// Round history of a group, newest first
pub fn get_rounds_for_group(conn: &Connection, group_id: i64) -> Result<Vec<Round>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM rounds
         WHERE group_id = ?1
         ORDER BY date DESC, id DESC",
        ROUND_COLUMNS
    ))?;

    let rounds = stmt
        .query_map([group_id], round_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rounds)
}

pub fn count_rounds(conn: &Connection, group_id: i64) -> Result<i64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM rounds WHERE group_id = ?1",
        [group_id],
        |row| row.get(0),
    )?;

    Ok(count)
}

/// Write a group's round history to CSV, oldest first
pub fn export_rounds_csv(conn: &Connection, group_id: i64, csv_path: &Path) -> Result<usize> {
    if !group_exists(conn, group_id)? {
        return Err(Error::not_found("Group"));
    }

    let mut rounds = get_rounds_for_group(conn, group_id)?;
    rounds.reverse();

    let mut wtr = csv::Writer::from_path(csv_path)?;
    for round in &rounds {
        wtr.serialize(round)?;
    }
    wtr.flush().map_err(csv::Error::from)?;

    debug!(group_id, rows = rounds.len(), path = %csv_path.display(), "rounds exported");

    Ok(rounds.len())
}
