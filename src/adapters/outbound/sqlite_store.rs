//! SQLite Backing Store
//!
//! Implements BackingStore on a SQLite database. Documents are stored as
//! JSON text next to their revision so staleness checks do not need to
//! parse them.

use crate::domain::entities::{MemberRecord, NetworkRecord, NetworkSummary, Record};
use crate::domain::ports::{BackingStore, StoreEntry};
use crate::domain::value_objects::{MemberId, NetworkId, StoreId};
use crate::mirror::StoreNotifier;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::net::SocketAddr;
use std::ops::ControlFlow;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

/// Errors internal to the SQLite store. They never cross the
/// [`BackingStore`] boundary; failed calls are logged and reported as
/// "not found" or "not changed".
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("network {0} does not exist")]
    UnknownNetwork(NetworkId),
}

enum SaveOutcome {
    Rejected,
    Unchanged,
    Changed { deauthorized: bool },
}

/// SQLite-backed store.
pub struct SqliteStore {
    notifier: StoreNotifier,
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) a database file.
    pub fn open(path: impl AsRef<Path>, notifier: StoreNotifier) -> anyhow::Result<Self> {
        let conn = Connection::open(path.as_ref())?;
        let store = Self::with_connection(conn, notifier)?;
        tracing::info!("{} opened sqlite store at {}", store.id(), path.as_ref().display());
        Ok(store)
    }

    /// A private in-memory database.
    pub fn in_memory(notifier: StoreNotifier) -> anyhow::Result<Self> {
        Self::with_connection(Connection::open_in_memory()?, notifier)
    }

    fn with_connection(conn: Connection, notifier: StoreNotifier) -> anyhow::Result<Self> {
        init_schema(&conn)?;
        Ok(Self {
            notifier,
            conn: Mutex::new(conn),
        })
    }

    pub fn last_seen_address(&self, network_id: NetworkId, member_id: MemberId) -> Option<SocketAddr> {
        let conn = self.conn.lock();
        let address: Option<String> = conn
            .query_row(
                "SELECT address FROM member_status WHERE network_id = ? AND member_id = ?",
                params![network_id.0 as i64, member_id.0 as i64],
                |row| row.get(0),
            )
            .optional()
            .unwrap_or_else(|e| {
                tracing::warn!("{} member_status lookup failed: {}", self.id(), e);
                None
            });
        address.and_then(|a| a.parse().ok())
    }

    fn load_network(conn: &Connection, network_id: NetworkId) -> Result<Option<NetworkRecord>, StoreError> {
        let doc: Option<String> = conn
            .query_row(
                "SELECT doc FROM networks WHERE id = ?",
                [network_id.0 as i64],
                |row| row.get(0),
            )
            .optional()?;
        match doc {
            Some(doc) => {
                let value: Value = serde_json::from_str(&doc)?;
                Ok(NetworkRecord::from_json(value).ok())
            }
            None => Ok(None),
        }
    }

    fn load_member(
        conn: &Connection,
        network_id: NetworkId,
        member_id: MemberId,
    ) -> Result<Option<MemberRecord>, StoreError> {
        let doc: Option<String> = conn
            .query_row(
                "SELECT doc FROM members WHERE network_id = ? AND id = ?",
                params![network_id.0 as i64, member_id.0 as i64],
                |row| row.get(0),
            )
            .optional()?;
        match doc {
            Some(doc) => {
                let value: Value = serde_json::from_str(&doc)?;
                Ok(MemberRecord::from_json(value).ok())
            }
            None => Ok(None),
        }
    }

    /// Every well-formed member of a network. Corrupt rows are left out.
    fn load_members(conn: &Connection, network_id: NetworkId) -> Result<Vec<MemberRecord>, StoreError> {
        let mut stmt = conn.prepare("SELECT doc FROM members WHERE network_id = ? ORDER BY id")?;
        let docs = stmt
            .query_map([network_id.0 as i64], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(docs
            .iter()
            .filter_map(|doc| serde_json::from_str::<Value>(doc).ok())
            .filter_map(|value| MemberRecord::from_json(value).ok())
            .collect())
    }

    fn apply_network(conn: &Connection, network: &NetworkRecord) -> Result<SaveOutcome, StoreError> {
        let existing: Option<(i64, String)> = conn
            .query_row(
                "SELECT revision, doc FROM networks WHERE id = ?",
                [network.id().0 as i64],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let doc = network.to_json();
        if let Some((revision, stored)) = existing {
            if network.revision() < stored_revision(revision) {
                return Ok(SaveOutcome::Rejected);
            }
            if serde_json::from_str::<Value>(&stored).ok().as_ref() == Some(&doc) {
                return Ok(SaveOutcome::Unchanged);
            }
        }

        conn.execute(
            "INSERT OR REPLACE INTO networks (id, revision, doc) VALUES (?, ?, ?)",
            params![
                network.id().0 as i64,
                network.revision() as i64,
                serde_json::to_string(&doc)?
            ],
        )?;
        Ok(SaveOutcome::Changed { deauthorized: false })
    }

    fn apply_member(conn: &Connection, member: &MemberRecord) -> Result<SaveOutcome, StoreError> {
        let network_exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM networks WHERE id = ?)",
            [member.network_id().0 as i64],
            |row| row.get(0),
        )?;
        if !network_exists {
            return Err(StoreError::UnknownNetwork(member.network_id()));
        }

        let existing: Option<(i64, String)> = conn
            .query_row(
                "SELECT revision, doc FROM members WHERE network_id = ? AND id = ?",
                params![member.network_id().0 as i64, member.id().0 as i64],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let doc = member.to_json();
        let mut was_authorized = false;
        if let Some((revision, stored)) = existing {
            if member.revision() < stored_revision(revision) {
                return Ok(SaveOutcome::Rejected);
            }
            let previous = serde_json::from_str::<Value>(&stored).ok();
            if previous.as_ref() == Some(&doc) {
                return Ok(SaveOutcome::Unchanged);
            }
            was_authorized = previous
                .and_then(|v| MemberRecord::from_json(v).ok())
                .map(|m| m.authorized())
                .unwrap_or(false);
        }

        conn.execute(
            "INSERT OR REPLACE INTO members (network_id, id, revision, doc) VALUES (?, ?, ?, ?)",
            params![
                member.network_id().0 as i64,
                member.id().0 as i64,
                member.revision() as i64,
                serde_json::to_string(&doc)?
            ],
        )?;
        Ok(SaveOutcome::Changed {
            deauthorized: was_authorized && !member.authorized(),
        })
    }

    /// Copy every row out so the visitor runs without the connection lock.
    fn snapshot(conn: &Connection) -> Result<Vec<(NetworkId, Value, Vec<(MemberId, Value)>)>, StoreError> {
        let mut members: BTreeMap<i64, Vec<(MemberId, Value)>> = BTreeMap::new();
        {
            let mut stmt = conn.prepare("SELECT network_id, id, doc FROM members ORDER BY network_id, id")?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?, row.get::<_, String>(2)?))
            })?;
            for row in rows {
                let (network_id, member_id, doc) = row?;
                members
                    .entry(network_id)
                    .or_default()
                    .push((MemberId(member_id as u64), parse_or_null(&doc)));
            }
        }

        let mut stmt = conn.prepare("SELECT id, doc FROM networks ORDER BY id")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)))?;
        let mut snapshot = Vec::new();
        for row in rows {
            let (network_id, doc) = row?;
            snapshot.push((
                NetworkId(network_id as u64),
                parse_or_null(&doc),
                members.remove(&network_id).unwrap_or_default(),
            ));
        }
        Ok(snapshot)
    }

    fn log_error<T>(&self, op: &str, result: Result<T, StoreError>) -> Option<T> {
        result
            .map_err(|e| tracing::warn!("{} {} failed: {}", self.id(), op, e))
            .ok()
    }
}

fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS networks (
            id INTEGER PRIMARY KEY,
            revision INTEGER NOT NULL,
            doc TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS members (
            network_id INTEGER NOT NULL,
            id INTEGER NOT NULL,
            revision INTEGER NOT NULL,
            doc TEXT NOT NULL,
            PRIMARY KEY (network_id, id)
        );
        CREATE TABLE IF NOT EXISTS member_status (
            network_id INTEGER NOT NULL,
            member_id INTEGER NOT NULL,
            address TEXT NOT NULL,
            last_seen INTEGER NOT NULL,
            PRIMARY KEY (network_id, member_id)
        );",
    )
}

/// A row that fails to parse is handed out as `null`, which the reconciler
/// treats as malformed.
/// Revisions are bound as the i64 with the same bits; undo that before comparing.
fn stored_revision(column: i64) -> u64 {
    column as u64
}

fn parse_or_null(doc: &str) -> Value {
    serde_json::from_str(doc).unwrap_or(Value::Null)
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

impl BackingStore for SqliteStore {
    fn id(&self) -> StoreId {
        self.notifier.id()
    }

    fn get_network(&self, network_id: NetworkId) -> Option<NetworkRecord> {
        let conn = self.conn.lock();
        self.log_error("get_network", Self::load_network(&conn, network_id))
            .flatten()
    }

    fn get_member(
        &self,
        network_id: NetworkId,
        member_id: MemberId,
    ) -> Option<(NetworkRecord, MemberRecord)> {
        let conn = self.conn.lock();
        let network = self
            .log_error("get_member", Self::load_network(&conn, network_id))
            .flatten()?;
        let member = self
            .log_error("get_member", Self::load_member(&conn, network_id, member_id))
            .flatten()?;
        Some((network, member))
    }

    fn get_member_with_summary(
        &self,
        network_id: NetworkId,
        member_id: MemberId,
    ) -> Option<(NetworkRecord, MemberRecord, NetworkSummary)> {
        let conn = self.conn.lock();
        let network = self
            .log_error("get_member_with_summary", Self::load_network(&conn, network_id))
            .flatten()?;
        let member = self
            .log_error("get_member_with_summary", Self::load_member(&conn, network_id, member_id))
            .flatten()?;
        let members = self.log_error("get_member_with_summary", Self::load_members(&conn, network_id))?;
        Some((network, member, NetworkSummary::from_members(&members)))
    }

    fn get_network_members(
        &self,
        network_id: NetworkId,
    ) -> Option<(NetworkRecord, Vec<MemberRecord>)> {
        let conn = self.conn.lock();
        let network = self
            .log_error("get_network_members", Self::load_network(&conn, network_id))
            .flatten()?;
        let members = self.log_error("get_network_members", Self::load_members(&conn, network_id))?;
        Some((network, members))
    }

    fn has_network(&self, network_id: NetworkId) -> bool {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM networks WHERE id = ?)",
            [network_id.0 as i64],
            |row| row.get(0),
        )
        .unwrap_or_else(|e| {
            tracing::warn!("{} has_network failed: {}", self.id(), e);
            false
        })
    }

    fn network_ids(&self) -> BTreeSet<NetworkId> {
        let conn = self.conn.lock();
        let result = conn
            .prepare("SELECT id FROM networks")
            .and_then(|mut stmt| {
                let ids = stmt
                    .query_map([], |row| row.get::<_, i64>(0))?
                    .map(|id| id.map(|id| NetworkId(id as u64)))
                    .collect::<rusqlite::Result<BTreeSet<_>>>();
                ids
            })
            .map_err(StoreError::from);
        self.log_error("network_ids", result).unwrap_or_default()
    }

    fn save(&self, record: &Record, notify: bool) -> bool {
        let outcome = {
            let conn = self.conn.lock();
            let result = match record {
                Record::Network(network) => Self::apply_network(&conn, network),
                Record::Member(member) => Self::apply_member(&conn, member),
            };
            self.log_error("save", result)
        };

        match outcome {
            Some(SaveOutcome::Changed { deauthorized }) => {
                if notify {
                    match record {
                        Record::Network(network) => self.notifier.network_updated(network),
                        Record::Member(member) => {
                            self.notifier.member_updated(member);
                            if deauthorized {
                                self.notifier
                                    .member_deauthorized(member.network_id(), member.id());
                            }
                        }
                    }
                }
                true
            }
            Some(SaveOutcome::Rejected) => {
                tracing::debug!(
                    "{} rejected older revision for network {} rev={}",
                    self.id(),
                    record.network_id(),
                    record.revision()
                );
                false
            }
            Some(SaveOutcome::Unchanged) | None => false,
        }
    }

    fn erase_network(&self, network_id: NetworkId) {
        let conn = self.conn.lock();
        let result = conn
            .execute_batch("BEGIN")
            .and_then(|_| conn.execute("DELETE FROM members WHERE network_id = ?", [network_id.0 as i64]))
            .and_then(|_| conn.execute("DELETE FROM member_status WHERE network_id = ?", [network_id.0 as i64]))
            .and_then(|_| conn.execute("DELETE FROM networks WHERE id = ?", [network_id.0 as i64]))
            .and_then(|_| conn.execute_batch("COMMIT"));
        if let Err(e) = result {
            let _ = conn.execute_batch("ROLLBACK");
            tracing::warn!("{} erase_network {} failed: {}", self.id(), network_id, e);
        }
    }

    fn erase_member(&self, network_id: NetworkId, member_id: MemberId) {
        let conn = self.conn.lock();
        let (nwid, mid) = (network_id.0 as i64, member_id.0 as i64);
        let result = conn
            .execute("DELETE FROM members WHERE network_id = ? AND id = ?", params![nwid, mid])
            .and_then(|_| {
                conn.execute(
                    "DELETE FROM member_status WHERE network_id = ? AND member_id = ?",
                    params![nwid, mid],
                )
            });
        if let Err(e) = result {
            tracing::warn!(
                "{} erase_member {}/{} failed: {}",
                self.id(),
                network_id,
                member_id,
                e
            );
        }
    }

    fn node_is_online(&self, network_id: NetworkId, member_id: MemberId, address: SocketAddr) {
        let conn = self.conn.lock();
        let result = conn.execute(
            "INSERT OR REPLACE INTO member_status (network_id, member_id, address, last_seen)
             VALUES (?, ?, ?, ?)",
            params![
                network_id.0 as i64,
                member_id.0 as i64,
                address.to_string(),
                now_millis()
            ],
        );
        if let Err(e) = result {
            tracing::warn!("{} node_is_online failed: {}", self.id(), e);
        }
    }

    /// The schema is created on open, so the store is ready from the start.
    fn is_ready(&self) -> bool {
        true
    }

    fn wait_until_ready(&self) -> bool {
        false
    }

    fn for_each(&self, visitor: &mut dyn FnMut(StoreEntry<'_>) -> ControlFlow<()>) {
        let snapshot = {
            let conn = self.conn.lock();
            match self.log_error("for_each", Self::snapshot(&conn)) {
                Some(snapshot) => snapshot,
                None => return,
            }
        };

        for (network_id, network, members) in &snapshot {
            let entry = StoreEntry {
                network_id: *network_id,
                network,
                member: None,
            };
            if visitor(entry).is_break() {
                return;
            }
            for (member_id, member) in members {
                let entry = StoreEntry {
                    network_id: *network_id,
                    network,
                    member: Some((*member_id, member)),
                };
                if visitor(entry).is_break() {
                    return;
                }
            }
        }
    }
}
