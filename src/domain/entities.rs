//! Domain Entities - Core business objects
//!
//! Network and member records are open-ended JSON documents. The only field
//! the mirror layer interprets is `revision`, which is the sole signal used to
//! decide which copy of a record is newer.

use crate::domain::value_objects::{MemberId, NetworkId};
use serde_json::{Map, Value};
use std::net::IpAddr;

/// Errors raised when a JSON document is not a well-formed record.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecordError {
    #[error("record is not a JSON object")]
    NotAnObject,
    #[error("unknown record type: {0:?}")]
    UnknownType(String),
    #[error("missing or invalid field: {0}")]
    InvalidField(&'static str),
}

/// Read an integer field the lenient way: numbers and decimal strings are
/// accepted, anything else (including negatives) yields `default`.
pub fn json_u64(value: Option<&Value>, default: u64) -> u64 {
    match value {
        Some(Value::Number(n)) => n.as_u64().unwrap_or(default),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(default),
        _ => default,
    }
}

fn json_bool(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_u64().map(|n| n != 0).unwrap_or(false),
        _ => false,
    }
}

fn parse_id<T: std::str::FromStr>(doc: &Map<String, Value>, field: &'static str) -> Result<T, RecordError> {
    doc.get(field)
        .and_then(Value::as_str)
        .and_then(|s| s.parse().ok())
        .ok_or(RecordError::InvalidField(field))
}

/// A network configuration record.
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkRecord {
    id: NetworkId,
    doc: Map<String, Value>,
}

impl NetworkRecord {
    /// Create a minimal network document at the given revision.
    pub fn new(id: NetworkId, revision: u64) -> Self {
        let mut doc = Map::new();
        doc.insert("objtype".into(), Value::from("network"));
        doc.insert("id".into(), Value::from(id.to_string()));
        doc.insert("nwid".into(), Value::from(id.to_string()));
        doc.insert("revision".into(), Value::from(revision));
        Self { id, doc }
    }

    /// Decode a network document. The `objtype` field is not checked here.
    pub fn from_json(value: Value) -> Result<Self, RecordError> {
        let Value::Object(doc) = value else {
            return Err(RecordError::NotAnObject);
        };
        let id = parse_id(&doc, "id")?;
        Ok(Self { id, doc })
    }

    /// Set an arbitrary document field.
    pub fn with_field(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.doc.insert(key.to_string(), value.into());
        self
    }

    pub fn set_revision(&mut self, revision: u64) {
        self.doc.insert("revision".into(), Value::from(revision));
    }

    pub fn id(&self) -> NetworkId {
        self.id
    }

    pub fn revision(&self) -> u64 {
        json_u64(self.doc.get("revision"), 0)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.doc.get(key)
    }

    pub fn doc(&self) -> &Map<String, Value> {
        &self.doc
    }

    pub fn to_json(&self) -> Value {
        Value::Object(self.doc.clone())
    }
}

/// A member record, scoped to a network.
#[derive(Debug, Clone, PartialEq)]
pub struct MemberRecord {
    network_id: NetworkId,
    id: MemberId,
    doc: Map<String, Value>,
}

impl MemberRecord {
    /// Create a minimal member document at the given revision.
    pub fn new(network_id: NetworkId, id: MemberId, revision: u64) -> Self {
        let mut doc = Map::new();
        doc.insert("objtype".into(), Value::from("member"));
        doc.insert("nwid".into(), Value::from(network_id.to_string()));
        doc.insert("id".into(), Value::from(id.to_string()));
        doc.insert("revision".into(), Value::from(revision));
        Self { network_id, id, doc }
    }

    /// Decode a member document. The `objtype` field is not checked here.
    pub fn from_json(value: Value) -> Result<Self, RecordError> {
        let Value::Object(doc) = value else {
            return Err(RecordError::NotAnObject);
        };
        let network_id = parse_id(&doc, "nwid")?;
        let id = parse_id(&doc, "id")?;
        Ok(Self { network_id, id, doc })
    }

    pub fn with_field(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.doc.insert(key.to_string(), value.into());
        self
    }

    pub fn set_revision(&mut self, revision: u64) {
        self.doc.insert("revision".into(), Value::from(revision));
    }

    pub fn network_id(&self) -> NetworkId {
        self.network_id
    }

    pub fn id(&self) -> MemberId {
        self.id
    }

    pub fn revision(&self) -> u64 {
        json_u64(self.doc.get("revision"), 0)
    }

    pub fn authorized(&self) -> bool {
        json_bool(self.doc.get("authorized"))
    }

    pub fn active_bridge(&self) -> bool {
        json_bool(self.doc.get("activeBridge"))
    }

    pub fn last_deauthorized_time(&self) -> i64 {
        i64::try_from(json_u64(self.doc.get("lastDeauthorizedTime"), 0)).unwrap_or(0)
    }

    /// IP assignments that parse as addresses. Unparsable entries are ignored.
    pub fn ip_assignments(&self) -> Vec<IpAddr> {
        self.doc
            .get("ipAssignments")
            .and_then(Value::as_array)
            .map(|ips| {
                ips.iter()
                    .filter_map(Value::as_str)
                    .filter_map(|s| s.parse().ok())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.doc.get(key)
    }

    pub fn doc(&self) -> &Map<String, Value> {
        &self.doc
    }

    pub fn to_json(&self) -> Value {
        Value::Object(self.doc.clone())
    }
}

/// Unit of replication: a whole network or member document.
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    Network(NetworkRecord),
    Member(MemberRecord),
}

impl Record {
    /// Classify a JSON document by its `objtype` field.
    pub fn from_json(value: Value) -> Result<Self, RecordError> {
        let objtype = match value.as_object() {
            Some(doc) => doc.get("objtype").and_then(Value::as_str).unwrap_or("").to_string(),
            None => return Err(RecordError::NotAnObject),
        };
        match objtype.as_str() {
            "network" => NetworkRecord::from_json(value).map(Record::Network),
            "member" => MemberRecord::from_json(value).map(Record::Member),
            other => Err(RecordError::UnknownType(other.to_string())),
        }
    }

    pub fn network_id(&self) -> NetworkId {
        match self {
            Record::Network(n) => n.id(),
            Record::Member(m) => m.network_id(),
        }
    }

    pub fn revision(&self) -> u64 {
        match self {
            Record::Network(n) => n.revision(),
            Record::Member(m) => m.revision(),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Record::Network(n) => n.to_json(),
            Record::Member(m) => m.to_json(),
        }
    }
}

impl From<NetworkRecord> for Record {
    fn from(n: NetworkRecord) -> Self {
        Record::Network(n)
    }
}

impl From<MemberRecord> for Record {
    fn from(m: MemberRecord) -> Self {
        Record::Member(m)
    }
}

/// Aggregate statistics about a network's members.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkSummary {
    pub authorized_member_count: u64,
    pub total_member_count: u64,
    /// Milliseconds since the epoch; 0 if no member was ever deauthorized
    pub most_recent_deauth_time: i64,
    pub active_bridges: Vec<MemberId>,
    /// Sorted and deduplicated
    pub allocated_ips: Vec<IpAddr>,
}

impl NetworkSummary {
    /// Compute a summary from a network's members.
    pub fn from_members<'a>(members: impl IntoIterator<Item = &'a MemberRecord>) -> Self {
        let mut summary = Self::default();
        for member in members {
            summary.total_member_count += 1;
            if member.authorized() {
                summary.authorized_member_count += 1;
            }
            if member.active_bridge() {
                summary.active_bridges.push(member.id());
            }
            summary.most_recent_deauth_time = summary
                .most_recent_deauth_time
                .max(member.last_deauthorized_time());
            summary.allocated_ips.extend(member.ip_assignments());
        }
        summary.active_bridges.sort();
        summary.allocated_ips.sort();
        summary.allocated_ips.dedup();
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const NWID: NetworkId = NetworkId(0x8056c2e21c000001);

    // ===== Revision Tests =====

    #[test]
    fn test_revision_defaults_to_zero() {
        assert_eq!(json_u64(None, 0), 0);
        assert_eq!(json_u64(Some(&json!(null)), 0), 0);
        assert_eq!(json_u64(Some(&json!(-4)), 0), 0);
        assert_eq!(json_u64(Some(&json!("garbage")), 0), 0);
        assert_eq!(json_u64(Some(&json!(1.5)), 0), 0);
    }

    #[test]
    fn test_revision_accepts_numbers_and_strings() {
        assert_eq!(json_u64(Some(&json!(7)), 0), 7);
        assert_eq!(json_u64(Some(&json!("12")), 0), 12);
    }

    #[test]
    fn test_network_record_revision() {
        let mut network = NetworkRecord::new(NWID, 3);
        assert_eq!(network.revision(), 3);
        network.set_revision(9);
        assert_eq!(network.revision(), 9);
    }

    // ===== Decode Tests =====

    #[test]
    fn test_record_from_json_network() {
        let value = json!({"objtype": "network", "id": "8056c2e21c000001", "revision": 5, "name": "lab"});
        let record = Record::from_json(value).unwrap();
        match record {
            Record::Network(n) => {
                assert_eq!(n.id(), NWID);
                assert_eq!(n.revision(), 5);
                assert_eq!(n.get("name"), Some(&json!("lab")));
            }
            other => panic!("expected network, got {:?}", other),
        }
    }

    #[test]
    fn test_record_from_json_member() {
        let value = json!({"objtype": "member", "nwid": "8056c2e21c000001", "id": "a1b2c3d4e5"});
        let record = Record::from_json(value).unwrap();
        assert_eq!(record.network_id(), NWID);
        assert_eq!(record.revision(), 0);
        match record {
            Record::Member(m) => assert_eq!(m.id(), MemberId(0xa1b2c3d4e5)),
            other => panic!("expected member, got {:?}", other),
        }
    }

    #[test]
    fn test_record_from_json_rejects_non_object() {
        assert_eq!(Record::from_json(json!([1, 2])), Err(RecordError::NotAnObject));
        assert_eq!(Record::from_json(json!(null)), Err(RecordError::NotAnObject));
    }

    #[test]
    fn test_record_from_json_rejects_unknown_type() {
        let err = Record::from_json(json!({"objtype": "route"})).unwrap_err();
        assert_eq!(err, RecordError::UnknownType("route".to_string()));
    }

    #[test]
    fn test_member_from_json_requires_nwid() {
        let err = MemberRecord::from_json(json!({"id": "a1b2c3d4e5"})).unwrap_err();
        assert_eq!(err, RecordError::InvalidField("nwid"));
    }

    #[test]
    fn test_to_json_round_trips_extra_fields() {
        let network = NetworkRecord::new(NWID, 2).with_field("private", true);
        let decoded = NetworkRecord::from_json(network.to_json()).unwrap();
        assert_eq!(decoded, network);
    }

    // ===== Member Field Tests =====

    #[test]
    fn test_member_fields() {
        let member = MemberRecord::new(NWID, MemberId(1), 1)
            .with_field("authorized", true)
            .with_field("activeBridge", 1)
            .with_field("lastDeauthorizedTime", 1700)
            .with_field("ipAssignments", json!(["10.0.0.1", "bogus", "fd00::1"]));

        assert!(member.authorized());
        assert!(member.active_bridge());
        assert_eq!(member.last_deauthorized_time(), 1700);
        assert_eq!(member.ip_assignments().len(), 2);
    }

    #[test]
    fn test_deauthorized_time_out_of_range_reads_as_zero() {
        let member = MemberRecord::new(NWID, MemberId(1), 1).with_field("lastDeauthorizedTime", u64::MAX);
        assert_eq!(member.last_deauthorized_time(), 0);

        let member = MemberRecord::new(NWID, MemberId(1), 1).with_field("lastDeauthorizedTime", i64::MAX as u64);
        assert_eq!(member.last_deauthorized_time(), i64::MAX);
    }

    // ===== Summary Tests =====

    #[test]
    fn test_network_summary_from_members() {
        let members = vec![
            MemberRecord::new(NWID, MemberId(2), 1)
                .with_field("authorized", true)
                .with_field("activeBridge", true)
                .with_field("ipAssignments", json!(["10.0.0.2"])),
            MemberRecord::new(NWID, MemberId(1), 1)
                .with_field("authorized", true)
                .with_field("ipAssignments", json!(["10.0.0.1", "10.0.0.2"])),
            MemberRecord::new(NWID, MemberId(3), 1).with_field("lastDeauthorizedTime", 42),
        ];

        let summary = NetworkSummary::from_members(&members);
        assert_eq!(summary.total_member_count, 3);
        assert_eq!(summary.authorized_member_count, 2);
        assert_eq!(summary.active_bridges, vec![MemberId(2)]);
        assert_eq!(summary.most_recent_deauth_time, 42);
        assert_eq!(
            summary.allocated_ips,
            vec!["10.0.0.1".parse::<IpAddr>().unwrap(), "10.0.0.2".parse().unwrap()]
        );
    }

    #[test]
    fn test_network_summary_empty() {
        let summary = NetworkSummary::from_members(std::iter::empty());
        assert_eq!(summary, NetworkSummary::default());
    }
}
