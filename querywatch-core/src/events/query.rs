//! Raw query-execution events handed over by the interception point.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Operation class of an intercepted statement.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum QueryKind {
    Read,
    Write,
    Unknown,
}

impl QueryKind {
    pub const ALL: [QueryKind; 3] = [QueryKind::Read, QueryKind::Write, QueryKind::Unknown];

    pub fn as_str(&self) -> &'static str {
        match self {
            QueryKind::Read => "READ",
            QueryKind::Write => "WRITE",
            QueryKind::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for QueryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueryKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "READ" => Ok(QueryKind::Read),
            "WRITE" => Ok(QueryKind::Write),
            "UNKNOWN" => Ok(QueryKind::Unknown),
            other => Err(format!("unknown query kind '{other}'")),
        }
    }
}

/// Consistency / durability level requested for a statement.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConsistencyLevel {
    Any,
    One,
    Two,
    Three,
    Quorum,
    All,
    LocalQuorum,
    EachQuorum,
    Serial,
    LocalSerial,
    LocalOne,
    Unknown,
}

impl ConsistencyLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConsistencyLevel::Any => "ANY",
            ConsistencyLevel::One => "ONE",
            ConsistencyLevel::Two => "TWO",
            ConsistencyLevel::Three => "THREE",
            ConsistencyLevel::Quorum => "QUORUM",
            ConsistencyLevel::All => "ALL",
            ConsistencyLevel::LocalQuorum => "LOCAL_QUORUM",
            ConsistencyLevel::EachQuorum => "EACH_QUORUM",
            ConsistencyLevel::Serial => "SERIAL",
            ConsistencyLevel::LocalSerial => "LOCAL_SERIAL",
            ConsistencyLevel::LocalOne => "LOCAL_ONE",
            ConsistencyLevel::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for ConsistencyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConsistencyLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let level = match s.to_ascii_uppercase().as_str() {
            "ANY" => ConsistencyLevel::Any,
            "ONE" => ConsistencyLevel::One,
            "TWO" => ConsistencyLevel::Two,
            "THREE" => ConsistencyLevel::Three,
            "QUORUM" => ConsistencyLevel::Quorum,
            "ALL" => ConsistencyLevel::All,
            "LOCAL_QUORUM" => ConsistencyLevel::LocalQuorum,
            "EACH_QUORUM" => ConsistencyLevel::EachQuorum,
            "SERIAL" => ConsistencyLevel::Serial,
            "LOCAL_SERIAL" => ConsistencyLevel::LocalSerial,
            "LOCAL_ONE" => ConsistencyLevel::LocalOne,
            "UNKNOWN" => ConsistencyLevel::Unknown,
            other => return Err(format!("unknown consistency level '{other}'")),
        };
        Ok(level)
    }
}

/// One intercepted operation.
///
/// Built once by the interception point and never mutated afterwards; the
/// pipeline shares it behind an `Arc` until every subscribed module is done.
#[derive(Clone, Debug, PartialEq)]
pub struct RawEvent {
    /// Start of execution, epoch milliseconds.
    pub start_ms: i64,
    pub duration_ms: u64,
    pub client_address: String,
    pub kind: QueryKind,
    pub namespace: String,
    pub resource: String,
    pub statement: String,
    pub consistency: ConsistencyLevel,
    pub error: Option<String>,
    /// Self-traffic (loopback diagnostics, internal tooling). Never queued.
    pub internal: bool,
}

impl RawEvent {
    pub fn new(kind: QueryKind, namespace: impl Into<String>, resource: impl Into<String>) -> Self {
        Self {
            start_ms: chrono::Utc::now().timestamp_millis(),
            duration_ms: 0,
            client_address: String::new(),
            kind,
            namespace: namespace.into(),
            resource: resource.into(),
            statement: String::new(),
            consistency: ConsistencyLevel::Unknown,
            error: None,
            internal: false,
        }
    }

    pub fn with_start(mut self, start_ms: i64) -> Self {
        self.start_ms = start_ms;
        self
    }

    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    pub fn with_client(mut self, address: impl Into<String>) -> Self {
        self.client_address = address.into();
        self
    }

    pub fn with_statement(mut self, statement: impl Into<String>) -> Self {
        self.statement = statement.into();
        self
    }

    pub fn with_consistency(mut self, consistency: ConsistencyLevel) -> Self {
        self.consistency = consistency;
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn internal(mut self) -> Self {
        self.internal = true;
        self
    }

    /// `namespace.resource`, the form table allow-lists are written in.
    pub fn qualified_resource(&self) -> String {
        format!("{}.{}", self.namespace, self.resource)
    }
}
