use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Kind of check a rule performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleType {
    #[serde(alias = "EXISTS", alias = "Exists")]
    Exists,
    #[serde(alias = "MISSING", alias = "Missing")]
    Missing,
}

impl fmt::Display for RuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleType::Exists => write!(f, "exists"),
            RuleType::Missing => write!(f, "missing"),
        }
    }
}

/// A single named condition check. Lower `priority` ranks first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    pub id: i64,
    #[serde(rename = "type")]
    pub rule_type: RuleType,
    pub display_name: String,
    pub priority: i64,
    pub condition: String,
}

impl Rule {
    pub fn new(
        id: i64,
        rule_type: RuleType,
        display_name: impl Into<String>,
        priority: i64,
        condition: impl Into<String>,
    ) -> Self {
        Self {
            id,
            rule_type,
            display_name: display_name.into(),
            priority,
            condition: condition.into(),
        }
    }
}

/// The versioned document: an ordered rule set.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Policy {
    pub rules: Vec<Rule>,
    #[serde(default)]
    pub version: u64,
}

impl Policy {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self { rules, version: 0 }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Stable sort by ascending priority; equal priorities keep input order.
    pub fn sort_by_priority(&mut self) {
        self.rules.sort_by_key(|rule| rule.priority);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    User,
}

impl Role {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "admin" => Some(Role::Admin),
            "user" => Some(Role::User),
            _ => None,
        }
    }
}

/// Caller identity supplied by the (external) authorization layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    pub role: Role,
}

impl Actor {
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self { id: id.into(), role }
    }

    pub fn admin(id: impl Into<String>) -> Self {
        Self::new(id, Role::Admin)
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Metadata recorded by a version increment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionMetadata {
    pub updated_by: String,
    pub timestamp: DateTime<Utc>,
    pub previous_version: u64,
}

/// One accepted state of the policy. Identity is `version`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionInfo {
    pub version: u64,
    pub hash: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<VersionMetadata>,
}

impl VersionInfo {
    pub fn genesis(hash: impl Into<String>) -> Self {
        Self {
            version: 0,
            hash: hash.into(),
            timestamp: Utc::now(),
            metadata: None,
        }
    }
}

/// Opaque token identifying the holder of the version lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OperationId(Uuid);

impl OperationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for OperationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
