use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::IssueError;

/// Lifecycle state of an issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueStatus {
    Reported,
    InProgress,
    Resolved,
    Rejected,
}

impl IssueStatus {
    pub const ALL: [IssueStatus; 4] = [
        Self::Reported,
        Self::InProgress,
        Self::Resolved,
        Self::Rejected,
    ];

    /// State every new issue starts in.
    pub const INITIAL: IssueStatus = Self::Reported;

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Reported => "reported",
            Self::InProgress => "in_progress",
            Self::Resolved => "resolved",
            Self::Rejected => "rejected",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Resolved | Self::Rejected)
    }

    /// Transition table. Open states may move anywhere, including onto
    /// themselves (a notes-only update); closed states never move again.
    pub fn can_transition_to(&self, next: IssueStatus) -> bool {
        use IssueStatus::*;
        matches!(
            (self, next),
            (
                Reported | InProgress,
                Reported | InProgress | Resolved | Rejected
            )
        )
    }
}

impl std::fmt::Display for IssueStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IssueStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "reported" => Ok(Self::Reported),
            "in_progress" => Ok(Self::InProgress),
            "resolved" => Ok(Self::Resolved),
            "rejected" => Ok(Self::Rejected),
            _ => Err(format!(
                "Invalid status '{}'. Valid values: reported, in_progress, resolved, rejected",
                s
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub city: String,
    pub specific_area: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Issue {
    pub id: Uuid,
    pub image_reference: String,
    pub category: String,
    pub location: Location,
    pub description: Option<String>,
    pub issue_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub status: IssueStatus,
    pub last_status_update_notes: Option<String>,
}

/// A validated issue ready for insertion. The store assigns `id`,
/// timestamps and the initial status.
#[derive(Debug, Clone)]
pub struct NewIssue {
    pub image_reference: String,
    pub category: String,
    pub location: Location,
    pub description: Option<String>,
    pub issue_date: DateTime<Utc>,
}

/// Parse a caller-supplied issue identifier.
pub fn parse_issue_id(raw: &str) -> Result<Uuid, IssueError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(IssueError::validation("Issue ID is required"));
    }
    Uuid::parse_str(raw).map_err(|_| IssueError::validation("Invalid issue ID format"))
}

/// Parse a caller-supplied status label; blank counts as missing.
pub fn parse_status(raw: Option<&str>) -> Result<IssueStatus, IssueError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(label) => IssueStatus::from_str(label).map_err(IssueError::Validation),
        None => Err(IssueError::validation("Status is required")),
    }
}

/// Trim and drop empty optional text.
pub(crate) fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
