//! Read-only issue retrieval shared by citizen and repair-team routes.
//!
//! Every call runs a fresh query; results are ordered newest first.

use tracing::debug;

use super::db::DbHandle;
use super::models::{Issue, parse_issue_id};
use crate::errors::IssueError;

#[derive(Clone)]
pub struct QueryService {
    db: DbHandle,
}

impl QueryService {
    pub fn new(db: DbHandle) -> Self {
        Self { db }
    }

    pub async fn list_all(&self) -> Result<Vec<Issue>, IssueError> {
        let issues = self.db.call(|db| db.list_issues()).await?;
        debug!(count = issues.len(), "listed issues");
        Ok(issues)
    }

    pub async fn get_by_id(&self, id: &str) -> Result<Issue, IssueError> {
        let id = parse_issue_id(id)?;
        self.db
            .call(move |db| db.get_issue(id))
            .await?
            .ok_or_else(|| IssueError::IssueNotFound { id: id.to_string() })
    }

    /// Case-insensitive substring match on the category.
    pub async fn find_by_category(&self, needle: &str) -> Result<Vec<Issue>, IssueError> {
        let needle = required_needle(needle, "Category is required!")?;
        Ok(self.db.call(move |db| db.find_by_category(&needle)).await?)
    }

    /// Case-insensitive substring match on city or specific area.
    pub async fn find_by_location(&self, needle: &str) -> Result<Vec<Issue>, IssueError> {
        let needle = required_needle(needle, "Location is required!")?;
        Ok(self.db.call(move |db| db.find_by_location(&needle)).await?)
    }
}

fn required_needle(needle: &str, message: &str) -> Result<String, IssueError> {
    let needle = needle.trim();
    if needle.is_empty() {
        return Err(IssueError::validation(message));
    }
    Ok(needle.to_string())
}
