//! Repair-team mutations of an issue's lifecycle.
//!
//! Load, check and replace happen inside one store call so a rejected write
//! never touches the stored document.

use tracing::info;
use uuid::Uuid;

use super::db::DbHandle;
use super::models::{Issue, IssueStatus, non_blank, parse_issue_id, parse_status};
use crate::errors::IssueError;

#[derive(Clone)]
pub struct StatusTransitionService {
    db: DbHandle,
}

impl StatusTransitionService {
    pub fn new(db: DbHandle) -> Self {
        Self { db }
    }

    /// Move an issue to `new_status`. Non-blank `notes` replace the previous
    /// update notes; absent notes leave them as they were.
    pub async fn update_status(
        &self,
        id: &str,
        new_status: Option<&str>,
        notes: Option<&str>,
    ) -> Result<Issue, IssueError> {
        let id = parse_issue_id(id)?;
        let status = parse_status(new_status)?;
        let notes = non_blank(notes);

        let issue = self
            .apply(id, status, move |issue| {
                issue.status = status;
                if let Some(notes) = notes {
                    issue.last_status_update_notes = Some(notes);
                }
            })
            .await?;
        info!(issue_id = %issue.id, status = %issue.status, "issue status updated");
        Ok(issue)
    }

    /// Team intake: overwrite description and status together. A blank
    /// description clears it.
    pub async fn take_issue(
        &self,
        id: &str,
        description: Option<&str>,
        status: Option<&str>,
    ) -> Result<Issue, IssueError> {
        let id = parse_issue_id(id)?;
        let status = parse_status(status)?;
        let description = non_blank(description);

        let issue = self
            .apply(id, status, move |issue| {
                issue.status = status;
                issue.description = description;
            })
            .await?;
        info!(issue_id = %issue.id, status = %issue.status, "issue taken");
        Ok(issue)
    }

    async fn apply<F>(&self, id: Uuid, target: IssueStatus, mutate: F) -> Result<Issue, IssueError>
    where
        F: FnOnce(&mut Issue) + Send + 'static,
    {
        self.db
            .call(move |db| {
                let mut issue = db
                    .get_issue(id)?
                    .ok_or_else(|| IssueError::IssueNotFound { id: id.to_string() })?;
                if !issue.status.can_transition_to(target) {
                    return Err(IssueError::InvalidTransition {
                        from: issue.status,
                        to: target,
                    });
                }
                mutate(&mut issue);
                db.replace_issue(&issue)?
                    .ok_or_else(|| IssueError::IssueNotFound { id: id.to_string() })
            })
            .await
    }
}
