//! Citizen-side issue creation.
//!
//! Validation runs to completion before anything is written. The write is a
//! two-step saga: store the image, then persist the issue; if the second step
//! fails the stored image is removed again so no orphan is left behind.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use tracing::{error, info, warn};

use super::blob::BlobStore;
use super::db::DbHandle;
use super::models::{Issue, Location, NewIssue, non_blank};
use crate::errors::{ImageRejection, IssueError};

pub const MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;
pub const ALLOWED_MEDIA_TYPES: [&str; 3] = ["image/jpeg", "image/png", "image/gif"];
pub const ALLOWED_EXTENSIONS: [&str; 4] = [".jpeg", ".jpg", ".png", ".gif"];

/// One uploaded file as declared by the client.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub filename: String,
    pub media_type: String,
    pub bytes: Vec<u8>,
}

/// Raw text fields of a submission, exactly as received.
#[derive(Debug, Clone, Default)]
pub struct IssueSubmission {
    pub category: Option<String>,
    pub city: Option<String>,
    pub specific_address: Option<String>,
    pub description: Option<String>,
    pub issue_date: Option<String>,
}

/// Image acceptance policy: media type and extension must both be allowed.
#[derive(Debug, Clone)]
pub struct ImagePolicy {
    pub max_bytes: usize,
}

impl Default for ImagePolicy {
    fn default() -> Self {
        Self {
            max_bytes: MAX_IMAGE_BYTES,
        }
    }
}

impl ImagePolicy {
    pub fn too_large_message(&self) -> String {
        format!(
            "File too large. Maximum size is {}MB.",
            self.max_bytes / (1024 * 1024)
        )
    }

    pub fn check(&self, upload: &ImageUpload) -> Result<(), IssueError> {
        let extension = Path::new(&upload.filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| format!(".{}", e.to_ascii_lowercase()))
            .unwrap_or_default();
        let media_type = upload.media_type.trim().to_ascii_lowercase();

        let media_type_rejected = !ALLOWED_MEDIA_TYPES.contains(&media_type.as_str());
        let extension_rejected = !ALLOWED_EXTENSIONS.contains(&extension.as_str());

        if media_type_rejected || extension_rejected {
            let rejection = ImageRejection {
                filename: upload.filename.clone(),
                media_type: upload.media_type.clone(),
                extension,
                media_type_rejected,
                extension_rejected,
                allowed_media_types: ALLOWED_MEDIA_TYPES.iter().map(|s| s.to_string()).collect(),
                allowed_extensions: ALLOWED_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
            };
            warn!(
                filename = %rejection.filename,
                media_type = %rejection.media_type,
                ext = %rejection.extension,
                reason = %rejection,
                "image rejected"
            );
            return Err(IssueError::ImageRejected(rejection));
        }
        if upload.bytes.is_empty() {
            return Err(IssueError::validation("Image is empty"));
        }
        if upload.bytes.len() > self.max_bytes {
            return Err(IssueError::validation(self.too_large_message()));
        }
        Ok(())
    }
}

/// Parse the citizen-supplied date: RFC 3339 or a bare `YYYY-MM-DD`
/// (taken as midnight UTC). Precision is cut to microseconds to match
/// what the store keeps.
pub fn parse_issue_date(raw: &str) -> Result<DateTime<Utc>, IssueError> {
    let raw = raw.trim();
    let parsed = DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|dt| dt.and_utc())
        })
        .and_then(|dt| DateTime::from_timestamp_micros(dt.timestamp_micros()));
    parsed.ok_or_else(|| {
        IssueError::validation(format!(
            "Invalid issue date '{}'. Expected YYYY-MM-DD or an RFC 3339 timestamp",
            raw
        ))
    })
}

pub struct IngestionService {
    db: DbHandle,
    blobs: Arc<dyn BlobStore>,
    policy: ImagePolicy,
}

impl IngestionService {
    pub fn new(db: DbHandle, blobs: Arc<dyn BlobStore>, policy: ImagePolicy) -> Self {
        Self { db, blobs, policy }
    }

    pub fn policy(&self) -> &ImagePolicy {
        &self.policy
    }

    /// Validate a submission, store its image, persist the issue.
    pub async fn submit_issue(
        &self,
        submission: IssueSubmission,
        mut images: Vec<ImageUpload>,
    ) -> Result<Issue, IssueError> {
        let category = non_blank(submission.category.as_deref());
        let city = non_blank(submission.city.as_deref());
        let (Some(category), Some(city)) = (category, city) else {
            return Err(IssueError::validation(
                "Please enter the category and the city where the issue is located!",
            ));
        };

        let image = match images.len() {
            0 => return Err(IssueError::validation("Image is required!")),
            1 => images.remove(0),
            n => {
                return Err(IssueError::validation(format!(
                    "Exactly one image is allowed per submission, got {}",
                    n
                )));
            }
        };
        self.policy.check(&image)?;

        let issue_date = match submission.issue_date.as_deref() {
            Some(raw) if !raw.trim().is_empty() => parse_issue_date(raw)?,
            _ => return Err(IssueError::validation("Issue date is required")),
        };

        let image_reference = self
            .blobs
            .store(image.bytes, &image.media_type, &image.filename)
            .await?;

        let new_issue = NewIssue {
            image_reference: image_reference.clone(),
            category,
            location: Location {
                city,
                specific_area: non_blank(submission.specific_address.as_deref()),
            },
            description: non_blank(submission.description.as_deref()),
            issue_date,
        };

        match self.db.call(move |db| db.insert_issue(&new_issue)).await {
            Ok(issue) => {
                info!(issue_id = %issue.id, category = %issue.category, "issue submitted");
                Ok(issue)
            }
            Err(e) => {
                error!(error = %format!("{:#}", e), %image_reference, "failed to persist issue");
                if let Err(cleanup) = self.blobs.remove(&image_reference).await {
                    warn!(
                        error = %cleanup,
                        %image_reference,
                        "failed to remove image after persist failure"
                    );
                }
                Err(IssueError::Storage(e))
            }
        }
    }
}
