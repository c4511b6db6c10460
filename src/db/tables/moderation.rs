//! Moderation-related database table definitions.

use serde::Serialize;
use sqlx::FromRow;

use super::serialize_as_i32;

/// `report_type` discriminant for reports against an app.
pub const REPORT_TYPE_APP: i64 = 1;
/// `report_type` discriminant for reports against a comment.
pub const REPORT_TYPE_COMMENT: i64 = 2;

/// A report moves from `Open` to `Resolved` exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[repr(i32)]
pub enum ReportStatus {
    Open = 0,
    Resolved = 1,
}

serialize_as_i32!(ReportStatus);

impl TryFrom<i32> for ReportStatus {
    type Error = i32;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Open),
            1 => Ok(Self::Resolved),
            other => Err(other),
        }
    }
}

/// What a report is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum ReportTarget {
    App(i64),
    Comment(i64),
    /// A type tag this service does not know how to act on.
    Unknown { report_type: i64, id: i64 },
}

impl ReportTarget {
    pub const fn from_columns(report_type: i64, id: i64) -> Self {
        match report_type {
            REPORT_TYPE_APP => Self::App(id),
            REPORT_TYPE_COMMENT => Self::Comment(id),
            report_type => Self::Unknown { report_type, id },
        }
    }
}

/// A row from the `report` table.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Report {
    pub id: i64,
    /// The reporting user.
    pub by_user_id: i64,
    pub report_type: i64,
    /// Id of the reported app or comment, per `report_type`.
    pub report_id: i64,
    pub report_title: String,
    pub report_content: String,
    pub report_status: ReportStatus,
    pub report_reply: String,
    pub reply_time: i64,
    pub report_time: i64,
}

impl Report {
    pub const fn target(&self) -> ReportTarget {
        ReportTarget::from_columns(self.report_type, self.report_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_decodes_type_tag() {
        assert_eq!(ReportTarget::from_columns(1, 42), ReportTarget::App(42));
        assert_eq!(ReportTarget::from_columns(2, 9), ReportTarget::Comment(9));
        assert_eq!(
            ReportTarget::from_columns(5, 9),
            ReportTarget::Unknown {
                report_type: 5,
                id: 9
            }
        );
    }

    #[test]
    fn statuses_serialize_as_integers() {
        assert_eq!(serde_json::to_string(&ReportStatus::Resolved).unwrap(), "1");
    }
}
