//! App listing table definitions.

use serde::Serialize;
use sqlx::{FromRow, types::Json};

use super::serialize_as_i32;

/// Review status shared by apps and their download mirrors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[repr(i32)]
pub enum AuditStatus {
    Pending = 0,
    Approved = 1,
    Rejected = 2,
}

serialize_as_i32!(AuditStatus);

impl TryFrom<i32> for AuditStatus {
    type Error = i32;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Pending),
            1 => Ok(Self::Approved),
            2 => Ok(Self::Rejected),
            other => Err(other),
        }
    }
}

/// Distinguishes the system-generated mirror from user-supplied alternates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[repr(i32)]
pub enum MirrorKind {
    Alternate = 0,
    /// Points at the canonically uploaded artifact; created with the app.
    Primary = 1,
}

serialize_as_i32!(MirrorKind);

/// A row from the `app` table.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct App {
    pub id: i64,
    /// Immutable after creation.
    pub package_name: String,
    pub app_name: String,
    pub keyword: String,
    pub version_code: i64,
    pub version_name: String,
    pub icon_path: String,
    pub by_user_id: i64,
    pub app_type_id: i64,
    pub app_version_type_id: i64,
    pub app_abi: i64,
    pub app_tags: String,
    pub previews: Json<Vec<String>>,
    pub description: String,
    pub update_log: String,
    pub developer: String,
    pub source: String,
    pub upload_message: String,
    pub sdk_min: i64,
    pub sdk_target: i64,
    pub download_size: i64,
    pub apk_path: String,
    pub audit_status: AuditStatus,
    pub audit_reason: String,
    pub audit_user: i64,
    pub upload_time: i64,
    pub update_time: i64,
}

/// A row from the `app_download` table.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct AppDownload {
    pub id: i64,
    pub app_id: i64,
    pub name: String,
    pub url: String,
    pub is_extra: MirrorKind,
    pub audit_status: AuditStatus,
}

/// A row from the `content_page` table.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ContentPage {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub img_list: Json<Vec<String>>,
    pub has_app_list: bool,
    pub show_in_list: bool,
    pub time: i64,
}

/// A row from the `app_comment` table.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Comment {
    pub id: i64,
    pub app_id: i64,
    pub by_user_id: i64,
    pub father_reply_id: i64,
    pub content: String,
    pub visibility: bool,
    pub send_time: i64,
}
