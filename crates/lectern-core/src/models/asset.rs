use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;

/// Rendering lifecycle of an asset.
///
/// Secure-path assets are created in `Processing` and moved to `Completed` or
/// `Failed` by the render worker; direct-publish assets are created directly
/// in `Completed`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "render_status", rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum RenderStatus {
    Processing,
    Completed,
    Failed,
}

impl Display for RenderStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            RenderStatus::Processing => write!(f, "processing"),
            RenderStatus::Completed => write!(f, "completed"),
            RenderStatus::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for RenderStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "processing" => Ok(RenderStatus::Processing),
            "completed" => Ok(RenderStatus::Completed),
            "failed" => Ok(RenderStatus::Failed),
            _ => Err(anyhow::anyhow!("Invalid render status: {}", s)),
        }
    }
}

/// Content kind carried by an asset. Only `Document` flows through this
/// service; `Video` exists because containers hold both and the ordering
/// index spans them.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "asset_kind", rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum AssetKind {
    Document,
    Video,
}

impl Display for AssetKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            AssetKind::Document => write!(f, "document"),
            AssetKind::Video => write!(f, "video"),
        }
    }
}

impl FromStr for AssetKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "document" => Ok(AssetKind::Document),
            "video" => Ok(AssetKind::Video),
            _ => Err(anyhow::anyhow!("Invalid asset kind: {}", s)),
        }
    }
}

/// Durable record describing one uploaded document and its rendering
/// lifecycle. This row is the contract the rest of the product reads.
///
/// Invariants, enforced by the repositories:
/// - `storage_key` is non-empty iff `render_status == Completed`
/// - `page_count > 0` only when `Completed`
/// - an asset with `is_secure == false` never enters the render queue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Asset {
    pub id: Uuid,
    pub container_id: Uuid,
    pub title: String,
    pub display_name: Option<String>,
    pub kind: AssetKind,
    pub storage_key: String,
    pub render_status: RenderStatus,
    pub is_secure: bool,
    pub page_count: i32,
    pub position: i32,
    pub failure_code: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Asset {
    /// Whether readers may stream this asset. Anything not `Completed` is
    /// "locked", not an error.
    pub fn is_available(&self) -> bool {
        self.render_status == RenderStatus::Completed
    }

    /// Name presented to readers on download; falls back to the original title.
    pub fn download_name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.title)
    }
}

/// Fields required to create an asset row. `storage_key` stays empty and
/// `page_count` zero until the render worker completes (secure path), or is
/// set immediately (direct-publish path). The ordering index is assigned by
/// the store (next slot in the container).
#[derive(Debug, Clone)]
pub struct NewAsset {
    pub container_id: Uuid,
    pub title: String,
    pub kind: AssetKind,
    pub storage_key: String,
    pub render_status: RenderStatus,
    pub is_secure: bool,
    pub page_count: i32,
}

/// Asset shape returned by the API.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AssetResponse {
    pub id: Uuid,
    pub container_id: Uuid,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    pub kind: AssetKind,
    pub render_status: RenderStatus,
    pub is_secure: bool,
    pub page_count: i32,
    pub position: i32,
    pub created_at: DateTime<Utc>,
}

impl From<Asset> for AssetResponse {
    fn from(asset: Asset) -> Self {
        AssetResponse {
            id: asset.id,
            container_id: asset.container_id,
            title: asset.title,
            display_name: asset.display_name,
            kind: asset.kind,
            render_status: asset.render_status,
            is_secure: asset.is_secure,
            page_count: asset.page_count,
            position: asset.position,
            created_at: asset.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_asset(status: RenderStatus) -> Asset {
        Asset {
            id: Uuid::new_v4(),
            container_id: Uuid::new_v4(),
            title: "lecture-03.docx".to_string(),
            display_name: None,
            kind: AssetKind::Document,
            storage_key: String::new(),
            render_status: status,
            is_secure: true,
            page_count: 0,
            position: 0,
            failure_code: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_render_status_roundtrip() {
        for status in [
            RenderStatus::Processing,
            RenderStatus::Completed,
            RenderStatus::Failed,
        ] {
            assert_eq!(status.to_string().parse::<RenderStatus>().unwrap(), status);
        }
        assert!("queued".parse::<RenderStatus>().is_err());
    }

    #[test]
    fn test_asset_kind_roundtrip() {
        assert_eq!("document".parse::<AssetKind>().unwrap(), AssetKind::Document);
        assert_eq!(AssetKind::Video.to_string(), "video");
        assert!("audio".parse::<AssetKind>().is_err());
    }

    #[test]
    fn test_processing_asset_is_not_available() {
        assert!(!sample_asset(RenderStatus::Processing).is_available());
        assert!(!sample_asset(RenderStatus::Failed).is_available());
        assert!(sample_asset(RenderStatus::Completed).is_available());
    }

    #[test]
    fn test_download_name_falls_back_to_title() {
        let mut asset = sample_asset(RenderStatus::Completed);
        assert_eq!(asset.download_name(), "lecture-03.docx");
        asset.display_name = Some("lecture-03.pdf".to_string());
        assert_eq!(asset.download_name(), "lecture-03.pdf");
    }

    #[test]
    fn test_asset_response_from_asset() {
        let asset = sample_asset(RenderStatus::Completed);
        let id = asset.id;
        let response = AssetResponse::from(asset);
        assert_eq!(response.id, id);
        assert_eq!(response.render_status, RenderStatus::Completed);
        assert!(response.is_secure);
    }
}
