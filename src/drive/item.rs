//! Drive item metadata as returned by the Graph API

use serde::{Deserialize, Serialize};

/// Kind of drive item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    File,
    Folder,
}

/// Content hashes reported for a file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Hashes {
    #[serde(rename = "sha1Hash", default, skip_serializing_if = "Option::is_none")]
    pub sha1: Option<String>,
    #[serde(rename = "sha256Hash", default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    #[serde(rename = "quickXorHash", default, skip_serializing_if = "Option::is_none")]
    pub quick_xor: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileFacet {
    #[serde(rename = "mimeType", default)]
    pub mime_type: String,
    #[serde(default)]
    pub hashes: Hashes,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FolderFacet {
    #[serde(rename = "childCount", default)]
    pub child_count: u64,
}

/// A file or folder in the drive
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriveItem {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<FileFacet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder: Option<FolderFacet>,
    /// Short-lived pre-authenticated content URL
    #[serde(
        rename = "@microsoft.graph.downloadUrl",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub download_url: Option<String>,
    #[serde(rename = "webUrl", default, skip_serializing_if = "Option::is_none")]
    pub web_url: Option<String>,
}

impl DriveItem {
    pub fn kind(&self) -> ItemKind {
        if self.file.is_some() {
            ItemKind::File
        } else {
            ItemKind::Folder
        }
    }

    pub fn is_folder(&self) -> bool {
        self.kind() == ItemKind::Folder
    }

    pub fn mime_type(&self) -> &str {
        self.file.as_ref().map(|f| f.mime_type.as_str()).unwrap_or("")
    }

    pub fn hashes(&self) -> Hashes {
        self.file.as_ref().map(|f| f.hashes.clone()).unwrap_or_default()
    }
}

/// One page of a children or search listing
#[derive(Debug, Deserialize)]
pub(crate) struct ItemPage {
    #[serde(default)]
    pub value: Vec<DriveItem>,
    #[serde(rename = "@odata.nextLink", default)]
    pub next_link: Option<String>,
}
