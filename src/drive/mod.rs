//! OneDrive module
//!
//! REST client for the Graph drive endpoints and the item model.

pub mod client;
pub mod item;

pub use client::{join_remote, normalize_path, ChunkAck, DriveClient, GRAPH_URL};
pub use item::{DriveItem, FileFacet, FolderFacet, Hashes, ItemKind};
