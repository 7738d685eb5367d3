//! OneDrive Graph API client
//!
//! Every call except the upload-session range PUTs and pre-signed download
//! URLs carries a bearer token obtained from the [`TokenManager`] right
//! before the request is sent.

use std::sync::Arc;

use bytes::Bytes;
use serde::Deserialize;
use tracing::{debug, info};

use crate::auth::TokenManager;
use crate::drive::item::{DriveItem, ItemPage};
use crate::error::DriveError;
use crate::transport::{HttpRequest, HttpResponse, HttpTransport, StreamingResponse};

/// Microsoft Graph v1.0 base URL
pub const GRAPH_URL: &str = "https://graph.microsoft.com/v1.0/";

/// Outcome of one range PUT against an upload session
#[derive(Debug, Clone)]
pub enum ChunkAck {
    /// 202: the session expects more bytes
    Accepted,
    /// 200/201: the file is assembled
    Completed(Option<DriveItem>),
}

#[derive(Debug, Deserialize)]
struct UploadSessionResponse {
    #[serde(rename = "uploadUrl")]
    upload_url: String,
}

#[derive(Debug, Deserialize)]
struct ShareLink {
    #[serde(rename = "webUrl")]
    web_url: String,
}

#[derive(Debug, Deserialize)]
struct ShareResponse {
    link: ShareLink,
}

/// Normalize a user-supplied remote path to `/a/b` form.
pub fn normalize_path(path: &str) -> Result<String, DriveError> {
    if path.starts_with('.') {
        return Err(DriveError::validation_error_with_field(
            "invalid path (should start with /)",
            "path",
        ));
    }
    let trimmed = path.trim_end_matches('/');
    if trimmed.starts_with('/') {
        Ok(trimmed.to_string())
    } else {
        Ok(format!("/{}", trimmed))
    }
}

/// Join a remote directory and a file name
pub fn join_remote(dir: &str, name: &str) -> Result<String, DriveError> {
    let dir = normalize_path(dir)?;
    if dir == "/" {
        Ok(format!("/{}", name))
    } else {
        Ok(format!("{}/{}", dir, name))
    }
}

fn encode_path(path: &str) -> String {
    path.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Authenticated client for the signed-in user's drive
pub struct DriveClient {
    transport: Arc<dyn HttpTransport>,
    tokens: Arc<TokenManager>,
    graph_url: String,
    root: String,
}

impl DriveClient {
    /// Create a client rooted at `root` (e.g. `/drive/root`)
    pub fn new(transport: Arc<dyn HttpTransport>, tokens: Arc<TokenManager>, root: impl Into<String>) -> Self {
        Self {
            transport,
            tokens,
            graph_url: GRAPH_URL.to_string(),
            root: root.into(),
        }
    }

    /// Point the client at a different Graph endpoint
    pub fn with_graph_url(mut self, graph_url: impl Into<String>) -> Self {
        self.graph_url = graph_url.into();
        self
    }

    pub fn tokens(&self) -> &Arc<TokenManager> {
        &self.tokens
    }

    pub fn transport(&self) -> &Arc<dyn HttpTransport> {
        &self.transport
    }

    /// URL addressing the item at `path`
    pub fn item_url(&self, path: &str) -> Result<String, DriveError> {
        let path = normalize_path(path)?;
        if path == "/" {
            Ok(format!("{}me{}", self.graph_url, self.root))
        } else {
            Ok(format!("{}me{}:{}", self.graph_url, self.root, encode_path(&path)))
        }
    }

    /// URL addressing `action` (children, content, …) on the item at `path`
    pub fn item_action_url(&self, path: &str, action: &str) -> Result<String, DriveError> {
        let path = normalize_path(path)?;
        if path == "/" {
            Ok(format!("{}me{}/{}", self.graph_url, self.root, action))
        } else {
            Ok(format!("{}me{}:{}:/{}", self.graph_url, self.root, encode_path(&path), action))
        }
    }

    /// Send a request with a freshly validated bearer token
    pub async fn send(&self, request: HttpRequest) -> Result<HttpResponse, DriveError> {
        let token = self.tokens.ensure_valid().await?;
        self.transport.execute(request.bearer(&token)).await
    }

    /// Metadata of the item at `path`
    pub async fn info(&self, path: &str) -> Result<DriveItem, DriveError> {
        let response = self.send(HttpRequest::get(self.item_url(path)?)).await?;
        if !response.is_success() {
            return Err(response.error_for(path));
        }
        response.json()
    }

    /// Children of the folder at `path`, following pagination
    pub async fn list(&self, path: &str) -> Result<Vec<DriveItem>, DriveError> {
        self.collect_pages(self.item_action_url(path, "children")?, path).await
    }

    /// Search the whole drive
    pub async fn search(&self, query: &str) -> Result<Vec<DriveItem>, DriveError> {
        let escaped = query.replace('\'', "''");
        let url = format!(
            "{}me/drive/root/search(q='{}')",
            self.graph_url,
            urlencoding::encode(&escaped)
        );
        self.collect_pages(url, query).await
    }

    async fn collect_pages(&self, first: String, path: &str) -> Result<Vec<DriveItem>, DriveError> {
        let mut items = Vec::new();
        let mut next = Some(first);
        while let Some(url) = next {
            let response = self.send(HttpRequest::get(url)).await?;
            if !response.is_success() {
                return Err(response.error_for(path));
            }
            let page: ItemPage = response.json()?;
            debug!("Fetched {} items", page.value.len());
            items.extend(page.value);
            next = page.next_link;
        }
        Ok(items)
    }

    /// Create a folder; its parent must exist
    pub async fn create_dir(&self, path: &str) -> Result<DriveItem, DriveError> {
        let path = normalize_path(path)?;
        let (parent, name) = match path.rsplit_once('/') {
            Some((parent, name)) if !name.is_empty() => (if parent.is_empty() { "/" } else { parent }, name),
            _ => return Err(DriveError::validation_error_with_field("cannot create the root folder", "path")),
        };

        let request = HttpRequest::post(self.item_action_url(parent, "children")?).json(serde_json::json!({
            "name": name,
            "folder": {},
            "@microsoft.graph.conflictBehavior": "fail"
        }));
        let response = self.send(request).await?;
        if !response.is_success() {
            return Err(response.error_for(&path));
        }
        info!("Created folder {}", path);
        response.json()
    }

    /// Delete the item at `path`
    pub async fn delete(&self, path: &str) -> Result<(), DriveError> {
        let response = self.send(HttpRequest::delete(self.item_url(path)?)).await?;
        if !response.is_success() {
            return Err(response.error_for(path));
        }
        info!("Deleted {}", path);
        Ok(())
    }

    /// Create an anonymous view link and return its URL
    pub async fn share(&self, path: &str) -> Result<String, DriveError> {
        let request = HttpRequest::post(self.item_action_url(path, "createLink")?)
            .json(serde_json::json!({"type": "view", "scope": "anonymous"}));
        let response = self.send(request).await?;
        if !response.is_success() {
            return Err(response.error_for(path));
        }
        let share: ShareResponse = response.json()?;
        Ok(share.link.web_url)
    }

    /// Open a large-file upload session for `remote_path`, replacing any existing item
    pub async fn create_upload_session(&self, remote_path: &str) -> Result<String, DriveError> {
        let request = HttpRequest::post(self.item_action_url(remote_path, "createUploadSession")?).json(
            serde_json::json!({"item": {"@microsoft.graph.conflictBehavior": "replace"}}),
        );
        let response = self.send(request).await?;
        if !response.is_success() {
            return Err(response.error_for(remote_path));
        }
        let session: UploadSessionResponse = response.json()?;
        debug!("Upload session for {}: {}", remote_path, session.upload_url);
        Ok(session.upload_url)
    }

    /// Single-request upload, used for empty files
    pub async fn upload_small(&self, remote_path: &str, data: Bytes) -> Result<DriveItem, DriveError> {
        let request = HttpRequest::put(self.item_action_url(remote_path, "content")?)
            .header("Content-Type", "application/octet-stream")
            .bytes(data);
        let response = self.send(request).await?;
        if !response.is_success() {
            return Err(response.error_for(remote_path));
        }
        response.json()
    }

    /// PUT one byte range to an upload session.
    ///
    /// The session URL is pre-authorized and must not carry a bearer token.
    pub async fn put_range(&self, upload_url: &str, chunk: Bytes, offset: u64, total: u64) -> Result<ChunkAck, DriveError> {
        let end = offset + chunk.len() as u64 - 1;
        let request = HttpRequest::put(upload_url)
            .header("Content-Range", format!("bytes {}-{}/{}", offset, end, total))
            .bytes(chunk);

        let response = self.transport.execute(request).await?;
        match response.status {
            202 => Ok(ChunkAck::Accepted),
            200 | 201 => Ok(ChunkAck::Completed(response.json().ok())),
            _ => Err(response.error_for(upload_url)),
        }
    }

    /// Start streaming the content of `item`, located at `path`
    pub async fn open_download(&self, path: &str, item: &DriveItem) -> Result<StreamingResponse, DriveError> {
        let request = match &item.download_url {
            Some(url) => HttpRequest::get(url.as_str()),
            None => {
                let token = self.tokens.ensure_valid().await?;
                HttpRequest::get(self.item_action_url(path, "content")?).bearer(&token)
            }
        };

        let response = self.transport.stream(request).await?;
        if !response.is_success() {
            let status = response.status;
            let body = response.into_text().await;
            return Err(DriveError::from_status(status, body, None, path));
        }
        Ok(response)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::auth::token::tests::test_app;
    use crate::auth::{Credential, MemoryStore};
    use crate::transport::mock::MockTransport;
    use crate::transport::Method;
    use chrono::{Duration, Utc};
    use serde_json::json;

    pub(crate) fn valid_credential() -> Credential {
        Credential::new("token", "refresh", Utc::now() + Duration::hours(1))
    }

    pub(crate) fn client_with(transport: Arc<MockTransport>, credential: Credential) -> DriveClient {
        let store = Arc::new(MemoryStore::new(credential.clone()));
        let tokens = Arc::new(TokenManager::new(
            test_app(),
            transport.clone(),
            store,
            credential,
            Duration::seconds(60),
        ));
        DriveClient::new(transport, tokens, "/drive/root")
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("Documents/").unwrap(), "/Documents");
        assert_eq!(normalize_path("/").unwrap(), "/");
        assert_eq!(normalize_path("").unwrap(), "/");
        assert!(normalize_path("./local").is_err());
        assert_eq!(join_remote("/", "a.txt").unwrap(), "/a.txt");
        assert_eq!(join_remote("/Backups/", "a.txt").unwrap(), "/Backups/a.txt");
    }

    #[test]
    fn test_item_urls() {
        let client = client_with(Arc::new(MockTransport::new()), valid_credential());
        assert_eq!(client.item_url("/").unwrap(), "https://graph.microsoft.com/v1.0/me/drive/root");
        assert_eq!(
            client.item_url("/My Files/a#1.txt").unwrap(),
            "https://graph.microsoft.com/v1.0/me/drive/root:/My%20Files/a%231.txt"
        );
        assert_eq!(
            client.item_action_url("/", "children").unwrap(),
            "https://graph.microsoft.com/v1.0/me/drive/root/children"
        );
        assert_eq!(
            client.item_action_url("/Docs", "createUploadSession").unwrap(),
            "https://graph.microsoft.com/v1.0/me/drive/root:/Docs:/createUploadSession"
        );
    }

    #[tokio::test]
    async fn test_info_not_found() {
        let transport = Arc::new(MockTransport::new().reply(HttpResponse::new(404, r#"{"error":{}}"#)));
        let client = client_with(transport.clone(), valid_credential());

        let err = client.info("/missing.txt").await.unwrap_err();
        assert!(matches!(err, DriveError::NotFoundError { .. }));
        assert_eq!(transport.requests()[0].header_value("Authorization"), Some("Bearer token"));
    }

    #[tokio::test]
    async fn test_list_follows_next_link() {
        let transport = Arc::new(
            MockTransport::new()
                .reply_json(200, json!({
                    "value": [{"name": "a", "folder": {"childCount": 0}}],
                    "@odata.nextLink": "https://graph.microsoft.com/v1.0/next-page"
                }))
                .reply_json(200, json!({"value": [{"name": "b.txt", "size": 3, "file": {"mimeType": "text/plain"}}]})),
        );
        let client = client_with(transport.clone(), valid_credential());

        let items = client.list("/").await.unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[1].name, "b.txt");
        assert_eq!(transport.requests()[1].url, "https://graph.microsoft.com/v1.0/next-page");
    }

    #[tokio::test]
    async fn test_create_dir_posts_to_parent() {
        let transport = Arc::new(MockTransport::new().reply_json(201, json!({"name": "New", "folder": {}})));
        let client = client_with(transport.clone(), valid_credential());

        client.create_dir("/Docs/New").await.unwrap();
        let request = &transport.requests()[0];
        assert_eq!(request.method, Method::Post);
        assert!(request.url.ends_with("root:/Docs:/children"));
    }

    #[tokio::test]
    async fn test_share_returns_web_url() {
        let transport = Arc::new(
            MockTransport::new().reply_json(200, json!({"link": {"webUrl": "https://1drv.ms/x"}})),
        );
        let client = client_with(transport, valid_credential());
        assert_eq!(client.share("/a.txt").await.unwrap(), "https://1drv.ms/x");
    }

    #[tokio::test]
    async fn test_put_range_has_no_bearer() {
        let transport = Arc::new(MockTransport::new().reply(HttpResponse::new(202, "{}")));
        let client = client_with(transport.clone(), valid_credential());

        let ack = client
            .put_range("https://upload.example/s", Bytes::from_static(b"abcd"), 4, 10)
            .await
            .unwrap();
        assert!(matches!(ack, ChunkAck::Accepted));

        let request = &transport.requests()[0];
        assert_eq!(request.header_value("Content-Range"), Some("bytes 4-7/10"));
        assert_eq!(request.header_value("Authorization"), None);
    }

    #[tokio::test]
    async fn test_delete() {
        let transport = Arc::new(MockTransport::new().reply(HttpResponse::new(204, "")));
        let client = client_with(transport.clone(), valid_credential());
        client.delete("/old.txt").await.unwrap();
        assert_eq!(transport.count(Method::Delete, "old.txt"), 1);
    }
}
