//! Google Drive listing client — lists the folders and files of a shared
//! gallery tree through the public REST v3 API and downloads single images.

pub mod error;
pub mod transport;
pub mod types;

pub use error::DriveError;
pub use transport::DriveTransport;
pub use types::{FetchedImage, RemoteEntry};

use types::FileList;

use async_trait::async_trait;
use tracing::{debug, warn};

/// Default REST endpoint.
pub const DEFAULT_API_BASE_URL: &str = "https://www.googleapis.com/drive/v3";

const CATEGORY_FIELDS: &str = "nextPageToken, files(id, name, mimeType)";
const FILE_FIELDS: &str = "nextPageToken, files(id)";

/// Source of remote gallery listings.
///
/// Listing calls fail as a whole: an error on any page discards the pages
/// already received. `fetch_image` never fails; an image that cannot be
/// downloaded or decoded is reported as `None`.
#[async_trait]
pub trait RemoteListing: Send + Sync {
    /// Every entry directly under the gallery root folder.
    async fn list_categories(&self) -> Result<Vec<RemoteEntry>, DriveError>;

    /// Every entry directly under `parent_id`, ids only.
    async fn list_files(&self, parent_id: &str) -> Result<Vec<RemoteEntry>, DriveError>;

    /// Download and decode one image.
    async fn fetch_image(&self, image_id: &str) -> Option<FetchedImage>;
}

/// Drive-backed [`RemoteListing`].
pub struct DriveClient {
    transport: Box<dyn DriveTransport>,
    base_url: String,
    api_key: String,
    root_folder_id: String,
    page_size: Option<u32>,
}

impl std::fmt::Debug for DriveClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriveClient")
            .field("base_url", &self.base_url)
            .field("root_folder_id", &self.root_folder_id)
            .field("api_key", &"<redacted>")
            .finish_non_exhaustive()
    }
}

impl DriveClient {
    pub fn new(
        transport: Box<dyn DriveTransport>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        root_folder_id: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            root_folder_id: root_folder_id.into(),
            page_size: None,
        }
    }

    /// Request at most `page_size` entries per page. The server default
    /// applies when unset.
    pub fn with_page_size(mut self, page_size: Option<u32>) -> Self {
        self.page_size = page_size;
        self
    }

    /// Follow `nextPageToken` until the listing is exhausted.
    async fn list_children(
        &self,
        parent_id: &str,
        fields: &str,
    ) -> Result<Vec<RemoteEntry>, DriveError> {
        let url = format!("{}/files", self.base_url);
        let q = parents_query(parent_id);
        let page_size = self.page_size.map(|n| n.to_string());

        let mut entries: Vec<RemoteEntry> = Vec::new();
        let mut page_token: Option<String> = None;
        let mut pages = 0u32;

        loop {
            let mut query: Vec<(&str, &str)> = vec![
                ("q", q.as_str()),
                ("fields", fields),
                ("key", self.api_key.as_str()),
            ];
            if let Some(size) = page_size.as_deref() {
                query.push(("pageSize", size));
            }
            if let Some(token) = page_token.as_deref() {
                query.push(("pageToken", token));
            }

            let response = self.transport.get_json(&url, &query).await?;
            let page: FileList = serde_json::from_value(response)?;
            pages += 1;

            debug!(
                parent = %parent_id,
                page = pages,
                count = page.files.len(),
                "Received listing page"
            );

            let next = page.continuation().map(str::to_owned);
            entries.extend(page.files);

            match next {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        Ok(entries)
    }
}

/// Build the `q` filter selecting direct children of `parent_id`.
fn parents_query(parent_id: &str) -> String {
    let escaped = parent_id.replace('\\', "\\\\").replace('\'', "\\'");
    format!("'{escaped}' in parents")
}

/// Decode `bytes` far enough to prove they are a displayable image.
pub fn decode_image(bytes: bytes::Bytes) -> Result<FetchedImage, DriveError> {
    let format = image::guess_format(&bytes)?;
    let decoded = image::load_from_memory_with_format(&bytes, format)?;
    Ok(FetchedImage {
        width: decoded.width(),
        height: decoded.height(),
        format,
        bytes,
    })
}

#[async_trait]
impl RemoteListing for DriveClient {
    async fn list_categories(&self) -> Result<Vec<RemoteEntry>, DriveError> {
        self.list_children(&self.root_folder_id, CATEGORY_FIELDS)
            .await
    }

    async fn list_files(&self, parent_id: &str) -> Result<Vec<RemoteEntry>, DriveError> {
        self.list_children(parent_id, FILE_FIELDS).await
    }

    async fn fetch_image(&self, image_id: &str) -> Option<FetchedImage> {
        let url = format!("{}/files/{}", self.base_url, image_id);
        let query = [("alt", "media"), ("key", self.api_key.as_str())];

        let bytes = match self.transport.get_bytes(&url, &query).await {
            Ok(b) => b,
            Err(e) => {
                warn!(image_id = %image_id, error = %e, "Image download failed");
                return None;
            }
        };

        match decode_image(bytes) {
            Ok(image) => Some(image),
            Err(e) => {
                warn!(image_id = %image_id, error = %e, "Image bytes did not decode");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use bytes::Bytes;
    use serde_json::{json, Value};

    /// Serves queued responses in order and records every request's query.
    #[derive(Default)]
    struct ScriptedTransport {
        pages: Mutex<VecDeque<Result<Value, DriveError>>>,
        body: Mutex<Option<Result<Bytes, DriveError>>>,
        requests: Mutex<Vec<Vec<(String, String)>>>,
    }

    impl ScriptedTransport {
        fn with_pages(pages: Vec<Result<Value, DriveError>>) -> Self {
            Self {
                pages: Mutex::new(pages.into()),
                ..Default::default()
            }
        }

        fn with_body(body: Result<Bytes, DriveError>) -> Self {
            Self {
                body: Mutex::new(Some(body)),
                ..Default::default()
            }
        }
    }

    fn record(query: &[(&str, &str)]) -> Vec<(String, String)> {
        query
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[async_trait]
    impl DriveTransport for std::sync::Arc<ScriptedTransport> {
        async fn get_json(&self, _url: &str, query: &[(&str, &str)]) -> Result<Value, DriveError> {
            self.requests.lock().unwrap().push(record(query));
            self.pages
                .lock()
                .unwrap()
                .pop_front()
                .expect("unexpected extra page request")
        }

        async fn get_bytes(&self, _url: &str, query: &[(&str, &str)]) -> Result<Bytes, DriveError> {
            self.requests.lock().unwrap().push(record(query));
            self.body
                .lock()
                .unwrap()
                .take()
                .expect("unexpected download request")
        }
    }

    fn client(transport: &std::sync::Arc<ScriptedTransport>) -> DriveClient {
        DriveClient::new(
            Box::new(transport.clone()),
            "https://drive.test/v3/",
            "KEY",
            "ROOT",
        )
    }

    fn param<'a>(request: &'a [(String, String)], key: &str) -> Option<&'a str> {
        request
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    fn not_found() -> DriveError {
        DriveError::HttpStatus {
            status: 404,
            url: "/v3/files".into(),
        }
    }

    #[tokio::test]
    async fn test_pagination_accumulates_in_page_order() {
        let transport = std::sync::Arc::new(ScriptedTransport::with_pages(vec![
            Ok(json!({"files": [{"id": "a"}, {"id": "b"}], "nextPageToken": "T"})),
            Ok(json!({"files": [{"id": "c"}], "nextPageToken": null})),
        ]));

        let entries = client(&transport).list_categories().await.unwrap();
        let ids: Vec<&str> = entries.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, ["a", "b", "c"]);

        let requests = transport.requests.lock().unwrap();
        assert_eq!(requests.len(), 2);
        assert_eq!(param(&requests[0], "pageToken"), None);
        assert_eq!(param(&requests[1], "pageToken"), Some("T"));
    }

    #[tokio::test]
    async fn test_category_listing_query() {
        let transport = std::sync::Arc::new(ScriptedTransport::with_pages(vec![Ok(
            json!({"files": []}),
        )]));

        client(&transport).list_categories().await.unwrap();

        let requests = transport.requests.lock().unwrap();
        assert_eq!(param(&requests[0], "q"), Some("'ROOT' in parents"));
        assert_eq!(param(&requests[0], "fields"), Some(CATEGORY_FIELDS));
        assert_eq!(param(&requests[0], "key"), Some("KEY"));
        assert_eq!(param(&requests[0], "pageSize"), None);
    }

    #[tokio::test]
    async fn test_file_listing_requests_ids_only() {
        let transport = std::sync::Arc::new(ScriptedTransport::with_pages(vec![Ok(
            json!({"files": [{"id": "P1"}]}),
        )]));

        let entries = client(&transport)
            .with_page_size(Some(100))
            .list_files("F1")
            .await
            .unwrap();
        assert_eq!(entries.len(), 1);

        let requests = transport.requests.lock().unwrap();
        assert_eq!(param(&requests[0], "q"), Some("'F1' in parents"));
        assert_eq!(param(&requests[0], "fields"), Some(FILE_FIELDS));
        assert_eq!(param(&requests[0], "pageSize"), Some("100"));
    }

    #[tokio::test]
    async fn test_empty_token_stops_pagination() {
        let transport = std::sync::Arc::new(ScriptedTransport::with_pages(vec![Ok(
            json!({"files": [{"id": "a"}], "nextPageToken": ""}),
        )]));

        let entries = client(&transport).list_files("F1").await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(transport.requests.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_page_discards_whole_listing() {
        let transport = std::sync::Arc::new(ScriptedTransport::with_pages(vec![
            Ok(json!({"files": [{"id": "a"}], "nextPageToken": "T"})),
            Err(not_found()),
        ]));

        let result = client(&transport).list_categories().await;
        assert!(matches!(
            result,
            Err(DriveError::HttpStatus { status: 404, .. })
        ));
        assert_eq!(transport.requests.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_malformed_page_is_an_error() {
        let transport = std::sync::Arc::new(ScriptedTransport::with_pages(vec![Ok(
            json!({"files": "nope"}),
        )]));

        let result = client(&transport).list_files("F1").await;
        assert!(matches!(result, Err(DriveError::Json(_))));
    }

    #[test]
    fn test_parents_query_escapes_quotes() {
        assert_eq!(parents_query("abc"), "'abc' in parents");
        assert_eq!(parents_query("a'b"), "'a\\'b' in parents");
    }

    fn png_bytes(width: u32, height: u32) -> Bytes {
        let img = image::RgbImage::new(width, height);
        let mut buf = std::io::Cursor::new(Vec::new());
        img.write_to(&mut buf, image::ImageFormat::Png).unwrap();
        Bytes::from(buf.into_inner())
    }

    #[tokio::test]
    async fn test_fetch_image_decodes() {
        let transport = std::sync::Arc::new(ScriptedTransport::with_body(Ok(png_bytes(3, 2))));

        let image = client(&transport).fetch_image("IMG").await.unwrap();
        assert_eq!(image.format, image::ImageFormat::Png);
        assert_eq!((image.width, image.height), (3, 2));

        let requests = transport.requests.lock().unwrap();
        assert_eq!(param(&requests[0], "alt"), Some("media"));
    }

    #[tokio::test]
    async fn test_fetch_image_transport_failure_is_none() {
        let transport = std::sync::Arc::new(ScriptedTransport::with_body(Err(not_found())));
        assert!(client(&transport).fetch_image("IMG").await.is_none());
    }

    #[tokio::test]
    async fn test_fetch_image_undecodable_is_none() {
        let transport = std::sync::Arc::new(ScriptedTransport::with_body(Ok(Bytes::from_static(
            b"<html>quota exceeded</html>",
        ))));
        assert!(client(&transport).fetch_image("IMG").await.is_none());
    }

    #[tokio::test]
    async fn test_failed_listing_error_hides_api_key() {
        let client = DriveClient::new(
            Box::new(reqwest::Client::new()),
            "http://127.0.0.1:1/drive/v3",
            "SECRETKEY123",
            "ROOT",
        );

        let err = client.list_categories().await.unwrap_err();
        assert!(!err.to_string().contains("SECRETKEY123"), "{err}");
    }
}
