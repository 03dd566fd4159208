use bytes::Bytes;
use serde_json::Value;

use super::error::DriveError;

/// Minimal async HTTP surface used by the Drive client.
///
/// Kept as a trait so listing and pagination can be exercised without a
/// network.
#[async_trait::async_trait]
pub trait DriveTransport: Send + Sync {
    /// GET `url` with `query` and decode the body as JSON.
    async fn get_json(&self, url: &str, query: &[(&str, &str)]) -> Result<Value, DriveError>;

    /// GET `url` with `query` and return the raw body.
    async fn get_bytes(&self, url: &str, query: &[(&str, &str)]) -> Result<Bytes, DriveError>;
}

/// The request URL carries the API key; strip it before the error can be
/// logged.
fn without_url(e: reqwest::Error) -> DriveError {
    DriveError::Http(e.without_url())
}

fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, DriveError> {
    let status = resp.status();
    if !status.is_success() {
        return Err(DriveError::HttpStatus {
            status: status.as_u16(),
            url: resp.url().path().to_string(),
        });
    }
    Ok(resp)
}

#[async_trait::async_trait]
impl DriveTransport for reqwest::Client {
    async fn get_json(&self, url: &str, query: &[(&str, &str)]) -> Result<Value, DriveError> {
        let resp = self.get(url).query(query).send().await.map_err(without_url)?;
        let json: Value = check_status(resp)?.json().await.map_err(without_url)?;
        Ok(json)
    }

    async fn get_bytes(&self, url: &str, query: &[(&str, &str)]) -> Result<Bytes, DriveError> {
        let resp = self.get(url).query(query).send().await.map_err(without_url)?;
        Ok(check_status(resp)?.bytes().await.map_err(without_url)?)
    }
}
