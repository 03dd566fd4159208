use thiserror::Error;

/// Failures talking to the Drive REST API.
#[derive(Error, Debug)]
pub enum DriveError {
    #[error("HTTP error {status} from {url}")]
    HttpStatus { status: u16, url: String },
    #[error("Image could not be decoded: {0}")]
    Decode(#[from] image::ImageError),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
