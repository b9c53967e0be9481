use http::StatusCode;
use std::io;
use thiserror::Error;

// 统一的服务错误类型，直接映射为 HTTP 响应
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("{0}")]
    Validation(String),

    #[error("failed to extract info: {0}")]
    Extraction(String),

    #[error("failed to download video: {0}")]
    Download(String),

    #[error("temp directory unavailable: {0}")]
    Resource(#[from] io::Error),

    #[error("{0}")]
    NotFound(String),
}

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::Validation(_) | ServerError::Extraction(_) => StatusCode::BAD_REQUEST,
            ServerError::Download(_) | ServerError::Resource(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ServerError::NotFound(_) => StatusCode::NOT_FOUND,
        }
    }
}
