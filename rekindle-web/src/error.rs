//! Web 层错误类型
//!
//! Handler 返回 `WebResult<T>`，错误统一转换为
//! `{"status": <code>, "error": <reason>, "message": <detail>}` 形式的 JSON 响应

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use rekindle_core::ContainerError;
use serde_json::json;
use thiserror::Error;

/// Web 层错误类型
#[derive(Error, Debug)]
pub enum WebError {
    /// 容器错误（Bean 解析、构造失败、事件分发失败等） - 500
    #[error(transparent)]
    Container(#[from] ContainerError),

    /// 资源不存在 - 404 Not Found
    #[error("Not found: {0}")]
    NotFound(String),

    /// 请求参数错误 - 400 Bad Request
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// 内部服务器错误 - 500 Internal Server Error
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl WebError {
    /// 获取错误对应的 HTTP 状态码
    pub fn status_code(&self) -> StatusCode {
        match self {
            WebError::NotFound(_) => StatusCode::NOT_FOUND,
            WebError::BadRequest(_) => StatusCode::BAD_REQUEST,
            WebError::Container(ContainerError::BeanNotFound(_)) => StatusCode::SERVICE_UNAVAILABLE,
            WebError::Container(_) | WebError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(status = %status.as_u16(), error = %self, "Request failed");
        } else {
            tracing::debug!(status = %status.as_u16(), error = %self, "Request rejected");
        }

        let body = json!({
            "status": status.as_u16(),
            "error": status.canonical_reason().unwrap_or("Unknown"),
            "message": self.to_string(),
        });
        (status, Json(body)).into_response()
    }
}

/// Web 操作结果
pub type WebResult<T> = std::result::Result<T, WebError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(WebError::NotFound("x".into()).status_code(), StatusCode::NOT_FOUND);
        assert_eq!(WebError::BadRequest("x".into()).status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            WebError::from(ContainerError::BeanCreationFailed("x".into())).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            WebError::from(ContainerError::BeanNotFound("x".into())).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_error_response_carries_status() {
        let response = WebError::NotFound("forecast".into()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
