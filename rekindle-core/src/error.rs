//! 统一的错误处理类型
//!
//! 容器内部使用 `ContainerError`，应用启动流程使用 `ApplicationError`。
//! Bean 作者的业务错误可以通过 `anyhow::Error` 进入 `ContainerError::Other`。

use std::fmt;
use thiserror::Error;

/// 单个监听器在事件分发中的失败记录
#[derive(Debug)]
pub struct ListenerFailure {
    /// 监听器名称
    pub listener: String,
    /// 失败原因
    pub error: anyhow::Error,
}

impl fmt::Display for ListenerFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.listener, self.error)
    }
}

/// 容器错误
#[derive(Debug, Error)]
pub enum ContainerError {
    #[error("Bean not found: {0}")]
    BeanNotFound(String),

    #[error("Bean already exists: {0}")]
    BeanAlreadyExists(String),

    #[error("Bean creation failed: {0}")]
    BeanCreationFailed(String),

    #[error("No unique bean of type '{type_name}': candidates {candidates:?}")]
    NoUniqueBean {
        type_name: String,
        candidates: Vec<String>,
    },

    #[error("Circular dependency detected: {0}")]
    CircularDependency(String),

    #[error("Type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },

    #[error("Bean '{name}' is {actual:?}-scoped, not {requested:?}")]
    ScopeMismatch {
        name: String,
        requested: crate::Scope,
        actual: crate::Scope,
    },

    #[error("{} listener(s) failed while handling '{event}': {}", .failures.len(), join_failures(.failures))]
    EventDelivery {
        event: String,
        failures: Vec<ListenerFailure>,
    },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

fn join_failures(failures: &[ListenerFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// 容器操作结果
pub type ContainerResult<T> = std::result::Result<T, ContainerError>;

/// 应用启动错误
#[derive(Debug, Error)]
pub enum ApplicationError {
    #[error("Logging initialization failed: {0}")]
    LoggingInitFailed(String),

    #[error("Failed to load configuration: {0}")]
    ConfigLoadFailed(String),

    #[error("Server error: {0}")]
    Server(String),

    #[error(transparent)]
    Container(#[from] ContainerError),

    #[error("{0}")]
    Other(String),
}

/// 应用操作结果
pub type ApplicationResult<T> = std::result::Result<T, ApplicationError>;
