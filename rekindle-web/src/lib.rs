//! # Rekindle Web
//!
//! 基于 Axum 的 Web 层，把 HTTP 路由接到 rekindle-core 的应用上下文上
//!
//! ## 核心特性
//!
//! - **显式路由表** - 控制器通过 `RouteTable` 注册，启动时检测路由冲突
//! - **配置驱动** - `server.*` 配置项决定监听地址和请求日志
//! - **统一错误响应** - 容器错误自动转换为 JSON 错误响应

pub mod controller;
pub mod error;
pub mod server;

pub mod prelude {
    //! 预导入模块

    pub use crate::controller::*;
    pub use crate::error::*;
    pub use crate::server::*;

    pub use axum;
    pub use axum::extract::{Json, Path, Query, State};
    pub use axum::http::StatusCode;
    pub use axum::response::{IntoResponse, Response};
    pub use axum::routing::{delete, get, patch, post, put};
    pub use axum::Router;
}
