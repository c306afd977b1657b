//! Web 服务器模块
//!
//! 基于 Axum 的 Web 服务器实现

use axum::Router;
use rekindle_core::prelude::*;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::controller::RouteTable;

/// Web 服务器配置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerProperties {
    /// 服务器监听地址
    pub host: String,

    /// 服务器监听端口
    pub port: u16,

    /// 是否启用请求日志
    pub enable_request_logging: bool,
}

impl Default for ServerProperties {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            enable_request_logging: true,
        }
    }
}

impl ServerProperties {
    /// 从 Environment 加载配置
    pub fn from_environment(env: &Environment) -> ApplicationResult<Self> {
        let defaults = Self::default();
        let port = env.get_i64_or("server.port", i64::from(defaults.port));
        let port = u16::try_from(port).map_err(|_| {
            ApplicationError::ConfigLoadFailed(format!("server.port out of range: {}", port))
        })?;

        Ok(Self {
            host: env.get_string_or("server.host", &defaults.host),
            port,
            enable_request_logging: env
                .get_bool_or("server.enable-request-logging", defaults.enable_request_logging),
        })
    }

    /// 获取服务器地址
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Rekindle Web 服务器
pub struct WebServer {
    /// 服务器配置
    properties: ServerProperties,

    /// 应用上下文
    context: Arc<ApplicationContext>,

    /// 路由表
    routes: RouteTable,
}

impl WebServer {
    /// 创建新的 Web 服务器，配置从上下文的 Environment 读取
    pub fn new(context: Arc<ApplicationContext>) -> ApplicationResult<Self> {
        let properties = ServerProperties::from_environment(context.environment())?;
        Ok(Self {
            properties,
            context,
            routes: RouteTable::new(),
        })
    }

    /// 设置路由表
    pub fn with_routes(mut self, routes: RouteTable) -> Self {
        self.routes = routes;
        self
    }

    /// 服务器配置
    pub fn properties(&self) -> &ServerProperties {
        &self.properties
    }

    /// 构建最终的 Router（不绑定端口，可直接用于测试）
    pub fn router(self) -> Router {
        Self::build_router(self.routes, &self.properties)
    }

    fn build_router(routes: RouteTable, properties: &ServerProperties) -> Router {
        let router = routes.into_router();
        if properties.enable_request_logging {
            router.layer(TraceLayer::new_for_http())
        } else {
            router
        }
    }

    /// 启动服务器，收到 Ctrl+C 后优雅退出并关闭应用上下文
    pub async fn run(self) -> ApplicationResult<()> {
        let addr = self.properties.address();

        tracing::info!("Starting Rekindle Web Server on {}", addr);

        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| ApplicationError::Server(format!("Failed to bind to {}: {}", addr, e)))?;

        self.serve(listener).await
    }

    /// 在已绑定的监听器上提供服务
    pub async fn serve(self, listener: TcpListener) -> ApplicationResult<()> {
        if let Ok(local) = listener.local_addr() {
            tracing::info!("Server listening on http://{}", local);
        }

        let context = Arc::clone(&self.context);
        let app = Self::build_router(self.routes, &self.properties);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| ApplicationError::Server(e.to_string()))?;

        context.shutdown()?;
        Ok(())
    }
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Received shutdown signal"),
        Err(e) => tracing::warn!("Failed to listen for shutdown signal: {}", e),
    }
}
