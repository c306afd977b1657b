//! 控制器支持
//!
//! 控制器通过 `ControllerRoutes` 显式声明自己的路由，再注册到 `RouteTable`。
//! 路由表在注册时检测冲突，最终合并成一个 axum `Router`

use axum::{
    http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::MethodRouter,
    Json, Router,
};
use rekindle_core::{ApplicationError, ApplicationResult};
use serde::Serialize;
use std::collections::HashSet;

/// HTTP 响应实体
///
/// 允许完全控制 HTTP 响应，包括状态码、响应头和响应体
#[derive(Debug)]
pub struct ResponseEntity<T> {
    status: StatusCode,
    headers: HeaderMap,
    body: Option<T>,
}

impl<T> ResponseEntity<T> {
    /// 创建一个新的响应实体
    pub fn new(status: StatusCode, body: T) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Some(body),
        }
    }

    /// 创建一个 200 OK 响应
    pub fn ok(body: T) -> Self {
        Self::new(StatusCode::OK, body)
    }

    /// 创建一个 202 Accepted 响应
    pub fn accepted(body: T) -> Self {
        Self::new(StatusCode::ACCEPTED, body)
    }

    /// 创建一个 204 No Content 响应
    pub fn no_content() -> ResponseEntity<()> {
        ResponseEntity {
            status: StatusCode::NO_CONTENT,
            headers: HeaderMap::new(),
            body: None,
        }
    }

    /// 添加响应头
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// 设置状态码
    pub fn status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }
}

impl<T> IntoResponse for ResponseEntity<T>
where
    T: Serialize,
{
    fn into_response(self) -> Response {
        let mut response = match self.body {
            Some(body) => (self.status, Json(body)).into_response(),
            None => self.status.into_response(),
        };

        // 添加自定义响应头
        let headers = response.headers_mut();
        for (name, value) in self.headers {
            if let Some(name) = name {
                headers.insert(name, value);
            }
        }

        response
    }
}

/// 路由信息
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RouteInfo {
    /// HTTP 方法
    pub method: Method,
    /// 完整路径（包含基础路径）
    pub path: String,
}

/// 控制器路由声明，`S` 为 handler 使用的状态类型
pub struct ControllerRoutes<S> {
    name: &'static str,
    base_path: &'static str,
    routes: Vec<RouteInfo>,
    router: Router<S>,
}

impl<S> ControllerRoutes<S>
where
    S: Clone + Send + Sync + 'static,
{
    pub fn new(name: &'static str, base_path: &'static str) -> Self {
        Self {
            name,
            base_path,
            routes: Vec::new(),
            router: Router::new(),
        }
    }

    /// 声明一条路由，`path` 相对于基础路径
    pub fn route(mut self, method: Method, path: &'static str, handler: MethodRouter<S>) -> Self {
        self.routes.push(RouteInfo {
            method,
            path: join_path(self.base_path, path),
        });
        self.router = self.router.route(path, handler);
        self
    }

    /// 绑定 handler 状态，得到可以注册到路由表的控制器
    pub fn with_state(self, state: S) -> ControllerRegistration {
        ControllerRegistration {
            name: self.name,
            base_path: self.base_path,
            routes: self.routes,
            router: self.router.with_state(state),
        }
    }
}

/// 已绑定状态的控制器
pub struct ControllerRegistration {
    name: &'static str,
    base_path: &'static str,
    routes: Vec<RouteInfo>,
    router: Router,
}

impl ControllerRegistration {
    /// 控制器名称
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// 获取所有路由信息
    pub fn get_routes(&self) -> &[RouteInfo] {
        &self.routes
    }
}

/// 路由表
#[derive(Default)]
pub struct RouteTable {
    controllers: Vec<ControllerRegistration>,
    seen: HashSet<RouteInfo>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册控制器，任何一条路由与已注册的路由冲突时整体拒绝
    pub fn register(&mut self, controller: ControllerRegistration) -> ApplicationResult<()> {
        let mut local = HashSet::new();
        for route in &controller.routes {
            if self.seen.contains(route) || !local.insert(route.clone()) {
                return Err(ApplicationError::Other(format!(
                    "Route conflict: {} {} declared by '{}' is already mapped",
                    route.method, route.path, controller.name
                )));
            }
        }

        for route in &controller.routes {
            tracing::debug!("Mapped {} {} -> {}", route.method, route.path, controller.name);
        }
        self.seen.extend(local);
        self.controllers.push(controller);
        Ok(())
    }

    /// 获取所有已注册的路由
    pub fn routes(&self) -> Vec<RouteInfo> {
        self.controllers
            .iter()
            .flat_map(|c| c.routes.iter().cloned())
            .collect()
    }

    /// 合并所有控制器的路由
    pub fn into_router(self) -> Router {
        self.controllers
            .into_iter()
            .fold(Router::new(), |router, controller| {
                if controller.base_path.is_empty() || controller.base_path == "/" {
                    router.merge(controller.router)
                } else {
                    router.nest(controller.base_path, controller.router)
                }
            })
    }
}

fn join_path(base_path: &str, path: &str) -> String {
    let base = base_path.trim_end_matches('/');
    if path.starts_with('/') {
        format!("{}{}", base, path)
    } else {
        format!("{}/{}", base, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::{get, post};

    fn status_routes(base: &'static str) -> ControllerRegistration {
        ControllerRoutes::<()>::new("statusController", base)
            .route(Method::GET, "/status", get(|| async { "up" }))
            .route(Method::POST, "/status", post(|| async { "reset" }))
            .with_state(())
    }

    #[test]
    fn test_join_path() {
        assert_eq!(join_path("/weather", "/forecast"), "/weather/forecast");
        assert_eq!(join_path("/weather/", "evict"), "/weather/evict");
        assert_eq!(join_path("", "/forecast"), "/forecast");
    }

    #[test]
    fn test_route_table_collects_routes() {
        let mut table = RouteTable::new();
        table.register(status_routes("/ops")).unwrap();

        let routes = table.routes();
        assert_eq!(routes.len(), 2);
        assert!(routes.contains(&RouteInfo {
            method: Method::POST,
            path: "/ops/status".to_string(),
        }));
    }

    #[test]
    fn test_route_conflict_is_rejected() {
        let mut table = RouteTable::new();
        table.register(status_routes("/ops")).unwrap();

        let result = table.register(status_routes("/ops"));
        assert!(matches!(result, Err(ApplicationError::Other(msg)) if msg.contains("/ops/status")));
        assert_eq!(table.routes().len(), 2);
    }

    #[test]
    fn test_response_entity_status_and_headers() {
        let response = ResponseEntity::accepted(serde_json::json!({"msg": "queued"}))
            .header(
                HeaderName::from_static("x-refresh"),
                HeaderValue::from_static("pending"),
            )
            .into_response();

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(response.headers()["x-refresh"], "pending");
    }
}
