use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use rekindle_core::prelude::*;
use rekindle_web::server::WebServer;
use serde_json::Value;
use tower::ServiceExt;

fn app() -> (Arc<ApplicationContext>, Router) {
    let context = ApplicationContext::builder()
        .add_property_source(Box::new(
            MapPropertySource::new("test").with_property("server.enable-request-logging", false),
        ))
        .build();
    weather_demo::register_beans(&context).unwrap();

    let routes = weather_demo::routes(&context).unwrap();
    let router = WebServer::new(Arc::clone(&context))
        .unwrap()
        .with_routes(routes)
        .router();
    (context, router)
}

async fn call(router: &Router, method: Method, uri: &str) -> (StatusCode, String) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}

async fn fetch_forecast(router: &Router) -> String {
    let (status, body) = call(router, Method::GET, "/weather/forecast").await;
    assert_eq!(status, StatusCode::OK);
    body
}

#[tokio::test]
async fn publishing_refresh_event_regenerates_forecast() {
    let (_context, router) = app();

    let first = fetch_forecast(&router).await;
    assert!(first.contains("{\"forecast\":\"Scattered Clouds"));

    let second = fetch_forecast(&router).await;
    assert_eq!(first, second);

    // 时间戳精确到毫秒，确保重新生成的预报与之前不同
    tokio::time::sleep(Duration::from_millis(5)).await;

    let (status, evicted) = call(&router, Method::POST, "/weather/evict").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(evicted, "{\"msg\":\"OK\"}");

    let third = fetch_forecast(&router).await;
    assert_ne!(third, second);
    assert!(third.contains("\"forecast\":\"Scattered Clouds"));
}

#[tokio::test]
async fn forecast_is_built_lazily_and_once_per_refresh() {
    let (context, router) = app();
    let registry = Arc::clone(context.scope_registry());

    assert_eq!(registry.slot_count(), 1);
    assert_eq!(registry.live_count(), 0);

    fetch_forecast(&router).await;
    fetch_forecast(&router).await;
    assert_eq!(registry.live_count(), 1);

    call(&router, Method::POST, "/weather/evict").await;
    assert_eq!(registry.live_count(), 0);
}

#[tokio::test]
async fn forecast_body_is_valid_json() {
    let (_context, router) = app();

    let body = fetch_forecast(&router).await;
    let json: Value = serde_json::from_str(&body).unwrap();
    let forecast = json["forecast"].as_str().unwrap();

    let timestamp = forecast.strip_prefix("Scattered Clouds ").unwrap();
    assert!(chrono::NaiveDateTime::parse_from_str(
        timestamp,
        weather_demo::service::FORECAST_TIME_FORMAT
    )
    .is_ok());
}

#[tokio::test]
async fn summary_change_refreshes_forecast() {
    let (context, router) = app();
    let before = fetch_forecast(&router).await;

    context
        .refresh_environment(Box::new(
            MapPropertySource::new("test")
                .with_property("server.enable-request-logging", false)
                .with_property("weather.summary", "Light Rain"),
        ))
        .unwrap();

    let after = fetch_forecast(&router).await;
    assert_ne!(before, after);
    assert!(after.contains("\"forecast\":\"Light Rain "));
}

#[tokio::test]
async fn unknown_route_is_not_found() {
    let (_context, router) = app();
    let (status, _) = call(&router, Method::GET, "/weather/unknown").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
