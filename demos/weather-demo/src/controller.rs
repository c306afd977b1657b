use axum::extract::State;
use axum::http::Method;
use axum::routing::{get, post};
use rekindle_core::prelude::*;
use rekindle_web::prelude::{ControllerRegistration, ControllerRoutes, ResponseEntity, WebResult};
use serde::Serialize;
use std::sync::Arc;

use crate::service::WeatherService;

#[derive(Debug, Serialize)]
pub struct ForecastResponse {
    pub forecast: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub msg: &'static str,
}

/// 天气控制器
///
/// 持有 WeatherService 的代理；刷新后代理不变，下一次请求得到新实例
pub struct WeatherController {
    weather_service: Arc<ScopedProxy<WeatherService>>,
    context: Arc<ApplicationContext>,
}

impl WeatherController {
    pub fn new(context: Arc<ApplicationContext>) -> ContainerResult<Self> {
        Ok(Self {
            weather_service: context.get_refreshable::<WeatherService>()?,
            context,
        })
    }

    /// GET /weather/forecast
    async fn forecast(
        State(controller): State<Arc<WeatherController>>,
    ) -> WebResult<ResponseEntity<ForecastResponse>> {
        let forecast = controller
            .weather_service
            .with(WeatherService::latest_forecast)?;
        Ok(ResponseEntity::ok(ForecastResponse { forecast }))
    }

    /// POST /weather/evict
    async fn evict(
        State(controller): State<Arc<WeatherController>>,
    ) -> WebResult<ResponseEntity<MessageResponse>> {
        controller.context.publish_event(RefreshEvent::new())?;
        Ok(ResponseEntity::ok(MessageResponse { msg: "OK" }))
    }

    pub fn routes(self: Arc<Self>) -> ControllerRegistration {
        ControllerRoutes::new("weatherController", "/weather")
            .route(Method::GET, "/forecast", get(Self::forecast))
            .route(Method::POST, "/evict", post(Self::evict))
            .with_state(self)
    }
}
