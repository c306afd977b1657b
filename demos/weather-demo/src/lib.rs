//! 可刷新作用域演示：天气预报服务
//!
//! `GET /weather/forecast` 返回带生成时间的预报，`POST /weather/evict`
//! 发布 RefreshEvent，之后的第一次查询会得到重新生成的预报

pub mod controller;
pub mod service;

use rekindle_core::prelude::*;
use rekindle_web::prelude::RouteTable;
use std::sync::Arc;

use controller::WeatherController;
use service::WeatherService;

/// 注册演示用到的 Bean
pub fn register_beans(context: &ApplicationContext) -> ContainerResult<()> {
    context.register(WeatherService::definition())
}

/// 构建路由表
pub fn routes(context: &Arc<ApplicationContext>) -> ApplicationResult<RouteTable> {
    let controller = Arc::new(WeatherController::new(Arc::clone(context))?);

    let mut table = RouteTable::new();
    table.register(controller.routes())?;
    Ok(table)
}

/// 演示应用
pub fn application(config_file: &str) -> RekindleApplication {
    RekindleApplication::new("WeatherDemo")
        .config_file(config_file)
        .env_prefix("WEATHER_")
        .initializer(|context| {
            register_beans(context)?;
            Ok(())
        })
}
