use rekindle_core::prelude::*;

/// 天气概况的默认值
pub const DEFAULT_SUMMARY: &str = "Scattered Clouds";

/// 预报时间戳格式，例如 `18/Oct/26 09:41:07.123`
pub const FORECAST_TIME_FORMAT: &str = "%d/%b/%y %H:%M:%S%.3f";

/// 天气服务
///
/// 可刷新作用域：预报在初始化回调中生成一次，之后保持不变，直到实例被刷新
pub struct WeatherService {
    summary: String,
    forecast: Option<String>,
}

impl WeatherService {
    pub fn new(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            forecast: None,
        }
    }

    /// 初始化回调，生成带时间戳的预报
    pub fn init(&mut self) {
        let forecast = format!(
            "{} {}",
            self.summary,
            chrono::Local::now().format(FORECAST_TIME_FORMAT)
        );
        tracing::info!("Generated forecast: {}", forecast);
        self.forecast = Some(forecast);
    }

    pub fn latest_forecast(&self) -> Option<String> {
        self.forecast.clone()
    }

    /// Bean 定义：构造时读取 `weather.summary`，因此该配置变化时会被刷新
    pub fn definition() -> BeanDefinition {
        BeanDefinition::from_factory(FunctionFactory::new(|ctx: &CreationContext<'_>| {
            Ok(WeatherService::new(
                ctx.get_string_or("weather.summary", DEFAULT_SUMMARY),
            ))
        }))
        .with_scope(Scope::Refreshable)
        .with_init(WeatherService::init)
    }
}
