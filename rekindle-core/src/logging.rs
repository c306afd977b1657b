//! 日志初始化
//!
//! 启动时先读取环境变量（`RUST_LOG` / `LOG_LEVEL` / `LOG_FORMAT`），配置文件加载后
//! 再用 `logging.*` 覆盖，最后安装全局的 `tracing-subscriber`。
//!
//! ```toml
//! [logging]
//! level = "debug"
//! format = "json"
//! filter = "rekindle_core=trace,tower_http=info"
//! show-target = true
//! ```

use crate::config::PropertyResolver;
use crate::error::{ApplicationError, ApplicationResult};
use std::fmt;
use std::str::FromStr;
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// 日志输出格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Compact,
    /// 带时间、级别和目标的默认格式
    Full,
    Json,
    /// 多行输出，适合开发时阅读
    Pretty,
}

impl LogFormat {
    const ALL: [LogFormat; 4] = [
        LogFormat::Compact,
        LogFormat::Full,
        LogFormat::Json,
        LogFormat::Pretty,
    ];

    fn as_str(self) -> &'static str {
        match self {
            LogFormat::Compact => "compact",
            LogFormat::Full => "full",
            LogFormat::Json => "json",
            LogFormat::Pretty => "pretty",
        }
    }
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|format| format.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown log format '{}'", s))
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 日志配置
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// 未设置过滤指令时使用的全局级别
    pub level: Level,
    pub format: LogFormat,
    /// `EnvFilter` 指令，设置后优先于 `level`
    pub filter: Option<String>,
    /// 是否输出模块路径
    pub show_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: LogFormat::default(),
            filter: None,
            show_target: false,
        }
    }
}

impl LoggingConfig {
    /// 从环境变量读取配置
    pub fn from_env() -> Self {
        Self::default().merge(
            "environment",
            std::env::var("LOG_LEVEL").ok(),
            std::env::var("LOG_FORMAT").ok(),
            std::env::var("RUST_LOG").ok(),
        )
    }

    /// 用配置中的 `logging.*` 覆盖当前设置
    pub fn with_properties(self, properties: &impl PropertyResolver) -> Self {
        let show_target = properties.get_bool_or("logging.show-target", self.show_target);
        let mut config = self.merge(
            "logging.*",
            properties.get_string("logging.level"),
            properties.get_string("logging.format"),
            properties.get_string("logging.filter"),
        );
        config.show_target = show_target;
        config
    }

    // 无法解析的值保持原设置。此时订阅者尚未安装，只能写到 stderr
    fn merge(
        mut self,
        origin: &str,
        level: Option<String>,
        format: Option<String>,
        filter: Option<String>,
    ) -> Self {
        if let Some(level) = level {
            match level.trim().parse::<Level>() {
                Ok(level) => self.level = level,
                Err(_) => eprintln!("Ignoring log level '{}' from {}", level, origin),
            }
        }
        if let Some(format) = format {
            match format.parse() {
                Ok(format) => self.format = format,
                Err(e) => eprintln!("Ignoring {} from {}", e, origin),
            }
        }
        if let Some(filter) = filter.filter(|f| !f.trim().is_empty()) {
            self.filter = Some(filter);
        }
        self
    }

    fn env_filter(&self) -> ApplicationResult<EnvFilter> {
        match &self.filter {
            Some(directives) => EnvFilter::try_new(directives).map_err(|e| {
                ApplicationError::LoggingInitFailed(format!(
                    "invalid filter '{}': {}",
                    directives, e
                ))
            }),
            None => Ok(EnvFilter::new(self.level.to_string().to_lowercase())),
        }
    }

    /// 安装全局订阅者，重复安装会返回错误
    pub fn init(self) -> ApplicationResult<()> {
        let builder = tracing_subscriber::fmt()
            .with_env_filter(self.env_filter()?)
            .with_target(self.show_target);

        let installed = match self.format {
            LogFormat::Compact => builder.compact().try_init(),
            LogFormat::Full => builder.try_init(),
            LogFormat::Json => builder.json().try_init(),
            LogFormat::Pretty => builder.pretty().try_init(),
        };
        installed.map_err(|e| ApplicationError::LoggingInitFailed(e.to_string()))
    }
}
