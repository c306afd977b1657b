use crate::config::{EnvironmentPropertySource, TomlPropertySource};
use crate::context::{ApplicationContext, ApplicationContextBuilder};
use crate::error::{ApplicationError, ApplicationResult};
use crate::event::ApplicationStartedEvent;
use crate::logging::LoggingConfig;
use std::path::Path;
use std::sync::Arc;

/// 应用初始化器，在上下文构建完成后、预实例化之前执行
pub type Initializer = Box<dyn Fn(&Arc<ApplicationContext>) -> ApplicationResult<()> + Send + Sync>;

/// Rekindle 应用程序
///
/// 提供便捷的应用启动方式
pub struct RekindleApplication {
    /// 应用名称
    name: String,

    /// 配置文件路径
    config_files: Vec<String>,

    /// 环境变量前缀
    env_prefix: String,

    /// 激活的 profiles
    profiles: Vec<String>,

    /// 是否显示 banner
    show_banner: bool,

    /// 日志配置，`None` 表示不初始化日志（由调用方负责）
    logging_config: Option<LoggingConfig>,

    /// 自定义初始化函数
    initializers: Vec<Initializer>,
}

impl RekindleApplication {
    /// 创建新的应用
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            config_files: vec!["application.toml".to_string()],
            env_prefix: "APP_".to_string(),
            profiles: Vec::new(),
            show_banner: true,
            logging_config: Some(LoggingConfig::from_env()),
            initializers: Vec::new(),
        }
    }

    /// 设置配置文件路径
    pub fn config_file(mut self, path: impl Into<String>) -> Self {
        self.config_files = vec![path.into()];
        self
    }

    /// 添加多个配置文件
    pub fn config_files(mut self, paths: Vec<String>) -> Self {
        self.config_files = paths;
        self
    }

    /// 设置环境变量前缀
    pub fn env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// 设置激活的 profiles
    pub fn profiles(mut self, profiles: Vec<String>) -> Self {
        self.profiles = profiles;
        self
    }

    /// 设置是否显示 banner
    pub fn banner(mut self, show: bool) -> Self {
        self.show_banner = show;
        self
    }

    /// 设置日志配置
    ///
    /// 如果不设置，将使用默认配置（从环境变量读取）
    pub fn logging(mut self, config: LoggingConfig) -> Self {
        self.logging_config = Some(config);
        self
    }

    /// 不初始化日志系统
    pub fn without_logging(mut self) -> Self {
        self.logging_config = None;
        self
    }

    /// 添加初始化器
    pub fn initializer<F>(mut self, f: F) -> Self
    where
        F: Fn(&Arc<ApplicationContext>) -> ApplicationResult<()> + Send + Sync + 'static,
    {
        self.initializers.push(Box::new(f));
        self
    }

    /// 运行应用
    pub fn run(self) -> ApplicationResult<Arc<ApplicationContext>> {
        // 记录启动开始时间
        let start_time = std::time::Instant::now();

        // 解析 active profiles
        // 优先级：代码设置 > 环境变量 APP_PROFILES_ACTIVE
        let mut active_profiles = self.profiles.clone();
        if active_profiles.is_empty() {
            if let Ok(profiles_str) = std::env::var(format!("{}PROFILES_ACTIVE", self.env_prefix)) {
                active_profiles = profiles_str
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect();
            }
        }

        // 加载配置文件（按优先级：default -> profile specific -> environment）
        let mut builder = ApplicationContext::builder().app_name(self.name.clone());
        builder = self.load_configurations(builder, &active_profiles)?;

        // 添加环境变量配置源（优先级最高）
        builder = builder.add_property_source(Box::new(
            EnvironmentPropertySource::new(&self.env_prefix),
        ));

        // 配置文件加载完成后再初始化日志，使 logging.* 配置生效
        if let Some(logging_config) = &self.logging_config {
            logging_config
                .clone()
                .with_properties(builder.environment().as_ref())
                .init()?;
        }

        if self.show_banner {
            self.print_banner();
        }

        tracing::info!("Starting {} application", self.name);
        if !active_profiles.is_empty() {
            tracing::info!("Active profiles: {:?}", active_profiles);
        } else {
            tracing::info!("No active profiles set, using default configuration");
        }
        tracing::debug!("Environment variable prefix: {}", self.env_prefix);

        let context = builder.set_active_profiles(active_profiles).build();
        tracing::info!("ApplicationContext created");

        // 执行自定义初始化器（注册 Bean、监听器等）
        for initializer in &self.initializers {
            initializer(&context)?;
        }

        // 初始化所有非延迟加载的单例 Bean
        tracing::info!("Initializing non-lazy singleton beans");
        context.initialize()?;
        tracing::info!("ApplicationContext initialized");

        let elapsed_ms = start_time.elapsed().as_millis();
        tracing::info!("Started {} in {}ms", self.name, elapsed_ms);

        // 发布 ApplicationStartedEvent
        context.publish_event(ApplicationStartedEvent::new(self.name.clone(), elapsed_ms))?;

        Ok(context)
    }

    /// 加载配置文件
    ///
    /// 加载顺序（优先级从低到高）：
    /// 1. application.toml (default)
    /// 2. application-{profile}.toml (profile specific)
    fn load_configurations(
        &self,
        mut builder: ApplicationContextBuilder,
        active_profiles: &[String],
    ) -> ApplicationResult<ApplicationContextBuilder> {
        for base_config in &self.config_files {
            builder = Self::try_load_config_file(builder, base_config, 0)?;
        }

        for (index, profile) in active_profiles.iter().enumerate() {
            for base_config in &self.config_files {
                let profile_config = Self::profile_config_path(base_config, profile);
                builder = Self::try_load_config_file(builder, &profile_config, 10 + index as i32)?;
            }
        }

        Ok(builder)
    }

    /// 获取 profile 配置文件路径
    ///
    /// 例如：application.toml -> application-dev.toml
    fn profile_config_path(base_path: &str, profile: &str) -> String {
        if let Some(dot_pos) = base_path.rfind('.') {
            let (name, ext) = base_path.split_at(dot_pos);
            format!("{}-{}{}", name, profile, ext)
        } else {
            format!("{}-{}", base_path, profile)
        }
    }

    /// 尝试加载配置文件，文件不存在时跳过
    fn try_load_config_file(
        builder: ApplicationContextBuilder,
        config_file: &str,
        priority: i32,
    ) -> ApplicationResult<ApplicationContextBuilder> {
        if !Path::new(config_file).exists() {
            return Ok(builder);
        }
        let source = TomlPropertySource::from_file(config_file)
            .map_err(|e| ApplicationError::ConfigLoadFailed(format!("{}: {}", config_file, e)))?;
        Ok(builder.add_property_source(Box::new(source.with_priority(priority))))
    }

    /// 打印 banner
    fn print_banner(&self) {
        println!();
        println!(r"  ___     _   _         _ _     ");
        println!(r" | _ \___| |_(_)_ _  __| | |___ ");
        println!(r" |   / -_) / / | ' \/ _` | / -_)");
        println!(r" |_|_\___|_\_\_|_||_\__,_|_\___|");
        println!();
        println!("  :: Rekindle ::        (v{})", env!("CARGO_PKG_VERSION"));
        println!();
    }
}

impl Default for RekindleApplication {
    fn default() -> Self {
        Self::new("RekindleApplication")
    }
}
