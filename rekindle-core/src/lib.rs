// rekindle-core: 支持可刷新作用域的依赖注入容器
//
// 提供：
// - 单例、原型和可刷新三种作用域
// - 可刷新 Bean 的稳定代理，刷新后下一次调用透明地得到新实例
// - 同步事件总线和 RefreshEvent 驱动的逐出
// - 构造期间自动记录 Bean 依赖的配置键，支持按配置变化选择性刷新

pub mod app;
pub mod bean;
pub mod bean_factory;
pub mod config;
pub mod context;
pub mod error;
pub mod event;
pub mod instantiator;
pub mod logging;
pub mod proxy;
pub mod refresh;
pub mod registry;
pub mod scope;
pub mod utils;

use error::ContainerResult;

// Helper trait for init/destroy callbacks
// Allows both () and Result<()> return types
pub trait IntoResult {
    fn into_result(self) -> ContainerResult<()>;
}

impl IntoResult for () {
    fn into_result(self) -> ContainerResult<()> {
        Ok(())
    }
}

impl IntoResult for ContainerResult<()> {
    fn into_result(self) -> ContainerResult<()> {
        self
    }
}

impl IntoResult for anyhow::Result<()> {
    fn into_result(self) -> ContainerResult<()> {
        self.map_err(error::ContainerError::Other)
    }
}

// 重新导出常用类型
pub use app::RekindleApplication;
pub use bean::{BeanDefinition, FunctionFactory, InstanceFactory};
pub use bean_factory::{BeanFactory, DefaultListableBeanFactory, ListableBeanFactory};
pub use config::{
    ConfigValue, Environment, EnvironmentPropertySource, MapPropertySource, PropertyResolver,
    PropertySource, TomlPropertySource,
};
pub use context::{ApplicationContext, ApplicationContextBuilder, ShutdownHook};
pub use error::{ApplicationError, ApplicationResult, ContainerError};
pub use event::{
    ApplicationEvent, ApplicationShutdownEvent, ApplicationStartedEvent, EventBus, EventKind,
    EventListener, FnListener, RefreshEvent,
};
pub use instantiator::{CreationContext, LazyInstantiator};
pub use logging::{LogFormat, LoggingConfig};
pub use proxy::ScopedProxy;
pub use refresh::RefreshScopeListener;
pub use registry::{LiveInstance, RefreshPredicate, ScopeRegistry};
pub use scope::{BeanIdentity, Scope, ScopeKey};

/// Prelude 模块，包含常用的 traits 和类型
pub mod prelude {
    pub use crate::app::RekindleApplication;
    pub use crate::bean::{BeanDefinition, FunctionFactory};
    pub use crate::config::{Environment, MapPropertySource, PropertyResolver, PropertySource};
    pub use crate::context::ApplicationContext;
    pub use crate::error::{ApplicationError, ApplicationResult, ContainerError, ContainerResult};
    pub use crate::event::{
        ApplicationEvent, ApplicationShutdownEvent, ApplicationStartedEvent, EventKind,
        EventListener, RefreshEvent,
    };
    pub use crate::instantiator::CreationContext;
    pub use crate::proxy::ScopedProxy;
    pub use crate::scope::Scope;
}
