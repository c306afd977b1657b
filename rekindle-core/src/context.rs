use std::any::Any;
use std::collections::BTreeSet;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::bean_factory::{BeanFactory, DefaultListableBeanFactory, ListableBeanFactory};
use crate::proxy::ScopedProxy;
use crate::refresh::RefreshScopeListener;
use crate::registry::ScopeRegistry;
use crate::{
    bean::{BeanDefinition, FunctionFactory},
    config::{Environment, PropertySource},
    error::ContainerResult,
    event::{
        ApplicationEvent, ApplicationShutdownEvent, EventBus, EventKind, EventListener,
        RefreshEvent,
    },
    instantiator::CreationContext,
    Scope,
};

/// Shutdown hook类型
pub type ShutdownHook = Box<dyn Fn() -> ContainerResult<()> + Send + Sync>;

/// 应用上下文
///
/// 持有 BeanFactory、Environment、事件总线和受管作用域注册表。
/// 创建时即把 `RefreshScopeListener` 订阅到 `RefreshEvent` 上
pub struct ApplicationContext {
    /// Bean 工厂 - 负责 Bean 的创建和管理
    bean_factory: Arc<DefaultListableBeanFactory>,

    /// 配置环境
    environment: Arc<Environment>,

    /// 事件总线
    event_bus: Arc<EventBus>,

    /// 受管作用域注册表
    registry: Arc<ScopeRegistry>,

    /// Shutdown hooks
    shutdown_hooks: RwLock<Vec<ShutdownHook>>,

    /// 应用名称（用于事件）
    app_name: RwLock<Option<String>>,
}

impl ApplicationContext {
    /// 创建新的应用上下文
    pub fn new() -> Self {
        Self::with_environment(Arc::new(Environment::new()))
    }

    /// 使用已有的 Environment 创建应用上下文
    pub fn with_environment(environment: Arc<Environment>) -> Self {
        let registry = Arc::new(ScopeRegistry::new());
        let event_bus = Arc::new(EventBus::new());
        event_bus.subscribe(
            EventKind::Refresh,
            Arc::new(RefreshScopeListener::new(Arc::clone(&registry))),
        );

        Self {
            bean_factory: Arc::new(DefaultListableBeanFactory::new(
                Arc::clone(&environment),
                Arc::clone(&registry),
            )),
            environment,
            event_bus,
            registry,
            shutdown_hooks: RwLock::new(Vec::new()),
            app_name: RwLock::new(None),
        }
    }

    /// 构建器模式创建上下文
    pub fn builder() -> ApplicationContextBuilder {
        ApplicationContextBuilder::new()
    }

    /// 获取内部的 BeanFactory
    pub fn get_bean_factory(&self) -> &Arc<DefaultListableBeanFactory> {
        &self.bean_factory
    }

    /// 设置应用名称
    pub fn set_app_name(&self, name: impl Into<String>) {
        *self.app_name.write() = Some(name.into());
    }

    /// 获取应用名称
    pub fn get_app_name(&self) -> Option<String> {
        self.app_name.read().clone()
    }

    /// 获取 Environment
    pub fn environment(&self) -> &Arc<Environment> {
        &self.environment
    }

    /// 获取事件总线
    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    /// 获取受管作用域注册表
    pub fn scope_registry(&self) -> &Arc<ScopeRegistry> {
        &self.registry
    }

    /// 发布事件
    ///
    /// 同步分发，返回时所有监听器都已执行完毕
    pub fn publish_event(&self, event: impl Into<ApplicationEvent>) -> ContainerResult<()> {
        self.event_bus.publish(event)
    }

    /// 注册事件监听器
    pub fn register_listener(&self, kind: EventKind, listener: Arc<dyn EventListener>) {
        self.event_bus.subscribe(kind, listener);
    }

    /// 替换（或新增）配置源，并针对值发生变化的配置键发布 `RefreshEvent`
    ///
    /// 返回发生变化的配置键；没有变化时不发布事件
    pub fn refresh_environment(
        &self,
        source: Box<dyn PropertySource>,
    ) -> ContainerResult<BTreeSet<String>> {
        let source_name = source.name().to_string();
        let changed = self.environment.replace_property_source(source);

        if changed.is_empty() {
            tracing::debug!("Property source '{}' reloaded without changes", source_name);
            return Ok(changed);
        }

        tracing::info!(
            "Property source '{}' changed {} key(s): {:?}",
            source_name,
            changed.len(),
            changed
        );
        self.publish_event(RefreshEvent::with_changed(changed.iter().cloned()))?;
        Ok(changed)
    }

    /// 注册 shutdown hook
    ///
    /// Shutdown hook 会在应用关闭时按注册顺序执行
    pub fn register_shutdown_hook<F>(&self, hook: F)
    where
        F: Fn() -> ContainerResult<()> + Send + Sync + 'static,
    {
        let mut hooks = self.shutdown_hooks.write();
        hooks.push(Box::new(hook));
        tracing::debug!("Registered shutdown hook, total: {}", hooks.len());
    }

    /// 注册 Bean 定义
    pub fn register(&self, definition: BeanDefinition) -> ContainerResult<()> {
        self.bean_factory.register_bean_definition(definition)
    }

    /// 注册单例 Bean
    pub fn register_singleton<T, F>(&self, name: impl Into<String>, factory: F) -> ContainerResult<()>
    where
        T: Any + Send + Sync,
        F: Fn(&CreationContext<'_>) -> ContainerResult<T> + Send + Sync + 'static,
    {
        self.register_scoped(name, Scope::Singleton, factory)
    }

    /// 注册原型 Bean
    pub fn register_prototype<T, F>(&self, name: impl Into<String>, factory: F) -> ContainerResult<()>
    where
        T: Any + Send + Sync,
        F: Fn(&CreationContext<'_>) -> ContainerResult<T> + Send + Sync + 'static,
    {
        self.register_scoped(name, Scope::Prototype, factory)
    }

    /// 注册可刷新 Bean
    pub fn register_refreshable<T, F>(&self, name: impl Into<String>, factory: F) -> ContainerResult<()>
    where
        T: Any + Send + Sync,
        F: Fn(&CreationContext<'_>) -> ContainerResult<T> + Send + Sync + 'static,
    {
        self.register_scoped(name, Scope::Refreshable, factory)
    }

    fn register_scoped<T, F>(&self, name: impl Into<String>, scope: Scope, factory: F) -> ContainerResult<()>
    where
        T: Any + Send + Sync,
        F: Fn(&CreationContext<'_>) -> ContainerResult<T> + Send + Sync + 'static,
    {
        let definition = BeanDefinition::new(name, FunctionFactory::new(factory)).with_scope(scope);
        self.register(definition)
    }

    /// 通过名称获取单例或原型 Bean
    pub fn get_bean(&self, name: &str) -> ContainerResult<Arc<dyn Any + Send + Sync>> {
        self.bean_factory.get_bean(name)
    }

    /// 通过类型获取单例或原型 Bean
    pub fn get_bean_by_type<T: Any + Send + Sync>(&self) -> ContainerResult<Arc<T>> {
        self.bean_factory.get_bean_by_type::<T>()
    }

    /// 通过类型获取可刷新 Bean 的代理
    pub fn get_refreshable<T: Any + Send + Sync>(&self) -> ContainerResult<Arc<ScopedProxy<T>>> {
        self.bean_factory.get_refreshable::<T>()
    }

    /// 通过名称获取可刷新 Bean 的代理
    pub fn get_refreshable_named<T: Any + Send + Sync>(
        &self,
        name: &str,
    ) -> ContainerResult<Arc<ScopedProxy<T>>> {
        self.bean_factory.get_refreshable_named::<T>(name)
    }

    /// 检查是否包含指定名称的 Bean
    pub fn contains_bean(&self, name: &str) -> bool {
        self.bean_factory.contains_bean(name)
    }

    /// 获取所有 Bean 的名称
    pub fn get_bean_names(&self) -> Vec<String> {
        self.bean_factory.get_bean_names()
    }

    /// 初始化所有非延迟加载的单例 Bean
    ///
    /// 可刷新 Bean 不参与预实例化，首次通过代理调用时才创建
    pub fn initialize(&self) -> ContainerResult<()> {
        self.bean_factory.preinstantiate_singletons()
    }

    /// 关闭上下文
    ///
    /// 顺序：发布 ApplicationShutdownEvent -> 执行 shutdown hooks ->
    /// 销毁可刷新实例 -> 销毁单例
    pub fn shutdown(&self) -> ContainerResult<()> {
        tracing::info!("Starting application shutdown");

        // 1. 发布 ApplicationShutdownEvent，监听器失败只记录日志，不中断关闭流程
        let app_name = self
            .get_app_name()
            .unwrap_or_else(|| "Application".to_string());
        if let Err(e) = self.publish_event(ApplicationShutdownEvent::new(app_name)) {
            tracing::warn!("Shutdown event delivery failed: {}", e);
        }

        // 2. 执行所有 shutdown hooks
        {
            let hooks = self.shutdown_hooks.read();
            tracing::info!("Executing {} shutdown hook(s)", hooks.len());
            for (idx, hook) in hooks.iter().enumerate() {
                match hook() {
                    Ok(_) => tracing::debug!("Shutdown hook {} executed successfully", idx + 1),
                    Err(e) => tracing::warn!("Shutdown hook {} failed: {}", idx + 1, e),
                }
            }
        }

        // 3. 销毁所有 beans
        let evicted = self.registry.evict_all();
        tracing::debug!("Destroyed {} refreshable instance(s)", evicted);
        self.bean_factory.destroy_singletons();

        tracing::info!("Application shutdown complete");
        Ok(())
    }
}

impl Default for ApplicationContext {
    fn default() -> Self {
        Self::new()
    }
}

/// 应用上下文构建器
pub struct ApplicationContextBuilder {
    context: ApplicationContext,
}

impl ApplicationContextBuilder {
    pub fn new() -> Self {
        Self {
            context: ApplicationContext::new(),
        }
    }

    /// 注册 Bean
    pub fn register(self, definition: BeanDefinition) -> ContainerResult<Self> {
        self.context.register(definition)?;
        Ok(self)
    }

    /// 注册单例 Bean
    pub fn register_singleton<T, F>(self, name: impl Into<String>, factory: F) -> ContainerResult<Self>
    where
        T: Any + Send + Sync,
        F: Fn(&CreationContext<'_>) -> ContainerResult<T> + Send + Sync + 'static,
    {
        self.context.register_singleton(name, factory)?;
        Ok(self)
    }

    /// 注册可刷新 Bean
    pub fn register_refreshable<T, F>(self, name: impl Into<String>, factory: F) -> ContainerResult<Self>
    where
        T: Any + Send + Sync,
        F: Fn(&CreationContext<'_>) -> ContainerResult<T> + Send + Sync + 'static,
    {
        self.context.register_refreshable(name, factory)?;
        Ok(self)
    }

    /// 添加配置源到 Environment
    pub fn add_property_source(self, source: Box<dyn PropertySource>) -> Self {
        self.context.environment.add_property_source(source);
        self
    }

    /// 构建中的 Environment
    pub fn environment(&self) -> &Arc<Environment> {
        &self.context.environment
    }

    /// 设置激活的 profiles
    pub fn set_active_profiles(self, profiles: Vec<String>) -> Self {
        self.context.environment.set_active_profiles(profiles);
        self
    }

    /// 设置应用名称
    pub fn app_name(self, name: impl Into<String>) -> Self {
        self.context.set_app_name(name);
        self
    }

    /// 构建上下文
    pub fn build(self) -> Arc<ApplicationContext> {
        Arc::new(self.context)
    }
}

impl Default for ApplicationContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MapPropertySource, PropertyResolver};
    use crate::error::ContainerError;
    use parking_lot::Mutex;

    struct Greeting {
        text: String,
    }

    #[test]
    fn test_refresh_listener_is_subscribed_on_construction() {
        let context = ApplicationContext::new();
        assert_eq!(context.event_bus().listener_count(EventKind::Refresh), 1);
    }

    #[test]
    fn test_refresh_environment_publishes_only_changed_keys() {
        let context = ApplicationContext::builder()
            .add_property_source(Box::new(
                MapPropertySource::new("runtime")
                    .with_property("greeting.text", "hello")
                    .with_property("greeting.unused", "same"),
            ))
            .build();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        context.event_bus().subscribe_fn(EventKind::Refresh, "recorder", move |event| {
            if let ApplicationEvent::Refresh(refresh) = event {
                sink.lock().push(refresh.changed_properties.clone());
            }
            Ok(())
        });

        let changed = context
            .refresh_environment(Box::new(
                MapPropertySource::new("runtime")
                    .with_property("greeting.text", "hej")
                    .with_property("greeting.unused", "same"),
            ))
            .unwrap();

        assert_eq!(changed.into_iter().collect::<Vec<_>>(), vec!["greeting.text"]);
        assert_eq!(context.environment().get_string("greeting.text").as_deref(), Some("hej"));
        assert_eq!(seen.lock().len(), 1);

        // 重新加载相同内容不会发布事件
        context
            .refresh_environment(Box::new(
                MapPropertySource::new("runtime")
                    .with_property("greeting.text", "hej")
                    .with_property("greeting.unused", "same"),
            ))
            .unwrap();
        assert_eq!(seen.lock().len(), 1);
    }

    #[test]
    fn test_shutdown_destroys_refreshable_instances_once() {
        let context = ApplicationContext::new();
        let destroyed = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&destroyed);
        context
            .register(
                BeanDefinition::new(
                    "greeting",
                    FunctionFactory::new(|_: &CreationContext<'_>| {
                        Ok(Greeting { text: "hello".to_string() })
                    }),
                )
                .with_scope(Scope::Refreshable)
                .with_destroy(move |g: &Greeting| sink.lock().push(g.text.clone())),
            )
            .unwrap();

        let proxy = context.get_refreshable::<Greeting>().unwrap();
        assert_eq!(proxy.with(|g| g.text.clone()).unwrap(), "hello");

        let hook_ran = Arc::new(Mutex::new(false));
        let flag = Arc::clone(&hook_ran);
        context.register_shutdown_hook(move || {
            *flag.lock() = true;
            Ok(())
        });

        context.shutdown().unwrap();
        assert!(*hook_ran.lock());
        assert_eq!(*destroyed.lock(), vec!["hello"]);
        assert_eq!(context.scope_registry().live_count(), 0);
    }

    #[test]
    fn test_singleton_path_rejects_refreshable_bean() {
        let context = ApplicationContext::new();
        context
            .register_refreshable("greeting", |_: &CreationContext<'_>| {
                Ok(Greeting { text: "hello".to_string() })
            })
            .unwrap();

        assert!(matches!(
            context.get_bean_by_type::<Greeting>(),
            Err(ContainerError::ScopeMismatch { .. })
        ));
    }
}
