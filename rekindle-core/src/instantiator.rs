//! Lazy Instantiator - 构造实例、执行初始化回调并记录敏感配置

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::bean::BeanDefinition;
use crate::config::{ConfigValue, Environment, PropertyResolver};
use crate::error::{ContainerError, ContainerResult};
use crate::registry::LiveInstance;
use crate::utils::dependency::CreationTracker;

/// Bean 构造上下文
///
/// 工厂通过它读取配置，读取过的键会成为实例的敏感配置集合
pub struct CreationContext<'a> {
    bean_name: &'a str,
    environment: &'a Environment,
    accessed: RefCell<BTreeSet<String>>,
}

impl<'a> CreationContext<'a> {
    pub fn new(bean_name: &'a str, environment: &'a Environment) -> Self {
        Self {
            bean_name,
            environment,
            accessed: RefCell::new(BTreeSet::new()),
        }
    }

    /// 正在构造的 Bean 名称
    pub fn bean_name(&self) -> &str {
        self.bean_name
    }

    /// 显式声明依赖某个配置键（即使构造期间没有读取它）
    pub fn depends_on_property(&self, key: impl Into<String>) {
        self.accessed.borrow_mut().insert(key.into());
    }

    /// 到目前为止读取过的配置键
    pub fn accessed_properties(&self) -> BTreeSet<String> {
        self.accessed.borrow().clone()
    }

    fn into_accessed(self) -> BTreeSet<String> {
        self.accessed.into_inner()
    }
}

impl PropertyResolver for CreationContext<'_> {
    fn get(&self, key: &str) -> Option<ConfigValue> {
        self.accessed.borrow_mut().insert(key.to_string());
        self.environment.get(key)
    }
}

/// 延迟实例化器
///
/// 构造失败不会重试，错误原样返回给触发构造的调用方
pub struct LazyInstantiator {
    environment: Arc<Environment>,
    creation_tracker: CreationTracker,
}

impl LazyInstantiator {
    pub fn new(environment: Arc<Environment>) -> Self {
        Self {
            environment,
            creation_tracker: CreationTracker::new(),
        }
    }

    pub fn environment(&self) -> &Arc<Environment> {
        &self.environment
    }

    /// 构造新实例
    ///
    /// 顺序：工厂构造 -> 初始化回调 -> 记录敏感配置。任一步失败都不会产出实例
    pub fn create(&self, definition: &BeanDefinition) -> ContainerResult<LiveInstance> {
        let name = definition.name.as_str();

        if !self.creation_tracker.start_creating(name) {
            let chain = self.creation_tracker.current_creating();
            return Err(ContainerError::CircularDependency(format!(
                "{} -> {}",
                chain.join(" -> "),
                name
            )));
        }

        // 使用 RAII 模式确保在任何情况下都会清理标记
        struct CreationGuard<'a> {
            tracker: &'a CreationTracker,
            name: &'a str,
        }

        impl Drop for CreationGuard<'_> {
            fn drop(&mut self) {
                self.tracker.finish_creating(self.name);
            }
        }

        let _guard = CreationGuard {
            tracker: &self.creation_tracker,
            name,
        };

        tracing::debug!("Creating instance of {} bean '{}'", definition.scope, name);

        let ctx = CreationContext::new(name, &self.environment);
        let mut instance = definition.factory.create(&ctx)?;

        if let Some(init_fn) = &definition.init_callback {
            init_fn(instance.as_mut())?;
        }

        let sensitive = ctx.into_accessed();
        if !sensitive.is_empty() {
            tracing::trace!("Bean '{}' is sensitive to {:?}", name, sensitive);
        }

        Ok(LiveInstance::new(Arc::from(instance), sensitive)
            .with_teardown(definition.destroy_callback.clone()))
    }
}
