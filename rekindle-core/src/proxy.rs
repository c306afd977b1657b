//! Proxy/Handle - 可刷新 Bean 的稳定引用
//!
//! 代理只持有作用域键和注册表的引用，每次调用都通过注册表重新解析目标实例，
//! 因此刷新后所有持有者都能看到新实例，而代理本身的身份保持不变。

use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::bean::BeanDefinition;
use crate::error::{ContainerError, ContainerResult};
use crate::instantiator::LazyInstantiator;
use crate::registry::{Installation, LiveInstance, ScopeRegistry};
use crate::scope::ScopeKey;

/// 可刷新作用域 Bean 的代理
pub struct ScopedProxy<T> {
    key: ScopeKey,
    registry: Arc<ScopeRegistry>,
    definition: Arc<BeanDefinition>,
    instantiator: Arc<LazyInstantiator>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Any + Send + Sync> ScopedProxy<T> {
    /// 创建代理并在注册表中登记空槽
    pub fn new(
        definition: Arc<BeanDefinition>,
        registry: Arc<ScopeRegistry>,
        instantiator: Arc<LazyInstantiator>,
    ) -> ContainerResult<Self> {
        let key = definition.scope_key();
        if key.identity().type_id() != std::any::TypeId::of::<T>() {
            return Err(ContainerError::TypeMismatch {
                expected: std::any::type_name::<T>().to_string(),
                found: definition.type_name().to_string(),
            });
        }
        if !registry.register_slot(&key) {
            return Err(ContainerError::ScopeMismatch {
                name: definition.name.clone(),
                requested: crate::Scope::Refreshable,
                actual: definition.scope,
            });
        }

        Ok(Self {
            key,
            registry,
            definition,
            instantiator,
            _marker: PhantomData,
        })
    }

    /// 代理对应的作用域键
    pub fn key(&self) -> &ScopeKey {
        &self.key
    }

    /// Bean 名称
    pub fn bean_name(&self) -> &str {
        &self.definition.name
    }

    /// 解析当前存活的实例，必要时触发构造
    ///
    /// 返回的 `Arc<T>` 可以在一次请求内持有；之后的刷新不会影响它，
    /// 但也不会被它阻止
    pub fn get(&self) -> ContainerResult<Arc<T>> {
        let live = self.resolve()?;
        Arc::clone(live.instance())
            .downcast::<T>()
            .map_err(|_| ContainerError::TypeMismatch {
                expected: std::any::type_name::<T>().to_string(),
                found: self.definition.type_name().to_string(),
            })
    }

    /// 在当前实例上执行调用，返回值原样透传
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> ContainerResult<R> {
        let target = self.get()?;
        Ok(f(&target))
    }

    /// 在当前实例上执行可能失败的调用
    ///
    /// 方法自身的错误原样返回，解析失败通过 `From<ContainerError>` 转换
    pub fn try_with<R, E>(&self, f: impl FnOnce(&T) -> Result<R, E>) -> Result<R, E>
    where
        E: From<ContainerError>,
    {
        let target = self.get()?;
        f(&target)
    }

    /// 构造期间若发生刷新，构造结果作废并重新构造
    fn resolve(&self) -> ContainerResult<LiveInstance> {
        loop {
            let snapshot = self
                .registry
                .snapshot(&self.key)
                .ok_or_else(|| ContainerError::BeanNotFound(self.key.to_string()))?;
            if let Some(live) = snapshot.live {
                tracing::trace!("Resolved live instance of '{}'", self.key);
                return Ok(live);
            }

            tracing::debug!("No live instance of '{}', creating lazily", self.key);
            let created = self.instantiator.create(&self.definition)?;

            match self
                .registry
                .put_if_absent_at(&self.key, created, snapshot.generation)
            {
                Some(Installation::Live(live)) => return Ok(live),
                Some(Installation::Stale) => {
                    tracing::debug!("'{}' was refreshed during construction, rebuilding", self.key);
                }
                None => return Err(ContainerError::BeanNotFound(self.key.to_string())),
            }
        }
    }
}

impl<T> fmt::Debug for ScopedProxy<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopedProxy")
            .field("key", &self.key)
            .field("bean_name", &self.definition.name)
            .finish()
    }
}
