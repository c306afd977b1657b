//! Bean Factory - 核心容器实现
//!
//! 持有 Bean 定义、单例缓存和可刷新 Bean 的代理缓存。可刷新 Bean 的实例
//! 不在这里缓存，而是交给 `ScopeRegistry` 管理

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::bean::BeanDefinition;
use crate::config::Environment;
use crate::error::{ContainerError, ContainerResult};
use crate::instantiator::LazyInstantiator;
use crate::proxy::ScopedProxy;
use crate::registry::{LiveInstance, ScopeRegistry};
use crate::Scope;

/// BeanFactory - 最基础的容器接口
///
/// 此 trait 不包含泛型方法，因此可以作为 trait object 使用
pub trait BeanFactory: Send + Sync {
    /// 通过名称获取 Bean（单例或原型）
    fn get_bean(&self, name: &str) -> ContainerResult<Arc<dyn Any + Send + Sync>>;

    /// 检查是否包含指定名称的 Bean
    fn contains_bean(&self, name: &str) -> bool;
}

/// ListableBeanFactory - 可列举的 Bean 工厂
pub trait ListableBeanFactory: BeanFactory {
    /// 获取所有 Bean 的名称
    fn get_bean_names(&self) -> Vec<String>;

    /// 获取指定作用域的 Bean 名称
    fn get_bean_names_for_scope(&self, scope: Scope) -> Vec<String>;

    /// 获取 Bean 定义的数量
    fn get_bean_definition_count(&self) -> usize;
}

/// DefaultListableBeanFactory - 默认的 Bean 容器实现
pub struct DefaultListableBeanFactory {
    /// Bean 定义存储
    definitions: RwLock<HashMap<String, Arc<BeanDefinition>>>,

    /// 单例 Bean 缓存
    singletons: RwLock<HashMap<String, LiveInstance>>,

    /// 可刷新 Bean 的代理缓存（值为 `Arc<ScopedProxy<T>>`）
    proxies: RwLock<HashMap<String, Arc<dyn Any + Send + Sync>>>,

    /// 类型到名称的映射
    type_to_name: RwLock<HashMap<TypeId, Vec<String>>>,

    /// 受管作用域实例的注册表
    registry: Arc<ScopeRegistry>,

    /// 实例构造器
    instantiator: Arc<LazyInstantiator>,
}

impl DefaultListableBeanFactory {
    /// 创建新的 Bean 工厂
    pub fn new(environment: Arc<Environment>, registry: Arc<ScopeRegistry>) -> Self {
        Self {
            definitions: RwLock::new(HashMap::new()),
            singletons: RwLock::new(HashMap::new()),
            proxies: RwLock::new(HashMap::new()),
            type_to_name: RwLock::new(HashMap::new()),
            registry,
            instantiator: Arc::new(LazyInstantiator::new(environment)),
        }
    }

    /// 注册 Bean 定义
    pub fn register_bean_definition(&self, definition: BeanDefinition) -> ContainerResult<()> {
        let name = definition.name.clone();

        tracing::trace!(
            "Attempting to register bean: name='{}', type='{}', scope={}",
            name,
            definition.type_name(),
            definition.scope
        );

        let type_id = definition.identity.type_id();
        {
            let mut definitions = self.definitions.write();
            if definitions.contains_key(&name) {
                tracing::warn!("Bean '{}' already exists, registration failed", name);
                return Err(ContainerError::BeanAlreadyExists(name));
            }
            definitions.insert(name.clone(), Arc::new(definition));
        }

        self.type_to_name
            .write()
            .entry(type_id)
            .or_default()
            .push(name.clone());

        tracing::debug!("Bean definition registered successfully: '{}'", name);
        Ok(())
    }

    /// 获取 Bean 定义
    pub fn get_bean_definition(&self, name: &str) -> ContainerResult<Arc<BeanDefinition>> {
        self.definitions
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| ContainerError::BeanNotFound(name.to_string()))
    }

    /// 按类型查找唯一的 Bean 名称，同类型有多个 Bean 时需按名称获取
    fn name_for_type<T: Any>(&self) -> ContainerResult<String> {
        let type_to_name = self.type_to_name.read();
        match type_to_name.get(&TypeId::of::<T>()).map(Vec::as_slice) {
            Some([name]) => Ok(name.clone()),
            Some(candidates) if !candidates.is_empty() => Err(ContainerError::NoUniqueBean {
                type_name: std::any::type_name::<T>().to_string(),
                candidates: candidates.to_vec(),
            }),
            _ => Err(ContainerError::BeanNotFound(format!(
                "No bean found for type '{}'",
                std::any::type_name::<T>()
            ))),
        }
    }

    /// 通过类型获取单例或原型 Bean
    pub fn get_bean_by_type<T: Any + Send + Sync>(&self) -> ContainerResult<Arc<T>> {
        let name = self.name_for_type::<T>()?;
        self.get_bean(&name)?
            .downcast::<T>()
            .map_err(|_| ContainerError::TypeMismatch {
                expected: std::any::type_name::<T>().to_string(),
                found: format!("bean '{}'", name),
            })
    }

    /// 检查是否包含指定类型的 Bean
    pub fn contains_bean_by_type<T: Any>(&self) -> bool {
        self.type_to_name.read().contains_key(&TypeId::of::<T>())
    }

    /// 通过类型获取可刷新 Bean 的代理
    pub fn get_refreshable<T: Any + Send + Sync>(&self) -> ContainerResult<Arc<ScopedProxy<T>>> {
        let name = self.name_for_type::<T>()?;
        self.get_refreshable_named(&name)
    }

    /// 通过名称获取可刷新 Bean 的代理
    ///
    /// 同一个名称总是返回同一个代理对象
    pub fn get_refreshable_named<T: Any + Send + Sync>(
        &self,
        name: &str,
    ) -> ContainerResult<Arc<ScopedProxy<T>>> {
        if let Some(proxy) = self.proxies.read().get(name) {
            return Self::downcast_proxy(name, Arc::clone(proxy));
        }

        let definition = self.get_bean_definition(name)?;
        if definition.scope != Scope::Refreshable {
            return Err(ContainerError::ScopeMismatch {
                name: name.to_string(),
                requested: Scope::Refreshable,
                actual: definition.scope,
            });
        }

        let mut proxies = self.proxies.write();
        // 双重检查，另一个线程可能已经创建了代理
        if let Some(proxy) = proxies.get(name) {
            return Self::downcast_proxy(name, Arc::clone(proxy));
        }

        let proxy = Arc::new(ScopedProxy::<T>::new(
            definition,
            Arc::clone(&self.registry),
            Arc::clone(&self.instantiator),
        )?);
        proxies.insert(name.to_string(), proxy.clone() as Arc<dyn Any + Send + Sync>);
        tracing::debug!("Created scoped proxy for refreshable bean '{}'", name);
        Ok(proxy)
    }

    fn downcast_proxy<T: Any + Send + Sync>(
        name: &str,
        proxy: Arc<dyn Any + Send + Sync>,
    ) -> ContainerResult<Arc<ScopedProxy<T>>> {
        proxy
            .downcast::<ScopedProxy<T>>()
            .map_err(|_| ContainerError::TypeMismatch {
                expected: std::any::type_name::<T>().to_string(),
                found: format!("proxy of bean '{}'", name),
            })
    }

    /// 预实例化所有非延迟加载的单例 Bean
    pub fn preinstantiate_singletons(&self) -> ContainerResult<()> {
        let bean_names: Vec<String> = self
            .definitions
            .read()
            .iter()
            .filter(|(_, def)| def.scope == Scope::Singleton && !def.lazy)
            .map(|(name, _)| name.clone())
            .collect();

        tracing::debug!("Pre-instantiating {} singleton beans", bean_names.len());

        for name in bean_names {
            self.get_bean(&name)?;
        }

        Ok(())
    }

    /// 销毁所有单例 Bean（调用 destroy 回调）
    pub fn destroy_singletons(&self) {
        tracing::info!("Destroying singleton beans");

        let beans: Vec<(String, LiveInstance)> = self.singletons.write().drain().collect();

        for (name, live) in beans {
            let Ok(definition) = self.get_bean_definition(&name) else {
                continue;
            };
            if let Some(destroy_fn) = &definition.destroy_callback {
                match destroy_fn(live.instance().as_ref()) {
                    Ok(()) => tracing::debug!("Bean '{}' destroyed successfully", name),
                    Err(e) => tracing::warn!("Failed to destroy bean '{}': {}", name, e),
                }
            }
        }

        tracing::info!("Singleton beans destruction completed");
    }

    /// 受管作用域注册表
    pub fn registry(&self) -> &Arc<ScopeRegistry> {
        &self.registry
    }
}

impl BeanFactory for DefaultListableBeanFactory {
    fn get_bean(&self, name: &str) -> ContainerResult<Arc<dyn Any + Send + Sync>> {
        tracing::trace!("Requesting bean: '{}'", name);

        let definition = self.get_bean_definition(name).map_err(|e| {
            tracing::debug!("Bean '{}' not found in container", name);
            e
        })?;

        match definition.scope {
            Scope::Singleton => {
                if let Some(live) = self.singletons.read().get(name) {
                    tracing::trace!("Returning cached instance of singleton bean '{}'", name);
                    return Ok(Arc::clone(live.instance()));
                }

                tracing::info!("Creating shared instance of singleton bean '{}'", name);
                let created = self.instantiator.create(&definition)?;

                // 并发创建时保留先写入的实例
                let mut singletons = self.singletons.write();
                let live = singletons.entry(name.to_string()).or_insert(created);
                Ok(Arc::clone(live.instance()))
            }
            Scope::Prototype => {
                tracing::debug!("Creating new instance of prototype bean '{}'", name);
                let created = self.instantiator.create(&definition)?;
                Ok(Arc::clone(created.instance()))
            }
            Scope::Refreshable => Err(ContainerError::ScopeMismatch {
                name: name.to_string(),
                requested: Scope::Singleton,
                actual: Scope::Refreshable,
            }),
        }
    }

    fn contains_bean(&self, name: &str) -> bool {
        self.definitions.read().contains_key(name)
    }
}

impl ListableBeanFactory for DefaultListableBeanFactory {
    fn get_bean_names(&self) -> Vec<String> {
        self.definitions.read().keys().cloned().collect()
    }

    fn get_bean_names_for_scope(&self, scope: Scope) -> Vec<String> {
        self.definitions
            .read()
            .iter()
            .filter(|(_, def)| def.scope == scope)
            .map(|(name, _)| name.clone())
            .collect()
    }

    fn get_bean_definition_count(&self) -> usize {
        self.definitions.read().len()
    }
}
