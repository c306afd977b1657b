use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

use crate::error::{ContainerError, ContainerResult};
use crate::instantiator::CreationContext;
use crate::scope::{BeanIdentity, ScopeKey};
use crate::utils::naming::default_bean_name;
use crate::{IntoResult, Scope};

/// 实例工厂 trait - 用于创建 Bean 实例
pub trait InstanceFactory: Send + Sync {
    /// 创建 Bean 实例
    ///
    /// 通过 `ctx` 读取的配置键会被记录为实例的敏感配置集合
    fn create(&self, ctx: &CreationContext<'_>) -> ContainerResult<Box<dyn Any + Send + Sync>>;

    /// 获取 Bean 的类型 ID
    fn type_id(&self) -> TypeId;

    /// 获取 Bean 的类型名称
    fn type_name(&self) -> &'static str;
}

/// 生命周期回调类型
pub type InitCallback = Box<dyn Fn(&mut dyn Any) -> ContainerResult<()> + Send + Sync>;
pub type DestroyCallback = Arc<dyn Fn(&dyn Any) -> ContainerResult<()> + Send + Sync>;

/// Bean 定义 - 描述如何创建和管理 Bean
pub struct BeanDefinition {
    /// Bean 的名称
    pub name: String,

    /// Bean 的身份（类型 + 限定名）
    pub identity: BeanIdentity,

    /// Bean 的作用域
    pub scope: Scope,

    /// 实例工厂
    pub factory: Box<dyn InstanceFactory>,

    /// 是否延迟初始化（仅对单例有效，可刷新 Bean 总是延迟创建）
    pub lazy: bool,

    /// 初始化回调（@PostConstruct）
    pub init_callback: Option<InitCallback>,

    /// 销毁回调（@PreDestroy），可刷新 Bean 在被逐出时调用
    pub destroy_callback: Option<DestroyCallback>,
}

impl BeanDefinition {
    /// 创建新的 Bean 定义
    pub fn new<F>(name: impl Into<String>, factory: F) -> Self
    where
        F: InstanceFactory + 'static,
    {
        let identity = BeanIdentity::from_parts(
            InstanceFactory::type_id(&factory),
            InstanceFactory::type_name(&factory),
        );
        Self {
            name: name.into(),
            identity,
            scope: Scope::default(),
            factory: Box::new(factory),
            lazy: false,
            init_callback: None,
            destroy_callback: None,
        }
    }

    /// 使用默认名称创建 Bean 定义（类型名的 camelCase 形式）
    pub fn from_factory<F>(factory: F) -> Self
    where
        F: InstanceFactory + 'static,
    {
        let name = default_bean_name(InstanceFactory::type_name(&factory));
        Self::new(name, factory)
    }

    /// 设置作用域
    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    /// 设置限定名
    pub fn with_qualifier(mut self, qualifier: impl Into<String>) -> Self {
        self.identity = self.identity.with_qualifier(qualifier);
        self
    }

    /// 设置延迟初始化
    pub fn with_lazy(mut self, lazy: bool) -> Self {
        self.lazy = lazy;
        self
    }

    /// 设置初始化回调
    ///
    /// 回调签名中的 `T` 必须与工厂产出的类型一致
    pub fn with_init<T, F, R>(mut self, init_fn: F) -> Self
    where
        T: Any,
        F: Fn(&mut T) -> R + Send + Sync + 'static,
        R: IntoResult,
    {
        let name = self.name.clone();
        self.init_callback = Some(Box::new(move |bean: &mut dyn Any| {
            let bean = bean.downcast_mut::<T>().ok_or_else(|| ContainerError::TypeMismatch {
                expected: std::any::type_name::<T>().to_string(),
                found: format!("instance of bean '{}'", name),
            })?;
            init_fn(bean).into_result()
        }));
        self
    }

    /// 设置销毁回调
    pub fn with_destroy<T, F, R>(mut self, destroy_fn: F) -> Self
    where
        T: Any,
        F: Fn(&T) -> R + Send + Sync + 'static,
        R: IntoResult,
    {
        let name = self.name.clone();
        self.destroy_callback = Some(Arc::new(move |bean: &dyn Any| {
            let bean = bean.downcast_ref::<T>().ok_or_else(|| ContainerError::TypeMismatch {
                expected: std::any::type_name::<T>().to_string(),
                found: format!("instance of bean '{}'", name),
            })?;
            destroy_fn(bean).into_result()
        }));
        self
    }

    /// 在 ScopeRegistry 中对应的键
    pub fn scope_key(&self) -> ScopeKey {
        ScopeKey::new(self.scope, self.identity.clone())
    }

    /// Bean 的类型名称
    pub fn type_name(&self) -> &'static str {
        self.factory.type_name()
    }
}

impl fmt::Debug for BeanDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BeanDefinition")
            .field("name", &self.name)
            .field("scope", &self.scope)
            .field("lazy", &self.lazy)
            .field("type_name", &self.factory.type_name())
            .field("qualifier", &self.identity.qualifier())
            .finish()
    }
}

/// 简单的函数工厂实现
pub struct FunctionFactory<T, F>
where
    T: Any + Send + Sync,
    F: Fn(&CreationContext<'_>) -> ContainerResult<T> + Send + Sync,
{
    factory_fn: F,
    _phantom: std::marker::PhantomData<fn() -> T>,
}

impl<T, F> FunctionFactory<T, F>
where
    T: Any + Send + Sync,
    F: Fn(&CreationContext<'_>) -> ContainerResult<T> + Send + Sync,
{
    pub fn new(factory_fn: F) -> Self {
        Self {
            factory_fn,
            _phantom: std::marker::PhantomData,
        }
    }
}

impl<T, F> InstanceFactory for FunctionFactory<T, F>
where
    T: Any + Send + Sync,
    F: Fn(&CreationContext<'_>) -> ContainerResult<T> + Send + Sync,
{
    fn create(&self, ctx: &CreationContext<'_>) -> ContainerResult<Box<dyn Any + Send + Sync>> {
        let instance = (self.factory_fn)(ctx)?;
        Ok(Box::new(instance))
    }

    fn type_id(&self) -> TypeId {
        TypeId::of::<T>()
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }
}
