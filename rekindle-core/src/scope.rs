use std::any::TypeId;
use std::fmt;

/// Bean 的作用域
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    /// 单例模式 - 容器中只有一个实例
    Singleton,

    /// 原型模式 - 每次请求都创建新实例
    Prototype,

    /// 可刷新模式 - 收到 RefreshEvent 后销毁，下次访问时重新创建
    Refreshable,
}

impl Scope {
    /// 是否由 ScopeRegistry 管理
    pub fn is_managed(&self) -> bool {
        matches!(self, Scope::Refreshable)
    }
}

impl Default for Scope {
    fn default() -> Self {
        Scope::Singleton
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Singleton => write!(f, "singleton"),
            Scope::Prototype => write!(f, "prototype"),
            Scope::Refreshable => write!(f, "refreshable"),
        }
    }
}

/// Bean 的身份：类型 + 可选的限定名
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BeanIdentity {
    type_id: TypeId,
    type_name: &'static str,
    qualifier: Option<String>,
}

impl BeanIdentity {
    pub fn of<T: 'static>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            qualifier: None,
        }
    }

    pub(crate) fn from_parts(type_id: TypeId, type_name: &'static str) -> Self {
        Self {
            type_id,
            type_name,
            qualifier: None,
        }
    }

    pub fn with_qualifier(mut self, qualifier: impl Into<String>) -> Self {
        self.qualifier = Some(qualifier.into());
        self
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn qualifier(&self) -> Option<&str> {
        self.qualifier.as_deref()
    }
}

/// 作用域键 - 在 ScopeRegistry 中定位一个实例槽
///
/// 创建后不可变
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScopeKey {
    scope: Scope,
    identity: BeanIdentity,
}

impl ScopeKey {
    pub fn new(scope: Scope, identity: BeanIdentity) -> Self {
        Self { scope, identity }
    }

    /// 可刷新作用域中类型 `T` 的键
    pub fn refreshable<T: 'static>() -> Self {
        Self::new(Scope::Refreshable, BeanIdentity::of::<T>())
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    pub fn identity(&self) -> &BeanIdentity {
        &self.identity
    }
}

impl fmt::Display for ScopeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.identity.qualifier() {
            Some(q) => write!(f, "{}:{}({})", self.scope, self.identity.type_name, q),
            None => write!(f, "{}:{}", self.scope, self.identity.type_name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct WeatherService;

    #[test]
    fn test_qualifier_distinguishes_keys() {
        let plain = ScopeKey::refreshable::<WeatherService>();
        let qualified = ScopeKey::new(
            Scope::Refreshable,
            BeanIdentity::of::<WeatherService>().with_qualifier("backup"),
        );

        assert_ne!(plain, qualified);
        assert_eq!(plain, ScopeKey::refreshable::<WeatherService>());
        assert!(qualified.to_string().ends_with("WeatherService(backup)"));
    }

    #[test]
    fn test_only_refreshable_is_managed() {
        assert!(Scope::Refreshable.is_managed());
        assert!(!Scope::Singleton.is_managed());
        assert!(!Scope::Prototype.is_managed());
    }
}
