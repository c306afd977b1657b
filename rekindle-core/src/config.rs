use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::Path;

use parking_lot::RwLock;

use crate::error::{ContainerError, ContainerResult};

/// 配置值类型
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValue {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Array(Vec<ConfigValue>),
    Object(HashMap<String, ConfigValue>),
}

impl ConfigValue {
    /// 转换为字符串
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConfigValue::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// 转换为整数
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ConfigValue::Int(i) => Some(*i),
            ConfigValue::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// 转换为浮点数
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ConfigValue::Float(f) => Some(*f),
            ConfigValue::Int(i) => Some(*i as f64),
            ConfigValue::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// 转换为布尔值
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ConfigValue::Bool(b) => Some(*b),
            ConfigValue::String(s) => match s.to_lowercase().as_str() {
                "true" | "yes" | "1" => Some(true),
                "false" | "no" | "0" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }
}

impl From<&str> for ConfigValue {
    fn from(value: &str) -> Self {
        ConfigValue::String(value.to_string())
    }
}

impl From<String> for ConfigValue {
    fn from(value: String) -> Self {
        ConfigValue::String(value)
    }
}

impl From<i64> for ConfigValue {
    fn from(value: i64) -> Self {
        ConfigValue::Int(value)
    }
}

impl From<bool> for ConfigValue {
    fn from(value: bool) -> Self {
        ConfigValue::Bool(value)
    }
}

/// 配置读取 trait
///
/// `Environment` 直接实现；Bean 构造期间使用的 `CreationContext` 也实现此 trait，
/// 以便记录构造过程中读取过的配置键
pub trait PropertyResolver {
    /// 获取配置值
    fn get(&self, key: &str) -> Option<ConfigValue>;

    /// 获取字符串配置
    fn get_string(&self, key: &str) -> Option<String> {
        self.get(key).and_then(|v| v.as_str().map(String::from))
    }

    /// 获取字符串配置（带默认值）
    fn get_string_or(&self, key: &str, default: &str) -> String {
        self.get_string(key).unwrap_or_else(|| default.to_string())
    }

    /// 获取整数配置
    fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(|v| v.as_i64())
    }

    /// 获取整数配置（带默认值）
    fn get_i64_or(&self, key: &str, default: i64) -> i64 {
        self.get_i64(key).unwrap_or(default)
    }

    /// 获取浮点数配置
    fn get_f64(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(|v| v.as_f64())
    }

    /// 获取布尔值配置
    fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(|v| v.as_bool())
    }

    /// 获取布尔值配置（带默认值）
    fn get_bool_or(&self, key: &str, default: bool) -> bool {
        self.get_bool(key).unwrap_or(default)
    }
}

/// 配置源 trait
pub trait PropertySource: Send + Sync {
    /// 获取配置源名称
    fn name(&self) -> &str;

    /// 获取配置值
    fn get(&self, key: &str) -> Option<ConfigValue>;

    /// 获取所有配置键
    fn keys(&self) -> Vec<String>;

    /// 配置源优先级（数字越大优先级越高）
    fn priority(&self) -> i32 {
        0
    }
}

/// Environment - 配置管理器
///
/// 按优先级聚合多个配置源，高优先级的值覆盖低优先级的值
pub struct Environment {
    /// 配置源列表（按优先级排序）
    sources: RwLock<Vec<Box<dyn PropertySource>>>,

    /// 当前激活的 profile
    active_profiles: RwLock<Vec<String>>,
}

impl std::fmt::Debug for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Environment")
            .field("active_profiles", &*self.active_profiles.read())
            .field("sources_count", &self.sources.read().len())
            .finish()
    }
}

impl Environment {
    /// 创建新的环境
    pub fn new() -> Self {
        Self {
            sources: RwLock::new(Vec::new()),
            active_profiles: RwLock::new(Vec::new()),
        }
    }

    /// 添加配置源
    pub fn add_property_source(&self, source: Box<dyn PropertySource>) {
        let mut sources = self.sources.write();
        sources.push(source);
        // 按优先级降序排序，稳定排序保证同优先级时后添加的排在后面
        sources.sort_by(|a, b| b.priority().cmp(&a.priority()));
    }

    /// 替换同名配置源（不存在则添加），返回有效值发生变化的配置键
    ///
    /// 只比较旧配置源和新配置源涉及到的键
    pub fn replace_property_source(&self, source: Box<dyn PropertySource>) -> BTreeSet<String> {
        let mut sources = self.sources.write();

        let mut candidates: BTreeSet<String> = source.keys().into_iter().collect();
        let existing = sources.iter().position(|s| s.name() == source.name());
        if let Some(index) = existing {
            candidates.extend(sources[index].keys());
        }

        let before: HashMap<String, Option<ConfigValue>> = candidates
            .iter()
            .map(|key| (key.clone(), Self::lookup(&sources, key)))
            .collect();

        match existing {
            Some(index) => {
                tracing::debug!("Replacing property source '{}'", source.name());
                sources[index] = source;
            }
            None => {
                tracing::debug!("Adding property source '{}'", source.name());
                sources.push(source);
            }
        }
        sources.sort_by(|a, b| b.priority().cmp(&a.priority()));

        candidates
            .into_iter()
            .filter(|key| before.get(key).cloned().flatten() != Self::lookup(&sources, key))
            .collect()
    }

    fn lookup(sources: &[Box<dyn PropertySource>], key: &str) -> Option<ConfigValue> {
        sources.iter().find_map(|source| source.get(key))
    }

    /// 获取字符串数组配置
    /// 支持两种格式:
    /// 1. TOML数组: key = ["a", "b", "c"]
    /// 2. 逗号分隔字符串: key = "a, b, c"
    pub fn get_string_array(&self, key: &str) -> Option<Vec<String>> {
        match PropertyResolver::get(self, key)? {
            ConfigValue::Array(arr) => {
                Some(arr.iter().filter_map(|v| v.as_str().map(String::from)).collect())
            }
            ConfigValue::String(s) => Some(
                s.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
            ),
            _ => None,
        }
    }

    /// 设置激活的 profile
    pub fn set_active_profiles(&self, profiles: Vec<String>) {
        *self.active_profiles.write() = profiles;
    }

    /// 获取激活的 profile
    pub fn get_active_profiles(&self) -> Vec<String> {
        self.active_profiles.read().clone()
    }

    /// 检查是否包含指定的 profile
    pub fn accepts_profiles(&self, profile: &str) -> bool {
        self.active_profiles.read().iter().any(|p| p == profile)
    }
}

impl PropertyResolver for Environment {
    fn get(&self, key: &str) -> Option<ConfigValue> {
        let sources = self.sources.read();
        for source in sources.iter() {
            if let Some(value) = source.get(key) {
                tracing::trace!("Config '{}' found in source '{}'", key, source.name());
                return Some(value);
            }
        }
        tracing::trace!("Config '{}' not found in any source", key);
        None
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

// ========== Property Sources ==========

/// 环境变量配置源
pub struct EnvironmentPropertySource {
    prefix: String,
    priority: i32,
}

impl EnvironmentPropertySource {
    /// 创建环境变量配置源
    ///
    /// # 参数
    /// * `prefix` - 环境变量前缀，例如 "APP_"
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            priority: 100,
        }
    }

    /// 将环境变量名转换为配置键
    /// 例如: APP_DATABASE_URL -> database.url
    fn env_to_key(&self, env_key: &str) -> String {
        env_key
            .strip_prefix(&self.prefix)
            .unwrap_or(env_key)
            .to_lowercase()
            .replace('_', ".")
    }

    /// 将配置键转换为环境变量名
    /// 例如: database.url -> APP_DATABASE_URL
    fn key_to_env(&self, key: &str) -> String {
        format!(
            "{}{}",
            self.prefix,
            key.replace(['.', '-'], "_").to_uppercase()
        )
    }
}

impl PropertySource for EnvironmentPropertySource {
    fn name(&self) -> &str {
        "environment"
    }

    fn get(&self, key: &str) -> Option<ConfigValue> {
        std::env::var(self.key_to_env(key))
            .ok()
            .map(ConfigValue::String)
    }

    fn keys(&self) -> Vec<String> {
        std::env::vars()
            .filter(|(k, _)| k.starts_with(&self.prefix))
            .map(|(k, _)| self.env_to_key(&k))
            .collect()
    }

    fn priority(&self) -> i32 {
        self.priority
    }
}

/// TOML 文件配置源
pub struct TomlPropertySource {
    name: String,
    properties: HashMap<String, ConfigValue>,
    priority: i32,
}

impl TomlPropertySource {
    /// 从文件加载 TOML 配置
    pub fn from_file(path: impl AsRef<Path>) -> ContainerResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            ContainerError::Configuration(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        Self::parse(&content, path.to_string_lossy().to_string())
    }

    /// 从字符串解析 TOML 配置
    pub fn parse(content: &str, name: impl Into<String>) -> ContainerResult<Self> {
        let value: toml::Value = toml::from_str(content)
            .map_err(|e| ContainerError::Configuration(format!("Failed to parse TOML: {}", e)))?;

        let mut properties = HashMap::new();
        Self::flatten_toml(&value, String::new(), &mut properties);

        Ok(Self {
            name: name.into(),
            properties,
            priority: 0,
        })
    }

    /// 展平 TOML 结构
    /// 例如: { database: { url: "xxx" } } -> { "database.url": "xxx" }
    fn flatten_toml(value: &toml::Value, prefix: String, result: &mut HashMap<String, ConfigValue>) {
        match value {
            toml::Value::Table(table) => {
                for (key, val) in table {
                    let new_prefix = if prefix.is_empty() {
                        key.clone()
                    } else {
                        format!("{}.{}", prefix, key)
                    };
                    Self::flatten_toml(val, new_prefix, result);
                }
            }
            other => {
                result.insert(prefix, Self::toml_value_to_config(other));
            }
        }
    }

    /// 转换 TOML 值为 ConfigValue
    fn toml_value_to_config(value: &toml::Value) -> ConfigValue {
        match value {
            toml::Value::String(s) => ConfigValue::String(s.clone()),
            toml::Value::Integer(i) => ConfigValue::Int(*i),
            toml::Value::Float(f) => ConfigValue::Float(*f),
            toml::Value::Boolean(b) => ConfigValue::Bool(*b),
            toml::Value::Array(arr) => {
                ConfigValue::Array(arr.iter().map(Self::toml_value_to_config).collect())
            }
            toml::Value::Table(table) => ConfigValue::Object(
                table
                    .iter()
                    .map(|(k, v)| (k.clone(), Self::toml_value_to_config(v)))
                    .collect(),
            ),
            toml::Value::Datetime(dt) => ConfigValue::String(dt.to_string()),
        }
    }

    /// 设置优先级
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

impl PropertySource for TomlPropertySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn get(&self, key: &str) -> Option<ConfigValue> {
        self.properties.get(key).cloned()
    }

    fn keys(&self) -> Vec<String> {
        self.properties.keys().cloned().collect()
    }

    fn priority(&self) -> i32 {
        self.priority
    }
}

/// 内存配置源（用于测试或运行时配置）
pub struct MapPropertySource {
    name: String,
    properties: HashMap<String, ConfigValue>,
    priority: i32,
}

impl MapPropertySource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            properties: HashMap::new(),
            priority: 50,
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<ConfigValue>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

impl PropertySource for MapPropertySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn get(&self, key: &str) -> Option<ConfigValue> {
        self.properties.get(key).cloned()
    }

    fn keys(&self) -> Vec<String> {
        self.properties.keys().cloned().collect()
    }

    fn priority(&self) -> i32 {
        self.priority
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_priority_order() {
        let env = Environment::new();
        env.add_property_source(Box::new(
            MapPropertySource::new("low").with_property("weather.city", "Paris").with_priority(1),
        ));
        env.add_property_source(Box::new(
            MapPropertySource::new("high").with_property("weather.city", "Oslo").with_priority(10),
        ));

        assert_eq!(env.get_string("weather.city").as_deref(), Some("Oslo"));
        assert_eq!(env.get_string_or("weather.unit", "celsius"), "celsius");
    }

    #[test]
    fn test_toml_flattening() {
        let source = TomlPropertySource::parse(
            r#"
            [server]
            host = "127.0.0.1"
            port = 9090

            [weather]
            cities = ["Oslo", "Lima"]
            "#,
            "inline",
        )
        .unwrap();

        assert_eq!(source.get("server.port"), Some(ConfigValue::Int(9090)));
        assert_eq!(
            source.get("server.host"),
            Some(ConfigValue::String("127.0.0.1".to_string()))
        );

        let env = Environment::new();
        env.add_property_source(Box::new(source));
        assert_eq!(
            env.get_string_array("weather.cities"),
            Some(vec!["Oslo".to_string(), "Lima".to_string()])
        );
    }

    #[test]
    fn test_toml_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[app]\nname = \"forecast\"").unwrap();

        let source = TomlPropertySource::from_file(file.path()).unwrap();
        assert_eq!(source.get("app.name"), Some(ConfigValue::from("forecast")));
    }

    #[test]
    fn test_invalid_toml_is_configuration_error() {
        let result = TomlPropertySource::parse("[broken", "inline");
        assert!(matches!(result, Err(ContainerError::Configuration(_))));
    }

    #[test]
    fn test_replace_reports_only_changed_keys() {
        let env = Environment::new();
        env.add_property_source(Box::new(
            MapPropertySource::new("runtime")
                .with_property("weather.city", "Oslo")
                .with_property("weather.unit", "celsius"),
        ));

        let changed = env.replace_property_source(Box::new(
            MapPropertySource::new("runtime")
                .with_property("weather.city", "Lima")
                .with_property("weather.unit", "celsius")
                .with_property("weather.source", "radar"),
        ));

        let expected: BTreeSet<String> = ["weather.city", "weather.source"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(changed, expected);
        assert_eq!(env.get_string("weather.city").as_deref(), Some("Lima"));
    }

    #[test]
    fn test_replace_shadowed_key_is_not_a_change() {
        let env = Environment::new();
        env.add_property_source(Box::new(
            MapPropertySource::new("override")
                .with_property("weather.city", "Oslo")
                .with_priority(90),
        ));

        let changed = env.replace_property_source(Box::new(
            MapPropertySource::new("runtime").with_property("weather.city", "Lima"),
        ));

        assert!(changed.is_empty());
        assert_eq!(env.get_string("weather.city").as_deref(), Some("Oslo"));
    }

    #[test]
    fn test_env_key_mapping() {
        let source = EnvironmentPropertySource::new("APP_");
        assert_eq!(source.key_to_env("database.url"), "APP_DATABASE_URL");
        assert_eq!(source.env_to_key("APP_DATABASE_URL"), "database.url");
    }

    #[test]
    fn test_active_profiles() {
        let env = Environment::new();
        env.set_active_profiles(vec!["dev".to_string()]);
        assert!(env.accepts_profiles("dev"));
        assert!(!env.accepts_profiles("prod"));
    }
}
