use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;

use parking_lot::RwLock;

use crate::error::{ContainerError, ContainerResult, ListenerFailure};

/// 事件类型标识，用作分发表的键
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Started,
    Refresh,
    Shutdown,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::Started => write!(f, "ApplicationStartedEvent"),
            EventKind::Refresh => write!(f, "RefreshEvent"),
            EventKind::Shutdown => write!(f, "ApplicationShutdownEvent"),
        }
    }
}

/// 应用启动完成事件
///
/// 在应用完全启动并初始化所有单例 Bean 后触发
#[derive(Debug, Clone)]
pub struct ApplicationStartedEvent {
    /// 应用名称
    pub app_name: String,
    /// 启动耗时（毫秒）
    pub startup_time_ms: u128,
    /// 事件时间戳
    pub timestamp: SystemTime,
}

impl ApplicationStartedEvent {
    pub fn new(app_name: impl Into<String>, startup_time_ms: u128) -> Self {
        Self {
            app_name: app_name.into(),
            startup_time_ms,
            timestamp: SystemTime::now(),
        }
    }
}

/// 刷新事件
///
/// `changed_properties` 为 `None` 表示刷新作用域内的全部 Bean；
/// 为 `Some` 时只刷新敏感配置与之有交集的 Bean（空集合不刷新任何 Bean）
#[derive(Debug, Clone)]
pub struct RefreshEvent {
    /// 发生变化的配置键
    pub changed_properties: Option<BTreeSet<String>>,
    /// 事件时间戳
    pub timestamp: SystemTime,
}

impl RefreshEvent {
    /// 无条件刷新
    pub fn new() -> Self {
        Self {
            changed_properties: None,
            timestamp: SystemTime::now(),
        }
    }

    /// 只针对给定配置键的刷新
    pub fn with_changed<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            changed_properties: Some(keys.into_iter().map(Into::into).collect()),
            timestamp: SystemTime::now(),
        }
    }

    pub fn is_unconditional(&self) -> bool {
        self.changed_properties.is_none()
    }
}

impl Default for RefreshEvent {
    fn default() -> Self {
        Self::new()
    }
}

/// 应用关闭事件
///
/// 在应用开始关闭时触发
#[derive(Debug, Clone)]
pub struct ApplicationShutdownEvent {
    /// 应用名称
    pub app_name: String,
    /// 事件时间戳
    pub timestamp: SystemTime,
}

impl ApplicationShutdownEvent {
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
            timestamp: SystemTime::now(),
        }
    }
}

/// 应用事件
#[derive(Debug, Clone)]
pub enum ApplicationEvent {
    Started(ApplicationStartedEvent),
    Refresh(RefreshEvent),
    Shutdown(ApplicationShutdownEvent),
}

impl ApplicationEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            ApplicationEvent::Started(_) => EventKind::Started,
            ApplicationEvent::Refresh(_) => EventKind::Refresh,
            ApplicationEvent::Shutdown(_) => EventKind::Shutdown,
        }
    }

    pub fn timestamp(&self) -> SystemTime {
        match self {
            ApplicationEvent::Started(e) => e.timestamp,
            ApplicationEvent::Refresh(e) => e.timestamp,
            ApplicationEvent::Shutdown(e) => e.timestamp,
        }
    }
}

impl From<ApplicationStartedEvent> for ApplicationEvent {
    fn from(event: ApplicationStartedEvent) -> Self {
        ApplicationEvent::Started(event)
    }
}

impl From<RefreshEvent> for ApplicationEvent {
    fn from(event: RefreshEvent) -> Self {
        ApplicationEvent::Refresh(event)
    }
}

impl From<ApplicationShutdownEvent> for ApplicationEvent {
    fn from(event: ApplicationShutdownEvent) -> Self {
        ApplicationEvent::Shutdown(event)
    }
}

/// 事件监听器 trait
///
/// 同步执行，返回的错误会被事件总线收集
pub trait EventListener: Send + Sync {
    /// 处理事件
    fn on_event(&self, event: &ApplicationEvent) -> ContainerResult<()>;

    /// 获取监听器名称（用于日志）
    fn listener_name(&self) -> &str {
        "AnonymousListener"
    }
}

/// 闭包监听器
pub struct FnListener<F> {
    name: String,
    callback: F,
}

impl<F> FnListener<F>
where
    F: Fn(&ApplicationEvent) -> ContainerResult<()> + Send + Sync,
{
    pub fn new(name: impl Into<String>, callback: F) -> Self {
        Self {
            name: name.into(),
            callback,
        }
    }
}

impl<F> EventListener for FnListener<F>
where
    F: Fn(&ApplicationEvent) -> ContainerResult<()> + Send + Sync,
{
    fn on_event(&self, event: &ApplicationEvent) -> ContainerResult<()> {
        (self.callback)(event)
    }

    fn listener_name(&self) -> &str {
        &self.name
    }
}

/// 事件总线
///
/// 按注册顺序同步分发事件。单个监听器失败（返回错误或 panic）不会中断
/// 后续监听器，所有失败在分发结束后汇总返回给发布者
#[derive(Default)]
pub struct EventBus {
    /// (事件类型, 监听器) 分发表，插入顺序即分发顺序
    listeners: RwLock<Vec<(EventKind, Arc<dyn EventListener>)>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册监听器，重复注册会导致重复分发
    pub fn subscribe(&self, kind: EventKind, listener: Arc<dyn EventListener>) {
        tracing::debug!("Added event listener '{}' for {}", listener.listener_name(), kind);
        self.listeners.write().push((kind, listener));
    }

    /// 注册闭包监听器
    pub fn subscribe_fn<F>(&self, kind: EventKind, name: impl Into<String>, callback: F)
    where
        F: Fn(&ApplicationEvent) -> ContainerResult<()> + Send + Sync + 'static,
    {
        self.subscribe(kind, Arc::new(FnListener::new(name, callback)));
    }

    /// 发布事件
    pub fn publish(&self, event: impl Into<ApplicationEvent>) -> ContainerResult<()> {
        let event = event.into();
        let kind = event.kind();

        // 克隆监听器列表，避免在回调期间持锁（监听器可能会再次订阅或发布）
        let targets: Vec<Arc<dyn EventListener>> = self
            .listeners
            .read()
            .iter()
            .filter(|(k, _)| *k == kind)
            .map(|(_, l)| Arc::clone(l))
            .collect();

        tracing::debug!("Publishing {} to {} listener(s)", kind, targets.len());

        let mut failures = Vec::new();
        for listener in targets {
            if let Some(error) = Self::invoke_listener(listener.as_ref(), &event) {
                tracing::error!(
                    "Listener '{}' failed while handling {}: {}",
                    listener.listener_name(),
                    kind,
                    error
                );
                failures.push(ListenerFailure {
                    listener: listener.listener_name().to_string(),
                    error,
                });
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(ContainerError::EventDelivery {
                event: kind.to_string(),
                failures,
            })
        }
    }

    /// 调用单个监听器，把错误和 panic 统一转换为 anyhow::Error
    fn invoke_listener(listener: &dyn EventListener, event: &ApplicationEvent) -> Option<anyhow::Error> {
        match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| listener.on_event(event))) {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(anyhow::Error::new(e)),
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic payload".to_string());
                Some(anyhow::anyhow!("Listener panicked: {}", message))
            }
        }
    }

    /// 获取某类事件的监听器数量
    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.listeners.read().iter().filter(|(k, _)| *k == kind).count()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listeners.read().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn recorder(log: &Arc<Mutex<Vec<String>>>, name: &'static str) -> Arc<dyn EventListener> {
        let log = Arc::clone(log);
        Arc::new(FnListener::new(name, move |_: &ApplicationEvent| {
            log.lock().push(name.to_string());
            Ok(())
        }))
    }

    #[test]
    fn test_delivery_follows_registration_order() {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        bus.subscribe(EventKind::Refresh, recorder(&log, "first"));
        bus.subscribe(EventKind::Shutdown, recorder(&log, "shutdown-only"));
        bus.subscribe(EventKind::Refresh, recorder(&log, "second"));

        bus.publish(RefreshEvent::new()).unwrap();
        assert_eq!(*log.lock(), vec!["first", "second"]);
    }

    #[test]
    fn test_duplicate_registration_delivers_twice() {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let listener = recorder(&log, "twice");

        bus.subscribe(EventKind::Refresh, Arc::clone(&listener));
        bus.subscribe(EventKind::Refresh, listener);

        bus.publish(RefreshEvent::new()).unwrap();
        assert_eq!(log.lock().len(), 2);
        assert_eq!(bus.listener_count(EventKind::Refresh), 2);
    }

    #[test]
    fn test_failures_are_aggregated_after_all_listeners_ran() {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        bus.subscribe_fn(EventKind::Refresh, "failing", |_| {
            Err(ContainerError::Configuration("cache unavailable".to_string()))
        });
        bus.subscribe(EventKind::Refresh, recorder(&log, "after-error"));
        bus.subscribe_fn(EventKind::Refresh, "panicking", |_| panic!("listener exploded"));
        bus.subscribe(EventKind::Refresh, recorder(&log, "after-panic"));

        let result = bus.publish(RefreshEvent::new());

        assert_eq!(*log.lock(), vec!["after-error", "after-panic"]);
        match result {
            Err(ContainerError::EventDelivery { event, failures }) => {
                assert_eq!(event, "RefreshEvent");
                assert_eq!(failures.len(), 2);
                assert_eq!(failures[0].listener, "failing");
                assert!(failures[0].error.to_string().contains("cache unavailable"));
                assert_eq!(failures[1].listener, "panicking");
                assert!(failures[1].error.to_string().contains("listener exploded"));
            }
            other => panic!("expected aggregated failure, got {:?}", other),
        }
    }

    #[test]
    fn test_publish_without_listeners_is_ok() {
        let bus = EventBus::new();
        assert!(bus.publish(ApplicationShutdownEvent::new("forecast")).is_ok());
    }

    #[test]
    fn test_refresh_event_constructors() {
        assert!(RefreshEvent::new().is_unconditional());

        let event = RefreshEvent::with_changed(["weather.city"]);
        assert!(!event.is_unconditional());
        assert_eq!(
            ApplicationEvent::from(event).kind(),
            EventKind::Refresh
        );
    }
}
