//! Refresh Listener - 收到 RefreshEvent 时逐出可刷新作用域中的实例
//!
//! 这里只负责销毁，不做重建；重建推迟到下一次通过代理访问时

use std::sync::Arc;

use crate::error::ContainerResult;
use crate::event::{ApplicationEvent, EventListener, RefreshEvent};
use crate::registry::{RefreshPredicate, ScopeRegistry};
use crate::Scope;

/// 刷新作用域监听器
pub struct RefreshScopeListener {
    registry: Arc<ScopeRegistry>,
}

impl RefreshScopeListener {
    pub const NAME: &'static str = "refreshScopeListener";

    pub fn new(registry: Arc<ScopeRegistry>) -> Self {
        Self { registry }
    }

    /// 由刷新事件计算逐出条件
    pub fn predicate_for(event: &RefreshEvent) -> RefreshPredicate {
        match &event.changed_properties {
            None => RefreshPredicate::Unconditional,
            Some(keys) => RefreshPredicate::Changed(keys.clone()),
        }
    }
}

impl EventListener for RefreshScopeListener {
    fn on_event(&self, event: &ApplicationEvent) -> ContainerResult<()> {
        if let ApplicationEvent::Refresh(refresh) = event {
            let predicate = Self::predicate_for(refresh);
            let evicted = self.registry.evict_if(Scope::Refreshable, &predicate);
            for key in &evicted {
                tracing::debug!("Refreshed bean '{}'", key);
            }
        }
        Ok(())
    }

    fn listener_name(&self) -> &str {
        Self::NAME
    }
}
