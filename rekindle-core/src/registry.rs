//! Scope Registry - 受管作用域实例的唯一持有者
//!
//! 每个 `ScopeKey` 对应一个实例槽，槽内要么为空，要么持有一个存活实例及其
//! 构造元数据。对同一个键的 `get`/`put`/`evict` 通过槽上的互斥锁串行化。
//!
//! 每个槽还带有一个代数（generation），每次逐出都会递增。构造发生在锁外，
//! 安装时若代数已经变化，说明构造期间发生过刷新，该实例会被拒绝。

use std::any::Any;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;

use parking_lot::{Mutex, RwLock};

use crate::bean::DestroyCallback;
use crate::scope::{Scope, ScopeKey};

/// 存活实例及其构造元数据
#[derive(Clone)]
pub struct LiveInstance {
    instance: Arc<dyn Any + Send + Sync>,
    sensitive_properties: BTreeSet<String>,
    created_at: SystemTime,
    teardown: Option<DestroyCallback>,
}

impl LiveInstance {
    pub fn new(
        instance: Arc<dyn Any + Send + Sync>,
        sensitive_properties: BTreeSet<String>,
    ) -> Self {
        Self {
            instance,
            sensitive_properties,
            created_at: SystemTime::now(),
            teardown: None,
        }
    }

    /// 设置逐出时执行的销毁回调
    pub fn with_teardown(mut self, teardown: Option<DestroyCallback>) -> Self {
        self.teardown = teardown;
        self
    }

    pub fn instance(&self) -> &Arc<dyn Any + Send + Sync> {
        &self.instance
    }

    /// 构造期间读取过的配置键
    pub fn sensitive_properties(&self) -> &BTreeSet<String> {
        &self.sensitive_properties
    }

    pub fn created_at(&self) -> SystemTime {
        self.created_at
    }

    /// 两个句柄是否指向同一个实例
    pub fn same_instance(&self, other: &LiveInstance) -> bool {
        Arc::ptr_eq(&self.instance, &other.instance)
    }

    /// 执行销毁回调，失败只记录日志
    fn destroy(&self, key: &ScopeKey) {
        if let Some(teardown) = &self.teardown {
            match teardown(self.instance.as_ref()) {
                Ok(()) => tracing::debug!("Bean '{}' destroyed successfully", key),
                Err(e) => tracing::warn!("Failed to destroy bean '{}': {}", key, e),
            }
        }
    }
}

impl fmt::Debug for LiveInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveInstance")
            .field("sensitive_properties", &self.sensitive_properties)
            .field("created_at", &self.created_at)
            .field("has_teardown", &self.teardown.is_some())
            .finish()
    }
}

/// 逐出条件
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshPredicate {
    /// 无条件逐出作用域内的所有实例
    Unconditional,

    /// 只逐出敏感配置与变更配置有交集的实例
    Changed(BTreeSet<String>),
}

impl RefreshPredicate {
    /// 是否命中给定的敏感配置集合
    pub fn matches(&self, sensitive_properties: &BTreeSet<String>) -> bool {
        match self {
            RefreshPredicate::Unconditional => true,
            RefreshPredicate::Changed(changed) => {
                !changed.is_disjoint(sensitive_properties)
            }
        }
    }
}

#[derive(Default)]
struct SlotState {
    live: Option<LiveInstance>,
    generation: u64,
}

type InstanceSlot = Mutex<SlotState>;

/// 槽在某一时刻的状态
#[derive(Debug, Clone)]
pub struct SlotSnapshot {
    /// 当前存活的实例
    pub live: Option<LiveInstance>,
    /// 读取时槽的代数，安装新实例时需要带回
    pub generation: u64,
}

/// `put_if_absent_at` 的结果
#[derive(Debug, Clone)]
pub enum Installation {
    /// 安装后槽中存活的实例（可能是并发调用方先装入的）
    Live(LiveInstance),
    /// 构造开始后槽被逐出过，实例未安装
    Stale,
}

/// 作用域注册表
#[derive(Default)]
pub struct ScopeRegistry {
    slots: RwLock<HashMap<ScopeKey, Arc<InstanceSlot>>>,
}

impl ScopeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 为键创建一个空槽（已存在则保持不变）
    ///
    /// 在代理注册时调用。非受管作用域的键会被拒绝
    pub fn register_slot(&self, key: &ScopeKey) -> bool {
        if !key.scope().is_managed() {
            tracing::warn!("Refusing to register slot for unmanaged scope: {}", key);
            return false;
        }

        let mut slots = self.slots.write();
        if slots.contains_key(key) {
            return true;
        }
        slots.insert(key.clone(), Arc::new(Mutex::new(SlotState::default())));
        tracing::debug!("Registered empty slot for '{}'", key);
        true
    }

    fn slot(&self, key: &ScopeKey) -> Option<Arc<InstanceSlot>> {
        self.slots.read().get(key).cloned()
    }

    /// 获取存活实例，永远不会触发构造
    pub fn get(&self, key: &ScopeKey) -> Option<LiveInstance> {
        let slot = self.slot(key)?;
        let live = slot.lock().live.clone();
        live
    }

    /// 同时读取存活实例和槽的代数，未注册的键返回 `None`
    pub fn snapshot(&self, key: &ScopeKey) -> Option<SlotSnapshot> {
        let slot = self.slot(key)?;
        let state = slot.lock();
        Some(SlotSnapshot {
            live: state.live.clone(),
            generation: state.generation,
        })
    }

    /// 安装实例，覆盖旧实例但不销毁它
    ///
    /// 返回被覆盖的实例；如需销毁由调用方负责。键未注册时返回 `None` 并丢弃实例
    pub fn put(&self, key: &ScopeKey, instance: LiveInstance) -> Option<LiveInstance> {
        let Some(slot) = self.slot(key) else {
            tracing::warn!("Cannot install instance for unregistered key '{}'", key);
            return None;
        };
        let previous = slot.lock().live.replace(instance);
        tracing::debug!("Installed instance for '{}'", key);
        previous
    }

    /// 仅当槽为空时安装实例，返回安装后槽中存活的实例
    ///
    /// 并发重建时只有一个实例会留在槽中，落败方的实例被直接丢弃
    pub fn put_if_absent(&self, key: &ScopeKey, instance: LiveInstance) -> Option<LiveInstance> {
        let slot = self.slot(key)?;
        let mut state = slot.lock();
        Some(Self::install(key, &mut state, instance))
    }

    /// 与 `put_if_absent` 相同，但只在槽的代数仍为 `generation` 时安装
    ///
    /// 代数变化说明构造期间槽被逐出过，实例可能基于旧配置构造，返回 `Stale`
    pub fn put_if_absent_at(
        &self,
        key: &ScopeKey,
        instance: LiveInstance,
        generation: u64,
    ) -> Option<Installation> {
        let slot = self.slot(key)?;
        let mut state = slot.lock();
        if state.generation != generation {
            tracing::debug!(
                "Slot '{}' was evicted during construction (generation {} -> {}), discarding instance",
                key,
                generation,
                state.generation
            );
            return Some(Installation::Stale);
        }
        Some(Installation::Live(Self::install(key, &mut state, instance)))
    }

    fn install(key: &ScopeKey, state: &mut SlotState, instance: LiveInstance) -> LiveInstance {
        if let Some(winner) = &state.live {
            tracing::debug!(
                "Instance for '{}' already installed by a concurrent caller, discarding ours",
                key
            );
            return winner.clone();
        }
        state.live = Some(instance.clone());
        tracing::debug!("Installed instance for '{}'", key);
        instance
    }

    /// 原子地清空槽并执行销毁回调
    ///
    /// 对空槽或未知键调用返回 `None`；空槽的代数仍会递增，使进行中的构造失效
    pub fn evict(&self, key: &ScopeKey) -> Option<LiveInstance> {
        let slot = self.slot(key)?;
        let evicted = {
            let mut state = slot.lock();
            state.generation += 1;
            state.live.take()
        };
        if let Some(live) = &evicted {
            tracing::debug!("Evicted instance of '{}'", key);
            live.destroy(key);
        }
        evicted
    }

    /// 逐出作用域内所有命中条件的实例，返回被逐出的键
    ///
    /// 空槽的敏感配置未知（可能正在构造），一律递增代数
    pub fn evict_if(&self, scope: Scope, predicate: &RefreshPredicate) -> Vec<ScopeKey> {
        let candidates: Vec<(ScopeKey, Arc<InstanceSlot>)> = self
            .slots
            .read()
            .iter()
            .filter(|(key, _)| key.scope() == scope)
            .map(|(key, slot)| (key.clone(), Arc::clone(slot)))
            .collect();

        let mut evicted = Vec::new();
        for (key, slot) in candidates {
            let taken = {
                let mut state = slot.lock();
                let hit = state
                    .live
                    .as_ref()
                    .map_or(true, |live| predicate.matches(live.sensitive_properties()));
                if hit {
                    state.generation += 1;
                    state.live.take()
                } else {
                    None
                }
            };

            if let Some(live) = taken {
                tracing::debug!("Evicted instance of '{}'", key);
                live.destroy(&key);
                evicted.push(key);
            }
        }

        tracing::info!(
            "Evicted {} {} bean(s) ({:?})",
            evicted.len(),
            scope,
            predicate
        );
        evicted
    }

    /// 逐出所有受管实例（容器关闭时调用）
    pub fn evict_all(&self) -> usize {
        let keys: Vec<ScopeKey> = self.slots.read().keys().cloned().collect();
        keys.iter().filter(|key| self.evict(key).is_some()).count()
    }

    /// 当前持有存活实例的槽数量
    pub fn live_count(&self) -> usize {
        self.slots
            .read()
            .values()
            .filter(|slot| slot.lock().live.is_some())
            .count()
    }

    /// 已注册的槽数量
    pub fn slot_count(&self) -> usize {
        self.slots.read().len()
    }
}

impl fmt::Debug for ScopeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopeRegistry")
            .field("slots", &self.slot_count())
            .field("live", &self.live_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ContainerResult;
    use crate::scope::BeanIdentity;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Forecast;
    struct Radar;

    fn live(value: &'static str, sensitive: &[&str]) -> LiveInstance {
        LiveInstance::new(
            Arc::new(value.to_string()),
            sensitive.iter().map(|s| s.to_string()).collect(),
        )
    }

    fn changed(keys: &[&str]) -> RefreshPredicate {
        RefreshPredicate::Changed(keys.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn test_get_never_constructs() {
        let registry = ScopeRegistry::new();
        let key = ScopeKey::refreshable::<Forecast>();
        assert!(registry.get(&key).is_none());

        registry.register_slot(&key);
        assert!(registry.get(&key).is_none());
        assert_eq!(registry.live_count(), 0);
    }

    #[test]
    fn test_unmanaged_scope_is_rejected() {
        let registry = ScopeRegistry::new();
        let key = ScopeKey::new(Scope::Singleton, BeanIdentity::of::<Forecast>());

        assert!(!registry.register_slot(&key));
        assert!(registry.put(&key, live("a", &[])).is_none());
        assert!(registry.get(&key).is_none());
    }

    #[test]
    fn test_put_overwrites_without_destroying() {
        let registry = ScopeRegistry::new();
        let key = ScopeKey::refreshable::<Forecast>();
        registry.register_slot(&key);

        let destroyed = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&destroyed);
        let first = live("a", &[]).with_teardown(Some(Arc::new(move |_: &dyn Any| -> ContainerResult<()> {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })));

        assert!(registry.put(&key, first.clone()).is_none());
        let displaced = registry.put(&key, live("b", &[])).unwrap();

        assert!(displaced.same_instance(&first));
        assert_eq!(destroyed.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_put_if_absent_keeps_winner() {
        let registry = ScopeRegistry::new();
        let key = ScopeKey::refreshable::<Forecast>();
        registry.register_slot(&key);

        let winner = live("winner", &[]);
        let loser = live("loser", &[]);

        let installed = registry.put_if_absent(&key, winner.clone()).unwrap();
        assert!(installed.same_instance(&winner));

        let resolved = registry.put_if_absent(&key, loser).unwrap();
        assert!(resolved.same_instance(&winner));
        assert!(registry.get(&key).unwrap().same_instance(&winner));
    }

    #[test]
    fn test_install_after_eviction_is_stale() {
        let registry = ScopeRegistry::new();
        let key = ScopeKey::refreshable::<Forecast>();
        registry.register_slot(&key);

        let before = registry.snapshot(&key).unwrap();
        assert!(before.live.is_none());

        // 构造进行中时发生刷新，槽仍为空
        let evicted = registry.evict_if(Scope::Refreshable, &changed(&["weather.city"]));
        assert!(evicted.is_empty());

        let outcome = registry
            .put_if_absent_at(&key, live("oslo", &["weather.city"]), before.generation)
            .unwrap();
        assert!(matches!(outcome, Installation::Stale));
        assert!(registry.get(&key).is_none());

        let after = registry.snapshot(&key).unwrap();
        let outcome = registry
            .put_if_absent_at(&key, live("lima", &["weather.city"]), after.generation)
            .unwrap();
        assert!(matches!(outcome, Installation::Live(_)));
        assert_eq!(registry.live_count(), 1);
    }

    #[test]
    fn test_unmatched_live_slot_keeps_generation() {
        let registry = ScopeRegistry::new();
        let key = ScopeKey::refreshable::<Forecast>();
        registry.register_slot(&key);
        registry.put(&key, live("forecast", &["weather.city"]));

        let before = registry.snapshot(&key).unwrap();
        registry.evict_if(Scope::Refreshable, &changed(&["radar.range"]));
        let after = registry.snapshot(&key).unwrap();

        assert_eq!(before.generation, after.generation);
        assert!(after.live.is_some());
    }

    #[test]
    fn test_double_eviction_is_noop() {
        let registry = ScopeRegistry::new();
        let key = ScopeKey::refreshable::<Forecast>();
        registry.register_slot(&key);

        let destroyed = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&destroyed);
        registry.put(
            &key,
            live("a", &[]).with_teardown(Some(Arc::new(move |_: &dyn Any| -> ContainerResult<()> {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }))),
        );

        assert!(registry.evict(&key).is_some());
        assert!(registry.evict(&key).is_none());
        assert_eq!(destroyed.load(Ordering::SeqCst), 1);

        let unknown = ScopeKey::refreshable::<Radar>();
        assert!(registry.evict(&unknown).is_none());
    }

    #[test]
    fn test_selective_eviction() {
        let registry = ScopeRegistry::new();
        let forecast = ScopeKey::refreshable::<Forecast>();
        let radar = ScopeKey::refreshable::<Radar>();
        registry.register_slot(&forecast);
        registry.register_slot(&radar);
        registry.put(&forecast, live("forecast", &["weather.city"]));
        registry.put(&radar, live("radar", &["radar.range"]));

        let evicted = registry.evict_if(Scope::Refreshable, &changed(&["unrelated.key"]));
        assert!(evicted.is_empty());
        assert_eq!(registry.live_count(), 2);

        let evicted = registry.evict_if(Scope::Refreshable, &changed(&["weather.city"]));
        assert_eq!(evicted, vec![forecast.clone()]);
        assert!(registry.get(&forecast).is_none());
        assert!(registry.get(&radar).is_some());

        let evicted = registry.evict_if(Scope::Refreshable, &RefreshPredicate::Unconditional);
        assert_eq!(evicted, vec![radar.clone()]);
        assert_eq!(registry.live_count(), 0);
    }

    #[test]
    fn test_empty_changed_set_matches_nothing() {
        let predicate = changed(&[]);
        assert!(!predicate.matches(&["weather.city".to_string()].into_iter().collect()));
        assert!(!predicate.matches(&BTreeSet::new()));
        assert!(RefreshPredicate::Unconditional.matches(&BTreeSet::new()));
    }

    #[test]
    fn test_teardown_failure_does_not_stop_sweep() {
        let registry = ScopeRegistry::new();
        let forecast = ScopeKey::refreshable::<Forecast>();
        let radar = ScopeKey::refreshable::<Radar>();
        registry.register_slot(&forecast);
        registry.register_slot(&radar);

        let failing: DestroyCallback =
            Arc::new(|_: &dyn Any| -> ContainerResult<()> {
                Err(anyhow::anyhow!("socket already closed").into())
            });
        registry.put(&forecast, live("forecast", &[]).with_teardown(Some(failing.clone())));
        registry.put(&radar, live("radar", &[]).with_teardown(Some(failing)));

        let evicted = registry.evict_if(Scope::Refreshable, &RefreshPredicate::Unconditional);
        assert_eq!(evicted.len(), 2);
        assert_eq!(registry.live_count(), 0);
    }

    #[test]
    fn test_concurrent_rebuild_leaves_single_winner() {
        let registry = Arc::new(ScopeRegistry::new());
        let key = ScopeKey::refreshable::<Forecast>();
        registry.register_slot(&key);

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let registry = Arc::clone(&registry);
                let key = key.clone();
                std::thread::spawn(move || {
                    let candidate = LiveInstance::new(Arc::new(i), BTreeSet::new());
                    registry.put_if_absent(&key, candidate).unwrap()
                })
            })
            .collect();

        let resolved: Vec<LiveInstance> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let live = registry.get(&key).unwrap();
        assert!(resolved.iter().all(|r| r.same_instance(&live)));
    }
}
