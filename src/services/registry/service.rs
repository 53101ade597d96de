use std::collections::HashSet;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::task::TaskTracker;

use super::types::{InstanceRecord, RegistryStats, ServiceTable};
use crate::services::discovery::{
    Clock, DEFAULT_LIVENESS_WINDOW, Discovery, DiscoveryError, SystemClock,
};

/// 内存服务注册表
///
/// 克隆后共享同一张服务表。所有操作都在一次加锁内完成，
/// 读操作使用读锁，注册/注销/心跳使用写锁，锁不会跨越 `.await`。
#[derive(Debug, Clone)]
pub struct MemoryRegistry {
    table: Arc<RwLock<ServiceTable>>,
    clock: Arc<dyn Clock>,
    liveness_window: Duration,
    pub(super) task_tracker: TaskTracker,
}

impl Default for MemoryRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_LIVENESS_WINDOW)
    }
}

impl MemoryRegistry {
    pub fn new(liveness_window: Duration) -> Self {
        Self::with_clock(liveness_window, Arc::new(SystemClock))
    }

    pub fn with_clock(liveness_window: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            table: Arc::new(RwLock::new(ServiceTable::new())),
            clock,
            liveness_window,
            task_tracker: TaskTracker::new(),
        }
    }

    pub fn liveness_window(&self) -> Duration {
        self.liveness_window
    }

    // 表内的每次修改都是单步完成的，锁中毒时表仍然一致，直接取回
    fn read(&self) -> RwLockReadGuard<'_, ServiceTable> {
        self.table.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, ServiceTable> {
        self.table.write().unwrap_or_else(PoisonError::into_inner)
    }

    // 获取注册表统计
    pub fn stats(&self) -> RegistryStats {
        let table = self.read();
        let now = self.clock.now();

        let mut stats = RegistryStats {
            services: table.len(),
            ..Default::default()
        };
        for instances in table.values() {
            stats.instances += instances.len();
            stats.live_instances += instances
                .values()
                .filter(|record| record.is_live(now, self.liveness_window))
                .count();
        }
        stats
    }

    /// 返回某服务下全部实例的快照（包括已过期的实例）
    pub fn instances(&self, service_name: &str) -> Vec<(String, InstanceRecord)> {
        self.read()
            .get(service_name)
            .map(|instances| {
                instances
                    .iter()
                    .map(|(id, record)| (id.clone(), record.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// 删除闲置时间不小于 `max_age` 的实例，返回删除数量
    ///
    /// 删除后为空的服务也会一并移除。
    pub fn reap_expired(&self, max_age: Duration) -> usize {
        let mut table = self.write();
        let now = self.clock.now();
        let mut removed = 0;

        table.retain(|service_name, instances| {
            instances.retain(|instance_id, record| {
                let idle = record.idle_for(now);
                if idle >= max_age {
                    tracing::warn!(
                        service_name = %service_name,
                        instance_id = %instance_id,
                        idle_secs = idle.as_secs(),
                        "Instance expired, removing from registry"
                    );
                    removed += 1;
                    false
                } else {
                    true
                }
            });
            !instances.is_empty()
        });

        removed
    }
}

#[async_trait]
impl Discovery for MemoryRegistry {
    async fn register(
        &self,
        instance_id: &str,
        service_name: &str,
        host_port: &str,
    ) -> Result<(), DiscoveryError> {
        if service_name.is_empty() {
            return Err(DiscoveryError::InvalidInput(
                "service name cannot be empty".into(),
            ));
        }
        if instance_id.is_empty() {
            return Err(DiscoveryError::InvalidInput(
                "instance id cannot be empty".into(),
            ));
        }

        let mut table = self.write();
        let record = InstanceRecord::new(host_port, self.clock.now());
        let previous = table
            .entry(service_name.to_string())
            .or_default()
            .insert(instance_id.to_string(), record);
        drop(table);

        tracing::info!(
            service_name = %service_name,
            instance_id = %instance_id,
            host_port = %host_port,
            overwritten = previous.is_some(),
            "Registered service instance"
        );
        Ok(())
    }

    async fn deregister(
        &self,
        instance_id: &str,
        service_name: &str,
    ) -> Result<(), DiscoveryError> {
        let removed = self
            .write()
            .get_mut(service_name)
            .and_then(|instances| instances.remove(instance_id));

        if removed.is_some() {
            tracing::info!(
                service_name = %service_name,
                instance_id = %instance_id,
                "Deregistered service instance"
            );
        } else {
            tracing::debug!(
                service_name = %service_name,
                instance_id = %instance_id,
                "Deregister for unknown instance ignored"
            );
        }
        Ok(())
    }

    async fn report_healthy(
        &self,
        instance_id: &str,
        service_name: &str,
    ) -> Result<(), DiscoveryError> {
        let mut table = self.write();
        let now = self.clock.now();

        let instances = table
            .get_mut(service_name)
            .ok_or_else(|| DiscoveryError::NotRegistered(service_name.to_string()))?;
        let record = instances.get_mut(instance_id).ok_or_else(|| {
            DiscoveryError::InstanceNotRegistered {
                service: service_name.to_string(),
                instance: instance_id.to_string(),
            }
        })?;
        record.touch(now);
        drop(table);

        tracing::debug!(
            service_name = %service_name,
            instance_id = %instance_id,
            "Updated heartbeat for service instance"
        );
        Ok(())
    }

    async fn service_addresses(
        &self,
        service_name: &str,
    ) -> Result<HashSet<String>, DiscoveryError> {
        let addresses: HashSet<String> = {
            let table = self.read();
            let now = self.clock.now();
            table
                .get(service_name)
                .into_iter()
                .flat_map(|instances| instances.values())
                .filter(|record| record.is_live(now, self.liveness_window))
                .map(|record| record.host_port.clone())
                .collect()
        };

        if addresses.is_empty() {
            tracing::debug!(service_name = %service_name, "No live instances for service");
            return Err(DiscoveryError::NotFound(service_name.to_string()));
        }
        Ok(addresses)
    }
}
