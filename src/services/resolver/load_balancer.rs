use dashmap::DashMap;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// 实例选择策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadBalanceStrategy {
    /// 按服务轮询
    #[default]
    RoundRobin,
    /// 每次随机选择
    Random,
}

/// 负载均衡器，每个服务维护独立的轮询游标
#[derive(Debug, Default)]
pub(crate) struct LoadBalancer {
    strategy: LoadBalanceStrategy,
    cursors: DashMap<String, Arc<AtomicUsize>>,
}

impl LoadBalancer {
    pub(crate) fn new(strategy: LoadBalanceStrategy) -> Self {
        Self {
            strategy,
            cursors: DashMap::new(),
        }
    }

    pub(crate) fn strategy(&self) -> LoadBalanceStrategy {
        self.strategy
    }

    /// 从地址列表中选择一个，列表为空时返回 `None`
    ///
    /// 调用方需保证同一服务的地址顺序稳定（如排序），轮询才有意义。
    pub(crate) fn select<'a>(&self, service_name: &str, addresses: &'a [String]) -> Option<&'a String> {
        if addresses.len() <= 1 {
            return addresses.first();
        }

        let index = match self.strategy {
            LoadBalanceStrategy::RoundRobin => {
                let cursor = self.cursor(service_name);
                cursor.fetch_add(1, Ordering::Relaxed) % addresses.len()
            }
            LoadBalanceStrategy::Random => rand::thread_rng().gen_range(0..addresses.len()),
        };

        addresses.get(index)
    }

    fn cursor(&self, service_name: &str) -> Arc<AtomicUsize> {
        if let Some(cursor) = self.cursors.get(service_name) {
            return cursor.value().clone();
        }
        self.cursors
            .entry(service_name.to_string())
            .or_insert_with(|| Arc::new(AtomicUsize::new(0)))
            .value()
            .clone()
    }
}
