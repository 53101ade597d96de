use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::load_balancer::LoadBalanceStrategy;

/// 解析器配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// 实例选择策略
    pub strategy: LoadBalanceStrategy,
    /// 下游请求超时秒数，不设置则由调用方自行控制
    pub request_timeout_secs: Option<u64>,
}

impl ResolverConfig {
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }
}
