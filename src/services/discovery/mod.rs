//! Service discovery contract
//!
//! - `clock`: time source used to stamp and evaluate liveness
//! - `error`: discovery error taxonomy
//!
//! Business code depends only on [`Discovery`]; the in-memory backend lives in
//! `services::registry`.

pub mod clock;
pub mod error;

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::DiscoveryError;

/// 默认存活窗口：超过该时长未上报心跳的实例不再对外可见
pub const DEFAULT_LIVENESS_WINDOW: Duration = Duration::from_secs(5);

/// 服务发现能力集合，内存实现与外部注册中心实现都遵循此接口
#[async_trait]
pub trait Discovery: Send + Sync + std::fmt::Debug {
    /// 注册（或覆盖）实例记录，并将最近活跃时间设为当前时间
    async fn register(
        &self,
        instance_id: &str,
        service_name: &str,
        host_port: &str,
    ) -> Result<(), DiscoveryError>;

    /// 注销实例；服务或实例不存在时视为成功
    async fn deregister(&self, instance_id: &str, service_name: &str)
    -> Result<(), DiscoveryError>;

    /// 上报健康状态，仅对已注册实例有效
    async fn report_healthy(
        &self,
        instance_id: &str,
        service_name: &str,
    ) -> Result<(), DiscoveryError>;

    /// 返回存活窗口内所有实例的地址；结果为空时返回 `NotFound`
    async fn service_addresses(&self, service_name: &str)
    -> Result<HashSet<String>, DiscoveryError>;
}

/// 生成进程内唯一的实例 ID
pub fn generate_instance_id(service_name: &str) -> String {
    format!("{}-{}", service_name, Uuid::new_v4())
}
