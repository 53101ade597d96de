use thiserror::Error;

/// 服务发现错误类型
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiscoveryError {
    /// 该服务没有任何存活实例（或从未注册）
    #[error("No live instances for service: {0}")]
    NotFound(String),

    /// 心跳上报的服务名从未注册
    #[error("Service is not registered yet: {0}")]
    NotRegistered(String),

    /// 服务名已知，但实例 ID 未注册
    #[error("Service instance is not registered yet: {service}/{instance}")]
    InstanceNotRegistered { service: String, instance: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// 外部注册中心的传输错误，原样透传
    #[error("Backend error: {0}")]
    Backend(String),
}

impl DiscoveryError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, DiscoveryError::NotFound(_))
    }
}
