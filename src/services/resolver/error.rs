use crate::services::discovery::DiscoveryError;

/// 解析器错误类型
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),
    #[error("Transport error calling {service} at {address}: {message}")]
    Transport {
        service: String,
        address: String,
        message: String,
    },
    #[error("Timeout calling {service} at {address}")]
    Timeout { service: String, address: String },
    #[error("Discovery error: {0}")]
    Discovery(#[from] DiscoveryError),
}
