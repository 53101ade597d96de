//! Client-side resolver: logical service name -> one live address -> downstream call.

pub mod config;
pub mod error;
pub(crate) mod load_balancer;

pub use config::ResolverConfig;
pub use error::ResolveError;
pub use load_balancer::LoadBalanceStrategy;

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;

use crate::services::discovery::{Discovery, DiscoveryError};
use load_balancer::LoadBalancer;

/// 服务解析器
///
/// 只负责选址和错误归类，不做重试；`NotFound` 直接表现为服务不可用。
#[derive(Debug)]
pub struct Resolver {
    discovery: Arc<dyn Discovery>,
    balancer: LoadBalancer,
    config: ResolverConfig,
}

impl Resolver {
    pub fn new(discovery: Arc<dyn Discovery>, config: ResolverConfig) -> Self {
        Self {
            discovery,
            balancer: LoadBalancer::new(config.strategy),
            config,
        }
    }

    pub fn strategy(&self) -> LoadBalanceStrategy {
        self.balancer.strategy()
    }

    /// 解析出一个存活实例的地址
    pub async fn resolve(&self, service_name: &str) -> Result<String, ResolveError> {
        let addresses = match self.discovery.service_addresses(service_name).await {
            Ok(addresses) => addresses,
            Err(DiscoveryError::NotFound(service)) => {
                return Err(ResolveError::ServiceUnavailable(service));
            }
            Err(e) => return Err(e.into()),
        };

        // 注册表返回无序集合，排序后轮询才稳定
        let mut addresses: Vec<String> = addresses.into_iter().collect();
        addresses.sort_unstable();

        let address = self
            .balancer
            .select(service_name, &addresses)
            .cloned()
            .ok_or_else(|| ResolveError::ServiceUnavailable(service_name.to_string()))?;

        tracing::debug!(
            service_name = %service_name,
            address = %address,
            candidates = addresses.len(),
            "Resolved service address"
        );
        Ok(address)
    }

    /// 解析地址并发起下游请求
    ///
    /// `request` 的错误被归类为 [`ResolveError::Transport`]；配置了超时时，
    /// 超时返回 [`ResolveError::Timeout`]。
    pub async fn call<F, Fut, T, E>(&self, service_name: &str, request: F) -> Result<T, ResolveError>
    where
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let address = self.resolve(service_name).await?;
        let fut = request(address.clone());

        let result = match self.config.request_timeout() {
            Some(timeout) => match tokio::time::timeout(timeout, fut).await {
                Ok(result) => result,
                Err(_) => {
                    tracing::warn!(
                        service_name = %service_name,
                        address = %address,
                        timeout_ms = timeout.as_millis() as u64,
                        "Downstream call timed out"
                    );
                    return Err(ResolveError::Timeout {
                        service: service_name.to_string(),
                        address,
                    });
                }
            },
            None => fut.await,
        };

        result.map_err(|e| {
            tracing::warn!(
                service_name = %service_name,
                address = %address,
                error = %e,
                "Downstream call failed"
            );
            ResolveError::Transport {
                service: service_name.to_string(),
                address,
                message: e.to_string(),
            }
        })
    }
}
