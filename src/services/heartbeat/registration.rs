use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::{Heartbeat, HeartbeatHandle};
use crate::services::discovery::{Discovery, DiscoveryError, generate_instance_id};

/// 注册并启动心跳，返回注册守卫
///
/// 心跳绑定在 `shutdown` 的子令牌上，进程关闭时随之停止。
pub async fn register_instance(
    discovery: Arc<dyn Discovery>,
    service_name: &str,
    host_port: &str,
    interval: Duration,
    shutdown: &CancellationToken,
) -> Result<ServiceRegistration, DiscoveryError> {
    if interval.is_zero() {
        return Err(DiscoveryError::InvalidInput(
            "heartbeat interval must be positive".into(),
        ));
    }

    let instance_id = generate_instance_id(service_name);
    discovery
        .register(&instance_id, service_name, host_port)
        .await?;

    let heartbeat = Heartbeat::spawn(
        discovery.clone(),
        instance_id.clone(),
        service_name.to_string(),
        interval,
        shutdown.child_token(),
    );

    Ok(ServiceRegistration {
        discovery,
        instance_id,
        service_name: service_name.to_string(),
        host_port: host_port.to_string(),
        heartbeat: Some(heartbeat),
        deregistered: false,
    })
}

/// 服务实例注册守卫
///
/// 正常退出时调用 [`ServiceRegistration::shutdown`]，只有它保证注销完成。
/// 若守卫在此之前被丢弃（提前返回或 panic），`Drop` 会停止心跳，并在当前
/// 运行时上派生一个不被追踪的注销任务；运行时正在关闭时该任务可能来不及执行，
/// 实例随后只会因超出存活窗口而不可见。
#[derive(Debug)]
pub struct ServiceRegistration {
    discovery: Arc<dyn Discovery>,
    instance_id: String,
    service_name: String,
    host_port: String,
    heartbeat: Option<HeartbeatHandle>,
    deregistered: bool,
}

impl ServiceRegistration {
    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn host_port(&self) -> &str {
        &self.host_port
    }

    /// 停止心跳并注销实例
    pub async fn shutdown(mut self) -> Result<(), DiscoveryError> {
        if let Some(heartbeat) = self.heartbeat.take() {
            heartbeat.stop().await;
        }

        // 无论注销结果如何都不再由 Drop 重试
        self.deregistered = true;
        self.discovery
            .deregister(&self.instance_id, &self.service_name)
            .await?;

        tracing::info!(
            service_name = %self.service_name,
            instance_id = %self.instance_id,
            "Service instance shut down"
        );
        Ok(())
    }
}

impl Drop for ServiceRegistration {
    fn drop(&mut self) {
        if let Some(heartbeat) = self.heartbeat.take() {
            heartbeat.cancel();
        }
        if self.deregistered {
            return;
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(
                service_name = %self.service_name,
                instance_id = %self.instance_id,
                "No runtime available, skipping deregister on drop"
            );
            return;
        };

        let discovery = self.discovery.clone();
        let instance_id = std::mem::take(&mut self.instance_id);
        let service_name = std::mem::take(&mut self.service_name);
        runtime.spawn(async move {
            match discovery.deregister(&instance_id, &service_name).await {
                Ok(()) => tracing::info!(
                    service_name = %service_name,
                    instance_id = %instance_id,
                    "Deregistered service instance on drop"
                ),
                Err(e) => tracing::error!(
                    service_name = %service_name,
                    instance_id = %instance_id,
                    error = %e,
                    "Failed to deregister service instance on drop"
                ),
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::registry::MemoryRegistry;

    #[tokio::test]
    async fn test_shutdown_deregisters() {
        let registry = MemoryRegistry::default();
        let shutdown = CancellationToken::new();

        let registration = register_instance(
            Arc::new(registry.clone()),
            "movie",
            "localhost:9000",
            Duration::from_millis(100),
            &shutdown,
        )
        .await
        .unwrap();

        assert!(registration.instance_id().starts_with("movie-"));
        assert!(registry.service_addresses("movie").await.is_ok());

        registration.shutdown().await.unwrap();
        assert!(registry.service_addresses("movie").await.unwrap_err().is_not_found());
        assert!(registry.instances("movie").is_empty());
    }

    #[tokio::test]
    async fn test_drop_deregisters_on_early_exit() {
        let registry = MemoryRegistry::default();
        let shutdown = CancellationToken::new();

        async fn failing_startup(
            registry: MemoryRegistry,
            shutdown: &CancellationToken,
        ) -> Result<(), DiscoveryError> {
            let _registration = register_instance(
                Arc::new(registry),
                "metadata",
                "localhost:8081",
                Duration::from_millis(100),
                shutdown,
            )
            .await?;
            Err(DiscoveryError::Backend("listener failed".into()))
        }

        assert!(failing_startup(registry.clone(), &shutdown).await.is_err());

        // 等待 Drop 中派生的注销任务完成
        tokio::time::timeout(Duration::from_secs(1), async {
            while !registry.instances("metadata").is_empty() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("instance should be deregistered after drop");
    }

    #[tokio::test]
    async fn test_register_failure_is_propagated() {
        let registry = MemoryRegistry::default();
        let shutdown = CancellationToken::new();

        let err = register_instance(
            Arc::new(registry),
            "",
            "localhost:9000",
            Duration::from_secs(1),
            &shutdown,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, DiscoveryError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_zero_interval_rejected() {
        let registry = MemoryRegistry::default();
        let shutdown = CancellationToken::new();

        let err = register_instance(
            Arc::new(registry.clone()),
            "movie",
            "localhost:9000",
            Duration::ZERO,
            &shutdown,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, DiscoveryError::InvalidInput(_)));
        assert!(registry.instances("movie").is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_heartbeat_keeps_instance_live_past_window() {
        let window = Duration::from_millis(300);
        let registry = MemoryRegistry::new(window);
        let shutdown = CancellationToken::new();

        let registration = register_instance(
            Arc::new(registry.clone()),
            "movie",
            "localhost:9000",
            Duration::from_millis(50),
            &shutdown,
        )
        .await
        .unwrap();

        // 跨越多个存活窗口，期间多次检查
        for _ in 0..4 {
            tokio::time::sleep(window).await;
            let addresses = registry.service_addresses("movie").await.unwrap();
            assert!(addresses.contains("localhost:9000"));
        }

        registration.shutdown().await.unwrap();
        assert!(registry.service_addresses("movie").await.unwrap_err().is_not_found());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_instance_expires_without_heartbeat() {
        let window = Duration::from_millis(300);
        let registry = MemoryRegistry::new(window);

        registry.register("a1", "movie", "localhost:9000").await.unwrap();
        tokio::time::sleep(window * 2).await;

        assert!(registry.service_addresses("movie").await.unwrap_err().is_not_found());
    }
}
