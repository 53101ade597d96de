use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::config::Config;
use crate::services::discovery::Discovery;
use crate::services::heartbeat::register_instance;
use crate::services::registry::MemoryRegistry;
use crate::services::resolver::Resolver;

pub type ServerError = Box<dyn std::error::Error + Send + Sync>;

/// 单次读取应答行（连接 + 读取）的超时
pub const GREETING_TIMEOUT: Duration = Duration::from_secs(3);

/// 单个服务节点：监听端口、注册自身、维持心跳，关闭时有序注销
#[derive(Debug)]
pub struct Node {
    config: Config,
    registry: MemoryRegistry,
}

impl Node {
    pub fn new(config: Config, registry: MemoryRegistry) -> Self {
        Self { config, registry }
    }

    pub fn registry(&self) -> &MemoryRegistry {
        &self.registry
    }

    pub async fn run(&self, shutdown: CancellationToken) -> Result<(), ServerError> {
        let node = &self.config.node;
        let tracker = TaskTracker::new();

        if let Some(reap_after) = self.config.reap_after() {
            self.registry
                .start_reaper(self.config.liveness_window(), reap_after, shutdown.child_token());
        }

        let listener = TcpListener::bind(("0.0.0.0", node.port)).await?;
        // 端口为 0 时以实际绑定的端口注册
        let host_port = format!("{}:{}", node.host, listener.local_addr()?.port());
        tracing::info!(service_name = %node.service_name, address = %host_port, "Node listening");

        let discovery: Arc<dyn Discovery> = Arc::new(self.registry.clone());
        let registration = register_instance(
            discovery.clone(),
            &node.service_name,
            &host_port,
            self.config.heartbeat_interval(),
            &shutdown,
        )
        .await?;

        let greeting = format!("{} {}\n", node.service_name, registration.instance_id());
        tracker.spawn(serve(listener, greeting, shutdown.child_token()));

        // 通过注册表解析自身，验证发现链路；自检期间仍需响应关闭
        let resolver = Resolver::new(discovery, self.config.resolver.clone());
        tokio::select! {
            _ = shutdown.cancelled() => {
                tracing::warn!("Shutdown requested during discovery self-check");
            }
            result = resolver.call(&node.service_name, fetch_greeting) => {
                match result {
                    Ok(reply) => tracing::info!(reply = %reply, "Discovery self-check succeeded"),
                    Err(e) => tracing::warn!(error = %e, "Discovery self-check failed"),
                }
                shutdown.cancelled().await;
            }
        }
        tracing::info!("Shutting down node...");

        let result = registration.shutdown().await;
        tracker.close();
        tracker.wait().await;
        self.registry.wait_background_tasks().await;

        let stats = self.registry.stats();
        tracing::info!(
            services = stats.services,
            instances = stats.instances,
            live_instances = stats.live_instances,
            "Node stopped"
        );
        result.map_err(Into::into)
    }
}

// 每个连接回写一行 "<service_name> <instance_id>" 后关闭
async fn serve(listener: TcpListener, greeting: String, shutdown: CancellationToken) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((mut stream, peer)) => {
                    tracing::debug!(peer = %peer, "Accepted connection");
                    if let Err(e) = stream.write_all(greeting.as_bytes()).await {
                        tracing::warn!(peer = %peer, error = %e, "Failed to write greeting");
                    }
                }
                Err(e) => tracing::warn!(error = %e, "Failed to accept connection"),
            }
        }
    }
}

/// 连接实例并读取其应答行，超过 [`GREETING_TIMEOUT`] 返回 `TimedOut`
pub async fn fetch_greeting(address: String) -> std::io::Result<String> {
    let exchange = async {
        let stream = TcpStream::connect(&address).await?;
        let mut line = String::new();
        BufReader::new(stream).read_line(&mut line).await?;
        Ok(line.trim_end().to_string())
    };

    tokio::time::timeout(GREETING_TIMEOUT, exchange)
        .await
        .map_err(|_| {
            std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                format!("no reply from {address} within {}s", GREETING_TIMEOUT.as_secs()),
            )
        })?
}

pub async fn start(config: Config) -> Result<(), ServerError> {
    let registry = MemoryRegistry::new(config.liveness_window());
    let node = Node::new(config, registry);
    let shutdown = CancellationToken::new();

    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("Received shutdown signal"),
            Err(e) => tracing::error!(error = %e, "Failed to listen for shutdown signal"),
        }
        signal_token.cancel();
    });

    node.run(shutdown).await
}
