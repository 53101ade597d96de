//! Heartbeat loop and registration lifecycle
//!
//! - `Heartbeat`: periodic `report_healthy` task bound to a cancellation token
//! - `registration`: register + heartbeat + deregister as one guarded unit

pub mod registration;

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::services::discovery::Discovery;

pub use registration::{ServiceRegistration, register_instance};

/// 默认心跳周期
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(1);

/// 最小心跳周期，零周期会被提升到该值
pub const MIN_HEARTBEAT_INTERVAL: Duration = Duration::from_millis(1);

/// 心跳任务
pub struct Heartbeat;

impl Heartbeat {
    /// 启动心跳循环
    ///
    /// 首次上报立即执行，之后每个周期上报一次。上报失败只记录日志，
    /// 循环继续运行；只在两次上报之间响应取消。
    pub fn spawn(
        discovery: Arc<dyn Discovery>,
        instance_id: String,
        service_name: String,
        interval: Duration,
        cancel: CancellationToken,
    ) -> HeartbeatHandle {
        let interval = if interval < MIN_HEARTBEAT_INTERVAL {
            tracing::warn!(
                service_name = %service_name,
                instance_id = %instance_id,
                "Heartbeat interval is zero, using minimum interval"
            );
            MIN_HEARTBEAT_INTERVAL
        } else {
            interval
        };

        let token = cancel.clone();
        let join = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            tracing::info!(
                service_name = %service_name,
                instance_id = %instance_id,
                interval_ms = interval.as_millis() as u64,
                "Heartbeat started"
            );

            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = discovery.report_healthy(&instance_id, &service_name).await {
                            tracing::warn!(
                                service_name = %service_name,
                                instance_id = %instance_id,
                                error = %e,
                                "Failed to report healthy state"
                            );
                        }
                    }
                }
            }

            tracing::info!(
                service_name = %service_name,
                instance_id = %instance_id,
                "Heartbeat stopped"
            );
        });

        HeartbeatHandle { cancel, join }
    }
}

/// 心跳任务句柄
#[derive(Debug)]
pub struct HeartbeatHandle {
    cancel: CancellationToken,
    join: JoinHandle<()>,
}

impl HeartbeatHandle {
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// 请求停止但不等待
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// 停止心跳并等待任务退出
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.join.await {
            tracing::error!(error = %e, "Heartbeat task terminated abnormally");
        }
    }
}
