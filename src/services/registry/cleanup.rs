use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::service::MemoryRegistry;

impl MemoryRegistry {
    // 启动过期实例清理任务
    //
    // 默认不启用：过期实例只是对外不可见，仍保留在表中直到显式注销。
    pub fn start_reaper(
        &self,
        interval: Duration,
        reap_after: Duration,
        shutdown: CancellationToken,
    ) {
        let registry = self.clone();

        tracing::info!(
            interval_secs = interval.as_secs(),
            reap_after_secs = reap_after.as_secs(),
            "Starting expired instance reaper"
        );

        self.task_tracker.spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        tracing::debug!("Reaper stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        tracing::debug!("Executing instance expiration check...");
                        let removed = registry.reap_expired(reap_after);
                        if removed > 0 {
                            tracing::info!(
                                expired_count = removed,
                                "Cleanup check completed, removed expired instances"
                            );
                        }
                    }
                }
            }
        });
    }

    /// 关闭后台任务追踪器并等待所有任务退出
    pub async fn wait_background_tasks(&self) {
        self.task_tracker.close();
        self.task_tracker.wait().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::discovery::{Discovery, ManualClock};
    use std::sync::Arc;
    use std::time::SystemTime;

    #[tokio::test(start_paused = true)]
    async fn test_reaper_removes_expired_instances_and_stops() {
        let clock = ManualClock::new(SystemTime::UNIX_EPOCH);
        let registry = MemoryRegistry::with_clock(Duration::from_secs(5), Arc::new(clock.clone()));
        let shutdown = CancellationToken::new();

        registry.register("a1", "movie", "localhost:9000").await.unwrap();
        registry.start_reaper(Duration::from_secs(5), Duration::from_secs(15), shutdown.clone());

        clock.advance(Duration::from_secs(20));
        tokio::time::sleep(Duration::from_secs(6)).await;

        assert_eq!(registry.stats().instances, 0);

        shutdown.cancel();
        registry.wait_background_tasks().await;
    }
}
