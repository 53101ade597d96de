use std::collections::HashMap;
use std::time::{Duration, SystemTime};

// 实例注册信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceRecord {
    pub host_port: String,
    pub last_active: SystemTime,
}

impl InstanceRecord {
    pub fn new(host_port: impl Into<String>, now: SystemTime) -> Self {
        Self {
            host_port: host_port.into(),
            last_active: now,
        }
    }

    /// 距离最近一次活跃的时长；墙钟回拨时按零处理
    pub fn idle_for(&self, now: SystemTime) -> Duration {
        now.duration_since(self.last_active).unwrap_or_default()
    }

    pub fn is_live(&self, now: SystemTime, window: Duration) -> bool {
        self.idle_for(now) < window
    }

    // 只前进不后退
    pub(crate) fn touch(&mut self, now: SystemTime) {
        if now > self.last_active {
            self.last_active = now;
        }
    }
}

// 实例 ID -> 实例记录
pub type ServiceInstances = HashMap<String, InstanceRecord>;

// 服务表（服务名 -> 实例集合）
pub type ServiceTable = HashMap<String, ServiceInstances>;

// 注册表统计信息
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryStats {
    pub services: usize,
    pub instances: usize,
    pub live_instances: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_touch_never_moves_backwards() {
        let start = SystemTime::UNIX_EPOCH + Duration::from_secs(100);
        let mut record = InstanceRecord::new("localhost:9000", start);

        record.touch(start - Duration::from_secs(10));
        assert_eq!(record.last_active, start);

        record.touch(start + Duration::from_secs(1));
        assert_eq!(record.last_active, start + Duration::from_secs(1));
    }

    #[test]
    fn test_liveness_boundary() {
        let start = SystemTime::UNIX_EPOCH;
        let record = InstanceRecord::new("localhost:9000", start);
        let window = Duration::from_secs(5);

        assert!(record.is_live(start + Duration::from_millis(4999), window));
        assert!(!record.is_live(start + window, window));
        // 墙钟回拨视为刚刚活跃
        assert!(record.is_live(start - Duration::from_secs(1), window));
    }
}
