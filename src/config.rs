use std::time::Duration;

pub const DEFAULT_WATCH_INTERVAL: Duration = Duration::from_millis(1000);
pub const DEFAULT_QUEUE_CAPACITY: usize = 20;
pub const DEFAULT_CONTEXT_RADIUS: usize = 2;

/// Settings for the template cache and its hot-reload watcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub watch_interval: Duration, // 文件修改时间的轮询间隔
    pub queue_capacity: usize,    // 待重新解析模板队列的容量
    pub context_radius: usize,    // 错误诊断中出错行前后展示的行数
}

impl Default for Config {
    fn default() -> Self {
        Self {
            watch_interval: DEFAULT_WATCH_INTERVAL,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            context_radius: DEFAULT_CONTEXT_RADIUS,
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn watch_interval(mut self, interval: Duration) -> Self {
        self.watch_interval = interval;
        self
    }

    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    pub fn context_radius(mut self, radius: usize) -> Self {
        self.context_radius = radius;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_overrides_defaults() {
        let config = Config::new()
            .watch_interval(Duration::from_millis(50))
            .queue_capacity(0)
            .context_radius(4);
        assert_eq!(config.watch_interval, Duration::from_millis(50));
        assert_eq!(config.queue_capacity, 1);
        assert_eq!(config.context_radius, 4);
        assert_eq!(Config::default().queue_capacity, DEFAULT_QUEUE_CAPACITY);
    }
}
