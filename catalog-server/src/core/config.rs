use crate::services::circuit_breaker::CircuitBreakerConfig;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// 服务器配置 - 目录服务的所有配置项
///
/// # 环境变量
///
/// 所有配置项都可以通过环境变量覆盖：
///
/// | 环境变量 | 默认值 | 说明 |
/// |----------|--------|------|
/// | WORK_DIR | ./work_dir | 工作目录 (数据库、日志) |
/// | HTTP_PORT | 8080 | HTTP 服务端口 |
/// | DATABASE_FILE | catalog.redb | 数据库文件 (相对 WORK_DIR) |
/// | FEED_PATH | data/products.json | 启动导入文件 |
/// | ENVIRONMENT | development | 运行环境 |
/// | LOG_LEVEL | info | 日志级别 |
/// | WORKER_POOL_SIZE | 8 | 阻塞存储线程数 |
/// | WORKER_QUEUE_CAPACITY | 64 | 等待队列上限 |
/// | BREAKER_FAILURE_RATE_THRESHOLD | 50 | 熔断失败率 (%) |
/// | BREAKER_SLIDING_WINDOW_SIZE | 10 | 滑动窗口 (调用次数) |
/// | BREAKER_MINIMUM_CALLS | 5 | 计算失败率的最少调用数 |
/// | BREAKER_WAIT_IN_OPEN_MS | 10000 | 熔断打开持续时间 |
/// | BREAKER_HALF_OPEN_CALLS | 3 | 半开状态试探调用数 |
/// | BREAKER_CALL_TIMEOUT_MS | 5000 | 单次调用超时 |
///
/// # 示例
///
/// ```ignore
/// WORK_DIR=/data/catalog HTTP_PORT=9090 cargo run
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    /// 工作目录，存储数据库、日志等文件
    pub work_dir: String,
    /// HTTP API 服务端口
    pub http_port: u16,
    /// 数据库文件名
    pub database_file: String,
    /// 启动时导入的 JSON 文件
    pub feed_path: String,
    /// 运行环境: development | staging | production
    pub environment: String,
    pub log_level: String,
    /// 阻塞存储线程池大小
    pub worker_pool_size: usize,
    /// 等待队列上限，超出即拒绝
    pub worker_queue_capacity: usize,
    /// 熔断器配置 (product_service 组)
    pub breaker: CircuitBreakerConfig,
}

fn parse_or<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    lookup(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

impl Config {
    /// 从环境变量加载配置
    ///
    /// 如果环境变量未设置，使用默认值
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// 从任意键值来源加载配置 (环境变量、测试用 map)
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = CircuitBreakerConfig::default();
        let breaker = CircuitBreakerConfig {
            failure_rate_threshold: parse_or(
                &lookup,
                "BREAKER_FAILURE_RATE_THRESHOLD",
                defaults.failure_rate_threshold,
            ),
            sliding_window_size: parse_or(
                &lookup,
                "BREAKER_SLIDING_WINDOW_SIZE",
                defaults.sliding_window_size,
            ),
            minimum_number_of_calls: parse_or(
                &lookup,
                "BREAKER_MINIMUM_CALLS",
                defaults.minimum_number_of_calls,
            ),
            wait_duration_in_open: Duration::from_millis(parse_or(
                &lookup,
                "BREAKER_WAIT_IN_OPEN_MS",
                defaults.wait_duration_in_open.as_millis() as u64,
            )),
            permitted_calls_in_half_open: parse_or(
                &lookup,
                "BREAKER_HALF_OPEN_CALLS",
                defaults.permitted_calls_in_half_open,
            ),
            call_timeout: Duration::from_millis(parse_or(
                &lookup,
                "BREAKER_CALL_TIMEOUT_MS",
                defaults.call_timeout.as_millis() as u64,
            )),
        };

        Self {
            work_dir: lookup("WORK_DIR").unwrap_or_else(|| "./work_dir".into()),
            http_port: parse_or(&lookup, "HTTP_PORT", 8080),
            database_file: lookup("DATABASE_FILE").unwrap_or_else(|| "catalog.redb".into()),
            feed_path: lookup("FEED_PATH").unwrap_or_else(|| "data/products.json".into()),
            environment: lookup("ENVIRONMENT").unwrap_or_else(|| "development".into()),
            log_level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".into()),
            worker_pool_size: parse_or(&lookup, "WORKER_POOL_SIZE", 8usize).max(1),
            worker_queue_capacity: parse_or(&lookup, "WORKER_QUEUE_CAPACITY", 64),
            breaker,
        }
    }

    /// 数据库路径 (绝对路径原样使用)
    pub fn database_path(&self) -> PathBuf {
        let file = PathBuf::from(&self.database_file);
        if file.is_absolute() {
            file
        } else {
            PathBuf::from(&self.work_dir).join(file)
        }
    }

    /// 日志目录
    pub fn log_dir(&self) -> PathBuf {
        PathBuf::from(&self.work_dir).join("logs")
    }

    /// 是否生产环境
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Config {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(move |key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]);
        assert_eq!(config.http_port, 8080);
        assert_eq!(config.worker_pool_size, 8);
        assert_eq!(config.worker_queue_capacity, 64);
        assert_eq!(config.breaker.sliding_window_size, 10);
        assert_eq!(config.breaker.wait_duration_in_open, Duration::from_secs(10));
        assert!(!config.is_production());
    }

    #[test]
    fn test_overrides_and_bad_values() {
        let config = config_from(&[
            ("HTTP_PORT", "9090"),
            ("WORKER_POOL_SIZE", "0"),
            ("BREAKER_CALL_TIMEOUT_MS", "not-a-number"),
            ("ENVIRONMENT", "production"),
        ]);
        assert_eq!(config.http_port, 9090);
        // Pool never drops below one worker
        assert_eq!(config.worker_pool_size, 1);
        assert_eq!(config.breaker.call_timeout, Duration::from_secs(5));
        assert!(config.is_production());
    }

    #[test]
    fn test_database_path() {
        let config = config_from(&[("WORK_DIR", "/tmp/catalog")]);
        assert_eq!(
            config.database_path(),
            PathBuf::from("/tmp/catalog/catalog.redb")
        );

        let config = config_from(&[("DATABASE_FILE", "/var/db/c.redb")]);
        assert_eq!(config.database_path(), PathBuf::from("/var/db/c.redb"));
    }
}
