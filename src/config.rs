//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读默认 TOML，再读调用方指定的文件，最后用环境变量 `HIVE__*` 覆盖
//! （双下划线表示嵌套，如 `HIVE__MONITOR__MAX_RETRIES=5`）。所有字段都有默认值。

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub monitor: MonitorSection,
    pub coordinator: CoordinatorSection,
    pub sandbox: SandboxSection,
    pub events: EventsSection,
    /// [[monitors]]：启动时注册的 Monitor
    pub monitors: Vec<MonitorEntry>,
}

/// [app] 段
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppSection {
    pub name: Option<String>,
}

/// [llm] 段：后端选择与超时
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    /// 后端：openai / mock；openai 且设置了 OPENAI_API_KEY 时才走真实 API
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    pub base_url: Option<String>,
    #[serde(default)]
    pub timeouts: LlmTimeoutsSection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            base_url: None,
            timeouts: LlmTimeoutsSection::default(),
        }
    }
}

fn default_provider() -> String {
    "openai".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmTimeoutsSection {
    #[serde(default = "default_request_timeout")]
    pub request: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self {
            request: default_request_timeout(),
        }
    }
}

fn default_request_timeout() -> u64 {
    60
}

/// [monitor] 段：所有 Monitor 共用的决策循环参数
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MonitorSection {
    /// 单次决策调用超时（秒）
    pub decision_timeout_secs: u64,
    /// 连续失败上限，超过后循环停止
    pub max_retries: u32,
    /// 退避基数（毫秒），第 n 次失败后延迟 base * 2^(n-1)
    pub backoff_base_ms: u64,
    /// Snapshot 历史上限，超出后淘汰最旧的
    pub snapshot_cap: usize,
    /// 本地 Notification 历史上限
    pub notification_cap: usize,
    pub context_max_tokens: usize,
    pub keep_last_turns: usize,
    /// wait 动作的最长时长（秒）
    pub max_wait_secs: u64,
    /// 有界分析的默认迭代上限与超时
    pub run_max_iterations: u32,
    pub run_timeout_secs: u64,
}

impl Default for MonitorSection {
    fn default() -> Self {
        Self {
            decision_timeout_secs: 30,
            max_retries: 3,
            backoff_base_ms: 500,
            snapshot_cap: 100,
            notification_cap: 500,
            context_max_tokens: 6000,
            keep_last_turns: 6,
            max_wait_secs: 3600,
            run_max_iterations: 20,
            run_timeout_secs: 120,
        }
    }
}

impl MonitorSection {
    pub fn decision_timeout(&self) -> Duration {
        Duration::from_secs(self.decision_timeout_secs)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_secs(self.max_wait_secs)
    }

    pub fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.run_timeout_secs)
    }
}

/// [coordinator] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CoordinatorSection {
    pub decision_timeout_secs: u64,
    pub max_retries: u32,
    pub backoff_base_ms: u64,
    pub context_max_tokens: usize,
    pub keep_last_turns: usize,
    /// 单轮分析的迭代上限，达到后按 done 处理
    pub max_iterations: u32,
}

impl Default for CoordinatorSection {
    fn default() -> Self {
        Self {
            decision_timeout_secs: 30,
            max_retries: 3,
            backoff_base_ms: 500,
            context_max_tokens: 6000,
            keep_last_turns: 6,
            max_iterations: 50,
        }
    }
}

impl CoordinatorSection {
    pub fn decision_timeout(&self) -> Duration {
        Duration::from_secs(self.decision_timeout_secs)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }
}

/// [sandbox] 段：脚本执行限制
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SandboxSection {
    pub timeout_ms: u64,
    pub max_steps: usize,
}

impl Default for SandboxSection {
    fn default() -> Self {
        Self {
            timeout_ms: 2000,
            max_steps: 256,
        }
    }
}

impl SandboxSection {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// [events] 段：对外事件流的缓冲大小
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EventsSection {
    pub capacity: usize,
}

impl Default for EventsSection {
    fn default() -> Self {
        Self { capacity: 1024 }
    }
}

/// [[monitors]] 条目
#[derive(Debug, Clone, Deserialize)]
pub struct MonitorEntry {
    pub id: String,
    /// 内置 Collector 名（如 host）
    pub collector: String,
    #[serde(default = "default_autostart")]
    pub autostart: bool,
}

fn default_autostart() -> bool {
    true
}

/// 从默认路径 + 可选路径 + 环境变量加载配置
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("HIVE")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.monitor.max_retries, 3);
        assert_eq!(cfg.monitor.backoff_base(), Duration::from_millis(500));
        assert_eq!(cfg.coordinator.max_iterations, 50);
        assert_eq!(cfg.sandbox.max_steps, 256);
        assert_eq!(cfg.events.capacity, 1024);
        assert!(cfg.monitors.is_empty());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[monitor]
max_retries = 5
snapshot_cap = 10

[[monitors]]
id = "host"
collector = "host"

[[monitors]]
id = "spare"
collector = "host"
autostart = false
"#
        )
        .unwrap();

        let cfg = load_config(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(cfg.monitor.max_retries, 5);
        assert_eq!(cfg.monitor.snapshot_cap, 10);
        // 未出现的字段取默认值
        assert_eq!(cfg.monitor.keep_last_turns, 6);
        assert_eq!(cfg.monitors.len(), 2);
        assert!(cfg.monitors[0].autostart);
        assert!(!cfg.monitors[1].autostart);
    }
}
