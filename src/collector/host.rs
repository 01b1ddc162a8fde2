//! HostCollector：从 /proc 读取内存与负载
//!
//! 非 Linux 平台上 /proc 不存在，snapshot 返回空 map（仍是合法快照）。

use std::path::{Path, PathBuf};

use serde_json::{json, Map, Value};

use crate::collector::Collector;
use crate::sandbox::Callbacks;

const SYSTEM_PROMPT: &str = "You watch the memory and CPU load of the host machine. \
Memory pressure shows up as low MemAvailable, growing swap usage, or load well above the CPU count. \
Capture a snapshot before judging, compare against earlier snapshots, and only notify when a trend \
or threshold is clearly abnormal.";

const CALLBACK_DOCS: &str = "\
meminfo(field) -> number: a /proc/meminfo field in kB, e.g. meminfo(\"MemAvailable\")
loadavg() -> {one, five, fifteen, running, total}: /proc/loadavg
uptime_secs() -> number: seconds since boot";

#[derive(Debug, Clone)]
pub struct HostCollector {
    proc_root: PathBuf,
}

impl Default for HostCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl HostCollector {
    pub fn new() -> Self {
        Self::with_root("/proc")
    }

    /// 指定 /proc 根目录（测试用）
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            proc_root: root.into(),
        }
    }
}

/// 解析 /proc/meminfo，数值单位 kB
pub fn parse_meminfo(text: &str) -> Map<String, Value> {
    text.lines()
        .filter_map(|line| {
            let (key, rest) = line.split_once(':')?;
            let value: u64 = rest.split_whitespace().next()?.parse().ok()?;
            Some((key.trim().to_string(), json!(value)))
        })
        .collect()
}

/// 解析 /proc/loadavg："0.52 0.58 0.59 1/467 12345"
pub fn parse_loadavg(text: &str) -> Option<Value> {
    let mut parts = text.split_whitespace();
    let one: f64 = parts.next()?.parse().ok()?;
    let five: f64 = parts.next()?.parse().ok()?;
    let fifteen: f64 = parts.next()?.parse().ok()?;
    let (running, total) = parts.next()?.split_once('/')?;
    Some(json!({
        "one": one,
        "five": five,
        "fifteen": fifteen,
        "running": running.parse::<u64>().ok()?,
        "total": total.parse::<u64>().ok()?,
    }))
}

fn read(root: &Path, name: &str) -> Result<String, String> {
    std::fs::read_to_string(root.join(name)).map_err(|e| format!("{}: {}", name, e))
}

fn uptime(root: &Path) -> Result<f64, String> {
    read(root, "uptime")?
        .split_whitespace()
        .next()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| "uptime: unexpected format".to_string())
}

impl Collector for HostCollector {
    fn title(&self) -> &str {
        "Host"
    }

    fn description(&self) -> &str {
        "Memory and load average of the local host"
    }

    fn system_prompt(&self) -> &str {
        SYSTEM_PROMPT
    }

    fn callback_docs(&self) -> &str {
        CALLBACK_DOCS
    }

    fn snapshot(&self) -> anyhow::Result<Map<String, Value>> {
        let mut out = Map::new();
        if !self.proc_root.exists() {
            return Ok(out);
        }

        if let Ok(text) = read(&self.proc_root, "meminfo") {
            let mem = parse_meminfo(&text);
            let field = |k: &str| mem.get(k).and_then(Value::as_u64);
            if let (Some(total), Some(available)) = (field("MemTotal"), field("MemAvailable")) {
                out.insert("mem_total_kb".into(), json!(total));
                out.insert("mem_available_kb".into(), json!(available));
                if total > 0 {
                    let used_pct = (total.saturating_sub(available)) as f64 * 100.0 / total as f64;
                    out.insert("mem_used_pct".into(), json!((used_pct * 10.0).round() / 10.0));
                }
            }
            if let (Some(total), Some(free)) = (field("SwapTotal"), field("SwapFree")) {
                out.insert("swap_used_kb".into(), json!(total.saturating_sub(free)));
            }
        }

        if let Some(load) = read(&self.proc_root, "loadavg")
            .ok()
            .and_then(|text| parse_loadavg(&text))
        {
            out.insert("load".into(), load);
        }

        if let Ok(secs) = uptime(&self.proc_root) {
            out.insert("uptime_secs".into(), json!(secs));
        }
        Ok(out)
    }

    fn callbacks(&self) -> Callbacks {
        let mem_root = self.proc_root.clone();
        let load_root = self.proc_root.clone();
        let uptime_root = self.proc_root.clone();

        Callbacks::new()
            .with("meminfo", move |args: Vec<Value>| {
                let field = args
                    .first()
                    .and_then(Value::as_str)
                    .ok_or("meminfo(field): field name required")?;
                let mem = parse_meminfo(&read(&mem_root, "meminfo")?);
                mem.get(field)
                    .cloned()
                    .ok_or_else(|| format!("meminfo: no field {}", field))
            })
            .with("loadavg", move |_| {
                parse_loadavg(&read(&load_root, "loadavg")?)
                    .ok_or_else(|| "loadavg: unexpected format".to_string())
            })
            .with("uptime_secs", move |_| uptime(&uptime_root).map(|s| json!(s)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MEMINFO: &str = "MemTotal:       16000000 kB\nMemFree:         1000000 kB\nMemAvailable:    4000000 kB\nSwapTotal:       2000000 kB\nSwapFree:        1500000 kB\nHugePages_Total:       0\n";

    fn fake_proc() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("meminfo"), MEMINFO).unwrap();
        std::fs::write(dir.path().join("loadavg"), "0.52 0.58 0.59 1/467 12345\n").unwrap();
        std::fs::write(dir.path().join("uptime"), "3600.25 7000.00\n").unwrap();
        dir
    }

    #[test]
    fn test_parse_meminfo() {
        let mem = parse_meminfo(MEMINFO);
        assert_eq!(mem["MemTotal"], json!(16000000));
        assert_eq!(mem["HugePages_Total"], json!(0));
    }

    #[test]
    fn test_parse_loadavg() {
        let load = parse_loadavg("0.52 0.58 0.59 1/467 12345").unwrap();
        assert_eq!(load["one"], json!(0.52));
        assert_eq!(load["total"], json!(467));
        assert!(parse_loadavg("garbage").is_none());
    }

    #[test]
    fn test_snapshot_from_fake_proc() {
        let dir = fake_proc();
        let snap = HostCollector::with_root(dir.path()).snapshot().unwrap();
        assert_eq!(snap["mem_available_kb"], json!(4000000));
        assert_eq!(snap["mem_used_pct"], json!(75.0));
        assert_eq!(snap["swap_used_kb"], json!(500000));
        assert_eq!(snap["load"]["five"], json!(0.58));
        assert_eq!(snap["uptime_secs"], json!(3600.25));
    }

    #[test]
    fn test_snapshot_without_proc_is_empty() {
        let snap = HostCollector::with_root("/definitely/not/proc").snapshot().unwrap();
        assert!(snap.is_empty());
    }

    #[test]
    fn test_callbacks() {
        let dir = fake_proc();
        let callbacks = HostCollector::with_root(dir.path()).callbacks();
        let meminfo = callbacks.get("meminfo").unwrap();
        assert_eq!(meminfo(vec![json!("SwapFree")]).unwrap(), json!(1500000));
        assert!(meminfo(vec![json!("Nope")]).is_err());
        assert!(meminfo(vec![]).is_err());
        let uptime = callbacks.get("uptime_secs").unwrap();
        assert_eq!(uptime(vec![]).unwrap(), json!(3600.25));
    }
}
