//! 回调注册表：Collector 暴露给脚本的只读函数，按名注册与查找

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

/// 只读回调：参数为脚本传入的值列表
pub type Callback = Arc<dyn Fn(Vec<Value>) -> Result<Value, String> + Send + Sync>;

#[derive(Clone, Default)]
pub struct Callbacks {
    fns: BTreeMap<String, Callback>,
}

impl Callbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, name: impl Into<String>, f: F)
    where
        F: Fn(Vec<Value>) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.fns.insert(name.into(), Arc::new(f));
    }

    /// 链式注册
    pub fn with<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(Vec<Value>) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.register(name, f);
        self
    }

    pub fn get(&self, name: &str) -> Option<Callback> {
        self.fns.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fns.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.fns.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.fns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fns.is_empty()
    }
}

impl fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callbacks")
            .field("names", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_register_and_call() {
        let callbacks = Callbacks::new()
            .with("double", |args: Vec<Value>| {
                let n = args.first().and_then(Value::as_i64).ok_or("expected integer")?;
                Ok(json!(n * 2))
            })
            .with("zero", |_| Ok(json!(0)));

        assert_eq!(callbacks.names(), vec!["double".to_string(), "zero".to_string()]);
        let f = callbacks.get("double").unwrap();
        assert_eq!(f(vec![json!(21)]).unwrap(), json!(42));
        assert!(f(vec![]).is_err());
        assert!(!callbacks.contains("rm"));
    }
}
