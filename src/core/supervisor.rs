//! Actor 监管：生命周期、取消管理
//!
//! 每个 Actor 持有一个根 CancellationToken（来自运行时的子 token）；
//! 在途的决策调用与延迟唤醒各自使用子 token，Actor 停止时一次性全部取消，
//! 保证拆除之后不会再有完成消息送达。

use tokio::task::JoinError;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

/// Actor 级取消令牌
#[derive(Debug, Clone)]
pub struct Supervisor {
    cancel_token: CancellationToken,
}

impl Supervisor {
    pub fn new() -> Self {
        Self {
            cancel_token: CancellationToken::new(),
        }
    }

    /// 挂在父 token 之下：父 token 取消（运行时关闭）时本 Actor 一并取消
    pub fn with_parent(parent: &CancellationToken) -> Self {
        Self {
            cancel_token: parent.child_token(),
        }
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// 取消本 Actor 及其所有在途调用与定时器
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.cancel_token.cancelled()
    }

    /// 创建子 token（用于单个后台调用或定时器）
    pub fn child_token(&self) -> CancellationToken {
        self.cancel_token.child_token()
    }
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new()
    }
}

/// 从 JoinError 中取出 panic 信息
pub(crate) fn panic_message(err: JoinError) -> String {
    if !err.is_panic() {
        return err.to_string();
    }
    let payload = err.into_panic();
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parent_cancels_child() {
        let parent = CancellationToken::new();
        let supervisor = Supervisor::with_parent(&parent);
        let call = supervisor.child_token();
        parent.cancel();
        assert!(supervisor.is_cancelled());
        assert!(call.is_cancelled());
    }

    #[test]
    fn test_child_does_not_cancel_supervisor() {
        let supervisor = Supervisor::new();
        let call = supervisor.child_token();
        call.cancel();
        assert!(!supervisor.is_cancelled());
    }

    #[tokio::test]
    async fn test_panic_message() {
        let handle = tokio::spawn(async { panic!("decision exploded") });
        let err = handle.await.unwrap_err();
        assert_eq!(panic_message(err), "decision exploded");
    }
}
