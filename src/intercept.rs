//! Intercepted transactions
//!
//! Every mutating operation on a tracked object follows the same shape:
//!
//! ```text
//! Idle → Applying → AwaitingRemote → Reconciling → Idle
//!                 ↘                 ↘
//!                   RollingBack ──────→ Idle
//! ```
//!
//! 1. The target is snapshotted.
//! 2. The optional *action* hook applies the optimistic local change.
//! 3. The remote future is awaited; this is the only suspension point.
//! 4. On success the optional *on_success* hook reconciles and may transform
//!    the result. On failure the *rollback* hook receives the snapshot and
//!    restores the target, then *on_error* may recover; otherwise the
//!    failure is returned unchanged.
//!
//! Interceptors are entity-agnostic and are built once per operation kind.
//! There is no version check: two transactions in flight on the same target
//! both see each other's optimistic state, and a rollback restores the
//! snapshot its own transaction took (last write wins).

use std::fmt;
use std::future::Future;

use tracing::{debug, warn};

use crate::error::{Result, ShardError};
use crate::snapshot::Snapshot;
use crate::tracked::Tracked;

/// Optimistic local mutation
pub type ActionHook<T, A> = Box<dyn Fn(&mut T, &A) -> Result<()> + Send + Sync>;
/// Restores the target from its pre-mutation snapshot
pub type RollbackHook<T, A> = Box<dyn Fn(&mut T, Snapshot<T>, &A) + Send + Sync>;
/// Reconciles a successful remote result into the target
pub type SuccessHook<T, A, R> = Box<dyn Fn(R, &A, &mut T) -> Result<R> + Send + Sync>;
/// Turns a failure into a result, or declines with `None`
pub type ErrorHook<A, R> = Box<dyn Fn(&ShardError, &A) -> Option<R> + Send + Sync>;

/// Phases a transaction moves through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxPhase {
    Idle,
    Applying,
    AwaitingRemote,
    Reconciling,
    RollingBack,
}

impl fmt::Display for TxPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TxPhase::Idle => "idle",
            TxPhase::Applying => "applying",
            TxPhase::AwaitingRemote => "awaiting_remote",
            TxPhase::Reconciling => "reconciling",
            TxPhase::RollingBack => "rolling_back",
        };
        f.write_str(name)
    }
}

/// Wraps a remote operation bound to a tracked target.
pub struct Interceptor<T, A, R> {
    label: &'static str,
    action: Option<ActionHook<T, A>>,
    rollback: Option<RollbackHook<T, A>>,
    on_success: Option<SuccessHook<T, A, R>>,
    on_error: Option<ErrorHook<A, R>>,
}

impl<T, A, R> Interceptor<T, A, R>
where
    T: Clone,
{
    /// Interceptor with no hooks: the remote result passes straight through.
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            action: None,
            rollback: None,
            on_success: None,
            on_error: None,
        }
    }

    /// Interceptor whose rollback overwrites the target with its snapshot.
    pub fn restoring(label: &'static str) -> Self {
        Self::new(label).rollback(|target, snapshot, _| snapshot.restore(target))
    }

    pub fn action(
        mut self,
        hook: impl Fn(&mut T, &A) -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.action = Some(Box::new(hook));
        self
    }

    pub fn rollback(
        mut self,
        hook: impl Fn(&mut T, Snapshot<T>, &A) + Send + Sync + 'static,
    ) -> Self {
        self.rollback = Some(Box::new(hook));
        self
    }

    pub fn on_success(
        mut self,
        hook: impl Fn(R, &A, &mut T) -> Result<R> + Send + Sync + 'static,
    ) -> Self {
        self.on_success = Some(Box::new(hook));
        self
    }

    pub fn on_error(
        mut self,
        hook: impl Fn(&ShardError, &A) -> Option<R> + Send + Sync + 'static,
    ) -> Self {
        self.on_error = Some(Box::new(hook));
        self
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    /// Run one transaction against `target`.
    ///
    /// `remote` is not polled until the optimistic action has been applied.
    pub async fn run<Fut>(&self, target: &Tracked<T>, args: A, remote: Fut) -> Result<R>
    where
        Fut: Future<Output = Result<R>>,
    {
        let snapshot = target.snapshot();
        debug!(label = self.label, phase = %TxPhase::Applying, "Transaction started");

        if let Some(action) = &self.action {
            if let Err(err) = target.write(|t| action(t, &args)) {
                return self.fail(target, snapshot, &args, err);
            }
        }

        debug!(label = self.label, phase = %TxPhase::AwaitingRemote, "Awaiting remote");
        match remote.await {
            Ok(result) => {
                debug!(label = self.label, phase = %TxPhase::Reconciling, "Remote succeeded");
                let out = match &self.on_success {
                    Some(hook) => target.write(|t| hook(result, &args, t)),
                    None => Ok(result),
                };
                debug!(label = self.label, phase = %TxPhase::Idle, "Transaction finished");
                out
            }
            Err(err) => self.fail(target, snapshot, &args, err),
        }
    }

    fn fail(&self, target: &Tracked<T>, snapshot: Snapshot<T>, args: &A, err: ShardError) -> Result<R> {
        warn!(label = self.label, phase = %TxPhase::RollingBack, error = %err, "Transaction failed");

        if let Some(rollback) = &self.rollback {
            target.write(|t| rollback(t, snapshot, args));
        }

        if let Some(recover) = &self.on_error {
            if let Some(recovered) = recover(&err, args) {
                debug!(label = self.label, "Failure recovered by error hook");
                return Ok(recovered);
            }
        }

        Err(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Group {
        name: String,
        nodes: Vec<String>,
    }

    fn group() -> Tracked<Group> {
        Tracked::new(Group {
            name: "Living room".into(),
            nodes: vec!["n1".into()],
        })
    }

    fn rename() -> Interceptor<Group, String, String> {
        Interceptor::restoring("group.rename").action(|g: &mut Group, name: &String| {
            g.name = name.clone();
            Ok(())
        })
    }

    #[tokio::test]
    async fn test_success_keeps_optimistic_state() {
        let target = group();
        let result = rename()
            .run(&target, "Lounge".to_string(), async { Ok("ok".to_string()) })
            .await
            .unwrap();

        assert_eq!(result, "ok");
        assert_eq!(target.get().name, "Lounge");
    }

    #[tokio::test]
    async fn test_remote_failure_rolls_back() {
        let target = group();
        let before = target.get();

        let err = rename()
            .run(&target, "Lounge".to_string(), async {
                Err(ShardError::Transport("offline".into()))
            })
            .await
            .unwrap_err();

        assert_eq!(err, ShardError::Transport("offline".into()));
        assert_eq!(target.get(), before);
    }

    #[tokio::test]
    async fn test_action_failure_rolls_back_and_skips_remote() {
        let target = group();
        let before = target.get();
        let interceptor: Interceptor<Group, String, String> = Interceptor::restoring("group.add_node")
            .action(|g: &mut Group, node: &String| {
                g.nodes.push(node.clone());
                Err(ShardError::Validation("node already grouped".into()))
            });

        let remote_called = std::sync::atomic::AtomicBool::new(false);
        let err = interceptor
            .run(&target, "n2".to_string(), async {
                remote_called.store(true, std::sync::atomic::Ordering::SeqCst);
                Ok("ok".to_string())
            })
            .await
            .unwrap_err();

        assert!(matches!(err, ShardError::Validation(_)));
        assert!(!remote_called.load(std::sync::atomic::Ordering::SeqCst));
        assert_eq!(target.get(), before);
    }

    #[tokio::test]
    async fn test_on_success_transforms_result() {
        let target = group();
        let interceptor = rename().on_success(|result: String, args: &String, g: &mut Group| {
            g.nodes.push("reconciled".into());
            Ok(format!("{}:{}", result, args))
        });

        let out = interceptor
            .run(&target, "Lounge".to_string(), async { Ok("ok".to_string()) })
            .await
            .unwrap();

        assert_eq!(out, "ok:Lounge");
        assert_eq!(target.get().nodes, vec!["n1".to_string(), "reconciled".to_string()]);
    }

    #[tokio::test]
    async fn test_on_error_recovers_after_rollback() {
        let target = group();
        let interceptor = rename().on_error(|err: &ShardError, _: &String| match err {
            ShardError::NotFound(_) => Some("gone".to_string()),
            _ => None,
        });

        let out = interceptor
            .run(&target, "Lounge".to_string(), async {
                Err(ShardError::NotFound("g1".into()))
            })
            .await
            .unwrap();

        assert_eq!(out, "gone");
        assert_eq!(target.get().name, "Living room");
    }

    #[tokio::test]
    async fn test_without_rollback_hook_state_is_kept() {
        let target = group();
        let interceptor: Interceptor<Group, String, String> =
            Interceptor::new("group.rename").action(|g: &mut Group, name: &String| {
                g.name = name.clone();
                Ok(())
            });

        let _ = interceptor
            .run(&target, "Lounge".to_string(), async {
                Err(ShardError::Transport("offline".into()))
            })
            .await;

        assert_eq!(target.get().name, "Lounge");
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(TxPhase::AwaitingRemote.to_string(), "awaiting_remote");
        assert_eq!(TxPhase::RollingBack.to_string(), "rolling_back");
    }
}
