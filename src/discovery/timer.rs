//! Exclusively owned handles to the session's local timer tasks.

use std::future::Future;

use tokio::task::JoinHandle;

/// A timer the orchestrator may arm at most once at a time.
///
/// Cancelling an unarmed slot is a no-op, which makes the shutdown
/// sequence safe to reach from several triggers.
#[derive(Debug, Default)]
pub struct TimerSlot {
    name: &'static str,
    handle: Option<JoinHandle<()>>,
}

impl TimerSlot {
    /// Create an unarmed slot.
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self { name, handle: None }
    }

    /// Spawn `task` on the current `LocalSet` and keep its handle.
    ///
    /// A task that was already armed is cancelled first.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a `tokio::task::LocalSet`.
    pub fn arm<F>(&mut self, task: F)
    where
        F: Future<Output = ()> + 'static,
    {
        self.cancel();
        self.handle = Some(tokio::task::spawn_local(task));
    }

    /// Whether a task is currently held and still running.
    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Abort and clear the held task. Returns `true` if one was armed.
    pub fn cancel(&mut self) -> bool {
        match self.handle.take() {
            Some(handle) => {
                handle.abort();
                log::trace!("Cancelled {} timer", self.name);
                true
            }
            None => false,
        }
    }
}

impl Drop for TimerSlot {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;
    use std::time::Duration;
    use tokio::task::LocalSet;

    #[test]
    fn test_cancel_unarmed_is_noop() {
        let mut slot = TimerSlot::new("test");
        assert!(!slot.is_armed());
        assert!(!slot.cancel());
        assert!(!slot.cancel());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_prevents_fire() {
        LocalSet::new()
            .run_until(async {
                let fired = Rc::new(Cell::new(false));
                let mut slot = TimerSlot::new("test");
                let flag = Rc::clone(&fired);
                slot.arm(async move {
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    flag.set(true);
                });
                assert!(slot.is_armed());

                assert!(slot.cancel());
                assert!(!slot.cancel());

                tokio::time::sleep(Duration::from_secs(2)).await;
                assert!(!fired.get());
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_replaces_previous_task() {
        LocalSet::new()
            .run_until(async {
                let count = Rc::new(Cell::new(0));
                let mut slot = TimerSlot::new("test");
                for _ in 0..3 {
                    let count = Rc::clone(&count);
                    slot.arm(async move {
                        tokio::time::sleep(Duration::from_secs(1)).await;
                        count.set(count.get() + 1);
                    });
                }

                tokio::time::sleep(Duration::from_secs(2)).await;
                assert_eq!(count.get(), 1);
                assert!(!slot.is_armed());
            })
            .await;
    }
}
