//! Interruption of the blocking readiness wait.
//!
//! The wait loop in [`crate::Mysqld::run`] polls an [`InterruptToken`];
//! another thread interrupts it through [`crate::Mysqld::interrupt`]. The
//! server process itself is left alone.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared flag observed by a polling loop.
///
/// Clones share state: interrupting any clone interrupts them all.
#[derive(Debug, Clone, Default)]
pub struct InterruptToken {
    interrupted: Arc<AtomicBool>,
}

impl InterruptToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request that the current wait stop.
    pub fn interrupt(&self) {
        self.interrupted.store(true, Ordering::SeqCst);
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }

    /// Consume a pending interrupt, clearing the flag.
    ///
    /// An interrupt raised before the wait starts stays pending until a
    /// wait takes it.
    pub fn take(&self) -> bool {
        self.interrupted.swap(false, Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_token_not_interrupted() {
        assert!(!InterruptToken::new().is_interrupted());
    }

    #[test]
    fn test_clone_shares_state() {
        let token = InterruptToken::new();
        let other = token.clone();

        other.interrupt();
        assert!(token.is_interrupted());

        assert!(token.take());
        assert!(!other.is_interrupted());
    }

    #[test]
    fn test_take_consumes_once() {
        let token = InterruptToken::new();
        assert!(!token.take());

        token.interrupt();
        assert!(token.take());
        assert!(!token.take());
    }
}
