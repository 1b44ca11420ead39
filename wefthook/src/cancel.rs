//! Cancellation signal passed to asynchronous hook variants.
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use weftir::value::ErrorValue;

/// A cooperatively observed cancellation signal for one logical invocation.
///
/// Asynchronous hooks receive a reference and are expected to surface an
/// observed cancellation as a fault, which woven code then treats exactly
/// like any other exception in flight. Cloning shares the underlying flag.
#[derive(Debug, Clone, Default)]
pub struct Cancellation {
    flag: Arc<AtomicBool>,
}

impl Cancellation {
    pub fn new() -> Self {
        Cancellation::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// Convenience check used at hook boundaries: `Err` with the standard
    /// cancellation error once the signal is set.
    pub fn guard(&self) -> Result<(), ErrorValue> {
        if self.is_cancelled() {
            Err(ErrorValue::cancelled())
        } else {
            Ok(())
        }
    }
}
