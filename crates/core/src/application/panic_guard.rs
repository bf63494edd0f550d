// Panic isolation for the hosted service loop
use std::panic::{catch_unwind, UnwindSafe};
use tracing::error;

/// Result of a panic-guarded execution
#[derive(Debug)]
pub enum PanicGuardResult<T> {
    /// Execution completed
    Success(T),
    /// Execution panicked
    Panicked(String),
}

/// Execute a closure with panic isolation
///
/// If the closure panics, the panic is caught, logged and returned as
/// `PanicGuardResult::Panicked`, so the supervisor can still release the PID
/// file and exit with a failure code.
///
/// # Example
/// ```text
/// match execute_guarded(|| serve()) {
///     PanicGuardResult::Success(result) => result,
///     PanicGuardResult::Panicked(msg) => eprintln!("crashed: {}", msg),
/// }
/// ```
pub fn execute_guarded<F, T>(f: F) -> PanicGuardResult<T>
where
    F: FnOnce() -> T + UnwindSafe,
{
    match catch_unwind(f) {
        Ok(result) => PanicGuardResult::Success(result),
        Err(panic_info) => {
            let panic_msg = if let Some(s) = panic_info.downcast_ref::<&str>() {
                s.to_string()
            } else if let Some(s) = panic_info.downcast_ref::<String>() {
                s.clone()
            } else {
                "Unknown panic".to_string()
            };

            error!(panic_msg = %panic_msg, "Hosted loop panicked");
            PanicGuardResult::Panicked(panic_msg)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_passes_value_through() {
        assert!(matches!(execute_guarded(|| 42), PanicGuardResult::Success(42)));
    }

    #[test]
    fn test_panic_message_captured() {
        let result = execute_guarded(|| -> u8 { panic!("listener died") });
        match result {
            PanicGuardResult::Panicked(msg) => assert_eq!(msg, "listener died"),
            other => panic!("expected panic, got {:?}", other),
        }
    }

    #[test]
    fn test_formatted_panic_message() {
        let port = 8080;
        let result = execute_guarded(move || -> u8 { panic!("bind {} failed", port) });
        assert!(matches!(result, PanicGuardResult::Panicked(ref m) if m == "bind 8080 failed"));
    }
}
