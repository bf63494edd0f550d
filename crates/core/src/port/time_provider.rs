// Clock port, used to time notebook runs

/// Wall clock in epoch milliseconds
pub trait TimeProvider: Send + Sync {
    fn now_millis(&self) -> i64;

    /// Milliseconds elapsed since `start_millis`, never negative
    fn elapsed_millis(&self, start_millis: i64) -> i64 {
        (self.now_millis() - start_millis).max(0)
    }
}

/// Clock backed by the host's UTC time
pub struct SystemTimeProvider;

impl TimeProvider for SystemTimeProvider {
    fn now_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}
