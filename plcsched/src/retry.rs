use std::time::Duration;

/// Delay between reconnect attempts of the controller
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Trait that controls how the controller retries failed connection attempts
pub trait RetryStrategy: Send {
    /// Reset internal state. Called when a connection is successful
    fn reset(&mut self);
    /// Return the next delay before making another connection attempt
    fn after_failed_connect(&mut self) -> Duration;
}

/// Return the default [`RetryStrategy`], a fixed one second delay
pub fn default_retry_strategy() -> Box<dyn RetryStrategy> {
    fixed_retry_strategy(DEFAULT_RETRY_DELAY)
}

/// Return a [`RetryStrategy`] that always waits `delay`, forever
pub fn fixed_retry_strategy(delay: Duration) -> Box<dyn RetryStrategy> {
    Box::new(Fixed { delay })
}

struct Fixed {
    delay: Duration,
}

impl RetryStrategy for Fixed {
    fn reset(&mut self) {}

    fn after_failed_connect(&mut self) -> Duration {
        self.delay
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_strategy_never_backs_off() {
        let mut strategy = fixed_retry_strategy(Duration::from_millis(250));
        for _ in 0..10 {
            assert_eq!(strategy.after_failed_connect(), Duration::from_millis(250));
        }
        strategy.reset();
        assert_eq!(strategy.after_failed_connect(), Duration::from_millis(250));
        assert_eq!(
            default_retry_strategy().after_failed_connect(),
            Duration::from_secs(1)
        );
    }
}
