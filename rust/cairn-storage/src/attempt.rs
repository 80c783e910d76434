use std::future::Future;

use futures_util::{FutureExt, future::BoxFuture};
use tracing::{debug, warn};

use crate::StorageError;

type Attempt<'a, T> = Box<dyn FnOnce() -> BoxFuture<'a, Result<T, StorageError>> + Send + 'a>;

/// An ordered list of ways to obtain a value.
///
/// Attempts run one at a time, in the order they were added, and only after
/// the previous one failed. The first success wins; if every attempt fails
/// the last error is returned.
pub struct Attempts<'a, T> {
    attempts: Vec<(&'static str, Attempt<'a, T>)>,
}

impl<'a, T> Attempts<'a, T>
where
    T: Send + 'a,
{
    /// An empty sequence
    pub fn new() -> Self {
        Self {
            attempts: Vec::new(),
        }
    }

    /// Append an attempt, named for diagnostics
    pub fn then<F, Fut>(mut self, name: &'static str, attempt: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'a,
        Fut: Future<Output = Result<T, StorageError>> + Send + 'a,
    {
        self.attempts
            .push((name, Box::new(move || attempt().boxed())));
        self
    }

    /// Append an attempt only when `enabled`
    pub fn then_if<F, Fut>(self, enabled: bool, name: &'static str, attempt: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'a,
        Fut: Future<Output = Result<T, StorageError>> + Send + 'a,
    {
        if enabled { self.then(name, attempt) } else { self }
    }

    /// Number of attempts in the sequence
    pub fn len(&self) -> usize {
        self.attempts.len()
    }

    /// Whether the sequence has no attempts
    pub fn is_empty(&self) -> bool {
        self.attempts.is_empty()
    }

    /// Run the attempts in order until one succeeds
    pub async fn run(self) -> Result<T, StorageError> {
        let total = self.attempts.len();
        let mut last_error = None;

        for (position, (name, attempt)) in self.attempts.into_iter().enumerate() {
            match attempt().await {
                Ok(value) => {
                    debug!(attempt = name, position, "Attempt succeeded");
                    return Ok(value);
                }
                Err(error) => {
                    debug!(attempt = name, position, total, %error, "Attempt failed");
                    last_error = Some(error);
                }
            }
        }

        match last_error {
            Some(error) => {
                warn!(attempts = total, %error, "All attempts failed");
                Err(error)
            }
            None => Err(StorageError::Configuration(
                "no attempts were configured".into(),
            )),
        }
    }
}

impl<'a, T> Default for Attempts<'a, T>
where
    T: Send + 'a,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting<'a>(
        calls: &'a Arc<AtomicUsize>,
        result: Result<u32, StorageError>,
    ) -> impl FnOnce() -> BoxFuture<'a, Result<u32, StorageError>> + Send + 'a {
        move || {
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                result
            }
            .boxed()
        }
    }

    #[tokio::test]
    async fn it_stops_at_the_first_success() -> anyhow::Result<()> {
        let calls = Arc::new(AtomicUsize::new(0));

        let value = Attempts::new()
            .then("first", counting(&calls, Err(StorageError::Transfer("down".into()))))
            .then("second", counting(&calls, Ok(2)))
            .then("third", counting(&calls, Ok(3)))
            .run()
            .await?;

        assert_eq!(value, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        Ok(())
    }

    #[tokio::test]
    async fn it_returns_the_last_error_when_everything_fails() -> anyhow::Result<()> {
        let calls = Arc::new(AtomicUsize::new(0));

        let result = Attempts::new()
            .then("first", counting(&calls, Err(StorageError::Transfer("a".into()))))
            .then("second", counting(&calls, Err(StorageError::NotFound("b".into()))))
            .run()
            .await;

        assert!(matches!(result, Err(StorageError::NotFound(ref hash)) if hash == "b"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        Ok(())
    }

    #[tokio::test]
    async fn it_skips_disabled_attempts() -> anyhow::Result<()> {
        let calls = Arc::new(AtomicUsize::new(0));

        let attempts = Attempts::new()
            .then_if(false, "skipped", counting(&calls, Ok(1)))
            .then("fallback", counting(&calls, Ok(2)));
        assert_eq!(attempts.len(), 1);

        assert_eq!(attempts.run().await?, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        Ok(())
    }

    #[tokio::test]
    async fn it_fails_when_nothing_was_configured() {
        let result = Attempts::<u32>::new().run().await;
        assert!(matches!(result, Err(StorageError::Configuration(_))));
    }
}
