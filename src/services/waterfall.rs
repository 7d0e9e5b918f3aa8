//! First-success-wins evaluation of an ordered list of lookup strategies

use futures::future::BoxFuture;
use tracing::debug;

/// Result of a single lookup strategy
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T> {
    Matched(T),
    NoMatch,
}

impl<T> Outcome<T> {
    pub fn matched(self) -> Option<T> {
        match self {
            Self::Matched(v) => Some(v),
            Self::NoMatch => None,
        }
    }
}

impl<T> From<Option<T>> for Outcome<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => Self::Matched(v),
            None => Self::NoMatch,
        }
    }
}

/// A lazily evaluated lookup; only runs if every earlier strategy missed
pub struct Strategy<'a, T> {
    name: &'static str,
    run: Box<dyn FnOnce() -> BoxFuture<'a, Outcome<T>> + Send + 'a>,
}

impl<'a, T> Strategy<'a, T> {
    pub fn new<F>(name: &'static str, run: F) -> Self
    where
        F: FnOnce() -> BoxFuture<'a, Outcome<T>> + Send + 'a,
    {
        Self {
            name,
            run: Box::new(run),
        }
    }

    /// A strategy backed by a value that is already known
    pub fn ready(name: &'static str, value: Option<T>) -> Self
    where
        T: Send + 'a,
    {
        Self::new(name, move || Box::pin(async move { Outcome::from(value) }))
    }
}

/// Run strategies in order until one matches; returns the match and the strategy name
pub async fn first_match<'a, T>(strategies: Vec<Strategy<'a, T>>) -> Outcome<(T, &'static str)> {
    for strategy in strategies {
        let name = strategy.name;
        if let Outcome::Matched(value) = (strategy.run)().await {
            debug!(strategy = name, "Lookup strategy matched");
            return Outcome::Matched((value, name));
        }
    }
    Outcome::NoMatch
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_first_success_wins_and_stops() {
        let later_calls = Arc::new(AtomicUsize::new(0));
        let counter = later_calls.clone();

        let result = first_match(vec![
            Strategy::ready("override", None),
            Strategy::new("hint", || Box::pin(async { Outcome::Matched("tt1".to_string()) })),
            Strategy::new("search", move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Box::pin(async { Outcome::Matched("tt2".to_string()) })
            }),
        ])
        .await;

        assert_eq!(result, Outcome::Matched(("tt1".to_string(), "hint")));
        assert_eq!(later_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_exhausted_is_no_match() {
        let result = first_match::<String>(vec![
            Strategy::ready("a", None),
            Strategy::new("b", || Box::pin(async { Outcome::NoMatch })),
        ])
        .await;
        assert_eq!(result, Outcome::NoMatch);
    }
}
