//! Ordered fallback strategies.
//!
//! A [`Chain`] holds named async strategies that are only started when
//! every earlier one has failed or produced a value the caller rejects.
//! The search chain and each stage's degrade-to-default behavior run on it.

use std::future::Future;

use futures::future::BoxFuture;

use crate::error::Result;

type Step<'a, T> = Box<dyn FnOnce() -> BoxFuture<'a, Result<T>> + Send + 'a>;

pub struct Chain<'a, T> {
    steps: Vec<(String, Step<'a, T>)>,
}

impl<'a, T: Send + 'a> Default for Chain<'a, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a, T: Send + 'a> Chain<'a, T> {
    pub fn new() -> Self {
        Self { steps: Vec::new() }
    }

    /// Append a strategy. It runs only if everything before it came up empty.
    pub fn then<F, Fut>(mut self, name: impl Into<String>, step: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'a,
        Fut: Future<Output = Result<T>> + Send + 'a,
    {
        let boxed: Step<'a, T> = Box::new(move || -> BoxFuture<'a, Result<T>> { Box::pin(step()) });
        self.steps.push((name.into(), boxed));
        self
    }

    /// Run strategies in order until one returns an accepted value.
    pub async fn run(self, accept: impl Fn(&T) -> bool) -> Resolved<T> {
        let mut trail = Vec::new();
        for (name, step) in self.steps {
            match step().await {
                Ok(value) if accept(&value) => {
                    tracing::debug!(strategy = %name, "Fallback chain resolved");
                    return Resolved {
                        value: Some(value),
                        source: Some(name),
                        trail,
                    };
                }
                Ok(_) => {
                    tracing::debug!(strategy = %name, "Strategy returned nothing usable");
                    trail.push(format!("{name}: no usable result"));
                }
                Err(e) => {
                    tracing::debug!(strategy = %name, error = %e, "Strategy failed");
                    trail.push(format!("{name}: {e}"));
                }
            }
        }
        Resolved {
            value: None,
            source: None,
            trail,
        }
    }

    /// Run until the first `Ok`.
    pub async fn first_ok(self) -> Resolved<T> {
        self.run(|_| true).await
    }
}

/// Outcome of a chain run.
#[derive(Debug)]
pub struct Resolved<T> {
    pub value: Option<T>,
    /// Name of the strategy that produced `value`.
    pub source: Option<String>,
    /// One line per strategy that failed or was rejected.
    pub trail: Vec<String>,
}

impl<T> Resolved<T> {
    /// Substitute a default when every strategy came up empty.
    pub fn or_fallback(self, label: &str, fallback: impl FnOnce() -> T) -> Traced<T> {
        let Resolved {
            value, mut trail, ..
        } = self;
        match value {
            Some(value) => Traced { value, log: trail },
            None => {
                trail.push(format!("{label}: using fallback"));
                Traced {
                    value: fallback(),
                    log: trail,
                }
            }
        }
    }
}

/// A stage output together with the diagnostic lines produced on the way.
#[derive(Debug, Clone, PartialEq)]
pub struct Traced<T> {
    pub value: T,
    pub log: Vec<String>,
}

impl<T> Traced<T> {
    pub fn new(value: T) -> Self {
        Self {
            value,
            log: Vec::new(),
        }
    }

    pub fn into_inner(self) -> T {
        self.value
    }

    /// Whether any strategy failed on the way to `value`.
    pub fn degraded(&self) -> bool {
        !self.log.is_empty()
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Traced<U> {
        Traced {
            value: f(self.value),
            log: self.log,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn stops_at_first_accepted_value() {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        let resolved = Chain::new()
            .then("broken", || async { Err::<Vec<u32>, _>(Error::transport("down")) })
            .then("empty", || async { Ok(vec![]) })
            .then("good", || async { Ok(vec![1, 2]) })
            .then("never", move || async move {
                c.fetch_add(1, Ordering::SeqCst);
                Ok(vec![3])
            })
            .run(|v: &Vec<u32>| !v.is_empty())
            .await;

        assert_eq!(resolved.value, Some(vec![1, 2]));
        assert_eq!(resolved.source.as_deref(), Some("good"));
        assert_eq!(resolved.trail.len(), 2);
        assert!(resolved.trail[0].starts_with("broken: transport error"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn exhausted_chain_falls_back() {
        let traced = Chain::<u32>::new()
            .then("a", || async { Err(Error::Parse("bad".into())) })
            .first_ok()
            .await
            .or_fallback("planning", || 7);
        assert_eq!(traced.value, 7);
        assert!(traced.degraded());
        assert_eq!(traced.log.last().unwrap(), "planning: using fallback");
    }
}
