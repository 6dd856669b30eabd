//! Optimistic vs server-confirmed values, and monotonic application.

use serde::{Deserialize, Serialize};

use super::rpc::RpcResult;

/// How settled a value is.
///
/// `Optimistic` is a local prediction shown before the server confirms;
/// `Complete` is the confirmed value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "state", content = "value", rename_all = "lowercase")]
pub enum Convergence<V> {
    /// Locally predicted.
    Optimistic(V),
    /// Server-confirmed.
    Complete(V),
}

impl<V> Convergence<V> {
    /// The value, whatever its state.
    pub fn value(&self) -> &V {
        match self {
            Convergence::Optimistic(v) | Convergence::Complete(v) => v,
        }
    }

    /// The value, by value.
    pub fn into_value(self) -> V {
        match self {
            Convergence::Optimistic(v) | Convergence::Complete(v) => v,
        }
    }

    /// Check if optimistic.
    #[inline]
    pub fn is_optimistic(&self) -> bool {
        matches!(self, Convergence::Optimistic(_))
    }

    /// Check if complete.
    #[inline]
    pub fn is_complete(&self) -> bool {
        matches!(self, Convergence::Complete(_))
    }

    /// The value, only if complete.
    pub fn as_complete(&self) -> Option<&V> {
        match self {
            Convergence::Complete(v) => Some(v),
            Convergence::Optimistic(_) => None,
        }
    }

    /// Map the value, keeping the state.
    pub fn map<U, F: FnOnce(V) -> U>(self, f: F) -> Convergence<U> {
        match self {
            Convergence::Optimistic(v) => Convergence::Optimistic(f(v)),
            Convergence::Complete(v) => Convergence::Complete(f(v)),
        }
    }

    /// Collapse both states into one value.
    pub fn fold<R>(self, on_optimistic: impl FnOnce(V) -> R, on_complete: impl FnOnce(V) -> R) -> R {
        match self {
            Convergence::Optimistic(v) => on_optimistic(v),
            Convergence::Complete(v) => on_complete(v),
        }
    }

    /// Borrow the value, keeping the state.
    pub fn as_ref(&self) -> Convergence<&V> {
        match self {
            Convergence::Optimistic(v) => Convergence::Optimistic(v),
            Convergence::Complete(v) => Convergence::Complete(v),
        }
    }
}

/// Latest state of a subscription whose values converge.
///
/// [`apply`](Self::apply) never lets an optimistic value overwrite a
/// complete one unless both are dated and the optimistic value is strictly
/// newer.
///
/// ```
/// use typhoon::result::{Convergence, RpcResult, SubscriptionState};
///
/// let mut state = SubscriptionState::<u32, String>::new();
/// assert!(state.apply(RpcResult::ok(Convergence::Complete(3)).with_timestamp(10)));
///
/// // A stale prediction is ignored.
/// assert!(!state.apply(RpcResult::ok(Convergence::Optimistic(4)).with_timestamp(10)));
/// assert_eq!(state.current().value(), Some(&Convergence::Complete(3)));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionState<V, E> {
    current: RpcResult<Convergence<V>, E>,
}

impl<V, E> Default for SubscriptionState<V, E> {
    fn default() -> Self {
        Self {
            current: RpcResult::Loading,
        }
    }
}

impl<V, E> SubscriptionState<V, E> {
    /// Start in `Loading`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current composed value.
    pub fn current(&self) -> &RpcResult<Convergence<V>, E> {
        &self.current
    }

    /// Consume into the current value.
    pub fn into_current(self) -> RpcResult<Convergence<V>, E> {
        self.current
    }

    /// Replace the current value with `next` unless that would regress a
    /// complete value to an optimistic one. Returns whether `next` was taken.
    ///
    /// An optimistic success is rejected over a complete success when either
    /// one is undated, or when the complete value's timestamp is the same or
    /// newer.
    pub fn apply(&mut self, next: RpcResult<Convergence<V>, E>) -> bool {
        if self.regresses(&next) {
            tracing::debug!(
                current = ?self.current.timestamp(),
                incoming = ?next.timestamp(),
                "optimistic update ignored"
            );
            return false;
        }
        self.current = next;
        true
    }

    fn regresses(&self, next: &RpcResult<Convergence<V>, E>) -> bool {
        let current_complete = self.current.value().is_some_and(Convergence::is_complete);
        let next_optimistic = next.value().is_some_and(Convergence::is_optimistic);
        if !(current_complete && next_optimistic) {
            return false;
        }

        match (self.current.timestamp(), next.timestamp()) {
            (Some(current), Some(incoming)) => current >= incoming,
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type State = SubscriptionState<&'static str, String>;

    fn complete(v: &'static str, ts: u64) -> RpcResult<Convergence<&'static str>, String> {
        RpcResult::ok(Convergence::Complete(v)).with_timestamp(ts)
    }

    fn optimistic(v: &'static str, ts: u64) -> RpcResult<Convergence<&'static str>, String> {
        RpcResult::ok(Convergence::Optimistic(v)).with_timestamp(ts)
    }

    #[test]
    fn test_convergence_combinators() {
        let value = Convergence::Optimistic(2).map(|n| n * 3);
        assert_eq!(value, Convergence::Optimistic(6));
        assert!(value.is_optimistic());
        assert_eq!(value.as_complete(), None);
        assert_eq!(*value.value(), 6);

        let done = Convergence::Complete("ok");
        assert_eq!(done.as_complete(), Some(&"ok"));
        assert_eq!(done.fold(|_| "predicted", |v| v), "ok");
        assert_eq!(done.as_ref().into_value(), &"ok");
    }

    #[test]
    fn test_serde_shape() {
        let json = serde_json::to_value(Convergence::Complete(1)).unwrap();
        assert_eq!(json, serde_json::json!({ "state": "complete", "value": 1 }));
    }

    #[test]
    fn test_optimistic_then_complete() {
        let mut state = State::new();
        assert!(state.current().is_loading());

        assert!(state.apply(optimistic("guess", 1)));
        assert!(state.apply(complete("real", 1)));
        assert_eq!(state.current().value(), Some(&Convergence::Complete("real")));
    }

    #[test]
    fn test_complete_never_regresses() {
        let mut state = State::new();
        state.apply(complete("real", 5));

        assert!(!state.apply(optimistic("older", 4)));
        assert!(!state.apply(optimistic("same", 5)));
        assert!(!state.apply(RpcResult::ok(Convergence::Optimistic("undated"))));
        assert_eq!(state.current().value(), Some(&Convergence::Complete("real")));

        // A strictly newer prediction is a new logical update.
        assert!(state.apply(optimistic("newer", 6)));
    }

    #[test]
    fn test_complete_and_errors_always_apply() {
        let mut state = State::new();
        state.apply(complete("a", 5));

        assert!(state.apply(complete("b", 3)));
        assert!(state.apply(RpcResult::err("lost connection".into())));
        assert!(state.current().value().is_none());
        assert!(state.apply(optimistic("retry", 1)));
    }

    #[test]
    fn test_undated_complete_rejects_dated_prediction() {
        let mut state = State::new();
        assert!(state.apply(RpcResult::ok(Convergence::Complete("real"))));

        assert!(!state.apply(optimistic("guess", 1)));
        assert!(!state.apply(optimistic("later guess", u64::MAX)));
        assert_eq!(state.current().value(), Some(&Convergence::Complete("real")));

        // A dated confirmation still replaces it.
        assert!(state.apply(complete("newer", 2)));
    }
}
