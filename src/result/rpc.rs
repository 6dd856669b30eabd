//! `RpcResult`: loading vs resolved.

use serde::{Deserialize, Serialize};

/// Tracing correlation attached to a resolution. Informational only.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Span {
    /// Trace id.
    pub trace_id: String,
    /// Span id within the trace.
    pub span_id: String,
}

impl Span {
    /// Create a span reference.
    pub fn new(trace_id: impl Into<String>, span_id: impl Into<String>) -> Self {
        Self {
            trace_id: trace_id.into(),
            span_id: span_id.into(),
        }
    }
}

/// A settled RPC outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved<V, E> {
    /// When the value was produced, in milliseconds since the epoch.
    pub timestamp: Option<u64>,
    /// Success or failure payload.
    pub value: std::result::Result<V, E>,
    /// Optional tracing metadata.
    pub span: Option<Span>,
}

impl<V, E> Resolved<V, E> {
    /// Resolution without timestamp or span.
    pub fn new(value: std::result::Result<V, E>) -> Self {
        Self {
            timestamp: None,
            value,
            span: None,
        }
    }

    /// Map the success value.
    pub fn map<U, F: FnOnce(V) -> U>(self, f: F) -> Resolved<U, E> {
        Resolved {
            timestamp: self.timestamp,
            value: self.value.map(f),
            span: self.span,
        }
    }

    /// Map the failure value.
    pub fn map_err<G, F: FnOnce(E) -> G>(self, f: F) -> Resolved<V, G> {
        Resolved {
            timestamp: self.timestamp,
            value: self.value.map_err(f),
            span: self.span,
        }
    }

    /// True if the resolution carries a success value.
    pub fn is_ok(&self) -> bool {
        self.value.is_ok()
    }
}

/// Result of an RPC or subscription: still loading, or resolved.
///
/// Combinators leave `Loading` untouched.
///
/// ```
/// use typhoon::result::RpcResult;
///
/// let loading: RpcResult<u32, String> = RpcResult::Loading;
/// assert!(loading.map(|n| n + 1).is_loading());
///
/// let done = RpcResult::<u32, String>::ok(2).map(|n| n * 10);
/// assert_eq!(done.fold(|| 0, |r| r.value.unwrap_or(0)), 20);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum RpcResult<V, E> {
    /// No outcome yet.
    Loading,
    /// Settled outcome.
    Resolved(Resolved<V, E>),
}

impl<V, E> Default for RpcResult<V, E> {
    fn default() -> Self {
        RpcResult::Loading
    }
}

impl<V, E> RpcResult<V, E> {
    /// Resolved success.
    pub fn ok(value: V) -> Self {
        RpcResult::Resolved(Resolved::new(Ok(value)))
    }

    /// Resolved failure.
    pub fn err(error: E) -> Self {
        RpcResult::Resolved(Resolved::new(Err(error)))
    }

    /// Set the timestamp of a resolved result. No effect on `Loading`.
    pub fn with_timestamp(mut self, timestamp: u64) -> Self {
        if let RpcResult::Resolved(resolved) = &mut self {
            resolved.timestamp = Some(timestamp);
        }
        self
    }

    /// Set the span of a resolved result. No effect on `Loading`.
    pub fn with_span(mut self, span: Span) -> Self {
        if let RpcResult::Resolved(resolved) = &mut self {
            resolved.span = Some(span);
        }
        self
    }

    /// Check if still loading.
    #[inline]
    pub fn is_loading(&self) -> bool {
        matches!(self, RpcResult::Loading)
    }

    /// Check if resolved, successfully or not.
    #[inline]
    pub fn is_resolved(&self) -> bool {
        matches!(self, RpcResult::Resolved(_))
    }

    /// Narrow to the resolution.
    pub fn as_resolved(&self) -> Option<&Resolved<V, E>> {
        match self {
            RpcResult::Resolved(resolved) => Some(resolved),
            RpcResult::Loading => None,
        }
    }

    /// Narrow to the resolution, by value.
    pub fn into_resolved(self) -> Option<Resolved<V, E>> {
        match self {
            RpcResult::Resolved(resolved) => Some(resolved),
            RpcResult::Loading => None,
        }
    }

    /// Success value, if resolved successfully.
    pub fn value(&self) -> Option<&V> {
        self.as_resolved().and_then(|r| r.value.as_ref().ok())
    }

    /// Timestamp, if resolved with one.
    pub fn timestamp(&self) -> Option<u64> {
        self.as_resolved().and_then(|r| r.timestamp)
    }

    /// Map the success value of a resolved result.
    pub fn map<U, F: FnOnce(V) -> U>(self, f: F) -> RpcResult<U, E> {
        match self {
            RpcResult::Loading => RpcResult::Loading,
            RpcResult::Resolved(resolved) => RpcResult::Resolved(resolved.map(f)),
        }
    }

    /// Map the failure value of a resolved result.
    pub fn map_err<G, F: FnOnce(E) -> G>(self, f: F) -> RpcResult<V, G> {
        match self {
            RpcResult::Loading => RpcResult::Loading,
            RpcResult::Resolved(resolved) => RpcResult::Resolved(resolved.map_err(f)),
        }
    }

    /// Collapse both cases into one value.
    pub fn fold<R>(
        self,
        on_loading: impl FnOnce() -> R,
        on_resolved: impl FnOnce(Resolved<V, E>) -> R,
    ) -> R {
        match self {
            RpcResult::Loading => on_loading(),
            RpcResult::Resolved(resolved) => on_resolved(resolved),
        }
    }

    /// Borrow the contents.
    pub fn as_ref(&self) -> RpcResult<&V, &E> {
        match self {
            RpcResult::Loading => RpcResult::Loading,
            RpcResult::Resolved(r) => RpcResult::Resolved(Resolved {
                timestamp: r.timestamp,
                value: r.value.as_ref(),
                span: r.span.clone(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loading_is_untouched() {
        let loading: RpcResult<u32, String> = RpcResult::default();
        assert!(loading.is_loading());

        let mapped = loading
            .map(|n| n.to_string())
            .map_err(|e| e.len())
            .with_timestamp(5);
        assert_eq!(mapped, RpcResult::Loading);
        assert_eq!(mapped.timestamp(), None);
    }

    #[test]
    fn test_map_keeps_metadata() {
        let result = RpcResult::<u32, String>::ok(4)
            .with_timestamp(1_700_000_000_000)
            .with_span(Span::new("t1", "s1"))
            .map(|n| n * 2);

        let resolved = result.as_resolved().unwrap();
        assert_eq!(resolved.value, Ok(8));
        assert_eq!(resolved.timestamp, Some(1_700_000_000_000));
        assert_eq!(resolved.span.as_ref().unwrap().trace_id, "t1");
    }

    #[test]
    fn test_map_err_only_touches_failures() {
        let failed = RpcResult::<u32, &str>::err("nope").map_err(str::len);
        assert_eq!(failed.into_resolved().unwrap().value, Err(4));

        let fine = RpcResult::<u32, &str>::ok(1).map_err(str::len);
        assert_eq!(fine.value(), Some(&1));
    }

    #[test]
    fn test_fold() {
        let render = |r: RpcResult<u32, String>| {
            r.fold(
                || "loading".to_string(),
                |resolved| match resolved.value {
                    Ok(n) => format!("{n} heals"),
                    Err(e) => format!("error: {e}"),
                },
            )
        };

        assert_eq!(render(RpcResult::Loading), "loading");
        assert_eq!(render(RpcResult::ok(2)), "2 heals");
        assert_eq!(render(RpcResult::err("timeout".into())), "error: timeout");
    }

    #[test]
    fn test_narrowing() {
        let result = RpcResult::<u32, String>::ok(3);
        assert!(result.is_resolved());
        assert!(result.as_resolved().unwrap().is_ok());
        assert_eq!(result.as_ref().value(), Some(&&3));
        assert!(RpcResult::<u32, String>::Loading.into_resolved().is_none());
    }

    #[test]
    fn test_span_serde_shape() {
        let json = serde_json::to_value(Span::new("abc", "def")).unwrap();
        assert_eq!(json, serde_json::json!({ "traceId": "abc", "spanId": "def" }));
    }
}
