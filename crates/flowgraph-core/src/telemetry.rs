//! The three optional telemetry sinks: structured logging, metrics, and
//! tracing spans.
//!
//! All three are injected via [`crate::context::ExecutionContext`] rather
//! than reached for as process-wide singletons. Each has a `tracing`-backed
//! default and a no-op implementation for callers who want zero telemetry
//! overhead.

use std::sync::Arc;

/// Severity of a structured log event emitted by the executor.
///
/// `debug` for node start, `info` for node/run completion, `warn` for
/// unreachable-node and near-timeout diagnostics, `error` for node
/// failure, run failure, and panics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// Structured logging sink. `run_id`/`node_id` are threaded explicitly
/// rather than relying on a thread-local/span-local context so the sink
/// stays trivially testable (a fake `Logger` can just record its calls).
pub trait Logger: Send + Sync {
    fn log(&self, level: LogLevel, message: &str, run_id: &str, node_id: &str);
}

/// Routes every event through the ambient `tracing` subscriber.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn log(&self, level: LogLevel, message: &str, run_id: &str, node_id: &str) {
        match level {
            LogLevel::Debug => tracing::debug!(run_id, node_id, "{message}"),
            LogLevel::Info => tracing::info!(run_id, node_id, "{message}"),
            LogLevel::Warn => tracing::warn!(run_id, node_id, "{message}"),
            LogLevel::Error => tracing::error!(run_id, node_id, "{message}"),
        }
    }
}

/// Discards every event. The default when a caller supplies no logger.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopLogger;

impl Logger for NoopLogger {
    fn log(&self, _level: LogLevel, _message: &str, _run_id: &str, _node_id: &str) {}
}

/// Counter/histogram/gauge sink. Metric names are fixed
/// (`flowgraph.node.executions`, `flowgraph.node.failures`,
/// `flowgraph.node.duration`, `flowgraph.run.duration`,
/// `flowgraph.run.active`, `flowgraph.checkpoint.saves`,
/// `flowgraph.checkpoint.size`); labels are passed as `(key, value)`
/// pairs, typically just `[("node_id", id)]`.
pub trait MetricsRecorder: Send + Sync {
    fn incr_counter(&self, name: &str, labels: &[(&str, &str)]);
    fn record_histogram(&self, name: &str, value: f64, labels: &[(&str, &str)]);
    fn set_gauge(&self, name: &str, value: f64, labels: &[(&str, &str)]);
}

/// Emits each sample as a `tracing` event at `debug` level with the metric
/// name and labels as fields, so a metrics-aware `tracing` layer can pick
/// them up without this crate depending on any particular metrics backend.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingMetricsRecorder;

impl MetricsRecorder for TracingMetricsRecorder {
    fn incr_counter(&self, name: &str, labels: &[(&str, &str)]) {
        tracing::debug!(metric = name, kind = "counter", ?labels, "metric sample");
    }

    fn record_histogram(&self, name: &str, value: f64, labels: &[(&str, &str)]) {
        tracing::debug!(metric = name, kind = "histogram", value, ?labels, "metric sample");
    }

    fn set_gauge(&self, name: &str, value: f64, labels: &[(&str, &str)]) {
        tracing::debug!(metric = name, kind = "gauge", value, ?labels, "metric sample");
    }
}

/// Discards every sample.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetricsRecorder;

impl MetricsRecorder for NoopMetricsRecorder {
    fn incr_counter(&self, _name: &str, _labels: &[(&str, &str)]) {}
    fn record_histogram(&self, _name: &str, _value: f64, _labels: &[(&str, &str)]) {}
    fn set_gauge(&self, _name: &str, _value: f64, _labels: &[(&str, &str)]) {}
}

/// Source of `tracing` spans for a run and its nodes.
pub trait SpanSource: Send + Sync {
    fn run_span(&self, run_id: &str) -> tracing::Span;
    fn node_span(&self, run_id: &str, node_id: &str, attempt: u32) -> tracing::Span;
}

/// Opens a real `tracing::info_span!` for each run and node.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSpanSource;

impl SpanSource for TracingSpanSource {
    fn run_span(&self, run_id: &str) -> tracing::Span {
        tracing::info_span!("flowgraph.run", run_id)
    }

    fn node_span(&self, run_id: &str, node_id: &str, attempt: u32) -> tracing::Span {
        tracing::info_span!("flowgraph.node", run_id, node_id, attempt)
    }
}

/// Returns [`tracing::Span::none`] for every call; avoids the (small)
/// overhead of span construction when the caller has no use for them.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSpanSource;

impl SpanSource for NoopSpanSource {
    fn run_span(&self, _run_id: &str) -> tracing::Span {
        tracing::Span::none()
    }

    fn node_span(&self, _run_id: &str, _node_id: &str, _attempt: u32) -> tracing::Span {
        tracing::Span::none()
    }
}

/// Bundles the three sinks so they can be threaded through [`crate::options::RunOptions`]
/// and [`crate::context::ExecutionContext`] as one value.
#[derive(Clone)]
pub struct Telemetry {
    pub logger: Arc<dyn Logger>,
    pub metrics: Arc<dyn MetricsRecorder>,
    pub spans: Arc<dyn SpanSource>,
}

impl Default for Telemetry {
    /// Routes through `tracing` rather than going silent by default.
    fn default() -> Self {
        Self {
            logger: Arc::new(TracingLogger),
            metrics: Arc::new(TracingMetricsRecorder),
            spans: Arc::new(TracingSpanSource),
        }
    }
}

impl Telemetry {
    /// All three sinks as no-ops.
    pub fn noop() -> Self {
        Self {
            logger: Arc::new(NoopLogger),
            metrics: Arc::new(NoopMetricsRecorder),
            spans: Arc::new(NoopSpanSource),
        }
    }
}
