use uuid::Uuid;

/// Generate an OpenTelemetry-compatible trace ID (32 hex characters).
pub fn generate_trace_id() -> String {
    Uuid::new_v4().as_simple().to_string()
}

/// Generate a span ID (16 hex characters).
pub fn generate_span_id() -> String {
    Uuid::new_v4().as_simple().to_string()[..16].to_string()
}

/// Span for work outside a phase execution, such as hydration, an autosave
/// flush or applying a proposal. Returns the span and its trace id.
pub fn operation_span(operation: &'static str) -> (tracing::Span, String) {
    let trace_id = generate_trace_id();
    let span = tracing::info_span!(
        "operation",
        trace_id = %trace_id,
        span_id = %generate_span_id(),
        operation,
    );
    (span, trace_id)
}

/// Span covering one phase execution. Every state transition and stream
/// event of the run is recorded inside it.
pub fn phase_execution_span(task_id: &str, phase: &str, agent_id: &str) -> (tracing::Span, String) {
    let trace_id = generate_trace_id();
    let span = tracing::info_span!(
        "phase_execution",
        trace_id = %trace_id,
        span_id = %generate_span_id(),
        task_id = %task_id,
        phase = %phase,
        agent_id = %agent_id,
    );
    (span, trace_id)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trace_id_format() {
        let id = generate_trace_id();
        assert_eq!(id.len(), 32);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn span_id_format() {
        let id = generate_span_id();
        assert_eq!(id.len(), 16);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn operation_spans_get_distinct_traces() {
        let (span, first) = operation_span("hydrate");
        let (_, second) = operation_span("hydrate");
        assert_eq!(first.len(), 32);
        assert_ne!(first, second);
        let _guard = span.enter();
    }

    #[test]
    fn phase_span_has_fresh_trace() {
        let (_a, first) = phase_execution_span("task-1", "code", "agent-coder");
        let (_b, second) = phase_execution_span("task-1", "code", "agent-coder");
        assert_ne!(first, second);
    }
}
