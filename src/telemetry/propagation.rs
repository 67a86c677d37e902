//! Trace Propagation
//!
//! Carries a span context across process boundaries in `x-*` headers.

use crate::core::is_valid_id;
use crate::types::{SpanContext, TraceHeaders};

pub const TRACE_ID_HEADER: &str = "x-trace-id";
pub const SPAN_ID_HEADER: &str = "x-span-id";
pub const PARENT_SPAN_ID_HEADER: &str = "x-parent-span-id";
pub const SAMPLED_HEADER: &str = "x-sampled";

/// Serialize a span context into propagation headers.
pub fn inject_into_headers(context: &SpanContext) -> TraceHeaders {
    let mut headers = TraceHeaders::new();
    inject_into(&mut headers, context);
    headers
}

/// Write propagation headers into an existing header map.
pub fn inject_into(headers: &mut TraceHeaders, context: &SpanContext) {
    headers.insert(TRACE_ID_HEADER.to_string(), context.trace_id.clone());
    headers.insert(SPAN_ID_HEADER.to_string(), context.span_id.clone());
    match &context.parent_span_id {
        Some(parent) => {
            headers.insert(PARENT_SPAN_ID_HEADER.to_string(), parent.clone());
        }
        None => {
            headers.remove(PARENT_SPAN_ID_HEADER);
        }
    }
    headers.insert(SAMPLED_HEADER.to_string(), context.sampled.to_string());
}

fn header<'a>(headers: &'a TraceHeaders, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.trim())
        .filter(|value| !value.is_empty())
}

/// Read a span context from headers. Header names match case-insensitively.
///
/// Returns `None` unless both a trace id and a span id are present and
/// well-formed. A missing `x-sampled` header means sampled.
pub fn extract_from_headers(headers: &TraceHeaders) -> Option<SpanContext> {
    let trace_id = header(headers, TRACE_ID_HEADER).filter(|id| is_valid_id(id))?;
    let span_id = header(headers, SPAN_ID_HEADER).filter(|id| is_valid_id(id))?;
    let parent_span_id = header(headers, PARENT_SPAN_ID_HEADER)
        .filter(|id| is_valid_id(id))
        .map(str::to_string);
    let sampled = header(headers, SAMPLED_HEADER)
        .map(|value| !matches!(value.to_ascii_lowercase().as_str(), "false" | "0"))
        .unwrap_or(true);

    Some(SpanContext {
        trace_id: trace_id.to_string(),
        span_id: span_id.to_string(),
        parent_span_id,
        sampled,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(parent: Option<&str>) -> SpanContext {
        SpanContext {
            trace_id: "4bf92f3577b34da6a3ce929d0e0e4736".to_string(),
            span_id: "00f067aa0ba902b7".to_string(),
            parent_span_id: parent.map(str::to_string),
            sampled: false,
        }
    }

    #[test]
    fn test_inject_headers() {
        let headers = inject_into_headers(&context(Some("b7ad6b7169203331")));

        assert_eq!(headers.get("x-trace-id").unwrap(), "4bf92f3577b34da6a3ce929d0e0e4736");
        assert_eq!(headers.get("x-span-id").unwrap(), "00f067aa0ba902b7");
        assert_eq!(headers.get("x-parent-span-id").unwrap(), "b7ad6b7169203331");
        assert_eq!(headers.get("x-sampled").unwrap(), "false");
    }

    #[test]
    fn test_root_span_has_no_parent_header() {
        let mut headers = inject_into_headers(&context(Some("b7ad6b7169203331")));
        inject_into(&mut headers, &context(None));
        assert!(!headers.contains_key(PARENT_SPAN_ID_HEADER));
    }

    #[test]
    fn test_extract_case_insensitive() {
        let mut headers = TraceHeaders::new();
        headers.insert("X-Trace-Id".to_string(), "abc123".to_string());
        headers.insert("X-SPAN-ID".to_string(), "def456".to_string());

        let extracted = extract_from_headers(&headers).unwrap();
        assert_eq!(extracted.trace_id, "abc123");
        assert_eq!(extracted.span_id, "def456");
        assert!(extracted.parent_span_id.is_none());
        assert!(extracted.sampled);
    }

    #[test]
    fn test_extract_requires_ids() {
        let mut headers = TraceHeaders::new();
        headers.insert(TRACE_ID_HEADER.to_string(), "abc123".to_string());
        assert!(extract_from_headers(&headers).is_none());

        headers.insert(SPAN_ID_HEADER.to_string(), "  ".to_string());
        assert!(extract_from_headers(&headers).is_none());

        headers.insert(SPAN_ID_HEADER.to_string(), "not hex".to_string());
        assert!(extract_from_headers(&headers).is_none());
    }

    #[test]
    fn test_round_trip_preserves_ids() {
        let original = inject_into_headers(&context(Some("b7ad6b7169203331")));
        let reinjected = inject_into_headers(&extract_from_headers(&original).unwrap());

        assert_eq!(reinjected, original);
    }
}
