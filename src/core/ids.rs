//! Identifier Generation
//!
//! Random hex identifiers for traces and spans.

use rand::Rng;

/// Length of a trace id in hex characters.
pub const TRACE_ID_LENGTH: usize = 32;

/// Length of a span id in hex characters.
pub const SPAN_ID_LENGTH: usize = 16;

fn random_hex(bytes: usize) -> String {
    let mut rng = rand::thread_rng();
    let mut out: String = (0..bytes).map(|_| format!("{:02x}", rng.gen::<u8>())).collect();
    // An all-zero id is invalid in W3C trace context.
    if out.bytes().all(|b| b == b'0') {
        out.replace_range(out.len() - 1.., "1");
    }
    out
}

/// Generate a new 128-bit trace id.
pub fn generate_trace_id() -> String {
    random_hex(TRACE_ID_LENGTH / 2)
}

/// Generate a new 64-bit span id.
pub fn generate_span_id() -> String {
    random_hex(SPAN_ID_LENGTH / 2)
}

/// Check that an id is non-empty lowercase/uppercase hex.
pub fn is_valid_id(id: &str) -> bool {
    !id.is_empty() && id.bytes().all(|b| b.is_ascii_hexdigit())
}
