//! Client identity resolution from proxy headers.

use std::collections::HashMap;

/// Header candidates checked for the client IP, in priority order.
const IP_HEADER_CANDIDATES: [&str; 5] = [
    "client-ip",
    "x-forwarded-for",
    "x-forwarded",
    "forwarded-for",
    "forwarded",
];

/// Fallback identity when neither headers nor the transport supply one.
pub const UNKNOWN_IP: &str = "UNKNOWN";

/// Derive the caller's IP address from request headers, falling back to the
/// transport-level remote address.
///
/// Header names are matched case-insensitively and the first non-empty value
/// wins. Any caller-controlled header is trusted as-is: a client behind no
/// proxy can spoof its identity by setting one of the candidate headers.
/// That is a property of the original design, kept intentionally; deploy
/// behind a proxy that strips inbound copies of these headers.
pub fn resolve(headers: &HashMap<String, String>, remote_addr: Option<&str>) -> String {
    let lowered: HashMap<String, &str> = headers
        .iter()
        .map(|(k, v)| (k.to_ascii_lowercase(), v.as_str()))
        .collect();

    for candidate in IP_HEADER_CANDIDATES {
        if let Some(value) = lowered.get(candidate) {
            if !value.is_empty() {
                return value.to_string();
            }
        }
    }

    match remote_addr {
        Some(addr) if !addr.is_empty() => addr.to_string(),
        _ => UNKNOWN_IP.to_string(),
    }
}
