//! Reserved actor names.
//!
//! Names starting with `$` are owned by the runtime; supervisors reject
//! `create_child` hints that use the prefix.

// Layer 1: Standard library imports
// (none)

// Layer 2: Third-party crate imports
// (none)

// Layer 3: Internal module imports
// (none)

/// Root supervisor created at node bootstrap.
pub const ROOT_SUPERVISOR: &str = "$root";

/// Process-wide request correlator.
pub const CORRELATOR: &str = "$correlator";

/// Federation gateway inbox (outbound envelope queue).
pub const FEDERATION_GATEWAY: &str = "$federation";

/// Federation service registry (main relays only).
pub const REGISTRY: &str = "$registry";

/// Synthetic origin for envelopes created by the HTTP gateway.
pub const HTTP_GATEWAY: &str = "$http";

/// Synthetic origin for envelopes created by the WS gateway.
pub const WS_GATEWAY: &str = "$ws";

/// Synthetic origin for error envelopes created by the router itself.
pub const ROUTER: &str = "$router";

/// Prefix reserved for runtime-owned actors.
pub const RESERVED_PREFIX: char = '$';

/// True when `name` is reserved for runtime use.
pub fn is_reserved(name: &str) -> bool {
    name.starts_with(RESERVED_PREFIX)
}
