//! Usage: Tool-facing handlers; thin wrappers that shape session results into JSON payloads.

pub(crate) mod auth;
