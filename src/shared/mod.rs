//! Usage: Cross-cutting helpers with no domain knowledge.

pub(crate) mod blocking;
pub(crate) mod error;
pub(crate) mod mutex_ext;
pub(crate) mod security;
pub(crate) mod single_flight;
pub(crate) mod time;
