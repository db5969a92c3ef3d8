//! Usage: Process-level wiring (logging, the credential session).

pub(crate) mod logging;
pub(crate) mod session;
