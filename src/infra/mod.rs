//! Usage: Environment configuration and encrypted on-disk persistence.

pub(crate) mod cipher;
pub(crate) mod config;
pub(crate) mod token_store;
