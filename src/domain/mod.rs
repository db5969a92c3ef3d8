//! Usage: Domain types shared across gateway and infra (credential record, identity).

pub(crate) mod credentials;
