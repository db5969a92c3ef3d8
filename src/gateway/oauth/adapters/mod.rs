//! Usage: Concrete `OAuthProvider` implementations.

pub(crate) mod x;
