//! Bearer credential handling for the realtime connection.

use secrecy::{ExposeSecret as _, SecretString};

/// Opaque bearer token attached to the connection at handshake time.
///
/// The token is sent both as a `token` query parameter and as an
/// `Authorization: Bearer <token>` header, matching what the realtime
/// gateway accepts. It is wrapped in [`SecretString`] so it never appears
/// in `Debug` output or log lines.
#[derive(Clone, Debug)]
pub struct BearerToken(SecretString);

impl BearerToken {
    #[must_use]
    pub fn new<S: Into<String>>(token: S) -> Self {
        Self(SecretString::from(token.into()))
    }

    /// Reveal the token for building the connection request.
    ///
    /// Callers must not log or persist the returned value.
    #[must_use]
    pub(crate) fn expose(&self) -> &str {
        self.0.expose_secret()
    }

    /// Whether the token is non-empty. An empty token is treated the same
    /// as an absent one by the client.
    #[must_use]
    pub fn is_usable(&self) -> bool {
        !self.0.expose_secret().is_empty()
    }
}

impl From<String> for BearerToken {
    fn from(token: String) -> Self {
        Self::new(token)
    }
}

impl From<&str> for BearerToken {
    fn from(token: &str) -> Self {
        Self::new(token)
    }
}
