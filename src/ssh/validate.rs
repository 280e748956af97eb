// ABOUTME: Credential probe that connects, authenticates and disconnects.
// ABOUTME: Refused credentials are a `false` answer; transport failures are errors.

use super::client::{Session, SessionConfig};
use super::error::Result;

/// Check whether `config` can open a session, without keeping one.
///
/// Returns `Ok(false)` when the server refuses the credentials or host key,
/// or the key material cannot be used. Empty host/username and network or
/// protocol failures are returned as errors so callers can tell them apart.
pub async fn is_valid_connection(config: &SessionConfig) -> Result<bool> {
    config.validate()?;

    let mut session = Session::new(config.clone());
    match session.open().await {
        Ok(()) => {
            if let Err(e) = session.close().await {
                tracing::debug!(error = %e, "disconnect after successful probe failed");
            }
            Ok(true)
        }
        Err(e) if e.is_authentication() => {
            tracing::debug!(host = %config.host, error = %e, "credentials rejected");
            Ok(false)
        }
        Err(e) => Err(e),
    }
}

impl Session {
    /// See [`is_valid_connection`].
    pub async fn is_valid_connection(config: &SessionConfig) -> Result<bool> {
        is_valid_connection(config).await
    }
}
