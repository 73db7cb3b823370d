//! Resolve a node's service-account identity from its configuration.

use gcn_protocol::{Identity, IdentitySource, ServiceAccountKey};

use crate::config::IdentityConfig;
use crate::error::{ConnectorError, ConnectorResult};
use crate::host::CredentialStore;

/// Resolve the identity a node authenticates as.
///
/// The credential reference is tried first. When it is unset, unknown to the
/// store or holds an unusable key, the key file is tried next. Failing both
/// is a configuration error naming the last reason.
pub fn resolve_identity(
    config: &IdentityConfig,
    credentials: &dyn CredentialStore,
) -> ConnectorResult<Identity> {
    let mut reason = None;

    if let Some(reference) = config.account.as_deref().filter(|r| !r.is_empty()) {
        match credentials.account(reference).map(|json| ServiceAccountKey::from_json(&json)) {
            Some(Ok(key)) => {
                return Ok(Identity {
                    source: IdentitySource::Account(reference.to_string()),
                    key,
                });
            }
            Some(Err(e)) => {
                tracing::warn!(account = reference, error = %e, "stored credential unusable");
                reason = Some(format!("credential '{reference}': {e}"));
            }
            None => {
                tracing::warn!(account = reference, "credential reference not found");
                reason = Some(format!("credential '{reference}' not found"));
            }
        }
    }

    if let Some(path) = config
        .key_filename
        .as_deref()
        .filter(|p| !p.as_os_str().is_empty())
    {
        match ServiceAccountKey::from_file(path) {
            Ok(key) => {
                return Ok(Identity {
                    source: IdentitySource::KeyFile(path.to_path_buf()),
                    key,
                });
            }
            Err(e) => reason = Some(e.to_string()),
        }
    }

    Err(ConnectorError::Config(
        reason.unwrap_or_else(|| "missing credentials or key filename".to_string()),
    ))
}
