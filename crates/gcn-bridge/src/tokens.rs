//! Access tokens for the REST clients.

use std::sync::Arc;

use gcn_protocol::{AuthResult, Identity, ServiceAccountToken, StaticToken, TokenSource};

/// How nodes authenticate their requests.
#[derive(Debug, Clone)]
pub enum Tokens {
    /// One pre-minted token shared by every node (emulators, local testing).
    Static(Arc<StaticToken>),
    /// Each node mints tokens from its own service-account key.
    ServiceAccount,
}

impl Tokens {
    /// A static token when `token_env` names a variable, service accounts otherwise.
    pub fn from_env(token_env: Option<&str>) -> AuthResult<Self> {
        match token_env {
            Some(var) => Ok(Tokens::Static(Arc::new(StaticToken::from_env(var)?))),
            None => Ok(Tokens::ServiceAccount),
        }
    }

    /// Token source for a node that resolved `identity`.
    pub fn for_identity(&self, identity: &Identity) -> AuthResult<Arc<dyn TokenSource>> {
        match self {
            Tokens::Static(token) => Ok(token.clone()),
            Tokens::ServiceAccount => {
                let tokens = ServiceAccountToken::new(identity)?;
                tracing::debug!(account = identity.client_email(), "using service-account tokens");
                Ok(Arc::new(tokens))
            }
        }
    }
}
