//! Write permission gate for mutating endpoints.

use tracing::debug;

use super::evaluator::{FlagClient, FlagContext, FlagOutcome};

/// Decides whether a client may create, update or delete flavors.
#[derive(Clone)]
pub struct WriteGate {
    flags: FlagClient,
    flag_key: String,
}

impl WriteGate {
    pub fn new(flags: FlagClient, flag_key: impl Into<String>) -> Self {
        Self {
            flags,
            flag_key: flag_key.into(),
        }
    }

    /// Whether `client_address` holds write permission.
    ///
    /// The flag is evaluated with the client address as targeting key. Only an
    /// explicitly served `true` grants access.
    pub async fn is_write_allowed(&self, client_address: &str) -> bool {
        let context = FlagContext::new(client_address, client_address);
        match self.flags.bool_variation(&self.flag_key, &context).await {
            FlagOutcome::Served(allowed) => allowed,
            FlagOutcome::Unavailable => {
                debug!(client = %client_address, "Write permission unavailable, denying");
                false
            }
        }
    }
}
