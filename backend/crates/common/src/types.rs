use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity of a running service process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub name: String,
    pub version: String,
    pub instance_id: Uuid,
}

impl ServiceInfo {
    /// `version` is the crate version of hubsync-common, which moves in
    /// lockstep with the workspace.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            version: env!("CARGO_PKG_VERSION").to_owned(),
            instance_id: Uuid::new_v4(),
        }
    }
}
