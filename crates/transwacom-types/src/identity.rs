//! Machine identity.

use serde::{Deserialize, Serialize};

/// Stable identity of this installation.
///
/// `machine_id` is a 16-hex-char fingerprint derived from the hostname
/// plus a persistent machine-scoped identifier; it must survive restarts
/// because trust registries key on it. Created once at startup and never
/// mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineIdentity {
    pub machine_id: String,
    pub machine_name: String,
}

impl std::fmt::Display for MachineIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.machine_name, self.machine_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_both_parts() {
        let id = MachineIdentity {
            machine_id: "a1b2c3d4e5f60718".to_string(),
            machine_name: "alpha".to_string(),
        };
        assert_eq!(id.to_string(), "alpha (a1b2c3d4e5f60718)");
    }
}
