use serde::{Deserialize, Serialize};
use std::fmt;

/// Which side of the handshake this participant committed to.
///
/// A participant without a role is represented as `Option<Role>::None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Generated the offer
    Host,
    /// Answered the offer
    Guest,
}

impl Role {
    /// Pick the value this role owns out of a (host, guest) pair.
    pub fn pick<'a, T: ?Sized>(&self, host_value: &'a T, guest_value: &'a T) -> &'a T {
        match self {
            Role::Host => host_value,
            Role::Guest => guest_value,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Host => write!(f, "host"),
            Role::Guest => write!(f, "guest"),
        }
    }
}

/// Turn ownership shared by every game: true iff the current turn value is the
/// one owned by `role`. Always false while no role is assigned.
pub fn is_my_turn<T: PartialEq + ?Sized>(
    role: Option<Role>,
    current: &T,
    host_value: &T,
    guest_value: &T,
) -> bool {
    match role {
        Some(role) => current == role.pick(host_value, guest_value),
        None => false,
    }
}
