use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Supervisor,
    Volunteer,
    Kiosk,
}

impl Role {
    /// Whether this role may force a pickup override.
    pub fn can_override(self) -> bool {
        matches!(self, Role::Admin | Role::Supervisor)
    }
}
