use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct JwtClaims {
    pub sub: String,
    pub exp: Option<u64>,
    pub email: Option<String>,
    pub role: Option<String>,
    pub app_metadata: Option<serde_json::Value>,
    pub user_metadata: Option<serde_json::Value>,
    pub aud: Option<String>,
    pub iat: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: Option<String>,
    pub role: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: Option<DateTime<Utc>>,
}

/// Who is attempting an operation. `System` is only ever constructed in-process
/// (the temporal reconciler), never from a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorRole {
    Doctor,
    Patient,
    Lab,
    Admin,
    System,
}

impl fmt::Display for ActorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActorRole::Doctor => write!(f, "doctor"),
            ActorRole::Patient => write!(f, "patient"),
            ActorRole::Lab => write!(f, "lab"),
            ActorRole::Admin => write!(f, "admin"),
            ActorRole::System => write!(f, "system"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub id: String,
    pub role: ActorRole,
}

impl Actor {
    pub fn system() -> Self {
        Self {
            id: "system".to_string(),
            role: ActorRole::System,
        }
    }

    pub fn is(&self, role: ActorRole) -> bool {
        self.role == role
    }

    /// True when the actor is the entity identified by `id`.
    pub fn owns(&self, id: impl fmt::Display) -> bool {
        self.id == id.to_string()
    }
}

impl From<&User> for Actor {
    fn from(user: &User) -> Self {
        // Tokens without a recognised application role are treated as patients,
        // the least privileged party that can still book.
        let role = match user.role.as_deref().map(str::to_ascii_lowercase).as_deref() {
            Some("doctor") => ActorRole::Doctor,
            Some("lab") => ActorRole::Lab,
            Some("admin") => ActorRole::Admin,
            _ => ActorRole::Patient,
        };

        Self {
            id: user.id.clone(),
            role,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(role: Option<&str>) -> User {
        User {
            id: "8f1c3a52-0000-4000-8000-000000000001".to_string(),
            email: None,
            role: role.map(str::to_string),
            metadata: None,
            created_at: None,
        }
    }

    #[test]
    fn actor_role_follows_token_role() {
        assert_eq!(Actor::from(&user(Some("doctor"))).role, ActorRole::Doctor);
        assert_eq!(Actor::from(&user(Some("LAB"))).role, ActorRole::Lab);
        assert_eq!(Actor::from(&user(Some("admin"))).role, ActorRole::Admin);
        assert_eq!(Actor::from(&user(Some("authenticated"))).role, ActorRole::Patient);
        assert_eq!(Actor::from(&user(None)).role, ActorRole::Patient);
    }

    #[test]
    fn system_role_is_never_derived_from_a_token() {
        assert_eq!(Actor::from(&user(Some("system"))).role, ActorRole::Patient);
        assert!(Actor::system().is(ActorRole::System));
    }
}
