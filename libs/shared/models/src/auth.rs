use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

#[derive(Debug, Serialize, Deserialize)]
pub struct JwtHeader {
    pub alg: String,
    pub typ: String,
}

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

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: Option<String>,
    pub role: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: Option<DateTime<Utc>>,
}

impl User {
    pub fn display_name(&self) -> Option<String> {
        self.metadata
            .as_ref()
            .and_then(|m| m.get("full_name"))
            .and_then(|v| v.as_str())
            .map(str::to_string)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Patient,
    Doctor,
    Admin,
}

impl Role {
    pub fn from_claim(role: Option<&str>) -> Self {
        match role {
            Some("admin") => Role::Admin,
            Some("doctor") => Role::Doctor,
            _ => Role::Patient,
        }
    }
}

/// The authenticated identity every booking operation is evaluated against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub user_id: Uuid,
    pub role: Role,
    pub doctor_id: Option<Uuid>,
}

impl Caller {
    pub fn patient(user_id: Uuid) -> Self {
        Self { user_id, role: Role::Patient, doctor_id: None }
    }

    pub fn doctor(user_id: Uuid, doctor_id: Uuid) -> Self {
        Self { user_id, role: Role::Doctor, doctor_id: Some(doctor_id) }
    }

    pub fn admin(user_id: Uuid) -> Self {
        Self { user_id, role: Role::Admin, doctor_id: None }
    }

    pub fn from_user(user: &User) -> Result<Self, AppError> {
        let user_id = Uuid::parse_str(&user.id)
            .map_err(|_| AppError::Auth("Token subject is not a valid user id".to_string()))?;
        let role = Role::from_claim(user.role.as_deref());

        let doctor_id = match role {
            Role::Doctor => Some(
                user.metadata
                    .as_ref()
                    .and_then(|m| m.get("doctor_id"))
                    .and_then(|v| v.as_str())
                    .and_then(|s| Uuid::parse_str(s).ok())
                    .unwrap_or(user_id),
            ),
            _ => None,
        };

        Ok(Self { user_id, role, doctor_id })
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// True when the caller is the doctor running the given queue.
    pub fn is_doctor_for(&self, doctor_id: Uuid) -> bool {
        self.role == Role::Doctor && self.doctor_id == Some(doctor_id)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub valid: bool,
    pub user_id: String,
    pub email: Option<String>,
    pub role: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn user(role: &str, metadata: Option<serde_json::Value>) -> User {
        User {
            id: Uuid::new_v4().to_string(),
            email: None,
            role: Some(role.to_string()),
            metadata,
            created_at: None,
        }
    }

    #[test]
    fn doctor_id_comes_from_metadata_when_present() {
        let doctor_id = Uuid::new_v4();
        let caller = Caller::from_user(&user("doctor", Some(json!({ "doctor_id": doctor_id })))).unwrap();
        assert_eq!(caller.role, Role::Doctor);
        assert!(caller.is_doctor_for(doctor_id));
    }

    #[test]
    fn unknown_roles_are_patients() {
        let caller = Caller::from_user(&user("authenticated", None)).unwrap();
        assert_eq!(caller.role, Role::Patient);
        assert_eq!(caller.doctor_id, None);
    }

    #[test]
    fn non_uuid_subject_is_rejected() {
        let mut u = user("patient", None);
        u.id = "not-a-uuid".to_string();
        assert!(Caller::from_user(&u).is_err());
    }
}
