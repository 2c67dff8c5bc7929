//! JSON bodies of the authentication and user endpoints.
//!
//! | Endpoint | Request | Response |
//! |---|---|---|
//! | `POST /api/auth/token/` | [`Credentials`] | [`TokenPair`] |
//! | `POST /api/auth/token/refresh/` | [`RefreshRequest`] | [`RefreshResponse`] |
//! | `POST /api/auth/register/` | [`Registration`] | (created user, ignored) |
//! | `GET /api/users/me/` | (none) | [`UserProfile`] |

use std::fmt;

use serde::{Deserialize, Serialize};

/// Sign-in credentials. The API identifies users by e-mail address.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

/// Hand-written so passwords never end up in logs.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Both tokens, as issued by the token endpoint on sign-in.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

impl fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenPair")
            .field("access", &"<redacted>")
            .field("refresh", &"<redacted>")
            .finish()
    }
}

/// Body of the refresh call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshRequest {
    pub refresh: String,
}

/// Body returned by the refresh endpoint.
///
/// Both fields are optional on the wire: a response without `access` is
/// a failed refresh, and `refresh` is only present when the backend
/// rotates refresh tokens.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RefreshResponse {
    #[serde(default)]
    pub access: Option<String>,
    #[serde(default)]
    pub refresh: Option<String>,
}

/// Self-registration payload. New accounts are always students.
#[derive(Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Registration {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub student_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    /// Date of birth, `YYYY-MM-DD`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dob: Option<String>,
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .field("first_name", &self.first_name)
            .field("last_name", &self.last_name)
            .field("student_id", &self.student_id)
            .finish_non_exhaustive()
    }
}

/// Account role. Admins get the management console; sponsors fund
/// scholarships.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Student,
    Admin,
    Sponsor,
}

/// The signed-in user, as returned by `GET /api/users/me/`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: u64,
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub student_id: Option<String>,
    #[serde(default)]
    pub phone_number: String,
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub profile_image: Option<String>,
    #[serde(default)]
    pub department: String,
    #[serde(default)]
    pub dob: Option<String>,
    /// Month-to-date balance, serialized by the API as a decimal string.
    #[serde(default)]
    pub current_balance: Option<String>,
}

impl UserProfile {
    /// `true` if the user may open the admin console.
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// First name if set, otherwise the e-mail address.
    pub fn display_name(&self) -> &str {
        if self.first_name.is_empty() {
            &self.email
        } else {
            &self.first_name
        }
    }
}
