use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum UserRole {
    GlobalAdmin,
    CountryAdmin,
    StateAdmin,
    LocalAdmin,
    SchoolAdmin,
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            UserRole::GlobalAdmin => "global-admin",
            UserRole::CountryAdmin => "country-admin",
            UserRole::StateAdmin => "state-admin",
            UserRole::LocalAdmin => "local-admin",
            UserRole::SchoolAdmin => "school-admin",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for UserRole {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "global-admin" => Ok(UserRole::GlobalAdmin),
            "country-admin" => Ok(UserRole::CountryAdmin),
            "state-admin" => Ok(UserRole::StateAdmin),
            "local-admin" => Ok(UserRole::LocalAdmin),
            "school-admin" => Ok(UserRole::SchoolAdmin),
            _ => Err(anyhow::anyhow!("Unknown role: {s}")),
        }
    }
}

/// DB row struct — role is stored as TEXT (values match the serde names).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub full_name: String,
    pub role: String,
    /// Jurisdiction for country/state/local admins; NULL for global and school admins.
    pub country: Option<String>,
    pub state: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RefreshToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct InvitationToken {
    pub id: Uuid,
    pub email: String,
    pub token: String,
    pub role: String,
    pub country: Option<String>,
    pub state: Option<String>,
    pub invited_by: Option<Uuid>,
    pub used: bool,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

// Request/Response DTOs
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub user: UserProfile,
}

#[derive(Debug, Serialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub email: String,
    pub full_name: String,
    pub role: UserRole,
    pub country: Option<String>,
    pub state: Option<String>,
}

impl From<User> for UserProfile {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            email: u.email,
            full_name: u.full_name,
            role: u.role.parse().unwrap_or(UserRole::SchoolAdmin),
            country: u.country,
            state: u.state,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct InviteUserRequest {
    pub email: String,
    pub role: UserRole,
    pub country: Option<String>,
    pub state: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RegisterFromInviteRequest {
    pub token: String,
    pub full_name: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshTokenRequest {
    pub refresh_token: String,
}

#[derive(Debug, Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

/// DTO for listing pending invitations.
#[derive(Debug, Clone, Serialize)]
pub struct PendingInvitationDto {
    pub id: Uuid,
    pub email: String,
    pub role: UserRole,
    pub country: Option<String>,
    pub state: Option<String>,
    pub invited_by_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}
