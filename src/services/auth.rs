use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    models::{
        auth::{Claims, RefreshClaims},
        user::{InvitationToken, LoginResponse, PendingInvitationDto, RefreshToken, User, UserProfile, UserRole},
    },
    services::email::EmailService,
};

const USER_COLS: &str =
    "id, email, password_hash, full_name, role, country, state, is_active, created_at, updated_at";

fn random_token(len: usize) -> String {
    use rand::Rng;
    rand::thread_rng()
        .sample_iter(&rand::distributions::Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

pub struct AuthService;

impl AuthService {
    /// Validate credentials and issue an access/refresh token pair.
    pub async fn login(
        pool: &PgPool,
        email: &str,
        password: &str,
        jwt_secret: &str,
        refresh_secret: &str,
        access_ttl: u64,
        refresh_ttl_days: u64,
    ) -> anyhow::Result<LoginResponse> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLS} FROM users WHERE email = $1 AND is_active = TRUE"
        ))
        .bind(email)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| anyhow::anyhow!("Invalid credentials"))?;

        let valid = bcrypt::verify(password, &user.password_hash)
            .map_err(|_| anyhow::anyhow!("Invalid credentials"))?;
        if !valid {
            anyhow::bail!("Invalid credentials");
        }

        Self::issue_tokens(pool, user, jwt_secret, refresh_secret, access_ttl, refresh_ttl_days)
            .await
    }

    async fn issue_tokens(
        pool: &PgPool,
        user: User,
        jwt_secret: &str,
        refresh_secret: &str,
        access_ttl: u64,
        refresh_ttl_days: u64,
    ) -> anyhow::Result<LoginResponse> {
        let access_token = Self::generate_access_token(&user, jwt_secret, access_ttl)?;
        let (refresh_token_str, refresh_id) =
            Self::generate_refresh_token(&user.id, refresh_secret, refresh_ttl_days)?;

        let hash = bcrypt::hash(&refresh_token_str, 8)?;
        let expires_at = Utc::now() + chrono::Duration::days(refresh_ttl_days as i64);
        sqlx::query(
            "INSERT INTO refresh_tokens (id, user_id, token_hash, expires_at)
             VALUES ($1, $2, $3, $4)",
        )
        .bind(refresh_id)
        .bind(user.id)
        .bind(hash)
        .bind(expires_at)
        .execute(pool)
        .await?;

        Ok(LoginResponse {
            access_token,
            refresh_token: refresh_token_str,
            user: user.into(),
        })
    }

    pub fn generate_access_token(
        user: &User,
        secret: &str,
        ttl_seconds: u64,
    ) -> anyhow::Result<String> {
        let role: UserRole = user.role.parse().unwrap_or(UserRole::SchoolAdmin);
        let now = Utc::now().timestamp() as usize;
        let claims = Claims {
            sub: user.id.to_string(),
            role,
            country: user.country.clone(),
            state: user.state.clone(),
            iat: now,
            exp: now + ttl_seconds as usize,
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )?;
        Ok(token)
    }

    fn generate_refresh_token(
        user_id: &Uuid,
        secret: &str,
        ttl_days: u64,
    ) -> anyhow::Result<(String, Uuid)> {
        let now = Utc::now().timestamp() as usize;
        let jti = Uuid::new_v4();
        let claims = RefreshClaims {
            sub: user_id.to_string(),
            jti: jti.to_string(),
            iat: now,
            exp: now + (ttl_days * 86400) as usize,
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )?;
        Ok((token, jti))
    }

    /// Rotate refresh token: revoke old, issue new pair.
    pub async fn refresh(
        pool: &PgPool,
        refresh_token_str: &str,
        jwt_secret: &str,
        refresh_secret: &str,
        access_ttl: u64,
        refresh_ttl_days: u64,
    ) -> anyhow::Result<LoginResponse> {
        use jsonwebtoken::{decode, DecodingKey, Validation};

        let key = DecodingKey::from_secret(refresh_secret.as_bytes());
        let data = decode::<RefreshClaims>(
            refresh_token_str,
            &key,
            &Validation::new(Algorithm::HS256),
        )?;
        let rc = data.claims;
        let jti: Uuid = rc.jti.parse()?;
        let user_id: Uuid = rc.sub.parse()?;

        let stored: RefreshToken = sqlx::query_as(
            "SELECT * FROM refresh_tokens WHERE id = $1 AND revoked = FALSE",
        )
        .bind(jti)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| anyhow::anyhow!("Refresh token not found or revoked"))?;

        if stored.expires_at < Utc::now() {
            anyhow::bail!("Refresh token expired");
        }
        if !bcrypt::verify(refresh_token_str, &stored.token_hash)? {
            anyhow::bail!("Refresh token invalid");
        }

        sqlx::query("UPDATE refresh_tokens SET revoked = TRUE WHERE id = $1")
            .bind(jti)
            .execute(pool)
            .await?;

        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLS} FROM users WHERE id = $1 AND is_active = TRUE"
        ))
        .bind(user_id)
        .fetch_one(pool)
        .await?;

        Self::issue_tokens(pool, user, jwt_secret, refresh_secret, access_ttl, refresh_ttl_days)
            .await
    }

    /// Revoke a refresh token (logout).
    pub async fn logout(
        pool: &PgPool,
        refresh_token_str: &str,
        refresh_secret: &str,
    ) -> anyhow::Result<()> {
        use jsonwebtoken::{decode, DecodingKey, Validation};

        let key = DecodingKey::from_secret(refresh_secret.as_bytes());
        let data =
            decode::<RefreshClaims>(refresh_token_str, &key, &Validation::new(Algorithm::HS256));

        if let Ok(data) = data {
            let jti: Uuid = data.claims.jti.parse()?;
            sqlx::query("UPDATE refresh_tokens SET revoked = TRUE WHERE id = $1")
                .bind(jti)
                .execute(pool)
                .await?;
        }

        Ok(())
    }

    /// Issue a password reset token and send the email. Always returns Ok
    /// on unknown addresses to avoid leaking account existence.
    pub async fn request_password_reset(
        pool: &PgPool,
        email_svc: Option<&EmailService>,
        email: &str,
        base_url: &str,
    ) -> anyhow::Result<()> {
        let user_opt: Option<(Uuid, String)> = sqlx::query_as(
            "SELECT id, full_name FROM users WHERE email = $1 AND is_active = TRUE",
        )
        .bind(email)
        .fetch_optional(pool)
        .await?;

        if let Some((user_id, full_name)) = user_opt {
            let token = random_token(48);
            let expires_at = Utc::now() + chrono::Duration::hours(1);

            sqlx::query(
                "INSERT INTO password_reset_tokens (user_id, token, expires_at)
                 VALUES ($1, $2, $3)",
            )
            .bind(user_id)
            .bind(&token)
            .bind(expires_at)
            .execute(pool)
            .await?;

            if let Some(svc) = email_svc {
                let reset_url = format!("{base_url}/reset-password?token={token}");
                // Ignore send errors — graceful degradation
                let _ = svc.send_password_reset(email, &full_name, &reset_url).await;
            }
        }

        Ok(())
    }

    /// Verify the reset token, store the new hash, revoke all refresh
    /// tokens, mark the token used.
    pub async fn reset_password(
        pool: &PgPool,
        token_str: &str,
        new_password: &str,
    ) -> anyhow::Result<()> {
        if new_password.len() < 8 {
            anyhow::bail!("Password must be at least 8 characters");
        }

        let row: Option<(Uuid, Uuid)> = sqlx::query_as(
            "SELECT id, user_id FROM password_reset_tokens
             WHERE token = $1 AND used = FALSE AND expires_at > NOW()",
        )
        .bind(token_str)
        .fetch_optional(pool)
        .await?;

        let (token_id, user_id) =
            row.ok_or_else(|| anyhow::anyhow!("Invalid or expired reset token"))?;

        let password_hash = bcrypt::hash(new_password, 12)?;
        sqlx::query("UPDATE users SET password_hash = $1, updated_at = NOW() WHERE id = $2")
            .bind(&password_hash)
            .bind(user_id)
            .execute(pool)
            .await?;

        sqlx::query("UPDATE refresh_tokens SET revoked = TRUE WHERE user_id = $1")
            .bind(user_id)
            .execute(pool)
            .await?;

        sqlx::query("UPDATE password_reset_tokens SET used = TRUE WHERE id = $1")
            .bind(token_id)
            .execute(pool)
            .await?;

        Ok(())
    }

    /// Open self-serve signup for school admins — the role that files KYS
    /// applications. Admin roles are created by invitation only.
    pub async fn register_school_admin(
        pool: &PgPool,
        email: &str,
        full_name: &str,
        password: &str,
    ) -> anyhow::Result<UserProfile> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE email = $1)")
                .bind(email)
                .fetch_one(pool)
                .await?;
        if exists {
            anyhow::bail!("An account with this email already exists");
        }

        let password_hash = bcrypt::hash(password, 12)?;
        let user: User = sqlx::query_as(&format!(
            "INSERT INTO users (email, password_hash, full_name, role)
             VALUES ($1, $2, $3, 'school-admin')
             RETURNING {USER_COLS}"
        ))
        .bind(email)
        .bind(password_hash)
        .bind(full_name)
        .fetch_one(pool)
        .await?;

        Ok(user.into())
    }

    /// Create an invitation token for an admin role and send the email.
    pub async fn create_invitation(
        pool: &PgPool,
        email_svc: Option<&EmailService>,
        email: &str,
        role: UserRole,
        country: Option<&str>,
        state: Option<&str>,
        invited_by: Option<Uuid>,
        base_url: &str,
    ) -> anyhow::Result<()> {
        // Jurisdiction requirements per role
        match role {
            UserRole::CountryAdmin if country.is_none() => {
                anyhow::bail!("country-admin invitations require a country")
            }
            UserRole::StateAdmin | UserRole::LocalAdmin
                if country.is_none() || state.is_none() =>
            {
                anyhow::bail!("{role} invitations require a country and a state")
            }
            _ => {}
        }

        let email_svc = email_svc
            .ok_or_else(|| anyhow::anyhow!("Email service not configured (SMTP required for invitations)"))?;

        let token = random_token(48);
        let expires_at = Utc::now() + chrono::Duration::days(7);

        sqlx::query(
            "INSERT INTO invitation_tokens (email, token, role, country, state, invited_by, expires_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(email)
        .bind(&token)
        .bind(role.to_string())
        .bind(country)
        .bind(state)
        .bind(invited_by)
        .bind(expires_at)
        .execute(pool)
        .await?;

        let invite_url = format!("{base_url}/register?token={token}");
        email_svc
            .send_invitation(email, &invite_url, &role.to_string())
            .await
            .map_err(|e| anyhow::anyhow!("Could not send invitation: {e}"))?;

        Ok(())
    }

    /// Register a user from an invitation token.
    pub async fn register_from_invite(
        pool: &PgPool,
        token_str: &str,
        full_name: &str,
        password: &str,
    ) -> anyhow::Result<UserProfile> {
        let invite: InvitationToken = sqlx::query_as(
            "SELECT id, email, token, role, country, state, invited_by, used, expires_at, created_at
             FROM invitation_tokens WHERE token = $1 AND used = FALSE",
        )
        .bind(token_str)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| anyhow::anyhow!("Invalid or already-used invitation token"))?;

        if invite.expires_at < Utc::now() {
            anyhow::bail!("Invitation token expired");
        }

        let password_hash = bcrypt::hash(password, 12)?;

        let user: User = sqlx::query_as(&format!(
            "INSERT INTO users (email, password_hash, full_name, role, country, state)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING {USER_COLS}"
        ))
        .bind(&invite.email)
        .bind(password_hash)
        .bind(full_name)
        .bind(&invite.role)
        .bind(&invite.country)
        .bind(&invite.state)
        .fetch_one(pool)
        .await?;

        sqlx::query("UPDATE invitation_tokens SET used = TRUE WHERE id = $1")
            .bind(invite.id)
            .execute(pool)
            .await?;

        Ok(user.into())
    }

    pub async fn list_pending_invitations(
        pool: &PgPool,
    ) -> anyhow::Result<Vec<PendingInvitationDto>> {
        let rows: Vec<(Uuid, String, String, Option<String>, Option<String>, Option<String>, chrono::DateTime<Utc>, chrono::DateTime<Utc>)> =
            sqlx::query_as(
                "SELECT i.id, i.email, i.role, i.country, i.state, u.full_name,
                        i.created_at, i.expires_at
                 FROM invitation_tokens i
                 LEFT JOIN users u ON u.id = i.invited_by
                 WHERE i.used = FALSE AND i.expires_at > NOW()
                 ORDER BY i.created_at DESC",
            )
            .fetch_all(pool)
            .await?;

        Ok(rows
            .into_iter()
            .map(|(id, email, role, country, state, invited_by_name, created_at, expires_at)| {
                PendingInvitationDto {
                    id,
                    email,
                    role: role.parse().unwrap_or(UserRole::SchoolAdmin),
                    country,
                    state,
                    invited_by_name,
                    created_at,
                    expires_at,
                }
            })
            .collect())
    }

    pub async fn delete_invitation(pool: &PgPool, id: Uuid) -> anyhow::Result<bool> {
        let res = sqlx::query("DELETE FROM invitation_tokens WHERE id = $1 AND used = FALSE")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    /// Verify the current password, store the new hash, revoke all sessions.
    pub async fn change_password(
        pool: &PgPool,
        user_id: Uuid,
        current_password: &str,
        new_password: &str,
    ) -> anyhow::Result<()> {
        if new_password.len() < 8 {
            anyhow::bail!("Password must be at least 8 characters");
        }

        let stored: String =
            sqlx::query_scalar("SELECT password_hash FROM users WHERE id = $1 AND is_active = TRUE")
                .bind(user_id)
                .fetch_optional(pool)
                .await?
                .ok_or_else(|| anyhow::anyhow!("User not found"))?;

        if !bcrypt::verify(current_password, &stored)? {
            anyhow::bail!("Current password is incorrect");
        }

        let hash = bcrypt::hash(new_password, 12)?;
        sqlx::query("UPDATE users SET password_hash = $1, updated_at = NOW() WHERE id = $2")
            .bind(&hash)
            .bind(user_id)
            .execute(pool)
            .await?;

        sqlx::query("UPDATE refresh_tokens SET revoked = TRUE WHERE user_id = $1")
            .bind(user_id)
            .execute(pool)
            .await?;

        Ok(())
    }

    /// Display name used to stamp `reviewed_by` on stage decisions.
    pub async fn display_name(pool: &PgPool, user_id: Uuid) -> anyhow::Result<String> {
        let name: Option<String> =
            sqlx::query_scalar("SELECT full_name FROM users WHERE id = $1")
                .bind(user_id)
                .fetch_optional(pool)
                .await?;
        Ok(name.unwrap_or_else(|| user_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::auth::decode_access_token;
    use chrono::Utc;

    fn test_user(role: &str) -> User {
        User {
            id: Uuid::new_v4(),
            email: "admin@almurattal.org".into(),
            password_hash: String::new(),
            full_name: "Test Admin".into(),
            role: role.into(),
            country: Some("Nigeria".into()),
            state: Some("Lagos".into()),
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn access_token_round_trips_role_and_jurisdiction() {
        let user = test_user("state-admin");
        let token = AuthService::generate_access_token(&user, "test-secret", 900).unwrap();

        let decoded = decode_access_token(&token, "test-secret").unwrap();
        assert_eq!(decoded.user_id, user.id);
        assert_eq!(decoded.role, UserRole::StateAdmin);
        assert_eq!(decoded.country.as_deref(), Some("Nigeria"));
        assert_eq!(decoded.state.as_deref(), Some("Lagos"));
    }

    #[test]
    fn reset_and_invitation_tokens_are_long_alphanumeric_and_unique() {
        let a = random_token(48);
        let b = random_token(48);
        assert_eq!(a.len(), 48);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a, b);
    }

    #[test]
    fn access_token_rejects_wrong_secret() {
        let user = test_user("global-admin");
        let token = AuthService::generate_access_token(&user, "test-secret", 900).unwrap();
        assert!(decode_access_token(&token, "other-secret").is_err());
    }
}
