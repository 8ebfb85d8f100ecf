use sqlx::PgPool;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    application::{
        ApplicationQuery, ApplicationStats, ApplicationStatus, CreateApplicationRequest,
        ReviewStage, SchoolApplication, SchoolSummary, UpdateApplicationRequest,
    },
    auth::AuthenticatedUser,
    user::UserRole,
};

/// Error taxonomy of the KYS pipeline. All variants are recoverable and
/// reported to the caller; routes map them onto HTTP status codes.
#[derive(Debug, Error)]
pub enum ApplicationError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    StageOrder(String),
    #[error("Application not found")]
    NotFound,
    #[error("Not authorized for this action")]
    Forbidden,
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

const APP_COLS: &str =
    "id, owner_id, school_name, location, country, state, principal_name, email, phone,
     established_year, student_count, teacher_count, curriculum, facilities,
     status, submitted_date,
     country_status, country_reviewed_by, country_review_date, country_comments,
     state_status, state_reviewed_by, state_review_date, state_comments,
     local_status, local_reviewed_by, local_review_date, local_comments,
     created_at, updated_at";

fn eq_ci(a: Option<&str>, b: Option<&str>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
        _ => false,
    }
}

/// Authorization matrix for stage decisions: country-admin decides the
/// country stage within their country, state-admin and local-admin their
/// stages within their country+state, global-admin decides anywhere.
pub fn can_decide(user: &AuthenticatedUser, stage: ReviewStage, app: &SchoolApplication) -> bool {
    if user.role == UserRole::GlobalAdmin {
        return true;
    }
    if user.role != stage.authorized_role() {
        return false;
    }
    let country_ok = eq_ci(user.country.as_deref(), app.country.as_deref());
    match stage {
        ReviewStage::Country => country_ok,
        ReviewStage::State | ReviewStage::Local => {
            country_ok && eq_ci(user.state.as_deref(), app.state.as_deref())
        }
    }
}

/// Overall statuses under which `stage` is the one awaiting a decision.
/// Imported `submitted` rows count as country-pending.
fn expected_statuses(stage: ReviewStage) -> Vec<String> {
    match stage {
        ReviewStage::Country => vec!["submitted".into(), "country-review".into()],
        other => vec![other.review_status().to_string()],
    }
}

pub struct ApplicationService;

impl ApplicationService {
    pub async fn create(
        pool: &PgPool,
        owner_id: Uuid,
        req: &CreateApplicationRequest,
    ) -> Result<SchoolApplication, ApplicationError> {
        if req.school_name.trim().is_empty() {
            return Err(ApplicationError::Validation(
                "school_name must not be empty".into(),
            ));
        }

        let app = sqlx::query_as::<_, SchoolApplication>(&format!(
            "INSERT INTO applications
                (owner_id, school_name, location, country, state, principal_name, email, phone,
                 established_year, student_count, teacher_count, curriculum, facilities, status)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, 'draft')
             RETURNING {APP_COLS}"
        ))
        .bind(owner_id)
        .bind(req.school_name.trim())
        .bind(&req.location)
        .bind(&req.country)
        .bind(&req.state)
        .bind(&req.principal_name)
        .bind(&req.email)
        .bind(&req.phone)
        .bind(&req.established_year)
        .bind(req.student_count)
        .bind(req.teacher_count)
        .bind(&req.curriculum)
        .bind(&req.facilities)
        .fetch_one(pool)
        .await?;

        Ok(app)
    }

    pub async fn get(pool: &PgPool, id: Uuid) -> Result<SchoolApplication, ApplicationError> {
        sqlx::query_as::<_, SchoolApplication>(&format!(
            "SELECT {APP_COLS} FROM applications WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(ApplicationError::NotFound)
    }

    /// Whether the viewer may read this application at all.
    /// School admins see their own; jurisdiction admins see their territory.
    pub fn can_view(user: &AuthenticatedUser, app: &SchoolApplication) -> bool {
        match user.role {
            UserRole::GlobalAdmin => true,
            UserRole::SchoolAdmin => app.owner_id == user.user_id,
            UserRole::CountryAdmin => eq_ci(user.country.as_deref(), app.country.as_deref()),
            UserRole::StateAdmin | UserRole::LocalAdmin => {
                eq_ci(user.country.as_deref(), app.country.as_deref())
                    && eq_ci(user.state.as_deref(), app.state.as_deref())
            }
        }
    }

    /// List applications visible to the viewer, newest first.
    /// `stage=<country|state|local>` filters to rows awaiting that stage.
    pub async fn list(
        pool: &PgPool,
        user: &AuthenticatedUser,
        query: &ApplicationQuery,
    ) -> Result<(Vec<SchoolApplication>, i64), ApplicationError> {
        let limit = query.limit.unwrap_or(50).clamp(1, 200);
        let page = query.page.unwrap_or(1).max(1);
        let offset = (page - 1) * limit;

        let status_filter = match &query.status {
            Some(s) => {
                // Reject unknown values up front instead of matching nothing
                let parsed: ApplicationStatus = s
                    .parse()
                    .map_err(|_| ApplicationError::Validation(format!("Unknown status filter: {s}")))?;
                Some(vec![parsed.to_string()])
            }
            None => None,
        };
        let stage_filter = match &query.stage {
            Some(s) => {
                let stage: ReviewStage = s
                    .parse()
                    .map_err(|_| ApplicationError::Validation(format!("Unknown stage filter: {s}")))?;
                Some(expected_statuses(stage))
            }
            None => None,
        };
        // Both given: intersect (empty intersection matches nothing)
        let statuses: Option<Vec<String>> = match (status_filter, stage_filter) {
            (Some(a), Some(b)) => Some(a.into_iter().filter(|s| b.contains(s)).collect()),
            (Some(a), None) => Some(a),
            (None, Some(b)) => Some(b),
            (None, None) => None,
        };

        // Visibility scope per role
        let (owner_scope, country_scope, state_scope) = match user.role {
            UserRole::GlobalAdmin => (None, None, None),
            UserRole::SchoolAdmin => (Some(user.user_id), None, None),
            UserRole::CountryAdmin => (None, user.country.clone(), None),
            UserRole::StateAdmin | UserRole::LocalAdmin => {
                (None, user.country.clone(), user.state.clone())
            }
        };

        let where_clause = "($1::uuid IS NULL OR owner_id = $1)
               AND ($2::text IS NULL OR lower(country) = lower($2))
               AND ($3::text IS NULL OR lower(state) = lower($3))
               AND ($4::text[] IS NULL OR status = ANY($4))
               AND ($5::text IS NULL OR lower(country) = lower($5))
               AND ($6::text IS NULL OR lower(state) = lower($6))";

        let rows = sqlx::query_as::<_, SchoolApplication>(&format!(
            "SELECT {APP_COLS} FROM applications
             WHERE {where_clause}
             ORDER BY created_at DESC
             LIMIT $7 OFFSET $8"
        ))
        .bind(owner_scope)
        .bind(&country_scope)
        .bind(&state_scope)
        .bind(&statuses)
        .bind(&query.country)
        .bind(&query.state)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await?;

        let total: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM applications WHERE {where_clause}"
        ))
        .bind(owner_scope)
        .bind(&country_scope)
        .bind(&state_scope)
        .bind(&statuses)
        .bind(&query.country)
        .bind(&query.state)
        .fetch_one(pool)
        .await?;

        Ok((rows, total))
    }

    /// Update a draft. Only the owning school admin (or a global admin)
    /// may edit, and only while the application is still in `draft`.
    pub async fn update_draft(
        pool: &PgPool,
        id: Uuid,
        user: &AuthenticatedUser,
        req: &UpdateApplicationRequest,
    ) -> Result<SchoolApplication, ApplicationError> {
        let app = Self::get(pool, id).await?;
        if user.role != UserRole::GlobalAdmin && app.owner_id != user.user_id {
            return Err(ApplicationError::Forbidden);
        }

        let updated = sqlx::query_as::<_, SchoolApplication>(&format!(
            "UPDATE applications SET
                school_name      = COALESCE($2, school_name),
                location         = COALESCE($3, location),
                country          = COALESCE($4, country),
                state            = COALESCE($5, state),
                principal_name   = COALESCE($6, principal_name),
                email            = COALESCE($7, email),
                phone            = COALESCE($8, phone),
                established_year = COALESCE($9, established_year),
                student_count    = COALESCE($10, student_count),
                teacher_count    = COALESCE($11, teacher_count),
                curriculum       = COALESCE($12, curriculum),
                facilities       = COALESCE($13, facilities),
                updated_at       = NOW()
             WHERE id = $1 AND status = 'draft'
             RETURNING {APP_COLS}"
        ))
        .bind(id)
        .bind(&req.school_name)
        .bind(&req.location)
        .bind(&req.country)
        .bind(&req.state)
        .bind(&req.principal_name)
        .bind(&req.email)
        .bind(&req.phone)
        .bind(&req.established_year)
        .bind(req.student_count)
        .bind(req.teacher_count)
        .bind(&req.curriculum)
        .bind(&req.facilities)
        .fetch_optional(pool)
        .await?;

        updated.ok_or_else(|| {
            ApplicationError::StageOrder(format!(
                "application is {} and can no longer be edited",
                app.status
            ))
        })
    }

    /// Submit a draft: validates required fields, stamps submitted_date,
    /// opens the country stage and moves the row into country-review.
    pub async fn submit(
        pool: &PgPool,
        id: Uuid,
        user: &AuthenticatedUser,
    ) -> Result<SchoolApplication, ApplicationError> {
        let app = Self::get(pool, id).await?;
        if user.role != UserRole::GlobalAdmin && app.owner_id != user.user_id {
            return Err(ApplicationError::Forbidden);
        }

        let missing = app.missing_required_fields();
        if !missing.is_empty() {
            return Err(ApplicationError::Validation(format!(
                "Missing required fields: {}",
                missing.join(", ")
            )));
        }

        // Conditional on still being a draft — a concurrent submit loses here.
        let submitted = sqlx::query_as::<_, SchoolApplication>(&format!(
            "UPDATE applications SET
                status = 'country-review',
                submitted_date = NOW(),
                country_status = 'pending',
                updated_at = NOW()
             WHERE id = $1 AND status = 'draft'
             RETURNING {APP_COLS}"
        ))
        .bind(id)
        .fetch_optional(pool)
        .await?;

        submitted.ok_or_else(|| {
            ApplicationError::StageOrder(format!("application is already {}", app.status))
        })
    }

    /// Approve the given stage. Fails with StageOrder unless `stage` is the
    /// stage currently awaiting a decision, and with Forbidden unless the
    /// viewer holds authority over it. Runs as a single conditional UPDATE so
    /// two reviewers cannot both decide the same stage.
    pub async fn approve(
        pool: &PgPool,
        id: Uuid,
        user: &AuthenticatedUser,
        stage: ReviewStage,
        reviewer_name: &str,
        comments: Option<&str>,
    ) -> Result<SchoolApplication, ApplicationError> {
        let app = Self::get(pool, id).await?;
        if !can_decide(user, stage, &app) {
            return Err(ApplicationError::Forbidden);
        }

        let p = stage.column_prefix();
        let new_status = stage.approved_status().to_string();
        // Opening the next stage's sub-record is part of the same statement.
        let open_next = match stage.next() {
            Some(next) => format!(", {}_status = 'pending'", next.column_prefix()),
            None => String::new(),
        };

        let updated = sqlx::query_as::<_, SchoolApplication>(&format!(
            "UPDATE applications SET
                {p}_status = 'approved',
                {p}_reviewed_by = $2,
                {p}_review_date = NOW(),
                {p}_comments = $3,
                status = $4
                {open_next},
                updated_at = NOW()
             WHERE id = $1 AND status = ANY($5)
             RETURNING {APP_COLS}"
        ))
        .bind(id)
        .bind(reviewer_name)
        .bind(comments)
        .bind(&new_status)
        .bind(expected_statuses(stage))
        .fetch_optional(pool)
        .await?;

        match updated {
            Some(app) => Ok(app),
            None => Err(Self::stage_order_error(pool, id, stage).await?),
        }
    }

    /// Reject the given stage: same gating as approve, terminal outcome.
    /// No further stage is opened or evaluated once rejected.
    pub async fn reject(
        pool: &PgPool,
        id: Uuid,
        user: &AuthenticatedUser,
        stage: ReviewStage,
        reviewer_name: &str,
        comments: Option<&str>,
    ) -> Result<SchoolApplication, ApplicationError> {
        let app = Self::get(pool, id).await?;
        if !can_decide(user, stage, &app) {
            return Err(ApplicationError::Forbidden);
        }

        let p = stage.column_prefix();
        let updated = sqlx::query_as::<_, SchoolApplication>(&format!(
            "UPDATE applications SET
                {p}_status = 'rejected',
                {p}_reviewed_by = $2,
                {p}_review_date = NOW(),
                {p}_comments = $3,
                status = 'rejected',
                updated_at = NOW()
             WHERE id = $1 AND status = ANY($4)
             RETURNING {APP_COLS}"
        ))
        .bind(id)
        .bind(reviewer_name)
        .bind(comments)
        .bind(expected_statuses(stage))
        .fetch_optional(pool)
        .await?;

        match updated {
            Some(app) => Ok(app),
            None => Err(Self::stage_order_error(pool, id, stage).await?),
        }
    }

    /// The conditional UPDATE matched nothing: either the row is gone or the
    /// stage is not the one currently pending (including a concurrent decision
    /// that won the race). Distinguish for the caller.
    async fn stage_order_error(
        pool: &PgPool,
        id: Uuid,
        stage: ReviewStage,
    ) -> Result<ApplicationError, ApplicationError> {
        let current = sqlx::query_scalar::<_, String>(
            "SELECT status FROM applications WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(pool)
        .await?;

        Ok(match current {
            None => ApplicationError::NotFound,
            Some(status) => ApplicationError::StageOrder(format!(
                "{stage} stage is not pending (application is {status})"
            )),
        })
    }

    pub async fn stats(pool: &PgPool) -> Result<ApplicationStats, ApplicationError> {
        let stats = sqlx::query_as::<_, ApplicationStats>(
            "SELECT COUNT(*) AS total,
                    COUNT(*) FILTER (WHERE status = 'draft') AS draft,
                    COUNT(*) FILTER (WHERE status IN
                        ('submitted', 'country-review', 'state-review', 'local-verification'))
                        AS in_review,
                    COUNT(*) FILTER (WHERE status = 'approved') AS approved,
                    COUNT(*) FILTER (WHERE status = 'rejected') AS rejected
             FROM applications",
        )
        .fetch_one(pool)
        .await?;
        Ok(stats)
    }

    /// Public directory of approved schools with free-text search.
    pub async fn directory(
        pool: &PgPool,
        search: Option<&str>,
        country: Option<&str>,
        state: Option<&str>,
        page: i64,
        limit: i64,
    ) -> Result<(Vec<SchoolSummary>, i64), ApplicationError> {
        let limit = limit.clamp(1, 200);
        let offset = (page.max(1) - 1) * limit;
        let pattern = search.map(|s| format!("%{}%", s.trim()));

        let where_clause = "status = 'approved'
               AND ($1::text IS NULL OR school_name ILIKE $1 OR location ILIKE $1
                    OR curriculum ILIKE $1 OR principal_name ILIKE $1)
               AND ($2::text IS NULL OR lower(country) = lower($2))
               AND ($3::text IS NULL OR lower(state) = lower($3))";

        let rows = sqlx::query_as::<_, SchoolSummary>(&format!(
            "SELECT id, school_name, location, country, state, established_year,
                    student_count, teacher_count, curriculum, facilities
             FROM applications
             WHERE {where_clause}
             ORDER BY school_name
             LIMIT $4 OFFSET $5"
        ))
        .bind(&pattern)
        .bind(country)
        .bind(state)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await?;

        let total: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM applications WHERE {where_clause}"
        ))
        .bind(&pattern)
        .bind(country)
        .bind(state)
        .fetch_one(pool)
        .await?;

        Ok((rows, total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn user(role: UserRole, country: Option<&str>, state: Option<&str>) -> AuthenticatedUser {
        AuthenticatedUser {
            user_id: Uuid::new_v4(),
            role,
            country: country.map(String::from),
            state: state.map(String::from),
        }
    }

    fn app_in(country: &str, state: &str, status: &str) -> SchoolApplication {
        SchoolApplication {
            id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            school_name: "Dar Al-Uloom Cairo".into(),
            location: Some("Cairo".into()),
            country: Some(country.into()),
            state: Some(state.into()),
            principal_name: Some("Dr. Ahmed Hassan".into()),
            email: Some("ahmed@daruloom.edu.eg".into()),
            phone: Some("+20-10-1234-5678".into()),
            established_year: Some("2015".into()),
            student_count: Some(320),
            teacher_count: Some(25),
            curriculum: Some("Traditional Islamic Education".into()),
            facilities: vec![],
            status: status.into(),
            submitted_date: None,
            country_status: Some("pending".into()),
            country_reviewed_by: None,
            country_review_date: None,
            country_comments: None,
            state_status: None,
            state_reviewed_by: None,
            state_review_date: None,
            state_comments: None,
            local_status: None,
            local_reviewed_by: None,
            local_review_date: None,
            local_comments: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn country_admin_decides_country_stage_in_own_country_only() {
        let app = app_in("Egypt", "Cairo", "country-review");
        let ok = user(UserRole::CountryAdmin, Some("Egypt"), None);
        let wrong_country = user(UserRole::CountryAdmin, Some("Nigeria"), None);

        assert!(can_decide(&ok, ReviewStage::Country, &app));
        assert!(!can_decide(&wrong_country, ReviewStage::Country, &app));
        // Right country, wrong stage authority
        assert!(!can_decide(&ok, ReviewStage::State, &app));
    }

    #[test]
    fn state_and_local_admins_need_country_and_state_match() {
        let app = app_in("Nigeria", "Lagos", "state-review");
        let state_ok = user(UserRole::StateAdmin, Some("Nigeria"), Some("Lagos"));
        let state_wrong = user(UserRole::StateAdmin, Some("Nigeria"), Some("Kano"));
        let local_ok = user(UserRole::LocalAdmin, Some("Nigeria"), Some("Lagos"));

        assert!(can_decide(&state_ok, ReviewStage::State, &app));
        assert!(!can_decide(&state_wrong, ReviewStage::State, &app));
        assert!(can_decide(&local_ok, ReviewStage::Local, &app));
        assert!(!can_decide(&local_ok, ReviewStage::State, &app));
    }

    #[test]
    fn global_admin_decides_any_stage_anywhere() {
        let app = app_in("Pakistan", "Punjab", "local-verification");
        let admin = user(UserRole::GlobalAdmin, None, None);
        for stage in [ReviewStage::Country, ReviewStage::State, ReviewStage::Local] {
            assert!(can_decide(&admin, stage, &app));
        }
    }

    #[test]
    fn school_admin_never_decides_stages() {
        let app = app_in("Egypt", "Cairo", "country-review");
        let school = user(UserRole::SchoolAdmin, None, None);
        for stage in [ReviewStage::Country, ReviewStage::State, ReviewStage::Local] {
            assert!(!can_decide(&school, stage, &app));
        }
    }

    #[test]
    fn jurisdiction_match_is_case_insensitive() {
        let app = app_in("nigeria", "lagos", "country-review");
        let admin = user(UserRole::CountryAdmin, Some("Nigeria"), None);
        assert!(can_decide(&admin, ReviewStage::Country, &app));
    }

    #[test]
    fn expected_statuses_accept_imported_submitted_rows_for_country() {
        assert_eq!(
            expected_statuses(ReviewStage::Country),
            vec!["submitted".to_string(), "country-review".to_string()]
        );
        assert_eq!(
            expected_statuses(ReviewStage::State),
            vec!["state-review".to_string()]
        );
        assert_eq!(
            expected_statuses(ReviewStage::Local),
            vec!["local-verification".to_string()]
        );
    }

    #[test]
    fn validation_errors_carry_their_message_unmodified() {
        // Filter errors must not read like submission errors.
        let filter_err = ApplicationError::Validation("Unknown status filter: bogus".into());
        assert_eq!(filter_err.to_string(), "Unknown status filter: bogus");

        let submit_err =
            ApplicationError::Validation("Missing required fields: phone, curriculum".into());
        assert_eq!(
            submit_err.to_string(),
            "Missing required fields: phone, curriculum"
        );
    }

    #[test]
    fn visibility_scopes_by_role() {
        let app = app_in("Egypt", "Cairo", "country-review");
        let owner = AuthenticatedUser {
            user_id: app.owner_id,
            role: UserRole::SchoolAdmin,
            country: None,
            state: None,
        };
        let other_school = user(UserRole::SchoolAdmin, None, None);
        let country_admin = user(UserRole::CountryAdmin, Some("Egypt"), None);
        let foreign_admin = user(UserRole::CountryAdmin, Some("Nigeria"), None);

        assert!(ApplicationService::can_view(&owner, &app));
        assert!(!ApplicationService::can_view(&other_school, &app));
        assert!(ApplicationService::can_view(&country_admin, &app));
        assert!(!ApplicationService::can_view(&foreign_admin, &app));
    }
}
