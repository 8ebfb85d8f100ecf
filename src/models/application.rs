use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::user::UserRole;

/// Aggregate position of an application in the KYS pipeline.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ApplicationStatus {
    Draft,
    Submitted,
    CountryReview,
    StateReview,
    LocalVerification,
    Approved,
    Rejected,
}

impl ApplicationStatus {
    /// The stage currently awaiting a decision, if any.
    /// `submitted` rows are treated as "country stage pending" — they exist
    /// only for imports that have not been picked up by the pipeline yet.
    pub fn current_stage(&self) -> Option<ReviewStage> {
        match self {
            ApplicationStatus::Submitted | ApplicationStatus::CountryReview => {
                Some(ReviewStage::Country)
            }
            ApplicationStatus::StateReview => Some(ReviewStage::State),
            ApplicationStatus::LocalVerification => Some(ReviewStage::Local),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ApplicationStatus::Approved | ApplicationStatus::Rejected)
    }
}

impl std::fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ApplicationStatus::Draft => "draft",
            ApplicationStatus::Submitted => "submitted",
            ApplicationStatus::CountryReview => "country-review",
            ApplicationStatus::StateReview => "state-review",
            ApplicationStatus::LocalVerification => "local-verification",
            ApplicationStatus::Approved => "approved",
            ApplicationStatus::Rejected => "rejected",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for ApplicationStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(ApplicationStatus::Draft),
            "submitted" => Ok(ApplicationStatus::Submitted),
            "country-review" => Ok(ApplicationStatus::CountryReview),
            "state-review" => Ok(ApplicationStatus::StateReview),
            "local-verification" => Ok(ApplicationStatus::LocalVerification),
            "approved" => Ok(ApplicationStatus::Approved),
            "rejected" => Ok(ApplicationStatus::Rejected),
            _ => Err(anyhow::anyhow!("Unknown application status: {s}")),
        }
    }
}

/// The three approval stages, strictly ordered country → state → local.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ReviewStage {
    Country,
    State,
    Local,
}

impl ReviewStage {
    /// Overall status while this stage is awaiting a decision.
    pub fn review_status(&self) -> ApplicationStatus {
        match self {
            ReviewStage::Country => ApplicationStatus::CountryReview,
            ReviewStage::State => ApplicationStatus::StateReview,
            ReviewStage::Local => ApplicationStatus::LocalVerification,
        }
    }

    /// Overall status after this stage is approved: the next stage's review
    /// state, or `approved` when this was the final stage.
    pub fn approved_status(&self) -> ApplicationStatus {
        match self.next() {
            Some(next) => next.review_status(),
            None => ApplicationStatus::Approved,
        }
    }

    pub fn next(&self) -> Option<ReviewStage> {
        match self {
            ReviewStage::Country => Some(ReviewStage::State),
            ReviewStage::State => Some(ReviewStage::Local),
            ReviewStage::Local => None,
        }
    }

    /// Column prefix of this stage's sub-record in the applications table.
    pub fn column_prefix(&self) -> &'static str {
        match self {
            ReviewStage::Country => "country",
            ReviewStage::State => "state",
            ReviewStage::Local => "local",
        }
    }

    /// Whether `role` holds decision authority over this stage.
    /// Jurisdiction (country / state match) is checked separately.
    pub fn authorized_role(&self) -> UserRole {
        match self {
            ReviewStage::Country => UserRole::CountryAdmin,
            ReviewStage::State => UserRole::StateAdmin,
            ReviewStage::Local => UserRole::LocalAdmin,
        }
    }
}

impl std::fmt::Display for ReviewStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ReviewStage::Country => "country",
            ReviewStage::State => "state",
            ReviewStage::Local => "local",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for ReviewStage {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "country" => Ok(ReviewStage::Country),
            "state" => Ok(ReviewStage::State),
            "local" => Ok(ReviewStage::Local),
            _ => Err(anyhow::anyhow!("Unknown review stage: {s}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    Pending,
    Approved,
    Rejected,
}

impl std::str::FromStr for StageStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(StageStatus::Pending),
            "approved" => Ok(StageStatus::Approved),
            "rejected" => Ok(StageStatus::Rejected),
            _ => Err(anyhow::anyhow!("Unknown stage status: {s}")),
        }
    }
}

/// One stage's sub-record, absent until the application reaches that stage.
#[derive(Debug, Clone, Serialize)]
pub struct StageReview {
    pub status: StageStatus,
    pub reviewed_by: Option<String>,
    pub review_date: Option<DateTime<Utc>>,
    pub comments: Option<String>,
}

/// DB row — status columns stored as TEXT (values match the serde names).
#[derive(Debug, Clone, FromRow)]
pub struct SchoolApplication {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub school_name: String,
    pub location: Option<String>,
    pub country: Option<String>,
    pub state: Option<String>,
    pub principal_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub established_year: Option<String>,
    pub student_count: Option<i32>,
    pub teacher_count: Option<i32>,
    pub curriculum: Option<String>,
    pub facilities: Vec<String>,
    pub status: String,
    pub submitted_date: Option<DateTime<Utc>>,
    pub country_status: Option<String>,
    pub country_reviewed_by: Option<String>,
    pub country_review_date: Option<DateTime<Utc>>,
    pub country_comments: Option<String>,
    pub state_status: Option<String>,
    pub state_reviewed_by: Option<String>,
    pub state_review_date: Option<DateTime<Utc>>,
    pub state_comments: Option<String>,
    pub local_status: Option<String>,
    pub local_reviewed_by: Option<String>,
    pub local_review_date: Option<DateTime<Utc>>,
    pub local_comments: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SchoolApplication {
    pub fn status(&self) -> anyhow::Result<ApplicationStatus> {
        self.status.parse()
    }

    fn stage_fields(
        &self,
        stage: ReviewStage,
    ) -> (
        &Option<String>,
        &Option<String>,
        &Option<DateTime<Utc>>,
        &Option<String>,
    ) {
        match stage {
            ReviewStage::Country => (
                &self.country_status,
                &self.country_reviewed_by,
                &self.country_review_date,
                &self.country_comments,
            ),
            ReviewStage::State => (
                &self.state_status,
                &self.state_reviewed_by,
                &self.state_review_date,
                &self.state_comments,
            ),
            ReviewStage::Local => (
                &self.local_status,
                &self.local_reviewed_by,
                &self.local_review_date,
                &self.local_comments,
            ),
        }
    }

    /// The stage sub-record, or None while the stage has not been reached.
    pub fn stage_review(&self, stage: ReviewStage) -> Option<StageReview> {
        let (status, reviewed_by, review_date, comments) = self.stage_fields(stage);
        let status = status.as_deref()?.parse().ok()?;
        Some(StageReview {
            status,
            reviewed_by: reviewed_by.clone(),
            review_date: *review_date,
            comments: comments.clone(),
        })
    }

    fn stage_approved(&self, stage: ReviewStage) -> bool {
        matches!(
            self.stage_review(stage),
            Some(StageReview { status: StageStatus::Approved, .. })
        )
    }

    /// Verification progress, 33% per approved stage (33/33/34 split).
    pub fn progress(&self) -> u8 {
        let mut progress = 0;
        if self.stage_approved(ReviewStage::Country) {
            progress += 33;
        }
        if self.stage_approved(ReviewStage::State) {
            progress += 33;
        }
        if self.stage_approved(ReviewStage::Local) {
            progress += 34;
        }
        progress
    }

    /// Fields that must be filled before submission. Returns the names of
    /// the missing ones.
    pub fn missing_required_fields(&self) -> Vec<&'static str> {
        fn blank(v: &Option<String>) -> bool {
            v.as_deref().map(str::trim).unwrap_or("").is_empty()
        }

        let mut missing = Vec::new();
        if self.school_name.trim().is_empty() {
            missing.push("school_name");
        }
        if blank(&self.location) {
            missing.push("location");
        }
        if blank(&self.country) {
            missing.push("country");
        }
        if blank(&self.state) {
            missing.push("state");
        }
        if blank(&self.principal_name) {
            missing.push("principal_name");
        }
        if blank(&self.email) {
            missing.push("email");
        }
        if blank(&self.phone) {
            missing.push("phone");
        }
        if blank(&self.established_year) {
            missing.push("established_year");
        }
        if self.student_count.unwrap_or(0) <= 0 {
            missing.push("student_count");
        }
        if self.teacher_count.unwrap_or(0) <= 0 {
            missing.push("teacher_count");
        }
        if blank(&self.curriculum) {
            missing.push("curriculum");
        }
        missing
    }
}

// Request/Response DTOs

#[derive(Debug, Deserialize)]
pub struct CreateApplicationRequest {
    pub school_name: String,
    pub location: Option<String>,
    pub country: Option<String>,
    pub state: Option<String>,
    pub principal_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub established_year: Option<String>,
    pub student_count: Option<i32>,
    pub teacher_count: Option<i32>,
    pub curriculum: Option<String>,
    #[serde(default)]
    pub facilities: Vec<String>,
    /// Submit immediately instead of saving a draft.
    #[serde(default)]
    pub submit: bool,
}

#[derive(Debug, Deserialize)]
pub struct UpdateApplicationRequest {
    pub school_name: Option<String>,
    pub location: Option<String>,
    pub country: Option<String>,
    pub state: Option<String>,
    pub principal_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub established_year: Option<String>,
    pub student_count: Option<i32>,
    pub teacher_count: Option<i32>,
    pub curriculum: Option<String>,
    pub facilities: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub struct DecisionRequest {
    pub stage: ReviewStage,
    pub comments: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ApplicationQuery {
    pub status: Option<String>,
    pub stage: Option<String>,
    pub country: Option<String>,
    pub state: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

/// Full application as returned by the API, sub-records nested.
#[derive(Debug, Serialize)]
pub struct ApplicationResponse {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub school_name: String,
    pub location: Option<String>,
    pub country: Option<String>,
    pub state: Option<String>,
    pub principal_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub established_year: Option<String>,
    pub student_count: Option<i32>,
    pub teacher_count: Option<i32>,
    pub curriculum: Option<String>,
    pub facilities: Vec<String>,
    pub documents: Vec<String>,
    pub status: ApplicationStatus,
    pub submitted_date: Option<DateTime<Utc>>,
    pub country_approval: Option<StageReview>,
    pub state_approval: Option<StageReview>,
    pub local_verification: Option<StageReview>,
    pub progress: u8,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ApplicationResponse {
    pub fn from_row(app: SchoolApplication, documents: Vec<String>) -> anyhow::Result<Self> {
        let status = app.status()?;
        Ok(Self {
            progress: app.progress(),
            country_approval: app.stage_review(ReviewStage::Country),
            state_approval: app.stage_review(ReviewStage::State),
            local_verification: app.stage_review(ReviewStage::Local),
            id: app.id,
            owner_id: app.owner_id,
            school_name: app.school_name,
            location: app.location,
            country: app.country,
            state: app.state,
            principal_name: app.principal_name,
            email: app.email,
            phone: app.phone,
            established_year: app.established_year,
            student_count: app.student_count,
            teacher_count: app.teacher_count,
            curriculum: app.curriculum,
            facilities: app.facilities,
            documents,
            status,
            submitted_date: app.submitted_date,
            created_at: app.created_at,
            updated_at: app.updated_at,
        })
    }
}

/// Entry in the public approved-schools directory.
#[derive(Debug, Serialize, FromRow)]
pub struct SchoolSummary {
    pub id: Uuid,
    pub school_name: String,
    pub location: Option<String>,
    pub country: Option<String>,
    pub state: Option<String>,
    pub established_year: Option<String>,
    pub student_count: Option<i32>,
    pub teacher_count: Option<i32>,
    pub curriculum: Option<String>,
    pub facilities: Vec<String>,
}

/// Pipeline totals for the statistics view.
#[derive(Debug, Serialize, FromRow)]
pub struct ApplicationStats {
    pub total: i64,
    pub draft: i64,
    pub in_review: i64,
    pub approved: i64,
    pub rejected: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn blank_app(status: &str) -> SchoolApplication {
        SchoolApplication {
            id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            school_name: "Madrasa Al-Barakah".into(),
            location: Some("Lagos".into()),
            country: Some("Nigeria".into()),
            state: Some("Lagos".into()),
            principal_name: Some("Ustaz Ibrahim Musa".into()),
            email: Some("ibrahim@albarakah.edu.ng".into()),
            phone: Some("+234-801-234-5678".into()),
            established_year: Some("2018".into()),
            student_count: Some(150),
            teacher_count: Some(12),
            curriculum: Some("Islamic Studies with Modern Subjects".into()),
            facilities: vec!["Library".into(), "Prayer Hall".into()],
            status: status.to_string(),
            submitted_date: None,
            country_status: None,
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
    fn draft_with_empty_sub_records_has_zero_progress() {
        let app = blank_app("draft");
        assert_eq!(app.progress(), 0);
        assert_eq!(app.status().unwrap(), ApplicationStatus::Draft);
        assert!(app.stage_review(ReviewStage::Country).is_none());
    }

    #[test]
    fn progress_is_33_66_100_as_stages_approve_in_order() {
        let mut app = blank_app("state-review");
        app.country_status = Some("approved".into());
        app.state_status = Some("pending".into());
        assert_eq!(app.progress(), 33);

        app.state_status = Some("approved".into());
        app.local_status = Some("pending".into());
        app.status = "local-verification".into();
        assert_eq!(app.progress(), 66);

        app.local_status = Some("approved".into());
        app.status = "approved".into();
        assert_eq!(app.progress(), 100);
    }

    #[test]
    fn all_three_approved_means_overall_approved_and_full_progress() {
        let mut app = blank_app("approved");
        app.country_status = Some("approved".into());
        app.state_status = Some("approved".into());
        app.local_status = Some("approved".into());
        assert_eq!(app.progress(), 100);
        for stage in [ReviewStage::Country, ReviewStage::State, ReviewStage::Local] {
            assert_eq!(app.stage_review(stage).unwrap().status, StageStatus::Approved);
        }
    }

    #[test]
    fn stage_order_is_country_state_local() {
        assert_eq!(ReviewStage::Country.next(), Some(ReviewStage::State));
        assert_eq!(ReviewStage::State.next(), Some(ReviewStage::Local));
        assert_eq!(ReviewStage::Local.next(), None);
    }

    #[test]
    fn approving_a_stage_advances_to_the_next_review_state() {
        assert_eq!(
            ReviewStage::Country.approved_status(),
            ApplicationStatus::StateReview
        );
        assert_eq!(
            ReviewStage::State.approved_status(),
            ApplicationStatus::LocalVerification
        );
        assert_eq!(ReviewStage::Local.approved_status(), ApplicationStatus::Approved);
    }

    #[test]
    fn current_stage_follows_overall_status() {
        assert_eq!(
            ApplicationStatus::CountryReview.current_stage(),
            Some(ReviewStage::Country)
        );
        // Imported `submitted` rows count as country-pending.
        assert_eq!(
            ApplicationStatus::Submitted.current_stage(),
            Some(ReviewStage::Country)
        );
        assert_eq!(
            ApplicationStatus::StateReview.current_stage(),
            Some(ReviewStage::State)
        );
        assert_eq!(
            ApplicationStatus::LocalVerification.current_stage(),
            Some(ReviewStage::Local)
        );
        assert_eq!(ApplicationStatus::Approved.current_stage(), None);
        assert_eq!(ApplicationStatus::Rejected.current_stage(), None);
        assert_eq!(ApplicationStatus::Draft.current_stage(), None);
    }

    #[test]
    fn state_stage_is_not_current_while_country_is_pending() {
        let mut app = blank_app("country-review");
        app.country_status = Some("pending".into());
        let status = app.status().unwrap();
        assert_eq!(status.current_stage(), Some(ReviewStage::Country));
        assert_ne!(status.current_stage(), Some(ReviewStage::State));
    }

    #[test]
    fn rejection_is_terminal_with_no_current_stage() {
        let mut app = blank_app("rejected");
        app.country_status = Some("approved".into());
        app.state_status = Some("rejected".into());
        // Local stage was never reached.
        assert!(app.stage_review(ReviewStage::Local).is_none());
        let status = app.status().unwrap();
        assert!(status.is_terminal());
        assert_eq!(status.current_stage(), None);
    }

    #[test]
    fn submission_validation_reports_missing_fields() {
        let mut app = blank_app("draft");
        app.principal_name = None;
        app.phone = Some("   ".into());
        app.student_count = Some(0);
        let missing = app.missing_required_fields();
        assert!(missing.contains(&"principal_name"));
        assert!(missing.contains(&"phone"));
        assert!(missing.contains(&"student_count"));
        assert!(!missing.contains(&"school_name"));
    }

    #[test]
    fn complete_application_passes_submission_validation() {
        let app = blank_app("draft");
        assert!(app.missing_required_fields().is_empty());
    }

    #[test]
    fn status_round_trips_through_text() {
        for s in [
            "draft",
            "submitted",
            "country-review",
            "state-review",
            "local-verification",
            "approved",
            "rejected",
        ] {
            let parsed: ApplicationStatus = s.parse().unwrap();
            assert_eq!(parsed.to_string(), s);
        }
        assert!("pending".parse::<ApplicationStatus>().is_err());
    }
}
