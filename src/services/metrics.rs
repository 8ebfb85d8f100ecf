use lazy_static::lazy_static;
use prometheus::{register_counter_vec, register_gauge_vec, CounterVec, GaugeVec};
use sqlx::PgPool;
use tracing::{info, warn};

lazy_static! {
    // ── Event counters (increment on each event) ────────────────────────────
    pub static ref LOGINS_COUNTER: CounterVec = register_counter_vec!(
        "api_logins_total",
        "Login attempts by status",
        &["status"]
    ).unwrap();

    pub static ref PASSWORD_RESETS_COUNTER: CounterVec = register_counter_vec!(
        "api_password_resets_total",
        "Password reset requests and completions",
        &["phase"]
    ).unwrap();

    pub static ref SUBMISSIONS_COUNTER: CounterVec = register_counter_vec!(
        "kys_submissions_total",
        "KYS applications submitted, by country",
        &["country"]
    ).unwrap();

    pub static ref DECISIONS_COUNTER: CounterVec = register_counter_vec!(
        "kys_stage_decisions_total",
        "Stage decisions by stage and verdict",
        &["stage", "verdict"]
    ).unwrap();

    pub static ref DOCUMENT_UPLOADS_COUNTER: CounterVec = register_counter_vec!(
        "kys_document_uploads_total",
        "KYS documents uploaded, by country",
        &["country"]
    ).unwrap();

    // ── Business metrics ────────────────────────────────────────────────────
    pub static ref APPLICATIONS_GAUGE: GaugeVec = register_gauge_vec!(
        "kys_applications_total",
        "Applications by pipeline status",
        &["status"]
    ).unwrap();

    pub static ref APPROVED_SCHOOLS_GAUGE: GaugeVec = register_gauge_vec!(
        "kys_approved_schools_total",
        "Approved schools by country",
        &["country"]
    ).unwrap();
}

/// Spawn the background metrics collector (refreshes every 5 minutes).
pub fn start(pool: PgPool) {
    tokio::spawn(async move {
        // Initial collection on startup
        if let Err(e) = collect(&pool).await {
            warn!("Metrics: initial collection failed: {}", e);
        }
        loop {
            tokio::time::sleep(tokio::time::Duration::from_secs(300)).await;
            if let Err(e) = collect(&pool).await {
                warn!("Metrics: collection failed: {}", e);
            }
        }
    });
}

async fn collect(pool: &PgPool) -> anyhow::Result<()> {
    let by_status: Vec<(String, i64)> = sqlx::query_as(
        "SELECT status, COUNT(*)::BIGINT FROM applications GROUP BY status",
    )
    .fetch_all(pool)
    .await?;

    for (status, count) in &by_status {
        APPLICATIONS_GAUGE
            .with_label_values(&[status])
            .set(*count as f64);
    }

    let approved_by_country: Vec<(String, i64)> = sqlx::query_as(
        "SELECT COALESCE(country, 'unknown'), COUNT(*)::BIGINT
         FROM applications WHERE status = 'approved' GROUP BY country",
    )
    .fetch_all(pool)
    .await
    .unwrap_or_default();

    for (country, count) in &approved_by_country {
        APPROVED_SCHOOLS_GAUGE
            .with_label_values(&[country])
            .set(*count as f64);
    }

    info!(
        "Metrics: collected {} status bucket(s), {} countr(y/ies) with approved schools",
        by_status.len(),
        approved_by_country.len()
    );
    Ok(())
}
