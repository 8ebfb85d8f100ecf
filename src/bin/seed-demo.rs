//! Seeds demo accounts and two showcase applications so the pipeline can be
//! exercised end to end without going through signup and invitations.
//!
//! Usage: seed-demo --database-url postgres://... [--password <pw>]

use anyhow::Context;
use clap::Parser;
use sqlx::PgPool;
use uuid::Uuid;

use murattal_api::db;

#[derive(Parser, Debug)]
#[command(name = "seed-demo", about = "Seed demo users and applications")]
struct Args {
    /// Postgres connection string (falls back to DATABASE_URL)
    #[arg(long, env = "DATABASE_URL")]
    database_url: String,

    /// Password assigned to every seeded account
    #[arg(long, default_value = "Murattal!Demo1")]
    password: String,
}

struct SeedUser<'a> {
    email: &'a str,
    full_name: &'a str,
    role: &'a str,
    country: Option<&'a str>,
    state: Option<&'a str>,
}

const SEED_USERS: &[SeedUser<'static>] = &[
    SeedUser {
        email: "global@almurattal.org",
        full_name: "Global Administrator",
        role: "global-admin",
        country: None,
        state: None,
    },
    SeedUser {
        email: "country.ng@almurattal.org",
        full_name: "Nigeria Country Admin",
        role: "country-admin",
        country: Some("Nigeria"),
        state: None,
    },
    SeedUser {
        email: "state.lagos@almurattal.org",
        full_name: "Lagos State Admin",
        role: "state-admin",
        country: Some("Nigeria"),
        state: Some("Lagos"),
    },
    SeedUser {
        email: "local.lagos@almurattal.org",
        full_name: "Lagos Local Verifier",
        role: "local-admin",
        country: Some("Nigeria"),
        state: Some("Lagos"),
    },
    SeedUser {
        email: "country.eg@almurattal.org",
        full_name: "Egypt Country Admin",
        role: "country-admin",
        country: Some("Egypt"),
        state: None,
    },
    SeedUser {
        email: "state.cairo@almurattal.org",
        full_name: "Cairo Governorate Admin",
        role: "state-admin",
        country: Some("Egypt"),
        state: Some("Cairo"),
    },
    SeedUser {
        email: "school@almurattal.org",
        full_name: "Demo School Admin",
        role: "school-admin",
        country: None,
        state: None,
    },
];

async fn upsert_user(pool: &PgPool, user: &SeedUser<'_>, password_hash: &str) -> anyhow::Result<Uuid> {
    let id: Uuid = sqlx::query_scalar(
        "INSERT INTO users (email, password_hash, full_name, role, country, state)
         VALUES ($1, $2, $3, $4, $5, $6)
         ON CONFLICT (email) DO UPDATE
           SET full_name = EXCLUDED.full_name,
               role = EXCLUDED.role,
               country = EXCLUDED.country,
               state = EXCLUDED.state,
               is_active = TRUE
         RETURNING id",
    )
    .bind(user.email)
    .bind(password_hash)
    .bind(user.full_name)
    .bind(user.role)
    .bind(user.country)
    .bind(user.state)
    .fetch_one(pool)
    .await?;
    Ok(id)
}

/// Madrasa Al-Barakah: freshly submitted, waiting on the country stage.
async fn seed_al_barakah(pool: &PgPool, owner_id: Uuid) -> anyhow::Result<()> {
    sqlx::query(
        "INSERT INTO applications
            (owner_id, school_name, location, country, state, principal_name,
             email, phone, established_year, student_count, teacher_count,
             curriculum, facilities, status, submitted_date, country_status)
         VALUES
            ($1, 'Madrasa Al-Barakah', 'Ikeja, Lagos', 'Nigeria', 'Lagos',
             'Ustadh Ibrahim Musa', 'albarakah@example.org', '+234 801 234 5678',
             '2009', 320, 18, 'Hifz and Tajweed (Hafs)',
             ARRAY['Library', 'Dormitory', 'Computer Lab'],
             'country-review', NOW() - INTERVAL '3 days', 'pending')
         ON CONFLICT DO NOTHING",
    )
    .bind(owner_id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Dar Al-Uloom Cairo: country stage approved, waiting on the state stage.
async fn seed_dar_al_uloom(pool: &PgPool, owner_id: Uuid) -> anyhow::Result<()> {
    sqlx::query(
        "INSERT INTO applications
            (owner_id, school_name, location, country, state, principal_name,
             email, phone, established_year, student_count, teacher_count,
             curriculum, facilities, status, submitted_date,
             country_status, country_reviewed_by, country_review_date, country_comments,
             state_status)
         VALUES
            ($1, 'Dar Al-Uloom Cairo', 'Nasr City, Cairo', 'Egypt', 'Cairo',
             'Sheikh Ahmad Abdel-Rahman', 'daraluloom@example.org', '+20 100 123 4567',
             '1998', 540, 32, 'Qira''at and Ijazah programs',
             ARRAY['Library', 'Recording Studio', 'Dormitory'],
             'state-review', NOW() - INTERVAL '10 days',
             'approved', 'Egypt Country Admin', NOW() - INTERVAL '4 days',
             'Registration documents verified with the ministry.',
             'pending')
         ON CONFLICT DO NOTHING",
    )
    .bind(owner_id)
    .execute(pool)
    .await?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    let pool = db::create_pool(&args.database_url).await?;
    db::run_migrations(&pool).await?;

    let password_hash = bcrypt::hash(&args.password, 12).context("hashing seed password")?;

    let mut school_admin_id = None;
    for user in SEED_USERS {
        let id = upsert_user(&pool, user, &password_hash).await?;
        if user.role == "school-admin" {
            school_admin_id = Some(id);
        }
        tracing::info!("seeded {} ({})", user.email, user.role);
    }

    let owner = school_admin_id.context("school admin seed missing")?;

    let existing: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM applications WHERE owner_id = $1")
            .bind(owner)
            .fetch_one(&pool)
            .await?;
    if existing == 0 {
        seed_al_barakah(&pool, owner).await?;
        seed_dar_al_uloom(&pool, owner).await?;
        tracing::info!("seeded showcase applications");
    } else {
        tracing::info!("applications already present, skipping showcase seeds");
    }

    tracing::info!("done — all accounts use the provided password");
    Ok(())
}
