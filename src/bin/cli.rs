use std::fs;
use std::path::PathBuf;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use uuid::Uuid;

use storebase::utils::{generate_api_key, hash_password};

#[derive(Parser, Debug)]
#[command(author, version, about = "storebase ops tool", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a new empty migration with the provided name
    MakeMigration { name: String },
    /// Apply pending migrations
    MigrateRun,
    /// Show migration status against the current database
    MigrateStatus,
    /// Create (or promote) a console account with the ADMIN role
    CreateAdmin {
        name: String,
        email: String,
        password: String,
    },
    /// Replace a project's API key, invalidating the old one
    RotateApiKey { project_id: Uuid },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Try to load env from CWD; when running in Docker the binary CWD may differ,
    // so fall back to the crate-local `.env` using CARGO_MANIFEST_DIR.
    if dotenv().is_err() {
        let crate_env = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(crate_env);
    }

    let cli = Cli::parse();

    match cli.command {
        Commands::MakeMigration { name } => {
            let path = make_migration_file(&name)?;
            println!("Created migration: {}", path.display());
        }
        Commands::MigrateRun => {
            let pool = get_pool().await?;
            let migrator = get_migrator().await?;
            migrator.run(&pool).await?;
            println!("Migrations applied");
        }
        Commands::MigrateStatus => {
            let pool = get_pool().await?;
            let migrator = get_migrator().await?;
            print_status(&pool, &migrator).await?;
        }
        Commands::CreateAdmin { name, email, password } => {
            let pool = get_pool().await?;
            create_admin(&pool, &name, &email, &password).await?;
        }
        Commands::RotateApiKey { project_id } => {
            let pool = get_pool().await?;
            rotate_api_key(&pool, project_id).await?;
        }
    }

    Ok(())
}

fn migrations_dir() -> PathBuf {
    std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations")
}

fn make_migration_file(name: &str) -> anyhow::Result<PathBuf> {
    let dir = migrations_dir();
    fs::create_dir_all(&dir)?;

    let next_version = fs::read_dir(&dir)?
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            entry
                .file_name()
                .to_str()
                .and_then(|file| file.split('_').next().map(str::to_string))
        })
        .filter_map(|prefix| prefix.parse::<u32>().ok())
        .max()
        .unwrap_or(0)
        + 1;

    let slug = name.trim().to_lowercase().replace(' ', "_");
    let path = dir.join(format!("{:04}_{}.sql", next_version, slug));
    fs::write(&path, "-- Write your migration here\n")?;
    Ok(path)
}

async fn get_pool() -> anyhow::Result<SqlitePool> {
    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL not set")?;
    let pool = SqlitePoolOptions::new()
        .max_connections(2)
        .connect(&database_url)
        .await
        .context("failed to connect to database")?;
    Ok(pool)
}

async fn get_migrator() -> anyhow::Result<sqlx::migrate::Migrator> {
    Ok(sqlx::migrate::Migrator::new(migrations_dir()).await?)
}

async fn print_status(pool: &SqlitePool, migrator: &sqlx::migrate::Migrator) -> anyhow::Result<()> {
    let applied: Vec<i64> = sqlx::query_scalar("SELECT version FROM _sqlx_migrations ORDER BY version")
        .fetch_all(pool)
        .await
        .unwrap_or_default();

    for migration in migrator.iter() {
        let state = if applied.contains(&migration.version) {
            "applied"
        } else {
            "pending"
        };
        println!("{:>6} {:<40} {}", migration.version, migration.description, state);
    }

    Ok(())
}

async fn create_admin(pool: &SqlitePool, name: &str, email: &str, password: &str) -> anyhow::Result<()> {
    let password_hash = hash_password(password).map_err(|err| anyhow::anyhow!("{err}"))?;
    let now = Utc::now();

    let existing: Option<Uuid> = sqlx::query_scalar("SELECT id FROM accounts WHERE email = ?")
        .bind(email)
        .fetch_optional(pool)
        .await?;

    match existing {
        Some(id) => {
            sqlx::query("UPDATE accounts SET role = 'ADMIN', updated_at = ? WHERE id = ?")
                .bind(now)
                .bind(id)
                .execute(pool)
                .await?;
            println!("Promoted existing account {} to ADMIN", email);
        }
        None => {
            sqlx::query(
                "INSERT INTO accounts (id, name, email, password_hash, role, created_at, updated_at) VALUES (?, ?, ?, ?, 'ADMIN', ?, ?)",
            )
            .bind(Uuid::new_v4())
            .bind(name)
            .bind(email)
            .bind(password_hash)
            .bind(now)
            .bind(now)
            .execute(pool)
            .await?;
            println!("Created ADMIN account {}", email);
        }
    }

    Ok(())
}

async fn rotate_api_key(pool: &SqlitePool, project_id: Uuid) -> anyhow::Result<()> {
    let new_key = generate_api_key();
    let result = sqlx::query("UPDATE projects SET api_key = ?, updated_at = ? WHERE id = ?")
        .bind(&new_key)
        .bind(Utc::now())
        .bind(project_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        anyhow::bail!("project {} not found", project_id);
    }

    println!("New API key for {}: {}", project_id, new_key);
    Ok(())
}
