use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use keydesk::config::Config;
use keydesk::db::{self, AppState, DbPool, queries};
use keydesk::handlers;
use keydesk::ingest;
use keydesk::models::{AdminRole, CreateAdmin};

#[derive(Parser)]
#[command(name = "keydesk", version, about = "License key fulfillment back-office")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server (default)
    Serve,
    /// Import newline-separated keys from a file into a product's pool
    ImportKeys {
        #[arg(long)]
        fsn: String,
        #[arg(long)]
        file: PathBuf,
    },
    /// Create an admin and print its API key
    CreateAdmin {
        #[arg(long)]
        email: String,
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "support")]
        role: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "keydesk=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();

    let pool = db::create_pool(&config.database_path)
        .with_context(|| format!("Failed to open database at {}", config.database_path))?;
    {
        let conn = pool.get()?;
        db::init_db(&conn).context("Failed to initialize schema")?;
    }

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config, pool).await,
        Command::ImportKeys { fsn, file } => import_keys(&pool, &fsn, &file),
        Command::CreateAdmin { email, name, role } => create_admin(&pool, email, name, &role),
    }
}

async fn serve(config: Config, pool: DbPool) -> Result<()> {
    bootstrap_admin(&config, &pool)?;
    purge_audit_logs(&config, &pool);

    if config.email.resend_api_key.is_none() {
        tracing::warn!("RESEND_API_KEY not set, transactional emails will be skipped");
    }

    let state = AppState::from_config(&config, pool);
    let app = handlers::app(state);

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    tracing::info!(
        addr = %addr,
        dev_mode = config.dev_mode,
        "keydesk listening"
    );

    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}

/// First start with BOOTSTRAP_ADMIN_EMAIL and an empty admins table: create
/// an owner and print its key once.
fn bootstrap_admin(config: &Config, pool: &DbPool) -> Result<()> {
    let Some(email) = config.bootstrap_admin_email.as_deref() else {
        return Ok(());
    };
    let conn = pool.get()?;
    if queries::count_admins(&conn)? > 0 {
        return Ok(());
    }

    let input = CreateAdmin {
        email: email.trim().to_lowercase(),
        name: "Owner".to_string(),
        role: AdminRole::Owner,
    };
    let (admin, api_key) = queries::create_admin(&conn, &input, None)?;
    tracing::info!(admin_id = %admin.id, email = %admin.email, "Bootstrap owner created");
    println!("Bootstrap owner API key (shown once): {}", api_key);
    Ok(())
}

fn purge_audit_logs(config: &Config, pool: &DbPool) {
    if config.audit_log_retention_days <= 0 {
        return;
    }
    let purged = pool
        .get()
        .map_err(keydesk::error::AppError::from)
        .and_then(|conn| queries::purge_old_public_audit_logs(&conn, config.audit_log_retention_days));
    match purged {
        Ok(0) => {}
        Ok(n) => tracing::info!(purged = n, "Purged old public audit logs"),
        Err(e) => tracing::warn!(error = %e, "Failed to purge old audit logs"),
    }
}

fn import_keys(pool: &DbPool, fsn: &str, file: &Path) -> Result<()> {
    let raw = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let mut conn = pool.get()?;
    let report = ingest::import_keys(&mut conn, fsn, &raw)?;

    println!(
        "{}: {} submitted, {} inserted, {} failed, {} blank lines skipped",
        fsn, report.submitted, report.inserted, report.failed, report.skipped_blank
    );
    for failure in &report.failures {
        println!("  {} ({})", failure.key, failure.reason);
    }
    Ok(())
}

fn create_admin(pool: &DbPool, email: String, name: String, role: &str) -> Result<()> {
    let Ok(role) = role.parse::<AdminRole>() else {
        bail!("Unknown role {:?}: expected owner or support", role);
    };
    let conn = pool.get()?;
    let (admin, api_key) = queries::create_admin(
        &conn,
        &CreateAdmin {
            email: email.trim().to_lowercase(),
            name,
            role,
        },
        None,
    )?;
    println!("Created {} admin {} ({})", admin.role.as_ref(), admin.email, admin.id);
    println!("API key (shown once): {}", api_key);
    Ok(())
}
