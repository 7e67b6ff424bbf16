use anyhow::Context;
use clap::Parser;
use shiftwise_core::engine::{EngineConfig, EngineError, ShiftEngine};
use shiftwise_core::storage::postgres::PgStore;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

#[derive(Debug, Parser)]
#[command(name = "shiftwise_worker")]
struct Args {
    /// User to generate demand shift recommendations for. Repeatable.
    #[arg(long = "user-id", required = true)]
    user_ids: Vec<Uuid>,

    /// Generate and log candidates without writing to the database.
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = shiftwise_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let args = Args::parse();
    let db_url = settings.require_database_url()?;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(db_url)
        .await
        .context("connect DATABASE_URL failed")?;

    shiftwise_core::storage::migrate(&pool).await?;

    let store = Arc::new(PgStore::new(pool));
    let engine = ShiftEngine::new(
        store.clone(),
        store.clone(),
        store,
        shiftwise_core::rewards::from_settings(&settings)?,
        EngineConfig::from_env(),
    );

    let now = chrono::Utc::now();
    let mut failures = 0usize;
    for user_id in args.user_ids {
        if args.dry_run {
            match engine.preview_for_user(user_id, now).await {
                Ok(candidates) => {
                    for c in &candidates {
                        tracing::info!(
                            %user_id,
                            original_hour = %c.original_hour,
                            recommended_hour = %c.recommended_hour,
                            savings = c.potential_savings,
                            dry_run = true,
                            "shift candidate"
                        );
                    }
                }
                Err(err) => {
                    failures += 1;
                    report(user_id, err);
                }
            }
            continue;
        }

        match engine.run_for_user(user_id, now).await {
            Ok(created) => {
                tracing::info!(%user_id, created = created.len(), "demand shift run finished");
            }
            Err(err) => {
                failures += 1;
                report(user_id, err);
            }
        }
    }

    anyhow::ensure!(failures == 0, "{failures} user run(s) failed");
    Ok(())
}

fn report(user_id: Uuid, err: EngineError) {
    match err {
        EngineError::NoPriceData => {
            tracing::warn!(%user_id, "no price table for today; nothing generated");
        }
        other => {
            let err = anyhow::Error::new(other);
            sentry_anyhow::capture_anyhow(&err);
            tracing::error!(%user_id, error = %err, "demand shift run failed");
        }
    }
}

fn init_sentry(settings: &shiftwise_core::config::Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
