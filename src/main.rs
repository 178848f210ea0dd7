use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

use fit_coach::achievements::AchievementEvaluator;
use fit_coach::admin::{self, AdminState};
use fit_coach::bot::{BotDeps, DispatchSettings, Dispatcher};
use fit_coach::channels::{ChannelManager, CliChannel, TelegramChannel};
use fit_coach::coaching::Coach;
use fit_coach::config::{BotConfig, ReminderConfig};
use fit_coach::entitlement::Entitlements;
use fit_coach::llm::{LlmConfig, create_provider};
use fit_coach::onboarding::OnboardingManager;
use fit_coach::reminders::{self, ReminderService};
use fit_coach::store::{Database, LibSqlBackend};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = BotConfig::from_env().context("Failed to read configuration")?;

    // Stderr always, plus a daily file when a log directory is configured.
    let (file_layer, _log_guard) = match &config.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "fit-coach.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_writer(writer).with_ansi(false)),
                Some(guard),
            )
        }
        None => (None, None),
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(file_layer)
        .init();

    eprintln!("🏋️ Fit Coach v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {} ({})", config.llm_model, config.llm_backend.as_str());

    // ── LLM ─────────────────────────────────────────────────────────────
    let llm = create_provider(&LlmConfig {
        backend: config.llm_backend,
        api_key: config.llm_api_key.clone(),
        model: config.llm_model.clone(),
    })
    .context("Failed to create LLM provider")?;

    // ── Database ─────────────────────────────────────────────────────────
    let db: Arc<dyn Database> = Arc::new(
        LibSqlBackend::new_local(&config.db_path)
            .await
            .with_context(|| format!("Failed to open database at {}", config.db_path.display()))?,
    );
    eprintln!("   Database: {}", config.db_path.display());

    // ── Services ─────────────────────────────────────────────────────────
    let entitlements = Arc::new(Entitlements::new(db.clone(), config.plans));
    let achievements = Arc::new(AchievementEvaluator::new(db.clone()));
    let coach = Arc::new(Coach::new(
        db.clone(),
        entitlements.clone(),
        achievements,
        llm,
        config.llm_timeout,
    ));
    let onboarding = Arc::new(OnboardingManager::new(db.clone()));

    // ── Channels ─────────────────────────────────────────────────────────
    let channels = Arc::new(ChannelManager::new());
    match &config.telegram_token {
        Some(token) => {
            channels.add(Arc::new(TelegramChannel::new(token.clone()))).await;
            eprintln!("   Channel: telegram");
        }
        None => {
            channels.add(Arc::new(CliChannel::new())).await;
            eprintln!("   Channel: cli (type @data to press a button, Ctrl+D to exit)");
        }
    }

    // ── Operator console ─────────────────────────────────────────────────
    match &config.admin_token {
        Some(token) => {
            let router = admin::admin_router(AdminState {
                db: db.clone(),
                entitlements: entitlements.clone(),
                channels: channels.clone(),
                token: Arc::new(token.clone()),
            });
            let port = config.admin_port;
            tokio::spawn(async move {
                if let Err(e) = admin::serve(router, port).await {
                    tracing::error!(port, "Operator console stopped: {e}");
                }
            });
            eprintln!("   Console: http://0.0.0.0:{port}/admin/stats");
        }
        None => eprintln!("   Console: disabled (ADMIN_TOKEN not set)"),
    }

    // ── Reminders ────────────────────────────────────────────────────────
    let reminder_service = Arc::new(ReminderService::new(
        ReminderConfig::from_env().context("Invalid reminder configuration")?,
        db.clone(),
        coach.clone(),
        channels.clone(),
    ));
    let _reminder_handles = reminders::spawn_scheduler(reminder_service)
        .context("Failed to start reminder scheduler")?;

    // ── Dispatcher ───────────────────────────────────────────────────────
    let dispatcher = Dispatcher::new(
        BotDeps {
            db,
            onboarding,
            entitlements,
            coach,
        },
        DispatchSettings {
            admin_ids: config.admin_ids.clone(),
            payment_provider_token: config.payment_provider_token.clone(),
        },
        channels,
    );
    dispatcher.run().await?;

    Ok(())
}
