use std::net::SocketAddr;
use std::sync::Arc;

use tracing::info;

use subscription_quota_server::adapter;
use subscription_quota_server::domain::repository::{SubscriptionLifecycle, UsageCounterRepository};
use subscription_quota_server::infrastructure::config::Config;
use subscription_quota_server::infrastructure::{
    database, in_memory_store, logging, redis_store, subscription_client, subscription_registry,
};
use subscription_quota_server::usecase::{
    BuildCapabilitiesUseCase, CheckAndConsumeUseCase, EngineOptions, ReleaseQuotaUseCase,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path =
        std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config/config.yaml".to_string());
    let cfg = Config::load(&config_path)?;
    logging::init_logging(&cfg.logging)?;

    info!(
        app_name = %cfg.app.name,
        version = %cfg.app.version,
        environment = %cfg.app.environment,
        "starting subscription quota server"
    );

    let (usage_repo, usage_store) = build_usage_store(&cfg).await?;
    let lifecycle = build_lifecycle(&cfg)?;

    let options = EngineOptions {
        root_subject_id: cfg.quota.root_subject_id.clone(),
    };
    if options.root_subject_id.is_some() {
        info!("root subject configured, its requests bypass all limitations");
    }

    let state = adapter::handler::AppState {
        check_and_consume_uc: Arc::new(CheckAndConsumeUseCase::new(
            lifecycle.clone(),
            usage_repo.clone(),
            options.clone(),
        )),
        release_quota_uc: Arc::new(ReleaseQuotaUseCase::new(
            lifecycle.clone(),
            usage_repo.clone(),
            options.clone(),
        )),
        build_capabilities_uc: Arc::new(BuildCapabilitiesUseCase::new(
            lifecycle,
            usage_repo,
            options,
        )),
        usage_store,
    };
    let app = adapter::handler::router(state);

    let addr: SocketAddr = format!("{}:{}", cfg.server.host, cfg.server.port).parse()?;
    info!("REST server starting on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("subscription quota server exited");
    Ok(())
}

/// 使用量ストアを Redis → PostgreSQL → InMemory の順で選択する。
async fn build_usage_store(
    cfg: &Config,
) -> anyhow::Result<(Arc<dyn UsageCounterRepository>, &'static str)> {
    if let Some(ref redis_cfg) = cfg.redis {
        info!(url = %redis_cfg.url, "connecting to Redis for usage counters");
        match redis::Client::open(redis_cfg.url.as_str()) {
            Ok(client) => match redis::aio::ConnectionManager::new(client).await {
                Ok(cm) => {
                    info!(prefix = %redis_cfg.key_prefix, "using Redis for usage counters");
                    let repo: Arc<dyn UsageCounterRepository> =
                        Arc::new(redis_store::RedisUsageCounterRepository::new(
                            cm,
                            redis_cfg.key_prefix.clone(),
                        ));
                    return Ok((repo, "redis"));
                }
                Err(e) => {
                    tracing::warn!(error = %e, "failed to connect to Redis, will fall back");
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, "invalid Redis URL, will fall back");
            }
        }
    }

    if let Some(ref db_cfg) = cfg.database {
        info!("connecting to PostgreSQL");
        match database::create_pool(&db_cfg.url, db_cfg.max_connections).await {
            Ok(pool) => {
                info!("PostgreSQL connection pool created successfully");
                if db_cfg.run_migrations {
                    database::run_migrations(&pool).await?;
                    info!("database migrations applied");
                }
                let repo: Arc<dyn UsageCounterRepository> = Arc::new(
                    adapter::repository::UsageCounterPostgresRepository::new(Arc::new(pool)),
                );
                return Ok((repo, "postgres"));
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "failed to connect to PostgreSQL, falling back to InMemory"
                );
            }
        }
    }

    info!("using InMemory usage counters");
    let repo: Arc<dyn UsageCounterRepository> =
        Arc::new(in_memory_store::InMemoryUsageCounterRepository::new());
    Ok((repo, "in-memory"))
}

fn build_lifecycle(cfg: &Config) -> anyhow::Result<Arc<dyn SubscriptionLifecycle>> {
    if let Some(ref service_cfg) = cfg.subscription.service {
        info!(base_url = %service_cfg.base_url, "using subscription service");
        return Ok(Arc::new(subscription_client::HttpSubscriptionLifecycle::new(
            service_cfg,
        )?));
    }

    match cfg.subscription.default_plan {
        Some(ref plan) => info!(
            plan_id = %plan.id,
            "no subscription service configured, using in-memory registry with default plan"
        ),
        None => tracing::warn!(
            "no subscription service or default plan configured, every subject will be rejected"
        ),
    }
    Ok(Arc::new(
        subscription_registry::InMemorySubscriptionLifecycle::new(
            cfg.subscription.default_plan.clone(),
        ),
    ))
}

async fn shutdown_signal() {
    use tokio::signal;

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = signal::ctrl_c() => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}
