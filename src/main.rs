//! ProposalOS orchestration core.
//!
//! Wires the configured backends into the conversation state machine and
//! runs periodic maintenance until Ctrl-C. No transport is bound here: an
//! HTTP layer embeds the library and calls `handle_turn` and `export`.

use std::sync::Arc;

use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use proposalos_core::adapters::ai::{HttpFactExtractor, MockFactExtractor};
use proposalos_core::adapters::compliance::{HttpComplianceChecker, MockComplianceChecker};
use proposalos_core::adapters::rate_limiter::{
    FallbackRateLimiter, InMemoryRateLimiter, RedisRateLimiter,
};
use proposalos_core::adapters::resilience::CircuitBreakerRegistry;
use proposalos_core::adapters::session_store::{
    FileSessionBackend, InMemorySessionBackend, PostgresSessionBackend, RedisSessionBackend,
    SessionStore,
};
use proposalos_core::adapters::SystemClock;
use proposalos_core::application::{ConversationStateMachine, SystemHealth};
use proposalos_core::config::{AppConfig, ServerConfig};
use proposalos_core::ports::{
    Clock, ComplianceChecker, FactExtractor, RateLimiter, SessionBackend,
};

type BoxError = Box<dyn std::error::Error>;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let config = AppConfig::load_validated()?;
    init_tracing(&config.server);

    info!(
        environment = ?config.server.environment,
        "Starting ProposalOS orchestration core"
    );

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let redis = connect_redis(&config).await;

    let registry = Arc::new(CircuitBreakerRegistry::with_configs(
        clock.clone(),
        config.breakers.presets(),
        config.breakers.generic(),
    ));
    let admission = Admission::build(&config, redis.clone(), clock.clone())?;
    let store = Arc::new(SessionStore::new(
        session_backends(&config, redis).await,
        config.session.store_options(),
        clock.clone(),
    ));

    let conversation = ConversationStateMachine::new(
        admission.limiter(),
        store.clone(),
        registry.clone(),
        fact_extractor(&config)?,
        compliance_checker(&config)?,
        clock,
        config.conversation_settings()?,
    );
    info!(
        required_fields = conversation.settings().required_fields.len(),
        backends = ?store.backend_status().iter().map(|b| b.name.clone()).collect::<Vec<_>>(),
        "Conversation state machine ready"
    );

    let mut ticker = tokio::time::interval(config.server.sweep_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                run_maintenance(&store, &admission, &registry).await;
            }
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    error!(error = %e, "Failed to listen for shutdown signal");
                }
                info!("Shutting down");
                break;
            }
        }
    }

    Ok(())
}

fn init_tracing(server: &ServerConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&server.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(filter);
    if server.is_production() {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().pretty()).init();
    }
}

async fn connect_redis(config: &AppConfig) -> Option<redis::aio::MultiplexedConnection> {
    let url = config.redis.url()?;
    let connect = async {
        redis::Client::open(url)?
            .get_multiplexed_async_connection()
            .await
    };
    match tokio::time::timeout(config.redis.timeout(), connect).await {
        Ok(Ok(conn)) => {
            info!("Connected to Redis");
            Some(conn)
        }
        Ok(Err(e)) => {
            warn!(error = %e, "Redis unavailable, continuing without it");
            None
        }
        Err(_) => {
            warn!(timeout = ?config.redis.timeout(), "Redis connect timed out, continuing without it");
            None
        }
    }
}

/// Backends in failover order. The in-memory backend is always last.
async fn session_backends(
    config: &AppConfig,
    redis: Option<redis::aio::MultiplexedConnection>,
) -> Vec<Arc<dyn SessionBackend>> {
    let mut backends: Vec<Arc<dyn SessionBackend>> = Vec::new();

    if let Some(conn) = redis {
        backends.push(Arc::new(RedisSessionBackend::new(conn)));
    }

    if let Some(url) = config.database.url() {
        match connect_postgres(config, url).await {
            Ok(backend) => backends.push(Arc::new(backend)),
            Err(e) => warn!(error = %e, "PostgreSQL unavailable, continuing without it"),
        }
    }

    if let Some(dir) = config.file_store.dir() {
        info!(dir = %dir.display(), "Using file session backend");
        backends.push(Arc::new(FileSessionBackend::new(dir)));
    }

    backends.push(Arc::new(InMemorySessionBackend::new()));
    backends
}

async fn connect_postgres(config: &AppConfig, url: &str) -> Result<PostgresSessionBackend, BoxError> {
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .acquire_timeout(config.database.acquire_timeout())
        .connect(url)
        .await?;
    let backend = PostgresSessionBackend::new(pool);
    backend.ensure_schema().await?;
    info!("Connected to PostgreSQL");
    Ok(backend)
}

fn fact_extractor(config: &AppConfig) -> Result<Arc<dyn FactExtractor>, BoxError> {
    match config.extractor.extractor_config() {
        Some(http) => Ok(Arc::new(HttpFactExtractor::new(http)?)),
        None => {
            warn!("No extractor configured, every turn falls back to direct questions");
            Ok(Arc::new(MockFactExtractor::new()))
        }
    }
}

fn compliance_checker(config: &AppConfig) -> Result<Arc<dyn ComplianceChecker>, BoxError> {
    match config.compliance.compliance_config() {
        Some(http) => Ok(Arc::new(HttpComplianceChecker::new(http)?)),
        None => {
            warn!("No compliance endpoint configured, checks pass without review");
            Ok(Arc::new(MockComplianceChecker::new()))
        }
    }
}

/// Rate limiter in use, kept concrete so idle buckets can be swept.
enum Admission {
    Shared(Arc<FallbackRateLimiter<RedisRateLimiter>>),
    Local(Arc<InMemoryRateLimiter>),
}

impl Admission {
    fn build(
        config: &AppConfig,
        redis: Option<redis::aio::MultiplexedConnection>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, BoxError> {
        let local = InMemoryRateLimiter::from_config(&config.rate_limit, clock.clone())?;
        Ok(match redis {
            Some(conn) => Self::Shared(Arc::new(FallbackRateLimiter::new(
                RedisRateLimiter::from_config(conn, &config.rate_limit)?,
                local,
                &config.rate_limit,
                clock,
            ))),
            None => Self::Local(Arc::new(local)),
        })
    }

    fn limiter(&self) -> Arc<dyn RateLimiter> {
        match self {
            Self::Shared(limiter) => limiter.clone(),
            Self::Local(limiter) => limiter.clone(),
        }
    }

    async fn sweep_idle(&self) -> usize {
        match self {
            Self::Shared(limiter) => limiter.fallback().sweep_idle().await,
            Self::Local(limiter) => limiter.sweep_idle().await,
        }
    }
}

async fn run_maintenance(
    store: &SessionStore,
    admission: &Admission,
    registry: &CircuitBreakerRegistry,
) {
    match store.sweep_expired().await {
        Ok(0) => {}
        Ok(evicted) => info!(evicted, "Swept expired sessions"),
        Err(e) => warn!(error = %e, "Session sweep failed"),
    }

    let dropped = admission.sweep_idle().await;
    if dropped > 0 {
        tracing::debug!(dropped, "Dropped idle rate limit buckets");
    }

    let limiter = admission.limiter();
    SystemHealth::collect(registry, limiter.as_ref(), store).log();
}
