use shared::{AuthService, Config};
use std::sync::Arc;

use crate::domains::redemptions::{
    pg_store, Clock, CounterScanner, MemoryStore, PgStore, QrPresenter, RedemptionStore,
    SystemClock, TokenIssuer, Validator,
};

/// Shared application state.
/// Holds the store, the clock and the services built on top of them.
pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn RedemptionStore>,
    pub clock: Arc<dyn Clock>,
    pub auth: AuthService,
    pub issuer: TokenIssuer,
    pub validator: Arc<Validator>,
    pub scanner: CounterScanner,
    pub presenter: QrPresenter,
}

impl AppState {
    /// Connects to Postgres when `DATABASE_URL` is set, otherwise runs on the
    /// in-memory store (optionally seeded from `SEED_FILE`).
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let store: Arc<dyn RedemptionStore> = match config.database.url.as_deref() {
            Some(url) => {
                let pool = pg_store::connect(&config.database, url).await?;
                Arc::new(PgStore::new(pool))
            }
            None => {
                tracing::warn!("⚠️ DATABASE_URL not set, using the in-memory store");
                match config.database.seed_file.as_deref() {
                    Some(path) => Arc::new(MemoryStore::load_seed_file(path)?),
                    None => Arc::new(MemoryStore::new()),
                }
            }
        };

        Ok(Self::with_store(config, store, Arc::new(SystemClock)))
    }

    pub fn with_store(config: Config, store: Arc<dyn RedemptionStore>, clock: Arc<dyn Clock>) -> Self {
        let tz = config.redemption.daily_limit_tz();
        let issuer = TokenIssuer::new(store.clone(), clock.clone(), config.redemption.clone());
        let validator = Arc::new(Validator::new(store.clone(), clock.clone(), tz));
        let scanner = CounterScanner::new(validator.clone());
        let presenter = QrPresenter::new(config.redemption.landing_base_url.clone());
        let auth = AuthService::new(&config.auth.jwt_secret);

        Self {
            config,
            store,
            clock,
            auth,
            issuer,
            validator,
            scanner,
            presenter,
        }
    }
}
