use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use lume_offers::config::Settings;
use lume_offers::core::{Clock, OfferPublisher, SystemClock};
use lume_offers::routes::{self, AppState};
use lume_offers::services::{
    MemorySkipStore, MemoryStore, NotificationSink, PostgresStore, ProfileCache, RedisSkipStore,
    SkipStore, Stores, TracingSink, WebhookSink,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn init_logging(settings: &Settings) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.logging.level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true);

    if settings.logging.format == "pretty" {
        subscriber.pretty().init();
    } else {
        subscriber.init();
    }
}

fn notification_sink(settings: &Settings) -> Arc<dyn NotificationSink> {
    match &settings.notifications.webhook_url {
        Some(url) => match WebhookSink::new(url.clone(), settings.notifications.timeout_secs) {
            Ok(sink) => {
                info!("Delivering notifications to webhook");
                Arc::new(sink)
            }
            Err(e) => {
                error!("Failed to build webhook client ({}), logging notifications only", e);
                Arc::new(TracingSink)
            }
        },
        None => Arc::new(TracingSink),
    }
}

async fn skip_store(settings: &Settings) -> Arc<dyn SkipStore> {
    let ttl = settings.session.skip_ttl_secs;

    if let Some(url) = &settings.session.redis_url {
        match RedisSkipStore::new(url, ttl).await {
            Ok(store) => {
                info!("Feed skip sets stored in Redis (TTL: {}s)", ttl);
                return Arc::new(store);
            }
            Err(e) => {
                warn!("Failed to connect to Redis ({}), keeping skip sets in memory", e);
            }
        }
    }

    Arc::new(MemorySkipStore::new(ttl))
}

fn spawn_expiry_sweep(publisher: OfferPublisher, clock: Arc<dyn Clock>, every: Duration) {
    actix_web::rt::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            if let Err(e) = publisher.sweep_expired(clock.now()).await {
                error!("Offer expiry sweep failed: {}", e);
            }
        }
    });
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load .env file if present
    dotenv::dotenv().ok();

    let settings = Settings::load().map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string())
    })?;

    init_logging(&settings);

    info!("Starting Lume Offers service...");

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let notifications = notification_sink(&settings);

    let (stores, database) = if settings.database.is_memory() {
        warn!("Running against the in-memory store, data is lost on restart");
        let backend = Arc::new(MemoryStore::new());
        (Stores::from_backend(backend, notifications), None)
    } else {
        let postgres = Arc::new(
            PostgresStore::from_settings(&settings.database)
                .await
                .map_err(|e| {
                    error!("Failed to connect to PostgreSQL: {}", e);
                    std::io::Error::new(std::io::ErrorKind::Other, e.to_string())
                })?,
        );
        info!("PostgreSQL store initialized");
        (
            Stores::from_backend(postgres.clone(), notifications),
            Some(postgres),
        )
    };

    let cache = Arc::new(ProfileCache::new(
        stores.profiles.clone(),
        settings.cache.profile_capacity,
        settings.cache.profile_ttl_secs,
        clock.clone(),
    ));
    info!(
        "Profile cache initialized ({} entries, TTL: {}s)",
        settings.cache.profile_capacity, settings.cache.profile_ttl_secs
    );
    let stores = stores.with_profiles(cache);

    let skips = skip_store(&settings).await;

    let mut app_state = AppState::new(stores, skips, clock.clone(), &settings);
    if let Some(database) = database {
        app_state = app_state.with_database(database);
    }

    if let Some(secs) = settings.offers.sweep_interval_secs {
        info!("Sweeping expired offers every {}s", secs);
        spawn_expiry_sweep(
            app_state.publisher.clone(),
            clock.clone(),
            Duration::from_secs(secs.max(1)),
        );
    }

    // Configure HTTP server
    let host = settings.server.host.clone();
    let port = settings.server.port;
    let workers = settings.server.workers.unwrap_or(4);

    info!("Starting HTTP server on {}:{}", host, port);

    HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .configure(routes::configure_extractors)
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .wrap(middleware::Compress::default())
            .configure(routes::configure_routes)
    })
    .workers(workers)
    .bind((host, port))?
    .run()
    .await
}
