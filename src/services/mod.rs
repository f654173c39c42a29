// Service exports
pub mod cache;
pub mod memory;
pub mod notify;
pub mod postgres;
pub mod session;
pub mod store;

pub use cache::{CacheStats, ProfileCache};
pub use memory::{MemoryStore, MessageRecord};
pub use notify::{NotifyError, RecordingSink, TracingSink, WebhookSink};
pub use postgres::PostgresStore;
pub use session::{MemorySkipStore, RedisSkipStore, SessionKey, SkipStore};
pub use store::{
    AcceptOutcome, Acceptance, ChangeBroadcaster, ChangeFeed, MatchStore, MessageStore,
    NotificationSink, OfferQuery, OfferStore, PackageStore, ProfileQuery, ProfileStore,
    RequestQuery, RequestStore, StoreError, Stores, SwipeStore,
};
