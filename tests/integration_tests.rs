// Integration tests for Lume Offers

use actix_web::{http::StatusCode, test, web, App};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{encode, EncodingKey, Header};
use lume_offers::config::{
    AuthSettings, CacheSettings, DatabaseSettings, DiscoverySettings, LoggingSettings,
    NotificationSettings, OfferSettings, QuotaSettings, ServerSettings, SessionSettings, Settings,
};
use lume_offers::core::{
    Clock, DiscoveryFeed, ManualClock, MatchRegistry, OfferPublisher, QuotaPolicy,
    RequestLifecycle,
};
use lume_offers::error::CoreError;
use lume_offers::models::{
    ActivityOffer, DiscoveryFilters, Gender, NotificationEvent, OfferCategory, OfferDraft,
    OfferStatus, OfferType, Package, Profile, RequestDraft, RequestStatus,
};
use lume_offers::routes::{self, auth::Claims, AppState};
use lume_offers::services::{
    MatchStore, MemorySkipStore, MemoryStore, MessageRecord, OfferStore, PackageStore,
    ProfileStore, RecordingSink, SkipStore, Stores,
};
use std::sync::Arc;
use uuid::Uuid;

const JWT_SECRET: &str = "integration-secret";

fn create_test_profile(id: &str, age: u8, gender: Gender) -> Profile {
    Profile {
        id: id.to_string(),
        name: format!("User {}", id),
        age,
        gender,
        city: "Berlin".to_string(),
        coordinates: None,
        is_premium: false,
        boost_expires_at: None,
        free_offers_used: 0,
        free_offers_limit: None,
        total_requests_sent: 0,
        daily_offers_count: 0,
        daily_offers_reset_at: None,
        created_at: Utc::now(),
    }
}

fn create_test_offer(creator: &str, now: DateTime<Utc>) -> ActivityOffer {
    ActivityOffer {
        id: Uuid::new_v4(),
        creator_id: creator.to_string(),
        title: "Tennis".to_string(),
        description: String::new(),
        city: "Berlin".to_string(),
        district: None,
        coordinates: None,
        event_at: now + Duration::days(1),
        capacity: 1,
        offer_type: OfferType::OneToOne,
        category: OfferCategory::Sport,
        status: OfferStatus::Active,
        created_at: now,
    }
}

fn create_test_draft(now: DateTime<Utc>) -> OfferDraft {
    OfferDraft {
        title: "Museum visit".to_string(),
        description: String::new(),
        city: "Berlin".to_string(),
        district: None,
        coordinates: None,
        event_at: now + Duration::hours(6),
        capacity: 1,
        offer_type: OfferType::OneToOne,
        category: OfferCategory::Culture,
    }
}

struct Harness {
    store: Arc<MemoryStore>,
    sink: Arc<RecordingSink>,
    stores: Stores,
    clock: Arc<ManualClock>,
}

impl Harness {
    async fn new(users: &[&str]) -> Self {
        let store = Arc::new(MemoryStore::new());
        let sink = Arc::new(RecordingSink::new());
        for id in users {
            store.insert_profile(create_test_profile(id, 30, Gender::Female)).await;
        }
        Self {
            stores: Stores::from_backend(store.clone(), sink.clone()),
            store,
            sink,
            clock: Arc::new(ManualClock::new(Utc::now())),
        }
    }

    fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    fn lifecycle(&self) -> RequestLifecycle {
        RequestLifecycle::new(self.stores.clone(), QuotaPolicy::default())
    }

    fn registry(&self) -> MatchRegistry {
        MatchRegistry::new(self.stores.clone(), QuotaPolicy::default())
    }

    async fn offer_by(&self, creator: &str) -> Uuid {
        let offer = create_test_offer(creator, self.now());
        OfferStore::insert(self.store.as_ref(), &offer).await.unwrap();
        offer.id
    }
}

#[tokio::test]
async fn test_free_quota_exhaustion() {
    let h = Harness::new(&["host", "guest"]).await;
    let lifecycle = h.lifecycle();

    for _ in 0..3 {
        let offer_id = h.offer_by("host").await;
        lifecycle
            .create(offer_id, "guest", RequestDraft::default(), h.now())
            .await
            .unwrap();
    }

    let fourth = h.offer_by("host").await;
    let result = lifecycle
        .create(fourth, "guest", RequestDraft::default(), h.now())
        .await;
    assert!(matches!(result, Err(CoreError::QuotaExceeded { used: 3, limit: 3 })));

    // Nothing was written for the refused request
    let guest = ProfileStore::get(h.store.as_ref(), "guest")
        .await
        .unwrap();
    assert_eq!(guest.free_offers_used, 3);
    assert_eq!(guest.total_requests_sent, 3);
}

#[tokio::test]
async fn test_package_overrides_free_limit() {
    let h = Harness::new(&["host", "guest"]).await;
    let lifecycle = h.lifecycle();

    for _ in 0..3 {
        let offer_id = h.offer_by("host").await;
        lifecycle
            .create(offer_id, "guest", RequestDraft::default(), h.now())
            .await
            .unwrap();
    }

    h.clock.advance(Duration::minutes(1));
    PackageStore::insert(
        h.store.as_ref(),
        &Package {
            id: Uuid::new_v4(),
            owner_id: "guest".to_string(),
            quota_limit: Some(2),
            expires_at: Some(h.now() + Duration::days(30)),
            is_active: true,
            created_at: h.now(),
        },
    )
    .await
    .unwrap();
    h.clock.advance(Duration::minutes(1));

    for _ in 0..2 {
        let offer_id = h.offer_by("host").await;
        lifecycle
            .create(offer_id, "guest", RequestDraft::default(), h.now())
            .await
            .unwrap();
    }

    let offer_id = h.offer_by("host").await;
    let result = lifecycle
        .create(offer_id, "guest", RequestDraft::default(), h.now())
        .await;
    assert!(matches!(result, Err(CoreError::QuotaExceeded { used: 2, limit: 2 })));
}

#[tokio::test]
async fn test_create_charges_free_counter_by_tier() {
    let h = Harness::new(&["host", "free", "limited", "unlimited"]).await;
    let mut premium = create_test_profile("premium", 30, Gender::Female);
    premium.is_premium = true;
    premium.free_offers_used = 3;
    h.store.insert_profile(premium).await;

    for (owner, quota_limit) in [("limited", Some(5)), ("unlimited", None)] {
        PackageStore::insert(
            h.store.as_ref(),
            &Package {
                id: Uuid::new_v4(),
                owner_id: owner.to_string(),
                quota_limit,
                expires_at: None,
                is_active: true,
                created_at: h.now() - Duration::minutes(1),
            },
        )
        .await
        .unwrap();
    }

    let lifecycle = h.lifecycle();
    for user in ["free", "limited", "unlimited", "premium"] {
        for _ in 0..2 {
            let offer_id = h.offer_by("host").await;
            lifecycle
                .create(offer_id, user, RequestDraft::default(), h.now())
                .await
                .unwrap();
        }
    }

    for (user, used) in [("free", 2), ("limited", 2), ("unlimited", 0), ("premium", 3)] {
        let profile = ProfileStore::get(h.store.as_ref(), user).await.unwrap();
        assert_eq!(profile.free_offers_used, used, "free_offers_used for {}", user);
        assert_eq!(profile.total_requests_sent, 2, "total_requests_sent for {}", user);
    }
}

#[tokio::test]
async fn test_expired_package_does_not_restore_free_allowance() {
    let h = Harness::new(&["host", "guest"]).await;
    PackageStore::insert(
        h.store.as_ref(),
        &Package {
            id: Uuid::new_v4(),
            owner_id: "guest".to_string(),
            quota_limit: Some(10),
            expires_at: Some(h.now() + Duration::hours(1)),
            is_active: true,
            created_at: h.now() - Duration::minutes(1),
        },
    )
    .await
    .unwrap();

    let lifecycle = h.lifecycle();
    for _ in 0..3 {
        let offer_id = h.offer_by("host").await;
        lifecycle
            .create(offer_id, "guest", RequestDraft::default(), h.now())
            .await
            .unwrap();
    }

    h.clock.advance(Duration::hours(2));
    let offer_id = h.offer_by("host").await;
    let result = lifecycle
        .create(offer_id, "guest", RequestDraft::default(), h.now())
        .await;
    assert!(matches!(result, Err(CoreError::QuotaExceeded { used: 3, limit: 3 })));
}

#[tokio::test]
async fn test_accept_creates_mutual_match() {
    let h = Harness::new(&["host", "guest"]).await;
    let lifecycle = h.lifecycle();
    let offer_id = h.offer_by("host").await;

    let request = lifecycle
        .create(offer_id, "guest", RequestDraft::default(), h.now())
        .await
        .unwrap();
    let accepted = lifecycle.accept(request.id, "host", h.now()).await.unwrap();

    assert!(accepted.match_created);
    assert_eq!(accepted.request.status, RequestStatus::Accepted);

    let registry = h.registry();
    let host_matches = registry.list_matches("host").await.unwrap();
    let guest_matches = registry.list_matches("guest").await.unwrap();
    assert_eq!(host_matches.len(), 1);
    assert_eq!(host_matches[0].user.id, "guest");
    assert_eq!(guest_matches.len(), 1);
    assert_eq!(guest_matches[0].user.id, "host");

    let offer = OfferStore::get(h.store.as_ref(), offer_id).await.unwrap();
    assert_eq!(offer.status, OfferStatus::Completed);

    let events = h.sink.events();
    assert!(events
        .iter()
        .any(|e| matches!(e, NotificationEvent::MatchCreated { .. })));
}

#[tokio::test]
async fn test_accept_twice_is_rejected_without_duplicates() {
    let h = Harness::new(&["host", "guest"]).await;
    let lifecycle = h.lifecycle();
    let offer_id = h.offer_by("host").await;

    let request = lifecycle
        .create(offer_id, "guest", RequestDraft::default(), h.now())
        .await
        .unwrap();
    lifecycle.accept(request.id, "host", h.now()).await.unwrap();

    let again = lifecycle.accept(request.id, "host", h.now()).await;
    assert!(matches!(again, Err(CoreError::InvalidTransition(_))));
    assert_eq!(h.store.match_records().await.len(), 2);
}

#[tokio::test]
async fn test_existing_match_is_not_duplicated() {
    let h = Harness::new(&["host", "guest"]).await;
    let lifecycle = h.lifecycle();

    let first = h.offer_by("host").await;
    let request = lifecycle
        .create(first, "guest", RequestDraft::default(), h.now())
        .await
        .unwrap();
    lifecycle.accept(request.id, "host", h.now()).await.unwrap();

    let second = h.offer_by("host").await;
    let request = lifecycle
        .create(second, "guest", RequestDraft::default(), h.now())
        .await
        .unwrap();
    let accepted = lifecycle.accept(request.id, "host", h.now()).await.unwrap();

    assert!(!accepted.match_created);
    assert_eq!(h.store.match_records().await.len(), 2);
}

#[tokio::test]
async fn test_unmatch_removes_both_sides() {
    let h = Harness::new(&["host", "guest"]).await;
    let lifecycle = h.lifecycle();
    let offer_id = h.offer_by("host").await;

    let request = lifecycle
        .create(offer_id, "guest", RequestDraft::default(), h.now())
        .await
        .unwrap();
    lifecycle.accept(request.id, "host", h.now()).await.unwrap();

    let registry = h.registry();
    assert_eq!(registry.unmatch("guest", "host").await.unwrap(), 2);
    assert!(registry.list_matches("host").await.unwrap().is_empty());
    assert!(registry.list_matches("guest").await.unwrap().is_empty());

    // A second unmatch finds nothing left and still succeeds
    assert_eq!(registry.unmatch("host", "guest").await.unwrap(), 0);
}

#[tokio::test]
async fn test_match_list_unread_counts_and_order() {
    let h = Harness::new(&["me", "anna", "bea", "cleo"]).await;
    let t0 = h.now();
    let at = |minutes: i64| t0 + Duration::minutes(minutes);

    MatchStore::insert_pair(h.store.as_ref(), "me", "anna", None, at(0)).await.unwrap();
    MatchStore::insert_pair(h.store.as_ref(), "bea", "me", None, at(10)).await.unwrap();
    MatchStore::insert_pair(h.store.as_ref(), "me", "cleo", None, at(20)).await.unwrap();

    let message = |from: &str, to: &str, minutes: i64| MessageRecord {
        sender_id: from.to_string(),
        receiver_id: to.to_string(),
        sent_at: at(minutes),
        read_at: None,
    };
    h.store.insert_message(message("anna", "me", 25)).await;
    h.store.insert_message(message("anna", "me", 30)).await;
    h.store.insert_message(message("bea", "me", 12)).await;
    h.store.insert_message(message("me", "bea", 15)).await;
    // Someone else's conversation
    h.store.insert_message(message("anna", "cleo", 40)).await;

    let registry = h.registry();
    let matches = registry.list_matches("me").await.unwrap();
    let order: Vec<&str> = matches.iter().map(|m| m.user.id.as_str()).collect();
    // Last message time wins, a silent match falls back to when it was made
    assert_eq!(order, vec!["anna", "cleo", "bea"]);

    let unread: Vec<u64> = matches.iter().map(|m| m.unread_count).collect();
    assert_eq!(unread, vec![2, 0, 1]);
    assert_eq!(matches[0].last_message_at, Some(at(30)));
    assert_eq!(matches[1].last_message_at, None);
    assert_eq!(matches[2].last_message_at, Some(at(15)));

    let counters = registry.counters("me", h.now()).await.unwrap();
    assert_eq!(counters.unread_messages, 3);
    assert_eq!(counters.matches, 3);

    h.store.mark_read("me", "anna", at(31)).await;
    let matches = registry.list_matches("me").await.unwrap();
    assert_eq!(matches[0].user.id, "anna");
    assert_eq!(matches[0].unread_count, 0);
    assert_eq!(registry.counters("me", h.now()).await.unwrap().unread_messages, 1);
}

#[tokio::test]
async fn test_feed_excludes_requested_and_skipped() {
    let h = Harness::new(&["me", "host"]).await;
    let skips: Arc<dyn SkipStore> = Arc::new(MemorySkipStore::new(3600));
    let feed = DiscoveryFeed::new(h.stores.clone(), skips, 100);
    let lifecycle = h.lifecycle();

    let requested = h.offer_by("host").await;
    h.clock.advance(Duration::seconds(1));
    let skipped = h.offer_by("host").await;
    h.clock.advance(Duration::seconds(1));
    let own = h.offer_by("me").await;

    lifecycle
        .create(requested, "me", RequestDraft::default(), h.now())
        .await
        .unwrap();
    feed.skip("me", skipped).await.unwrap();

    let me = create_test_profile("me", 30, Gender::Female);
    let filters = DiscoveryFilters::default();
    let next = feed.next_candidate(&me, &filters, h.now()).await.unwrap();
    assert!(next.is_none(), "own {} should never be offered", own);

    feed.reset("me").await.unwrap();
    let next = feed.next_candidate(&me, &filters, h.now()).await.unwrap();
    assert_eq!(next.map(|c| c.offer.id), Some(skipped));
}

#[tokio::test]
async fn test_daily_publish_limit_and_window_reset() {
    let h = Harness::new(&["host"]).await;
    let publisher = OfferPublisher::new(
        h.stores.clone(),
        OfferSettings {
            daily_limit: 2,
            sweep_interval_secs: None,
        },
    );

    publisher.publish("host", create_test_draft(h.now()), h.now()).await.unwrap();
    publisher.publish("host", create_test_draft(h.now()), h.now()).await.unwrap();

    let third = publisher.publish("host", create_test_draft(h.now()), h.now()).await;
    assert!(matches!(third, Err(CoreError::QuotaExceeded { used: 2, limit: 2 })));

    h.clock.advance(Duration::hours(25));
    assert!(publisher
        .publish("host", create_test_draft(h.now()), h.now())
        .await
        .is_ok());
}

#[tokio::test]
async fn test_sweep_expires_past_offers() {
    let h = Harness::new(&["host"]).await;
    let publisher = OfferPublisher::new(h.stores.clone(), OfferSettings::default());

    let offer_id = h.offer_by("host").await;
    assert_eq!(publisher.sweep_expired(h.now()).await.unwrap(), 0);

    h.clock.advance(Duration::days(2));
    assert_eq!(publisher.sweep_expired(h.now()).await.unwrap(), 1);

    let offer = OfferStore::get(h.store.as_ref(), offer_id).await.unwrap();
    assert_eq!(offer.status, OfferStatus::Expired);
}

#[tokio::test]
async fn test_store_outage_surfaces_as_unavailable() {
    let h = Harness::new(&["host", "guest"]).await;
    let offer_id = h.offer_by("host").await;

    h.store.set_available(false);
    let result = h
        .lifecycle()
        .create(offer_id, "guest", RequestDraft::default(), h.now())
        .await;
    assert!(matches!(result, Err(CoreError::StoreUnavailable(_))));
}

#[::core::prelude::v1::test]
fn test_counters_with_block_on() {
    let h = tokio_test::block_on(Harness::new(&["host", "guest"]));
    let offer_id = tokio_test::block_on(h.offer_by("host"));
    tokio_test::block_on(h.lifecycle().create(offer_id, "guest", RequestDraft::default(), h.now()))
        .unwrap();

    let counters = tokio_test::block_on(h.registry().counters("host", h.now())).unwrap();
    assert_eq!(counters.pending_incoming_requests, 1);
    assert_eq!(counters.matches, 0);

    let counters = tokio_test::block_on(h.registry().counters("guest", h.now())).unwrap();
    assert_eq!(counters.requests_remaining, Some(2));
}

// HTTP API

fn test_settings() -> Settings {
    Settings {
        server: ServerSettings {
            host: "127.0.0.1".to_string(),
            port: 0,
            workers: Some(1),
        },
        database: DatabaseSettings {
            url: "memory".to_string(),
            max_connections: None,
            min_connections: None,
            acquire_timeout_secs: None,
            idle_timeout_secs: None,
        },
        cache: CacheSettings::default(),
        session: SessionSettings::default(),
        quota: QuotaSettings::default(),
        discovery: DiscoverySettings::default(),
        offers: OfferSettings::default(),
        notifications: NotificationSettings::default(),
        auth: AuthSettings {
            jwt_secret: JWT_SECRET.to_string(),
        },
        logging: LoggingSettings::default(),
    }
}

fn bearer(user_id: &str) -> (&'static str, String) {
    let token = encode(
        &Header::default(),
        &Claims {
            sub: user_id.to_string(),
            exp: (Utc::now().timestamp() + 3600) as usize,
        },
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .unwrap();
    ("Authorization", format!("Bearer {}", token))
}

async fn app_state(h: &Harness) -> AppState {
    let clock: Arc<dyn Clock> = h.clock.clone();
    AppState::new(
        h.stores.clone(),
        Arc::new(MemorySkipStore::new(3600)),
        clock,
        &test_settings(),
    )
}

#[actix_web::test]
async fn test_http_health_without_token() {
    let h = Harness::new(&[]).await;
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(app_state(&h).await))
            .configure(routes::configure_extractors)
            .configure(routes::configure_routes),
    )
    .await;

    let req = test::TestRequest::get().uri("/api/v1/health").to_request();
    let resp: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(resp["status"], "healthy");
}

#[actix_web::test]
async fn test_http_requires_bearer_token() {
    let h = Harness::new(&["guest"]).await;
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(app_state(&h).await))
            .configure(routes::configure_routes),
    )
    .await;

    let req = test::TestRequest::get().uri("/api/v1/matches").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn test_http_request_and_accept_flow() {
    let h = Harness::new(&["host", "guest"]).await;
    let offer_id = h.offer_by("host").await;
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(app_state(&h).await))
            .configure(routes::configure_extractors)
            .configure(routes::configure_routes),
    )
    .await;

    // The guest finds the offer in the feed
    let req = test::TestRequest::get()
        .uri("/api/v1/feed/next")
        .insert_header(bearer("guest"))
        .to_request();
    let feed: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(feed["candidate"]["offer"]["id"], offer_id.to_string());

    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/offers/{}/requests", offer_id))
        .insert_header(bearer("guest"))
        .set_json(serde_json::json!({ "message": "Count me in" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let request: serde_json::Value = test::read_body_json(resp).await;
    let request_id = request["id"].as_str().unwrap().to_string();

    // Only the creator may accept
    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/requests/{}/accept", request_id))
        .insert_header(bearer("guest"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);

    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/requests/{}/accept", request_id))
        .insert_header(bearer("host"))
        .to_request();
    let accepted: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(accepted["matchCreated"], true);

    let req = test::TestRequest::get()
        .uri("/api/v1/matches")
        .insert_header(bearer("guest"))
        .to_request();
    let matches: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(matches["total"], 1);
}

#[actix_web::test]
async fn test_http_quota_exceeded_is_payment_required() {
    let h = Harness::new(&["host", "guest"]).await;
    let mut offers = Vec::new();
    for _ in 0..4 {
        offers.push(h.offer_by("host").await);
    }
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(app_state(&h).await))
            .configure(routes::configure_extractors)
            .configure(routes::configure_routes),
    )
    .await;

    let mut statuses = Vec::new();
    for offer_id in &offers {
        let req = test::TestRequest::post()
            .uri(&format!("/api/v1/offers/{}/requests", offer_id))
            .insert_header(bearer("guest"))
            .set_json(serde_json::json!({}))
            .to_request();
        statuses.push(test::call_service(&app, req).await.status());
    }

    assert_eq!(
        statuses,
        vec![
            StatusCode::CREATED,
            StatusCode::CREATED,
            StatusCode::CREATED,
            StatusCode::PAYMENT_REQUIRED
        ]
    );

    let req = test::TestRequest::get()
        .uri("/api/v1/quota")
        .insert_header(bearer("guest"))
        .to_request();
    let quota: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(quota["allowed"], false);
    assert_eq!(quota["tier"], "free");
    assert_eq!(quota["remaining"], 0);
}

#[actix_web::test]
async fn test_http_malformed_id_is_bad_request() {
    let h = Harness::new(&["host"]).await;
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(app_state(&h).await))
            .configure(routes::configure_extractors)
            .configure(routes::configure_routes),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/api/v1/requests/not-a-uuid/accept")
        .insert_header(bearer("host"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}
