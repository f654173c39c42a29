// Unit tests for Lume Offers

use chrono::{Duration, Utc};
use lume_offers::core::{
    collapse_matches, daily_window,
    distance::{calculate_bounding_box, distance_km, haversine_distance, is_within_bounding_box},
    filter_by_radius, matches_demographics, rank_profiles, select_next, validate_draft,
    validate_filters, FeedEntry, QuotaDecision, QuotaPolicy,
};
use lume_offers::error::CoreError;
use lume_offers::models::{
    ActivityOffer, Coordinates, DiscoveryFilters, Gender, MatchRecord, OfferCategory, OfferDraft,
    OfferStatus, OfferType, Package, Profile,
};
use std::collections::HashSet;
use uuid::Uuid;

fn create_test_profile(id: &str, age: u8, gender: Gender, coordinates: Option<Coordinates>) -> Profile {
    Profile {
        id: id.to_string(),
        name: format!("User {}", id),
        age,
        gender,
        city: "Berlin".to_string(),
        coordinates,
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

fn create_test_offer(creator: &str, created_minutes_ago: i64) -> ActivityOffer {
    let now = Utc::now();
    ActivityOffer {
        id: Uuid::new_v4(),
        creator_id: creator.to_string(),
        title: "Coffee".to_string(),
        description: String::new(),
        city: "Berlin".to_string(),
        district: None,
        coordinates: None,
        event_at: now + Duration::days(1),
        capacity: 1,
        offer_type: OfferType::OneToOne,
        category: OfferCategory::Coffee,
        status: OfferStatus::Active,
        created_at: now - Duration::minutes(created_minutes_ago),
    }
}

fn berlin() -> Coordinates {
    Coordinates::new(52.5200, 13.4050)
}

fn potsdam() -> Coordinates {
    Coordinates::new(52.3906, 13.0645)
}

#[test]
fn test_haversine_distance_zero() {
    let distance = haversine_distance(52.52, 13.405, 52.52, 13.405);
    assert!(distance < 0.01);
}

#[test]
fn test_distance_is_symmetric() {
    let there = distance_km(berlin(), potsdam());
    let back = distance_km(potsdam(), berlin());
    assert!((there - back).abs() < 1e-9);
    // Berlin to Potsdam is roughly 27 km
    assert!(there > 20.0 && there < 35.0);
}

#[test]
fn test_point_within_bbox() {
    let bbox = calculate_bounding_box(52.52, 13.405, 10.0);

    assert!(is_within_bounding_box(52.52, 13.405, &bbox));
    assert!(is_within_bounding_box(52.55, 13.45, &bbox));
    assert!(!is_within_bounding_box(52.3906, 13.0645, &bbox));
}

#[test]
fn test_filter_by_radius_keeps_unlocated_last() {
    let candidates = vec![
        create_test_profile("far", 30, Gender::Female, Some(Coordinates::new(48.13, 11.58))),
        create_test_profile("unknown", 30, Gender::Female, None),
        create_test_profile("near", 30, Gender::Female, Some(potsdam())),
    ];

    let located = filter_by_radius(Some(berlin()), candidates, 50.0);
    let ids: Vec<&str> = located.iter().map(|l| l.item.id.as_str()).collect();

    assert_eq!(ids, vec!["near", "unknown"]);
    assert!(located[1].distance_km.is_none());
}

#[test]
fn test_validate_filters() {
    let ok = DiscoveryFilters::default();
    assert!(validate_filters(&ok).is_ok());

    let underage = DiscoveryFilters {
        min_age: 16,
        ..DiscoveryFilters::default()
    };
    assert!(matches!(validate_filters(&underage), Err(CoreError::InvalidInput(_))));

    let inverted = DiscoveryFilters {
        min_age: 40,
        max_age: 30,
        ..DiscoveryFilters::default()
    };
    assert!(validate_filters(&inverted).is_err());

    let negative = DiscoveryFilters {
        max_distance_km: Some(-1.0),
        ..DiscoveryFilters::default()
    };
    assert!(validate_filters(&negative).is_err());
}

#[test]
fn test_demographics_bounds_are_inclusive() {
    let filters = DiscoveryFilters {
        min_age: 25,
        max_age: 30,
        gender: Some(Gender::Female),
        max_distance_km: None,
    };

    assert!(matches_demographics(&create_test_profile("a", 25, Gender::Female, None), &filters));
    assert!(matches_demographics(&create_test_profile("b", 30, Gender::Female, None), &filters));
    assert!(!matches_demographics(&create_test_profile("c", 31, Gender::Female, None), &filters));
    assert!(!matches_demographics(&create_test_profile("d", 27, Gender::Male, None), &filters));
}

#[test]
fn test_select_next_prefers_newest() {
    let user = create_test_profile("me", 30, Gender::Male, None);
    let creator = create_test_profile("host", 28, Gender::Female, None);
    let older = create_test_offer("host", 60);
    let newer = create_test_offer("host", 5);
    let newer_id = newer.id;

    let entries = vec![
        FeedEntry { offer: older, creator: creator.clone() },
        FeedEntry { offer: newer, creator },
    ];

    let next = select_next(&user, &DiscoveryFilters::default(), entries, &HashSet::new(), Utc::now())
        .expect("a candidate");
    assert_eq!(next.offer.id, newer_id);
}

#[test]
fn test_select_next_never_returns_excluded_or_own() {
    let user = create_test_profile("me", 30, Gender::Male, None);
    let creator = create_test_profile("host", 28, Gender::Female, None);
    let skipped = create_test_offer("host", 1);
    let own = create_test_offer("me", 2);

    let mut exclusions = HashSet::new();
    exclusions.insert(skipped.id);

    let entries = vec![
        FeedEntry { offer: skipped, creator },
        FeedEntry { offer: own, creator: user.clone() },
    ];

    let next = select_next(&user, &DiscoveryFilters::default(), entries, &exclusions, Utc::now());
    assert!(next.is_none());
}

#[test]
fn test_select_next_skips_expired_offers() {
    let user = create_test_profile("me", 30, Gender::Male, None);
    let creator = create_test_profile("host", 28, Gender::Female, None);
    let mut past = create_test_offer("host", 10);
    past.event_at = Utc::now() - Duration::hours(1);

    let next = select_next(
        &user,
        &DiscoveryFilters::default(),
        vec![FeedEntry { offer: past, creator }],
        &HashSet::new(),
        Utc::now(),
    );
    assert!(next.is_none());
}

#[test]
fn test_rank_profiles_boosted_first() {
    let now = Utc::now();
    let user = create_test_profile("me", 30, Gender::Male, Some(berlin()));
    let near = create_test_profile("near", 28, Gender::Female, Some(berlin()));
    let mut boosted = create_test_profile("boosted", 28, Gender::Female, Some(potsdam()));
    boosted.boost_expires_at = Some(now + Duration::hours(1));

    let ranked = rank_profiles(
        &user,
        &DiscoveryFilters::default(),
        vec![near, boosted],
        &HashSet::new(),
        now,
    );

    assert_eq!(ranked[0].profile.id, "boosted");
    assert!(ranked[0].is_boosted);
    assert_eq!(ranked[1].profile.id, "near");
}

#[test]
fn test_quota_priority_order() {
    let policy = QuotaPolicy::default();
    let now = Utc::now();
    let mut profile = create_test_profile("u1", 30, Gender::Other, None);
    profile.free_offers_used = 3;

    let package = Package {
        id: Uuid::new_v4(),
        owner_id: "u1".to_string(),
        quota_limit: Some(10),
        expires_at: None,
        is_active: true,
        created_at: now,
    };

    assert_eq!(
        policy.evaluate(&profile, None, 0, now),
        QuotaDecision::Free { used: 3, limit: 3 }
    );
    assert_eq!(
        policy.evaluate(&profile, Some(&package), 4, now),
        QuotaDecision::Package { used: 4, limit: 10 }
    );

    profile.is_premium = true;
    assert_eq!(policy.evaluate(&profile, Some(&package), 4, now), QuotaDecision::Premium);
}

#[test]
fn test_quota_allowance_is_monotonic() {
    let policy = QuotaPolicy::default();
    let now = Utc::now();
    let mut profile = create_test_profile("u1", 30, Gender::Other, None);

    let mut previous = true;
    for used in 0..6 {
        profile.free_offers_used = used;
        let allowed = policy.evaluate(&profile, None, 0, now).allowed();
        // Once refused, more usage never allows again
        assert!(previous || !allowed);
        previous = allowed;
    }
    assert!(!previous);
}

#[test]
fn test_free_limit_override() {
    let policy = QuotaPolicy::default();
    let mut profile = create_test_profile("tester", 30, Gender::Other, None);
    profile.free_offers_limit = Some(100);
    profile.free_offers_used = 50;

    let decision = policy.evaluate(&profile, None, 0, Utc::now());
    assert!(decision.allowed());
    assert_eq!(decision.remaining(), Some(50));
}

#[test]
fn test_collapse_matches_dedupes_halves() {
    let now = Utc::now();
    let record = |sender: &str, receiver: &str| MatchRecord {
        id: Uuid::new_v4(),
        sender_id: sender.to_string(),
        receiver_id: receiver.to_string(),
        offer_id: None,
        created_at: now,
    };

    let records = vec![record("a", "b"), record("b", "a"), record("c", "a")];
    let counterparts = collapse_matches("a", &records);

    let ids: Vec<&str> = counterparts.iter().map(|c| c.user_id.as_str()).collect();
    assert_eq!(ids, vec!["b", "c"]);
}

#[test]
fn test_validate_draft() {
    let now = Utc::now();
    let draft = OfferDraft {
        title: "Run".to_string(),
        description: String::new(),
        city: "Berlin".to_string(),
        district: None,
        coordinates: None,
        event_at: now + Duration::hours(3),
        capacity: 1,
        offer_type: OfferType::OneToOne,
        category: OfferCategory::Sport,
    };
    assert!(validate_draft(&draft, now).is_ok());

    let crowded = OfferDraft {
        capacity: 4,
        ..draft.clone()
    };
    assert!(validate_draft(&crowded, now).is_err());

    let past = OfferDraft {
        event_at: now - Duration::minutes(1),
        ..draft
    };
    assert!(validate_draft(&past, now).is_err());
}

#[test]
fn test_daily_window_resets() {
    let now = Utc::now();
    let mut profile = create_test_profile("host", 30, Gender::Other, None);

    // Never published: a fresh window starts now
    let (count, reset_at) = daily_window(&profile, now);
    assert_eq!(count, 0);
    assert!(reset_at > now);

    profile.daily_offers_count = 4;
    profile.daily_offers_reset_at = Some(now + Duration::hours(2));
    assert_eq!(daily_window(&profile, now).0, 4);

    profile.daily_offers_reset_at = Some(now - Duration::minutes(1));
    assert_eq!(daily_window(&profile, now).0, 0);
}
