use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder, Row};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::config::DatabaseSettings;
use crate::models::{
    pair_key, ActivityOffer, Coordinates, MatchRecord, OfferRequest, OfferStatus, Package,
    Profile, ProfilePatch, RequestStatus, StoreChange, SwipeRecord, SwipeStatus,
};
use crate::services::store::{
    AcceptOutcome, Acceptance, ChangeBroadcaster, ChangeFeed, MatchStore, MessageStore,
    OfferQuery, OfferStore, PackageStore, ProfileQuery, ProfileStore, RequestQuery, RequestStore,
    StoreError, SwipeStore,
};

const PROFILE_COLUMNS: &str = "id, name, age, gender, city, latitude, longitude, is_premium, \
     boost_expires_at, free_offers_used, free_offers_limit, total_requests_sent, \
     daily_offers_count, daily_offers_reset_at, created_at";

const OFFER_COLUMNS: &str = "id, creator_id, title, description, city, district, latitude, \
     longitude, event_at, capacity, offer_type, category, status, created_at";

const REQUEST_COLUMNS: &str = "r.id, r.offer_id, r.requester_id, r.message, r.suggested_at, \
     r.location, r.status, r.created_at, r.updated_at";

/// PostgreSQL implementation of every store.
///
/// Compound writes run in one transaction each. Pair creation takes a
/// transaction-scoped advisory lock on the unordered pair and relies on the
/// unique (sender_id, receiver_id) index, so concurrent accepts and mutual
/// likes never produce duplicate halves.
pub struct PostgresStore {
    pool: PgPool,
    changes: ChangeBroadcaster,
}

impl PostgresStore {
    /// Create a new store from a connection string
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
        acquire_timeout: Duration,
        idle_timeout: Duration,
    ) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(acquire_timeout)
            .idle_timeout(idle_timeout)
            .test_before_acquire(true)
            .connect(database_url)
            .await?;

        // Run migrations on startup
        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self {
            pool,
            changes: ChangeBroadcaster::default(),
        })
    }

    /// Create a new store from settings
    pub async fn from_settings(settings: &DatabaseSettings) -> Result<Self, StoreError> {
        tracing::info!("Connecting to PostgreSQL");

        Self::new(
            &settings.url,
            settings.max_connections.unwrap_or(10),
            settings.min_connections.unwrap_or(1),
            Duration::from_secs(settings.acquire_timeout_secs.unwrap_or(5)),
            Duration::from_secs(settings.idle_timeout_secs.unwrap_or(600)),
        )
        .await
    }

    /// Health check for the database connection
    pub async fn health_check(&self) -> Result<bool, StoreError> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map(|_| true)
            .map_err(Into::into)
    }

    async fn ensure_offer_exists(&self, id: Uuid) -> Result<(), StoreError> {
        let exists = sqlx::query("SELECT 1 FROM offers WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .is_some();
        if exists {
            Ok(())
        } else {
            Err(StoreError::NotFound(format!("offer {}", id)))
        }
    }
}

impl ChangeFeed for PostgresStore {
    fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }
}

fn coordinates_from_row(row: &PgRow) -> Result<Option<Coordinates>, sqlx::Error> {
    let latitude: Option<f64> = row.try_get("latitude")?;
    let longitude: Option<f64> = row.try_get("longitude")?;
    Ok(match (latitude, longitude) {
        (Some(lat), Some(lon)) => Some(Coordinates::new(lat, lon)),
        _ => None,
    })
}

fn to_u32(value: i32) -> u32 {
    u32::try_from(value).unwrap_or(0)
}

fn profile_from_row(row: &PgRow) -> Result<Profile, sqlx::Error> {
    let age: i16 = row.try_get("age")?;
    let free_offers_limit: Option<i32> = row.try_get("free_offers_limit")?;

    Ok(Profile {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        age: u8::try_from(age).unwrap_or(u8::MAX),
        gender: row.try_get("gender")?,
        city: row.try_get("city")?,
        coordinates: coordinates_from_row(row)?,
        is_premium: row.try_get("is_premium")?,
        boost_expires_at: row.try_get("boost_expires_at")?,
        free_offers_used: to_u32(row.try_get("free_offers_used")?),
        free_offers_limit: free_offers_limit.map(to_u32),
        total_requests_sent: to_u32(row.try_get("total_requests_sent")?),
        daily_offers_count: to_u32(row.try_get("daily_offers_count")?),
        daily_offers_reset_at: row.try_get("daily_offers_reset_at")?,
        created_at: row.try_get("created_at")?,
    })
}

fn offer_from_row(row: &PgRow) -> Result<ActivityOffer, sqlx::Error> {
    let capacity: i16 = row.try_get("capacity")?;

    Ok(ActivityOffer {
        id: row.try_get("id")?,
        creator_id: row.try_get("creator_id")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        city: row.try_get("city")?,
        district: row.try_get("district")?,
        coordinates: coordinates_from_row(row)?,
        event_at: row.try_get("event_at")?,
        capacity: u16::try_from(capacity).unwrap_or(1),
        offer_type: row.try_get("offer_type")?,
        category: row.try_get("category")?,
        status: row.try_get("status")?,
        created_at: row.try_get("created_at")?,
    })
}

fn request_from_row(row: &PgRow) -> Result<OfferRequest, sqlx::Error> {
    Ok(OfferRequest {
        id: row.try_get("id")?,
        offer_id: row.try_get("offer_id")?,
        requester_id: row.try_get("requester_id")?,
        message: row.try_get("message")?,
        suggested_at: row.try_get("suggested_at")?,
        location: row.try_get("location")?,
        status: row.try_get("status")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn match_from_row(row: &PgRow) -> Result<MatchRecord, sqlx::Error> {
    Ok(MatchRecord {
        id: row.try_get("id")?,
        sender_id: row.try_get("sender_id")?,
        receiver_id: row.try_get("receiver_id")?,
        offer_id: row.try_get("offer_id")?,
        created_at: row.try_get("created_at")?,
    })
}

fn package_from_row(row: &PgRow) -> Result<Package, sqlx::Error> {
    let quota_limit: Option<i32> = row.try_get("quota_limit")?;

    Ok(Package {
        id: row.try_get("id")?,
        owner_id: row.try_get("owner_id")?,
        quota_limit: quota_limit.map(to_u32),
        expires_at: row.try_get("expires_at")?,
        is_active: row.try_get("is_active")?,
        created_at: row.try_get("created_at")?,
    })
}

fn swipe_from_row(row: &PgRow) -> Result<SwipeRecord, sqlx::Error> {
    Ok(SwipeRecord {
        sender_id: row.try_get("sender_id")?,
        receiver_id: row.try_get("receiver_id")?,
        status: row.try_get("status")?,
        created_at: row.try_get("created_at")?,
    })
}

/// Serialize writers on the unordered pair until the transaction ends
async fn lock_pair(conn: &mut PgConnection, user_a: &str, user_b: &str) -> Result<(), sqlx::Error> {
    let (low, high) = pair_key(user_a, user_b);
    sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
        .bind(format!("{}|{}", low, high))
        .execute(conn)
        .await?;
    Ok(())
}

/// Insert whichever directional halves are missing; true when anything was written
async fn insert_pair_in(
    conn: &mut PgConnection,
    user_a: &str,
    user_b: &str,
    offer_id: Option<Uuid>,
    at: DateTime<Utc>,
) -> Result<bool, sqlx::Error> {
    let query = r#"
        INSERT INTO matches (id, sender_id, receiver_id, offer_id, created_at)
        VALUES ($1, $3, $4, $5, $6), ($2, $4, $3, $5, $6)
        ON CONFLICT (sender_id, receiver_id) DO NOTHING
    "#;

    let result = sqlx::query(query)
        .bind(Uuid::new_v4())
        .bind(Uuid::new_v4())
        .bind(user_a)
        .bind(user_b)
        .bind(offer_id)
        .bind(at)
        .execute(conn)
        .await?;

    Ok(result.rows_affected() > 0)
}

#[async_trait]
impl ProfileStore for PostgresStore {
    async fn get(&self, id: &str) -> Result<Profile, StoreError> {
        let query = format!("SELECT {} FROM profiles WHERE id = $1", PROFILE_COLUMNS);
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("profile {}", id)))?;

        Ok(profile_from_row(&row)?)
    }

    async fn update(&self, id: &str, patch: &ProfilePatch) -> Result<Profile, StoreError> {
        let query = format!(
            r#"
            UPDATE profiles SET
                name = COALESCE($2, name),
                city = COALESCE($3, city),
                latitude = COALESCE($4, latitude),
                longitude = COALESCE($5, longitude),
                is_premium = COALESCE($6, is_premium),
                boost_expires_at = COALESCE($7, boost_expires_at),
                free_offers_limit = COALESCE($8, free_offers_limit)
            WHERE id = $1
            RETURNING {}
            "#,
            PROFILE_COLUMNS
        );

        let row = sqlx::query(&query)
            .bind(id)
            .bind(patch.name.as_deref())
            .bind(patch.city.as_deref())
            .bind(patch.coordinates.map(|c| c.latitude))
            .bind(patch.coordinates.map(|c| c.longitude))
            .bind(patch.is_premium)
            .bind(patch.boost_expires_at)
            .bind(patch.free_offers_limit.map(|l| l as i32))
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("profile {}", id)))?;

        Ok(profile_from_row(&row)?)
    }

    async fn query(&self, query: &ProfileQuery) -> Result<Vec<Profile>, StoreError> {
        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {} FROM profiles WHERE TRUE", PROFILE_COLUMNS));

        if let Some(ids) = &query.ids {
            builder.push(" AND id = ANY(").push_bind(ids.clone()).push(")");
        }
        if !query.exclude_ids.is_empty() {
            builder
                .push(" AND NOT (id = ANY(")
                .push_bind(query.exclude_ids.clone())
                .push("))");
        }
        if let Some(min_age) = query.min_age {
            builder.push(" AND age >= ").push_bind(i16::from(min_age));
        }
        if let Some(max_age) = query.max_age {
            builder.push(" AND age <= ").push_bind(i16::from(max_age));
        }
        if let Some(gender) = query.gender {
            builder.push(" AND gender = ").push_bind(gender);
        }
        if let Some(bbox) = query.bounding_box {
            // Profiles without a position always pass the pre-filter
            builder
                .push(" AND (latitude IS NULL OR longitude IS NULL OR (latitude BETWEEN ")
                .push_bind(bbox.min_lat)
                .push(" AND ")
                .push_bind(bbox.max_lat)
                .push(" AND longitude BETWEEN ")
                .push_bind(bbox.min_lon)
                .push(" AND ")
                .push_bind(bbox.max_lon)
                .push("))");
        }
        builder.push(" ORDER BY id");
        if let Some(limit) = query.limit {
            builder.push(" LIMIT ").push_bind(limit as i64);
        }
        if let Some(offset) = query.offset {
            builder.push(" OFFSET ").push_bind(offset as i64);
        }

        let rows = builder.build().fetch_all(&self.pool).await?;
        let profiles = rows
            .iter()
            .map(profile_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        tracing::debug!("Profile query returned {} rows", profiles.len());
        Ok(profiles)
    }
}

#[async_trait]
impl OfferStore for PostgresStore {
    async fn insert(&self, offer: &ActivityOffer) -> Result<(), StoreError> {
        insert_offer(&self.pool, offer).await
    }

    async fn publish(
        &self,
        offer: &ActivityOffer,
        daily_offers_count: u32,
        daily_offers_reset_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE profiles SET daily_offers_count = $2, daily_offers_reset_at = $3 WHERE id = $1",
        )
        .bind(&offer.creator_id)
        .bind(daily_offers_count as i32)
        .bind(daily_offers_reset_at)
        .execute(&mut *tx)
        .await?;
        if updated.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("profile {}", offer.creator_id)));
        }

        insert_offer(&mut *tx, offer).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<ActivityOffer, StoreError> {
        let query = format!("SELECT {} FROM offers WHERE id = $1", OFFER_COLUMNS);
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("offer {}", id)))?;

        Ok(offer_from_row(&row)?)
    }

    async fn update_status(
        &self,
        id: Uuid,
        from: OfferStatus,
        to: OfferStatus,
    ) -> Result<bool, StoreError> {
        if !from.can_transition_to(to) {
            self.ensure_offer_exists(id).await?;
            return Ok(false);
        }

        let result = sqlx::query("UPDATE offers SET status = $3 WHERE id = $1 AND status = $2")
            .bind(id)
            .bind(from)
            .bind(to)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            self.ensure_offer_exists(id).await?;
            return Ok(false);
        }

        self.changes.publish(StoreChange::OfferStatusChanged {
            offer_id: id,
            status: to,
        });
        Ok(true)
    }

    async fn query(&self, query: &OfferQuery) -> Result<Vec<ActivityOffer>, StoreError> {
        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {} FROM offers WHERE TRUE", OFFER_COLUMNS));

        if let Some(status) = query.status {
            builder.push(" AND status = ").push_bind(status);
        }
        if let Some(creator_id) = &query.creator_id {
            builder.push(" AND creator_id = ").push_bind(creator_id.clone());
        }
        if let Some(creator_id) = &query.exclude_creator_id {
            builder.push(" AND creator_id <> ").push_bind(creator_id.clone());
        }
        if let Some(not_before) = query.event_not_before {
            builder.push(" AND event_at >= ").push_bind(not_before);
        }
        if let Some(ids) = &query.ids {
            builder.push(" AND id = ANY(").push_bind(ids.clone()).push(")");
        }
        if !query.exclude_ids.is_empty() {
            builder
                .push(" AND NOT (id = ANY(")
                .push_bind(query.exclude_ids.clone())
                .push("))");
        }
        builder.push(" ORDER BY created_at DESC, id ASC");
        if let Some(limit) = query.limit {
            builder.push(" LIMIT ").push_bind(limit as i64);
        }
        if let Some(offset) = query.offset {
            builder.push(" OFFSET ").push_bind(offset as i64);
        }

        let rows = builder.build().fetch_all(&self.pool).await?;
        let offers = rows
            .iter()
            .map(offer_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        tracing::debug!("Offer query returned {} rows", offers.len());
        Ok(offers)
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM offers WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn expire_before(&self, now: DateTime<Utc>) -> Result<Vec<Uuid>, StoreError> {
        let rows = sqlx::query(
            "UPDATE offers SET status = 'expired' WHERE status = 'active' AND event_at < $1 RETURNING id",
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        let expired: Vec<Uuid> = rows.iter().map(|row| row.get("id")).collect();
        for id in &expired {
            self.changes.publish(StoreChange::OfferStatusChanged {
                offer_id: *id,
                status: OfferStatus::Expired,
            });
        }
        Ok(expired)
    }
}

async fn insert_offer<'e, E>(executor: E, offer: &ActivityOffer) -> Result<(), StoreError>
where
    E: sqlx::Executor<'e, Database = Postgres>,
{
    let query = r#"
        INSERT INTO offers (id, creator_id, title, description, city, district, latitude,
                            longitude, event_at, capacity, offer_type, category, status, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
    "#;

    sqlx::query(query)
        .bind(offer.id)
        .bind(&offer.creator_id)
        .bind(&offer.title)
        .bind(&offer.description)
        .bind(&offer.city)
        .bind(offer.district.as_deref())
        .bind(offer.coordinates.map(|c| c.latitude))
        .bind(offer.coordinates.map(|c| c.longitude))
        .bind(offer.event_at)
        .bind(offer.capacity as i16)
        .bind(offer.offer_type)
        .bind(offer.category)
        .bind(offer.status)
        .bind(offer.created_at)
        .execute(executor)
        .await?;

    tracing::debug!("Inserted offer {}", offer.id);
    Ok(())
}

#[async_trait]
impl RequestStore for PostgresStore {
    async fn get(&self, id: Uuid) -> Result<OfferRequest, StoreError> {
        let query = format!("SELECT {} FROM offer_requests r WHERE r.id = $1", REQUEST_COLUMNS);
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("request {}", id)))?;

        Ok(request_from_row(&row)?)
    }

    async fn query(&self, query: &RequestQuery) -> Result<Vec<OfferRequest>, StoreError> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "SELECT {} FROM offer_requests r JOIN offers o ON o.id = r.offer_id WHERE TRUE",
            REQUEST_COLUMNS
        ));

        if let Some(requester_id) = &query.requester_id {
            builder.push(" AND r.requester_id = ").push_bind(requester_id.clone());
        }
        if let Some(creator_id) = &query.creator_id {
            builder.push(" AND o.creator_id = ").push_bind(creator_id.clone());
        }
        if let Some(offer_ids) = &query.offer_ids {
            builder
                .push(" AND r.offer_id = ANY(")
                .push_bind(offer_ids.clone())
                .push(")");
        }
        if let Some(status) = query.status {
            builder.push(" AND r.status = ").push_bind(status);
        }
        builder.push(" ORDER BY r.created_at, r.id");

        let rows = builder.build().fetch_all(&self.pool).await?;
        Ok(rows
            .iter()
            .map(request_from_row)
            .collect::<Result<Vec<_>, _>>()?)
    }

    async fn count_sent_since(
        &self,
        requester_id: &str,
        since: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS sent FROM offer_requests WHERE requester_id = $1 AND created_at >= $2",
        )
        .bind(requester_id)
        .bind(since)
        .fetch_one(&self.pool)
        .await?;

        let sent: i64 = row.get("sent");
        Ok(sent.max(0) as u64)
    }

    async fn create_request(
        &self,
        request: &OfferRequest,
        charge_free_tier: bool,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        let query = r#"
            INSERT INTO offer_requests (id, offer_id, requester_id, message, suggested_at,
                                        location, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT DO NOTHING
        "#;
        let inserted = sqlx::query(query)
            .bind(request.id)
            .bind(request.offer_id)
            .bind(&request.requester_id)
            .bind(request.message.as_deref())
            .bind(request.suggested_at)
            .bind(request.location.as_deref())
            .bind(request.status)
            .bind(request.created_at)
            .bind(request.updated_at)
            .execute(&mut *tx)
            .await?;
        if inserted.rows_affected() == 0 {
            return Err(StoreError::Conflict(format!(
                "{} already has an active request on offer {}",
                request.requester_id, request.offer_id
            )));
        }

        let counters = sqlx::query(
            r#"
            UPDATE profiles SET
                total_requests_sent = total_requests_sent + 1,
                free_offers_used = free_offers_used + CASE WHEN $2 THEN 1 ELSE 0 END
            WHERE id = $1
            "#,
        )
        .bind(&request.requester_id)
        .bind(charge_free_tier)
        .execute(&mut *tx)
        .await?;
        if counters.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("profile {}", request.requester_id)));
        }

        tx.commit().await?;
        self.changes.publish(StoreChange::RequestCreated {
            request_id: request.id,
            offer_id: request.offer_id,
        });
        Ok(())
    }

    async fn accept_request(&self, acceptance: &Acceptance) -> Result<AcceptOutcome, StoreError> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE offer_requests SET status = 'accepted', updated_at = $2 WHERE id = $1 AND status = 'pending'",
        )
        .bind(acceptance.request_id)
        .bind(acceptance.accepted_at)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            let exists = sqlx::query("SELECT 1 FROM offer_requests WHERE id = $1")
                .bind(acceptance.request_id)
                .fetch_optional(&mut *tx)
                .await?
                .is_some();
            if !exists {
                return Err(StoreError::NotFound(format!("request {}", acceptance.request_id)));
            }
            return Ok(AcceptOutcome::NotPending);
        }

        lock_pair(&mut tx, &acceptance.creator_id, &acceptance.requester_id).await?;
        let match_created = insert_pair_in(
            &mut tx,
            &acceptance.creator_id,
            &acceptance.requester_id,
            Some(acceptance.offer_id),
            acceptance.accepted_at,
        )
        .await?;

        let completed = sqlx::query(
            "UPDATE offers SET status = 'completed' WHERE id = $1 AND status = 'active'",
        )
        .bind(acceptance.offer_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        self.changes.publish(StoreChange::RequestStatusChanged {
            request_id: acceptance.request_id,
            status: RequestStatus::Accepted,
        });
        if match_created {
            self.changes.publish(StoreChange::MatchPairCreated {
                user_a: acceptance.creator_id.clone(),
                user_b: acceptance.requester_id.clone(),
            });
        }
        if completed.rows_affected() > 0 {
            self.changes.publish(StoreChange::OfferStatusChanged {
                offer_id: acceptance.offer_id,
                status: OfferStatus::Completed,
            });
        }

        tracing::debug!(
            "Accepted request {} (match created: {})",
            acceptance.request_id,
            match_created
        );
        Ok(AcceptOutcome::Accepted { match_created })
    }

    async fn reject_request(&self, request_id: Uuid, at: DateTime<Utc>) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE offer_requests SET status = 'rejected', updated_at = $2 WHERE id = $1 AND status = 'pending'",
        )
        .bind(request_id)
        .bind(at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            let exists = sqlx::query("SELECT 1 FROM offer_requests WHERE id = $1")
                .bind(request_id)
                .fetch_optional(&self.pool)
                .await?
                .is_some();
            if !exists {
                return Err(StoreError::NotFound(format!("request {}", request_id)));
            }
            return Ok(false);
        }

        self.changes.publish(StoreChange::RequestStatusChanged {
            request_id,
            status: RequestStatus::Rejected,
        });
        Ok(true)
    }
}

#[async_trait]
impl MatchStore for PostgresStore {
    async fn insert_pair(
        &self,
        user_a: &str,
        user_b: &str,
        offer_id: Option<Uuid>,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;
        lock_pair(&mut tx, user_a, user_b).await?;
        let created = insert_pair_in(&mut tx, user_a, user_b, offer_id, at).await?;
        tx.commit().await?;

        if created {
            self.changes.publish(StoreChange::MatchPairCreated {
                user_a: user_a.to_string(),
                user_b: user_b.to_string(),
            });
        }
        Ok(created)
    }

    async fn delete_pair(&self, user_a: &str, user_b: &str) -> Result<usize, StoreError> {
        let result = sqlx::query(
            r#"
            DELETE FROM matches
            WHERE (sender_id = $1 AND receiver_id = $2)
               OR (sender_id = $2 AND receiver_id = $1)
            "#,
        )
        .bind(user_a)
        .bind(user_b)
        .execute(&self.pool)
        .await?;

        let removed = result.rows_affected() as usize;
        if removed > 0 {
            self.changes.publish(StoreChange::MatchPairDeleted {
                user_a: user_a.to_string(),
                user_b: user_b.to_string(),
            });
        }
        Ok(removed)
    }

    async fn query_by_user(&self, user_id: &str) -> Result<Vec<MatchRecord>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, sender_id, receiver_id, offer_id, created_at
            FROM matches
            WHERE sender_id = $1 OR receiver_id = $1
            ORDER BY created_at
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(match_from_row)
            .collect::<Result<Vec<_>, _>>()?)
    }
}

#[async_trait]
impl PackageStore for PostgresStore {
    async fn latest_usable(
        &self,
        owner_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Package>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, owner_id, quota_limit, expires_at, is_active, created_at
            FROM packages
            WHERE owner_id = $1
              AND is_active
              AND (expires_at IS NULL OR expires_at > $2)
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(owner_id)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(package_from_row).transpose()?)
    }

    async fn insert(&self, package: &Package) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO packages (id, owner_id, quota_limit, expires_at, is_active, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(package.id)
        .bind(&package.owner_id)
        .bind(package.quota_limit.map(|l| l as i32))
        .bind(package.expires_at)
        .bind(package.is_active)
        .bind(package.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl MessageStore for PostgresStore {
    async fn count_unread(&self, user_id: &str, from: Option<&str>) -> Result<u64, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS unread
            FROM messages
            WHERE receiver_id = $1
              AND read_at IS NULL
              AND ($2::text IS NULL OR sender_id = $2)
            "#,
        )
        .bind(user_id)
        .bind(from)
        .fetch_one(&self.pool)
        .await?;

        let unread: i64 = row.get("unread");
        Ok(unread.max(0) as u64)
    }

    async fn latest_per_conversation(
        &self,
        user_id: &str,
    ) -> Result<HashMap<String, DateTime<Utc>>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT CASE WHEN sender_id = $1 THEN receiver_id ELSE sender_id END AS partner,
                   MAX(sent_at) AS last_at
            FROM messages
            WHERE sender_id = $1 OR receiver_id = $1
            GROUP BY partner
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| (row.get("partner"), row.get("last_at")))
            .collect())
    }
}

#[async_trait]
impl SwipeStore for PostgresStore {
    async fn record(&self, record: &SwipeRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO swipes (sender_id, receiver_id, status, created_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (sender_id, receiver_id)
            DO UPDATE SET
                status = EXCLUDED.status,
                created_at = EXCLUDED.created_at
            "#,
        )
        .bind(&record.sender_id)
        .bind(&record.receiver_id)
        .bind(record.status)
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;

        tracing::debug!(
            "Recorded swipe: {} -> {} ({:?})",
            record.sender_id,
            record.receiver_id,
            record.status
        );
        Ok(())
    }

    async fn get(
        &self,
        sender_id: &str,
        receiver_id: &str,
    ) -> Result<Option<SwipeRecord>, StoreError> {
        let row = sqlx::query(
            "SELECT sender_id, receiver_id, status, created_at FROM swipes WHERE sender_id = $1 AND receiver_id = $2",
        )
        .bind(sender_id)
        .bind(receiver_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(swipe_from_row).transpose()?)
    }

    async fn history(&self, user_id: &str) -> Result<Vec<SwipeRecord>, StoreError> {
        let rows = sqlx::query(
            "SELECT sender_id, receiver_id, status, created_at FROM swipes WHERE sender_id = $1",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        let history = rows
            .iter()
            .map(swipe_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        tracing::debug!("User {} has swiped {} profiles", user_id, history.len());
        Ok(history)
    }

    async fn complete_match(
        &self,
        user_a: &str,
        user_b: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;
        lock_pair(&mut tx, user_a, user_b).await?;

        sqlx::query(
            r#"
            INSERT INTO swipes (sender_id, receiver_id, status, created_at)
            VALUES ($1, $2, $3, $4), ($2, $1, $3, $4)
            ON CONFLICT (sender_id, receiver_id)
            DO UPDATE SET status = EXCLUDED.status
            "#,
        )
        .bind(user_a)
        .bind(user_b)
        .bind(SwipeStatus::Matched)
        .bind(at)
        .execute(&mut *tx)
        .await?;

        let created = insert_pair_in(&mut tx, user_a, user_b, None, at).await?;
        tx.commit().await?;

        if created {
            self.changes.publish(StoreChange::MatchPairCreated {
                user_a: user_a.to_string(),
                user_b: user_b.to_string(),
            });
        }
        Ok(created)
    }
}
