use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::QuotaSettings;
use crate::error::CoreResult;
use crate::models::{Package, Profile};
use crate::services::Stores;

/// Which allowance governs a user's next request, and how much of it is left
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "tier", rename_all = "snake_case")]
pub enum QuotaDecision {
    Premium,
    UnlimitedPackage,
    Package { used: u32, limit: u32 },
    Free { used: u32, limit: u32 },
}

impl QuotaDecision {
    pub fn allowed(&self) -> bool {
        match *self {
            QuotaDecision::Premium | QuotaDecision::UnlimitedPackage => true,
            QuotaDecision::Package { used, limit } | QuotaDecision::Free { used, limit } => {
                used < limit
            }
        }
    }

    /// `None` means unlimited
    pub fn remaining(&self) -> Option<u32> {
        match *self {
            QuotaDecision::Premium | QuotaDecision::UnlimitedPackage => None,
            QuotaDecision::Package { used, limit } | QuotaDecision::Free { used, limit } => {
                Some(limit.saturating_sub(used))
            }
        }
    }

    /// Every request consumes `free_offers_used` unless the user is premium or
    /// holds an unlimited package. Limited-package requests are charged too, so
    /// an expired package does not hand back a fresh free allowance.
    pub fn charges_free_tier(&self) -> bool {
        !matches!(self, QuotaDecision::Premium | QuotaDecision::UnlimitedPackage)
    }

    pub fn tier(&self) -> &'static str {
        match self {
            QuotaDecision::Premium => "premium",
            QuotaDecision::UnlimitedPackage => "unlimited_package",
            QuotaDecision::Package { .. } => "package",
            QuotaDecision::Free { .. } => "free",
        }
    }

    /// `(used, limit)` for limited tiers
    pub fn usage(&self) -> Option<(u32, u32)> {
        match *self {
            QuotaDecision::Package { used, limit } | QuotaDecision::Free { used, limit } => {
                Some((used, limit))
            }
            _ => None,
        }
    }
}

/// Decides whether a user may send another request.
///
/// Checking never mutates counters; `RequestLifecycle::create` is the only
/// place usage changes. Callers must pass a freshly read profile, a cached
/// one can over-approve.
#[derive(Debug, Clone, Copy)]
pub struct QuotaPolicy {
    settings: QuotaSettings,
}

impl QuotaPolicy {
    pub fn new(settings: QuotaSettings) -> Self {
        Self { settings }
    }

    pub fn free_offers_limit(&self) -> u32 {
        self.settings.free_offers_limit
    }

    /// Pure decision in strict priority order: premium, usable package, free tier.
    ///
    /// `sent_since_package` is the number of requests the user sent since the
    /// package's creation; it is ignored when no package applies.
    pub fn evaluate(
        &self,
        profile: &Profile,
        package: Option<&Package>,
        sent_since_package: u64,
        now: DateTime<Utc>,
    ) -> QuotaDecision {
        if profile.is_premium {
            return QuotaDecision::Premium;
        }

        if let Some(package) = package.filter(|p| p.owner_id == profile.id && p.is_usable(now)) {
            return match package.quota_limit {
                None => QuotaDecision::UnlimitedPackage,
                Some(limit) => QuotaDecision::Package {
                    used: u32::try_from(sent_since_package).unwrap_or(u32::MAX),
                    limit,
                },
            };
        }

        QuotaDecision::Free {
            used: profile.free_offers_used,
            limit: profile.free_limit(self.settings.free_offers_limit),
        }
    }

    /// Fetch the package state for `profile` and evaluate
    pub async fn check(
        &self,
        stores: &Stores,
        profile: &Profile,
        now: DateTime<Utc>,
    ) -> CoreResult<QuotaDecision> {
        if profile.is_premium {
            return Ok(QuotaDecision::Premium);
        }

        let package = stores.packages.latest_usable(&profile.id, now).await?;
        let sent = match &package {
            Some(p) if p.quota_limit.is_some() => {
                stores
                    .requests
                    .count_sent_since(&profile.id, p.created_at)
                    .await?
            }
            _ => 0,
        };

        let decision = self.evaluate(profile, package.as_ref(), sent, now);
        tracing::debug!("Quota for {}: {:?}", profile.id, decision);
        Ok(decision)
    }

    pub async fn can_send_request(
        &self,
        stores: &Stores,
        profile: &Profile,
        now: DateTime<Utc>,
    ) -> CoreResult<bool> {
        Ok(self.check(stores, profile, now).await?.allowed())
    }
}

impl Default for QuotaPolicy {
    fn default() -> Self {
        Self::new(QuotaSettings::default())
    }
}
