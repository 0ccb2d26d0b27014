use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::GatewayError;
use crate::venue_client::AccountInfo;

/// Fetches a fresh `AccountInfo` snapshot from the venue. Implemented by the
/// venue client so the cache itself stays venue-agnostic, mirroring
/// [`crate::exchange_info::SymbolRuleSource`].
#[async_trait]
pub trait AccountInfoSource: Send + Sync {
    async fn fetch_account_info(&self) -> Result<AccountInfo, GatewayError>;
}

struct Snapshot {
    info: AccountInfo,
    fetched_at: Instant,
}

/// Short-TTL cache (~30s) in front of `GetAccountInfo` (C6): account reads are
/// frequent and the venue rate-limits them. Double-checked refresh under a
/// write lock, same shape as [`crate::exchange_info::ExchangeInfoCache`].
pub struct AccountInfoCache {
    ttl: Duration,
    snapshot: RwLock<Option<Snapshot>>,
}

impl AccountInfoCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            snapshot: RwLock::new(None),
        }
    }

    fn is_stale(snapshot: &Option<Snapshot>, ttl: Duration) -> bool {
        match snapshot {
            None => true,
            Some(s) => s.fetched_at.elapsed() >= ttl,
        }
    }

    pub async fn get(
        &self,
        source: &dyn AccountInfoSource,
    ) -> Result<AccountInfo, GatewayError> {
        if Self::is_stale(&self.snapshot.read(), self.ttl) {
            self.refresh(source).await?;
        }

        let guard = self.snapshot.read();
        Ok(guard
            .as_ref()
            .expect("snapshot populated by refresh above")
            .info
            .clone())
    }

    async fn refresh(&self, source: &dyn AccountInfoSource) -> Result<(), GatewayError> {
        if !Self::is_stale(&self.snapshot.read(), self.ttl) {
            return Ok(());
        }

        let info = source.fetch_account_info().await?;

        let mut guard = self.snapshot.write();
        if Self::is_stale(&guard, self.ttl) {
            *guard = Some(Snapshot {
                info,
                fetched_at: Instant::now(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::venue_client::AssetBalance;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingSource {
        calls: AtomicU32,
    }

    #[async_trait]
    impl AccountInfoSource for CountingSource {
        async fn fetch_account_info(&self) -> Result<AccountInfo, GatewayError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(AccountInfo {
                balances: vec![AssetBalance {
                    asset: "BTC".to_owned(),
                    free: dec!(1),
                    locked: dec!(0),
                }],
            })
        }
    }

    #[tokio::test]
    async fn second_call_within_ttl_does_not_refetch() {
        let cache = AccountInfoCache::new(Duration::from_secs(60));
        let source = CountingSource { calls: AtomicU32::new(0) };

        cache.get(&source).await.expect("first fetch");
        cache.get(&source).await.expect("cached fetch");

        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn call_after_ttl_expiry_refetches() {
        let cache = AccountInfoCache::new(Duration::from_millis(10));
        let source = CountingSource { calls: AtomicU32::new(0) };

        cache.get(&source).await.expect("first fetch");
        tokio::time::sleep(Duration::from_millis(20)).await;
        cache.get(&source).await.expect("refreshed fetch");

        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }
}
