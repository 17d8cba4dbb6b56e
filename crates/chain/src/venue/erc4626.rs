//! ERC-4626 vault share redemption.

use alloy::primitives::Address;
use anyhow::Result;
use async_trait::async_trait;
use tracing::debug;

use super::{LiquidityVenue, Route, RouteCache, ToConvert, VenueContext};
use crate::executor::ExecutorEncoder;

/// Redeems vault shares into the vault's underlying asset.
#[derive(Debug, Clone, Copy, Default)]
pub struct Erc4626Venue;

impl Erc4626Venue {
    const ID: &'static str = "erc4626";

    pub fn new() -> Self {
        Self
    }

    /// Underlying asset of `src`. Only the contract's own answer is cached,
    /// once per token; the key ignores `dst` since the answer does not depend
    /// on it. Read failures are returned uncached.
    async fn underlying(
        &self,
        ctx: &VenueContext<'_>,
        cache: &RouteCache,
        src: Address,
    ) -> Result<Option<Address>> {
        if let Some(route) = cache.get(Self::ID, src, Address::ZERO) {
            return Ok(match route {
                Route::Underlying(asset) => Some(asset),
                _ => None,
            });
        }

        let route = match ctx.reader.erc4626_asset(src).await? {
            Some(asset) if !asset.is_zero() => Route::Underlying(asset),
            _ => {
                debug!(token = %src, "Not an ERC-4626 vault");
                Route::Unsupported
            }
        };
        cache.insert(Self::ID, src, Address::ZERO, route.clone());

        Ok(match route {
            Route::Underlying(asset) => Some(asset),
            _ => None,
        })
    }
}

#[async_trait]
impl LiquidityVenue for Erc4626Venue {
    fn venue_id(&self) -> &'static str {
        Self::ID
    }

    async fn supports_route(
        &self,
        ctx: &VenueContext<'_>,
        cache: &RouteCache,
        src: Address,
        dst: Address,
    ) -> Result<bool> {
        if src == dst {
            return Ok(false);
        }
        Ok(self.underlying(ctx, cache, src).await?.is_some())
    }

    async fn convert(
        &self,
        ctx: &VenueContext<'_>,
        cache: &RouteCache,
        encoder: &mut ExecutorEncoder,
        to_convert: ToConvert,
    ) -> Result<ToConvert> {
        let Some(underlying) = self.underlying(ctx, cache, to_convert.src).await? else {
            return Ok(to_convert);
        };

        let assets = ctx
            .reader
            .erc4626_preview_redeem(to_convert.src, to_convert.src_amount)
            .await?;
        if assets.is_zero() {
            return Ok(to_convert);
        }

        encoder.erc4626_redeem(to_convert.src, to_convert.src_amount);
        Ok(ToConvert::new(underlying, to_convert.dst, assets))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockChain;
    use alloy::primitives::U256;

    fn vault() -> Address {
        Address::repeat_byte(0x46)
    }

    #[tokio::test]
    async fn test_redeems_vault_shares() {
        let underlying = Address::repeat_byte(2);
        let loan = Address::repeat_byte(3);
        let chain = MockChain::new();
        chain.set_vault(vault(), underlying);
        chain.set_preview_redeem(vault(), U256::from(105));

        let ctx = VenueContext::new(1, &chain);
        let cache = RouteCache::new();
        let venue = Erc4626Venue::new();

        assert!(venue.supports_route(&ctx, &cache, vault(), loan).await.unwrap());

        let mut encoder = ExecutorEncoder::new(Address::repeat_byte(0xee));
        let next = venue
            .convert(&ctx, &cache, &mut encoder, ToConvert::new(vault(), loan, U256::from(100)))
            .await
            .unwrap();

        assert_eq!(next, ToConvert::new(underlying, loan, U256::from(105)));
        assert_eq!(encoder.len(), 1);
    }

    #[tokio::test]
    async fn test_non_vault_is_unsupported_and_cached() {
        let chain = MockChain::new();
        let ctx = VenueContext::new(1, &chain);
        let cache = RouteCache::new();
        let venue = Erc4626Venue::new();
        let token = Address::repeat_byte(7);

        assert!(!venue.supports_route(&ctx, &cache, token, Address::repeat_byte(3)).await.unwrap());
        assert!(!venue.supports_route(&ctx, &cache, token, Address::repeat_byte(4)).await.unwrap());
        assert_eq!(chain.asset_calls(), 1);
    }

    #[tokio::test]
    async fn test_failed_read_is_not_cached() {
        let chain = MockChain::new();
        chain.set_vault(vault(), Address::repeat_byte(2));
        chain.fail_asset_reads(1);

        let ctx = VenueContext::new(1, &chain);
        let cache = RouteCache::new();
        let venue = Erc4626Venue::new();
        let loan = Address::repeat_byte(3);

        assert!(venue.supports_route(&ctx, &cache, vault(), loan).await.is_err());
        assert!(cache.is_empty());

        assert!(venue.supports_route(&ctx, &cache, vault(), loan).await.unwrap());
        assert!(venue.supports_route(&ctx, &cache, vault(), loan).await.unwrap());
        assert_eq!(chain.asset_calls(), 2);
    }

    #[tokio::test]
    async fn test_zero_preview_leaves_amount_unchanged() {
        let chain = MockChain::new();
        chain.set_vault(vault(), Address::repeat_byte(2));
        chain.set_preview_redeem(vault(), U256::ZERO);

        let ctx = VenueContext::new(1, &chain);
        let cache = RouteCache::new();
        let venue = Erc4626Venue::new();
        let input = ToConvert::new(vault(), Address::repeat_byte(3), U256::from(100));

        let mut encoder = ExecutorEncoder::new(Address::repeat_byte(0xee));
        let next = venue.convert(&ctx, &cache, &mut encoder, input).await.unwrap();

        assert_eq!(next, input);
        assert!(encoder.is_empty());
    }
}
