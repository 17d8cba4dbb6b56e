//! Uniswap V3 single-pool swaps.
//!
//! Pools are discovered through the factory for each fee tier and cached per
//! unordered token pair. At conversion time the pool with the deepest
//! in-range liquidity wins.

use alloy::primitives::{address, Address, U256};
use anyhow::{bail, Result};
use async_trait::async_trait;
use futures::future::join_all;
use smallvec::SmallVec;
use std::collections::HashMap;
use tracing::{debug, warn};

use super::{LiquidityVenue, PoolCandidate, Route, RouteCache, ToConvert, VenueContext};
use crate::executor::ExecutorEncoder;

/// Fee tiers queried during discovery, in hundredths of a basis point.
pub const FEE_TIERS: [u32; 3] = [500, 3000, 10000];

const DEFAULT_FACTORY: Address = address!("1F98431c8aD98523631AE4a59f267346ea31F984");
const DEFAULT_ROUTER: Address = address!("E592427A0AEce92De3Edee1F18E0157C05861564");
const L2_FACTORY: Address = address!("33128a8fC17869897dcE68Ed026d694621f6FDfD");

/// Factory and SwapRouter for one chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniswapV3Addresses {
    pub factory: Address,
    pub router: Address,
}

impl Default for UniswapV3Addresses {
    fn default() -> Self {
        Self {
            factory: DEFAULT_FACTORY,
            router: DEFAULT_ROUTER,
        }
    }
}

impl UniswapV3Addresses {
    /// Known deployment for `chain_id`, falling back to the mainnet addresses.
    pub fn for_chain(chain_id: u64) -> Self {
        match chain_id {
            // Base, Arbitrum
            8453 | 42161 => Self {
                factory: L2_FACTORY,
                router: DEFAULT_ROUTER,
            },
            _ => Self::default(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct UniswapV3Venue {
    /// Per-chain overrides; chains not listed use [`UniswapV3Addresses::for_chain`].
    addresses: HashMap<u64, UniswapV3Addresses>,
}

impl UniswapV3Venue {
    const ID: &'static str = "uniswap_v3";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_addresses(mut self, chain_id: u64, addresses: UniswapV3Addresses) -> Self {
        self.addresses.insert(chain_id, addresses);
        self
    }

    pub fn addresses(&self, chain_id: u64) -> UniswapV3Addresses {
        self.addresses
            .get(&chain_id)
            .copied()
            .unwrap_or_else(|| UniswapV3Addresses::for_chain(chain_id))
    }

    fn pair_key(a: Address, b: Address) -> (Address, Address) {
        if a < b {
            (a, b)
        } else {
            (b, a)
        }
    }

    /// Existing pools for the pair, discovered once per pair.
    async fn pools(
        &self,
        ctx: &VenueContext<'_>,
        cache: &RouteCache,
        src: Address,
        dst: Address,
    ) -> Result<SmallVec<[PoolCandidate; 3]>> {
        let (token_a, token_b) = Self::pair_key(src, dst);
        if let Some(route) = cache.get(Self::ID, token_a, token_b) {
            return Ok(match route {
                Route::Pools(pools) => pools,
                _ => SmallVec::new(),
            });
        }

        let factory = self.addresses(ctx.chain_id).factory;
        let lookups = FEE_TIERS.iter().map(|&fee| async move {
            let pool = ctx.reader.uniswap_v3_pool(factory, token_a, token_b, fee).await;
            (fee, pool)
        });

        let mut pools = SmallVec::<[PoolCandidate; 3]>::new();
        for (fee, result) in join_all(lookups).await {
            match result {
                Ok(pool) if !pool.is_zero() => pools.push(PoolCandidate { pool, fee }),
                Ok(_) => {}
                // Do not cache a partial view.
                Err(e) => return Err(e),
            }
        }

        debug!(token_a = %token_a, token_b = %token_b, pools = pools.len(), "Uniswap V3 pools discovered");
        let route = if pools.is_empty() {
            Route::Unsupported
        } else {
            Route::Pools(pools.clone())
        };
        cache.insert(Self::ID, token_a, token_b, route);
        Ok(pools)
    }
}

#[async_trait]
impl LiquidityVenue for UniswapV3Venue {
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
        Ok(!self.pools(ctx, cache, src, dst).await?.is_empty())
    }

    async fn convert(
        &self,
        ctx: &VenueContext<'_>,
        cache: &RouteCache,
        encoder: &mut ExecutorEncoder,
        to_convert: ToConvert,
    ) -> Result<ToConvert> {
        let ToConvert {
            src,
            dst,
            src_amount,
        } = to_convert;

        let pools = self.pools(ctx, cache, src, dst).await?;
        let liquidities = join_all(pools.iter().map(|candidate| async move {
            let liquidity = ctx.reader.uniswap_v3_liquidity(candidate.pool).await;
            (*candidate, liquidity)
        }))
        .await;

        let mut best: Option<(PoolCandidate, u128)> = None;
        for (candidate, liquidity) in liquidities {
            match liquidity {
                Ok(liquidity) => {
                    if best.map_or(true, |(_, current)| liquidity > current) {
                        best = Some((candidate, liquidity));
                    }
                }
                Err(e) => {
                    warn!(pool = %candidate.pool, error = %e, "Failed to read pool liquidity");
                }
            }
        }

        let Some((pool, liquidity)) = best else {
            bail!("No Uniswap V3 pool for {} -> {}", src, dst);
        };
        debug!(pool = %pool.pool, fee = pool.fee, liquidity, "Selected Uniswap V3 pool");

        let router = self.addresses(ctx.chain_id).router;
        encoder
            .erc20_approve(src, router, src_amount)
            .uniswap_v3_exact_input_single(router, src, dst, pool.fee, src_amount);

        // Swapped in full; nothing left for later venues.
        Ok(ToConvert::new(dst, dst, U256::ZERO))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::ISwapRouter;
    use crate::testing::MockChain;
    use alloy::sol_types::SolCall;

    fn collateral() -> Address {
        Address::repeat_byte(0x0b)
    }

    fn loan() -> Address {
        Address::repeat_byte(0x0a)
    }

    #[test]
    fn test_chain_addresses() {
        assert_eq!(UniswapV3Addresses::for_chain(1).factory, DEFAULT_FACTORY);
        assert_eq!(UniswapV3Addresses::for_chain(8453).factory, L2_FACTORY);
        assert_eq!(UniswapV3Addresses::for_chain(8453).router, DEFAULT_ROUTER);

        let custom = UniswapV3Addresses {
            factory: Address::repeat_byte(1),
            router: Address::repeat_byte(2),
        };
        let venue = UniswapV3Venue::new().with_addresses(1, custom);
        assert_eq!(venue.addresses(1), custom);
    }

    #[tokio::test]
    async fn test_picks_deepest_pool() {
        let chain = MockChain::new();
        let factory = DEFAULT_FACTORY;
        let shallow = Address::repeat_byte(0x50);
        let deep = Address::repeat_byte(0x51);
        chain.set_uniswap_pool(factory, collateral(), loan(), 500, shallow);
        chain.set_uniswap_pool(factory, collateral(), loan(), 3000, deep);
        chain.set_uniswap_liquidity(shallow, 1_000);
        chain.set_uniswap_liquidity(deep, 9_000);

        let ctx = VenueContext::new(1, &chain);
        let cache = RouteCache::new();
        let venue = UniswapV3Venue::new();

        assert!(venue.supports_route(&ctx, &cache, collateral(), loan()).await.unwrap());

        let mut encoder = ExecutorEncoder::new(Address::repeat_byte(0xee));
        let next = venue
            .convert(
                &ctx,
                &cache,
                &mut encoder,
                ToConvert::new(collateral(), loan(), U256::from(77)),
            )
            .await
            .unwrap();

        assert_eq!(next, ToConvert::new(loan(), loan(), U256::ZERO));
        let calls = encoder.flush();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].target, DEFAULT_ROUTER);

        let swap = ISwapRouter::exactInputSingleCall::abi_decode(&calls[1].callData, true).unwrap();
        assert_eq!(swap.params.fee.to::<u32>(), 3000);
        assert_eq!(swap.params.amountIn, U256::from(77));
        assert_eq!(swap.params.recipient, Address::repeat_byte(0xee));
    }

    #[tokio::test]
    async fn test_discovery_is_cached_for_both_directions() {
        let chain = MockChain::new();
        chain.set_uniswap_pool(DEFAULT_FACTORY, collateral(), loan(), 500, Address::repeat_byte(0x50));

        let ctx = VenueContext::new(1, &chain);
        let cache = RouteCache::new();
        let venue = UniswapV3Venue::new();

        assert!(venue.supports_route(&ctx, &cache, collateral(), loan()).await.unwrap());
        assert!(venue.supports_route(&ctx, &cache, loan(), collateral()).await.unwrap());
        assert_eq!(chain.get_pool_calls(), FEE_TIERS.len());
    }

    #[tokio::test]
    async fn test_no_pool_is_unsupported() {
        let chain = MockChain::new();
        let ctx = VenueContext::new(1, &chain);
        let cache = RouteCache::new();
        let venue = UniswapV3Venue::new();

        assert!(!venue.supports_route(&ctx, &cache, collateral(), loan()).await.unwrap());
        assert!(!venue.supports_route(&ctx, &cache, loan(), loan()).await.unwrap());
    }
}
