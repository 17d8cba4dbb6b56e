//! Liquidity venues and the conversion pipeline.
//!
//! A venue knows how to turn one token into another (unwrap, vault redeem,
//! DEX swap) by appending calls to an [`ExecutorEncoder`]. Venues hold no
//! per-position state: route discovery results live in a shared
//! [`RouteCache`] passed in by reference, so one venue instance serves many
//! positions concurrently.

mod erc20_wrapper;
mod erc4626;
mod uniswap_v3;

pub use erc20_wrapper::Erc20WrapperVenue;
pub use erc4626::Erc4626Venue;
pub use uniswap_v3::{UniswapV3Addresses, UniswapV3Venue, FEE_TIERS};

use alloy::primitives::{Address, U256};
use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use smallvec::SmallVec;
use std::fmt::Debug;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::executor::{Call, ExecutorEncoder};
use crate::reader::ChainReader;

/// Amount of `src` still to be turned into `dst`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToConvert {
    pub src: Address,
    pub dst: Address,
    pub src_amount: U256,
}

impl ToConvert {
    pub fn new(src: Address, dst: Address, src_amount: U256) -> Self {
        Self {
            src,
            dst,
            src_amount,
        }
    }

    /// Nothing left to convert.
    pub fn is_done(&self) -> bool {
        self.src == self.dst || self.src_amount.is_zero()
    }
}

/// Chain access handed to venues for one conversion.
#[derive(Debug, Clone, Copy)]
pub struct VenueContext<'a> {
    pub chain_id: u64,
    pub reader: &'a dyn ChainReader,
}

impl<'a> VenueContext<'a> {
    pub fn new(chain_id: u64, reader: &'a dyn ChainReader) -> Self {
        Self { chain_id, reader }
    }
}

/// A Uniswap-style pool found during route discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolCandidate {
    pub pool: Address,
    pub fee: u32,
}

/// Cached result of route discovery for one venue and token pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Unsupported,
    /// `src` unwraps or redeems into this token.
    Underlying(Address),
    /// Non-empty set of pools bridging the pair.
    Pools(SmallVec<[PoolCandidate; 3]>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct RouteKey {
    venue: &'static str,
    token_a: Address,
    token_b: Address,
}

/// Route discovery results shared by every position processed by a pipeline.
#[derive(Debug, Default)]
pub struct RouteCache {
    routes: DashMap<RouteKey, Route>,
}

impl RouteCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, venue: &'static str, token_a: Address, token_b: Address) -> Option<Route> {
        let key = RouteKey {
            venue,
            token_a,
            token_b,
        };
        self.routes.get(&key).map(|entry| entry.value().clone())
    }

    /// Store a route unless another task already discovered one.
    pub fn insert(&self, venue: &'static str, token_a: Address, token_b: Address, route: Route) {
        let key = RouteKey {
            venue,
            token_a,
            token_b,
        };
        self.routes.entry(key).or_insert(route);
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

#[async_trait]
pub trait LiquidityVenue: Send + Sync + Debug {
    /// Stable identifier, also the route cache namespace.
    fn venue_id(&self) -> &'static str;

    /// Whether this venue can make progress converting `src` towards `dst`.
    async fn supports_route(
        &self,
        ctx: &VenueContext<'_>,
        cache: &RouteCache,
        src: Address,
        dst: Address,
    ) -> Result<bool>;

    /// Append conversion calls and return what remains to convert.
    ///
    /// Only called after `supports_route` returned true for the same pair.
    async fn convert(
        &self,
        ctx: &VenueContext<'_>,
        cache: &RouteCache,
        encoder: &mut ExecutorEncoder,
        to_convert: ToConvert,
    ) -> Result<ToConvert>;
}

/// Result of running the pipeline for one position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Conversion {
    /// The calls fully bridge the original `src` into `dst`.
    Complete { calls: Vec<Call> },
    /// No venue chain reached `dst`; the encoded calls are discarded.
    Incomplete { remaining: ToConvert },
}

impl Conversion {
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Complete { .. })
    }
}

/// Ordered list of venues; the first venue supporting a pair handles it.
#[derive(Debug, Default)]
pub struct ConversionPipeline {
    venues: Vec<Arc<dyn LiquidityVenue>>,
    cache: RouteCache,
}

impl ConversionPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a venue. Order is significant.
    pub fn with_venue(mut self, venue: impl LiquidityVenue + 'static) -> Self {
        self.venues.push(Arc::new(venue));
        self
    }

    pub fn with_shared_venue(mut self, venue: Arc<dyn LiquidityVenue>) -> Self {
        self.venues.push(venue);
        self
    }

    pub fn venue_ids(&self) -> Vec<&'static str> {
        self.venues.iter().map(|v| v.venue_id()).collect()
    }

    pub fn cache(&self) -> &RouteCache {
        &self.cache
    }

    /// Walk the venues once, in order. Each venue gets at most one `convert`.
    ///
    /// A venue whose route discovery fails is treated as unsupported. A
    /// failing `convert` aborts the whole conversion.
    pub async fn convert(
        &self,
        ctx: &VenueContext<'_>,
        executor: Address,
        to_convert: ToConvert,
    ) -> Result<Conversion> {
        let mut encoder = ExecutorEncoder::new(executor);
        let mut current = to_convert;

        for venue in &self.venues {
            if current.is_done() {
                break;
            }

            let supported = match venue
                .supports_route(ctx, &self.cache, current.src, current.dst)
                .await
            {
                Ok(supported) => supported,
                Err(e) => {
                    warn!(venue = venue.venue_id(), src = %current.src, error = %e, "Route discovery failed");
                    false
                }
            };
            if !supported {
                continue;
            }

            let next = venue.convert(ctx, &self.cache, &mut encoder, current).await?;
            debug!(
                venue = venue.venue_id(),
                src = %current.src,
                next_src = %next.src,
                amount = %next.src_amount,
                "Venue converted"
            );
            current = next;
        }

        if current.src == current.dst {
            Ok(Conversion::Complete {
                calls: encoder.flush(),
            })
        } else {
            Ok(Conversion::Incomplete { remaining: current })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockChain;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn token(b: u8) -> Address {
        Address::repeat_byte(b)
    }

    /// Converts `from` into `to` one-for-one and counts invocations.
    #[derive(Debug)]
    struct StepVenue {
        id: &'static str,
        from: Address,
        to: Address,
        converts: AtomicUsize,
    }

    impl StepVenue {
        fn new(id: &'static str, from: Address, to: Address) -> Self {
            Self {
                id,
                from,
                to,
                converts: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl LiquidityVenue for StepVenue {
        fn venue_id(&self) -> &'static str {
            self.id
        }

        async fn supports_route(
            &self,
            _ctx: &VenueContext<'_>,
            _cache: &RouteCache,
            src: Address,
            _dst: Address,
        ) -> Result<bool> {
            Ok(src == self.from)
        }

        async fn convert(
            &self,
            _ctx: &VenueContext<'_>,
            _cache: &RouteCache,
            encoder: &mut ExecutorEncoder,
            to_convert: ToConvert,
        ) -> Result<ToConvert> {
            self.converts.fetch_add(1, Ordering::SeqCst);
            encoder.erc20_wrapper_withdraw_to(to_convert.src, to_convert.src_amount);
            Ok(ToConvert::new(self.to, to_convert.dst, to_convert.src_amount))
        }
    }

    #[tokio::test]
    async fn test_two_hop_conversion_completes() {
        let chain = MockChain::new();
        let ctx = VenueContext::new(1, &chain);
        let pipeline = ConversionPipeline::new()
            .with_venue(StepVenue::new("unwrap", token(1), token(2)))
            .with_venue(StepVenue::new("swap", token(2), token(3)));

        let result = pipeline
            .convert(&ctx, token(0xee), ToConvert::new(token(1), token(3), U256::from(10)))
            .await
            .unwrap();

        match result {
            Conversion::Complete { calls } => assert_eq!(calls.len(), 2),
            other => panic!("expected complete conversion, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_hop_is_incomplete() {
        let chain = MockChain::new();
        let ctx = VenueContext::new(1, &chain);
        let pipeline =
            ConversionPipeline::new().with_venue(StepVenue::new("unwrap", token(1), token(2)));

        let result = pipeline
            .convert(&ctx, token(0xee), ToConvert::new(token(1), token(3), U256::from(10)))
            .await
            .unwrap();

        assert_eq!(
            result,
            Conversion::Incomplete {
                remaining: ToConvert::new(token(2), token(3), U256::from(10))
            }
        );
    }

    #[tokio::test]
    async fn test_each_venue_converts_at_most_once() {
        let chain = MockChain::new();
        let ctx = VenueContext::new(1, &chain);
        // Cycle 1 -> 2 -> 1 never reaches 3.
        let forward = Arc::new(StepVenue::new("forward", token(1), token(2)));
        let back = Arc::new(StepVenue::new("back", token(2), token(1)));
        let pipeline = ConversionPipeline::new()
            .with_shared_venue(forward.clone())
            .with_shared_venue(back.clone());

        let result = pipeline
            .convert(&ctx, token(0xee), ToConvert::new(token(1), token(3), U256::from(10)))
            .await
            .unwrap();

        assert!(!result.is_complete());
        assert_eq!(forward.converts.load(Ordering::SeqCst), 1);
        assert_eq!(back.converts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_same_token_needs_no_calls() {
        let chain = MockChain::new();
        let ctx = VenueContext::new(1, &chain);
        let venue = Arc::new(StepVenue::new("unwrap", token(1), token(2)));
        let pipeline = ConversionPipeline::new().with_shared_venue(venue.clone());

        let result = pipeline
            .convert(&ctx, token(0xee), ToConvert::new(token(3), token(3), U256::from(10)))
            .await
            .unwrap();

        assert_eq!(result, Conversion::Complete { calls: Vec::new() });
        assert_eq!(venue.converts.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_route_cache_keeps_first_insert() {
        let cache = RouteCache::new();
        cache.insert("v", token(1), token(2), Route::Underlying(token(3)));
        cache.insert("v", token(1), token(2), Route::Unsupported);
        assert_eq!(cache.get("v", token(1), token(2)), Some(Route::Underlying(token(3))));
        assert_eq!(cache.get("w", token(1), token(2)), None);
        assert_eq!(cache.len(), 1);
    }
}
