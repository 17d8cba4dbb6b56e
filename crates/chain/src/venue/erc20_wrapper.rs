//! OpenZeppelin `ERC20Wrapper` unwrapping.

use alloy::primitives::Address;
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;

use super::{LiquidityVenue, RouteCache, ToConvert, VenueContext};
use crate::executor::ExecutorEncoder;

/// Unwraps configured wrapper tokens with `withdrawTo(executor, amount)`.
#[derive(Debug, Clone, Default)]
pub struct Erc20WrapperVenue {
    /// wrapper -> underlying
    wrappers: HashMap<Address, Address>,
}

impl Erc20WrapperVenue {
    pub fn new(wrappers: HashMap<Address, Address>) -> Self {
        Self { wrappers }
    }

    pub fn underlying(&self, wrapper: &Address) -> Option<Address> {
        self.wrappers.get(wrapper).copied()
    }
}

#[async_trait]
impl LiquidityVenue for Erc20WrapperVenue {
    fn venue_id(&self) -> &'static str {
        "erc20_wrapper"
    }

    async fn supports_route(
        &self,
        _ctx: &VenueContext<'_>,
        _cache: &RouteCache,
        src: Address,
        dst: Address,
    ) -> Result<bool> {
        Ok(src != dst && self.wrappers.contains_key(&src))
    }

    async fn convert(
        &self,
        _ctx: &VenueContext<'_>,
        _cache: &RouteCache,
        encoder: &mut ExecutorEncoder,
        to_convert: ToConvert,
    ) -> Result<ToConvert> {
        let Some(underlying) = self.underlying(&to_convert.src) else {
            return Ok(to_convert);
        };

        encoder.erc20_wrapper_withdraw_to(to_convert.src, to_convert.src_amount);
        Ok(ToConvert::new(underlying, to_convert.dst, to_convert.src_amount))
    }
}
