//! Execution guard: build, simulate, price and submit one liquidation.

use alloy::primitives::{Address, B256, I256, U256};
use anyhow::Result;
use liquidator_api::PricerRegistry;
use liquidator_chain::{
    BundleSimulator, ChainReader, Conversion, ConversionPipeline, ExecutorEncoder, GasParams,
    SimulationRequest, Submitter, ToConvert, VenueContext,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, instrument, warn};

use crate::candidate::{LiquidationCandidate, LiquidationKind};
use crate::cooldown::CooldownTable;
use crate::eligibility::{liquidation_values, pre_liquidation_values, BorrowPosition, LiquidationValues};
use crate::market::{Market, MarketState, Position};
use crate::math::to_units_f64;

/// What happened to one liquidation attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptOutcome {
    /// Attempted within the cooldown window.
    CoolingDown,
    /// Fresh chain state no longer allows the liquidation.
    NotLiquidatable,
    /// No venue chain converts the collateral into the loan token.
    NoRoute,
    SimulationReverted { reason: Option<String> },
    /// A price needed for the profit check is missing.
    PriceUnavailable,
    Unprofitable { profit_usd: f64 },
    Executed { tx_hash: B256, profit_usd: Option<f64> },
    ExecutionFailed { error: String },
    /// Abandoned after the attempt timeout; a submitted transaction may still land.
    TimedOut,
}

impl AttemptOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::CoolingDown => "cooling_down",
            Self::NotLiquidatable => "not_liquidatable",
            Self::NoRoute => "no_route",
            Self::SimulationReverted { .. } => "simulation_reverted",
            Self::PriceUnavailable => "price_unavailable",
            Self::Unprofitable { .. } => "unprofitable",
            Self::Executed { .. } => "executed",
            Self::ExecutionFailed { .. } => "execution_failed",
            Self::TimedOut => "timed_out",
        }
    }

    pub fn is_executed(&self) -> bool {
        matches!(self, Self::Executed { .. })
    }
}

/// Liquidation executor for one chain.
#[derive(Debug)]
pub struct Liquidator {
    chain_id: u64,
    morpho: Address,
    executor: Address,
    wnative: Address,

    reader: Arc<dyn ChainReader>,
    pipeline: Arc<ConversionPipeline>,
    simulator: Arc<dyn BundleSimulator>,
    submitter: Arc<dyn Submitter>,

    /// Empty registry disables the profit check.
    pricers: PricerRegistry,
    cooldown: CooldownTable,

    min_profit_usd: f64,
    recompute_locally: bool,
    gas_limit_multiplier: f64,
}

impl Liquidator {
    pub fn new(
        chain_id: u64,
        morpho: Address,
        executor: Address,
        reader: Arc<dyn ChainReader>,
        pipeline: Arc<ConversionPipeline>,
        simulator: Arc<dyn BundleSimulator>,
        submitter: Arc<dyn Submitter>,
    ) -> Self {
        Self {
            chain_id,
            morpho,
            executor,
            wnative: Address::ZERO,
            reader,
            pipeline,
            simulator,
            submitter,
            pricers: PricerRegistry::new(),
            cooldown: CooldownTable::new(Duration::from_secs(60)),
            min_profit_usd: 0.0,
            recompute_locally: true,
            gas_limit_multiplier: 1.2,
        }
    }

    /// Enable the profit check; gas is priced through `wnative`.
    pub fn with_pricers(mut self, pricers: PricerRegistry, wnative: Address) -> Self {
        self.pricers = pricers;
        self.wnative = wnative;
        self
    }

    pub fn with_cooldown(mut self, window: Duration) -> Self {
        self.cooldown = CooldownTable::new(window);
        self
    }

    pub fn with_min_profit(mut self, min_profit_usd: f64) -> Self {
        self.min_profit_usd = min_profit_usd;
        self
    }

    pub fn with_recompute_locally(mut self, recompute_locally: bool) -> Self {
        self.recompute_locally = recompute_locally;
        self
    }

    pub fn with_gas_limit_multiplier(mut self, multiplier: f64) -> Self {
        self.gas_limit_multiplier = multiplier.max(1.0);
        self
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn cooldown(&self) -> &CooldownTable {
        &self.cooldown
    }

    pub fn profit_check_enabled(&self) -> bool {
        !self.pricers.is_empty()
    }

    /// Run one attempt end to end.
    ///
    /// The steps are sequential: each depends on the calls encoded before it.
    /// Errors are data unavailability (a chain or API read failed).
    #[instrument(skip(self, candidate), fields(market = %candidate.market_id, user = %candidate.user))]
    pub async fn attempt(&self, candidate: &LiquidationCandidate) -> Result<AttemptOutcome> {
        let start = Instant::now();

        if !self.cooldown.try_acquire(candidate.cooldown_key()) {
            debug!("Position is cooling down");
            return Ok(AttemptOutcome::CoolingDown);
        }

        let values = if self.recompute_locally {
            self.recompute(candidate).await?
        } else {
            candidate.values
        };
        if !values.is_actionable() {
            debug!("Position no longer liquidatable");
            return Ok(AttemptOutcome::NotLiquidatable);
        }

        let params = &candidate.market_params;
        let ctx = VenueContext::new(self.chain_id, self.reader.as_ref());
        let to_convert = ToConvert::new(params.collateralToken, params.loanToken, values.seizable_collateral);

        let callbacks = match self.pipeline.convert(&ctx, self.executor, to_convert).await? {
            Conversion::Complete { calls } => calls,
            Conversion::Incomplete { remaining } => {
                info!(
                    collateral = %params.collateralToken,
                    loan = %params.loanToken,
                    stuck_at = %remaining.src,
                    "No conversion route, skipping"
                );
                return Ok(AttemptOutcome::NoRoute);
            }
        };

        let mut encoder = ExecutorEncoder::new(self.executor);
        encoder.erc20_approve(params.loanToken, candidate.spender(self.morpho), U256::MAX);
        match candidate.kind {
            LiquidationKind::Hard => encoder.morpho_blue_liquidate(
                self.morpho,
                params,
                candidate.user,
                values.seizable_collateral,
                U256::ZERO,
                callbacks,
            ),
            LiquidationKind::Pre { address, .. } => encoder.pre_liquidate(
                address,
                candidate.user,
                values.seizable_collateral,
                U256::ZERO,
                callbacks,
            ),
        };
        let calldata = encoder.build();

        let request = SimulationRequest {
            from: self.submitter.address(),
            executor: self.executor,
            calldata: calldata.clone(),
            loan_token: params.loanToken,
        };
        let simulation = self.simulator.simulate(&request).await?;
        if !simulation.success {
            info!(reason = ?simulation.revert_reason, "Liquidation reverted in simulation");
            return Ok(AttemptOutcome::SimulationReverted {
                reason: simulation.revert_reason,
            });
        }

        let profit_usd = if self.profit_check_enabled() {
            let gas = self.submitter.gas_params().await?;
            let Some(profit) = self
                .profit_usd(params.loanToken, simulation.balance_delta(), &gas, simulation.gas_used)
                .await?
            else {
                warn!(loan = %params.loanToken, "Missing price for profit check");
                return Ok(AttemptOutcome::PriceUnavailable);
            };
            if profit <= self.min_profit_usd {
                info!(profit_usd = profit, min_profit_usd = self.min_profit_usd, "Skipping unprofitable liquidation");
                return Ok(AttemptOutcome::Unprofitable { profit_usd: profit });
            }
            Some(profit)
        } else {
            None
        };

        let gas_limit = (simulation.gas_used as f64 * self.gas_limit_multiplier).ceil() as u64;
        match self.submitter.submit(self.executor, calldata, gas_limit).await {
            Ok(tx_hash) => {
                info!(
                    tx_hash = %tx_hash,
                    seized = %values.seizable_collateral,
                    repaid = %values.repayable_assets,
                    pre_liquidation = candidate.is_pre_liquidation(),
                    profit_usd = ?profit_usd,
                    total_ms = start.elapsed().as_millis(),
                    "Liquidation executed"
                );
                Ok(AttemptOutcome::Executed { tx_hash, profit_usd })
            }
            Err(e) => {
                error!(error = %e, "Liquidation execution failed");
                Ok(AttemptOutcome::ExecutionFailed { error: e.to_string() })
            }
        }
    }

    /// Liquidation values from fresh chain state, projected to the latest block.
    async fn recompute(&self, candidate: &LiquidationCandidate) -> Result<LiquidationValues> {
        let params = &candidate.market_params;
        let id = candidate.market_id;

        let rate_at_target = async {
            if params.irm == Address::ZERO {
                Ok(I256::ZERO)
            } else {
                self.reader.irm_rate_at_target(params.irm, id).await
            }
        };
        let (raw_market, raw_position, rate_at_target, timestamp) = tokio::try_join!(
            self.reader.morpho_market(self.morpho, id),
            self.reader.morpho_position(self.morpho, id, candidate.user),
            rate_at_target,
            self.reader.block_timestamp(),
        )?;

        let market = Market::new(params.clone(), MarketState::from(raw_market), rate_at_target).accrue(timestamp);
        let position = Position::from_raw(candidate.user, raw_position);
        let borrow = BorrowPosition::new(position.collateral, position.borrow_shares, &market.state);

        let values = match candidate.kind {
            LiquidationKind::Hard => {
                let price = self.reader.oracle_price(params.oracle).await?;
                liquidation_values(&borrow, params.lltv, price)
            }
            LiquidationKind::Pre { address, params: pre_params, .. } => {
                if !self
                    .reader
                    .morpho_is_authorized(self.morpho, candidate.user, address)
                    .await?
                {
                    debug!(pre_liquidation = %address, "Pre-liquidation not authorized");
                    return Ok(LiquidationValues::ZERO);
                }
                let price = self.reader.oracle_price(pre_params.pre_liquidation_oracle).await?;
                pre_liquidation_values(&borrow, params.lltv, &pre_params, price)
            }
        };

        if values != candidate.values {
            debug!(
                indexed_seizable = %candidate.values.seizable_collateral,
                seizable = %values.seizable_collateral,
                "Recomputed liquidation values differ from indexer"
            );
        }
        Ok(values)
    }

    /// `loan gained in USD - gas spent in USD`, or `None` without prices.
    async fn profit_usd(
        &self,
        loan_token: Address,
        loan_gained: U256,
        gas: &GasParams,
        gas_used: u64,
    ) -> Result<Option<f64>> {
        let (loan_price, native_price) = tokio::join!(
            self.pricers.price(self.chain_id, loan_token),
            self.pricers.price(self.chain_id, self.wnative),
        );
        let (Some(loan_price), Some(native_price)) = (loan_price, native_price) else {
            return Ok(None);
        };

        let decimals = self.reader.erc20_decimals(loan_token).await?;
        let gained_usd = to_units_f64(loan_gained, decimals) * loan_price;
        let gas_usd = to_units_f64(gas.cost(gas_used), 18) * native_price;

        debug!(gained_usd, gas_usd, "Estimated liquidation profit");
        Ok(Some(gained_usd - gas_usd))
    }
}
