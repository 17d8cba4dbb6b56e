//! Morpho Blue Liquidation Bot
//!
//! Watches the markets of whitelisted vaults on each configured chain and
//! liquidates (or pre-liquidates) unhealthy positions through an executor
//! contract, converting seized collateral back to the loan token in the same
//! transaction.

use std::sync::Arc;

use anyhow::{Context, Result};
use futures::future::join_all;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use liquidator_api::{DefiLlamaPricer, IndexerClient, MorphoApiPricer, PricerRegistry};
use liquidator_chain::{
    BlockWatcher, ConversionPipeline, Erc20WrapperVenue, Erc4626Venue, ProviderManager,
    RpcSimulator, Submitter, TransactionSenderBuilder, UniswapV3Venue,
};
use liquidator_core::{
    chain_ids_from_env, config, init_config, BotConfig, ChainConfig, ChainSecrets, Liquidator, Scanner,
    ScannerSettings,
};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,liquidator_core=debug,liquidator_chain=debug")),
        )
        .init();

    // BOT_PROFILE selects testing, production, aggressive, or a TOML path
    init_config(BotConfig::from_env());
    let bot_config = config();
    bot_config.log_config();

    let chain_ids = chain_ids_from_env()?;
    info!(chains = ?chain_ids, "Starting Morpho Blue liquidation bot");

    let indexer = Arc::new(IndexerClient::new(
        bot_config.indexer.base_url.clone(),
        bot_config.indexer.timeout(),
    )?);

    let mut handles = Vec::new();
    for chain_id in chain_ids {
        // A chain that fails to start never blocks the others.
        match launch_chain(chain_id, bot_config, indexer.clone()).await {
            Ok(handle) => handles.push(handle),
            Err(e) => error!(chain_id, error = %e, "Failed to launch chain"),
        }
    }

    if handles.is_empty() {
        anyhow::bail!("No chain could be launched");
    }

    join_all(handles).await;
    Ok(())
}

async fn launch_chain(
    chain_id: u64,
    bot: &BotConfig,
    indexer: Arc<IndexerClient>,
) -> Result<tokio::task::JoinHandle<()>> {
    let chain = ChainConfig::load(chain_id)?;
    let secrets = ChainSecrets::from_env(&chain)?;
    info!(chain_id, name = %chain.name, executor = %secrets.executor, "Launching chain");

    let reader = Arc::new(
        ProviderManager::new(&secrets.rpc_url, chain_id)
            .await
            .with_context(|| format!("RPC for chain {chain_id}"))?,
    );

    let mut uniswap = UniswapV3Venue::new();
    if let Some(addresses) = chain.venues.uniswap_v3 {
        uniswap = uniswap.with_addresses(chain_id, addresses.into());
    }
    let pipeline = Arc::new(
        ConversionPipeline::new()
            .with_venue(Erc20WrapperVenue::new(chain.venues.wrapper_map()))
            .with_venue(Erc4626Venue)
            .with_venue(uniswap),
    );

    let sender = TransactionSenderBuilder::new(secrets.rpc_url.clone(), chain_id)
        .gas_config(&chain.gas)
        .receipt_timeout(bot.liquidation.receipt_timeout())
        .build(&secrets.private_key)
        .await?;
    info!(chain_id, address = %sender.address(), "Transaction sender initialized");

    let pricers = if chain.check_profit {
        PricerRegistry::new()
            .with_pricer(MorphoApiPricer::new())
            .with_pricer(DefiLlamaPricer::new())
    } else {
        PricerRegistry::new()
    };
    chain.validate_pricers(pricers.len())?;

    let liquidator = Arc::new(
        Liquidator::new(
            chain_id,
            chain.morpho,
            secrets.executor,
            reader,
            pipeline,
            Arc::new(RpcSimulator::new(secrets.rpc_url.clone())),
            Arc::new(sender),
        )
        .with_pricers(pricers, chain.wnative)
        .with_cooldown(bot.liquidation.cooldown())
        .with_min_profit(bot.liquidation.min_profit_usd)
        .with_recompute_locally(bot.liquidation.recompute_locally)
        .with_gas_limit_multiplier(bot.liquidation.gas_limit_multiplier),
    );

    let watcher = BlockWatcher::new(
        secrets.rpc_url.clone(),
        secrets.ws_url.clone(),
        bot.scanner.poll_interval(),
    );
    let blocks = watcher.stream().await?;

    let scanner = Arc::new(Scanner::new(
        ScannerSettings::new(&chain, bot),
        indexer,
        liquidator,
    ));

    Ok(tokio::spawn(scanner.run(blocks)))
}
