//! New-block notifications.
//!
//! Uses a `newHeads` WebSocket subscription when a WS endpoint is configured,
//! otherwise polls `eth_blockNumber`.

use alloy::providers::{Provider, ProviderBuilder, WsConnect};
use anyhow::Result;
use futures::stream::{Stream, StreamExt};
use std::pin::Pin;
use std::time::Duration;
use tracing::{info, warn};

pub type BlockStream = Pin<Box<dyn Stream<Item = u64> + Send>>;

#[derive(Debug, Clone)]
pub struct BlockWatcher {
    http_url: String,
    ws_url: Option<String>,
    poll_interval: Duration,
}

impl BlockWatcher {
    pub fn new(http_url: impl Into<String>, ws_url: Option<String>, poll_interval: Duration) -> Self {
        Self {
            http_url: http_url.into(),
            ws_url,
            poll_interval,
        }
    }

    /// Stream of new block numbers.
    pub async fn stream(&self) -> Result<BlockStream> {
        match &self.ws_url {
            Some(ws_url) => self.subscribe(ws_url).await,
            None => self.poll(),
        }
    }

    async fn subscribe(&self, ws_url: &str) -> Result<BlockStream> {
        let provider = ProviderBuilder::new().on_ws(WsConnect::new(ws_url)).await?;
        let sub = provider.subscribe_blocks().await?;
        info!(ws_url, "Subscribed to new block headers");

        // The provider lives in the stream state; dropping it closes the socket.
        let blocks = futures::stream::unfold(
            (provider, sub.into_stream()),
            |(provider, mut headers)| async move {
                let header = headers.next().await?;
                Some((header.number, (provider, headers)))
            },
        );
        Ok(Box::pin(blocks))
    }

    fn poll(&self) -> Result<BlockStream> {
        let provider = ProviderBuilder::new().on_http(self.http_url.parse()?);
        let mut interval = tokio::time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!(interval_ms = self.poll_interval.as_millis() as u64, "Polling for new blocks");

        let blocks = futures::stream::unfold(
            (provider, interval, None::<u64>),
            |(provider, mut interval, mut last)| async move {
                loop {
                    interval.tick().await;
                    match provider.get_block_number().await {
                        Ok(number) if last.map_or(true, |prev| number > prev) => {
                            last = Some(number);
                            return Some((number, (provider, interval, last)));
                        }
                        Ok(_) => {}
                        Err(e) => warn!(error = %e, "Block number poll failed"),
                    }
                }
            },
        );
        Ok(Box::pin(blocks))
    }
}

/// Pass schedule over observed blocks: the first block and every
/// `interval`-th one after it trigger a pass. Heights are not used, so gaps
/// in a polled stream never shift the schedule.
#[derive(Debug, Clone)]
pub struct ScanSchedule {
    interval: u64,
    observed: u64,
}

impl ScanSchedule {
    /// A zero interval behaves as every block.
    pub fn new(interval: u64) -> Self {
        Self {
            interval: interval.max(1),
            observed: 0,
        }
    }

    /// Record one new block; true if it triggers a pass.
    pub fn observe(&mut self) -> bool {
        let due = self.observed % self.interval == 0;
        self.observed += 1;
        due
    }

    pub fn observed(&self) -> u64 {
        self.observed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schedule_counts_observed_blocks() {
        let mut schedule = ScanSchedule::new(5);
        let due: Vec<bool> = (0..11).map(|_| schedule.observe()).collect();
        assert_eq!(
            due,
            vec![true, false, false, false, false, true, false, false, false, false, true]
        );
        assert_eq!(schedule.observed(), 11);
    }

    #[test]
    fn test_zero_interval_is_every_block() {
        let mut schedule = ScanSchedule::new(0);
        assert!((0..4).all(|_| schedule.observe()));
    }

    #[tokio::test]
    #[ignore] // Requires network
    async fn test_poll_yields_blocks() {
        let watcher = BlockWatcher::new("https://eth.llamarpc.com", None, Duration::from_secs(1));
        let mut stream = watcher.stream().await.unwrap();
        let block = stream.next().await.unwrap();
        assert!(block > 0);
    }
}
