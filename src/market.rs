//! Market data and cost signals consumed by the engine.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::Rng;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::error::EngineError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketData {
    pub price: f64,
    pub timestamp: DateTime<Utc>,
    pub volume_24h: f64,
    pub price_change_24h: f64,
}

impl MarketData {
    pub fn at_price(price: f64) -> Self {
        Self {
            price,
            timestamp: Utc::now(),
            volume_24h: 0.0,
            price_change_24h: 0.0,
        }
    }

    pub fn with_volume(mut self, volume_24h: f64) -> Self {
        self.volume_24h = volume_24h;
        self
    }
}

impl Default for MarketData {
    fn default() -> Self {
        Self {
            price: 0.0,
            timestamp: DateTime::<Utc>::UNIX_EPOCH,
            volume_24h: 0.0,
            price_change_24h: 0.0,
        }
    }
}

#[async_trait]
pub trait MarketDataSource: Send + Sync {
    async fn fetch(&self) -> Result<MarketData, EngineError>;
}

/// Network cost signal; the engine skips a cycle when it exceeds the ceiling.
#[async_trait]
pub trait GasOracle: Send + Sync {
    async fn gas_price(&self) -> Result<f64, EngineError>;
}

pub struct FixedGasOracle(pub f64);

#[async_trait]
impl GasOracle for FixedGasOracle {
    async fn gas_price(&self) -> Result<f64, EngineError> {
        Ok(self.0)
    }
}

/// Jupiter price API (`/price/v2?ids=<mint>`). The API reports spot price
/// only, so volume and 24h change stay at zero.
#[derive(Clone)]
pub struct JupiterPriceSource {
    base_url: String,
    mint: String,
    http: Client,
}

#[derive(Debug, Deserialize)]
struct PriceResponse {
    data: HashMap<String, Option<PriceEntry>>,
}

#[derive(Debug, Deserialize)]
struct PriceEntry {
    price: String,
}

impl JupiterPriceSource {
    pub fn new(base_url: String, mint: String) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            mint,
            http,
        }
    }

    async fn request(&self) -> Result<PriceResponse, reqwest::Error> {
        let url = format!("{}/price/v2", self.base_url);
        self.http
            .get(url)
            .query(&[("ids", self.mint.as_str())])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
    }
}

#[async_trait]
impl MarketDataSource for JupiterPriceSource {
    async fn fetch(&self) -> Result<MarketData, EngineError> {
        let body = self
            .request()
            .await
            .map_err(|e| EngineError::MarketData(e.to_string()))?;
        let entry = body
            .data
            .get(&self.mint)
            .and_then(Option::as_ref)
            .ok_or_else(|| EngineError::MarketData(format!("no price for {}", self.mint)))?;
        let price: f64 = entry
            .price
            .parse()
            .map_err(|_| EngineError::MarketData(format!("bad price '{}'", entry.price)))?;
        Ok(MarketData::at_price(price))
    }
}

/// Random walk around a starting price, for local simulation runs.
pub struct SimulatedMarketSource {
    state: Mutex<(f64, f64)>,
    volatility: f64,
}

impl SimulatedMarketSource {
    pub fn new(start_price: f64, volatility: f64) -> Self {
        Self {
            state: Mutex::new((start_price, start_price)),
            volatility: volatility.abs(),
        }
    }

    fn step(&self) -> Result<MarketData, EngineError> {
        let mut guard = self
            .state
            .lock()
            .map_err(|_| EngineError::MarketData("simulator poisoned".into()))?;
        let (open, price) = &mut *guard;
        let mut rng = rand::thread_rng();
        if self.volatility > 0.0 {
            *price *= 1.0 + rng.gen_range(-self.volatility..self.volatility);
        }
        Ok(MarketData {
            price: *price,
            timestamp: Utc::now(),
            volume_24h: rng.gen_range(500_000.0..1_500_000.0),
            price_change_24h: (*price - *open) / *open * 100.0,
        })
    }
}

#[async_trait]
impl MarketDataSource for SimulatedMarketSource {
    async fn fetch(&self) -> Result<MarketData, EngineError> {
        self.step()
    }
}

/// Replays a fixed sequence; the last entry repeats once the rest are used up.
pub struct ScriptedMarketSource {
    script: Mutex<VecDeque<Result<MarketData, EngineError>>>,
    calls: AtomicUsize,
}

impl ScriptedMarketSource {
    pub fn new(script: Vec<Result<MarketData, EngineError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn prices(prices: &[f64]) -> Self {
        Self::new(prices.iter().map(|p| Ok(MarketData::at_price(*p))).collect())
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MarketDataSource for ScriptedMarketSource {
    async fn fetch(&self) -> Result<MarketData, EngineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut script = self
            .script
            .lock()
            .map_err(|_| EngineError::MarketData("script poisoned".into()))?;
        let next = if script.len() > 1 {
            script.pop_front()
        } else {
            script.front().cloned()
        };
        next.unwrap_or_else(|| Err(EngineError::MarketData("empty script".into())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_source_repeats_its_last_entry() {
        let src = ScriptedMarketSource::new(vec![
            Err(EngineError::MarketData("down".into())),
            Ok(MarketData::at_price(10.0)),
        ]);
        assert!(src.fetch().await.is_err());
        assert_eq!(src.fetch().await.unwrap().price, 10.0);
        assert_eq!(src.fetch().await.unwrap().price, 10.0);
        assert_eq!(src.calls(), 3);
    }

    #[tokio::test]
    async fn simulated_source_stays_near_its_start() {
        let src = SimulatedMarketSource::new(1850.0, 0.001);
        for _ in 0..10 {
            let md = src.fetch().await.unwrap();
            assert!(md.price > 1800.0 && md.price < 1900.0);
            assert!(md.volume_24h >= 500_000.0);
        }
        let flat = SimulatedMarketSource::new(5.0, 0.0);
        assert_eq!(flat.fetch().await.unwrap().price, 5.0);
    }

    #[test]
    fn price_payload_parses() {
        let raw = r#"{"data":{"So11111111111111111111111111111111111111112":{"id":"So11111111111111111111111111111111111111112","type":"derivedPrice","price":"142.51"}},"timeTaken":0.003}"#;
        let body: PriceResponse = serde_json::from_str(raw).unwrap();
        let entry = body.data["So11111111111111111111111111111111111111112"]
            .as_ref()
            .unwrap();
        assert_eq!(entry.price, "142.51");
    }
}
