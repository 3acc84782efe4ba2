use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use std::str::FromStr;
use std::time::Duration;

use crate::chain::accounts::{ProgramIds, JUPITER_DCA_PROGRAM_ID};
use crate::execution::{EngineConfig, RetryPolicy};
use crate::tokens::SOL_MINT;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // RPC
    pub rpc_http_url: String,

    // Runtime
    pub dry_run: bool,
    pub log_json: bool,

    // Strategy
    pub strategy_path: Option<String>,
    pub cycle_interval_ms: u64,
    pub max_gas_price: f64,
    pub retry_attempts: u32,
    pub retry_base_delay_ms: u64,
    pub max_errors: usize,

    // Market data
    pub price_api_url: String,
    pub price_mint: String,
    pub simulated_market: bool,

    // Keys
    pub sol_keypair_path: Option<String>,

    // Programs
    pub trading_bot_program_id: Option<String>,
    pub jupiter_dca_program_id: String,
    pub jupiter_dca_account: Option<String>,
}

fn env_bool(key: &str, default: bool) -> bool {
    match std::env::var(key).ok().map(|s| s.trim().to_lowercase()) {
        None => default,
        Some(v) if v.is_empty() => default,
        Some(v) if v == "1" || v == "true" || v == "yes" || v == "y" || v == "on" => true,
        Some(v) if v == "0" || v == "false" || v == "no" || v == "n" || v == "off" => false,
        Some(_) => default,
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|x| x.parse().ok())
}

fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn parse_pubkey(key: &str, raw: &str) -> Result<Pubkey> {
    Pubkey::from_str(raw).with_context(|| format!("{key} is not a valid public key: {raw}"))
}

impl Config {
    pub fn from_env() -> Result<Self> {
        // RPC
        let rpc_http_url = std::env::var("BOT_RPC_HTTP")
            .unwrap_or_else(|_| "https://api.mainnet-beta.solana.com".to_string());

        // Runtime
        let dry_run = env_bool("DRY_RUN", true);
        let log_json = env_bool("BOT_LOG_JSON", false);

        // Strategy
        let strategy_path = env_nonempty("BOT_STRATEGY_PATH");
        let cycle_interval_ms = env_parse::<u64>("BOT_CYCLE_INTERVAL_MS").unwrap_or(5_000);
        let max_gas_price = env_parse::<f64>("BOT_MAX_GAS_PRICE").unwrap_or(50_000.0);
        let retry_attempts = env_parse::<u32>("BOT_RETRY_ATTEMPTS").unwrap_or(3);
        let retry_base_delay_ms = env_parse::<u64>("BOT_RETRY_BASE_DELAY_MS").unwrap_or(500);
        let max_errors = env_parse::<usize>("BOT_MAX_ERRORS").unwrap_or(100);

        if cycle_interval_ms == 0 {
            return Err(anyhow!("BOT_CYCLE_INTERVAL_MS must be positive"));
        }
        if retry_attempts == 0 {
            return Err(anyhow!("BOT_RETRY_ATTEMPTS must be at least 1"));
        }
        if max_gas_price.is_nan() || max_gas_price < 0.0 {
            return Err(anyhow!("BOT_MAX_GAS_PRICE must be a non-negative number"));
        }
        if max_errors == 0 {
            return Err(anyhow!("BOT_MAX_ERRORS must be positive"));
        }

        // Market data
        let price_api_url = std::env::var("BOT_PRICE_API_URL")
            .unwrap_or_else(|_| "https://api.jup.ag".to_string());
        let price_mint = std::env::var("BOT_PRICE_MINT").unwrap_or_else(|_| SOL_MINT.to_string());
        let simulated_market = env_bool("BOT_SIMULATED_MARKET", false);

        let sol_keypair_path = env_nonempty("SOL_KEYPAIR_PATH");

        // Programs
        let trading_bot_program_id = env_nonempty("TRADING_BOT_PROGRAM_ID");
        let jupiter_dca_program_id = env_nonempty("JUPITER_DCA_PROGRAM_ID")
            .unwrap_or_else(|| JUPITER_DCA_PROGRAM_ID.to_string());
        let jupiter_dca_account = env_nonempty("JUPITER_DCA_ACCOUNT");

        let cfg = Self {
            rpc_http_url,
            dry_run,
            log_json,
            strategy_path,
            cycle_interval_ms,
            max_gas_price,
            retry_attempts,
            retry_base_delay_ms,
            max_errors,
            price_api_url,
            price_mint,
            simulated_market,
            sol_keypair_path,
            trading_bot_program_id,
            jupiter_dca_program_id,
            jupiter_dca_account,
        };
        // fail fast on malformed ids
        cfg.program_ids()?;
        Ok(cfg)
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            cycle_interval: Duration::from_millis(self.cycle_interval_ms),
            max_gas_price: self.max_gas_price,
            retry: RetryPolicy {
                attempts: self.retry_attempts,
                base_delay: Duration::from_millis(self.retry_base_delay_ms),
            },
            max_errors: self.max_errors,
        }
    }

    pub fn program_ids(&self) -> Result<ProgramIds> {
        Ok(ProgramIds {
            trading_bot: self
                .trading_bot_program_id
                .as_deref()
                .map(|raw| parse_pubkey("TRADING_BOT_PROGRAM_ID", raw))
                .transpose()?,
            jupiter_dca: parse_pubkey("JUPITER_DCA_PROGRAM_ID", &self.jupiter_dca_program_id)?,
            jupiter_dca_account: self
                .jupiter_dca_account
                .as_deref()
                .map(|raw| parse_pubkey("JUPITER_DCA_ACCOUNT", raw))
                .transpose()?,
        })
    }
}
