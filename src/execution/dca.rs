//! One-shot DCA setup: read the schedule from a `dca` block, derive the
//! escrow accounts, and submit a single program call.

use solana_sdk::pubkey::Pubkey;
use std::str::FromStr;
use tracing::info;

use crate::chain::{DcaProgramClient, ProgramIds, SetupDcaAccounts, SetupDcaParams};
use crate::error::EngineError;
use crate::graph::Block;
use crate::wallet::WalletProvider;

pub const MISSING_TOKENS: &str = "Please select input and output tokens";

/// Millisecond timestamps are above this; anything larger is converted to seconds.
const MILLIS_CUTOFF: f64 = 1e12;

#[derive(Debug, Clone, PartialEq)]
pub struct DcaConfig {
    pub application_idx: u64,
    pub in_amount: u64,
    pub in_amount_per_cycle: u64,
    /// Seconds between cycles.
    pub cycle_frequency: i64,
    pub min_out_amount: Option<u64>,
    pub max_out_amount: Option<u64>,
    /// Unix seconds.
    pub start_at: Option<i64>,
    pub input_mint: String,
    pub output_mint: String,
}

/// Explicit `inputMint`/`outputMint` keys win over the selected pair. A key
/// that is present but blank counts as unselected.
fn mint(block: &Block, key: &str, from_pair: impl Fn(&Block) -> Option<String>) -> Option<String> {
    let chosen = match block.field(key) {
        Some(v) => v.as_str().map(str::to_string),
        None => from_pair(block),
    };
    chosen.filter(|m| !m.trim().is_empty())
}

/// 2^64 and 2^63 as floats. Values at or above these do not fit the target integer.
const U64_BOUND: f64 = 18_446_744_073_709_551_616.0;
const I64_BOUND: f64 = 9_223_372_036_854_775_808.0;

/// On-chain amounts are never rounded or clamped: fractions and values past
/// `bound` are rejected.
fn integral(block: &Block, field: &str, n: f64, bound: f64) -> Result<f64, EngineError> {
    if n.is_finite() && n >= 0.0 && n.fract() == 0.0 && n < bound {
        Ok(n)
    } else {
        Err(EngineError::config(
            &block.id,
            format!("\"{field}\" must be a whole number between 0 and {bound:.0}"),
        ))
    }
}

fn number(block: &Block, field: &str) -> Result<f64, EngineError> {
    block.number(field).ok_or_else(|| {
        EngineError::config(&block.id, format!("\"{field}\" must be a non-negative number"))
    })
}

fn whole(block: &Block, field: &str) -> Result<u64, EngineError> {
    let n = number(block, field)?;
    integral(block, field, n, U64_BOUND).map(|n| n as u64)
}

fn signed_whole(block: &Block, field: &str) -> Result<i64, EngineError> {
    let n = number(block, field)?;
    integral(block, field, n, I64_BOUND).map(|n| n as i64)
}

fn optional_whole(block: &Block, field: &str) -> Result<Option<u64>, EngineError> {
    match block.field(field) {
        None => Ok(None),
        Some(v) if v.is_blank() => Ok(None),
        Some(_) => whole(block, field).map(|n| (n > 0).then_some(n)),
    }
}

impl DcaConfig {
    pub fn from_block(block: &Block) -> Result<Self, EngineError> {
        let (input_mint, output_mint) = Self::mints(block)?;

        let cycle_frequency = signed_whole(block, "cycleFrequency")?;
        let start_at = match block.field("startAt") {
            None => None,
            Some(v) if v.is_blank() => None,
            Some(_) => {
                let raw = block.number("startAt").ok_or_else(|| {
                    EngineError::config(&block.id, "\"startAt\" must be a timestamp")
                })?;
                // sub-second precision of a millisecond timestamp is dropped
                let secs = if raw > MILLIS_CUTOFF { (raw / 1000.0).floor() } else { raw };
                let secs = integral(block, "startAt", secs, I64_BOUND)? as i64;
                (secs > 0).then_some(secs)
            }
        };

        Ok(Self {
            application_idx: whole(block, "applicationIdx")?,
            in_amount: whole(block, "inAmount")?,
            in_amount_per_cycle: whole(block, "inAmountPerCycle")?,
            cycle_frequency,
            min_out_amount: optional_whole(block, "minOutAmount")?,
            max_out_amount: optional_whole(block, "maxOutAmount")?,
            start_at,
            input_mint,
            output_mint,
        })
    }

    /// Both mints, or the local "select tokens" failure.
    pub fn mints(block: &Block) -> Result<(String, String), EngineError> {
        let input = mint(block, "inputMint", |b| b.pair().map(|p| p.input_token.mint.clone()));
        let output = mint(block, "outputMint", |b| {
            b.pair().map(|p| p.output_token.mint.clone())
        });
        match (input, output) {
            (Some(i), Some(o)) => Ok((i, o)),
            _ => Err(EngineError::Transaction(MISSING_TOKENS.into())),
        }
    }

    pub fn params(&self) -> SetupDcaParams {
        SetupDcaParams {
            application_idx: self.application_idx,
            in_amount: self.in_amount,
            in_amount_per_cycle: self.in_amount_per_cycle,
            cycle_frequency: self.cycle_frequency,
            min_out_amount: self.min_out_amount,
            max_out_amount: self.max_out_amount,
            start_at: self.start_at,
        }
    }
}

fn pubkey(block: &Block, raw: &str) -> Result<Pubkey, EngineError> {
    Pubkey::from_str(raw)
        .map_err(|_| EngineError::config(&block.id, format!("invalid mint address '{raw}'")))
}

/// Validates everything locally, then makes exactly one program call.
/// Returns the transaction signature.
pub async fn submit_dca(
    block: &Block,
    wallet: &dyn WalletProvider,
    client: &dyn DcaProgramClient,
    ids: &ProgramIds,
) -> Result<String, EngineError> {
    DcaConfig::mints(block)?;

    let user = match wallet.public_key() {
        Some(pk) if wallet.is_connected() => pk,
        _ => return Err(EngineError::Wallet("Wallet not connected".into())),
    };

    let config = DcaConfig::from_block(block)?;
    let program_id = ids
        .trading_bot
        .ok_or_else(|| EngineError::config(&block.id, "TRADING_BOT_PROGRAM_ID is not set"))?;
    let input_mint = pubkey(block, &config.input_mint)?;
    let output_mint = pubkey(block, &config.output_mint)?;

    let accounts = SetupDcaAccounts::derive(
        ids,
        &program_id,
        user,
        input_mint,
        output_mint,
        config.application_idx,
    );
    info!(
        block = %block.id,
        user = %user,
        escrow = %accounts.escrow,
        in_amount = config.in_amount,
        cycle_frequency = config.cycle_frequency,
        "dca.submit"
    );

    let signature = client
        .setup_dca(wallet, program_id, &config.params(), &accounts)
        .await?;
    info!(block = %block.id, %signature, "dca.submitted");
    Ok(signature)
}
