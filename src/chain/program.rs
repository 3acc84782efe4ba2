use async_trait::async_trait;
use base64::Engine as _;
use serde::Serialize;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::hash::hash;
use solana_sdk::instruction::Instruction;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::transaction::Transaction;
use std::sync::Arc;
use tracing::{debug, info};

use crate::chain::accounts::SetupDcaAccounts;
use crate::error::EngineError;
use crate::wallet::WalletProvider;

/// Arguments of `setup_dca`, in wire order. bincode's fixed-int little-endian
/// layout with a one-byte `Option` tag matches the program's borsh encoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SetupDcaParams {
    pub application_idx: u64,
    pub in_amount: u64,
    pub in_amount_per_cycle: u64,
    pub cycle_frequency: i64,
    pub min_out_amount: Option<u64>,
    pub max_out_amount: Option<u64>,
    pub start_at: Option<i64>,
}

pub fn setup_dca_discriminator() -> [u8; 8] {
    let digest = hash(b"global:setup_dca").to_bytes();
    let mut out = [0u8; 8];
    out.copy_from_slice(&digest[..8]);
    out
}

pub fn encode_setup_dca(params: &SetupDcaParams) -> Result<Vec<u8>, EngineError> {
    let mut data = setup_dca_discriminator().to_vec();
    let args = bincode::serialize(params)
        .map_err(|e| EngineError::Transaction(format!("encoding setup_dca: {e}")))?;
    data.extend_from_slice(&args);
    Ok(data)
}

pub fn setup_dca_instruction(
    program_id: Pubkey,
    params: &SetupDcaParams,
    accounts: &SetupDcaAccounts,
) -> Result<Instruction, EngineError> {
    Ok(Instruction::new_with_bytes(
        program_id,
        &encode_setup_dca(params)?,
        accounts.to_account_metas(),
    ))
}

/// Submits the DCA setup call and returns the transaction signature.
#[async_trait]
pub trait DcaProgramClient: Send + Sync {
    async fn setup_dca(
        &self,
        wallet: &dyn WalletProvider,
        program_id: Pubkey,
        params: &SetupDcaParams,
        accounts: &SetupDcaAccounts,
    ) -> Result<String, EngineError>;
}

/// Builds, signs via the wallet, simulates and sends over JSON-RPC.
pub struct RpcDcaClient {
    rpc: Arc<RpcClient>,
    dry_run: bool,
}

impl RpcDcaClient {
    pub fn new(rpc: Arc<RpcClient>, dry_run: bool) -> Self {
        Self { rpc, dry_run }
    }
}

fn rpc_err(e: impl std::fmt::Display) -> EngineError {
    EngineError::Transaction(e.to_string())
}

#[async_trait]
impl DcaProgramClient for RpcDcaClient {
    async fn setup_dca(
        &self,
        wallet: &dyn WalletProvider,
        program_id: Pubkey,
        params: &SetupDcaParams,
        accounts: &SetupDcaAccounts,
    ) -> Result<String, EngineError> {
        let ix = setup_dca_instruction(program_id, params, accounts)?;
        let mut tx = Transaction::new_with_payer(&[ix], Some(&accounts.user));
        tx.message.recent_blockhash = self.rpc.get_latest_blockhash().await.map_err(rpc_err)?;

        let tx = wallet.sign_transaction(tx).await?;

        // simulateTransaction (mandatory)
        let sim = self.rpc.simulate_transaction(&tx).await.map_err(rpc_err)?;
        if let Some(err) = sim.value.err {
            let logs = sim.value.logs.unwrap_or_default().join("\n");
            debug!(%logs, "dca.simulate.logs");
            return Err(EngineError::Transaction(format!(
                "simulateTransaction failed: {err:?}"
            )));
        }

        if self.dry_run {
            let raw = bincode::serialize(&tx).map_err(rpc_err)?;
            let encoded = base64::engine::general_purpose::STANDARD.encode(raw);
            info!(tx = %encoded, "dry_run: simulation ok, skipping send");
            return Ok("DRY_RUN".into());
        }

        let sig = self
            .rpc
            .send_and_confirm_transaction(&tx)
            .await
            .map_err(rpc_err)?;
        Ok(sig.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::accounts::ProgramIds;

    fn params(min_out: Option<u64>, start_at: Option<i64>) -> SetupDcaParams {
        SetupDcaParams {
            application_idx: 1,
            in_amount: 1_000_000,
            in_amount_per_cycle: 100_000,
            cycle_frequency: 3600,
            min_out_amount: min_out,
            max_out_amount: None,
            start_at,
        }
    }

    #[test]
    fn discriminator_is_stable() {
        assert_eq!(setup_dca_discriminator(), setup_dca_discriminator());
        assert_ne!(setup_dca_discriminator(), [0u8; 8]);
    }

    #[test]
    fn arguments_follow_the_borsh_layout() {
        let data = encode_setup_dca(&params(None, None)).unwrap();
        // 8 discriminator + 3 * u64 + i64 + three one-byte None tags
        assert_eq!(data.len(), 8 + 32 + 3);
        assert_eq!(&data[8..16], &1u64.to_le_bytes());
        assert_eq!(&data[16..24], &1_000_000u64.to_le_bytes());
        assert_eq!(&data[32..40], &3600i64.to_le_bytes());
        assert_eq!(&data[40..], &[0, 0, 0]);

        let data = encode_setup_dca(&params(Some(5), Some(1_700_000_000))).unwrap();
        assert_eq!(data.len(), 8 + 32 + 9 + 1 + 9);
        assert_eq!(data[40], 1);
        assert_eq!(&data[41..49], &5u64.to_le_bytes());
        assert_eq!(data[49], 0);
        assert_eq!(data[50], 1);
        assert_eq!(&data[51..59], &1_700_000_000i64.to_le_bytes());
    }

    #[test]
    fn instruction_targets_the_program_with_all_accounts() {
        let program = Pubkey::new_unique();
        let accounts = SetupDcaAccounts::derive(
            &ProgramIds::default(),
            &program,
            Pubkey::new_unique(),
            Pubkey::new_unique(),
            Pubkey::new_unique(),
            0,
        );
        let ix = setup_dca_instruction(program, &params(None, None), &accounts).unwrap();
        assert_eq!(ix.program_id, program);
        assert_eq!(ix.accounts.len(), 12);
        assert_eq!(&ix.data[..8], &setup_dca_discriminator());
    }
}
