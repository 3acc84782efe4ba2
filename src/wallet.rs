use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{read_keypair_file, Keypair, Signer};
use solana_sdk::transaction::Transaction;
use std::collections::HashMap;

use crate::error::EngineError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenBalance {
    pub amount: f64,
    pub value: f64,
}

/// Balances keyed by token symbol. Tokens absent from the map are unknown,
/// not zero.
pub type WalletBalance = HashMap<String, TokenBalance>;

/// Signing capability handed to the engine.
#[async_trait]
pub trait WalletProvider: Send + Sync {
    fn public_key(&self) -> Option<Pubkey>;

    fn is_connected(&self) -> bool;

    async fn sign_transaction(&self, tx: Transaction) -> Result<Transaction, EngineError>;

    async fn sign_all_transactions(
        &self,
        txs: Vec<Transaction>,
    ) -> Result<Vec<Transaction>, EngineError> {
        let mut signed = Vec::with_capacity(txs.len());
        for tx in txs {
            signed.push(self.sign_transaction(tx).await?);
        }
        Ok(signed)
    }

    fn balances(&self) -> WalletBalance {
        WalletBalance::new()
    }
}

/// Local keypair signer.
pub struct KeypairWallet {
    keypair: Keypair,
    balances: WalletBalance,
}

impl KeypairWallet {
    pub fn new(keypair: Keypair) -> Self {
        Self {
            keypair,
            balances: WalletBalance::new(),
        }
    }

    pub fn from_file(path: &str) -> Result<Self> {
        let keypair =
            read_keypair_file(path).map_err(|e| anyhow::anyhow!("reading keypair {path}: {e}"))?;
        Ok(Self::new(keypair))
    }

    pub fn with_balance(mut self, symbol: &str, amount: f64, value: f64) -> Self {
        self.balances
            .insert(symbol.to_string(), TokenBalance { amount, value });
        self
    }
}

#[async_trait]
impl WalletProvider for KeypairWallet {
    fn public_key(&self) -> Option<Pubkey> {
        Some(self.keypair.pubkey())
    }

    fn is_connected(&self) -> bool {
        true
    }

    async fn sign_transaction(&self, mut tx: Transaction) -> Result<Transaction, EngineError> {
        let blockhash = tx.message.recent_blockhash;
        tx.try_partial_sign(&[&self.keypair], blockhash)
            .map_err(|e| EngineError::Wallet(e.to_string()))?;
        Ok(tx)
    }

    fn balances(&self) -> WalletBalance {
        self.balances.clone()
    }
}

/// Stand-in when no wallet is configured.
pub struct DisconnectedWallet;

#[async_trait]
impl WalletProvider for DisconnectedWallet {
    fn public_key(&self) -> Option<Pubkey> {
        None
    }

    fn is_connected(&self) -> bool {
        false
    }

    async fn sign_transaction(&self, _tx: Transaction) -> Result<Transaction, EngineError> {
        Err(EngineError::Wallet("Wallet not connected".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use solana_sdk::hash::Hash;
    use solana_sdk::instruction::{AccountMeta, Instruction};

    fn unsigned_for(payer: Pubkey) -> Transaction {
        let ix = Instruction::new_with_bytes(
            Pubkey::new_unique(),
            &[1, 2, 3],
            vec![AccountMeta::new(payer, true)],
        );
        let mut tx = Transaction::new_with_payer(&[ix], Some(&payer));
        tx.message.recent_blockhash = Hash::new_unique();
        tx
    }

    #[tokio::test]
    async fn keypair_wallet_signs() {
        let wallet = KeypairWallet::new(Keypair::new());
        let payer = wallet.public_key().unwrap();
        let signed = wallet.sign_transaction(unsigned_for(payer)).await.unwrap();
        assert!(signed.is_signed());

        let all = wallet
            .sign_all_transactions(vec![unsigned_for(payer), unsigned_for(payer)])
            .await
            .unwrap();
        assert!(all.iter().all(Transaction::is_signed));
    }

    #[tokio::test]
    async fn keypair_wallet_refuses_foreign_payers() {
        let wallet = KeypairWallet::new(Keypair::new());
        let err = wallet
            .sign_transaction(unsigned_for(Pubkey::new_unique()))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Wallet(_)));
    }

    #[tokio::test]
    async fn disconnected_wallet_never_signs() {
        let wallet = DisconnectedWallet;
        assert!(!wallet.is_connected());
        assert!(wallet.public_key().is_none());
        assert!(wallet.sign_transaction(Transaction::default()).await.is_err());
        assert!(wallet.balances().is_empty());
    }
}
