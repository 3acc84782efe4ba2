//! Program ids and account derivation for the DCA setup call.

use solana_sdk::instruction::AccountMeta;
use solana_sdk::pubkey::Pubkey;

pub const TOKEN_PROGRAM_ID: Pubkey =
    solana_sdk::pubkey!("TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA");
pub const ASSOCIATED_TOKEN_PROGRAM_ID: Pubkey =
    solana_sdk::pubkey!("ATokenGPvbdGVxr1b2hvZbsiqW5xWH25efTNsLJA8knL");
pub const SYSTEM_PROGRAM_ID: Pubkey = solana_sdk::pubkey!("11111111111111111111111111111111");
pub const JUPITER_DCA_PROGRAM_ID: Pubkey =
    solana_sdk::pubkey!("DCA265Vj8a9CEuX1eb1LWRnDT7uK6q1xMipnNyatn23M");

pub const ESCROW_SEED: &[u8] = b"escrow";
const JUPITER_DCA_SEED: &[u8] = b"dca";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramIds {
    /// The trading-bot program that owns the escrow. No public default.
    pub trading_bot: Option<Pubkey>,
    pub jupiter_dca: Pubkey,
    /// Jupiter DCA state account. Derived from the escrow when unset.
    pub jupiter_dca_account: Option<Pubkey>,
}

impl Default for ProgramIds {
    fn default() -> Self {
        Self {
            trading_bot: None,
            jupiter_dca: JUPITER_DCA_PROGRAM_ID,
            jupiter_dca_account: None,
        }
    }
}

/// Escrow PDA: `["escrow", user, input_mint, output_mint, application_idx (u64 LE)]`.
pub fn derive_escrow(
    program_id: &Pubkey,
    user: &Pubkey,
    input_mint: &Pubkey,
    output_mint: &Pubkey,
    application_idx: u64,
) -> (Pubkey, u8) {
    Pubkey::find_program_address(
        &[
            ESCROW_SEED,
            user.as_ref(),
            input_mint.as_ref(),
            output_mint.as_ref(),
            &application_idx.to_le_bytes(),
        ],
        program_id,
    )
}

/// Associated token account of `owner` for `mint`. Owners may be off-curve.
pub fn associated_token_address(owner: &Pubkey, mint: &Pubkey) -> Pubkey {
    Pubkey::find_program_address(
        &[owner.as_ref(), TOKEN_PROGRAM_ID.as_ref(), mint.as_ref()],
        &ASSOCIATED_TOKEN_PROGRAM_ID,
    )
    .0
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetupDcaAccounts {
    pub jup_dca_program: Pubkey,
    pub jup_dca: Pubkey,
    pub input_mint: Pubkey,
    pub output_mint: Pubkey,
    pub user: Pubkey,
    pub user_token_account: Pubkey,
    pub escrow: Pubkey,
    pub escrow_in_ata: Pubkey,
    pub escrow_out_ata: Pubkey,
    pub system_program: Pubkey,
    pub token_program: Pubkey,
    pub associated_token_program: Pubkey,
}

impl SetupDcaAccounts {
    pub fn derive(
        ids: &ProgramIds,
        program_id: &Pubkey,
        user: Pubkey,
        input_mint: Pubkey,
        output_mint: Pubkey,
        application_idx: u64,
    ) -> Self {
        let (escrow, _) =
            derive_escrow(program_id, &user, &input_mint, &output_mint, application_idx);
        let jup_dca = ids.jupiter_dca_account.unwrap_or_else(|| {
            Pubkey::find_program_address(
                &[
                    JUPITER_DCA_SEED,
                    escrow.as_ref(),
                    input_mint.as_ref(),
                    output_mint.as_ref(),
                    &application_idx.to_le_bytes(),
                ],
                &ids.jupiter_dca,
            )
            .0
        });

        Self {
            jup_dca_program: ids.jupiter_dca,
            jup_dca,
            input_mint,
            output_mint,
            user,
            user_token_account: associated_token_address(&user, &input_mint),
            escrow,
            escrow_in_ata: associated_token_address(&escrow, &input_mint),
            escrow_out_ata: associated_token_address(&escrow, &output_mint),
            system_program: SYSTEM_PROGRAM_ID,
            token_program: TOKEN_PROGRAM_ID,
            associated_token_program: ASSOCIATED_TOKEN_PROGRAM_ID,
        }
    }

    /// Account list in instruction order.
    pub fn to_account_metas(&self) -> Vec<AccountMeta> {
        vec![
            AccountMeta::new_readonly(self.jup_dca_program, false),
            AccountMeta::new(self.jup_dca, false),
            AccountMeta::new_readonly(self.input_mint, false),
            AccountMeta::new_readonly(self.output_mint, false),
            AccountMeta::new(self.user, true),
            AccountMeta::new(self.user_token_account, false),
            AccountMeta::new(self.escrow, false),
            AccountMeta::new(self.escrow_in_ata, false),
            AccountMeta::new(self.escrow_out_ata, false),
            AccountMeta::new_readonly(self.system_program, false),
            AccountMeta::new_readonly(self.token_program, false),
            AccountMeta::new_readonly(self.associated_token_program, false),
        ]
    }
}
