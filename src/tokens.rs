use serde::{Deserialize, Serialize};

pub const USDC_MINT: &str = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";
pub const USDT_MINT: &str = "Es9vMFrzaCERmJfrF4H2FYD4KCoNkY11McCe8BenwNYB";
pub const SOL_MINT: &str = "So11111111111111111111111111111111111111112";
pub const BONK_MINT: &str = "DezXAZ8z7PnrnRJjz3wXBoRgixCa6xjnB7YaB1pPB263";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRef {
    pub symbol: String,
    /// Base58 mint address. Empty when the user has not picked a token.
    #[serde(default)]
    pub mint: String,
}

impl TokenRef {
    pub fn new(symbol: &str, mint: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            mint: mint.to_string(),
        }
    }
}

/// A tradable pair as selected in a block config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub id: String,
    pub name: String,
    pub input_token: TokenRef,
    pub output_token: TokenRef,
}

impl TokenPair {
    fn new(input: (&str, &str), output: (&str, &str)) -> Self {
        Self {
            id: format!("{}-{}", input.0, output.0),
            name: format!("{}/{}", input.0, output.0),
            input_token: TokenRef::new(input.0, input.1),
            output_token: TokenRef::new(output.0, output.1),
        }
    }

    pub fn has_mints(&self) -> bool {
        !self.input_token.mint.is_empty() && !self.output_token.mint.is_empty()
    }
}

/// Pairs offered by the builder.
pub fn token_pairs() -> Vec<TokenPair> {
    vec![
        TokenPair::new(("USDC", USDC_MINT), ("SOL", SOL_MINT)),
        TokenPair::new(("USDT", USDT_MINT), ("SOL", SOL_MINT)),
        TokenPair::new(("SOL", SOL_MINT), ("USDC", USDC_MINT)),
        TokenPair::new(("USDC", USDC_MINT), ("BONK", BONK_MINT)),
        TokenPair::new(("USDT", USDT_MINT), ("BONK", BONK_MINT)),
        TokenPair::new(("BONK", BONK_MINT), ("SOL", SOL_MINT)),
    ]
}

pub fn default_pair() -> TokenPair {
    TokenPair::new(("USDC", USDC_MINT), ("SOL", SOL_MINT))
}

pub fn find_pair(id: &str) -> Option<TokenPair> {
    token_pairs().into_iter().find(|p| p.id == id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pairs_are_unique_and_complete() {
        let pairs = token_pairs();
        assert_eq!(pairs.len(), 6);
        for p in &pairs {
            assert!(p.has_mints(), "{} is missing a mint", p.id);
            assert_eq!(pairs.iter().filter(|q| q.id == p.id).count(), 1);
        }
        assert_eq!(find_pair("SOL-USDC").map(|p| p.name), Some("SOL/USDC".into()));
        assert!(find_pair("DOGE-SOL").is_none());
    }
}
