pub mod accounts;
pub mod fees;
pub mod program;

pub use accounts::{associated_token_address, derive_escrow, ProgramIds, SetupDcaAccounts};
pub use fees::PriorityFeeOracle;
pub use program::{DcaProgramClient, RpcDcaClient, SetupDcaParams};
