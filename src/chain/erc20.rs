//! ERC-20 bindings used for allowance, approval and balance calls

use ethers::abi::AbiEncode;
use ethers::contract::{abigen, ContractError};
use ethers::providers::Middleware;
use ethers::types::{Address, Bytes, U256};

abigen!(
    Erc20,
    r#"[
        function allowance(address owner, address spender) external view returns (uint256)
        function approve(address spender, uint256 amount) external returns (bool)
        function balanceOf(address account) external view returns (uint256)
    ]"#,
);

/// Calldata for `approve(spender, amount)`
pub fn approve_calldata(spender: Address, amount: U256) -> Bytes {
    ApproveCall { spender, amount }.encode().into()
}

/// Whether a failed contract read means the contract does not speak the
/// expected interface, as opposed to the node being unreachable.
pub fn is_interface_mismatch<M: Middleware>(err: &ContractError<M>) -> bool {
    matches!(
        err,
        ContractError::Revert(_)
            | ContractError::DecodingError(_)
            | ContractError::AbiError(_)
            | ContractError::DetokenizationError(_)
            | ContractError::ContractNotDeployed
    )
}
