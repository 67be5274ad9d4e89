//! Minimal Solidity interfaces for the three token standards the exact/upto EVM
//! schemes speak to. Declared inline with [`alloy_sol_types::sol!`] rather than loaded
//! from an ABI JSON file — there's nothing deployed-specific here, just the handful of
//! selectors each scheme calls.

use alloy_sol_types::sol;

sol! {
    #[derive(Debug)]
    interface IERC20 {
        function balanceOf(address account) external view returns (uint256);
        function allowance(address owner, address spender) external view returns (uint256);
        function transferFrom(address from, address to, uint256 amount) external returns (bool);
        function decimals() external view returns (uint8);
        function name() external view returns (string);
    }
}

sol! {
    #[derive(Debug)]
    interface IEIP3009 {
        function transferWithAuthorization(
            address from,
            address to,
            uint256 value,
            uint256 validAfter,
            uint256 validBefore,
            bytes32 nonce,
            uint8 v,
            bytes32 r,
            bytes32 s
        ) external;

        function authorizationState(address authorizer, bytes32 nonce) external view returns (bool);
    }
}

sol! {
    #[derive(Debug)]
    interface IERC2612 {
        function permit(
            address owner,
            address spender,
            uint256 value,
            uint256 deadline,
            uint8 v,
            bytes32 r,
            bytes32 s
        ) external;

        function nonces(address owner) external view returns (uint256);
        function DOMAIN_SEPARATOR() external view returns (bytes32);
    }
}

sol! {
    #[derive(Debug)]
    interface IERC5267 {
        function eip712Domain() external view returns (
            bytes1 fields,
            string memory name,
            string memory version,
            uint256 chainId,
            address verifyingContract,
            bytes32 salt,
            uint256[] memory extensions
        );
    }
}
