//! Token interfaces queried by introspection.

// The sol! macro generates code that we can't document
#![allow(missing_docs)]

use alloy::sol;

/// ERC-165 interface id of the multi-token standard.
pub const ERC1155_INTERFACE_ID: [u8; 4] = [0xd9, 0xb6, 0x7a, 0x26];
/// ERC-165 interface id of the non-fungible token standard.
pub const ERC721_INTERFACE_ID: [u8; 4] = [0x80, 0xac, 0x58, 0xcd];

sol! {
    interface IERC165 {
        function supportsInterface(bytes4 interfaceId) external view returns (bool);
    }

    interface IERC20Metadata {
        function name() external view returns (string);
        function symbol() external view returns (string);
        function decimals() external view returns (uint8);
    }

    /// Pre-standard tokens that return their metadata as `bytes32`.
    interface IERC20Bytes32Metadata {
        function name() external view returns (bytes32);
        function symbol() external view returns (bytes32);
    }

    interface IERC1155MetadataURI {
        function uri(uint256 id) external view returns (string);
    }
}
