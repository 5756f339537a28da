use std::sync::Arc;

use alloy_primitives::{Address, U256};
use alloy_sol_types::{sol, SolCall, SolInterface};
use async_trait::async_trait;
use ethers::{
    providers::{Http, Middleware, Provider, ProviderError, RpcError},
    types::{transaction::eip2718::TypedTransaction, TransactionRequest, H160},
};
use tracing::trace;

use crate::error::{GalleryError, Result};

// 画廊用到的合约接口以及 ERC-721 的 Solidity 错误
sol! {
    interface IMonadLogoNFT {
        function totalSupply() external view returns (uint256);
        function balanceOf(address owner) external view returns (uint256);
        function tokenByIndex(uint256 index) external view returns (uint256);
        function tokenOfOwnerByIndex(address owner, uint256 index) external view returns (uint256);
        function tokenURI(uint256 token_id) external view returns (string memory);
        function ownerOf(uint256 token_id) external view returns (address);

        function mint(string calldata color) external;
        function mintRandom() external;
        function transferFrom(address from, address to, uint256 token_id) external;

        error InvalidTokenId(uint256 token_id);
        error NotOwner(address from, uint256 token_id, address real_owner);
        error NotApproved(address owner, address spender, uint256 token_id);
        error TransferToZero(uint256 token_id);
        error ReceiverRefused(address receiver, uint256 token_id, bytes4 returned);
    }
}

// 只读的合约访问，所有调用都可能失败
#[async_trait]
pub trait CollectionReader: Send + Sync {
    async fn total_supply(&self) -> Result<usize>;
    async fn balance_of(&self, owner: Address) -> Result<usize>;
    async fn token_by_index(&self, index: usize) -> Result<U256>;
    async fn token_of_owner_by_index(&self, owner: Address, index: usize) -> Result<U256>;
    async fn token_uri(&self, token_id: U256) -> Result<String>;
    async fn owner_of(&self, token_id: U256) -> Result<Address>;
}

// alloy 和 ethers 的地址类型互转，字节布局相同
pub(crate) fn to_h160(address: Address) -> H160 {
    H160::from_slice(address.as_slice())
}

pub(crate) fn from_h160(address: H160) -> Address {
    Address::from(address.0)
}

// 链上数量转成本地下标
pub fn to_index(value: U256) -> Result<usize> {
    usize::try_from(value).map_err(|_| GalleryError::IndexOverflow(value))
}

// 把 revert 数据解码成可读的 ERC-721 错误
pub fn describe_revert(data: &[u8]) -> Option<String> {
    use IMonadLogoNFT::IMonadLogoNFTErrors as Errors;

    // 前 4 字节是错误选择器，不认识的选择器直接返回 None
    let message = match Errors::abi_decode(data, true).ok()? {
        Errors::InvalidTokenId(err) => format!("token {} does not exist", err.token_id),
        Errors::NotOwner(err) => format!(
            "{} does not own token {}, owner is {}",
            err.from, err.token_id, err.real_owner
        ),
        Errors::NotApproved(err) => format!(
            "{} is not approved to spend token {} of {}",
            err.spender, err.token_id, err.owner
        ),
        Errors::TransferToZero(err) => {
            format!("token {} cannot be sent to the zero address", err.token_id)
        }
        Errors::ReceiverRefused(err) => format!(
            "receiver {} refused token {}",
            err.receiver, err.token_id
        ),
    };
    Some(message)
}

// 节点把 revert 数据放在 JSON-RPC 错误的 data 字段里
pub(crate) fn revert_error(err: ProviderError) -> GalleryError {
    let reason = err
        .as_error_response()
        .and_then(|response| response.as_revert_data())
        .and_then(|data| describe_revert(&data));
    match reason {
        Some(reason) => GalleryError::Reverted(reason),
        // 解不出来就保留原始的 provider 错误
        None => err.into(),
    }
}

// 通过 eth_call 读取合约
#[derive(Clone, Debug)]
pub struct RpcCollection {
    provider: Arc<Provider<Http>>,
    address: Address,
}

impl RpcCollection {
    pub fn new(provider: Arc<Provider<Http>>, address: Address) -> Self {
        Self { provider, address }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    async fn read<C: SolCall + Send>(&self, call: C) -> Result<C::Return> {
        // 用 alloy 编码 calldata，交给 ethers 发送
        let tx: TypedTransaction = TransactionRequest::new()
            .to(to_h160(self.address))
            .data(call.abi_encode())
            .into();
        trace!(function = C::SIGNATURE, "eth_call");
        let output = self.provider.call(&tx, None).await.map_err(revert_error)?;
        // 严格校验返回数据
        Ok(C::abi_decode_returns(&output, true)?)
    }
}

#[async_trait]
impl CollectionReader for RpcCollection {
    async fn total_supply(&self) -> Result<usize> {
        let supply = self.read(IMonadLogoNFT::totalSupplyCall {}).await?;
        to_index(supply._0)
    }

    async fn balance_of(&self, owner: Address) -> Result<usize> {
        let balance = self.read(IMonadLogoNFT::balanceOfCall { owner }).await?;
        to_index(balance._0)
    }

    async fn token_by_index(&self, index: usize) -> Result<U256> {
        let token = self
            .read(IMonadLogoNFT::tokenByIndexCall {
                index: U256::from(index),
            })
            .await?;
        Ok(token._0)
    }

    async fn token_of_owner_by_index(&self, owner: Address, index: usize) -> Result<U256> {
        let token = self
            .read(IMonadLogoNFT::tokenOfOwnerByIndexCall {
                owner,
                index: U256::from(index),
            })
            .await?;
        Ok(token._0)
    }

    async fn token_uri(&self, token_id: U256) -> Result<String> {
        let uri = self
            .read(IMonadLogoNFT::tokenURICall { token_id })
            .await?;
        Ok(uri._0)
    }

    async fn owner_of(&self, token_id: U256) -> Result<Address> {
        let owner = self.read(IMonadLogoNFT::ownerOfCall { token_id }).await?;
        Ok(owner._0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_sol_types::SolError;

    #[test]
    fn decodes_invalid_token_revert() {
        let data = IMonadLogoNFT::InvalidTokenId {
            token_id: U256::from(42),
        }
        .abi_encode();
        assert_eq!(
            describe_revert(&data).as_deref(),
            Some("token 42 does not exist")
        );
    }

    #[test]
    fn unknown_revert_data_is_ignored() {
        assert_eq!(describe_revert(&[0xde, 0xad, 0xbe, 0xef]), None);
        assert_eq!(describe_revert(&[]), None);
    }

    #[test]
    fn index_conversion_rejects_overflow() {
        assert_eq!(to_index(U256::from(23)).unwrap(), 23);
        assert!(matches!(
            to_index(U256::MAX),
            Err(GalleryError::IndexOverflow(_))
        ));
    }

    #[test]
    fn address_round_trips_through_ethers() {
        let address = Address::repeat_byte(0xab);
        assert_eq!(from_h160(to_h160(address)), address);
    }

    #[test]
    fn calldata_uses_erc721_selectors() {
        let call = IMonadLogoNFT::tokenByIndexCall {
            index: U256::from(1),
        };
        assert_eq!(IMonadLogoNFT::tokenByIndexCall::SELECTOR, [0x4f, 0x6c, 0xcc, 0xe7]);
        assert_eq!(call.abi_encode().len(), 4 + 32);
    }
}
