use std::{fmt, str::FromStr};

use alloy_primitives::{Address, B256, U256};
use alloy_sol_types::SolCall;
use ethers::{
    middleware::SignerMiddleware,
    providers::{Http, Middleware, Provider},
    signers::{LocalWallet, Signer},
    types::TransactionRequest,
};
use tracing::info;

use crate::{
    contract::{from_h160, to_h160, IMonadLogoNFT},
    error::{GalleryError, Result},
};

// #RRGGBB 格式的颜色
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ColorHex(String);

impl ColorHex {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    // 输入过程中的校验：补上 #，最多 7 个字符且只含十六进制数字
    pub fn sanitize_partial(input: &str) -> Option<String> {
        let trimmed = input.trim();
        let hex = if trimmed.starts_with('#') {
            trimmed.to_owned()
        } else {
            format!("#{trimmed}")
        };
        let digits_ok = hex[1..].chars().all(|c| c.is_ascii_hexdigit());
        (hex.len() <= 7 && digits_ok).then_some(hex)
    }
}

impl FromStr for ColorHex {
    type Err = GalleryError;

    fn from_str(input: &str) -> Result<Self> {
        match Self::sanitize_partial(input) {
            Some(hex) if hex.len() == 7 => Ok(ColorHex(hex)),
            _ => Err(GalleryError::InvalidColor(input.to_owned())),
        }
    }
}

impl fmt::Display for ColorHex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// 接收地址不能为空也不能是零地址
pub fn parse_receiver(input: &str, token_id: U256) -> Result<Address> {
    let to = Address::from_str(input.trim()).map_err(|_| GalleryError::InvalidAddress(input.to_owned()))?;
    if to.is_zero() {
        return Err(GalleryError::TransferToZero(token_id));
    }
    Ok(to)
}

// 用本地私钥签名并发送合约写交易
pub struct Minter {
    client: SignerMiddleware<Provider<Http>, LocalWallet>,
    contract: Address,
}

impl Minter {
    pub fn new(provider: Provider<Http>, wallet: LocalWallet, contract: Address) -> Self {
        Self {
            client: SignerMiddleware::new(provider, wallet),
            contract,
        }
    }

    pub fn from_key(provider: Provider<Http>, key: &str, chain_id: u64, contract: Address) -> Result<Self> {
        let wallet = key.parse::<LocalWallet>()?.with_chain_id(chain_id);
        Ok(Self::new(provider, wallet, contract))
    }

    pub fn address(&self) -> Address {
        from_h160(self.client.address())
    }

    pub async fn mint(&self, color: &ColorHex) -> Result<B256> {
        info!(%color, "minting");
        self.send(IMonadLogoNFT::mintCall {
            color: color.to_string(),
        })
        .await
    }

    pub async fn mint_random(&self) -> Result<B256> {
        info!("minting with a random color");
        self.send(IMonadLogoNFT::mintRandomCall {}).await
    }

    pub async fn transfer_from(&self, from: Address, to: Address, token_id: U256) -> Result<B256> {
        if to.is_zero() {
            return Err(GalleryError::TransferToZero(token_id));
        }
        info!(%from, %to, %token_id, "transferring");
        self.send(IMonadLogoNFT::transferFromCall { from, to, token_id })
            .await
    }

    // 等待收据后返回交易哈希
    async fn send<C: SolCall + Send>(&self, call: C) -> Result<B256> {
        let tx = TransactionRequest::new()
            .to(to_h160(self.contract))
            .data(call.abi_encode());
        let pending = self.client.send_transaction(tx, None).await?;
        let receipt = pending.await?.ok_or(GalleryError::NoReceipt)?;
        Ok(B256::from(receipt.transaction_hash.0))
    }
}
