use alloy_primitives::U256;
use ethers::{
    middleware::signer::SignerMiddlewareError,
    providers::{Http, Provider, ProviderError},
    signers::{LocalWallet, WalletError},
};
use thiserror::Error;

// 库内统一的错误类型
#[derive(Debug, Error)]
pub enum GalleryError {
    // 缺少必需的环境变量
    #[error("missing environment variable `{0}`")]
    MissingVar(&'static str),

    // 环境变量格式不正确
    #[error("invalid value for `{name}`: {reason}")]
    InvalidVar { name: &'static str, reason: String },

    // 地址解析失败
    #[error("invalid address `{0}`")]
    InvalidAddress(String),

    // 不能转账到零地址
    #[error("refusing to transfer token {0} to the zero address")]
    TransferToZero(U256),

    // 颜色格式必须是 #RRGGBB
    #[error("invalid color `{0}`, expected #RRGGBB")]
    InvalidColor(String),

    // 链上数量超出 usize 范围
    #[error("value {0} does not fit into an index")]
    IndexOverflow(U256),

    // 合约 revert 并带有已知的 ERC-721 错误
    #[error("contract reverted: {0}")]
    Reverted(String),

    // 元数据 URI 无法识别
    #[error("unsupported metadata uri `{0}`")]
    UnsupportedUri(String),

    // 元数据服务返回非成功状态码
    #[error("metadata request for `{uri}` failed with status {status}")]
    MetadataStatus { uri: String, status: u16 },

    // 交易已发送但没有收据
    #[error("transaction dropped before a receipt was produced")]
    NoReceipt,

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Signer(#[from] SignerMiddlewareError<Provider<Http>, LocalWallet>),

    #[error(transparent)]
    Wallet(#[from] WalletError),

    #[error(transparent)]
    Abi(#[from] alloy_sol_types::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Base64(#[from] base64::DecodeError),

    #[error(transparent)]
    Hex(#[from] hex::FromHexError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = GalleryError> = core::result::Result<T, E>;
