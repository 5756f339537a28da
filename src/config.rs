use std::{env, fs, path::PathBuf, str::FromStr, time::Duration};

use alloy_primitives::Address;
use dotenv::dotenv;

use crate::{
    error::{GalleryError, Result},
    fetcher::DEFAULT_BATCH_SIZE,
    gallery::GalleryOptions,
};

// Monad devnet 的链参数
pub const MONAD_DEVNET_CHAIN_ID: u64 = 20143;
pub const MONAD_DEVNET_EXPLORER: &str = "https://explorer.monad-devnet.devnet101.com/";
pub const DEFAULT_IPFS_GATEWAY: &str = "https://ipfs.io/ipfs/";
pub const DEFAULT_PAGE_SIZE: usize = 10;
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(4000);

#[derive(Clone, Debug)]
pub struct Config {
    pub rpc_url: String,
    pub contract_address: Address,
    pub chain_id: u64,
    pub explorer_url: String,
    pub ipfs_gateway: String,
    pub priv_key_path: Option<PathBuf>,
    pub batch_size: usize,
    pub page_size: usize,
    pub poll_interval: Duration,
}

impl Config {
    // 先加载 .env，再读取环境变量
    pub fn from_env() -> Result<Self> {
        dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let required = |name: &'static str| lookup(name).ok_or(GalleryError::MissingVar(name));

        let rpc_url = required("RPC_URL")?;
        let contract_address = required("CONTRACT_ADDRESS")?;
        let contract_address = Address::from_str(contract_address.trim())
            .map_err(|_| GalleryError::InvalidAddress(contract_address))?;

        Ok(Self {
            rpc_url,
            contract_address,
            chain_id: parse_or(&lookup, "CHAIN_ID", MONAD_DEVNET_CHAIN_ID)?,
            explorer_url: lookup("EXPLORER_URL").unwrap_or_else(|| MONAD_DEVNET_EXPLORER.into()),
            ipfs_gateway: lookup("IPFS_GATEWAY").unwrap_or_else(|| DEFAULT_IPFS_GATEWAY.into()),
            priv_key_path: lookup("PRIV_KEY_PATH").map(PathBuf::from),
            batch_size: positive(parse_or(&lookup, "BATCH_SIZE", DEFAULT_BATCH_SIZE)?, "BATCH_SIZE")?,
            page_size: positive(parse_or(&lookup, "PAGE_SIZE", DEFAULT_PAGE_SIZE)?, "PAGE_SIZE")?,
            poll_interval: Duration::from_millis(parse_or(
                &lookup,
                "POLL_INTERVAL_MS",
                DEFAULT_POLL_INTERVAL.as_millis() as u64,
            )?),
        })
    }

    pub fn gallery_options(&self) -> GalleryOptions {
        GalleryOptions {
            batch_size: self.batch_size,
            page_size: self.page_size,
        }
    }

    // 私钥文件里是 32 字节的十六进制串，可以带 0x
    pub fn read_private_key(&self) -> Result<String> {
        let path = self
            .priv_key_path
            .as_ref()
            .ok_or(GalleryError::MissingVar("PRIV_KEY_PATH"))?;
        parse_private_key(&fs::read_to_string(path)?)
    }
}

pub fn parse_private_key(raw: &str) -> Result<String> {
    let key = raw.trim();
    let key = key.strip_prefix("0x").unwrap_or(key);
    let bytes = hex::decode(key)?;
    if bytes.len() != 32 {
        return Err(GalleryError::InvalidVar {
            name: "PRIV_KEY_PATH",
            reason: format!("expected 32 bytes, found {}", bytes.len()),
        });
    }
    Ok(key.to_owned())
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, name: &'static str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|err: T::Err| GalleryError::InvalidVar {
            name,
            reason: err.to_string(),
        }),
    }
}

fn positive(value: usize, name: &'static str) -> Result<usize> {
    if value == 0 {
        return Err(GalleryError::InvalidVar {
            name,
            reason: "must be greater than zero".into(),
        });
    }
    Ok(value)
}
