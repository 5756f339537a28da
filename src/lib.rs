// ERC-721 画廊客户端：分批并发加载 token，并提供铸造和转账
pub mod card;
pub mod config;
pub mod contract;
pub mod error;
pub mod fetcher;
pub mod gallery;
pub mod item;
pub mod metadata;
pub mod minter;
pub mod notify;
pub mod source;

pub use crate::{
    card::{Card, TokenCard},
    config::Config,
    contract::{CollectionReader, RpcCollection},
    error::{GalleryError, Result},
    fetcher::{
        Direction, FetchOutcome, FetchWindow, Fetcher, IndexResolver, Resize, SessionReport,
    },
    gallery::{Gallery, GalleryEvent, GalleryKind, GalleryOptions},
    item::{Item, Location, Slot, Stage},
    metadata::{MetadataSource, TokenMetadata, UriMetadataSource},
    minter::{ColorHex, Minter},
    notify::{Notification, Notifier, QueueNotifier, TracingNotifier},
    source::{AllTokens, OwnedTokens},
};
