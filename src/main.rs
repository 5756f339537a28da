use std::{sync::Arc, time::Duration};

use alloy_primitives::{Address, U256};
use clap::{Parser, Subcommand};
use ethers::providers::{Http, Provider};
use eyre::{Result, WrapErr};
use logo_nft_gallery::{
    card::explorer_link, minter::parse_receiver, Card, CollectionReader, ColorHex, Config, Gallery, GalleryError,
    GalleryEvent, MetadataSource, Minter, Notifier, RpcCollection, TracingNotifier,
    UriMetadataSource,
};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::mpsc,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "logo_nft_gallery", version, about = "Browse and mint ERC-721 logos")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the total supply
    Supply,
    /// Show every token, newest first
    All {
        /// Number of pages to load
        #[arg(long, default_value_t = 1)]
        pages: usize,
        /// Keep polling the supply; press Enter to load another page
        #[arg(long)]
        watch: bool,
    },
    /// Show the tokens held by an address, the wallet by default
    Mine {
        #[arg(long)]
        owner: Option<String>,
    },
    /// Mint a logo with the given #RRGGBB color
    Mint { color: String },
    /// Mint a logo with a random color
    MintRandom,
    /// Transfer one of the wallet's tokens
    Transfer {
        to: String,
        /// Decimal or 0x-prefixed token id
        #[arg(value_parser = parse_token_id)]
        token_id: U256,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    // 客户端只在这里创建一次，之后显式传递
    let provider = Provider::<Http>::try_from(config.rpc_url.as_str()).wrap_err("invalid RPC_URL")?;
    let reader = Arc::new(RpcCollection::new(
        Arc::new(provider.clone()),
        config.contract_address,
    ));
    let metadata: Arc<dyn MetadataSource> =
        Arc::new(UriMetadataSource::new(config.ipfs_gateway.clone()));
    let notifier: Arc<dyn Notifier> = Arc::new(TracingNotifier);

    match cli.command {
        Command::Supply => {
            println!("Supply: {}", reader.total_supply().await?);
        }
        Command::All { pages, watch } => {
            let gallery = Arc::new(Gallery::all_tokens(
                reader.clone(),
                metadata,
                notifier,
                config.gallery_options(),
            ));
            if watch {
                watch_all(gallery, config.poll_interval).await?;
            } else {
                let total = reader.total_supply().await?;
                gallery.handle(GalleryEvent::TotalChanged(total)).await?;
                for _ in 1..pages {
                    if gallery.handle(GalleryEvent::VisibilityEntered).await?.is_skipped() {
                        break;
                    }
                }
                println!("Supply: {total}");
                print_cards(&gallery.cards());
            }
        }
        Command::Mine { owner } => {
            let owner = match owner {
                Some(owner) => owner
                    .trim()
                    .parse::<Address>()
                    .map_err(|_| GalleryError::InvalidAddress(owner.clone()))?,
                None => minter(&config, &provider)?.address(),
            };
            let gallery = Gallery::owned_tokens(
                reader,
                None,
                metadata,
                notifier,
                config.gallery_options(),
            );
            gallery
                .handle(GalleryEvent::AddressChanged(Some(owner)))
                .await?;
            println!("Your Logos: {}", gallery.total());
            println!("{}", explorer_link(&config.explorer_url, &owner));
            print_cards(&gallery.cards());
        }
        Command::Mint { color } => {
            let color: ColorHex = color.parse()?;
            let hash = minter(&config, &provider)?.mint(&color).await?;
            println!("Minted {color} in {hash}");
        }
        Command::MintRandom => {
            let hash = minter(&config, &provider)?.mint_random().await?;
            println!("Minted a random logo in {hash}");
        }
        Command::Transfer { to, token_id } => {
            let to = parse_receiver(&to, token_id)?;
            let minter = minter(&config, &provider)?;
            let hash = minter
                .transfer_from(minter.address(), to, token_id)
                .await?;
            println!("Transferred #{token_id} to {to} in {hash}");
        }
    }
    Ok(())
}

// token id 覆盖完整的 uint256 范围
fn parse_token_id(input: &str) -> std::result::Result<U256, String> {
    input
        .trim()
        .parse::<U256>()
        .map_err(|err| format!("invalid token id `{input}`: {err}"))
}

fn minter(config: &Config, provider: &Provider<Http>) -> Result<Minter> {
    let key = config
        .read_private_key()
        .wrap_err("a private key is required for this command")?;
    Ok(Minter::from_key(
        provider.clone(),
        &key,
        config.chain_id,
        config.contract_address,
    )?)
}

fn print_cards(cards: &[Card]) {
    for card in cards {
        println!("{card}");
    }
}

// 轮询 supply，回车加载下一页，Ctrl-C 退出
async fn watch_all(gallery: Arc<Gallery<RpcCollection>>, interval: Duration) -> Result<()> {
    let (events, rx) = mpsc::unbounded_channel();
    let driver = tokio::spawn(gallery.clone().drive(rx));
    let watcher = tokio::spawn({
        let gallery = gallery.clone();
        let events = events.clone();
        async move { gallery.watch_total(events, interval).await }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut ticker = tokio::time::interval(interval);
    let mut shown = gallery.snapshot();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = lines.next_line() => match line? {
                Some(_) => {
                    let _ = events.send(GalleryEvent::VisibilityEntered);
                }
                None => break,
            },
            _ = ticker.tick() => {
                let current = gallery.snapshot();
                if !Arc::ptr_eq(&shown, &current) {
                    println!("Supply: {}", gallery.total());
                    print_cards(&gallery.cards());
                    shown = current;
                }
            }
        }
    }

    watcher.abort();
    let _ = watcher.await;
    drop(events);
    driver.await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_ids_keep_the_full_uint256_range() {
        assert_eq!(parse_token_id(&U256::MAX.to_string()).unwrap(), U256::MAX);
        assert_eq!(parse_token_id("0x10").unwrap(), U256::from(16));
        assert!(parse_token_id("-1").is_err());
    }

    #[test]
    fn transfer_accepts_ids_above_u64() {
        let id = "18446744073709551616";
        let cli = Cli::try_parse_from([
            "logo_nft_gallery",
            "transfer",
            "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed",
            id,
        ])
        .unwrap();
        let Command::Transfer { token_id, .. } = cli.command else {
            panic!("expected a transfer command");
        };
        assert_eq!(token_id, U256::from(u64::MAX) + U256::from(1));
    }
}
