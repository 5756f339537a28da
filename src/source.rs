use std::sync::Arc;

use alloy_primitives::{Address, U256};
use async_trait::async_trait;

use crate::{
    contract::CollectionReader,
    error::Result,
    fetcher::IndexResolver,
    item::Location,
};

// tokenURI 和 ownerOf 并发读取，两者都成功才算定位成功
async fn locate<C>(reader: &C, token_id: U256) -> Result<Location>
where
    C: CollectionReader + ?Sized,
{
    let (uri, owner) = tokio::try_join!(reader.token_uri(token_id), reader.owner_of(token_id))?;
    Ok(Location { owner, uri })
}

// 全部 token，按 tokenByIndex 枚举
pub struct AllTokens<C: ?Sized> {
    reader: Arc<C>,
}

impl<C: ?Sized> AllTokens<C> {
    pub fn new(reader: Arc<C>) -> Self {
        Self { reader }
    }
}

#[async_trait]
impl<C> IndexResolver for AllTokens<C>
where
    C: CollectionReader + ?Sized,
{
    async fn identify(&self, index: usize) -> Result<U256> {
        self.reader.token_by_index(index).await
    }

    async fn locate(&self, token_id: U256) -> Result<Location> {
        locate(&*self.reader, token_id).await
    }
}

// 某个地址持有的 token，按 tokenOfOwnerByIndex 枚举
pub struct OwnedTokens<C: ?Sized> {
    reader: Arc<C>,
    owner: Address,
}

impl<C: ?Sized> OwnedTokens<C> {
    pub fn new(reader: Arc<C>, owner: Address) -> Self {
        Self { reader, owner }
    }

    pub fn owner(&self) -> Address {
        self.owner
    }
}

#[async_trait]
impl<C> IndexResolver for OwnedTokens<C>
where
    C: CollectionReader + ?Sized,
{
    async fn identify(&self, index: usize) -> Result<U256> {
        self.reader.token_of_owner_by_index(self.owner, index).await
    }

    async fn locate(&self, token_id: U256) -> Result<Location> {
        locate(&*self.reader, token_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GalleryError;

    // 两个地址轮流持有 token，token id = 下标 * 10
    struct Ledger {
        owners: Vec<Address>,
    }

    #[async_trait]
    impl CollectionReader for Ledger {
        async fn total_supply(&self) -> Result<usize> {
            Ok(self.owners.len())
        }

        async fn balance_of(&self, owner: Address) -> Result<usize> {
            Ok(self.owners.iter().filter(|o| **o == owner).count())
        }

        async fn token_by_index(&self, index: usize) -> Result<U256> {
            if index >= self.owners.len() {
                return Err(GalleryError::Reverted("index out of bounds".into()));
            }
            Ok(U256::from(index * 10))
        }

        async fn token_of_owner_by_index(&self, owner: Address, index: usize) -> Result<U256> {
            self.owners
                .iter()
                .enumerate()
                .filter(|(_, o)| **o == owner)
                .nth(index)
                .map(|(position, _)| U256::from(position * 10))
                .ok_or_else(|| GalleryError::Reverted("owner index out of bounds".into()))
        }

        async fn token_uri(&self, token_id: U256) -> Result<String> {
            Ok(format!("ipfs://logos/{token_id}.json"))
        }

        async fn owner_of(&self, token_id: U256) -> Result<Address> {
            let position = token_id.to::<usize>() / 10;
            self.owners
                .get(position)
                .copied()
                .ok_or_else(|| GalleryError::Reverted("no owner".into()))
        }
    }

    fn ledger() -> Arc<Ledger> {
        let alice = Address::repeat_byte(0xa1);
        let bob = Address::repeat_byte(0xb0);
        Arc::new(Ledger {
            owners: vec![alice, bob, alice, alice],
        })
    }

    #[tokio::test]
    async fn all_tokens_resolves_by_global_index() {
        let source = AllTokens::new(ledger());
        assert_eq!(source.identify(3).await.unwrap(), U256::from(30));
        assert!(source.identify(4).await.is_err());

        let location = source.locate(U256::from(10)).await.unwrap();
        assert_eq!(location.owner, Address::repeat_byte(0xb0));
        assert_eq!(location.uri, "ipfs://logos/10.json");
    }

    #[tokio::test]
    async fn owned_tokens_resolves_by_owner_index() {
        let source = OwnedTokens::new(ledger(), Address::repeat_byte(0xa1));
        assert_eq!(source.identify(0).await.unwrap(), U256::from(0));
        assert_eq!(source.identify(1).await.unwrap(), U256::from(20));
        assert_eq!(source.identify(2).await.unwrap(), U256::from(30));
        assert!(source.identify(3).await.is_err());
    }

    #[tokio::test]
    async fn locate_fails_when_owner_lookup_fails() {
        let source = AllTokens::new(ledger());
        assert!(source.locate(U256::from(990)).await.is_err());
    }
}
