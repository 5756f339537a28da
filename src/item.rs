use alloy_primitives::{Address, U256};

use crate::metadata::TokenMetadata;

// tokenURI 与 ownerOf 一起读出的定位信息
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Location {
    pub owner: Address,
    pub uri: String,
}

// 单个 token 的解析阶段，字段按阶段逐步补全
#[derive(Clone, Debug, PartialEq)]
pub enum Item {
    IdentifierOnly {
        token_id: U256,
    },
    WithOwnerAndUri {
        token_id: U256,
        owner: Address,
        uri: String,
    },
    Complete {
        token_id: U256,
        owner: Address,
        uri: String,
        metadata: TokenMetadata,
    },
}

impl Item {
    pub fn token_id(&self) -> U256 {
        match self {
            Item::IdentifierOnly { token_id }
            | Item::WithOwnerAndUri { token_id, .. }
            | Item::Complete { token_id, .. } => *token_id,
        }
    }

    pub fn owner(&self) -> Option<Address> {
        match self {
            Item::IdentifierOnly { .. } => None,
            Item::WithOwnerAndUri { owner, .. } | Item::Complete { owner, .. } => Some(*owner),
        }
    }

    pub fn uri(&self) -> Option<&str> {
        match self {
            Item::IdentifierOnly { .. } => None,
            Item::WithOwnerAndUri { uri, .. } | Item::Complete { uri, .. } => Some(uri),
        }
    }

    pub fn metadata(&self) -> Option<&TokenMetadata> {
        match self {
            Item::Complete { metadata, .. } => Some(metadata),
            _ => None,
        }
    }

    pub fn stage(&self) -> Stage {
        match self {
            Item::IdentifierOnly { .. } => Stage::Identified,
            Item::WithOwnerAndUri { .. } => Stage::Located,
            Item::Complete { .. } => Stage::Complete,
        }
    }
}

// 一个槽位走到的最远阶段
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Unresolved,
    Identified,
    Located,
    Complete,
}

// 集合中的一个位置，未解析或者已解析
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Slot {
    #[default]
    Unresolved,
    Resolved(Item),
}

impl Slot {
    pub fn is_resolved(&self) -> bool {
        matches!(self, Slot::Resolved(_))
    }

    pub fn item(&self) -> Option<&Item> {
        match self {
            Slot::Resolved(item) => Some(item),
            Slot::Unresolved => None,
        }
    }

    pub fn token_id(&self) -> Option<U256> {
        self.item().map(Item::token_id)
    }

    pub fn stage(&self) -> Stage {
        self.item().map_or(Stage::Unresolved, Item::stage)
    }
}
