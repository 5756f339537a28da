use std::fmt;

use alloy_primitives::{Address, U256};

use crate::item::{Item, Slot};

// 0x1234...abcd
pub fn short_address(address: &Address) -> String {
    let checksummed = address.to_checksum(None);
    format!(
        "{}...{}",
        &checksummed[..6],
        &checksummed[checksummed.len() - 4..]
    )
}

pub fn explorer_link(explorer_url: &str, address: &Address) -> String {
    format!(
        "{}/address/{}",
        explorer_url.trim_end_matches('/'),
        address.to_checksum(None)
    )
}

#[derive(Clone, Debug, PartialEq)]
pub struct TokenCard {
    pub token_id: U256,
    pub owner: Option<Address>,
    pub show_owner: bool,
    pub name: Option<String>,
    pub image: Option<String>,
    pub color: Option<String>,
}

// 未解析的槽位显示为骨架卡片
#[derive(Clone, Debug, PartialEq)]
pub enum Card {
    Skeleton { label: U256 },
    Token(TokenCard),
}

impl Card {
    pub fn from_slot(slot: &Slot, placeholder: U256, show_owner: bool) -> Self {
        match slot {
            Slot::Unresolved => Card::Skeleton { label: placeholder },
            Slot::Resolved(item) => Card::Token(TokenCard::from_item(item, show_owner)),
        }
    }

    pub fn is_skeleton(&self) -> bool {
        matches!(self, Card::Skeleton { .. })
    }
}

impl TokenCard {
    pub fn from_item(item: &Item, show_owner: bool) -> Self {
        let metadata = item.metadata();
        Self {
            token_id: item.token_id(),
            owner: item.owner(),
            show_owner,
            name: metadata.map(|m| m.name.clone()),
            image: metadata.map(|m| m.image.clone()),
            color: metadata.and_then(|m| m.color()),
        }
    }
}

const PENDING: &str = "...";

impl fmt::Display for Card {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Card::Skeleton { label } => write!(f, "# {:<6} loading", label.to_string()),
            Card::Token(card) => {
                write!(f, "# {:<6}", card.token_id.to_string())?;
                if card.show_owner {
                    let owner = card.owner.as_ref().map(short_address);
                    write!(f, " owner: {:<13}", owner.as_deref().unwrap_or(PENDING))?;
                }
                write!(f, " color: {}", card.color.as_deref().unwrap_or(PENDING))?;
                if let Some(name) = &card.name {
                    write!(f, " {name}")?;
                }
                Ok(())
            }
        }
    }
}
