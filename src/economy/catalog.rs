//! Authoritative price list. Purchase prices always come from here, never from the
//! request.

use std::collections::BTreeMap;

use crate::config::CatalogConfig;
use crate::storage::ItemKind;

#[derive(Debug, Clone, Default)]
pub struct ItemCatalog {
    prices: BTreeMap<(ItemKind, String), u64>,
}

impl ItemCatalog {
    pub fn from_config(config: &CatalogConfig) -> Self {
        let prices = config
            .items
            .iter()
            .map(|item| ((item.kind, item.id.clone()), item.price))
            .collect();
        Self { prices }
    }

    pub fn price(&self, kind: ItemKind, id: &str) -> Option<u64> {
        self.prices.get(&(kind, id.to_string())).copied()
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CatalogItemConfig;

    #[test]
    fn prices_are_keyed_by_kind_and_id() {
        let config = CatalogConfig {
            items: vec![
                CatalogItemConfig {
                    kind: ItemKind::Skin,
                    id: "gold".to_string(),
                    price: 100,
                },
                CatalogItemConfig {
                    kind: ItemKind::Character,
                    id: "gold".to_string(),
                    price: 900,
                },
            ],
        };
        let catalog = ItemCatalog::from_config(&config);
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.price(ItemKind::Skin, "gold"), Some(100));
        assert_eq!(catalog.price(ItemKind::Character, "gold"), Some(900));
        assert_eq!(catalog.price(ItemKind::Skin, "silver"), None);
    }
}
