use std::str::FromStr;

use itertools::Itertools;

use super::{PaymentKey, Product};

/// Browse-list predicate. Never persisted.
///
/// Unset fields do not constrain; an empty filter matches every listing.
/// Selected payment methods must all be accepted by a listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterOptions {
    pub is_new: Option<bool>,
    pub accept_trade: Option<bool>,
    pub payment_methods: Vec<PaymentKey>,
    pub query: Option<String>,
}

impl FilterOptions {
    pub fn is_empty(&self) -> bool {
        self.is_new.is_none()
            && self.accept_trade.is_none()
            && self.payment_methods.is_empty()
            && self.query_text().is_none()
    }

    fn query_text(&self) -> Option<&str> {
        self.query.as_deref().map(str::trim).filter(|q| !q.is_empty())
    }

    pub fn matches(&self, product: &Product) -> bool {
        if let Some(is_new) = self.is_new {
            if product.is_new != is_new {
                return false;
            }
        }
        if let Some(accept_trade) = self.accept_trade {
            if product.accept_trade != accept_trade {
                return false;
            }
        }
        if !self.payment_methods.iter().all(|k| product.accepts(*k)) {
            return false;
        }
        match self.query_text() {
            Some(query) => product.name.to_lowercase().contains(&query.to_lowercase()),
            None => true,
        }
    }

    /// Query-string pairs for `GET /products`.
    pub fn to_query(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![];
        if let Some(is_new) = self.is_new {
            pairs.push(("is_new", is_new.to_string()));
        }
        if let Some(accept_trade) = self.accept_trade {
            pairs.push(("accept_trade", accept_trade.to_string()));
        }
        pairs.extend(
            self.payment_methods
                .iter()
                .unique()
                .map(|k| ("payment_methods", k.as_str().to_string())),
        );
        if let Some(query) = self.query_text() {
            pairs.push(("query", query.to_string()));
        }
        pairs
    }
}

/// Status selector for the "my ads" list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdStatus {
    All,
    Active,
    Inactive,
}

impl Default for AdStatus {
    fn default() -> Self {
        AdStatus::All
    }
}

impl AdStatus {
    pub fn matches(self, product: &Product) -> bool {
        match self {
            AdStatus::All => true,
            AdStatus::Active => product.is_active,
            AdStatus::Inactive => !product.is_active,
        }
    }
}

impl FromStr for AdStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "all" => Ok(AdStatus::All),
            "active" => Ok(AdStatus::Active),
            "inactive" => Ok(AdStatus::Inactive),
            other => Err(format!("Unknown status '{}', expected all, active or inactive", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::fixtures::product;
    use crate::model::PaymentMethod;

    #[test]
    fn empty_filter_matches_everything() {
        let filter = FilterOptions::default();
        assert!(filter.is_empty());
        assert!(filter.matches(&product("a", true)));
        assert!(filter.to_query().is_empty());
    }

    #[test]
    fn condition_and_trade_narrow_the_list() {
        let mut used = product("a", true);
        used.is_new = false;
        let mut new = product("b", true);
        new.is_new = true;
        new.accept_trade = false;

        let filter = FilterOptions {
            is_new: Some(true),
            ..Default::default()
        };
        assert!(!filter.matches(&used));
        assert!(filter.matches(&new));

        let filter = FilterOptions {
            accept_trade: Some(true),
            ..Default::default()
        };
        assert!(filter.matches(&used));
        assert!(!filter.matches(&new));
    }

    #[test]
    fn every_selected_payment_method_must_be_accepted() {
        let mut item = product("a", true);
        item.payment_methods.push(PaymentMethod {
            key: "cash".to_string(),
            name: "Cash".to_string(),
        });
        let both = FilterOptions {
            payment_methods: vec![PaymentKey::Pix, PaymentKey::Cash],
            ..Default::default()
        };
        let card = FilterOptions {
            payment_methods: vec![PaymentKey::Card],
            ..Default::default()
        };
        assert!(both.matches(&item));
        assert!(!card.matches(&item));
    }

    #[test]
    fn query_is_case_insensitive_and_blank_is_ignored() {
        let item = product("bike", true);
        let hit = FilterOptions {
            query: Some("ITEM bi".to_string()),
            ..Default::default()
        };
        let blank = FilterOptions {
            query: Some("   ".to_string()),
            ..Default::default()
        };
        assert!(hit.matches(&item));
        assert!(blank.is_empty());
    }

    #[test]
    fn query_pairs_dedupe_payment_methods() {
        let filter = FilterOptions {
            is_new: Some(false),
            payment_methods: vec![PaymentKey::Pix, PaymentKey::Pix, PaymentKey::Boleto],
            ..Default::default()
        };
        assert_eq!(
            filter.to_query(),
            vec![
                ("is_new", "false".to_string()),
                ("payment_methods", "pix".to_string()),
                ("payment_methods", "boleto".to_string()),
            ]
        );
    }

    #[test]
    fn status_selector() {
        assert!(AdStatus::Active.matches(&product("a", true)));
        assert!(!AdStatus::Active.matches(&product("a", false)));
        assert!(AdStatus::Inactive.matches(&product("a", false)));
        assert_eq!("Inactive".parse::<AdStatus>().unwrap(), AdStatus::Inactive);
    }
}
