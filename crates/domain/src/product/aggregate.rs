//! Product aggregate.

use chrono::Utc;
use common::AggregateId;
use event_store::Version;
use serde::{Deserialize, Serialize};

use crate::aggregate::Aggregate;
use crate::values::{Money, ProductId};

use super::{
    PriceChangedData, ProductError, ProductEvent, ProductRegisteredData, RestockReason,
    StockDecrementedData, StockIncrementedData,
};

/// A sellable product with a live price and a non-negative stock count.
///
/// Stock only moves through quantity-bounded decrements and increments;
/// there is no command that sets it outright.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Product {
    id: Option<ProductId>,
    #[serde(default)]
    version: Version,
    title: String,
    thumbnail: Option<String>,
    price: Money,
    stock: u32,
}

impl Aggregate for Product {
    type Event = ProductEvent;
    type Error = ProductError;

    fn aggregate_type() -> &'static str {
        "Product"
    }

    fn id(&self) -> Option<AggregateId> {
        self.id.map(Into::into)
    }

    fn version(&self) -> Version {
        self.version
    }

    fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    fn apply(&mut self, event: Self::Event) {
        match event {
            ProductEvent::ProductRegistered(data) => {
                self.id = Some(data.product_id);
                self.title = data.title;
                self.price = data.price;
                self.stock = data.stock;
                self.thumbnail = data.thumbnail;
            }
            ProductEvent::PriceChanged(data) => self.price = data.new_price,
            ProductEvent::StockDecremented(data) => {
                self.stock = self.stock.saturating_sub(data.quantity);
            }
            ProductEvent::StockIncremented(data) => {
                self.stock = self.stock.saturating_add(data.quantity);
            }
        }
    }
}

impl Product {
    pub fn product_id(&self) -> Option<ProductId> {
        self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn thumbnail(&self) -> Option<&str> {
        self.thumbnail.as_deref()
    }

    pub fn price(&self) -> Money {
        self.price
    }

    pub fn stock(&self) -> u32 {
        self.stock
    }

    fn require_registered(&self) -> Result<ProductId, ProductError> {
        self.id.ok_or(ProductError::NotRegistered)
    }
}

impl Product {
    pub fn register(
        &self,
        product_id: ProductId,
        title: String,
        price: Money,
        stock: u32,
        thumbnail: Option<String>,
    ) -> Result<Vec<ProductEvent>, ProductError> {
        if self.id.is_some() {
            return Err(ProductError::AlreadyRegistered);
        }
        if title.trim().is_empty() {
            return Err(ProductError::TitleRequired);
        }
        if price.is_negative() {
            return Err(ProductError::InvalidPrice {
                price: price.cents(),
            });
        }

        Ok(vec![ProductEvent::ProductRegistered(ProductRegisteredData {
            product_id,
            title,
            price,
            stock,
            thumbnail,
            registered_at: Utc::now(),
        })])
    }

    pub fn change_price(&self, new_price: Money) -> Result<Vec<ProductEvent>, ProductError> {
        self.require_registered()?;
        if new_price.is_negative() {
            return Err(ProductError::InvalidPrice {
                price: new_price.cents(),
            });
        }
        if new_price == self.price {
            return Ok(vec![]);
        }

        Ok(vec![ProductEvent::PriceChanged(PriceChangedData {
            old_price: self.price,
            new_price,
            changed_at: Utc::now(),
        })])
    }

    /// Takes `quantity` units, failing if that would drive stock below zero.
    pub fn decrement_stock(
        &self,
        quantity: u32,
        order_id: Option<AggregateId>,
    ) -> Result<Vec<ProductEvent>, ProductError> {
        let product_id = self.require_registered()?;
        if quantity == 0 {
            return Err(ProductError::InvalidQuantity { quantity });
        }
        if quantity > self.stock {
            return Err(ProductError::InsufficientStock {
                product_id,
                requested: quantity,
                available: self.stock,
            });
        }

        Ok(vec![ProductEvent::StockDecremented(StockDecrementedData {
            quantity,
            order_id,
            at: Utc::now(),
        })])
    }

    /// Returns `quantity` units. Increments have no floor to violate.
    pub fn increment_stock(
        &self,
        quantity: u32,
        order_id: Option<AggregateId>,
        reason: RestockReason,
    ) -> Result<Vec<ProductEvent>, ProductError> {
        self.require_registered()?;
        if quantity == 0 {
            return Ok(vec![]);
        }

        Ok(vec![ProductEvent::StockIncremented(StockIncrementedData {
            quantity,
            order_id,
            reason,
            at: Utc::now(),
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registered(stock: u32) -> Product {
        let mut product = Product::default();
        let events = product
            .register(
                ProductId::new(),
                "Enamel mug".to_string(),
                Money::from_cents(1200),
                stock,
                Some("/img/mug.png".to_string()),
            )
            .unwrap();
        product.apply_events(events);
        product
    }

    #[test]
    fn register_sets_catalog_fields() {
        let product = registered(3);
        assert_eq!(product.title(), "Enamel mug");
        assert_eq!(product.price(), Money::from_cents(1200));
        assert_eq!(product.stock(), 3);
        assert_eq!(product.thumbnail(), Some("/img/mug.png"));
    }

    #[test]
    fn register_twice_is_rejected() {
        let product = registered(1);
        let result = product.register(ProductId::new(), "x".into(), Money::zero(), 1, None);
        assert!(matches!(result, Err(ProductError::AlreadyRegistered)));
    }

    #[test]
    fn register_rejects_negative_price_and_blank_title() {
        let product = Product::default();
        assert!(matches!(
            product.register(ProductId::new(), "Mug".into(), Money::from_cents(-1), 1, None),
            Err(ProductError::InvalidPrice { price: -1 })
        ));
        assert!(matches!(
            product.register(ProductId::new(), "  ".into(), Money::zero(), 1, None),
            Err(ProductError::TitleRequired)
        ));
    }

    #[test]
    fn decrement_cannot_go_below_zero() {
        let mut product = registered(2);

        let result = product.decrement_stock(3, None);
        assert!(matches!(
            result,
            Err(ProductError::InsufficientStock { requested: 3, available: 2, .. })
        ));

        let events = product.decrement_stock(2, None).unwrap();
        product.apply_events(events);
        assert_eq!(product.stock(), 0);
    }

    #[test]
    fn increment_is_additive() {
        let mut product = registered(0);
        let events = product
            .increment_stock(4, None, RestockReason::Manual)
            .unwrap();
        product.apply_events(events);
        assert_eq!(product.stock(), 4);

        assert!(product.increment_stock(0, None, RestockReason::Manual).unwrap().is_empty());
    }

    #[test]
    fn unchanged_price_records_nothing() {
        let product = registered(1);
        assert!(product.change_price(Money::from_cents(1200)).unwrap().is_empty());
        assert_eq!(product.change_price(Money::from_cents(900)).unwrap().len(), 1);
    }

    #[test]
    fn commands_on_unregistered_product_fail() {
        let product = Product::default();
        assert!(matches!(
            product.decrement_stock(1, None),
            Err(ProductError::NotRegistered)
        ));
    }
}
