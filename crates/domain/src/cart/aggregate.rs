//! Cart aggregate implementation.

use std::fmt;

use chrono::Utc;
use common::{AggregateId, UserId};
use event_store::Version;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::aggregate::{Aggregate, SnapshotCapable};
use crate::product::Product;
use crate::values::{Money, ProductId, SelectedOptions};

use super::{
    CartCheckedOutData, CartClearedData, CartError, CartEvent, CartOpenedData, ItemAddedData,
    ItemQuantityChangedData, ItemRemovedData, ItemsRestoredData,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CartItemId(Uuid);

impl CartItemId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for CartItemId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CartItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A line in the cart. Price, title and thumbnail are snapshots taken when
/// the line was first added.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    pub item_id: CartItemId,
    pub product_id: ProductId,
    pub quantity: u32,
    pub price: Money,
    pub title: String,
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub selected_options: SelectedOptions,
}

impl CartItem {
    pub fn line_total(&self) -> Money {
        self.price.multiply(self.quantity)
    }

    /// Same product with the same options is the same logical item.
    fn same_item_as(&self, product_id: ProductId, options: &SelectedOptions) -> bool {
        self.product_id == product_id && &self.selected_options == options
    }
}

/// A user's cart. The stream id is the owner's user id.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Cart {
    id: Option<AggregateId>,
    #[serde(default)]
    version: Version,
    owner: Option<UserId>,
    items: Vec<CartItem>,
    sub_total: Money,
}

impl Aggregate for Cart {
    type Event = CartEvent;
    type Error = CartError;

    fn aggregate_type() -> &'static str {
        "Cart"
    }

    fn id(&self) -> Option<AggregateId> {
        self.id
    }

    fn version(&self) -> Version {
        self.version
    }

    fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    fn apply(&mut self, event: Self::Event) {
        match event {
            CartEvent::CartOpened(data) => {
                self.id = Some(data.cart_id);
                self.owner = Some(data.owner);
            }
            CartEvent::ItemAdded(data) => self.items.push(data.item),
            CartEvent::ItemQuantityChanged(data) => {
                if let Some(item) = self.items.iter_mut().find(|i| i.item_id == data.item_id) {
                    item.quantity = data.new_quantity;
                }
            }
            CartEvent::ItemRemoved(data) => self.items.retain(|i| i.item_id != data.item_id),
            CartEvent::CartCleared(_) | CartEvent::CartCheckedOut(_) => self.items.clear(),
            CartEvent::ItemsRestored(data) => {
                for restored in data.items {
                    match self
                        .items
                        .iter_mut()
                        .find(|i| i.same_item_as(restored.product_id, &restored.selected_options))
                    {
                        Some(existing) => {
                            existing.quantity = existing.quantity.saturating_add(restored.quantity)
                        }
                        None => self.items.push(restored),
                    }
                }
            }
        }
        self.recompute_sub_total();
    }
}

impl SnapshotCapable for Cart {
    fn snapshot_interval() -> usize {
        50
    }
}

// Query methods
impl Cart {
    pub fn owner(&self) -> Option<UserId> {
        self.owner
    }

    pub fn items(&self) -> &[CartItem] {
        &self.items
    }

    pub fn item(&self, item_id: CartItemId) -> Option<&CartItem> {
        self.items.iter().find(|i| i.item_id == item_id)
    }

    pub fn sub_total(&self) -> Money {
        self.sub_total
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn total_quantity(&self) -> u32 {
        self.items
            .iter()
            .fold(0u32, |total, i| total.saturating_add(i.quantity))
    }

    /// The sub-total if line `replaced` (or a new line when `None`) held
    /// `quantity` at `price`.
    fn sub_total_with(
        &self,
        replaced: Option<CartItemId>,
        price: Money,
        quantity: u32,
    ) -> Result<Money, CartError> {
        let others = self
            .items
            .iter()
            .filter(|i| Some(i.item_id) != replaced)
            .map(|i| (i.price, i.quantity));
        Money::checked_total(others.chain([(price, quantity)])).ok_or(CartError::AmountTooLarge)
    }

    /// `sub_total` is derived state and is rebuilt after every event.
    fn recompute_sub_total(&mut self) {
        self.sub_total = self.items.iter().map(CartItem::line_total).sum();
    }

    fn require_open(&self) -> Result<(), CartError> {
        self.id.map(|_| ()).ok_or(CartError::NotOpened)
    }
}

fn positive_quantity(quantity: i64) -> Result<u32, CartError> {
    u32::try_from(quantity)
        .ok()
        .filter(|q| *q > 0)
        .ok_or(CartError::InvalidQuantity { quantity })
}

// Command methods (return events)
impl Cart {
    pub fn open(&self, cart_id: AggregateId, owner: UserId) -> Result<Vec<CartEvent>, CartError> {
        if self.id.is_some() {
            return Err(CartError::AlreadyOpened);
        }

        Ok(vec![CartEvent::CartOpened(CartOpenedData {
            cart_id,
            owner,
            opened_at: Utc::now(),
        })])
    }

    /// Adds `quantity` of a product, merging into an existing line with the
    /// same options.
    pub fn add_item(
        &self,
        product: &Product,
        quantity: i64,
        selected_options: SelectedOptions,
    ) -> Result<Vec<CartEvent>, CartError> {
        self.require_open()?;
        let quantity = positive_quantity(quantity)?;
        let product_id = product.product_id().ok_or(CartError::UnknownProduct)?;

        if let Some(existing) = self
            .items
            .iter()
            .find(|i| i.same_item_as(product_id, &selected_options))
        {
            let new_quantity = existing
                .quantity
                .checked_add(quantity)
                .ok_or(CartError::AmountTooLarge)?;
            self.sub_total_with(Some(existing.item_id), existing.price, new_quantity)?;
            return Ok(vec![CartEvent::ItemQuantityChanged(ItemQuantityChangedData {
                item_id: existing.item_id,
                old_quantity: existing.quantity,
                new_quantity,
            })]);
        }

        self.sub_total_with(None, product.price(), quantity)?;
        Ok(vec![CartEvent::ItemAdded(ItemAddedData {
            item: CartItem {
                item_id: CartItemId::new(),
                product_id,
                quantity,
                price: product.price(),
                title: product.title().to_string(),
                thumbnail: product.thumbnail().map(str::to_string),
                selected_options,
            },
            added_at: Utc::now(),
        })])
    }

    /// Replaces an item's quantity; zero or less removes the item.
    pub fn set_item_quantity(
        &self,
        item_id: CartItemId,
        quantity: i64,
    ) -> Result<Vec<CartEvent>, CartError> {
        let item = self.item(item_id).ok_or(CartError::ItemNotFound(item_id))?;

        if quantity <= 0 {
            return Ok(vec![CartEvent::ItemRemoved(ItemRemovedData { item_id })]);
        }
        let quantity = positive_quantity(quantity)?;
        if quantity == item.quantity {
            return Ok(vec![]);
        }
        self.sub_total_with(Some(item_id), item.price, quantity)?;

        Ok(vec![CartEvent::ItemQuantityChanged(ItemQuantityChangedData {
            item_id,
            old_quantity: item.quantity,
            new_quantity: quantity,
        })])
    }

    pub fn remove_item(&self, item_id: CartItemId) -> Result<Vec<CartEvent>, CartError> {
        self.item(item_id).ok_or(CartError::ItemNotFound(item_id))?;
        Ok(vec![CartEvent::ItemRemoved(ItemRemovedData { item_id })])
    }

    /// Empties the cart. Clearing an empty cart records nothing.
    pub fn clear(&self) -> Result<Vec<CartEvent>, CartError> {
        if self.items.is_empty() {
            return Ok(vec![]);
        }
        Ok(vec![CartEvent::CartCleared(CartClearedData {
            cleared_at: Utc::now(),
        })])
    }

    pub fn check_out(&self, order_id: AggregateId) -> Result<Vec<CartEvent>, CartError> {
        self.require_open()?;
        if self.items.is_empty() {
            return Err(CartError::EmptyCart);
        }
        Ok(vec![CartEvent::CartCheckedOut(CartCheckedOutData {
            order_id,
            checked_out_at: Utc::now(),
        })])
    }

    /// Puts items from an abandoned order back. Opens the cart first if the
    /// stream does not exist.
    pub fn restore_items(
        &self,
        cart_id: AggregateId,
        owner: UserId,
        order_id: AggregateId,
        items: Vec<CartItem>,
    ) -> Result<Vec<CartEvent>, CartError> {
        if items.is_empty() {
            return Ok(vec![]);
        }

        let mut events = if self.id.is_none() {
            self.open(cart_id, owner)?
        } else {
            vec![]
        };
        events.push(CartEvent::ItemsRestored(ItemsRestoredData { order_id, items }));
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::values::ProductId;

    fn product(price: i64) -> Product {
        let mut product = Product::default();
        let events = product
            .register(ProductId::new(), "Tee".to_string(), Money::from_cents(price), 10, None)
            .unwrap();
        product.apply_events(events);
        product
    }

    fn open_cart() -> Cart {
        let owner = UserId::new();
        let mut cart = Cart::default();
        let events = cart.open(owner.cart_id(), owner).unwrap();
        cart.apply_events(events);
        cart
    }

    fn add(cart: &mut Cart, product: &Product, quantity: i64, options: SelectedOptions) {
        let events = cart.add_item(product, quantity, options).unwrap();
        cart.apply_events(events);
    }

    #[test]
    fn add_item_snapshots_product_and_recomputes_sub_total() {
        let mut cart = open_cart();
        let tee = product(1000);

        add(&mut cart, &tee, 2, SelectedOptions::new());

        assert_eq!(cart.items().len(), 1);
        assert_eq!(cart.items()[0].title, "Tee");
        assert_eq!(cart.items()[0].price, Money::from_cents(1000));
        assert_eq!(cart.sub_total(), Money::from_cents(2000));
    }

    #[test]
    fn same_product_and_options_merge_into_one_line() {
        let mut cart = open_cart();
        let tee = product(1000);
        let medium = SelectedOptions::new().with("size", "M");

        add(&mut cart, &tee, 1, medium.clone());
        add(&mut cart, &tee, 2, medium);
        assert_eq!(cart.items().len(), 1);
        assert_eq!(cart.items()[0].quantity, 3);

        add(&mut cart, &tee, 1, SelectedOptions::new().with("size", "L"));
        assert_eq!(cart.items().len(), 2);
        assert_eq!(cart.sub_total(), Money::from_cents(4000));
    }

    #[test]
    fn add_item_rejects_non_positive_quantity() {
        let cart = open_cart();
        let tee = product(1000);
        for quantity in [0, -3, i64::from(u32::MAX) + 1] {
            assert!(matches!(
                cart.add_item(&tee, quantity, SelectedOptions::new()),
                Err(CartError::InvalidQuantity { .. })
            ));
        }
    }

    #[test]
    fn set_quantity_replaces_or_removes() {
        let mut cart = open_cart();
        let tee = product(1000);
        add(&mut cart, &tee, 2, SelectedOptions::new());
        let item_id = cart.items()[0].item_id;

        let events = cart.set_item_quantity(item_id, 5).unwrap();
        cart.apply_events(events);
        assert_eq!(cart.sub_total(), Money::from_cents(5000));

        assert!(cart.set_item_quantity(item_id, 5).unwrap().is_empty());

        let events = cart.set_item_quantity(item_id, 0).unwrap();
        cart.apply_events(events);
        assert!(cart.is_empty());
        assert_eq!(cart.sub_total(), Money::zero());
    }

    #[test]
    fn unknown_item_is_not_found() {
        let cart = open_cart();
        let missing = CartItemId::new();
        assert!(matches!(
            cart.set_item_quantity(missing, 1),
            Err(CartError::ItemNotFound(id)) if id == missing
        ));
        assert!(matches!(cart.remove_item(missing), Err(CartError::ItemNotFound(_))));
    }

    #[test]
    fn clear_is_idempotent() {
        let mut cart = open_cart();
        assert!(cart.clear().unwrap().is_empty());

        add(&mut cart, &product(300), 1, SelectedOptions::new());
        let events = cart.clear().unwrap();
        cart.apply_events(events);
        assert!(cart.is_empty());
        assert!(cart.clear().unwrap().is_empty());
    }

    #[test]
    fn check_out_requires_items_and_empties_cart() {
        let mut cart = open_cart();
        assert!(matches!(cart.check_out(AggregateId::new()), Err(CartError::EmptyCart)));

        add(&mut cart, &product(300), 1, SelectedOptions::new());
        let events = cart.check_out(AggregateId::new()).unwrap();
        cart.apply_events(events);
        assert!(cart.is_empty());
        assert_eq!(cart.sub_total(), Money::zero());
    }

    #[test]
    fn restored_items_merge_with_current_lines() {
        let mut cart = open_cart();
        let tee = product(1000);
        add(&mut cart, &tee, 1, SelectedOptions::new());
        let mut restored = cart.items()[0].clone();
        restored.item_id = CartItemId::new();
        restored.quantity = 2;

        let cart_id = cart.id().unwrap();
        let owner = cart.owner().unwrap();
        let events = cart
            .restore_items(cart_id, owner, AggregateId::new(), vec![restored])
            .unwrap();
        cart.apply_events(events);

        assert_eq!(cart.items().len(), 1);
        assert_eq!(cart.items()[0].quantity, 3);
        assert_eq!(cart.sub_total(), Money::from_cents(3000));
    }

    #[test]
    fn restore_opens_missing_cart() {
        let owner = UserId::new();
        let cart = Cart::default();
        let item = CartItem {
            item_id: CartItemId::new(),
            product_id: ProductId::new(),
            quantity: 1,
            price: Money::from_cents(100),
            title: "Cap".to_string(),
            thumbnail: None,
            selected_options: SelectedOptions::new(),
        };

        let events = cart
            .restore_items(owner.cart_id(), owner, AggregateId::new(), vec![item])
            .unwrap();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], CartEvent::CartOpened(_)));
    }

    #[test]
    fn totals_that_overflow_are_rejected_before_any_event() {
        let mut cart = open_cart();
        let pricey = product(3_000_000_000);

        assert!(matches!(
            cart.add_item(&pricey, 4_000_000_000, SelectedOptions::new()),
            Err(CartError::AmountTooLarge)
        ));

        add(&mut cart, &pricey, 1, SelectedOptions::new());
        let item_id = cart.items()[0].item_id;
        assert!(matches!(
            cart.set_item_quantity(item_id, 4_000_000_000),
            Err(CartError::AmountTooLarge)
        ));
        assert!(matches!(
            cart.add_item(&pricey, i64::from(u32::MAX), SelectedOptions::new()),
            Err(CartError::AmountTooLarge)
        ));
        assert_eq!(cart.sub_total(), Money::from_cents(3_000_000_000));
    }
}
