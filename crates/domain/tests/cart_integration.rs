//! Cart service behaviour against the in-memory event store.

use common::UserId;
use domain::{
    AddCartItem, CartError, CartService, DomainError, InventoryLedger, Money, ProductError,
    ProductId, RegisterProduct, RemoveCartItem, SelectedOptions, SetItemQuantity,
};
use event_store::{EventStore, InMemoryEventStore};

struct Fixture {
    store: InMemoryEventStore,
    carts: CartService<InMemoryEventStore>,
    ledger: InventoryLedger<InMemoryEventStore>,
}

impl Fixture {
    fn new() -> Self {
        let store = InMemoryEventStore::new();
        Self {
            carts: CartService::new(store.clone()),
            ledger: InventoryLedger::new(store.clone()),
            store,
        }
    }

    async fn product(&self, price: i64, stock: u32) -> ProductId {
        let product_id = ProductId::new();
        self.ledger
            .register_product(RegisterProduct {
                product_id,
                title: format!("Product {price}"),
                price: Money::from_cents(price),
                stock,
                thumbnail: None,
            })
            .await
            .unwrap();
        product_id
    }
}

fn add(owner: UserId, product_id: ProductId, quantity: i64) -> AddCartItem {
    AddCartItem {
        owner,
        product_id,
        quantity,
        selected_options: SelectedOptions::new(),
    }
}

#[tokio::test]
async fn cart_is_created_lazily_and_once() {
    let fx = Fixture::new();
    let owner = UserId::new();

    let first = fx.carts.get_or_create(owner).await.unwrap();
    let second = fx.carts.get_or_create(owner).await.unwrap();

    assert_eq!(first.owner(), Some(owner));
    assert!(second.is_empty());
    assert_eq!(
        fx.store.get_events_for_aggregate(owner.cart_id()).await.unwrap().len(),
        1
    );
}

#[tokio::test]
async fn sub_total_tracks_every_mutation() {
    let fx = Fixture::new();
    let owner = UserId::new();
    let tee = fx.product(1000, 10).await;
    let mug = fx.product(550, 10).await;

    let cart = fx.carts.add_item(add(owner, tee, 2)).await.unwrap();
    assert_eq!(cart.sub_total(), Money::from_cents(2000));

    let cart = fx.carts.add_item(add(owner, mug, 1)).await.unwrap();
    assert_eq!(cart.sub_total(), Money::from_cents(2550));

    let tee_item = cart.items().iter().find(|i| i.product_id == tee).unwrap().item_id;
    let cart = fx
        .carts
        .set_item_quantity(SetItemQuantity {
            owner,
            item_id: tee_item,
            quantity: 1,
        })
        .await
        .unwrap();
    assert_eq!(cart.sub_total(), Money::from_cents(1550));

    let cart = fx
        .carts
        .remove_item(RemoveCartItem {
            owner,
            item_id: tee_item,
        })
        .await
        .unwrap();
    assert_eq!(cart.sub_total(), Money::from_cents(550));

    let cart = fx.carts.clear(owner).await.unwrap();
    assert!(cart.is_empty());
    assert_eq!(cart.sub_total(), Money::zero());
}

#[tokio::test]
async fn price_snapshot_is_taken_at_add_time() {
    let fx = Fixture::new();
    let owner = UserId::new();
    let tee = fx.product(1000, 10).await;

    fx.carts.add_item(add(owner, tee, 1)).await.unwrap();
    fx.ledger.change_price(tee, Money::from_cents(1500)).await.unwrap();

    let cart = fx.carts.get_or_create(owner).await.unwrap();
    assert_eq!(cart.items()[0].price, Money::from_cents(1000));
}

#[tokio::test]
async fn options_distinguish_lines() {
    let fx = Fixture::new();
    let owner = UserId::new();
    let tee = fx.product(1000, 10).await;

    let mut small = add(owner, tee, 1);
    small.selected_options = SelectedOptions::new().with("size", "S");
    let mut large = add(owner, tee, 1);
    large.selected_options = SelectedOptions::new().with("size", "L");

    fx.carts.add_item(small.clone()).await.unwrap();
    fx.carts.add_item(large).await.unwrap();
    let cart = fx.carts.add_item(small).await.unwrap();

    assert_eq!(cart.items().len(), 2);
    assert_eq!(cart.total_quantity(), 3);
}

#[tokio::test]
async fn invalid_input_is_rejected_without_writes() {
    let fx = Fixture::new();
    let owner = UserId::new();
    let tee = fx.product(1000, 10).await;
    let before = fx.store.event_count().await;

    assert!(matches!(
        fx.carts.add_item(add(owner, tee, 0)).await,
        Err(DomainError::Cart(CartError::InvalidQuantity { quantity: 0 }))
    ));
    let missing = ProductId::new();
    assert!(matches!(
        fx.carts.add_item(add(owner, missing, 1)).await,
        Err(DomainError::Product(ProductError::NotFound(id))) if id == missing
    ));
    assert_eq!(fx.store.event_count().await, before);
}

#[tokio::test]
async fn updating_a_missing_item_is_not_found() {
    let fx = Fixture::new();
    let owner = UserId::new();

    let result = fx
        .carts
        .set_item_quantity(SetItemQuantity {
            owner,
            item_id: domain::CartItemId::new(),
            quantity: 2,
        })
        .await;

    assert!(matches!(
        result,
        Err(DomainError::Cart(CartError::ItemNotFound(_)))
    ));
}

#[tokio::test]
async fn long_lived_carts_are_snapshotted() {
    let fx = Fixture::new();
    let owner = UserId::new();
    let tee = fx.product(100, 1000).await;

    // CartOpened + 49 merges of the same line lands on version 50.
    for _ in 0..49 {
        fx.carts.add_item(add(owner, tee, 1)).await.unwrap();
    }

    let snapshot = fx.store.get_snapshot(owner.cart_id()).await.unwrap().unwrap();
    assert_eq!(snapshot.version.as_i64(), 50);

    let cart = fx.carts.add_item(add(owner, tee, 1)).await.unwrap();
    assert_eq!(cart.total_quantity(), 50);
    assert_eq!(cart.sub_total(), Money::from_cents(5000));
}

#[tokio::test]
async fn oversized_line_is_rejected_and_cart_stays_loadable() {
    let fx = Fixture::new();
    let owner = UserId::new();
    let pricey = fx.product(3_000_000_000, 10).await;
    fx.carts.get_or_create(owner).await.unwrap();
    let before = fx
        .store
        .get_events_for_aggregate(owner.cart_id())
        .await
        .unwrap()
        .len();

    let err = fx
        .carts
        .add_item(add(owner, pricey, 4_000_000_000))
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::Cart(CartError::AmountTooLarge)));

    let after = fx
        .store
        .get_events_for_aggregate(owner.cart_id())
        .await
        .unwrap()
        .len();
    assert_eq!(after, before);

    let cart = fx.carts.get_or_create(owner).await.unwrap();
    assert!(cart.is_empty());
    assert_eq!(cart.sub_total(), Money::zero());
}
