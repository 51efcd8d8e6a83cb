//! Cart-to-order checkout.
//!
//! One checkout is one [`UnitOfWork`]: the order is placed, every product's
//! stock is decremented and the cart is emptied in a single atomic append.
//! Each product stream is guarded by the version read while checking stock,
//! so a competing write that committed in between fails the whole append
//! and nothing is written. The checkout is then re-read and retried; only
//! when the re-read shows the stock is gone does the caller see
//! [`CheckoutError::ConcurrentStockConflict`].

use std::collections::BTreeMap;
use std::time::Instant;

use common::{AggregateId, UserId};
use domain::{Cart, Money, Order, OrderLine, Product, ProductId, UnitOfWork};
use event_store::EventStore;
use serde::Serialize;

use crate::error::{CheckoutError, Result};
use crate::reconciliation::MAX_ATTEMPTS;

#[derive(Debug, Clone, Default)]
pub struct CheckoutRequest {
    /// Gateway name recorded on the order's payment.
    pub gateway: Option<String>,
    pub metadata: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckoutReceipt {
    pub order_id: AggregateId,
    pub sub_total: Money,
    pub lines: Vec<OrderLine>,
}

pub struct CheckoutOrchestrator<S: EventStore> {
    store: S,
}

impl<S: EventStore> CheckoutOrchestrator<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    #[tracing::instrument(skip(self, request), fields(owner = %owner))]
    pub async fn checkout(&self, owner: UserId, request: CheckoutRequest) -> Result<CheckoutReceipt> {
        metrics::counter!("checkout_attempts_total").increment(1);
        let start = Instant::now();

        let result = self.place_order(owner, request).await;

        metrics::histogram!("checkout_duration_seconds").record(start.elapsed().as_secs_f64());
        match &result {
            Ok(receipt) => {
                metrics::counter!("checkout_completed_total").increment(1);
                tracing::info!(
                    order_id = %receipt.order_id,
                    sub_total = %receipt.sub_total,
                    lines = receipt.lines.len(),
                    "checkout committed"
                );
            }
            Err(e) => {
                metrics::counter!("checkout_failures_total", "reason" => e.reason()).increment(1);
                tracing::warn!(error = %e, "checkout rejected");
            }
        }
        result
    }

    async fn place_order(&self, owner: UserId, request: CheckoutRequest) -> Result<CheckoutReceipt> {
        let mut contended = false;
        let mut attempt = 1;
        loop {
            match self.try_place_order(owner, &request).await {
                Err(CheckoutError::ConcurrentStockConflict { product_id })
                    if attempt < MAX_ATTEMPTS =>
                {
                    tracing::debug!(attempt, %product_id, "product stream moved, re-reading stock");
                    contended = true;
                    attempt += 1;
                }
                Err(e) if e.is_retryable_conflict() && attempt < MAX_ATTEMPTS => {
                    tracing::debug!(attempt, error = %e, "retrying after version conflict");
                    attempt += 1;
                }
                // Enough stock was there when we first looked; a racing
                // checkout took it.
                Err(CheckoutError::OutOfStock { product_id, .. }) if contended => {
                    return Err(CheckoutError::ConcurrentStockConflict { product_id });
                }
                other => return other,
            }
        }
    }

    async fn try_place_order(
        &self,
        owner: UserId,
        request: &CheckoutRequest,
    ) -> Result<CheckoutReceipt> {
        let mut uow = UnitOfWork::new(&self.store);

        let cart_id = owner.cart_id();
        let mut cart: Cart = uow.load(cart_id).await?;
        if cart.is_empty() {
            return Err(CheckoutError::EmptyCart);
        }

        // The same product can sit on several lines with different options.
        let mut demand: BTreeMap<ProductId, u32> = BTreeMap::new();
        for item in cart.items() {
            let requested = demand.entry(item.product_id).or_default();
            *requested = requested.saturating_add(item.quantity);
        }

        let mut products: BTreeMap<ProductId, Product> = BTreeMap::new();
        for (&product_id, &requested) in &demand {
            let product: Product = uow.load(product_id.into()).await?;
            if product.product_id().is_none() {
                return Err(CheckoutError::not_found("Product", product_id));
            }
            if product.stock() < requested {
                return Err(CheckoutError::OutOfStock {
                    product_id,
                    requested,
                    available: product.stock(),
                });
            }
            products.insert(product_id, product);
        }

        // Price is always the product's current price, never the cart's copy.
        let mut lines = Vec::with_capacity(cart.items().len());
        for item in cart.items() {
            let product = products
                .get(&item.product_id)
                .ok_or_else(|| CheckoutError::not_found("Product", item.product_id))?;
            lines.push(OrderLine {
                product_id: item.product_id,
                quantity: item.quantity,
                price: product.price(),
                title: item.title.clone(),
                selected_options: item.selected_options.clone(),
            });
        }

        let order_id = AggregateId::new();
        let mut order = Order::default();
        let placed = order.place(
            order_id,
            owner,
            lines,
            request.gateway.clone(),
            request.metadata.clone(),
        )?;
        uow.record(order_id, &mut order, placed)?;

        for (product_id, product) in products.iter_mut() {
            let quantity = demand.get(product_id).copied().unwrap_or_default();
            let decremented = product.decrement_stock(quantity, Some(order_id))?;
            uow.record((*product_id).into(), product, decremented)?;
        }

        let checked_out = cart.check_out(order_id)?;
        uow.record(cart_id, &mut cart, checked_out)?;

        uow.commit().await.map_err(|e| {
            match e.conflicting_aggregate().map(ProductId::from) {
                Some(product_id) if demand.contains_key(&product_id) => {
                    CheckoutError::ConcurrentStockConflict { product_id }
                }
                _ => CheckoutError::from(e),
            }
        })?;

        Ok(CheckoutReceipt {
            order_id,
            sub_total: order.sub_total(),
            lines: order.lines().to_vec(),
        })
    }
}
