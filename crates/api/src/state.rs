//! Shared application state.

use std::sync::Arc;

use checkout::{
    CheckoutOrchestrator, PaymentGateway, PaymentReconciler, PaymentService, PaymentSettings,
    WebhookVerifier,
};
use domain::{CartService, InventoryLedger, OrderService};
use event_store::EventStore;
use projections::{CustomerOrdersView, OrderLookupView, Projection, ProjectionProcessor};
use serde::Serialize;

use crate::config::Config;

/// What the storefront needs to render the hosted payment step.
#[derive(Debug, Clone, Serialize)]
pub struct PublicPaymentConfig {
    pub gateway: &'static str,
    pub publishable_key: Option<String>,
    pub currency: String,
}

/// Shared application state accessible from all handlers.
pub struct AppState<S: EventStore> {
    pub carts: CartService<S>,
    pub products: InventoryLedger<S>,
    pub orders: OrderService<S>,
    pub checkout: CheckoutOrchestrator<S>,
    pub payments: PaymentService<S>,
    pub customer_orders: CustomerOrdersView,
    pub projection_processor: Arc<ProjectionProcessor<S>>,
    pub payment_config: PublicPaymentConfig,
}

impl<S: EventStore + Clone + 'static> AppState<S> {
    /// Wires services, read models and the payment gateway over one store.
    pub fn new(event_store: S, gateway: Arc<dyn PaymentGateway>, config: &Config) -> Self {
        let lookup = OrderLookupView::new();
        let customer_orders = CustomerOrdersView::new();

        let mut processor = ProjectionProcessor::new(event_store.clone());
        processor.register(Box::new(lookup.clone()) as Box<dyn Projection>);
        processor.register(Box::new(customer_orders.clone()) as Box<dyn Projection>);
        let processor = Arc::new(processor);

        let reconciler = Arc::new(PaymentReconciler::new(
            event_store.clone(),
            processor.clone(),
            lookup,
        ));
        let verifier = config
            .webhook_secret
            .as_ref()
            .map(|secret| WebhookVerifier::new(secret.clone(), config.webhook_tolerance_secs));
        if verifier.is_none() {
            tracing::warn!("STRIPE_WEBHOOK_SECRET is not set; webhooks will be rejected");
        }

        let payment_config = PublicPaymentConfig {
            gateway: gateway.name(),
            publishable_key: config.stripe_publishable_key.clone(),
            currency: config.currency.clone(),
        };
        let settings = PaymentSettings {
            frontend_url: config.frontend_url.clone(),
            currency: config.currency.clone(),
            session_ttl: chrono::Duration::minutes(config.session_ttl_minutes),
        };

        Self {
            carts: CartService::new(event_store.clone()),
            products: InventoryLedger::new(event_store.clone()),
            orders: OrderService::new(event_store.clone()),
            checkout: CheckoutOrchestrator::new(event_store.clone()),
            payments: PaymentService::new(event_store, reconciler, gateway, verifier, settings),
            customer_orders,
            projection_processor: processor,
            payment_config,
        }
    }
}
