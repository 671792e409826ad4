//! Shared application state.

use std::sync::Arc;

use purchase::{PaymentGateway, PurchaseConfig, PurchaseOrchestrator};
use store::{ListingStore, TransactionStore};

use crate::auth::TokenVerifier;

/// The orchestrator as wired by the server: every collaborator behind a trait object.
pub type Orchestrator = PurchaseOrchestrator<
    Arc<dyn ListingStore>,
    Arc<dyn TransactionStore>,
    Arc<dyn PaymentGateway>,
>;

/// State shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub listings: Arc<dyn ListingStore>,
    pub transactions: Arc<dyn TransactionStore>,
    pub orchestrator: Orchestrator,
    pub tokens: TokenVerifier,
}

impl AppState {
    pub fn new(
        listings: Arc<dyn ListingStore>,
        transactions: Arc<dyn TransactionStore>,
        gateway: Arc<dyn PaymentGateway>,
        config: PurchaseConfig,
        jwt_secret: &[u8],
    ) -> Self {
        let orchestrator =
            PurchaseOrchestrator::new(listings.clone(), transactions.clone(), gateway, config);
        Self {
            listings,
            transactions,
            orchestrator,
            tokens: TokenVerifier::new(jwt_secret),
        }
    }
}
