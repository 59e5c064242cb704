use std::sync::Arc;

use notification_cell::DispatchHandle;
use payment_cell::{PaymentGateway, PaymentVerifier};
use shared_config::BookingSettings;

use crate::services::admin::AdminService;
use crate::services::booking::BookingOrchestrator;
use crate::store::BookingStore;

/// Router state shared by all appointment handlers.
pub struct BookingState {
    pub orchestrator: BookingOrchestrator,
    pub admin: AdminService,
}

impl BookingState {
    pub fn new<S>(
        store: Arc<S>,
        gateway: Arc<dyn PaymentGateway>,
        verifier: PaymentVerifier,
        dispatcher: DispatchHandle,
        settings: BookingSettings,
    ) -> Self
    where
        S: BookingStore + 'static,
    {
        let admin_store: Arc<dyn BookingStore> = store.clone();
        Self {
            orchestrator: BookingOrchestrator::new(store, gateway, verifier, dispatcher, settings),
            admin: AdminService::new(admin_store),
        }
    }
}
