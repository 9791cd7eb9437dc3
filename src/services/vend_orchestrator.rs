//! Vend orchestrator - drives one purchase from price to settlement.
//!
//! # Flow
//!
//! ```text
//! Init → PriceResolved → FundsChecked → Charged → ProviderCalled
//!                                          │             │
//!                                          └──────┬──────┴──→ SettledSuccess
//!                                                 └─────────→ SettledFailure
//! ```
//!
//! Nothing is written before `Charged`. From `Charged` on, every path ends in
//! exactly one settlement: COMPLETED with a service request, or FAILED with a
//! refund of the charged amount and a service request. If even the refund
//! cannot be written, the row stays PENDING and start-up recovery settles it.

use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::Value;
use uuid::Uuid;

use crate::{
    config::SettlementPolicy,
    error::AppError,
    models::{
        provider::{Delivery, ProviderOutcome, ProviderResponse, ProviderVendRequest},
        service::{PricingModel, Service},
        service_request::{NewServiceRequest, ServiceRequestDetails},
        transaction::{NewCharge, Transaction, TransactionStatus, VendContext},
        vend::{Caller, VendReceipt, VendRequest},
    },
    services::{
        commission::CommissionDistributor,
        provider_client::{ProviderError, VendProvider},
        settlement_store::SettlementStore,
    },
};

/// Progress of a single vend attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VendState {
    Init,
    PriceResolved,
    FundsChecked,
    /// Wallet debited and PENDING row written; a settlement is now owed
    Charged,
    ProviderCalled,
    SettledSuccess,
    SettledFailure,
}

impl VendState {
    pub fn is_terminal(self) -> bool {
        matches!(self, VendState::SettledSuccess | VendState::SettledFailure)
    }

    pub fn can_transition_to(self, next: VendState) -> bool {
        use VendState::*;

        if self.is_terminal() {
            return false;
        }

        matches!(
            (self, next),
            (Init, PriceResolved)
                | (PriceResolved, FundsChecked)
                | (FundsChecked, Charged)
                | (Charged, ProviderCalled)
                | (Charged, SettledFailure)
                | (ProviderCalled, SettledSuccess)
                | (ProviderCalled, SettledFailure)
        )
    }

    pub fn advance(&mut self, next: VendState) -> Result<(), AppError> {
        if !self.can_transition_to(next) {
            return Err(AppError::Unexpected(format!(
                "Illegal vend transition {self} -> {next}"
            )));
        }
        tracing::debug!(from = %self, to = %next, "Vend state transition");
        *self = next;
        Ok(())
    }

    pub fn as_str(self) -> &'static str {
        match self {
            VendState::Init => "INIT",
            VendState::PriceResolved => "PRICE_RESOLVED",
            VendState::FundsChecked => "FUNDS_CHECKED",
            VendState::Charged => "CHARGED",
            VendState::ProviderCalled => "PROVIDER_CALLED",
            VendState::SettledSuccess => "SETTLED_SUCCESS",
            VendState::SettledFailure => "SETTLED_FAILURE",
        }
    }
}

impl fmt::Display for VendState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unique per attempt: `VND` + UTC timestamp + 16 random hex digits.
pub fn generate_reference() -> String {
    let bytes: [u8; 8] = rand::random();
    format!("VND{}{}", Utc::now().format("%Y%m%d%H%M%S"), hex::encode(bytes))
}

fn describe(service: &Service, context: &VendContext) -> String {
    match (service.category.pricing_model(), context.amount) {
        (PricingModel::Percentage, Some(amount)) => format!("{} {}", service.name, amount),
        _ => format!("{} x{}", service.name, context.quantity),
    }
}

/// A charged attempt awaiting settlement.
struct Attempt {
    user_id: Uuid,
    service_id: Uuid,
    reference: String,
    amount: Decimal,
    context: VendContext,
}

impl Attempt {
    fn failed_request(
        &self,
        message: &str,
        provider_status: Option<String>,
        raw_payload: Option<Value>,
    ) -> NewServiceRequest {
        NewServiceRequest {
            user_id: self.user_id,
            service_id: self.service_id,
            reference: self.reference.clone(),
            details: ServiceRequestDetails::new(&self.context, None),
            raw_payload,
            provider_message: Some(message.to_string()),
            provider_status,
        }
    }
}

pub struct VendOrchestrator {
    store: Arc<dyn SettlementStore>,
    provider: Arc<dyn VendProvider>,
    policy: SettlementPolicy,
    commissions: CommissionDistributor,
}

impl VendOrchestrator {
    pub fn new(
        store: Arc<dyn SettlementStore>,
        provider: Arc<dyn VendProvider>,
        policy: SettlementPolicy,
    ) -> Self {
        Self {
            commissions: CommissionDistributor::new(Arc::clone(&store)),
            store,
            provider,
            policy,
        }
    }

    /// Buy a service against the caller's wallet.
    ///
    /// # Errors
    ///
    /// Before any charge: `Validation`, `ServiceUnavailable`, `InsufficientFunds`,
    /// `DuplicateRequest`. After a charge the wallet is refunded first, then one of
    /// `ProviderRejected`, `ProviderTimeout` or `Unexpected` is returned.
    #[tracing::instrument(
        skip(self, caller, request),
        fields(user_id = %caller.user_id, service_id = %request.service_id)
    )]
    pub async fn vend(&self, caller: &Caller, request: VendRequest) -> Result<VendReceipt, AppError> {
        let idempotency_key = request.idempotency_key()?.map(str::to_string);
        if let Some(key) = idempotency_key.as_deref()
            && let Some(existing) = self.store.find_by_idempotency_key(caller.user_id, key).await?
        {
            tracing::info!(reference = %existing.reference, "Idempotency key already used");
            return self.replay(existing).await;
        }

        let mut state = VendState::Init;

        let service = self
            .store
            .find_service(request.service_id)
            .await?
            .ok_or_else(|| AppError::ServiceUnavailable("Service not found".to_string()))?;
        let product_code = service.product_code_if_available()?.to_string();
        let context = request.context(service.category)?;
        let amount = service.total_price(caller.role, context.vend_quantity())?;
        state.advance(VendState::PriceResolved)?;

        if self.store.wallet_balance(caller.user_id).await? < amount {
            return Err(AppError::InsufficientFunds);
        }
        state.advance(VendState::FundsChecked)?;

        let reference = generate_reference();
        self.store
            .charge(NewCharge {
                reference: reference.clone(),
                user_id: caller.user_id,
                service_id: service.id,
                amount,
                description: describe(&service, &context),
                idempotency_key,
                context: context.clone(),
            })
            .await?;
        state.advance(VendState::Charged)?;
        tracing::info!(%reference, %amount, "Wallet charged");

        let attempt = Attempt {
            user_id: caller.user_id,
            service_id: service.id,
            reference,
            amount,
            context,
        };

        let provider_request =
            ProviderVendRequest::new(&product_code, &attempt.reference, &attempt.context);
        let result = self.call_provider(provider_request).await;
        state.advance(VendState::ProviderCalled)?;

        match result {
            Ok(response) => {
                match response.classify(attempt.context.category, self.policy.accept_pending) {
                    ProviderOutcome::Delivered(delivery) => {
                        self.settle_delivery(&mut state, &attempt, delivery).await
                    }
                    ProviderOutcome::Rejected(rejection) => {
                        tracing::warn!(
                            reference = %attempt.reference,
                            provider_status = ?rejection.provider_status,
                            "Provider did not deliver: {}",
                            rejection.message
                        );
                        let request = attempt.failed_request(
                            &rejection.message,
                            rejection.provider_status,
                            Some(rejection.raw),
                        );
                        self.settle_failed(&mut state, &attempt, request).await?;
                        Err(AppError::ProviderRejected(rejection.message))
                    }
                }
            }
            Err(error) => {
                tracing::error!(reference = %attempt.reference, "Provider call failed: {:?}", error);
                let request = attempt.failed_request(&error.user_message(), None, None);
                self.settle_failed(&mut state, &attempt, request).await?;
                Err(match error {
                    ProviderError::Timeout => AppError::ProviderTimeout,
                    ProviderError::Rejected { message, .. } => AppError::ProviderRejected(message),
                    other => AppError::Unexpected(other.to_string()),
                })
            }
        }
    }

    /// Run the provider call on its own task, bounded by the policy timeout.
    ///
    /// A panic inside the call or an elapsed timeout comes back as a
    /// [`ProviderError`], never as an unwind through the orchestrator.
    async fn call_provider(
        &self,
        request: ProviderVendRequest,
    ) -> Result<ProviderResponse, ProviderError> {
        let provider = Arc::clone(&self.provider);
        let mut task = tokio::spawn(async move { provider.vend(&request).await });

        match tokio::time::timeout(self.policy.provider_timeout, &mut task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => Err(ProviderError::Aborted(join_error.to_string())),
            Err(_) => {
                task.abort();
                Err(ProviderError::Timeout)
            }
        }
    }

    async fn settle_delivery(
        &self,
        state: &mut VendState,
        attempt: &Attempt,
        delivery: Delivery,
    ) -> Result<VendReceipt, AppError> {
        let request = NewServiceRequest {
            user_id: attempt.user_id,
            service_id: attempt.service_id,
            reference: attempt.reference.clone(),
            details: ServiceRequestDetails::new(&attempt.context, Some(&delivery)),
            raw_payload: Some(delivery.raw.clone()),
            provider_message: Some(delivery.message.clone()),
            provider_status: Some(delivery.provider_status.clone()),
        };

        let transaction = match self.store.settle_success(&attempt.reference, request).await {
            Ok(transaction) => transaction,
            Err(e) => {
                tracing::error!(
                    reference = %attempt.reference,
                    "Provider delivered but recording success failed: {:?}",
                    e
                );
                let request = attempt.failed_request(
                    crate::error::GENERIC_ERROR_MESSAGE,
                    Some(delivery.provider_status),
                    Some(delivery.raw),
                );
                self.settle_failed(state, attempt, request).await?;
                return Err(AppError::Unexpected(e.to_string()));
            }
        };
        state.advance(VendState::SettledSuccess)?;
        tracing::info!(reference = %attempt.reference, provider_status = %delivery.provider_status, "Vend completed");

        let units = attempt.context.vend_quantity().units();
        self.commissions
            .distribute(attempt.user_id, attempt.service_id, &attempt.reference, units)
            .await;

        let amount_charged = transaction.charged_amount();
        Ok(VendReceipt {
            reference: transaction.reference,
            service_id: transaction.service_id,
            amount_charged,
            status: transaction.status,
            message: delivery.message,
            artifacts: delivery.artifacts,
            units: delivery.units,
            replayed: false,
        })
    }

    /// Refund and mark FAILED. Errors only when the refund could not be written,
    /// leaving the row PENDING for recovery.
    async fn settle_failed(
        &self,
        state: &mut VendState,
        attempt: &Attempt,
        request: NewServiceRequest,
    ) -> Result<(), AppError> {
        match self.store.settle_failure(&attempt.reference, request).await {
            Ok(Some(_)) => {
                state.advance(VendState::SettledFailure)?;
                tracing::warn!(reference = %attempt.reference, refunded = %attempt.amount, "Vend failed, wallet refunded");
                Ok(())
            }
            Ok(None) => {
                tracing::error!(reference = %attempt.reference, "Attempt was already settled, no refund issued");
                Err(AppError::Unexpected(format!(
                    "Transaction {} settled concurrently",
                    attempt.reference
                )))
            }
            Err(e) => {
                tracing::error!(
                    reference = %attempt.reference,
                    "Refund failed, attempt left PENDING for recovery: {:?}",
                    e
                );
                Err(AppError::Unexpected(e.to_string()))
            }
        }
    }

    async fn replay(&self, transaction: Transaction) -> Result<VendReceipt, AppError> {
        match transaction.status {
            TransactionStatus::Completed => {
                let request = self.store.find_service_request(&transaction.reference).await?;
                let (artifacts, units, message) = match request {
                    Some(request) => (
                        request.details.artifacts(),
                        request.details.units(),
                        request
                            .provider_message
                            .unwrap_or_else(|| "Transaction successful".to_string()),
                    ),
                    None => (Vec::new(), None, "Transaction successful".to_string()),
                };

                Ok(VendReceipt {
                    amount_charged: transaction.charged_amount(),
                    reference: transaction.reference,
                    service_id: transaction.service_id,
                    status: transaction.status,
                    message,
                    artifacts,
                    units,
                    replayed: true,
                })
            }
            TransactionStatus::Pending => Err(AppError::DuplicateRequest(
                "A request with this idempotency key is still in progress".to_string(),
            )),
            TransactionStatus::Failed => Err(AppError::DuplicateRequest(
                "A request with this idempotency key already failed; retry with a new key"
                    .to_string(),
            )),
        }
    }
}
