//! In-memory settlement store for tests.
//!
//! Mirrors the semantics of the PostgreSQL store (conditional debit,
//! compare-and-set settlement, refund-with-failure, commission dedup) so the
//! orchestrator can be driven through every scenario without a database.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use sqlx::types::Json;
use uuid::Uuid;

use crate::{
    error::AppError,
    models::{
        commission::CommissionEntry,
        service::{Service, ServiceCategory},
        service_request::{NewServiceRequest, ServiceRequest},
        transaction::{NewCharge, Transaction, TransactionStatus},
    },
    services::settlement_store::SettlementStore,
};

#[derive(Debug, Default, Clone, Copy)]
struct Balances {
    balance: Decimal,
    commission: Decimal,
}

#[derive(Default)]
struct MemoryState {
    services: HashMap<Uuid, Service>,
    wallets: HashMap<Uuid, Balances>,
    transactions: HashMap<String, Transaction>,
    requests: HashMap<String, ServiceRequest>,
    uplines: HashMap<Uuid, Uuid>,
    commissions: Vec<CommissionEntry>,
    fail_commission: bool,
    fail_settle_success: bool,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_service(
        &self,
        category: ServiceCategory,
        price: Decimal,
        commission_amount: Option<Decimal>,
    ) -> Service {
        self.add_priced_service(category, price, price, commission_amount)
    }

    pub fn add_priced_service(
        &self,
        category: ServiceCategory,
        platform_price: Decimal,
        default_agent_price: Decimal,
        commission_amount: Option<Decimal>,
    ) -> Service {
        let service = Service {
            id: Uuid::new_v4(),
            name: format!("{category:?} service"),
            product_code: Some(format!("{category:?}-01").to_uppercase()),
            category,
            is_active: true,
            platform_price,
            default_agent_price,
            commission_amount,
            created_at: Utc::now(),
        };
        self.put_service(service.clone());
        service
    }

    pub fn put_service(&self, service: Service) {
        self.state
            .lock()
            .unwrap()
            .services
            .insert(service.id, service);
    }

    pub fn fund(&self, user_id: Uuid, amount: Decimal) {
        self.state
            .lock()
            .unwrap()
            .wallets
            .entry(user_id)
            .or_default()
            .balance += amount;
    }

    pub fn balance(&self, user_id: Uuid) -> Decimal {
        self.state
            .lock()
            .unwrap()
            .wallets
            .get(&user_id)
            .map(|w| w.balance)
            .unwrap_or_default()
    }

    pub fn commission_balance(&self, user_id: Uuid) -> Decimal {
        self.state
            .lock()
            .unwrap()
            .wallets
            .get(&user_id)
            .map(|w| w.commission)
            .unwrap_or_default()
    }

    pub fn set_upline(&self, user_id: Uuid, upline_id: Uuid) {
        self.state.lock().unwrap().uplines.insert(user_id, upline_id);
    }

    pub fn set_fail_commission(&self, fail: bool) {
        self.state.lock().unwrap().fail_commission = fail;
    }

    pub fn set_fail_settle_success(&self, fail: bool) {
        self.state.lock().unwrap().fail_settle_success = fail;
    }

    pub fn transaction(&self, reference: &str) -> Option<Transaction> {
        self.state
            .lock()
            .unwrap()
            .transactions
            .get(reference)
            .cloned()
    }

    pub fn transactions(&self) -> Vec<Transaction> {
        self.state
            .lock()
            .unwrap()
            .transactions
            .values()
            .cloned()
            .collect()
    }

    pub fn service_request(&self, reference: &str) -> Option<ServiceRequest> {
        self.state.lock().unwrap().requests.get(reference).cloned()
    }

    pub fn service_requests(&self) -> Vec<ServiceRequest> {
        self.state
            .lock()
            .unwrap()
            .requests
            .values()
            .cloned()
            .collect()
    }

    pub fn commission_entries(&self) -> Vec<CommissionEntry> {
        self.state.lock().unwrap().commissions.clone()
    }

    /// Insert a COMPLETED transaction directly and return its reference.
    pub fn completed_transaction(&self, user_id: Uuid, service_id: Uuid, amount: Decimal) -> String {
        let reference = format!("TEST{}", Uuid::new_v4().simple());
        let transaction = Transaction {
            id: Uuid::new_v4(),
            reference: reference.clone(),
            user_id,
            service_id,
            amount: -amount,
            status: TransactionStatus::Completed,
            description: "test".to_string(),
            idempotency_key: None,
            metadata: None,
            created_at: Utc::now(),
            settled_at: Some(Utc::now()),
        };
        self.state
            .lock()
            .unwrap()
            .transactions
            .insert(reference.clone(), transaction);
        reference
    }

    pub fn force_status(&self, reference: &str, status: TransactionStatus) {
        if let Some(transaction) = self.state.lock().unwrap().transactions.get_mut(reference) {
            transaction.status = status;
        }
    }

    /// Move a transaction's creation time into the past.
    pub fn backdate(&self, reference: &str, by: Duration) {
        if let Some(transaction) = self.state.lock().unwrap().transactions.get_mut(reference) {
            transaction.created_at -= by;
        }
    }
}

fn service_request(request: NewServiceRequest, status: TransactionStatus) -> ServiceRequest {
    ServiceRequest {
        id: Uuid::new_v4(),
        user_id: request.user_id,
        service_id: request.service_id,
        reference: request.reference,
        category: request.details.category(),
        status,
        details: Json(request.details),
        raw_payload: request.raw_payload,
        provider_message: request.provider_message,
        provider_status: request.provider_status,
        created_at: Utc::now(),
    }
}

#[async_trait]
impl SettlementStore for MemoryStore {
    async fn find_service(&self, service_id: Uuid) -> Result<Option<Service>, AppError> {
        Ok(self.state.lock().unwrap().services.get(&service_id).cloned())
    }

    async fn wallet_balance(&self, user_id: Uuid) -> Result<Decimal, AppError> {
        Ok(self.balance(user_id))
    }

    async fn find_by_idempotency_key(
        &self,
        user_id: Uuid,
        key: &str,
    ) -> Result<Option<Transaction>, AppError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .transactions
            .values()
            .find(|t| t.user_id == user_id && t.idempotency_key.as_deref() == Some(key))
            .cloned())
    }

    async fn find_service_request(
        &self,
        reference: &str,
    ) -> Result<Option<ServiceRequest>, AppError> {
        Ok(self.service_request(reference))
    }

    async fn charge(&self, charge: NewCharge) -> Result<Transaction, AppError> {
        let mut state = self.state.lock().unwrap();

        let wallet = state.wallets.get(&charge.user_id).copied().unwrap_or_default();
        if wallet.balance < charge.amount {
            return Err(AppError::InsufficientFunds);
        }

        if let Some(key) = charge.idempotency_key.as_deref() {
            let taken = state
                .transactions
                .values()
                .any(|t| t.user_id == charge.user_id && t.idempotency_key.as_deref() == Some(key));
            if taken {
                return Err(AppError::DuplicateRequest(
                    "A request with this idempotency key is already in progress".to_string(),
                ));
            }
        }

        if state.transactions.contains_key(&charge.reference) {
            return Err(AppError::Unexpected(format!(
                "Duplicate reference {}",
                charge.reference
            )));
        }

        let transaction = Transaction {
            id: Uuid::new_v4(),
            reference: charge.reference.clone(),
            user_id: charge.user_id,
            service_id: charge.service_id,
            amount: -charge.amount,
            status: TransactionStatus::Pending,
            description: charge.description,
            idempotency_key: charge.idempotency_key,
            metadata: Some(serde_json::to_value(&charge.context).unwrap()),
            created_at: Utc::now(),
            settled_at: None,
        };

        state.wallets.entry(charge.user_id).or_default().balance -= charge.amount;
        state
            .transactions
            .insert(charge.reference, transaction.clone());

        Ok(transaction)
    }

    async fn settle_success(
        &self,
        reference: &str,
        request: NewServiceRequest,
    ) -> Result<Transaction, AppError> {
        let mut state = self.state.lock().unwrap();

        if state.fail_settle_success {
            return Err(AppError::Unexpected("simulated settlement failure".to_string()));
        }

        let transaction = match state.transactions.get_mut(reference) {
            Some(t) if t.status == TransactionStatus::Pending => {
                t.status = TransactionStatus::Completed;
                t.settled_at = Some(Utc::now());
                t.clone()
            }
            _ => {
                return Err(AppError::Unexpected(format!(
                    "Transaction {reference} is not pending"
                )));
            }
        };

        state.requests.insert(
            reference.to_string(),
            service_request(request, TransactionStatus::Completed),
        );

        Ok(transaction)
    }

    async fn settle_failure(
        &self,
        reference: &str,
        request: NewServiceRequest,
    ) -> Result<Option<Transaction>, AppError> {
        let mut state = self.state.lock().unwrap();

        let transaction = match state.transactions.get_mut(reference) {
            Some(t) if t.status == TransactionStatus::Pending => {
                t.status = TransactionStatus::Failed;
                t.settled_at = Some(Utc::now());
                t.clone()
            }
            _ => return Ok(None),
        };

        state
            .wallets
            .entry(transaction.user_id)
            .or_default()
            .balance += transaction.charged_amount();
        state.requests.insert(
            reference.to_string(),
            service_request(request, TransactionStatus::Failed),
        );

        Ok(Some(transaction))
    }

    async fn find_upline(&self, user_id: Uuid) -> Result<Option<Uuid>, AppError> {
        Ok(self.state.lock().unwrap().uplines.get(&user_id).copied())
    }

    async fn credit_commission(&self, entry: &CommissionEntry) -> Result<bool, AppError> {
        let mut state = self.state.lock().unwrap();

        if state.fail_commission {
            return Err(AppError::Unexpected("simulated commission failure".to_string()));
        }

        let completed = state
            .transactions
            .get(&entry.reference)
            .is_some_and(|t| t.status == TransactionStatus::Completed);
        let already_paid = state
            .commissions
            .iter()
            .any(|e| e.reference == entry.reference && e.unit_index == entry.unit_index);
        if !completed || already_paid {
            return Ok(false);
        }

        state.commissions.push(entry.clone());
        state.wallets.entry(entry.upline_id).or_default().commission += entry.amount;

        Ok(true)
    }

    async fn stale_pending(&self, cutoff: DateTime<Utc>) -> Result<Vec<Transaction>, AppError> {
        let mut stale: Vec<Transaction> = self
            .state
            .lock()
            .unwrap()
            .transactions
            .values()
            .filter(|t| t.status == TransactionStatus::Pending && t.created_at < cutoff)
            .cloned()
            .collect();
        stale.sort_by_key(|t| t.created_at);
        Ok(stale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::transaction::VendContext;
    use rust_decimal_macros::dec;

    fn charge(user_id: Uuid, service_id: Uuid, amount: Decimal) -> NewCharge {
        NewCharge {
            reference: format!("TEST{}", Uuid::new_v4().simple()),
            user_id,
            service_id,
            amount,
            description: "test".to_string(),
            idempotency_key: None,
            context: VendContext {
                category: ServiceCategory::Data,
                destination: Some("08031234567".to_string()),
                quantity: 1,
                amount: None,
            },
        }
    }

    #[tokio::test]
    async fn test_charge_respects_floor() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        store.fund(user, dec!(500));

        assert!(store.charge(charge(user, Uuid::new_v4(), dec!(500))).await.is_ok());
        assert!(matches!(
            store.charge(charge(user, Uuid::new_v4(), dec!(0.01))).await,
            Err(AppError::InsufficientFunds)
        ));
        assert_eq!(store.balance(user), Decimal::ZERO);
        assert_eq!(store.transactions().len(), 1);
    }
}
