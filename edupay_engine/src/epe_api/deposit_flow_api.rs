use std::fmt::Debug;

use chrono::Duration;
use epg_common::Money;
use log::*;

use crate::{
    db_types::{CoursePurchase, DepositTransaction, NewDeposit, SettlementEvent, UserId},
    events::{DepositClosedEvent, EventProducers, PaymentConfirmedEvent},
    traits::{PurchaseReceipt, SettlementOutcome, WalletGatewayDatabase, WalletGatewayError},
};

/// `DepositFlowApi` drives the money paths of the wallet gateway: opening deposits, settling
/// inbound transfer reports against them, spending the balance, and sweeping stale deposits.
pub struct DepositFlowApi<B> {
    db: B,
    producers: EventProducers,
}

impl<B> Debug for DepositFlowApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "DepositFlowApi")
    }
}

impl<B> DepositFlowApi<B> {
    pub fn new(db: B, producers: EventProducers) -> Self {
        Self { db, producers }
    }
}

impl<B> DepositFlowApi<B>
where B: WalletGatewayDatabase
{
    /// Opens a brand-new pending deposit for the user and returns it, settlement code included.
    ///
    /// The deposit stays claimable until the claim window lapses. Callers present the settlement
    /// code (usually inside a payment QR) to the user, who quotes it in their bank transfer memo.
    pub async fn issue_deposit(&self, deposit: NewDeposit) -> Result<DepositTransaction, WalletGatewayError> {
        let transaction = self.db.create_deposit(deposit).await?;
        debug!("🔄️🏦️ {transaction} opened and waiting for a transfer");
        Ok(transaction)
    }

    /// Runs one inbound settlement event through the matching contract.
    ///
    /// Delivery is at-least-once, so the same event may arrive here any number of times; at most
    /// one delivery ever credits the wallet. The payment-confirmed hook fires only after the
    /// credit has committed.
    pub async fn settle(
        &self,
        event: &SettlementEvent,
        mismatch_threshold: u32,
    ) -> Result<SettlementOutcome, WalletGatewayError> {
        let outcome = self.db.settle_deposit(event, mismatch_threshold).await?;
        match &outcome {
            SettlementOutcome::Credited { transaction, new_balance } => {
                info!("🔄️💰️ {transaction} confirmed. New balance: {new_balance}");
                self.call_payment_confirmed_hook(transaction, *new_balance).await;
            },
            SettlementOutcome::AlreadyConfirmed { transaction } => {
                debug!("🔄️💰️ Redelivery for {transaction}. Nothing to do.");
            },
            SettlementOutcome::MismatchRecorded { transaction, attempts } => {
                warn!(
                    "🔄️⚠️ Transfer {} quoted {} for {transaction}. Strike {attempts}.",
                    event.external_ref, event.reported_amount
                );
            },
            SettlementOutcome::MarkedFailed { transaction } => {
                warn!("🔄️❌️ {transaction} hit the mismatch strike limit and has been closed");
                self.call_deposit_closed_hook(std::slice::from_ref(transaction)).await;
            },
            SettlementOutcome::Discarded { reason } => {
                info!("🔄️🗑️ Settlement event {} discarded: {reason}", event.external_ref);
            },
        }
        Ok(outcome)
    }

    /// Pays for course access out of the wallet, applying an optional coupon.
    pub async fn purchase(
        &self,
        user_id: UserId,
        purchase: &CoursePurchase,
    ) -> Result<PurchaseReceipt, WalletGatewayError> {
        let receipt = self.db.purchase_with_wallet(user_id, purchase).await?;
        info!(
            "🔄️📚️ User {user_id} enrolled in {} for {} ({} off the {} list price)",
            receipt.course_id, receipt.final_amount, receipt.discount, receipt.base_amount
        );
        Ok(receipt)
    }

    /// Closes every pending deposit older than `claim_window`, firing the deposit-closed hook for
    /// each one.
    pub async fn expire_old_deposits(
        &self,
        claim_window: Duration,
    ) -> Result<Vec<DepositTransaction>, WalletGatewayError> {
        let expired = self.db.expire_stale_deposits(claim_window).await?;
        if !expired.is_empty() {
            self.call_deposit_closed_hook(&expired).await;
        }
        Ok(expired)
    }

    async fn call_payment_confirmed_hook(&self, transaction: &DepositTransaction, new_balance: Money) {
        for emitter in &self.producers.payment_confirmed_producer {
            debug!("🔄️💰️ Notifying payment confirmed hook subscribers");
            let event = PaymentConfirmedEvent::new(transaction.clone(), new_balance);
            emitter.publish_event(event).await;
        }
    }

    async fn call_deposit_closed_hook(&self, closed: &[DepositTransaction]) {
        for emitter in &self.producers.deposit_closed_producer {
            debug!("🔄️🗑️ Notifying deposit closed hook subscribers");
            for transaction in closed {
                let event = DepositClosedEvent::new(transaction.clone());
                emitter.publish_event(event).await;
            }
        }
    }
}
