use chrono::Duration;
use edupay_engine::{
    db_types::{
        Coupon,
        CoursePurchase,
        DepositTransaction,
        LedgerEntry,
        NewCoupon,
        NewDeposit,
        SettlementCode,
        SettlementEvent,
        UserId,
        WalletBalance,
    },
    traits::{
        CouponError,
        CouponManagement,
        LedgerApiError,
        LedgerManagement,
        PurchaseReceipt,
        SettlementOutcome,
        WalletGatewayDatabase,
        WalletGatewayError,
    },
    wallet_objects::Pagination,
};
use mockall::mock;

mock! {
    pub WalletDb {}
    impl Clone for WalletDb {
        fn clone(&self) -> Self;
    }
    impl LedgerManagement for WalletDb {
        async fn fetch_wallet_balance(&self, user_id: UserId) -> Result<WalletBalance, LedgerApiError>;
        async fn fetch_ledger_entries(&self, user_id: UserId, pagination: &Pagination) -> Result<Vec<LedgerEntry>, LedgerApiError>;
        async fn fetch_deposit(&self, id: i64) -> Result<Option<DepositTransaction>, LedgerApiError>;
        async fn fetch_deposit_by_code(&self, code: &SettlementCode) -> Result<Option<DepositTransaction>, LedgerApiError>;
    }
    impl WalletGatewayDatabase for WalletDb {
        fn url(&self) -> &str;
        async fn create_deposit(&self, deposit: NewDeposit) -> Result<DepositTransaction, WalletGatewayError>;
        async fn settle_deposit(&self, event: &SettlementEvent, mismatch_threshold: u32) -> Result<SettlementOutcome, WalletGatewayError>;
        async fn purchase_with_wallet(&self, user_id: UserId, purchase: &CoursePurchase) -> Result<PurchaseReceipt, WalletGatewayError>;
        async fn expire_stale_deposits(&self, claim_window: Duration) -> Result<Vec<DepositTransaction>, WalletGatewayError>;
        async fn close(&mut self) -> Result<(), WalletGatewayError>;
    }
}

mock! {
    pub CouponDb {}
    impl CouponManagement for CouponDb {
        async fn create_coupon(&self, coupon: NewCoupon) -> Result<Coupon, CouponError>;
        async fn fetch_coupon(&self, code: &str) -> Result<Option<Coupon>, CouponError>;
    }
}
