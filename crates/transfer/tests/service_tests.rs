use async_trait::async_trait;
use chrono::Utc;
use daicho_core::common::UserId;
use daicho_core::kyc::port::{KycError, KycGate};
use daicho_core::ledger::entity::Wallet;
use daicho_core::ledger::port::{LedgerError, WalletLedger};
use daicho_core::transfer::entity::{
    Currency, Transfer, TransferId, TransferKind, TransferMethod, TransferStatus,
};
use daicho_core::transfer::port::{NewDeposit, TransferError, TransferStore};
use daicho_transfer::service::{DepositRequest, TransferService};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::{Arc, Mutex};

struct MockKyc {
    level: u8,
}

#[async_trait]
impl KycGate for MockKyc {
    async fn status(&self, _user_id: UserId) -> Result<u8, KycError> {
        Ok(self.level)
    }
    async fn set_status(&self, _user_id: UserId, _status: u8) -> Result<(), KycError> {
        Ok(())
    }
}

struct MockLedger;

#[async_trait]
impl WalletLedger for MockLedger {
    async fn credit(&self, _user_id: UserId, _amount: Decimal) -> Result<(), LedgerError> {
        Ok(())
    }
    async fn lock(&self, _user_id: UserId, _amount: Decimal) -> Result<(), LedgerError> {
        Ok(())
    }
    async fn settle_lock(
        &self,
        _user_id: UserId,
        _amount: Decimal,
        _commit: bool,
    ) -> Result<(), LedgerError> {
        Ok(())
    }
    async fn wallet(&self, user_id: UserId) -> Result<Wallet, LedgerError> {
        Ok(Wallet {
            user_id,
            balance_total: dec!(100),
            balance_available: dec!(100),
            balance_locked: dec!(0),
            updated_at: Utc::now(),
        })
    }
}

/// 记录调用的流水存储替身。服务层测试只关心"什么被拒在门外、什么被放进来"。
#[derive(Default)]
struct RecordingStore {
    deposits: Mutex<Vec<NewDeposit>>,
    withdraws: Mutex<Vec<(UserId, Decimal)>>,
}

fn fake_transfer(user_id: UserId, kind: TransferKind, amount: Decimal) -> Transfer {
    Transfer {
        id: TransferId(1),
        user_id,
        kind,
        method: TransferMethod::Jpy,
        currency: Some(Currency::Jpy),
        amount,
        crypto_amount: None,
        status: TransferStatus::Pending,
        request_key: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

#[async_trait]
impl TransferStore for RecordingStore {
    async fn create_deposit(&self, deposit: NewDeposit) -> Result<Transfer, TransferError> {
        let t = fake_transfer(deposit.user_id, TransferKind::Deposit, deposit.amount);
        self.deposits.lock().unwrap().push(deposit);
        Ok(t)
    }
    async fn create_withdraw(
        &self,
        user_id: UserId,
        amount: Decimal,
        _request_key: Option<String>,
    ) -> Result<Transfer, TransferError> {
        self.withdraws.lock().unwrap().push((user_id, amount));
        Ok(fake_transfer(user_id, TransferKind::Withdraw, amount))
    }
    async fn approve_deposit(&self, id: TransferId) -> Result<Transfer, TransferError> {
        Err(TransferError::NotFound(id))
    }
    async fn confirm_crypto_deposit(&self, id: TransferId) -> Result<Transfer, TransferError> {
        Err(TransferError::NotFound(id))
    }
    async fn approve_withdraw(&self, id: TransferId) -> Result<Transfer, TransferError> {
        Err(TransferError::NotFound(id))
    }
    async fn cancel_withdraw(&self, id: TransferId) -> Result<Transfer, TransferError> {
        Err(TransferError::NotFound(id))
    }
    async fn get(&self, id: TransferId) -> Result<Transfer, TransferError> {
        Err(TransferError::NotFound(id))
    }
    async fn history(&self, _user_id: UserId, _limit: u32) -> Result<Vec<Transfer>, TransferError> {
        Ok(vec![])
    }
}

fn service_with(level: u8) -> (TransferService, Arc<RecordingStore>) {
    let store = Arc::new(RecordingStore::default());
    let service = TransferService::new(store.clone(), Arc::new(MockLedger), Arc::new(MockKyc { level }));
    (service, store)
}

#[tokio::test]
async fn withdraw_requires_kyc_level_five() {
    // 等级 3：拒绝，且存储层完全未被触碰
    let (service, store) = service_with(3);
    let res = service.request_withdraw(UserId(1), dec!(4000), None).await;
    match res {
        Err(TransferError::KycNotCleared(3)) => {}
        other => panic!("expected KycNotCleared(3), got {:?}", other.map(|t| t.id)),
    }
    assert!(store.withdraws.lock().unwrap().is_empty());

    // 等级 5：放行
    let (service, store) = service_with(5);
    service
        .request_withdraw(UserId(1), dec!(4000), None)
        .await
        .expect("withdraw at level 5 must pass");
    assert_eq!(store.withdraws.lock().unwrap().as_slice(), &[(UserId(1), dec!(4000))]);
}

#[tokio::test]
async fn withdraw_rejects_non_positive_amount() {
    let (service, store) = service_with(5);
    for bad in [dec!(0), dec!(-1)] {
        let res = service.request_withdraw(UserId(1), bad, None).await;
        assert!(matches!(res, Err(TransferError::Validation(_))));
    }
    assert!(store.withdraws.lock().unwrap().is_empty());
}

#[tokio::test]
async fn jpy_deposit_forces_jpy_currency() {
    let (service, store) = service_with(5);
    service
        .request_deposit(
            UserId(7),
            DepositRequest {
                amount: dec!(10000),
                method: TransferMethod::Jpy,
                currency: None,
                crypto_amount: Some(dec!(0.5)), // JPY 入金应忽略申报币量
                request_key: None,
            },
        )
        .await
        .expect("valid JPY deposit");

    let deposits = store.deposits.lock().unwrap();
    assert_eq!(deposits.len(), 1);
    assert_eq!(deposits[0].currency, Some(Currency::Jpy));
    assert_eq!(deposits[0].crypto_amount, None);
}

#[tokio::test]
async fn crypto_deposit_validation() {
    let (service, store) = service_with(5);

    // 币种缺失
    let res = service
        .request_deposit(
            UserId(7),
            DepositRequest {
                amount: dec!(10000),
                method: TransferMethod::Crypto,
                currency: None,
                crypto_amount: Some(dec!(0.1)),
                request_key: None,
            },
        )
        .await;
    assert!(matches!(res, Err(TransferError::Validation(_))));

    // JPY 不是合法的链上币种
    let res = service
        .request_deposit(
            UserId(7),
            DepositRequest {
                amount: dec!(10000),
                method: TransferMethod::Crypto,
                currency: Some(Currency::Jpy),
                crypto_amount: Some(dec!(0.1)),
                request_key: None,
            },
        )
        .await;
    assert!(matches!(res, Err(TransferError::Validation(_))));

    // 币量缺失
    let res = service
        .request_deposit(
            UserId(7),
            DepositRequest {
                amount: dec!(10000),
                method: TransferMethod::Crypto,
                currency: Some(Currency::Btc),
                crypto_amount: None,
                request_key: None,
            },
        )
        .await;
    assert!(matches!(res, Err(TransferError::Validation(_))));

    assert!(store.deposits.lock().unwrap().is_empty());

    // 合法的 BTC 入金
    service
        .request_deposit(
            UserId(7),
            DepositRequest {
                amount: dec!(10000),
                method: TransferMethod::Crypto,
                currency: Some(Currency::Btc),
                crypto_amount: Some(dec!(0.1)),
                request_key: Some("req-1".into()),
            },
        )
        .await
        .expect("valid BTC deposit");
    assert_eq!(store.deposits.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn deposit_rejects_non_positive_amount() {
    let (service, store) = service_with(5);
    let res = service
        .request_deposit(
            UserId(7),
            DepositRequest {
                amount: dec!(0),
                method: TransferMethod::Jpy,
                currency: None,
                crypto_amount: None,
                request_key: None,
            },
        )
        .await;
    assert!(matches!(res, Err(TransferError::Validation(_))));
    assert!(store.deposits.lock().unwrap().is_empty());
}

#[tokio::test]
async fn wallet_overview_returns_snapshot_and_history() {
    let (service, _store) = service_with(5);
    let (wallet, history) = service.wallet_overview(UserId(1)).await.expect("overview");
    assert_eq!(wallet.balance_total, dec!(100));
    assert!(history.is_empty());
}
