use daicho_core::common::UserId;
use daicho_core::kyc::port::{KYC_LEVEL_CLEARED, KycGate};
use daicho_core::ledger::entity::Wallet;
use daicho_core::ledger::port::WalletLedger;
use daicho_core::transfer::entity::{Currency, Transfer, TransferId, TransferMethod};
use daicho_core::transfer::port::{NewDeposit, TransferError, TransferStore};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::warn;

/// 用户钱包页默认返回的流水条数。
const HISTORY_LIMIT: u32 = 50;

/// # Summary
/// 新入金申请的外部参数（JPY / CRYPTO 共通）。
#[derive(Debug, Clone)]
pub struct DepositRequest {
    pub amount: Decimal,
    pub method: TransferMethod,
    pub currency: Option<Currency>,
    pub crypto_amount: Option<Decimal>,
    /// 幂等键：客户端重试时携带同一键，只会产生一条流水
    pub request_key: Option<String>,
}

/// # Summary
/// `TransferService` 是出入金状态机的入口编排者。
/// 校验失败在任何变动发生之前拒绝；通过校验后委托存储端口
/// 在单一事务内完成状态迁移与余额变动。
pub struct TransferService {
    store: Arc<dyn TransferStore>,
    ledger: Arc<dyn WalletLedger>,
    kyc: Arc<dyn KycGate>,
}

impl TransferService {
    pub fn new(
        store: Arc<dyn TransferStore>,
        ledger: Arc<dyn WalletLedger>,
        kyc: Arc<dyn KycGate>,
    ) -> Self {
        Self { store, ledger, kyc }
    }

    /// # Logic
    /// 1. 金额必须为正。
    /// 2. JPY 入金强制币种为 JPY，忽略申报币量。
    /// 3. CRYPTO 入金要求币种为 BTC/ETH 且申报币量为正。
    /// 4. 校验全部通过后创建 PENDING 流水（含受理通知入队）。
    pub async fn request_deposit(
        &self,
        user_id: UserId,
        req: DepositRequest,
    ) -> Result<Transfer, TransferError> {
        if req.amount <= Decimal::ZERO {
            return Err(TransferError::Validation("Invalid deposit amount".into()));
        }

        let (currency, crypto_amount) = match req.method {
            TransferMethod::Jpy => (Some(Currency::Jpy), None),
            TransferMethod::Crypto => {
                let currency = match req.currency {
                    Some(c @ (Currency::Btc | Currency::Eth)) => c,
                    _ => {
                        return Err(TransferError::Validation("Invalid crypto currency".into()));
                    }
                };
                match req.crypto_amount {
                    Some(amount) if amount > Decimal::ZERO => (Some(currency), Some(amount)),
                    _ => return Err(TransferError::Validation("Invalid cryptoAmount".into())),
                }
            }
        };

        self.store
            .create_deposit(NewDeposit {
                user_id,
                method: req.method,
                currency,
                amount: req.amount,
                crypto_amount,
                request_key: req.request_key,
            })
            .await
    }

    /// # Logic
    /// 1. 金额必须为正。
    /// 2. KYC 等级必须恰好为 5（完成），否则拒绝。
    /// 3. 创建 PENDING 出金并在同一事务内冻结资金
    ///    （申请时刻保留，杜绝同一笔可用余额被重复申请出金）。
    pub async fn request_withdraw(
        &self,
        user_id: UserId,
        amount: Decimal,
        request_key: Option<String>,
    ) -> Result<Transfer, TransferError> {
        if amount <= Decimal::ZERO {
            return Err(TransferError::Validation("Amount must be positive".into()));
        }

        let level = self
            .kyc
            .status(user_id)
            .await
            .map_err(|e| TransferError::Storage(e.to_string()))?;
        if level != KYC_LEVEL_CLEARED {
            warn!(
                user_id = user_id.0,
                level = i64::from(level),
                "Withdraw rejected: KYC not cleared"
            );
            return Err(TransferError::KycNotCleared(level));
        }

        self.store.create_withdraw(user_id, amount, request_key).await
    }

    /// 管理员批准入金。JPY 即时入账完成；CRYPTO 分配地址转入 CONFIRMING。
    pub async fn approve_deposit(&self, id: TransferId) -> Result<Transfer, TransferError> {
        self.store.approve_deposit(id).await
    }

    /// 管理员确认 CRYPTO 入金已到账：CONFIRMING → COMPLETED 并入账。
    pub async fn confirm_crypto_deposit(&self, id: TransferId) -> Result<Transfer, TransferError> {
        self.store.confirm_crypto_deposit(id).await
    }

    /// 管理员批准出金：冻结资金扣出系统。
    pub async fn approve_withdraw(&self, id: TransferId) -> Result<Transfer, TransferError> {
        self.store.approve_withdraw(id).await
    }

    /// 管理员取消出金：冻结归还、KYC 降级为 4。
    pub async fn cancel_withdraw(&self, id: TransferId) -> Result<Transfer, TransferError> {
        self.store.cancel_withdraw(id).await
    }

    /// 用户钱包页：余额快照 + 近期流水。
    pub async fn wallet_overview(
        &self,
        user_id: UserId,
    ) -> Result<(Wallet, Vec<Transfer>), TransferError> {
        let wallet = self.ledger.wallet(user_id).await?;
        let history = self.store.history(user_id, HISTORY_LIMIT).await?;
        Ok((wallet, history))
    }
}
