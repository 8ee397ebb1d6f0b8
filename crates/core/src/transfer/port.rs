use super::entity::{Currency, DepositAddress, Transfer, TransferId, TransferMethod, TransferStatus};
use crate::common::UserId;
use crate::ledger::port::LedgerError;
use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;

/// # Summary
/// 出入金状态机中可能发生的错误。每个变体携带可供运营判断的失败原因：
/// 校验/状态冲突/余额不足为确定性拒绝，地址池耗尽需要运营补充，均不可自动重试。
#[derive(Error, Debug)]
pub enum TransferError {
    #[error("Validation failed: {0}")]
    Validation(String),
    /// 在非要求状态的流水上执行了状态迁移。拒绝且无任何变动。
    #[error("流水 {id} 状态不允许该操作 (期望 {expected}, 实际 {found})")]
    StateConflict {
        id: TransferId,
        expected: TransferStatus,
        found: TransferStatus,
    },
    /// 地址池中没有该币种的可用地址。运营侧必须补充地址，系统绝不静默重试。
    #[error("未使用の {0} アドレスがありません")]
    AddressPoolExhausted(Currency),
    #[error("KYC 等级 {0} 不允许出金（要求等级 5）")]
    KycNotCleared(u8),
    /// 幂等键重复：同一申请已存在，不再创建第二条流水。
    #[error("Duplicate transfer request: {0}")]
    Duplicate(String),
    #[error("流水不存在: {0}")]
    NotFound(TransferId),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error("Storage error: {0}")]
    Storage(String),
}

/// 新建入金申请的参数集。
#[derive(Debug, Clone)]
pub struct NewDeposit {
    pub user_id: UserId,
    pub method: TransferMethod,
    pub currency: Option<Currency>,
    pub amount: Decimal,
    pub crypto_amount: Option<Decimal>,
    pub request_key: Option<String>,
}

/// # Summary
/// 出入金流水存储端口。所有改变余额的方法必须在单一事务内
/// 完成"状态迁移 + 余额变动 + 通知入队"，状态迁移一律用条件更新
/// （compare-and-swap）实现，杜绝读后写竞态窗口。
#[async_trait]
pub trait TransferStore: Send + Sync {
    /// 创建 PENDING 入金申请并入队受理通知。
    async fn create_deposit(&self, deposit: NewDeposit) -> Result<Transfer, TransferError>;

    /// 创建 PENDING 出金申请并在同一事务内冻结 `amount`
    /// （申请时刻保留资金，防止同一笔可用余额被重复申请出金）。
    async fn create_withdraw(
        &self,
        user_id: UserId,
        amount: Decimal,
        request_key: Option<String>,
    ) -> Result<Transfer, TransferError>;

    /// 批准入金（仅 PENDING）。JPY：入账并迁移 COMPLETED；
    /// CRYPTO：独占分配入金地址、迁移 CONFIRMING、入队地址通知。
    async fn approve_deposit(&self, id: TransferId) -> Result<Transfer, TransferError>;

    /// 确认 CRYPTO 入金到账（仅 CONFIRMING）：入账并迁移 COMPLETED。
    async fn confirm_crypto_deposit(&self, id: TransferId) -> Result<Transfer, TransferError>;

    /// 批准出金（仅 PENDING）：`settle_lock(commit)` 扣出系统，迁移 COMPLETED。
    async fn approve_withdraw(&self, id: TransferId) -> Result<Transfer, TransferError>;

    /// 取消出金（仅 PENDING）：解冻归还，迁移 CANCELED，
    /// 同一事务内将该用户 KYC 强制降为 4（需补充验证）。
    async fn cancel_withdraw(&self, id: TransferId) -> Result<Transfer, TransferError>;

    /// 按 ID 读取流水。
    async fn get(&self, id: TransferId) -> Result<Transfer, TransferError>;

    /// 用户近期流水（按创建时间倒序）。
    async fn history(&self, user_id: UserId, limit: u32) -> Result<Vec<Transfer>, TransferError>;
}

/// # Summary
/// 入金地址池的运营端口：补充地址、查询库存。
/// 分配本身发生在入金批准事务内部，不经过此端口。
#[async_trait]
pub trait AddressPool: Send + Sync {
    /// 录入一条新地址（未使用、未分配）。同币种同地址重复录入报 Validation。
    async fn add_address(
        &self,
        currency: Currency,
        address: &str,
        memo_tag: Option<&str>,
    ) -> Result<DepositAddress, TransferError>;

    /// 该币种当前可分配的地址数。运营据此补货。
    async fn available_count(&self, currency: Currency) -> Result<u64, TransferError>;
}
