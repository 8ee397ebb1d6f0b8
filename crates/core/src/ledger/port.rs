use super::entity::Wallet;
use crate::common::{GroupId, UserId};
use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;

/// # Summary
/// 钱包账本操作中可能发生的错误。
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("钱包不存在: user={0}")]
    WalletNotFound(UserId),
    #[error("可用余额不足. 需要: {required}, 实际: {actual}")]
    InsufficientFunds {
        required: Decimal,
        actual: Decimal,
    },
    /// 余额恒等式被破坏。属于致命故障：该钱包会被冻结写入并触发告警，
    /// 绝不能当作普通业务错误向用户透出。
    #[error(
        "余额恒等式被破坏: user={user_id} total={total} available={available} locked={locked}"
    )]
    InvariantViolation {
        user_id: UserId,
        total: Decimal,
        available: Decimal,
        locked: Decimal,
    },
    #[error("钱包 {0} 已因恒等式故障被停写")]
    WalletHalted(UserId),
    #[error("Storage error: {0}")]
    Storage(String),
}

/// # Summary
/// 钱包账本端口。余额恒等式的唯一守护者：
/// 每个操作针对目标钱包原子执行，变动后复核 `total == available + locked`。
///
/// # Invariants
/// - 同一钱包的并发操作必须线性化（单写者纪律或行级锁）。
/// - 不同用户的钱包相互独立，可并发变动。
/// - 任何操作要么完整生效，要么完全不生效。
#[async_trait]
pub trait WalletLedger: Send + Sync {
    /// 入账。入金完成与结算盈亏均走此口：
    /// `available += amount; total += amount`。结算亏损时 `amount` 为负，
    /// 允许把余额打到负值（无保证金地板，刻意保留的业务行为）。
    async fn credit(&self, user_id: UserId, amount: Decimal) -> Result<(), LedgerError>;

    /// 冻结。出金申请时立刻保留资金：`available -= amount; locked += amount`。
    /// 可用不足时以 `InsufficientFunds` 拒绝且不产生任何变动。
    async fn lock(&self, user_id: UserId, amount: Decimal) -> Result<(), LedgerError>;

    /// 解冻结算。`commit = true` 表示资金离开系统（出金批准）：
    /// `locked -= amount; total -= amount`；
    /// `commit = false` 表示归还（出金取消）：`locked -= amount; available += amount`。
    async fn settle_lock(
        &self,
        user_id: UserId,
        amount: Decimal,
        commit: bool,
    ) -> Result<(), LedgerError>;

    /// 读取钱包快照。
    async fn wallet(&self, user_id: UserId) -> Result<Wallet, LedgerError>;
}

/// # Summary
/// 用户注册端口。钱包与用户行必须在同一事务中创建（注册即有零余额钱包），
/// 因此开户动作归入账本域而不是独立的用户管理域。
#[async_trait]
pub trait UserRegistry: Send + Sync {
    /// 创建用户与其零余额钱包，返回新用户 ID。
    async fn register(&self, name: &str, group_id: Option<GroupId>)
    -> Result<UserId, LedgerError>;
}
