use crate::common::UserId;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// # Summary
/// 用户钱包聚合根。每个用户在注册时创建一个零余额钱包，终身不删除，
/// 所有余额变动只允许经由账本端口（`WalletLedger`）发生。
///
/// # Invariants
/// - `balance_total == balance_available + balance_locked` 在任何可观测时刻成立。
/// - `balance_locked >= 0` 恒成立；`available`/`total` 仅可能因亏损结算转负。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wallet {
    pub user_id: UserId,
    /// 总余额（可用 + 冻结）
    pub balance_total: Decimal,
    /// 可用余额（可用于出金申请的现金）
    pub balance_available: Decimal,
    /// 冻结余额（在途出金申请占用，批准时扣出系统、取消时归还可用）
    pub balance_locked: Decimal,
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    /// # Logic
    /// 三项余额的恒等式校验。存储层在每次变动后复核，
    /// 不满足即视为此前发生过非原子写入，属于致命故障。
    pub fn invariant_holds(&self) -> bool {
        self.balance_total == self.balance_available + self.balance_locked
            && self.balance_locked >= Decimal::ZERO
    }

    /// 健康判定：恒等式之外还要求三项余额全部非负。
    /// 亏损结算允许把 available/total 打到负值，因此负余额不是恒等式故障，
    /// 但会被风控报表单独标记。
    pub fn is_healthy(&self) -> bool {
        self.invariant_holds()
            && self.balance_available >= Decimal::ZERO
            && self.balance_total >= Decimal::ZERO
    }
}
