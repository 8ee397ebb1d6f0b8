use super::entity::{AutoTradeConfig, GroupMember, NewTrade, Trade, TradeClose, TradeId};
use crate::common::{GroupId, UserId};
use crate::ledger::port::LedgerError;
use crate::price::port::PriceError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use thiserror::Error;

/// # Summary
/// 跟单建仓与结算环节中可能发生的错误。
#[derive(Error, Debug)]
pub enum TradeError {
    /// 行情源失败：整个操作在任何写入发生之前中止，调用方可重试。
    #[error(transparent)]
    Price(#[from] PriceError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    /// 结算批次内有持仓已被并发平掉：整批回滚，不允许半平状态落地。
    #[error("持仓 {id} 已被平仓，结算批次整体回滚")]
    AlreadyClosed { id: TradeId },
    #[error("Storage error: {0}")]
    Storage(String),
}

/// # Summary
/// 持仓流水存储端口。
///
/// # Invariants
/// - 每个 (group, symbol) 至多存在一笔未平仓父仓（开仓事务内复核）。
/// - 平仓批次内的全部变更（父 + 子 + 子仓钱包入账）同事务生效或同事务回滚。
#[async_trait]
pub trait TradeStore: Send + Sync {
    /// 查找 (group, symbol) 当前未平仓的流水（如有）。
    async fn find_open(&self, group_id: GroupId, symbol: &str)
    -> Result<Option<Trade>, TradeError>;

    /// 在单一事务内建父仓与全部子仓。事务内会再次检查
    /// (group, symbol) 不存在未平仓流水——这是防止调度周期重叠重复建仓的
    /// 唯一去重机制，重复时整个事务放弃并返回 Ok(None)。
    async fn open_positions(
        &self,
        parent: NewTrade,
        children: Vec<NewTrade>,
    ) -> Result<Option<Vec<Trade>>, TradeError>;

    /// 分组下未平仓的父仓（可按标的过滤）。
    async fn open_parents(
        &self,
        group_id: GroupId,
        symbol: Option<&str>,
    ) -> Result<Vec<Trade>, TradeError>;

    /// (group, symbol) 下未平仓的成员子仓。
    async fn open_children(&self, group_id: GroupId, symbol: &str)
    -> Result<Vec<Trade>, TradeError>;

    /// 某用户的全部未平仓子仓（可按标的过滤）。
    async fn open_by_user(
        &self,
        user_id: UserId,
        symbol: Option<&str>,
    ) -> Result<Vec<Trade>, TradeError>;

    /// 执行一个结算批次：逐条条件更新平仓（`closed_at IS NULL` 守护），
    /// 成员仓同事务入账盈亏并复核钱包恒等式。任何一条失败则整批回滚。
    /// 返回实际平仓条数。
    async fn settle_batch(
        &self,
        closes: Vec<TradeClose>,
        closed_at: DateTime<Utc>,
    ) -> Result<usize, TradeError>;
}

/// # Summary
/// 分组目录端口：跟单调度所需的成员资金权重与各分组的自动跟单配置。
#[async_trait]
pub trait GroupDirectory: Send + Sync {
    /// 分组成员及其钱包总余额（资金权重的分子/分母来源）。
    async fn members_with_capital(&self, group_id: GroupId)
    -> Result<Vec<GroupMember>, TradeError>;

    /// 读取全部分组的自动跟单配置（symbol → 配置）。
    async fn load_configs(
        &self,
    ) -> Result<Vec<(GroupId, HashMap<String, AutoTradeConfig>)>, TradeError>;

    /// 覆盖保存某分组的自动跟单配置。
    async fn save_config(
        &self,
        group_id: GroupId,
        config: &HashMap<String, AutoTradeConfig>,
    ) -> Result<(), TradeError>;
}
