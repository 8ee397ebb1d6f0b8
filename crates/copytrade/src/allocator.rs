use daicho_core::common::GroupId;
use daicho_core::common::time::TimeProvider;
use daicho_core::price::port::PriceSource;
use daicho_core::trade::entity::{AutoTradeConfig, AutoTradeStatus, NewTrade, Owner, TradeId};
use daicho_core::trade::port::{GroupDirectory, TradeError, TradeStore};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// 手数步进：所有子仓手数向下取整到 0.01 的整数倍。
fn lot_step() -> Decimal {
    Decimal::new(1, 2)
}

/// # Logic
/// 手数量化：`floor(raw / 0.01) * 0.01`，不足 0.01 时保底 0.01。
/// 保底意味着小资金成员获得高于其资金占比的相对敞口——
/// 这是运营明示的配分政策，不是舍入缺陷。
pub(crate) fn quantize_lot(raw: Decimal) -> Decimal {
    let step = lot_step();
    let lots = (raw / step).floor() * step;
    if lots < step { step } else { lots }
}

/// 单次 (group, symbol) 调度的处理结果。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllocationOutcome {
    /// 配置为 STOP，整体跳过
    SkippedStopped,
    /// 该 (group, symbol) 已有未平仓流水（调度周期重叠的去重闸门）
    SkippedOpenPosition,
    /// 事务内复核时发现已被并发建仓，放弃本次
    SkippedRace,
    /// 成功建仓
    Opened {
        parent_id: TradeId,
        children: usize,
        /// 成员总资金为零时仅建父仓、跳过复制
        replication_skipped: bool,
    },
}

/// # Summary
/// `CopyTradeAllocator` 把运营配置的父仓意图复制为按资金权重配分的子仓。
/// 每个调度周期对每个 (group, symbol) 调用一次 `run`。
pub struct CopyTradeAllocator {
    trades: Arc<dyn TradeStore>,
    groups: Arc<dyn GroupDirectory>,
    prices: Arc<dyn PriceSource>,
    clock: Arc<dyn TimeProvider>,
}

impl CopyTradeAllocator {
    pub fn new(
        trades: Arc<dyn TradeStore>,
        groups: Arc<dyn GroupDirectory>,
        prices: Arc<dyn PriceSource>,
        clock: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            trades,
            groups,
            prices,
            clock,
        }
    }

    /// # Logic
    /// 一个完整的调度周期：读取全部分组配置，逐 (group, symbol) 执行。
    /// 单个标的失败只记录告警，不中断整个周期。
    pub async fn run_cycle(&self) -> Result<(), TradeError> {
        let configs = self.groups.load_configs().await?;
        for (group_id, symbols) in configs {
            for (symbol, conf) in &symbols {
                match self.run(group_id, symbol, conf).await {
                    Ok(outcome) => {
                        debug!(group_id = group_id.0, symbol = %symbol, ?outcome, "Allocator tick")
                    }
                    Err(e) => {
                        warn!(group_id = group_id.0, symbol = %symbol, error = %e, "Allocator tick failed")
                    }
                }
            }
        }
        Ok(())
    }

    /// # Logic
    /// 1. STOP 配置整体跳过。
    /// 2. 该 (group, symbol) 已有未平仓流水则跳过——防止重叠调度重复建仓的
    ///    唯一去重机制。
    /// 3. 取当前市场价建父仓。
    /// 4. 成员总资金（balance_total 之和）为零时仅建父仓，跳过复制（防除零）。
    /// 5. 每个成员按 `floor((size * balance / total) / 0.01) * 0.01`（保底 0.01）
    ///    配得子仓，入场价与建仓时间与父仓完全一致。父子仓在同一事务内落库。
    pub async fn run(
        &self,
        group_id: GroupId,
        symbol: &str,
        conf: &AutoTradeConfig,
    ) -> Result<AllocationOutcome, TradeError> {
        if conf.status == AutoTradeStatus::Stopped {
            return Ok(AllocationOutcome::SkippedStopped);
        }

        if self.trades.find_open(group_id, symbol).await?.is_some() {
            return Ok(AllocationOutcome::SkippedOpenPosition);
        }

        let entry_price = self.prices.price(symbol).await?;
        let opened_at = self.clock.now();

        let members = self.groups.members_with_capital(group_id).await?;
        let total_capital: Decimal = members.iter().map(|m| m.balance_total).sum();

        let parent = NewTrade {
            owner: Owner::Parent,
            group_id,
            symbol: symbol.to_string(),
            side: conf.direction,
            size: conf.size,
            entry_price,
            opened_at,
        };

        let replication_skipped = total_capital <= Decimal::ZERO;
        let children: Vec<NewTrade> = if replication_skipped {
            warn!(
                group_id = group_id.0,
                symbol,
                "Total member capital is zero, skipping child replication"
            );
            Vec::new()
        } else {
            members
                .iter()
                .map(|m| NewTrade {
                    owner: Owner::Member(m.user_id),
                    group_id,
                    symbol: symbol.to_string(),
                    side: conf.direction,
                    size: quantize_lot(conf.size * m.balance_total / total_capital),
                    entry_price,
                    opened_at,
                })
                .collect()
        };

        let child_count = children.len();
        match self.trades.open_positions(parent, children).await? {
            Some(created) => {
                let parent_id = created
                    .first()
                    .map(|t| t.id)
                    .ok_or_else(|| TradeError::Storage("open_positions returned empty batch".into()))?;
                info!(
                    group_id = group_id.0,
                    symbol,
                    parent_id = parent_id.0,
                    children = child_count,
                    %entry_price,
                    "Parent position opened and replicated"
                );
                Ok(AllocationOutcome::Opened {
                    parent_id,
                    children: child_count,
                    replication_skipped,
                })
            }
            None => Ok(AllocationOutcome::SkippedRace),
        }
    }
}
