use daicho_core::common::{GroupId, UserId};
use daicho_core::common::time::TimeProvider;
use daicho_core::price::port::PriceSource;
use daicho_core::trade::entity::{Side, Trade, TradeClose};
use daicho_core::trade::port::{TradeError, TradeStore};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::info;

/// 已实现盈亏：BUY 为 `(close - entry) * size`，SELL 为 `(entry - close) * size`。
pub(crate) fn compute_profit(side: Side, entry: Decimal, close: Decimal, size: Decimal) -> Decimal {
    match side {
        Side::Buy => (close - entry) * size,
        Side::Sell => (entry - close) * size,
    }
}

fn close_for(trade: &Trade, close_price: Decimal) -> TradeClose {
    TradeClose {
        trade_id: trade.id,
        owner: trade.owner,
        close_price,
        profit: compute_profit(trade.side, trade.entry_price, close_price, trade.size),
    }
}

/// # Summary
/// `PositionSettlement` 负责平仓结算：父仓连带子仓、或单个用户的全部持仓。
/// 结算价从行情源取（按点差修正的 Bid/Ask），行情失败时整个操作
/// 在任何写入发生之前中止；一个结算批次 = 存储层的一个事务。
pub struct PositionSettlement {
    trades: Arc<dyn TradeStore>,
    prices: Arc<dyn PriceSource>,
    clock: Arc<dyn TimeProvider>,
}

impl PositionSettlement {
    pub fn new(
        trades: Arc<dyn TradeStore>,
        prices: Arc<dyn PriceSource>,
        clock: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            trades,
            prices,
            clock,
        }
    }

    /// # Logic
    /// 父仓一齐决済 → 子仓全员決済：
    /// 1. 找出分组下未平仓父仓（可按标的过滤）。
    /// 2. 每个父仓取一次结算价，父仓与其全部子仓用同一收盘价结算。
    /// 3. 父仓 + 子仓 + 子仓钱包入账构成一个批次（一个事务）；
    ///    任何一条失败整批回滚。父仓永不触碰钱包。
    ///
    /// 返回实际平仓条数。
    pub async fn close_group(
        &self,
        group_id: GroupId,
        symbol: Option<&str>,
    ) -> Result<usize, TradeError> {
        let parents = self.trades.open_parents(group_id, symbol).await?;
        let mut closed = 0;

        for parent in parents {
            let close_price = self
                .prices
                .settlement_price(&parent.symbol, parent.side)
                .await?;
            let children = self.trades.open_children(group_id, &parent.symbol).await?;

            let mut batch = Vec::with_capacity(children.len() + 1);
            batch.push(close_for(&parent, close_price));
            batch.extend(children.iter().map(|c| close_for(c, close_price)));

            let n = self.trades.settle_batch(batch, self.clock.now()).await?;
            closed += n;

            info!(
                group_id = group_id.0,
                symbol = %parent.symbol,
                %close_price,
                closed = n,
                "Group positions settled"
            );
        }

        Ok(closed)
    }

    /// # Logic
    /// 单个用户的全部未平仓子仓（可按标的过滤）作为一个批次结算：
    /// 先为每条持仓取结算价（全部成功才继续），再一次性提交。
    pub async fn close_user(
        &self,
        user_id: UserId,
        symbol: Option<&str>,
    ) -> Result<usize, TradeError> {
        let opens = self.trades.open_by_user(user_id, symbol).await?;
        if opens.is_empty() {
            return Ok(0);
        }

        // 行情全部取齐之前不碰存储：半批结算不可接受
        let mut batch = Vec::with_capacity(opens.len());
        for trade in &opens {
            let close_price = self
                .prices
                .settlement_price(&trade.symbol, trade.side)
                .await?;
            batch.push(close_for(trade, close_price));
        }

        let closed = self.trades.settle_batch(batch, self.clock.now()).await?;
        info!(user_id = user_id.0, closed, "User positions settled");
        Ok(closed)
    }
}
