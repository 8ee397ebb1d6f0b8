use crate::wallet::SqliteWalletLedger;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use daicho_core::common::{GroupId, UserId};
use daicho_core::trade::entity::{NewTrade, Owner, Side, Trade, TradeClose, TradeId};
use daicho_core::trade::port::{TradeError, TradeStore};
use rust_decimal::Decimal;
use sqlx::{SqliteConnection, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info};

const OWNER_PARENT: &str = "PARENT";
const OWNER_MEMBER: &str = "MEMBER";

/// # Summary
/// 持仓流水存储的 SQLite 实现。
///
/// # Invariants
/// - 开仓事务内复核 (group, symbol) 无未平仓流水——调度周期重叠的唯一去重闸门。
/// - 结算批次 = 一个事务：父仓、子仓平仓与子仓钱包入账要么全部生效要么全部回滚。
pub struct SqliteTradeStore {
    pool: SqlitePool,
    wallet: SqliteWalletLedger,
}

impl SqliteTradeStore {
    pub fn new(pool: SqlitePool, wallet: SqliteWalletLedger) -> Self {
        Self { pool, wallet }
    }

    async fn insert_trade_tx(
        &self,
        conn: &mut SqliteConnection,
        t: &NewTrade,
    ) -> Result<TradeId, TradeError> {
        let (owner_kind, owner_user_id) = encode_owner(t.owner);
        let result = sqlx::query(
            "INSERT INTO trades (owner_kind, owner_user_id, group_id, symbol, side, size, \
             entry_price, close_price, profit, opened_at, closed_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, NULL, '0', ?, NULL)",
        )
        .bind(owner_kind)
        .bind(owner_user_id)
        .bind(t.group_id.0)
        .bind(&t.symbol)
        .bind(t.side.to_string())
        .bind(t.size.to_string())
        .bind(t.entry_price.to_string())
        .bind(t.opened_at)
        .execute(&mut *conn)
        .await
        .map_err(|e| TradeError::Storage(e.to_string()))?;

        Ok(TradeId(result.last_insert_rowid()))
    }

    async fn get_tx(
        &self,
        conn: &mut SqliteConnection,
        id: TradeId,
    ) -> Result<Trade, TradeError> {
        let row: Option<TradeRow> = sqlx::query_as(&format!("{} WHERE id = ?", SELECT_TRADES))
            .bind(id.0)
            .fetch_optional(&mut *conn)
            .await
            .map_err(|e| TradeError::Storage(e.to_string()))?;
        row.map(row_to_trade)
            .transpose()?
            .ok_or_else(|| TradeError::Storage(format!("trade {} vanished mid-transaction", id)))
    }
}

fn encode_owner(owner: Owner) -> (&'static str, Option<i64>) {
    match owner {
        Owner::Parent => (OWNER_PARENT, None),
        Owner::Member(user_id) => (OWNER_MEMBER, Some(user_id.0)),
    }
}

fn decode_owner(kind: &str, user_id: Option<i64>) -> Result<Owner, TradeError> {
    match (kind, user_id) {
        (OWNER_PARENT, None) => Ok(Owner::Parent),
        (OWNER_MEMBER, Some(id)) => Ok(Owner::Member(UserId(id))),
        (kind, user_id) => Err(TradeError::Storage(format!(
            "corrupt owner columns: kind={} user_id={:?}",
            kind, user_id
        ))),
    }
}

const SELECT_TRADES: &str = "SELECT id, owner_kind, owner_user_id, group_id, symbol, side, size, \
     entry_price, close_price, profit, opened_at, closed_at FROM trades";

type TradeRow = (
    i64,
    String,
    Option<i64>,
    i64,
    String,
    String,
    String,
    String,
    Option<String>,
    String,
    DateTime<Utc>,
    Option<DateTime<Utc>>,
);

fn row_to_trade(row: TradeRow) -> Result<Trade, TradeError> {
    let (id, owner_kind, owner_user_id, group_id, symbol, side, size, entry_price, close_price, profit, opened_at, closed_at) =
        row;
    Ok(Trade {
        id: TradeId(id),
        owner: decode_owner(&owner_kind, owner_user_id)?,
        group_id: GroupId(group_id),
        symbol,
        side: Side::from_str(&side).map_err(TradeError::Storage)?,
        size: parse_decimal(&size)?,
        entry_price: parse_decimal(&entry_price)?,
        close_price: close_price.map(|p| parse_decimal(&p)).transpose()?,
        profit: parse_decimal(&profit)?,
        opened_at,
        closed_at,
    })
}

fn parse_decimal(raw: &str) -> Result<Decimal, TradeError> {
    Decimal::from_str(raw).map_err(|e| TradeError::Storage(format!("corrupt decimal '{}': {}", raw, e)))
}

#[async_trait]
impl TradeStore for SqliteTradeStore {
    async fn find_open(
        &self,
        group_id: GroupId,
        symbol: &str,
    ) -> Result<Option<Trade>, TradeError> {
        let row: Option<TradeRow> = sqlx::query_as(&format!(
            "{} WHERE group_id = ? AND symbol = ? AND close_price IS NULL LIMIT 1",
            SELECT_TRADES
        ))
        .bind(group_id.0)
        .bind(symbol)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| TradeError::Storage(e.to_string()))?;

        row.map(row_to_trade).transpose()
    }

    async fn open_positions(
        &self,
        parent: NewTrade,
        children: Vec<NewTrade>,
    ) -> Result<Option<Vec<Trade>>, TradeError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| TradeError::Storage(e.to_string()))?;

        // 事务内复核去重闸门：重叠的调度周期在这里被拦下
        let existing: Option<(i64,)> = sqlx::query_as(
            "SELECT id FROM trades WHERE group_id = ? AND symbol = ? AND close_price IS NULL LIMIT 1",
        )
        .bind(parent.group_id.0)
        .bind(&parent.symbol)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| TradeError::Storage(e.to_string()))?;

        if let Some((id,)) = existing {
            debug!(
                group_id = parent.group_id.0,
                symbol = %parent.symbol,
                open_trade_id = id,
                "Open position already exists, skipping"
            );
            return Ok(None);
        }

        let mut created = Vec::with_capacity(children.len() + 1);
        let parent_id = self.insert_trade_tx(&mut tx, &parent).await?;
        created.push(self.get_tx(&mut tx, parent_id).await?);

        for child in &children {
            let child_id = self.insert_trade_tx(&mut tx, child).await?;
            created.push(self.get_tx(&mut tx, child_id).await?);
        }

        tx.commit()
            .await
            .map_err(|e| TradeError::Storage(e.to_string()))?;

        info!(
            group_id = parent.group_id.0,
            symbol = %parent.symbol,
            entry_price = %parent.entry_price,
            children = children.len(),
            "Opened parent position with replicated children"
        );
        Ok(Some(created))
    }

    async fn open_parents(
        &self,
        group_id: GroupId,
        symbol: Option<&str>,
    ) -> Result<Vec<Trade>, TradeError> {
        let rows: Vec<TradeRow> = match symbol {
            Some(symbol) => sqlx::query_as(&format!(
                "{} WHERE owner_kind = 'PARENT' AND group_id = ? AND symbol = ? AND close_price IS NULL",
                SELECT_TRADES
            ))
            .bind(group_id.0)
            .bind(symbol)
            .fetch_all(&self.pool)
            .await,
            None => sqlx::query_as(&format!(
                "{} WHERE owner_kind = 'PARENT' AND group_id = ? AND close_price IS NULL",
                SELECT_TRADES
            ))
            .bind(group_id.0)
            .fetch_all(&self.pool)
            .await,
        }
        .map_err(|e| TradeError::Storage(e.to_string()))?;

        rows.into_iter().map(row_to_trade).collect()
    }

    async fn open_children(
        &self,
        group_id: GroupId,
        symbol: &str,
    ) -> Result<Vec<Trade>, TradeError> {
        let rows: Vec<TradeRow> = sqlx::query_as(&format!(
            "{} WHERE owner_kind = 'MEMBER' AND group_id = ? AND symbol = ? AND close_price IS NULL",
            SELECT_TRADES
        ))
        .bind(group_id.0)
        .bind(symbol)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| TradeError::Storage(e.to_string()))?;

        rows.into_iter().map(row_to_trade).collect()
    }

    async fn open_by_user(
        &self,
        user_id: UserId,
        symbol: Option<&str>,
    ) -> Result<Vec<Trade>, TradeError> {
        let rows: Vec<TradeRow> = match symbol {
            Some(symbol) => sqlx::query_as(&format!(
                "{} WHERE owner_kind = 'MEMBER' AND owner_user_id = ? AND symbol = ? AND close_price IS NULL",
                SELECT_TRADES
            ))
            .bind(user_id.0)
            .bind(symbol)
            .fetch_all(&self.pool)
            .await,
            None => sqlx::query_as(&format!(
                "{} WHERE owner_kind = 'MEMBER' AND owner_user_id = ? AND close_price IS NULL",
                SELECT_TRADES
            ))
            .bind(user_id.0)
            .fetch_all(&self.pool)
            .await,
        }
        .map_err(|e| TradeError::Storage(e.to_string()))?;

        rows.into_iter().map(row_to_trade).collect()
    }

    async fn settle_batch(
        &self,
        closes: Vec<TradeClose>,
        closed_at: DateTime<Utc>,
    ) -> Result<usize, TradeError> {
        if closes.is_empty() {
            return Ok(0);
        }

        // 批次涉及的全部成员钱包：升序加锁，避免与其他批次互相等待
        let mut member_ids: Vec<UserId> = closes.iter().filter_map(|c| c.owner.member_id()).collect();
        member_ids.sort();
        member_ids.dedup();

        let mut guards = Vec::with_capacity(member_ids.len());
        for user_id in &member_ids {
            guards.push(self.wallet.lock_wallet(*user_id).await);
            self.wallet.ensure_not_halted(*user_id)?;
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| TradeError::Storage(e.to_string()))?;

        for close in &closes {
            let updated = sqlx::query(
                "UPDATE trades SET close_price = ?, profit = ?, closed_at = ? \
                 WHERE id = ? AND closed_at IS NULL",
            )
            .bind(close.close_price.to_string())
            .bind(close.profit.to_string())
            .bind(closed_at)
            .bind(close.trade_id.0)
            .execute(&mut *tx)
            .await
            .map_err(|e| TradeError::Storage(e.to_string()))?;

            if updated.rows_affected() != 1 {
                // 已被并发平仓：按规约放弃整批，不允许半平状态落地
                return Err(TradeError::AlreadyClosed { id: close.trade_id });
            }

            // 子仓盈亏入账（可为负，无保证金地板）；父仓绝不触碰钱包
            if let Some(user_id) = close.owner.member_id() {
                self.wallet
                    .credit_tx(&mut tx, user_id, close.profit, "SettleProfit")
                    .await?;
            }
        }

        tx.commit()
            .await
            .map_err(|e| TradeError::Storage(e.to_string()))?;

        info!(closed = closes.len(), "Settlement batch committed");
        Ok(closes.len())
    }
}
