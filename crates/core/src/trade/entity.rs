use crate::common::{GroupId, UserId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// # Summary
/// 持仓流水的系统内唯一标识。
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct TradeId(pub i64);

impl fmt::Display for TradeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 持仓方向定义。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    /// 买入 (做多)
    Buy,
    /// 卖出 (做空)
    Sell,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

impl FromStr for Side {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BUY" => Ok(Side::Buy),
            "SELL" => Ok(Side::Sell),
            other => Err(format!("Unknown side: {}", other)),
        }
    }
}

/// # Summary
/// 持仓归属的带标签类型。父仓（跟单参照仓）不属于任何真实用户，
/// 用显式变体表达，彻底消灭"保留用户 ID 当父账号"与真实账号撞号的风险。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Owner {
    /// 参照父仓：永不触碰任何钱包
    Parent,
    /// 跟单成员的子仓
    Member(UserId),
}

impl Owner {
    pub fn is_parent(&self) -> bool {
        matches!(self, Owner::Parent)
    }

    /// 子仓归属的用户；父仓返回 None。
    pub fn member_id(&self) -> Option<UserId> {
        match self {
            Owner::Parent => None,
            Owner::Member(id) => Some(*id),
        }
    }
}

/// # Summary
/// 一笔开/平仓流水。建仓时 `close_price`/`closed_at` 为空；
/// 平仓恰好变更一次（写入收盘价、盈亏、平仓时间），此后永不再变。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub id: TradeId,
    pub owner: Owner,
    pub group_id: GroupId,
    pub symbol: String,
    pub side: Side,
    /// 手数（0.01 步进的 Lot）
    pub size: Decimal,
    pub entry_price: Decimal,
    pub close_price: Option<Decimal>,
    /// 已实现盈亏。未平仓时为 0。
    pub profit: Decimal,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl Trade {
    pub fn is_open(&self) -> bool {
        self.close_price.is_none()
    }
}

/// 待建仓的流水（尚未落库，无 ID）。
#[derive(Debug, Clone)]
pub struct NewTrade {
    pub owner: Owner,
    pub group_id: GroupId,
    pub symbol: String,
    pub side: Side,
    pub size: Decimal,
    pub entry_price: Decimal,
    pub opened_at: DateTime<Utc>,
}

/// 结算批次中的一条平仓指令：对目标持仓写入收盘价与盈亏。
/// 成员仓同时把 `profit` 入账到其钱包；父仓不触碰钱包。
#[derive(Debug, Clone)]
pub struct TradeClose {
    pub trade_id: TradeId,
    pub owner: Owner,
    pub close_price: Decimal,
    pub profit: Decimal,
}

/// # Summary
/// 单个 (group, symbol) 的自动跟单配置，来自分组配置 JSON。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoTradeConfig {
    pub direction: Side,
    pub size: Decimal,
    pub status: AutoTradeStatus,
}

/// 自动跟单开关。STOP 状态的 (group, symbol) 在调度周期里被整体跳过。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AutoTradeStatus {
    #[serde(rename = "ACTIVE")]
    Active,
    #[serde(rename = "STOP")]
    Stopped,
}

/// 参与资金权重计算的分组成员（及其当时的总余额）。
#[derive(Debug, Clone)]
pub struct GroupMember {
    pub user_id: UserId,
    pub balance_total: Decimal,
}
