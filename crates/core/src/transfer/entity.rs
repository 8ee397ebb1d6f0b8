use crate::common::UserId;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// # Summary
/// 出入金流水的系统内唯一标识。
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct TransferId(pub i64);

impl fmt::Display for TransferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 流水方向：入金或出金。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferKind {
    Deposit,
    Withdraw,
}

impl fmt::Display for TransferKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferKind::Deposit => write!(f, "DEPOSIT"),
            TransferKind::Withdraw => write!(f, "WITHDRAW"),
        }
    }
}

impl FromStr for TransferKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DEPOSIT" => Ok(TransferKind::Deposit),
            "WITHDRAW" => Ok(TransferKind::Withdraw),
            other => Err(format!("Unknown transfer kind: {}", other)),
        }
    }
}

/// 入金手段：日元银行转账或加密货币。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferMethod {
    Jpy,
    Crypto,
}

impl fmt::Display for TransferMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferMethod::Jpy => write!(f, "JPY"),
            TransferMethod::Crypto => write!(f, "CRYPTO"),
        }
    }
}

impl FromStr for TransferMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "JPY" => Ok(TransferMethod::Jpy),
            "CRYPTO" => Ok(TransferMethod::Crypto),
            other => Err(format!("Unknown transfer method: {}", other)),
        }
    }
}

/// 计价/入金币种。CRYPTO 入金目前只开放 BTC 与 ETH。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Currency {
    Jpy,
    Btc,
    Eth,
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Currency::Jpy => write!(f, "JPY"),
            Currency::Btc => write!(f, "BTC"),
            Currency::Eth => write!(f, "ETH"),
        }
    }
}

impl FromStr for Currency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "JPY" => Ok(Currency::Jpy),
            "BTC" => Ok(Currency::Btc),
            "ETH" => Ok(Currency::Eth),
            other => Err(format!("Unknown currency: {}", other)),
        }
    }
}

/// # Summary
/// 流水的生命周期状态。状态只允许单调前进：
/// PENDING → {COMPLETED, CANCELED, CONFIRMING} → COMPLETED，
/// 终态（COMPLETED/CANCELED）之后不可再变。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferStatus {
    /// 已申请，等待管理员处理
    Pending,
    /// CRYPTO 入金已分配地址，等待链上到账确认
    Confirming,
    /// 终态：已完成（入金已入账 / 出金已扣出）
    Completed,
    /// 终态：已取消（冻结资金已归还）
    Canceled,
}

impl TransferStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransferStatus::Completed | TransferStatus::Canceled)
    }
}

impl fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferStatus::Pending => write!(f, "PENDING"),
            TransferStatus::Confirming => write!(f, "CONFIRMING"),
            TransferStatus::Completed => write!(f, "COMPLETED"),
            TransferStatus::Canceled => write!(f, "CANCELED"),
        }
    }
}

impl FromStr for TransferStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(TransferStatus::Pending),
            "CONFIRMING" => Ok(TransferStatus::Confirming),
            "COMPLETED" => Ok(TransferStatus::Completed),
            "CANCELED" => Ok(TransferStatus::Canceled),
            other => Err(format!("Unknown transfer status: {}", other)),
        }
    }
}

/// # Summary
/// 一笔出入金流水。创建后金额与方向不可变，状态按 `TransferStatus` 单调推进。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transfer {
    pub id: TransferId,
    pub user_id: UserId,
    pub kind: TransferKind,
    pub method: TransferMethod,
    /// 入金币种（出金流水为 None）
    pub currency: Option<Currency>,
    /// 日元计价金额（入账/扣账的唯一依据）
    pub amount: Decimal,
    /// CRYPTO 入金时用户申报的币量
    pub crypto_amount: Option<Decimal>,
    pub status: TransferStatus,
    /// 幂等键：同一键的重复提交只会产生一条流水
    pub request_key: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// # Summary
/// 入金地址池中的一条地址。每条地址至多被分配一次：
/// `used`/`user_id` 一旦写入便不再回收。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepositAddress {
    pub id: i64,
    pub currency: Currency,
    pub address: String,
    pub memo_tag: Option<String>,
    pub used: bool,
    pub user_id: Option<UserId>,
    pub created_at: DateTime<Utc>,
}
