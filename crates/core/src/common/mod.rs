use serde::{Deserialize, Serialize};
use std::fmt;

pub mod time;

/// # Summary
/// 系统内的唯一用户标识。钱包、出入金、KYC 与子账户持仓全部以它为归属键。
///
/// # Invariants
/// - UserId 在整个系统中必须全局唯一（由存储层自增主键保证）。
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// # Summary
/// 跟单分组标识。父仓复制与资金权重计算均以 Group 为作用域。
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupId(pub i64);

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
