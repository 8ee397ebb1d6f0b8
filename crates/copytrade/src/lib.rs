//! # `daicho-copytrade` - 跟单建仓与持仓结算
//!
//! 两个调度驱动的服务：
//! - `CopyTradeAllocator`：把父仓按成员资金权重复制为子仓（PAM 配分）
//! - `PositionSettlement`：按点差修正后的结算价平仓并为子仓入账盈亏
//!
//! 行情失败永远发生在任何写入之前；落库的原子性由 `TradeStore` 承担。

pub mod allocator;
pub mod settlement;
