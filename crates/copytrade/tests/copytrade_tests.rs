use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use daicho_copytrade::allocator::{AllocationOutcome, CopyTradeAllocator};
use daicho_copytrade::settlement::PositionSettlement;
use daicho_core::common::time::{FakeClockProvider, TimeProvider};
use daicho_core::common::{GroupId, UserId};
use daicho_core::price::port::{PriceError, PriceSource};
use daicho_core::trade::entity::{
    AutoTradeConfig, AutoTradeStatus, GroupMember, NewTrade, Side, Trade, TradeClose, TradeId,
};
use daicho_core::trade::port::{GroupDirectory, TradeError, TradeStore};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// 内存版持仓存储替身：保真模拟批次语义（整批生效或整批放弃）。
#[derive(Default)]
struct MemTradeStore {
    trades: Mutex<Vec<Trade>>,
    next_id: AtomicI64,
    credits: Mutex<Vec<(UserId, Decimal)>>,
}

impl MemTradeStore {
    fn all(&self) -> Vec<Trade> {
        self.trades.lock().unwrap().clone()
    }

    fn credits(&self) -> Vec<(UserId, Decimal)> {
        self.credits.lock().unwrap().clone()
    }

    fn insert(&self, t: &NewTrade) -> Trade {
        let id = TradeId(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        let trade = Trade {
            id,
            owner: t.owner,
            group_id: t.group_id,
            symbol: t.symbol.clone(),
            side: t.side,
            size: t.size,
            entry_price: t.entry_price,
            close_price: None,
            profit: Decimal::ZERO,
            opened_at: t.opened_at,
            closed_at: None,
        };
        self.trades.lock().unwrap().push(trade.clone());
        trade
    }
}

#[async_trait]
impl TradeStore for MemTradeStore {
    async fn find_open(
        &self,
        group_id: GroupId,
        symbol: &str,
    ) -> Result<Option<Trade>, TradeError> {
        Ok(self
            .trades
            .lock()
            .unwrap()
            .iter()
            .find(|t| t.group_id == group_id && t.symbol == symbol && t.is_open())
            .cloned())
    }

    async fn open_positions(
        &self,
        parent: NewTrade,
        children: Vec<NewTrade>,
    ) -> Result<Option<Vec<Trade>>, TradeError> {
        {
            let trades = self.trades.lock().unwrap();
            if trades
                .iter()
                .any(|t| t.group_id == parent.group_id && t.symbol == parent.symbol && t.is_open())
            {
                return Ok(None);
            }
        }
        let mut created = vec![self.insert(&parent)];
        for child in &children {
            created.push(self.insert(child));
        }
        Ok(Some(created))
    }

    async fn open_parents(
        &self,
        group_id: GroupId,
        symbol: Option<&str>,
    ) -> Result<Vec<Trade>, TradeError> {
        Ok(self
            .trades
            .lock()
            .unwrap()
            .iter()
            .filter(|t| {
                t.owner.is_parent()
                    && t.group_id == group_id
                    && t.is_open()
                    && symbol.is_none_or(|s| t.symbol == s)
            })
            .cloned()
            .collect())
    }

    async fn open_children(
        &self,
        group_id: GroupId,
        symbol: &str,
    ) -> Result<Vec<Trade>, TradeError> {
        Ok(self
            .trades
            .lock()
            .unwrap()
            .iter()
            .filter(|t| !t.owner.is_parent() && t.group_id == group_id && t.symbol == symbol && t.is_open())
            .cloned()
            .collect())
    }

    async fn open_by_user(
        &self,
        user_id: UserId,
        symbol: Option<&str>,
    ) -> Result<Vec<Trade>, TradeError> {
        Ok(self
            .trades
            .lock()
            .unwrap()
            .iter()
            .filter(|t| {
                t.owner.member_id() == Some(user_id)
                    && t.is_open()
                    && symbol.is_none_or(|s| t.symbol == s)
            })
            .cloned()
            .collect())
    }

    async fn settle_batch(
        &self,
        closes: Vec<TradeClose>,
        closed_at: chrono::DateTime<Utc>,
    ) -> Result<usize, TradeError> {
        // 先在副本上整批执行，全部成功才落地——模拟事务回滚语义
        let mut trades = self.trades.lock().unwrap();
        let mut staged = trades.clone();
        let mut staged_credits = Vec::new();

        for close in &closes {
            let trade = staged
                .iter_mut()
                .find(|t| t.id == close.trade_id)
                .ok_or_else(|| TradeError::Storage(format!("missing trade {}", close.trade_id)))?;
            if !trade.is_open() {
                return Err(TradeError::AlreadyClosed { id: close.trade_id });
            }
            trade.close_price = Some(close.close_price);
            trade.profit = close.profit;
            trade.closed_at = Some(closed_at);

            if let Some(user_id) = close.owner.member_id() {
                staged_credits.push((user_id, close.profit));
            }
        }

        *trades = staged;
        self.credits.lock().unwrap().extend(staged_credits);
        Ok(closes.len())
    }
}

struct MemGroups {
    members: Vec<GroupMember>,
}

#[async_trait]
impl GroupDirectory for MemGroups {
    async fn members_with_capital(
        &self,
        _group_id: GroupId,
    ) -> Result<Vec<GroupMember>, TradeError> {
        Ok(self.members.clone())
    }
    async fn load_configs(
        &self,
    ) -> Result<Vec<(GroupId, HashMap<String, AutoTradeConfig>)>, TradeError> {
        Ok(vec![])
    }
    async fn save_config(
        &self,
        _group_id: GroupId,
        _config: &HashMap<String, AutoTradeConfig>,
    ) -> Result<(), TradeError> {
        Ok(())
    }
}

struct FixedPrice {
    open_price: Decimal,
    close_price: Decimal,
    fail: bool,
    calls: AtomicUsize,
}

impl FixedPrice {
    fn new(open_price: Decimal, close_price: Decimal) -> Self {
        Self {
            open_price,
            close_price,
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    fn failing() -> Self {
        Self {
            open_price: Decimal::ZERO,
            close_price: Decimal::ZERO,
            fail: true,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl PriceSource for FixedPrice {
    async fn price(&self, symbol: &str) -> Result<Decimal, PriceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(PriceError::Unreachable(format!("timeout fetching {}", symbol)));
        }
        Ok(self.open_price)
    }
    async fn settlement_price(&self, symbol: &str, _side: Side) -> Result<Decimal, PriceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(PriceError::Unreachable(format!("timeout fetching {}", symbol)));
        }
        Ok(self.close_price)
    }
}

fn clock() -> Arc<FakeClockProvider> {
    let t0 = Utc.with_ymd_and_hms(2024, 6, 3, 1, 0, 0).single().unwrap();
    Arc::new(FakeClockProvider::new(t0))
}

fn config(direction: Side, size: Decimal, status: AutoTradeStatus) -> AutoTradeConfig {
    AutoTradeConfig {
        direction,
        size,
        status,
    }
}

fn members(caps: &[(i64, Decimal)]) -> Vec<GroupMember> {
    caps.iter()
        .map(|(id, cap)| GroupMember {
            user_id: UserId(*id),
            balance_total: *cap,
        })
        .collect()
}

#[tokio::test]
async fn allocator_replicates_by_capital_weight() {
    let store = Arc::new(MemTradeStore::default());
    let groups = Arc::new(MemGroups {
        members: members(&[(1, dec!(100)), (2, dec!(300)), (3, dec!(600))]),
    });
    let prices = Arc::new(FixedPrice::new(dec!(70000), dec!(0)));
    let clock = clock();
    let allocator = CopyTradeAllocator::new(store.clone(), groups, prices, clock.clone());

    let outcome = allocator
        .run(GroupId(1), "BTCUSDT", &config(Side::Buy, dec!(1.0), AutoTradeStatus::Active))
        .await
        .unwrap();

    match outcome {
        AllocationOutcome::Opened {
            children,
            replication_skipped,
            ..
        } => {
            assert_eq!(children, 3);
            assert!(!replication_skipped);
        }
        other => panic!("expected Opened, got {:?}", other),
    }

    let trades = store.all();
    assert_eq!(trades.len(), 4);

    let parent = &trades[0];
    assert!(parent.owner.is_parent());
    assert_eq!(parent.size, dec!(1.0));
    assert_eq!(parent.entry_price, dec!(70000));

    // 子仓手数按资金权重量化；入场价与建仓时间与父仓一致
    let mut lots: Vec<(UserId, Decimal)> = trades[1..]
        .iter()
        .map(|t| (t.owner.member_id().unwrap(), t.size))
        .collect();
    lots.sort();
    assert_eq!(
        lots,
        vec![
            (UserId(1), dec!(0.10)),
            (UserId(2), dec!(0.30)),
            (UserId(3), dec!(0.60)),
        ]
    );
    for child in &trades[1..] {
        assert_eq!(child.entry_price, parent.entry_price);
        assert_eq!(child.opened_at, parent.opened_at);
        assert_eq!(child.opened_at, clock.now());
    }
}

#[tokio::test]
async fn rerun_on_open_position_creates_no_rows() {
    let store = Arc::new(MemTradeStore::default());
    let groups = Arc::new(MemGroups {
        members: members(&[(1, dec!(500))]),
    });
    let prices = Arc::new(FixedPrice::new(dec!(3200), dec!(0)));
    let allocator = CopyTradeAllocator::new(store.clone(), groups, prices, clock());
    let conf = config(Side::Sell, dec!(0.2), AutoTradeStatus::Active);

    let first = allocator.run(GroupId(9), "ETHUSDT", &conf).await.unwrap();
    assert!(matches!(first, AllocationOutcome::Opened { .. }));
    let count_after_first = store.all().len();

    let second = allocator.run(GroupId(9), "ETHUSDT", &conf).await.unwrap();
    assert_eq!(second, AllocationOutcome::SkippedOpenPosition);
    assert_eq!(store.all().len(), count_after_first);
}

#[tokio::test]
async fn stopped_config_never_touches_feed_or_store() {
    let store = Arc::new(MemTradeStore::default());
    let groups = Arc::new(MemGroups {
        members: members(&[(1, dec!(500))]),
    });
    let prices = Arc::new(FixedPrice::new(dec!(150), dec!(0)));
    let allocator = CopyTradeAllocator::new(store.clone(), groups, prices.clone(), clock());

    let outcome = allocator
        .run(GroupId(2), "SOLUSDT", &config(Side::Buy, dec!(1), AutoTradeStatus::Stopped))
        .await
        .unwrap();

    assert_eq!(outcome, AllocationOutcome::SkippedStopped);
    assert!(store.all().is_empty());
    assert_eq!(prices.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn zero_capital_opens_parent_without_children() {
    let store = Arc::new(MemTradeStore::default());
    let groups = Arc::new(MemGroups {
        members: members(&[(1, dec!(0)), (2, dec!(0))]),
    });
    let prices = Arc::new(FixedPrice::new(dec!(600), dec!(0)));
    let allocator = CopyTradeAllocator::new(store.clone(), groups, prices, clock());

    let outcome = allocator
        .run(GroupId(3), "BNBUSDT", &config(Side::Sell, dec!(0.5), AutoTradeStatus::Active))
        .await
        .unwrap();

    match outcome {
        AllocationOutcome::Opened {
            children,
            replication_skipped,
            ..
        } => {
            assert_eq!(children, 0);
            assert!(replication_skipped);
        }
        other => panic!("expected parent-only open, got {:?}", other),
    }
    assert_eq!(store.all().len(), 1);
}

#[tokio::test]
async fn tiny_capital_member_gets_minimum_lot() {
    let store = Arc::new(MemTradeStore::default());
    let groups = Arc::new(MemGroups {
        members: members(&[(1, dec!(1)), (2, dec!(9999))]),
    });
    let prices = Arc::new(FixedPrice::new(dec!(70000), dec!(0)));
    let allocator = CopyTradeAllocator::new(store.clone(), groups, prices, clock());

    allocator
        .run(GroupId(4), "BTCUSDT", &config(Side::Buy, dec!(1.0), AutoTradeStatus::Active))
        .await
        .unwrap();

    let small = store
        .all()
        .into_iter()
        .find(|t| t.owner.member_id() == Some(UserId(1)))
        .unwrap();
    assert_eq!(small.size, dec!(0.01));
}

#[tokio::test]
async fn price_failure_aborts_before_any_write() {
    let store = Arc::new(MemTradeStore::default());
    let groups = Arc::new(MemGroups {
        members: members(&[(1, dec!(100))]),
    });
    let prices = Arc::new(FixedPrice::failing());
    let allocator = CopyTradeAllocator::new(store.clone(), groups, prices, clock());

    let res = allocator
        .run(GroupId(5), "BTCUSDT", &config(Side::Buy, dec!(1), AutoTradeStatus::Active))
        .await;

    assert!(matches!(res, Err(TradeError::Price(PriceError::Unreachable(_)))));
    assert!(store.all().is_empty());
}

#[tokio::test]
async fn settlement_credits_members_and_skips_parent() {
    let store = Arc::new(MemTradeStore::default());
    let groups = Arc::new(MemGroups {
        members: members(&[(1, dec!(100)), (2, dec!(300)), (3, dec!(600))]),
    });
    let open_prices = Arc::new(FixedPrice::new(dec!(70000), dec!(0)));
    let clock = clock();
    let allocator = CopyTradeAllocator::new(store.clone(), groups, open_prices, clock.clone());
    allocator
        .run(GroupId(1), "BTCUSDT", &config(Side::Buy, dec!(1.0), AutoTradeStatus::Active))
        .await
        .unwrap();

    // 上涨 1000 平仓：子仓盈利 = 1000 * 手数
    let close_prices = Arc::new(FixedPrice::new(dec!(0), dec!(71000)));
    let settlement = PositionSettlement::new(store.clone(), close_prices, clock.clone());
    let closed = settlement.close_group(GroupId(1), Some("BTCUSDT")).await.unwrap();
    assert_eq!(closed, 4);

    assert!(store.all().iter().all(|t| !t.is_open()));
    let mut credits = store.credits();
    credits.sort();
    assert_eq!(
        credits,
        vec![
            (UserId(1), dec!(100)),  // 0.10 * 1000
            (UserId(2), dec!(300)),  // 0.30 * 1000
            (UserId(3), dec!(600)),  // 0.60 * 1000
        ]
    );

    // 平仓后去重闸门放开，可再次建仓
    let reopen_prices = Arc::new(FixedPrice::new(dec!(70500), dec!(0)));
    let groups = Arc::new(MemGroups {
        members: members(&[(1, dec!(200))]),
    });
    let allocator = CopyTradeAllocator::new(store.clone(), groups, reopen_prices, clock);
    let outcome = allocator
        .run(GroupId(1), "BTCUSDT", &config(Side::Buy, dec!(1.0), AutoTradeStatus::Active))
        .await
        .unwrap();
    assert!(matches!(outcome, AllocationOutcome::Opened { .. }));
}

#[tokio::test]
async fn losing_sell_settlement_produces_negative_credit() {
    let store = Arc::new(MemTradeStore::default());
    let groups = Arc::new(MemGroups {
        members: members(&[(8, dec!(1000))]),
    });
    let open_prices = Arc::new(FixedPrice::new(dec!(100), dec!(0)));
    let clock = clock();
    let allocator = CopyTradeAllocator::new(store.clone(), groups, open_prices, clock.clone());
    allocator
        .run(GroupId(6), "XRPUSDT", &config(Side::Sell, dec!(2.0), AutoTradeStatus::Active))
        .await
        .unwrap();

    // SELL 持仓在价格上行时亏损：(100 - 110) * 2.0 = -20
    let close_prices = Arc::new(FixedPrice::new(dec!(0), dec!(110)));
    let settlement = PositionSettlement::new(store.clone(), close_prices, clock);
    settlement.close_group(GroupId(6), None).await.unwrap();

    assert_eq!(store.credits(), vec![(UserId(8), dec!(-20))]);
}

#[tokio::test]
async fn settlement_price_failure_leaves_positions_open() {
    let store = Arc::new(MemTradeStore::default());
    let groups = Arc::new(MemGroups {
        members: members(&[(1, dec!(100))]),
    });
    let clock = clock();
    let allocator = CopyTradeAllocator::new(
        store.clone(),
        groups,
        Arc::new(FixedPrice::new(dec!(100), dec!(0))),
        clock.clone(),
    );
    allocator
        .run(GroupId(7), "ADAUSDT", &config(Side::Buy, dec!(1), AutoTradeStatus::Active))
        .await
        .unwrap();

    let settlement = PositionSettlement::new(store.clone(), Arc::new(FixedPrice::failing()), clock);
    let res = settlement.close_group(GroupId(7), None).await;

    assert!(matches!(res, Err(TradeError::Price(_))));
    assert!(store.all().iter().all(|t| t.is_open()));
    assert!(store.credits().is_empty());
}

#[tokio::test]
async fn close_user_settles_all_open_positions_in_one_batch() {
    let store = Arc::new(MemTradeStore::default());
    let clock = clock();

    // 同一用户在两个分组各有一笔子仓
    for (group, symbol, entry) in [(11, "BTCUSDT", dec!(100)), (12, "ETHUSDT", dec!(50))] {
        let groups = Arc::new(MemGroups {
            members: members(&[(42, dec!(1000))]),
        });
        let allocator = CopyTradeAllocator::new(
            store.clone(),
            groups,
            Arc::new(FixedPrice::new(entry, dec!(0))),
            clock.clone(),
        );
        allocator
            .run(GroupId(group), symbol, &config(Side::Buy, dec!(1), AutoTradeStatus::Active))
            .await
            .unwrap();
    }

    let settlement =
        PositionSettlement::new(store.clone(), Arc::new(FixedPrice::new(dec!(0), dec!(120))), clock);
    let closed = settlement.close_user(UserId(42), None).await.unwrap();

    // 只有该用户的两笔子仓被平，父仓不在 close_user 的范围内
    assert_eq!(closed, 2);
    let open_left: Vec<_> = store.all().into_iter().filter(|t| t.is_open()).collect();
    assert_eq!(open_left.len(), 2);
    assert!(open_left.iter().all(|t| t.owner.is_parent()));
    assert_eq!(store.credits().len(), 2);
}
