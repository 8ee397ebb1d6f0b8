use daicho_core::transfer::entity::{Currency, TransferMethod, TransferStatus};
use daicho_core::transfer::port::{AddressPool, NewDeposit, TransferError, TransferStore};
use daicho_store::address::SqliteAddressPool;
use daicho_store::transfer::SqliteTransferStore;
use daicho_store::user::SqliteUserRegistry;
use daicho_store::wallet::SqliteWalletLedger;
use daicho_core::ledger::port::UserRegistry;
use rust_decimal_macros::dec;
use std::sync::Arc;

// 每个用例独立的临时库：地址池状态不跨用例泄漏
async fn setup() -> (tempfile::TempDir, sqlx::SqlitePool, SqliteWalletLedger) {
    let dir = tempfile::tempdir().expect("tempdir");
    let pool = daicho_store::db::open_in(dir.path()).await.expect("open db");
    let wallet = SqliteWalletLedger::new(pool.clone());
    (dir, pool, wallet)
}

#[tokio::test]
async fn concurrent_allocation_assigns_each_address_once() {
    let (_dir, pool, wallet) = setup().await;
    let registry = SqliteUserRegistry::new(pool.clone(), wallet.clone());
    let addresses = SqliteAddressPool::new(pool.clone());
    let transfers = Arc::new(SqliteTransferStore::new(pool.clone(), wallet));

    // 池中 3 条 BTC 地址，8 个并发批准争抢
    for i in 0..3 {
        addresses
            .add_address(Currency::Btc, &format!("bc1q_race_{}", i), None)
            .await
            .expect("seed address");
    }
    assert_eq!(addresses.available_count(Currency::Btc).await.expect("count"), 3);

    let mut deposit_ids = Vec::new();
    for i in 0..8 {
        let uid = registry
            .register(&format!("racer_{}", i), None)
            .await
            .expect("register");
        let dep = transfers
            .create_deposit(NewDeposit {
                user_id: uid,
                method: TransferMethod::Crypto,
                currency: Some(Currency::Btc),
                amount: dec!(10000),
                crypto_amount: Some(dec!(0.1)),
                request_key: None,
            })
            .await
            .expect("create deposit");
        deposit_ids.push(dep.id);
    }

    let mut handles = Vec::new();
    for id in deposit_ids.clone() {
        let store = transfers.clone();
        handles.push(tokio::spawn(async move { store.approve_deposit(id).await }));
    }

    let mut confirmed = 0;
    let mut exhausted = 0;
    for h in handles {
        match h.await.expect("join") {
            Ok(t) => {
                assert_eq!(t.status, TransferStatus::Confirming);
                confirmed += 1;
            }
            Err(TransferError::AddressPoolExhausted(Currency::Btc)) => exhausted += 1,
            Err(e) => panic!("unexpected error: {:?}", e),
        }
    }

    // 恰好 M 条成功、N - M 条池耗尽
    assert_eq!(confirmed, 3);
    assert_eq!(exhausted, 5);
    assert_eq!(addresses.available_count(Currency::Btc).await.expect("count"), 0);

    // 没有任何地址被双重分配：3 条地址分给 3 个不同用户
    let assignees: Vec<(i64,)> = sqlx::query_as(
        "SELECT DISTINCT user_id FROM deposit_addresses \
         WHERE currency = 'BTC' AND address LIKE 'bc1q_race_%' AND used = 1",
    )
    .fetch_all(&pool)
    .await
    .expect("query");
    assert_eq!(assignees.len(), 3);

    // 失败的批准没有留下任何状态变化
    let mut still_pending = 0;
    for id in deposit_ids {
        let t = transfers.get(id).await.expect("get");
        match t.status {
            TransferStatus::Confirming => {}
            TransferStatus::Pending => still_pending += 1,
            other => panic!("unexpected status {:?}", other),
        }
    }
    assert_eq!(still_pending, 5);
}

#[tokio::test]
async fn duplicate_address_registration_is_rejected() {
    let (_dir, pool, _wallet) = setup().await;
    let addresses = SqliteAddressPool::new(pool);

    addresses
        .add_address(Currency::Eth, "0x_dup_addr", None)
        .await
        .expect("first insert");
    let res = addresses.add_address(Currency::Eth, "0x_dup_addr", None).await;
    assert!(matches!(res, Err(TransferError::Validation(_))));
}

#[tokio::test]
async fn allocation_prefers_oldest_address() {
    let (_dir, pool, wallet) = setup().await;
    let registry = SqliteUserRegistry::new(pool.clone(), wallet.clone());
    let addresses = SqliteAddressPool::new(pool.clone());
    let transfers = SqliteTransferStore::new(pool.clone(), wallet);

    addresses
        .add_address(Currency::Eth, "0x_fifo_first", None)
        .await
        .expect("seed");
    addresses
        .add_address(Currency::Eth, "0x_fifo_second", None)
        .await
        .expect("seed");

    let uid = registry.register("fifo", None).await.expect("register");
    let dep = transfers
        .create_deposit(NewDeposit {
            user_id: uid,
            method: TransferMethod::Crypto,
            currency: Some(Currency::Eth),
            amount: dec!(100),
            crypto_amount: Some(dec!(0.01)),
            request_key: None,
        })
        .await
        .expect("create");
    transfers.approve_deposit(dep.id).await.expect("approve");

    // 最老的地址先被分配
    assert_eq!(
        daicho_store::address::assigned_user(&pool, Currency::Eth, "0x_fifo_first")
            .await
            .expect("q"),
        Some(uid)
    );
    assert_eq!(
        daicho_store::address::assigned_user(&pool, Currency::Eth, "0x_fifo_second")
            .await
            .expect("q"),
        None
    );
}
