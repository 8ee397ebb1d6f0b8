use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use daicho_copytrade::allocator::CopyTradeAllocator;
use daicho_copytrade::settlement::PositionSettlement;
use daicho_core::common::time::RealTimeProvider;
use daicho_core::config::AppConfig;
use daicho_core::notify::port::Notifier;
use daicho_feed::binance::BinanceFeed;
use daicho_notify::log::LogNotifier;
use daicho_notify::relay::OutboxRelay;
use daicho_notify::telegram::TelegramNotifier;
use daicho_store::autotrade::SqliteGroupDirectory;
use daicho_store::kyc::SqliteKycGate;
use daicho_store::outbox::SqliteOutbox;
use daicho_store::trade::SqliteTradeStore;
use daicho_store::transfer::SqliteTransferStore;
use daicho_store::user::SqliteUserRegistry;
use daicho_store::wallet::SqliteWalletLedger;
use daicho_transfer::service::TransferService;
use tracing::{info, warn};
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// # Summary
/// 应用启动入口，纯粹的 DI 容器。
/// 负责实例化所有具体实现组件并通过 `Arc<dyn Trait>` 注入到各服务，
/// 再挂起自动跟单调度循环与通知 relay 循环。
///
/// # Logic
/// 1. 初始化全局日志（env-filter + 按日滚动文件）。
/// 2. 读取配置（`config/daicho.toml`，可被 `DAICHO__*` 环境变量覆盖）。
/// 3. 打开中心库并实例化存储层。
/// 4. 构造服务层（出入金状态机、跟单配分、持仓结算）。
/// 5. 挂起调度循环，等待外部信号退出。
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. 日志：控制台 + 按日滚动文件
    let file_appender = tracing_appender::rolling::daily("logs", "daicho.log");
    let (file_writer, _guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stdout.and(file_writer))
        .init();
    info!("Daicho back office starting...");

    // 2. 配置
    let app_config = load_config();

    // 3. 基础设施层
    daicho_store::config::set_root_dir(PathBuf::from(&app_config.database.data_dir));
    let pool = daicho_store::db::open().await?;

    let wallet = SqliteWalletLedger::new(pool.clone());
    let transfers = Arc::new(SqliteTransferStore::new(pool.clone(), wallet.clone()));
    let trades = Arc::new(SqliteTradeStore::new(pool.clone(), wallet.clone()));
    let groups = Arc::new(SqliteGroupDirectory::new(pool.clone()));
    let kyc = Arc::new(SqliteKycGate::new(pool.clone()));
    let outbox = Arc::new(SqliteOutbox::new(pool.clone()));
    let feed = Arc::new(BinanceFeed::new(&app_config.feed)?);
    let clock = Arc::new(RealTimeProvider);

    // 4. 服务层（外层接入例如管理端网关时从这里拿句柄）
    let _registry = Arc::new(SqliteUserRegistry::new(pool.clone(), wallet.clone()));
    let _transfer_service = Arc::new(TransferService::new(
        transfers,
        Arc::new(wallet.clone()),
        kyc,
    ));
    let allocator = Arc::new(CopyTradeAllocator::new(
        trades.clone(),
        groups,
        feed.clone(),
        clock.clone(),
    ));
    let _settlement = Arc::new(PositionSettlement::new(trades, feed, clock));

    let notifier: Arc<dyn Notifier> = match (
        app_config.notify.telegram_bot_token.clone(),
        app_config.notify.telegram_chat_id.clone(),
    ) {
        (Some(token), Some(chat_id)) => Arc::new(TelegramNotifier::new(token, chat_id)),
        _ => {
            warn!("Telegram is not configured, notifications fall back to the log channel");
            Arc::new(LogNotifier)
        }
    };
    let relay = OutboxRelay::new(outbox, notifier);

    // 5. 调度循环：自动跟单扫描
    let autotrade_interval = Duration::from_secs(app_config.scheduler.autotrade_interval_secs);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(autotrade_interval);
        loop {
            ticker.tick().await;
            if let Err(e) = allocator.run_cycle().await {
                warn!(error = %e, "Auto-trade cycle failed");
            }
        }
    });

    // 6. 调度循环：outbox 投递
    let outbox_interval = Duration::from_secs(app_config.scheduler.outbox_interval_secs);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(outbox_interval);
        loop {
            ticker.tick().await;
            if let Err(e) = relay.run_once().await {
                warn!(error = %e, "Outbox relay pass failed");
            }
        }
    });

    info!("Schedulers running. Waiting for signals...");
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received. Exiting...");

    Ok(())
}

/// 读取应用配置：`config/daicho.toml`（可缺省）+ `DAICHO__` 前缀环境变量，
/// 解析失败时回落到内置默认值。
fn load_config() -> AppConfig {
    let loaded = config::Config::builder()
        .add_source(config::File::with_name("config/daicho").required(false))
        .add_source(config::Environment::with_prefix("DAICHO").separator("__"))
        .build()
        .and_then(|c| c.try_deserialize::<AppConfig>());

    match loaded {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!(error = %e, "Config not usable, falling back to defaults");
            AppConfig::default()
        }
    }
}
