use async_trait::async_trait;
use chrono::Utc;
use daicho_core::common::{GroupId, UserId};
use daicho_core::trade::entity::{AutoTradeConfig, GroupMember};
use daicho_core::trade::port::{GroupDirectory, TradeError};
use rust_decimal::Decimal;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::str::FromStr;

/// # Summary
/// 分组目录的 SQLite 实现：成员资金权重与分组级自动跟单配置。
/// 配置以 JSON（symbol → {direction, size, status}）落库，
/// 运营端整体覆盖写入。
pub struct SqliteGroupDirectory {
    pool: SqlitePool,
}

impl SqliteGroupDirectory {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl GroupDirectory for SqliteGroupDirectory {
    async fn members_with_capital(
        &self,
        group_id: GroupId,
    ) -> Result<Vec<GroupMember>, TradeError> {
        let rows: Vec<(i64, String)> = sqlx::query_as(
            "SELECT u.id, w.balance_total FROM users u \
             JOIN wallets w ON w.user_id = u.id \
             WHERE u.group_id = ? ORDER BY u.id ASC",
        )
        .bind(group_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| TradeError::Storage(e.to_string()))?;

        rows.into_iter()
            .map(|(id, balance)| {
                Ok(GroupMember {
                    user_id: UserId(id),
                    balance_total: Decimal::from_str(&balance).map_err(|e| {
                        TradeError::Storage(format!("corrupt balance '{}': {}", balance, e))
                    })?,
                })
            })
            .collect()
    }

    async fn load_configs(
        &self,
    ) -> Result<Vec<(GroupId, HashMap<String, AutoTradeConfig>)>, TradeError> {
        let rows: Vec<(i64, String)> =
            sqlx::query_as("SELECT group_id, params FROM autotrade_configs ORDER BY group_id ASC")
                .fetch_all(&self.pool)
                .await
                .map_err(|e| TradeError::Storage(e.to_string()))?;

        rows.into_iter()
            .map(|(group_id, params)| {
                let config: HashMap<String, AutoTradeConfig> = serde_json::from_str(&params)
                    .map_err(|e| {
                        TradeError::Storage(format!(
                            "bad autotrade config for group {}: {}",
                            group_id, e
                        ))
                    })?;
                Ok((GroupId(group_id), config))
            })
            .collect()
    }

    async fn save_config(
        &self,
        group_id: GroupId,
        config: &HashMap<String, AutoTradeConfig>,
    ) -> Result<(), TradeError> {
        let params = serde_json::to_string(config)
            .map_err(|e| TradeError::Storage(format!("serialize autotrade config: {}", e)))?;

        sqlx::query(
            "INSERT INTO autotrade_configs (group_id, params, updated_at) VALUES (?, ?, ?) \
             ON CONFLICT (group_id) DO UPDATE SET params = excluded.params, updated_at = excluded.updated_at",
        )
        .bind(group_id.0)
        .bind(params)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| TradeError::Storage(e.to_string()))?;

        Ok(())
    }
}
