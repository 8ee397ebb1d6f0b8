use crate::common::UserId;
use async_trait::async_trait;
use thiserror::Error;

/// KYC 完成等级：只有该等级的用户允许发起出金。
pub const KYC_LEVEL_CLEARED: u8 = 5;
/// 出金被取消后强制回落的等级：要求补充验证后才能再次出金。
pub const KYC_LEVEL_REVERIFY: u8 = 4;

/// # Summary
/// KYC 门卫错误枚举。
#[derive(Error, Debug)]
pub enum KycError {
    #[error("Storage error: {0}")]
    Storage(String),
}

/// # Summary
/// KYC 门卫端口。本引擎只读写验证等级：
/// 出金申请前读取（必须等于 5），出金取消时强制写为 4。
/// 证件上传与人工审核流程在外部系统完成，不属于本引擎。
#[async_trait]
pub trait KycGate: Send + Sync {
    /// 用户当前验证等级（0..=5，从未提交过则为 0）。
    async fn status(&self, user_id: UserId) -> Result<u8, KycError>;

    /// 强制写入验证等级。
    async fn set_status(&self, user_id: UserId, status: u8) -> Result<(), KycError>;
}
