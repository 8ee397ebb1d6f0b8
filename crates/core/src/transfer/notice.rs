use super::entity::DepositAddress;

/// # Summary
/// 待投递的用户通知。主题与正文在资金事务内定稿（outbox 模式），
/// 投递本身由 relay 异步尽力完成，失败只记录重试，绝不回滚资金变动。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub subject: String,
    pub body: String,
}

/// 入金申请受理通知。
pub fn deposit_requested() -> Notice {
    Notice {
        subject: "入金申請ありがとうございます".to_string(),
        body: "入金申請を受け付けました。\n着金確認後、取引口座へ反映されます。".to_string(),
    }
}

/// 入金完成（余额已入账）通知。
pub fn deposit_completed() -> Notice {
    Notice {
        subject: "入金完了のお知らせ".to_string(),
        body: "入金の確認が取れました。\n取引口座へ残高を反映しました。".to_string(),
    }
}

/// CRYPTO 入金专用地址分配通知。地址只在分配事务内可知，
/// 因此模板函数由存储层在同一事务中调用。
pub fn deposit_address_assigned(addr: &DepositAddress) -> Notice {
    let memo_line = match &addr.memo_tag {
        Some(tag) => format!("MEMO / TAG：{}\n", tag),
        None => String::new(),
    };
    Notice {
        subject: "入金用アドレスのご案内".to_string(),
        body: format!(
            "通貨：{}\nアドレス：\n{}\n{}\n※ このアドレスは今回の入金専用です。\n※ 着金確認後、残高へ反映されます。",
            addr.currency, addr.address, memo_line
        ),
    }
}

/// 出金申请受理通知。
pub fn withdraw_requested() -> Notice {
    Notice {
        subject: "出金申請を受け付けました".to_string(),
        body: "出金申請を受け付けました。\n処理を開始しましたので、完了まで今しばらくお待ちください。"
            .to_string(),
    }
}

/// 出金批准通知。
pub fn withdraw_approved() -> Notice {
    Notice {
        subject: "出金に関するご連絡".to_string(),
        body: "出金申請が承認されました。\n\n指定された出金先へ送金処理を進めております。\n反映まで今しばらくお待ちください。"
            .to_string(),
    }
}

/// 出金取消（要求重新 KYC）通知。
pub fn withdraw_canceled() -> Notice {
    Notice {
        subject: "出金に関するご連絡".to_string(),
        body: "出金申請の内容に確認事項があり、\n追加の本人確認が必要となりました。\n\nお手数ですが、\nKYC（本人確認）の再提出をお願いいたします。\n\n確認完了後、再度出金申請が可能になります。"
            .to_string(),
    }
}
