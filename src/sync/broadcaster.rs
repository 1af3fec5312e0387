//! 状態変更のブロードキャストシステム
//!
//! 同期ループで発生した変更を、描画側などのサブスクライバーに
//! プッシュ型で通知する。

use tokio::sync::broadcast;

use crate::dashboard::SyncStatus;

/// 状態変更イベント
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DashboardEvent {
    /// Dataset が差し替えられた（チャート再構築が必要）
    DataChanged {
        /// 新しいレコード数
        records: usize,
    },

    /// 同期ステータスが変更された
    StatusChanged(SyncStatus),

    /// サマリー表が読み込まれた
    SummaryLoaded {
        rows: usize,
    },
}

/// 状態変更のブロードキャスター
///
/// バッファサイズは64。遅いサブスクライバーは古いイベントを取りこぼす
/// （`RecvError::Lagged`）が、送信側はブロックしない。
#[derive(Debug, Clone)]
pub struct StateBroadcaster {
    sender: broadcast::Sender<DashboardEvent>,
}

impl Default for StateBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl StateBroadcaster {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(64);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DashboardEvent> {
        self.sender.subscribe()
    }

    /// イベントを送信（サブスクライバーがいなくてもエラーにしない）
    pub fn broadcast(&self, event: DashboardEvent) {
        if self.sender.send(event).is_err() {
            tracing::trace!("No subscribers for dashboard event");
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
