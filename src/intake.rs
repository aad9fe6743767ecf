//! Chat report intake.
//!
//! Handles one text message from a driver: finds the driver, answers
//! the `help` and `format` commands, interprets daily counts, records
//! the resulting report, and replies.  Recording and replying are two
//! separate steps.  A failed record is an error of the whole call; a
//! failed reply is only logged, since the report already exists.
//! [`ReportIntake::handle_messages`] processes a delivery of several
//! events, turning a failed event into [`IntakeOutcome::Failed`].

use crate::models::{DailyReport, Driver};
use crate::registry::{DeliveryTypeRegistry, DriverDirectory};
use crate::report::{self, ReportOutcome};
use crate::store::ReportStore;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Delivers reply text to the chat sender.
#[async_trait]
pub trait ReplySender: Send + Sync {
    async fn notify_sender(&self, reply_token: &str, text: &str) -> Result<()>;
}

/// Writes replies to the log instead of a messaging API.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingReplySender;

#[async_trait]
impl ReplySender for LoggingReplySender {
    async fn notify_sender(&self, reply_token: &str, text: &str) -> Result<()> {
        tracing::info!(reply_token, text, "reply (no messaging channel configured)");
        Ok(())
    }
}

/// One incoming chat message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncomingMessage {
    /// Channel-specific sender id (LINE user id).
    pub sender_id: String,
    pub reply_token: String,
    pub text: String,
    /// Date the message was received; the report is dated with it.
    pub received_on: NaiveDate,
}

/// What [`ReportIntake::handle_message`] did with a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IntakeOutcome {
    UnknownSender,
    Help,
    Format,
    NothingRecognized,
    NoMatches,
    Recorded {
        report_id: Uuid,
        /// Some labels in the message were not recognised.
        partial: bool,
    },
    /// The report could not be recorded.
    Failed { error: String },
}

/// Commands answered without interpreting the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Help,
    Format,
}

impl Command {
    fn parse(text: &str) -> Option<Command> {
        match text {
            "ヘルプ" | "help" | "？" => Some(Command::Help),
            "フォーマット" | "format" => Some(Command::Format),
            _ => None,
        }
    }
}

/// The chat intake flow with its collaborators.
pub struct ReportIntake<'a> {
    pub delivery_types: &'a DeliveryTypeRegistry,
    pub drivers: &'a DriverDirectory,
    pub store: &'a dyn ReportStore,
    pub replies: &'a dyn ReplySender,
    pub app_url: Option<&'a str>,
}

impl ReportIntake<'_> {
    /// Handles every message in order.  A failure is logged and
    /// reported for that message; the remaining messages still run.
    pub async fn handle_messages(&self, messages: &[IncomingMessage]) -> Vec<IntakeOutcome> {
        let mut outcomes = Vec::with_capacity(messages.len());
        for message in messages {
            let outcome = match self.handle_message(message).await {
                Ok(outcome) => outcome,
                Err(err) => {
                    tracing::error!(sender = %message.sender_id, error = %err, "failed to handle chat message");
                    IntakeOutcome::Failed {
                        error: err.to_string(),
                    }
                }
            };
            outcomes.push(outcome);
        }
        outcomes
    }

    pub async fn handle_message(&self, message: &IncomingMessage) -> Result<IntakeOutcome> {
        let Some(driver) = self.drivers.find_by_line_user_id(&message.sender_id) else {
            tracing::info!(sender = %message.sender_id, "message from unregistered sender");
            self.reply(message, &unregistered_driver_message(self.app_url))
                .await;
            return Ok(IntakeOutcome::UnknownSender);
        };

        match Command::parse(&message.text) {
            Some(Command::Help) => {
                self.reply(message, &help_message(self.app_url)).await;
                return Ok(IntakeOutcome::Help);
            }
            Some(Command::Format) => {
                self.reply(message, &format_message()).await;
                return Ok(IntakeOutcome::Format);
            }
            None => {}
        }

        match report::interpret(&message.text, self.delivery_types) {
            ReportOutcome::NothingRecognized => {
                self.reply(message, &report::nothing_recognized_message())
                    .await;
                Ok(IntakeOutcome::NothingRecognized)
            }
            ReportOutcome::NoMatches {
                unmatched_labels,
                known_types,
            } => {
                self.reply(
                    message,
                    &report::no_match_message(&unmatched_labels, &known_types),
                )
                .await;
                Ok(IntakeOutcome::NoMatches)
            }
            ReportOutcome::Accepted(accepted) => {
                let daily = accepted.to_daily_report(driver, message.received_on, Utc::now());
                let report_id = daily.id;
                self.record(driver, daily).await?;
                let text = report::confirmation_message(&accepted, &driver.name, message.received_on);
                self.reply(message, &text).await;
                Ok(IntakeOutcome::Recorded {
                    report_id,
                    partial: accepted.is_partial(),
                })
            }
        }
    }

    async fn record(&self, driver: &Driver, daily: DailyReport) -> Result<()> {
        let quantity = daily.total_quantity();
        let date = daily.date;
        self.store.record_report(daily).await?;
        tracing::info!(driver = %driver.name, %date, quantity, "daily report recorded");
        Ok(())
    }

    async fn reply(&self, message: &IncomingMessage, text: &str) {
        if let Err(err) = self.replies.notify_sender(&message.reply_token, text).await {
            tracing::warn!(sender = %message.sender_id, error = %err, "failed to deliver reply");
        }
    }
}

fn with_app_link(mut text: String, app_url: Option<&str>, heading: &str) -> String {
    if let Some(url) = app_url {
        text.push_str(&format!("\n\n{heading}\n{url}"));
    }
    text
}

pub fn unregistered_driver_message(app_url: Option<&str>) -> String {
    with_app_link(
        "❌ ドライバー登録が見つかりません。\n\nアプリから登録を完了し、LINE連携を設定してください。"
            .to_string(),
        app_url,
        "🔗 アプリはこちら",
    )
}

pub fn help_message(app_url: Option<&str>) -> String {
    let text = "📚 日報送信ガイド\n\n\
        【日報の送り方】\n配送タイプと個数を1行ずつ書いて送信してください。\n\n\
        例:\nヤマト30\n佐川20\nネコポス15\nメモ:順調でした\n\n\
        【書き方のコツ】\n• 配送タイプ名と個数を書く\n• 「:」や空白で区切ってもOK\n• メモは「メモ:」で始める\n\n\
        【コマンド】\n• ヘルプ - このメッセージ\n• フォーマット - 詳細な書き方";
    with_app_link(text.to_string(), app_url, "🔗 アプリはこちら")
}

pub fn format_message() -> String {
    "📝 日報フォーマット\n\n\
     【基本形式】\n配送タイプ名 個数\n配送タイプ名 個数\nメモ:任意のメモ\n\n\
     【書き方の例】\n✅ ヤマト30\n✅ ヤマト宅急便 30\n✅ ヤマト:30\n✅ ヤマト　30\n\n\
     【複数の配送タイプ】\nヤマト宅急便 30\n佐川急便 20\nネコポス 15\nメモ:午前中は雨でした\n\n\
     【注意】\n• 配送タイプ名は登録済みのものを使用\n• 個数は半角数字\n• 改行で複数の配送タイプを指定可能"
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::models::DeliveryType;
    use crate::store::MemoryStore;
    use anyhow::anyhow;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSender {
        sent: Mutex<Vec<(String, String)>>,
        fail: bool,
    }

    impl RecordingSender {
        fn failing() -> Self {
            Self {
                fail: true,
                ..Default::default()
            }
        }

        fn texts(&self) -> Vec<String> {
            self.sent.lock().unwrap().iter().map(|(_, t)| t.clone()).collect()
        }
    }

    #[async_trait]
    impl ReplySender for RecordingSender {
        async fn notify_sender(&self, reply_token: &str, text: &str) -> Result<()> {
            self.sent
                .lock()
                .unwrap()
                .push((reply_token.to_string(), text.to_string()));
            if self.fail {
                return Err(anyhow!("channel down"));
            }
            Ok(())
        }
    }

    struct BrokenStore;

    #[async_trait]
    impl ReportStore for BrokenStore {
        async fn record_report(&self, _report: DailyReport) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("disk full".into()))
        }
    }

    fn delivery_types() -> DeliveryTypeRegistry {
        DeliveryTypeRegistry::new(vec![DeliveryType {
            id: "t1".into(),
            name: "ヤマト".into(),
            unit_price: 160,
            active: true,
        }])
    }

    fn drivers() -> DriverDirectory {
        DriverDirectory::new(vec![Driver {
            id: "d1".into(),
            name: "山田太郎".into(),
            line_user_id: Some("U1".into()),
            ..Default::default()
        }])
    }

    fn message(sender_id: &str, text: &str) -> IncomingMessage {
        IncomingMessage {
            sender_id: sender_id.into(),
            reply_token: "token".into(),
            text: text.into(),
            received_on: NaiveDate::from_ymd_opt(2024, 5, 3).unwrap(),
        }
    }

    #[tokio::test]
    async fn mixed_message_records_matched_lines_only() {
        let types = delivery_types();
        let drivers = drivers();
        let store = MemoryStore::new();
        let sender = RecordingSender::default();
        let intake = ReportIntake {
            delivery_types: &types,
            drivers: &drivers,
            store: &store,
            replies: &sender,
            app_url: None,
        };

        let outcome = intake
            .handle_message(&message("U1", "ヤマト30\n存在しないタイプ20\nメモ:順調"))
            .await
            .unwrap();
        assert!(matches!(outcome, IntakeOutcome::Recorded { partial: true, .. }));

        let reports = store.reports_for_driver("d1").await;
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].work_details.len(), 1);
        assert_eq!(reports[0].work_details[0].quantity, 30);
        assert_eq!(reports[0].notes, "順調");
        assert_eq!(reports[0].date, NaiveDate::from_ymd_opt(2024, 5, 3).unwrap());

        let texts = sender.texts();
        assert_eq!(texts.len(), 1);
        assert!(texts[0].contains("• 存在しないタイプ"));
    }

    #[tokio::test]
    async fn reply_failure_keeps_the_report() {
        let types = delivery_types();
        let drivers = drivers();
        let store = MemoryStore::new();
        let sender = RecordingSender::failing();
        let intake = ReportIntake {
            delivery_types: &types,
            drivers: &drivers,
            store: &store,
            replies: &sender,
            app_url: None,
        };

        let outcome = intake.handle_message(&message("U1", "ヤマト12")).await.unwrap();
        assert!(matches!(outcome, IntakeOutcome::Recorded { partial: false, .. }));
        assert_eq!(store.reports_for_driver("d1").await.len(), 1);
    }

    #[tokio::test]
    async fn store_failure_is_propagated_without_confirmation() {
        let types = delivery_types();
        let drivers = drivers();
        let sender = RecordingSender::default();
        let intake = ReportIntake {
            delivery_types: &types,
            drivers: &drivers,
            store: &BrokenStore,
            replies: &sender,
            app_url: None,
        };

        let err = intake.handle_message(&message("U1", "ヤマト12")).await.unwrap_err();
        assert!(err.to_string().contains("disk full"));
        assert!(sender.texts().is_empty());
    }

    #[tokio::test]
    async fn failed_event_does_not_stop_later_events() {
        let types = delivery_types();
        let drivers = drivers();
        let sender = RecordingSender::default();
        let intake = ReportIntake {
            delivery_types: &types,
            drivers: &drivers,
            store: &BrokenStore,
            replies: &sender,
            app_url: None,
        };

        let outcomes = intake
            .handle_messages(&[message("U1", "ヤマト12"), message("U1", "ヘルプ")])
            .await;
        assert_eq!(outcomes.len(), 2);
        assert!(
            matches!(&outcomes[0], IntakeOutcome::Failed { error } if error.contains("disk full"))
        );
        assert_eq!(outcomes[1], IntakeOutcome::Help);
        assert_eq!(sender.texts().len(), 1);
        assert!(sender.texts()[0].starts_with("📚"));
    }

    #[tokio::test]
    async fn unknown_sender_gets_registration_guidance() {
        let types = delivery_types();
        let drivers = drivers();
        let store = MemoryStore::new();
        let sender = RecordingSender::default();
        let intake = ReportIntake {
            delivery_types: &types,
            drivers: &drivers,
            store: &store,
            replies: &sender,
            app_url: Some("https://example.com/driver"),
        };

        let outcome = intake.handle_message(&message("U999", "ヤマト30")).await.unwrap();
        assert_eq!(outcome, IntakeOutcome::UnknownSender);
        assert!(sender.texts()[0].contains("ドライバー登録が見つかりません"));
        assert!(sender.texts()[0].ends_with("https://example.com/driver"));
        assert!(store.reports_for_driver("d1").await.is_empty());
    }

    #[tokio::test]
    async fn commands_and_unrecognised_messages() {
        let types = delivery_types();
        let drivers = drivers();
        let store = MemoryStore::new();
        let sender = RecordingSender::default();
        let intake = ReportIntake {
            delivery_types: &types,
            drivers: &drivers,
            store: &store,
            replies: &sender,
            app_url: None,
        };

        let help = intake.handle_message(&message("U1", "ヘルプ")).await.unwrap();
        let format = intake.handle_message(&message("U1", "format")).await.unwrap();
        let nothing = intake.handle_message(&message("U1", "おつかれさまです")).await.unwrap();
        let no_match = intake.handle_message(&message("U1", "謎の便5")).await.unwrap();
        assert_eq!(
            vec![help, format, nothing, no_match],
            vec![
                IntakeOutcome::Help,
                IntakeOutcome::Format,
                IntakeOutcome::NothingRecognized,
                IntakeOutcome::NoMatches
            ]
        );

        let texts = sender.texts();
        assert!(texts[0].starts_with("📚"));
        assert!(texts[1].starts_with("📝 日報フォーマット"));
        assert!(texts[2].contains("認識できませんでした"));
        assert!(texts[3].contains("登録済みの配送タイプ:\n• ヤマト"));
        assert!(store.reports_for_driver("d1").await.is_empty());
    }
}
