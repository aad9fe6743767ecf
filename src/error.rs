//! Error types for the Payslip Engine.
//!
//! Validation failures are caller-correctable and carry a message that
//! can be shown to the end user as is.  Failures of the persistence
//! collaborator are kept separate so a computed payslip or parsed
//! report is never confused with a failed hand-off.

use thiserror::Error;

/// Input problems the submitter can fix.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("作業明細を入力してください")]
    NoWorkDetail,
    #[error("その他控除の項目名を入力してください")]
    MissingOtherDeductionName,
    #[error("{field} に負の金額は指定できません")]
    NegativeAmount { field: String },
    #[error("{field} の金額が大きすぎます")]
    AmountOutOfRange { field: String },
    #[error("配送タイプが見つかりません: {0}")]
    UnknownDeliveryType(String),
    #[error("ドライバーのメールアドレスが登録されていません")]
    MissingDriverEmail,
}

/// Errors raised by the payslip calculator.
#[derive(Debug, Error)]
pub enum PayslipError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Errors raised by persistence collaborators.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("record not found: {0}")]
    NotFound(String),
}
