use chrono::{DateTime, Utc};
use mongodb::bson::{self, oid::ObjectId};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::datetime;

pub const WALLETS: &str = "wallets";
pub const TRANSACTIONS: &str = "wallet_transactions";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Wallet {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub teacher: ObjectId,
    pub balance: f64,
    pub total_earned: f64,
    pub total_withdrawn: f64,
    pub currency: String,
    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionType {
    Credit,
    Withdrawal,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Credit => "CREDIT",
            TransactionType::Withdrawal => "WITHDRAWAL",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Rejected,
    Cancelled,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "PENDING",
            TransactionStatus::Completed => "COMPLETED",
            TransactionStatus::Rejected => "REJECTED",
            TransactionStatus::Cancelled => "CANCELLED",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WithdrawalMethod {
    BankTransfer,
    MobileBanking,
    Paypal,
    Other,
}

impl WithdrawalMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            WithdrawalMethod::BankTransfer => "BANK_TRANSFER",
            WithdrawalMethod::MobileBanking => "MOBILE_BANKING",
            WithdrawalMethod::Paypal => "PAYPAL",
            WithdrawalMethod::Other => "OTHER",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletTransaction {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub wallet: ObjectId,
    pub teacher: ObjectId,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    pub amount: f64,
    pub commission: f64,
    pub net_amount: f64,
    pub status: TransactionStatus,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment: Option<ObjectId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub booking: Option<ObjectId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub withdrawal_method: Option<WithdrawalMethod>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub withdrawal_details: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_by: Option<ObjectId>,
    #[serde(default, with = "datetime::optional", skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,

    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawRequest {
    #[validate(range(min = 1.0, message = "Amount must be a positive number"))]
    pub amount: f64,
    pub withdrawal_method: WithdrawalMethod,
    pub withdrawal_details: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RejectWithdrawal {
    #[validate(length(min = 1, max = 500, message = "Rejection reason is required"))]
    pub reason: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionQuery {
    #[serde(rename = "type")]
    pub kind: Option<TransactionType>,
    pub status: Option<TransactionStatus>,
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletResponse {
    pub id: String,
    pub balance: f64,
    pub total_earned: f64,
    pub total_withdrawn: f64,
    pub currency: String,
    pub pending_withdrawals: f64,
    pub available_for_withdrawal: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletTransactionResponse {
    pub id: String,
    pub wallet: String,
    pub teacher: String,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    pub amount: f64,
    pub commission: f64,
    pub net_amount: f64,
    pub status: TransactionStatus,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub booking: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub withdrawal_method: Option<WithdrawalMethod>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub withdrawal_details: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<WalletTransaction> for WalletTransactionResponse {
    fn from(tx: WalletTransaction) -> Self {
        WalletTransactionResponse {
            id: tx.id.to_hex(),
            wallet: tx.wallet.to_hex(),
            teacher: tx.teacher.to_hex(),
            kind: tx.kind,
            amount: tx.amount,
            commission: tx.commission,
            net_amount: tx.net_amount,
            status: tx.status,
            description: tx.description,
            payment: tx.payment.map(|id| id.to_hex()),
            booking: tx.booking.map(|id| id.to_hex()),
            withdrawal_method: tx.withdrawal_method,
            withdrawal_details: tx.withdrawal_details,
            processed_by: tx.processed_by.map(|id| id.to_hex()),
            processed_at: tx.processed_at,
            rejection_reason: tx.rejection_reason,
            created_at: tx.created_at,
        }
    }
}
