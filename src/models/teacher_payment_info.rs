use chrono::{DateTime, Utc};
use mongodb::bson::{self, oid::ObjectId};
use serde::{Deserialize, Serialize};
use validator::Validate;

pub const COLLECTION: &str = "teacher_payment_info";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeacherPaymentInfo {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub teacher_id: ObjectId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bkash_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nagad_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bank_account_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bank_account_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bank_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bank_branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub routing_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

/// Copy of the teacher's receiving details at the moment a proof is submitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiverSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bkash_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nagad_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bank_account_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bank_account_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bank_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bank_branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub routing_number: Option<String>,
    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub snapshot_at: DateTime<Utc>,
}

impl TeacherPaymentInfo {
    pub fn snapshot(&self, at: DateTime<Utc>) -> ReceiverSnapshot {
        ReceiverSnapshot {
            bkash_number: self.bkash_number.clone(),
            nagad_number: self.nagad_number.clone(),
            bank_account_name: self.bank_account_name.clone(),
            bank_account_number: self.bank_account_number.clone(),
            bank_name: self.bank_name.clone(),
            bank_branch: self.bank_branch.clone(),
            routing_number: self.routing_number.clone(),
            snapshot_at: at,
        }
    }
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpsertPaymentInfo {
    #[validate(length(max = 20))]
    pub bkash_number: Option<String>,
    #[validate(length(max = 20))]
    pub nagad_number: Option<String>,
    #[validate(length(max = 100))]
    pub bank_account_name: Option<String>,
    #[validate(length(max = 50))]
    pub bank_account_number: Option<String>,
    #[validate(length(max = 100))]
    pub bank_name: Option<String>,
    #[validate(length(max = 100))]
    pub bank_branch: Option<String>,
    #[validate(length(max = 20))]
    pub routing_number: Option<String>,
    #[validate(length(max = 1000))]
    pub instructions: Option<String>,
}

fn clean(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

impl UpsertPaymentInfo {
    /// Trimmed copy with blank fields dropped.
    pub fn normalized(&self) -> UpsertPaymentInfo {
        UpsertPaymentInfo {
            bkash_number: clean(&self.bkash_number),
            nagad_number: clean(&self.nagad_number),
            bank_account_name: clean(&self.bank_account_name),
            bank_account_number: clean(&self.bank_account_number),
            bank_name: clean(&self.bank_name),
            bank_branch: clean(&self.bank_branch),
            routing_number: clean(&self.routing_number),
            instructions: clean(&self.instructions),
        }
    }

    /// bKash, Nagad, or a bank account number together with the bank name.
    pub fn has_any_method(&self) -> bool {
        self.bkash_number.is_some()
            || self.nagad_number.is_some()
            || (self.bank_account_number.is_some() && self.bank_name.is_some())
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentInfoResponse {
    pub teacher_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bkash_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nagad_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bank_account_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bank_account_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bank_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bank_branch: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub routing_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl From<TeacherPaymentInfo> for PaymentInfoResponse {
    fn from(info: TeacherPaymentInfo) -> Self {
        PaymentInfoResponse {
            teacher_id: info.teacher_id.to_hex(),
            bkash_number: info.bkash_number,
            nagad_number: info.nagad_number,
            bank_account_name: info.bank_account_name,
            bank_account_number: info.bank_account_number,
            bank_name: info.bank_name,
            bank_branch: info.bank_branch,
            routing_number: info.routing_number,
            instructions: info.instructions,
            updated_at: info.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_fields_do_not_count_as_a_method() {
        let input = UpsertPaymentInfo {
            bkash_number: Some("   ".into()),
            bank_name: Some("City Bank".into()),
            ..Default::default()
        };
        assert!(!input.normalized().has_any_method());
    }

    #[test]
    fn bank_needs_both_account_and_name() {
        let mut input = UpsertPaymentInfo {
            bank_account_number: Some("0123456789".into()),
            ..Default::default()
        };
        assert!(!input.normalized().has_any_method());
        input.bank_name = Some(" City Bank ".into());
        let normalized = input.normalized();
        assert!(normalized.has_any_method());
        assert_eq!(normalized.bank_name.as_deref(), Some("City Bank"));
    }

    #[test]
    fn mobile_wallet_alone_is_enough() {
        let input = UpsertPaymentInfo {
            nagad_number: Some("01711111111".into()),
            ..Default::default()
        };
        assert!(input.normalized().has_any_method());
    }
}
