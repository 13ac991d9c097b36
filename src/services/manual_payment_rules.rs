//! Rules for the proof-of-transfer payment path (bKash, Nagad, bank).

use axum::http::StatusCode;
use chrono::{DateTime, Duration, Utc};
use mongodb::bson::oid::ObjectId;

use crate::config::PaymentRules;
use crate::errors::{AppError, Result};
use crate::models::booking::{
    AuditLogEntry, BookingStatus, ManualPayment, ManualPaymentStatus, PaymentMethodType,
};

pub const MAX_TRXID_LEN: usize = 100;

pub fn submission_window_expired(
    accepted_at: DateTime<Utc>,
    now: DateTime<Utc>,
    window_hours: i64,
) -> bool {
    now > accepted_at + Duration::hours(window_hours)
}

pub fn verification_is_late(
    submitted_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    window_hours: i64,
) -> bool {
    submitted_at.is_some_and(|at| now > at + Duration::hours(window_hours))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitDecision {
    Allowed,
    /// Window has passed; caller records the expiry before refusing.
    WindowExpired,
}

pub fn check_submission(
    status: BookingStatus,
    method: PaymentMethodType,
    manual: Option<&ManualPayment>,
    now: DateTime<Utc>,
    rules: &PaymentRules,
) -> Result<SubmitDecision> {
    if status != BookingStatus::Accepted {
        return Err(AppError::bad_request(
            "Booking must be accepted before payment submission",
        ));
    }
    let manual = match (method, manual) {
        (PaymentMethodType::Manual, Some(mp)) => mp,
        _ => {
            return Err(AppError::bad_request(
                "This booking does not use manual payment",
            ))
        }
    };

    if !matches!(
        manual.status,
        ManualPaymentStatus::PendingManual | ManualPaymentStatus::Rejected
    ) {
        return Err(AppError::bad_request(format!(
            "Cannot submit payment proof when status is \"{}\"",
            manual.status.as_str()
        )));
    }

    if manual.submission_count >= rules.max_submissions {
        return Err(AppError::rule(
            StatusCode::BAD_REQUEST,
            "MAX_SUBMISSIONS_REACHED",
            format!(
                "Maximum submission attempts ({}) reached. Please contact admin.",
                rules.max_submissions
            ),
        ));
    }

    if submission_window_expired(manual.accepted_at, now, rules.submission_window_hours) {
        return Ok(SubmitDecision::WindowExpired);
    }

    Ok(SubmitDecision::Allowed)
}

pub fn window_expired_error() -> AppError {
    AppError::rule(
        StatusCode::BAD_REQUEST,
        "SUBMISSION_WINDOW_EXPIRED",
        "Payment submission window has expired",
    )
}

pub fn duplicate_trxid_error() -> AppError {
    AppError::rule(
        StatusCode::CONFLICT,
        "DUPLICATE_TRXID",
        "This transaction ID has already been used. Please provide a unique transaction ID.",
    )
}

pub fn payment_info_missing_error() -> AppError {
    AppError::rule(
        StatusCode::CONFLICT,
        "TEACHER_PAYMENT_INFO_MISSING",
        "Teacher has not added payment details yet. Please contact the teacher.",
    )
}

pub fn normalize_trxid(raw: &str) -> Result<String> {
    let trxid = raw.trim();
    if trxid.is_empty() {
        return Err(AppError::invalid_data("Transaction ID (trxid) is required"));
    }
    if trxid.len() > MAX_TRXID_LEN {
        return Err(AppError::invalid_data("Transaction ID is too long"));
    }
    Ok(trxid.to_string())
}

/// Verify and reject both start from a submitted proof.
pub fn check_reviewable(manual: Option<&ManualPayment>, verb: &str) -> Result<()> {
    match manual {
        Some(mp) if mp.status == ManualPaymentStatus::Submitted => Ok(()),
        _ => Err(AppError::bad_request(format!(
            "Payment must be in \"submitted\" status to {}",
            verb
        ))),
    }
}

pub fn is_verified(manual: Option<&ManualPayment>) -> bool {
    manual.is_some_and(|mp| mp.status == ManualPaymentStatus::Verified)
}

pub fn audit_entry(
    action: &str,
    from: Option<ManualPaymentStatus>,
    to: ManualPaymentStatus,
    performed_by: Option<ObjectId>,
    note: Option<String>,
    now: DateTime<Utc>,
) -> AuditLogEntry {
    AuditLogEntry {
        action: action.to_string(),
        from_status: from,
        to_status: to,
        performed_by,
        note,
        timestamp: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn accepted_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 5, 9, 0, 0).unwrap()
    }

    fn manual(status: ManualPaymentStatus, count: u32) -> ManualPayment {
        let mut mp = ManualPayment::awaiting_proof(1500.0, accepted_at());
        mp.status = status;
        mp.submission_count = count;
        mp
    }

    fn rules() -> PaymentRules {
        PaymentRules::default()
    }

    #[test]
    fn first_submission_inside_window_is_allowed() {
        let mp = manual(ManualPaymentStatus::PendingManual, 0);
        let decision = check_submission(
            BookingStatus::Accepted,
            PaymentMethodType::Manual,
            Some(&mp),
            accepted_at() + Duration::hours(2),
            &rules(),
        )
        .unwrap();
        assert_eq!(decision, SubmitDecision::Allowed);
    }

    #[test]
    fn resubmission_after_rejection_is_allowed_until_cap() {
        let mp = manual(ManualPaymentStatus::Rejected, 2);
        let now = accepted_at() + Duration::hours(1);
        assert!(check_submission(
            BookingStatus::Accepted,
            PaymentMethodType::Manual,
            Some(&mp),
            now,
            &rules()
        )
        .is_ok());

        let mp = manual(ManualPaymentStatus::Rejected, 3);
        let err = check_submission(
            BookingStatus::Accepted,
            PaymentMethodType::Manual,
            Some(&mp),
            now,
            &rules(),
        )
        .unwrap_err();
        assert!(matches!(err, AppError::Rule { code: "MAX_SUBMISSIONS_REACHED", .. }));
    }

    #[test]
    fn window_boundary_is_exclusive_of_later_instants() {
        let mp = manual(ManualPaymentStatus::PendingManual, 0);
        let at_edge = accepted_at() + Duration::hours(12);
        assert_eq!(
            check_submission(
                BookingStatus::Accepted,
                PaymentMethodType::Manual,
                Some(&mp),
                at_edge,
                &rules()
            )
            .unwrap(),
            SubmitDecision::Allowed
        );
        assert_eq!(
            check_submission(
                BookingStatus::Accepted,
                PaymentMethodType::Manual,
                Some(&mp),
                at_edge + Duration::seconds(1),
                &rules()
            )
            .unwrap(),
            SubmitDecision::WindowExpired
        );
    }

    #[test]
    fn submission_requires_accepted_manual_booking() {
        let mp = manual(ManualPaymentStatus::PendingManual, 0);
        let now = accepted_at();
        assert!(check_submission(
            BookingStatus::Pending,
            PaymentMethodType::Manual,
            Some(&mp),
            now,
            &rules()
        )
        .is_err());
        assert!(check_submission(
            BookingStatus::Accepted,
            PaymentMethodType::Gateway,
            Some(&mp),
            now,
            &rules()
        )
        .is_err());
        assert!(check_submission(
            BookingStatus::Accepted,
            PaymentMethodType::Manual,
            None,
            now,
            &rules()
        )
        .is_err());
    }

    #[test]
    fn submitted_or_verified_proof_blocks_new_submission() {
        for status in [
            ManualPaymentStatus::Submitted,
            ManualPaymentStatus::Verified,
            ManualPaymentStatus::Expired,
        ] {
            let mp = manual(status, 1);
            let err = check_submission(
                BookingStatus::Accepted,
                PaymentMethodType::Manual,
                Some(&mp),
                accepted_at(),
                &rules(),
            )
            .unwrap_err();
            assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        }
    }

    #[test]
    fn only_submitted_proofs_are_reviewable() {
        let submitted = manual(ManualPaymentStatus::Submitted, 1);
        assert!(check_reviewable(Some(&submitted), "verify").is_ok());
        let pending = manual(ManualPaymentStatus::PendingManual, 0);
        assert!(check_reviewable(Some(&pending), "verify").is_err());
        assert!(check_reviewable(None, "reject").is_err());
    }

    #[test]
    fn late_verification_is_detected() {
        let submitted = accepted_at();
        assert!(!verification_is_late(Some(submitted), submitted + Duration::hours(24), 24));
        assert!(verification_is_late(
            Some(submitted),
            submitted + Duration::hours(25),
            24
        ));
        assert!(!verification_is_late(None, submitted, 24));
    }

    #[test]
    fn trxid_is_trimmed_and_required() {
        assert_eq!(normalize_trxid("  8N7A6B5C4D ").unwrap(), "8N7A6B5C4D");
        assert!(normalize_trxid("   ").is_err());
        assert!(normalize_trxid(&"x".repeat(101)).is_err());
    }

    #[test]
    fn duplicate_trxid_maps_to_conflict() {
        let err = duplicate_trxid_error();
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
    }
}
