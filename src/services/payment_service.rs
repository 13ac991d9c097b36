//! Status transitions for gateway payments.
//!
//! PENDING may become SUCCESS or FAILED. FAILED may still become SUCCESS when
//! the gateway later reports a valid payment. SUCCESS is final. Each flip into
//! SUCCESS shares one MongoDB transaction with the teacher's wallet credit, and
//! only one flip into SUCCESS can ever match, so the wallet is credited once.

use chrono::Utc;
use mongodb::{
    bson::{doc, Document},
    options::ReturnDocument,
    ClientSession, Collection, Database,
};
use tracing::{info, warn};

use crate::errors::Result;
use crate::models::payment::{Payment, PaymentStatus, COLLECTION};
use crate::services::wallet_service;
use crate::state::AppState;

fn payments(db: &Database) -> Collection<Payment> {
    db.collection(COLLECTION)
}

fn transition(to: PaymentStatus) -> Document {
    let now = Utc::now();
    doc! {
        "$set": { "status": to.as_str(), "updatedAt": now },
        "$push": { "statusHistory": { "status": to.as_str(), "at": now } },
    }
}

/// Statuses a payment may hold when `outcome` is applied to it.
fn sources(outcome: PaymentStatus) -> &'static [PaymentStatus] {
    match outcome {
        PaymentStatus::Success => &[PaymentStatus::Pending, PaymentStatus::Failed],
        PaymentStatus::Failed => &[PaymentStatus::Pending],
        PaymentStatus::Pending => &[],
    }
}

/// Status reached by applying `outcome` to a payment in `current`, if allowed.
pub fn next_status(current: PaymentStatus, outcome: PaymentStatus) -> Option<PaymentStatus> {
    sources(outcome).contains(&current).then_some(outcome)
}

fn settle_filter(tran_id: &str, outcome: PaymentStatus) -> Option<Document> {
    let from: Vec<&str> = sources(outcome).iter().map(|s| s.as_str()).collect();
    if from.is_empty() {
        return None;
    }
    Some(doc! { "transactionId": tran_id, "status": { "$in": from } })
}

/// Result of applying a gateway outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    /// This call changed the payment's status.
    Applied(PaymentStatus),
    /// Outcome not applicable to the current status, which is returned.
    Unchanged(PaymentStatus),
    Unknown,
}

async fn succeed_in_session(
    state: &AppState,
    session: &mut ClientSession,
    filter: Document,
) -> Result<Option<Payment>> {
    let updated = payments(&state.db)
        .find_one_and_update(filter, transition(PaymentStatus::Success))
        .return_document(ReturnDocument::After)
        .session(&mut *session)
        .await?;

    if let Some(payment) = &updated {
        wallet_service::credit_payment(
            &state.db,
            session,
            payment,
            state.config.payment_rules.commission_rate,
        )
        .await?;
    }
    Ok(updated)
}

async fn mark_success(state: &AppState, filter: Document) -> Result<Option<Payment>> {
    let mut session = state.client.start_session().await?;
    session.start_transaction().await?;

    match succeed_in_session(state, &mut session, filter).await {
        Ok(updated) => {
            session.commit_transaction().await?;
            Ok(updated)
        }
        Err(err) => {
            if let Err(abort_err) = session.abort_transaction().await {
                warn!(target: "payment", "Failed to abort payment transaction: {}", abort_err);
            }
            Err(err)
        }
    }
}

async fn mark_failed(db: &Database, filter: Document) -> Result<Option<Payment>> {
    let updated = payments(db)
        .find_one_and_update(filter, transition(PaymentStatus::Failed))
        .return_document(ReturnDocument::After)
        .await?;
    Ok(updated)
}

/// Applies `outcome` to the payment identified by `tran_id`. A SUCCESS payment
/// is never downgraded or credited twice, and a FAILED one can still succeed.
pub async fn settle(state: &AppState, tran_id: &str, outcome: PaymentStatus) -> Result<Settlement> {
    let updated = match (outcome, settle_filter(tran_id, outcome)) {
        (PaymentStatus::Success, Some(filter)) => mark_success(state, filter).await?,
        (_, Some(filter)) => mark_failed(&state.db, filter).await?,
        (_, None) => None,
    };

    if let Some(payment) = updated {
        info!(
            target: "payment",
            tran_id,
            status = payment.status.as_str(),
            booking = ?payment.booking_id.map(|id| id.to_hex()),
            "payment settled"
        );
        return Ok(Settlement::Applied(payment.status));
    }

    let current = payments(&state.db)
        .find_one(doc! { "transactionId": tran_id })
        .await?;
    Ok(match current {
        Some(payment) => {
            if payment.status != outcome {
                warn!(
                    target: "payment",
                    tran_id,
                    current = payment.status.as_str(),
                    requested = outcome.as_str(),
                    "ignoring status change not allowed from current status"
                );
            }
            Settlement::Unchanged(payment.status)
        }
        None => {
            warn!(target: "payment", tran_id, "callback for unknown transaction");
            Settlement::Unknown
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use PaymentStatus::{Failed, Pending, Success};

    #[test]
    fn failed_payment_can_still_succeed() {
        assert_eq!(next_status(Pending, Failed), Some(Failed));
        assert_eq!(next_status(Failed, Success), Some(Success));
    }

    #[test]
    fn success_is_final_and_credited_once() {
        assert_eq!(next_status(Pending, Success), Some(Success));
        assert_eq!(next_status(Success, Success), None);
        assert_eq!(next_status(Success, Failed), None);
        assert_eq!(next_status(Failed, Failed), None);

        let mut status = Pending;
        let mut credits = 0;
        for outcome in [Success, Success, Failed, Success] {
            if let Some(next) = next_status(status, outcome) {
                if next == Success {
                    credits += 1;
                }
                status = next;
            }
        }
        assert_eq!(status, Success);
        assert_eq!(credits, 1);
    }

    #[test]
    fn settle_filter_matches_only_allowed_sources() {
        let success = settle_filter("TC-1", Success).unwrap();
        assert_eq!(success.get_str("transactionId").unwrap(), "TC-1");
        assert_eq!(
            success.get_document("status").unwrap(),
            &doc! { "$in": ["PENDING", "FAILED"] }
        );

        let failed = settle_filter("TC-1", Failed).unwrap();
        assert_eq!(failed.get_document("status").unwrap(), &doc! { "$in": ["PENDING"] });

        assert!(settle_filter("TC-1", Pending).is_none());
    }
}
