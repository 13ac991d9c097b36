//! Booking lifecycle rules: status transitions, the join window around a
//! class, meeting room naming and attendance.
//!
//! Everything here is pure. Handlers load the documents, ask these functions
//! for a decision and persist the outcome.

use axum::http::StatusCode;
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use uuid::Uuid;

use crate::errors::{AppError, Result};
use crate::models::booking::BookingStatus;

pub const JOIN_OPENS_BEFORE_MINUTES: i64 = 15;
pub const JOIN_CLOSES_AFTER_END_MINUTES: i64 = 60;
pub const DEFAULT_DURATION_MINUTES: i64 = 90;

/// pending -> accepted | rejected, accepted -> completed. Nothing else.
pub fn can_transition(from: BookingStatus, to: BookingStatus) -> bool {
    use BookingStatus::*;
    matches!(
        (from, to),
        (Pending, Accepted) | (Pending, Rejected) | (Accepted, Completed)
    )
}

pub fn check_transition(from: BookingStatus, to: BookingStatus) -> Result<()> {
    if can_transition(from, to) {
        Ok(())
    } else {
        Err(AppError::bad_request(format!(
            "Cannot change booking status from {} to {}",
            from.as_str(),
            to.as_str()
        )))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowState {
    Open,
    NotOpenYet,
    Closed,
}

/// Join window is `[start - 15m, start + duration + 60m]`, inclusive at both ends.
pub fn join_window(
    now: DateTime<Utc>,
    scheduled_at: DateTime<Utc>,
    duration_minutes: Option<i64>,
) -> WindowState {
    let duration = duration_minutes
        .filter(|d| *d > 0)
        .unwrap_or(DEFAULT_DURATION_MINUTES);
    let opens = scheduled_at - Duration::minutes(JOIN_OPENS_BEFORE_MINUTES);
    let closes = scheduled_at + Duration::minutes(duration + JOIN_CLOSES_AFTER_END_MINUTES);

    if now < opens {
        WindowState::NotOpenYet
    } else if now > closes {
        WindowState::Closed
    } else {
        WindowState::Open
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Participant {
    Student,
    Teacher,
}

impl Participant {
    pub fn as_str(&self) -> &'static str {
        match self {
            Participant::Student => "student",
            Participant::Teacher => "teacher",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinDenied {
    NotAccepted,
    PaymentNotVerified,
    NotOpenYet,
    Closed,
}

impl From<JoinDenied> for AppError {
    fn from(denied: JoinDenied) -> Self {
        match denied {
            JoinDenied::NotAccepted => AppError::forbidden("Booking is not accepted yet"),
            JoinDenied::PaymentNotVerified => AppError::rule(
                StatusCode::FORBIDDEN,
                "PAYMENT_NOT_VERIFIED",
                "Payment verification required to join class",
            ),
            JoinDenied::NotOpenYet => AppError::forbidden("Join window not open yet"),
            JoinDenied::Closed => AppError::forbidden("Join window has closed for this class"),
        }
    }
}

/// Students need a cleared payment; teachers only need an accepted booking
/// inside the window.
pub fn check_join(
    participant: Participant,
    status: BookingStatus,
    payment_cleared: bool,
    window: WindowState,
) -> std::result::Result<(), JoinDenied> {
    if status != BookingStatus::Accepted {
        return Err(JoinDenied::NotAccepted);
    }
    if participant == Participant::Student && !payment_cleared {
        return Err(JoinDenied::PaymentNotVerified);
    }
    match window {
        WindowState::Open => Ok(()),
        WindowState::NotOpenYet => Err(JoinDenied::NotOpenYet),
        WindowState::Closed => Err(JoinDenied::Closed),
    }
}

/// Attendance may be marked once the join window has opened.
pub fn can_mark_attendance(
    status: BookingStatus,
    now: DateTime<Utc>,
    scheduled_at: DateTime<Utc>,
) -> bool {
    matches!(status, BookingStatus::Accepted | BookingStatus::Completed)
        && now >= scheduled_at - Duration::minutes(JOIN_OPENS_BEFORE_MINUTES)
}

fn random_hex(len: usize) -> String {
    Uuid::new_v4().simple().to_string()[..len].to_string()
}

pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    for ch in title.chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
        } else if !slug.ends_with('-') && !slug.is_empty() {
            slug.push('-');
        }
    }
    let slug: String = slug.trim_end_matches('-').chars().take(40).collect();
    let slug = slug.trim_end_matches('-');
    if slug.is_empty() {
        "class".to_string()
    } else {
        slug.to_string()
    }
}

pub fn meeting_room_id(gig_title: &str) -> String {
    format!("tutorconnected-{}-{}", slugify(gig_title), random_hex(8))
}

pub fn meeting_link(base_url: &str, room_id: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), room_id)
}

pub fn payment_ref_code() -> String {
    format!("TC-BOOK-{}", random_hex(8).to_uppercase())
}

/// Class start from either an RFC 3339 instant or a `YYYY-MM-DD` + `HH:MM`
/// pair read as UTC.
pub fn resolve_scheduled_at(
    scheduled_at: Option<&str>,
    scheduled_date: Option<&str>,
    scheduled_time: Option<&str>,
) -> Result<DateTime<Utc>> {
    if let Some(raw) = scheduled_at.map(str::trim).filter(|s| !s.is_empty()) {
        return DateTime::parse_from_rfc3339(raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|_| AppError::invalid_data("scheduledAt must be an RFC 3339 timestamp"));
    }

    let (Some(date), Some(time)) = (scheduled_date, scheduled_time) else {
        return Err(AppError::invalid_data(
            "scheduledAt, or scheduledDate with scheduledTime, is required",
        ));
    };

    let date = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d")
        .map_err(|_| AppError::invalid_data("scheduledDate must be YYYY-MM-DD"))?;
    let time = NaiveTime::parse_from_str(time.trim(), "%H:%M")
        .map_err(|_| AppError::invalid_data("scheduledTime must be HH:MM"))?;
    Ok(Utc.from_utc_datetime(&date.and_time(time)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use BookingStatus::*;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, 14, 0, 0).unwrap()
    }

    #[test]
    fn only_three_transitions_are_legal() {
        let all = [Pending, Accepted, Rejected, Completed];
        let legal: Vec<_> = all
            .iter()
            .flat_map(|from| all.iter().map(move |to| (*from, *to)))
            .filter(|(from, to)| can_transition(*from, *to))
            .collect();
        assert_eq!(
            legal,
            vec![(Pending, Accepted), (Pending, Rejected), (Accepted, Completed)]
        );
    }

    #[test]
    fn illegal_transition_is_bad_request() {
        let err = check_transition(Completed, Pending).unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert!(check_transition(Rejected, Accepted).is_err());
        assert!(check_transition(Accepted, Accepted).is_err());
    }

    #[test]
    fn window_is_inclusive_at_both_edges() {
        let s = start();
        assert_eq!(
            join_window(s - Duration::minutes(15), s, Some(60)),
            WindowState::Open
        );
        assert_eq!(
            join_window(s - Duration::minutes(15) - Duration::seconds(1), s, Some(60)),
            WindowState::NotOpenYet
        );
        assert_eq!(
            join_window(s + Duration::minutes(120), s, Some(60)),
            WindowState::Open
        );
        assert_eq!(
            join_window(s + Duration::minutes(120) + Duration::seconds(1), s, Some(60)),
            WindowState::Closed
        );
    }

    #[test]
    fn missing_duration_defaults_to_ninety_minutes() {
        let s = start();
        let last_moment = s + Duration::minutes(90 + 60);
        assert_eq!(join_window(last_moment, s, None), WindowState::Open);
        assert_eq!(
            join_window(last_moment + Duration::seconds(1), s, None),
            WindowState::Closed
        );
    }

    #[test]
    fn students_need_payment_teachers_do_not() {
        assert_eq!(
            check_join(Participant::Student, Accepted, false, WindowState::Open),
            Err(JoinDenied::PaymentNotVerified)
        );
        assert_eq!(
            check_join(Participant::Teacher, Accepted, false, WindowState::Open),
            Ok(())
        );
        assert_eq!(
            check_join(Participant::Student, Accepted, true, WindowState::Open),
            Ok(())
        );
    }

    #[test]
    fn join_requires_accepted_and_open_window() {
        assert_eq!(
            check_join(Participant::Teacher, Pending, true, WindowState::Open),
            Err(JoinDenied::NotAccepted)
        );
        assert_eq!(
            check_join(Participant::Teacher, Completed, true, WindowState::Open),
            Err(JoinDenied::NotAccepted)
        );
        assert_eq!(
            check_join(Participant::Student, Accepted, true, WindowState::Closed),
            Err(JoinDenied::Closed)
        );
    }

    #[test]
    fn payment_denial_carries_machine_code() {
        let err = AppError::from(JoinDenied::PaymentNotVerified);
        assert_eq!(err.status_code(), StatusCode::FORBIDDEN);
        assert!(matches!(err, AppError::Rule { code: "PAYMENT_NOT_VERIFIED", .. }));
    }

    #[test]
    fn attendance_opens_with_join_window() {
        let s = start();
        assert!(!can_mark_attendance(Accepted, s - Duration::minutes(16), s));
        assert!(can_mark_attendance(Accepted, s - Duration::minutes(15), s));
        assert!(can_mark_attendance(Completed, s + Duration::hours(5), s));
        assert!(!can_mark_attendance(Pending, s, s));
    }

    #[test]
    fn room_ids_are_slugged_and_unique() {
        assert_eq!(slugify("  Intro to Rust: Ownership!! "), "intro-to-rust-ownership");
        assert_eq!(slugify("???"), "class");

        let a = meeting_room_id("Algebra I");
        let b = meeting_room_id("Algebra I");
        assert!(a.starts_with("tutorconnected-algebra-i-"));
        assert_eq!(a.len(), "tutorconnected-algebra-i-".len() + 8);
        assert_ne!(a, b);
        assert_eq!(
            meeting_link("https://meet.jit.si/", &a),
            format!("https://meet.jit.si/{}", a)
        );
    }

    #[test]
    fn ref_code_has_fixed_shape() {
        let code = payment_ref_code();
        assert!(code.starts_with("TC-BOOK-"));
        let suffix = &code["TC-BOOK-".len()..];
        assert_eq!(suffix.len(), 8);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
    }

    #[test]
    fn scheduled_at_prefers_rfc3339() {
        let at = resolve_scheduled_at(Some("2025-03-10T20:00:00+06:00"), None, None).unwrap();
        assert_eq!(at, start());

        let at = resolve_scheduled_at(None, Some("2025-03-10"), Some("14:00")).unwrap();
        assert_eq!(at, start());

        assert!(resolve_scheduled_at(None, Some("2025-03-10"), None).is_err());
        assert!(resolve_scheduled_at(Some("tomorrow"), None, None).is_err());
    }
}
