pub mod activity;
pub mod booking;
pub(crate) mod datetime;
pub mod gig;
pub mod payment;
pub mod review;
pub mod teacher_payment_info;
pub mod trx_registry;
pub mod user;
pub mod wallet;
