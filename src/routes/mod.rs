pub mod admin;
pub mod auth;
pub mod bookings;
pub mod gigs;
pub mod payments;
pub mod reviews;
pub mod teachers;
pub mod users;
pub mod wallet;
