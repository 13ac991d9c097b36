pub mod activity_service;
pub mod analytics_service;
pub mod booking_rules;
pub mod manual_payment_rules;
pub mod payment_service;
pub mod rating_service;
pub mod sslcommerz_service;
pub mod token_service;
pub mod wallet_service;
