// services/sslcommerz_service.rs
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::config::GatewayConfig;
use crate::errors::{AppError, Result};
use crate::models::payment::PaymentStatus;

const SESSION_PATH: &str = "/gwprocess/v4/api.php";
const VALIDATOR_PATH: &str = "/validator/api/validationserverAPI.php";

#[derive(Debug, Deserialize)]
pub struct SessionResponse {
    pub status: String,
    #[serde(rename = "GatewayPageURL")]
    pub gateway_page_url: Option<String>,
    #[serde(rename = "failedreason")]
    pub failed_reason: Option<String>,
    #[serde(rename = "sessionkey")]
    pub session_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ValidationResponse {
    pub status: String,
    pub tran_id: Option<String>,
    pub val_id: Option<String>,
    pub amount: Option<String>,
}

/// Details of the checkout the customer is sent to.
#[derive(Debug)]
pub struct CheckoutRequest<'a> {
    pub tran_id: &'a str,
    pub amount: f64,
    pub product_name: &'a str,
    pub customer_name: &'a str,
    pub customer_email: &'a str,
    pub customer_phone: Option<&'a str>,
}

/// What the gateway told us about a transaction.
#[derive(Debug)]
pub enum Evidence<'a> {
    /// Answer from the validator API.
    Validated(&'a ValidationResponse),
    /// Validator call failed or returned garbage.
    ValidatorFailed,
    /// Status field from the callback body, used when no `val_id` came with it.
    Reported(Option<&'a str>),
}

pub fn is_valid_status(status: &str) -> bool {
    matches!(status, "VALID" | "VALIDATED")
}

/// Settled outcome for a callback. Anything short of a clean confirmation is FAILED.
pub fn outcome(tran_id: &str, evidence: Evidence<'_>) -> PaymentStatus {
    match evidence {
        Evidence::Validated(resp) => {
            if is_valid_status(&resp.status) && resp.tran_id.as_deref() == Some(tran_id) {
                PaymentStatus::Success
            } else {
                PaymentStatus::Failed
            }
        }
        Evidence::ValidatorFailed => PaymentStatus::Failed,
        Evidence::Reported(Some(status)) if is_valid_status(status) => PaymentStatus::Success,
        Evidence::Reported(_) => PaymentStatus::Failed,
    }
}

#[derive(Debug, Clone)]
pub struct SslCommerzService {
    config: GatewayConfig,
    callback_base: String,
    client: Client,
}

impl SslCommerzService {
    pub fn new(config: GatewayConfig, callback_base: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| AppError::configuration(format!("Failed to create HTTP client: {}", e)))?;

        Ok(SslCommerzService {
            config,
            callback_base: callback_base.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn callback_url(&self, kind: &str, tran_id: &str) -> String {
        format!("{}/api/payments/{}/{}", self.callback_base, kind, tran_id)
    }

    /// Opens a hosted checkout session and returns the page to redirect the customer to.
    pub async fn create_session(&self, checkout: &CheckoutRequest<'_>) -> Result<String> {
        info!(target: "payment", tran_id = checkout.tran_id, amount = checkout.amount, "init-payload");

        let form: Vec<(&str, String)> = vec![
            ("store_id", self.config.store_id.clone()),
            ("store_passwd", self.config.store_password.clone()),
            ("total_amount", format!("{:.2}", checkout.amount)),
            ("currency", "BDT".to_string()),
            ("tran_id", checkout.tran_id.to_string()),
            ("success_url", self.callback_url("success", checkout.tran_id)),
            ("fail_url", self.callback_url("fail", checkout.tran_id)),
            ("cancel_url", self.callback_url("cancel", checkout.tran_id)),
            ("ipn_url", format!("{}/api/payments/ipn", self.callback_base)),
            ("product_name", checkout.product_name.to_string()),
            ("product_category", "Education".to_string()),
            ("product_profile", "non-physical-goods".to_string()),
            ("shipping_method", "NO".to_string()),
            ("emi_option", "0".to_string()),
            ("cus_name", checkout.customer_name.to_string()),
            ("cus_email", checkout.customer_email.to_string()),
            ("cus_add1", "Dhaka".to_string()),
            ("cus_city", "Dhaka".to_string()),
            ("cus_country", "Bangladesh".to_string()),
            (
                "cus_phone",
                checkout.customer_phone.unwrap_or("01700000000").to_string(),
            ),
        ];

        let url = format!("{}{}", self.config.base_url(), SESSION_PATH);
        let response = self.client.post(&url).form(&form).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!(target: "payment", "Session request failed: {} - {}", status, body);
            return Err(AppError::gateway(format!("Session request failed: {}", status)));
        }

        let session: SessionResponse = response.json().await?;
        match session.gateway_page_url.filter(|u| !u.is_empty()) {
            Some(page) if session.status == "SUCCESS" => Ok(page),
            _ => {
                let reason = session
                    .failed_reason
                    .unwrap_or_else(|| "no gateway page returned".to_string());
                warn!(target: "payment", tran_id = checkout.tran_id, "init-no-gateway-url: {}", reason);
                Err(AppError::gateway(reason))
            }
        }
    }

    pub async fn validate(&self, val_id: &str) -> Result<ValidationResponse> {
        let url = format!("{}{}", self.config.base_url(), VALIDATOR_PATH);
        let response = self
            .client
            .get(&url)
            .timeout(Duration::from_secs(8))
            .query(&[
                ("val_id", val_id),
                ("store_id", self.config.store_id.as_str()),
                ("store_passwd", self.config.store_password.as_str()),
                ("format", "json"),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AppError::gateway(format!(
                "Validator returned {}",
                response.status()
            )));
        }
        Ok(response.json().await?)
    }

    /// Resolves a callback to SUCCESS or FAILED, asking the validator when a
    /// `val_id` is available.
    pub async fn resolve(
        &self,
        tran_id: &str,
        reported_status: Option<&str>,
        val_id: Option<&str>,
    ) -> PaymentStatus {
        match val_id.filter(|v| !v.is_empty()) {
            Some(val_id) => match self.validate(val_id).await {
                Ok(resp) => outcome(tran_id, Evidence::Validated(&resp)),
                Err(e) => {
                    warn!(target: "payment", tran_id, "validator-error: {}", e);
                    outcome(tran_id, Evidence::ValidatorFailed)
                }
            },
            None => outcome(tran_id, Evidence::Reported(reported_status)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validation(status: &str, tran_id: &str) -> ValidationResponse {
        ValidationResponse {
            status: status.to_string(),
            tran_id: Some(tran_id.to_string()),
            val_id: Some("v1".to_string()),
            amount: Some("1500.00".to_string()),
        }
    }

    #[test]
    fn validated_success_needs_matching_tran_id() {
        let ok = validation("VALID", "t-1");
        assert_eq!(outcome("t-1", Evidence::Validated(&ok)), PaymentStatus::Success);
        assert_eq!(outcome("t-2", Evidence::Validated(&ok)), PaymentStatus::Failed);

        let already = validation("VALIDATED", "t-1");
        assert_eq!(
            outcome("t-1", Evidence::Validated(&already)),
            PaymentStatus::Success
        );

        let bad = validation("INVALID_TRANSACTION", "t-1");
        assert_eq!(outcome("t-1", Evidence::Validated(&bad)), PaymentStatus::Failed);
    }

    #[test]
    fn validator_errors_default_to_failed() {
        assert_eq!(outcome("t-1", Evidence::ValidatorFailed), PaymentStatus::Failed);
    }

    #[test]
    fn reported_status_is_trusted_without_val_id() {
        assert_eq!(
            outcome("t-1", Evidence::Reported(Some("VALID"))),
            PaymentStatus::Success
        );
        assert_eq!(
            outcome("t-1", Evidence::Reported(Some("FAILED"))),
            PaymentStatus::Failed
        );
        assert_eq!(outcome("t-1", Evidence::Reported(None)), PaymentStatus::Failed);
    }

    #[test]
    fn callback_urls_point_back_at_api() {
        let svc = SslCommerzService::new(
            GatewayConfig {
                store_id: "store".into(),
                store_password: "pass".into(),
                is_live: false,
            },
            "https://api.example.com/",
        )
        .unwrap();
        assert_eq!(
            svc.callback_url("success", "abc"),
            "https://api.example.com/api/payments/success/abc"
        );
    }
}
