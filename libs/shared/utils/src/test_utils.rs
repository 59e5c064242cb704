use std::sync::Arc;
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use base64::{Engine as _, engine::general_purpose};
use serde_json::json;
use uuid::Uuid;

use shared_config::{AppConfig, BookingSettings};
use shared_models::auth::User;

pub struct TestConfig {
    pub jwt_secret: String,
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_service_role_key: String,
    pub razorpay_key_secret: Option<String>,
    pub razorpay_base_url: String,
    pub booking: BookingSettings,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "test-secret-key-for-jwt-validation-must-be-long-enough".to_string(),
            supabase_url: "http://localhost:54321".to_string(),
            supabase_anon_key: "test-anon-key".to_string(),
            supabase_service_role_key: "test-service-role-key".to_string(),
            razorpay_key_secret: Some("test-razorpay-secret".to_string()),
            razorpay_base_url: "http://localhost:54322/v1".to_string(),
            booking: BookingSettings::default(),
        }
    }
}

impl TestConfig {
    pub fn with_supabase_url(mut self, url: &str) -> Self {
        self.supabase_url = url.to_string();
        self
    }

    pub fn to_app_config(&self) -> AppConfig {
        AppConfig {
            supabase_url: self.supabase_url.clone(),
            supabase_anon_key: self.supabase_anon_key.clone(),
            supabase_service_role_key: self.supabase_service_role_key.clone(),
            supabase_jwt_secret: self.jwt_secret.clone(),
            razorpay_key_id: "rzp_test_key".to_string(),
            razorpay_key_secret: self.razorpay_key_secret.clone(),
            razorpay_base_url: self.razorpay_base_url.clone(),
            internal_service_secret: Some("test-internal-secret".to_string()),
            booking: self.booking.clone(),
        }
    }

    pub fn to_arc(&self) -> Arc<AppConfig> {
        Arc::new(self.to_app_config())
    }
}

pub struct TestUser {
    pub id: String,
    pub email: String,
    pub role: String,
    pub metadata: Option<serde_json::Value>,
}

impl Default for TestUser {
    fn default() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email: "test@example.com".to_string(),
            role: "patient".to_string(),
            metadata: None,
        }
    }
}

impl TestUser {
    pub fn new(email: &str, role: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email: email.to_string(),
            role: role.to_string(),
            metadata: None,
        }
    }

    pub fn doctor(email: &str) -> Self {
        Self::new(email, "doctor")
    }

    /// A doctor whose token links to an existing doctor record.
    pub fn doctor_for(email: &str, doctor_id: Uuid) -> Self {
        let mut user = Self::new(email, "doctor");
        user.metadata = Some(json!({ "doctor_id": doctor_id.to_string() }));
        user
    }

    pub fn patient(email: &str) -> Self {
        Self::new(email, "patient")
    }

    pub fn admin(email: &str) -> Self {
        Self::new(email, "admin")
    }

    pub fn uuid(&self) -> Uuid {
        Uuid::parse_str(&self.id).unwrap_or_default()
    }

    pub fn to_user(&self) -> User {
        User {
            id: self.id.clone(),
            email: Some(self.email.clone()),
            role: Some(self.role.clone()),
            metadata: self.metadata.clone(),
            created_at: Some(Utc::now()),
        }
    }
}

pub struct JwtTestUtils;

impl JwtTestUtils {
    pub fn create_test_token(user: &TestUser, secret: &str, exp_hours: Option<i64>) -> String {
        let now = Utc::now();
        let exp = now + Duration::hours(exp_hours.unwrap_or(24));

        let header = json!({
            "alg": "HS256",
            "typ": "JWT"
        });

        let payload = json!({
            "sub": user.id,
            "email": user.email,
            "role": "authenticated",
            "app_metadata": { "role": user.role },
            "user_metadata": user.metadata.clone().unwrap_or_else(|| json!({})),
            "iat": now.timestamp(),
            "exp": exp.timestamp()
        });

        let header_encoded = general_purpose::URL_SAFE_NO_PAD.encode(header.to_string());
        let payload_encoded = general_purpose::URL_SAFE_NO_PAD.encode(payload.to_string());

        let signing_input = format!("{}.{}", header_encoded, payload_encoded);

        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(signing_input.as_bytes());
        let signature = mac.finalize().into_bytes();
        let signature_encoded = general_purpose::URL_SAFE_NO_PAD.encode(signature);

        format!("{}.{}", signing_input, signature_encoded)
    }

    pub fn create_expired_token(user: &TestUser, secret: &str) -> String {
        Self::create_test_token(user, secret, Some(-1))
    }

    pub fn create_invalid_signature_token(user: &TestUser) -> String {
        Self::create_test_token(user, "wrong-secret", Some(24))
    }

    pub fn create_malformed_token() -> String {
        "invalid.token.format".to_string()
    }
}

pub struct MockSupabaseResponses;

impl MockSupabaseResponses {
    pub fn appointment_response(patient_id: &str, doctor_id: &str, token_number: i32) -> serde_json::Value {
        json!({
            "id": Uuid::new_v4(),
            "patient_id": patient_id,
            "doctor_id": doctor_id,
            "hospital_id": Uuid::new_v4(),
            "appointment_date": "2030-01-15",
            "appointment_time": "10:00:00",
            "appointment_type": "consultation",
            "token_number": token_number,
            "token_type": "normal",
            "status": "confirmed",
            "special_instructions": null,
            "consultation_notes": null,
            "follow_up_date": null,
            "patient_name": "Test Patient",
            "booking_reference": format!("pay_{}", token_number),
            "gateway_order_id": format!("order_{}", token_number),
            "created_at": "2030-01-01T00:00:00Z",
            "updated_at": "2030-01-01T00:00:00Z"
        })
    }

    pub fn token_claim_response(doctor_id: &str, token_number: i32, claim_key: &str) -> serde_json::Value {
        json!({
            "doctor_id": doctor_id,
            "appointment_date": "2030-01-15",
            "token_number": token_number,
            "claim_key": claim_key,
            "created_at": "2030-01-01T00:00:00Z"
        })
    }

    pub fn time_slot_response(doctor_id: &str, day_of_week: u32) -> serde_json::Value {
        json!({
            "id": Uuid::new_v4(),
            "doctor_id": doctor_id,
            "day_of_week": day_of_week,
            "start_time": "09:00:00",
            "end_time": "10:00:00",
            "slot_duration": 30,
            "max_appointments": 2,
            "is_available": true
        })
    }

    /// PostgREST body for a violated unique constraint.
    pub fn unique_violation_response(constraint: &str) -> serde_json::Value {
        json!({
            "code": "23505",
            "message": format!("duplicate key value violates unique constraint \"{}\"", constraint),
            "details": null,
            "hint": null
        })
    }

    pub fn error_response(message: &str, code: &str) -> serde_json::Value {
        json!({
            "code": code,
            "message": message,
            "details": null,
            "hint": null
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_creation() {
        let config = TestConfig::default();
        let app_config = config.to_app_config();

        assert_eq!(app_config.supabase_url, "http://localhost:54321");
        assert_eq!(app_config.supabase_anon_key, "test-anon-key");
        assert!(!app_config.supabase_jwt_secret.is_empty());
        assert!(app_config.is_payment_configured());
    }

    #[test]
    fn test_user_creation() {
        let doctor_id = Uuid::new_v4();
        let user = TestUser::doctor_for("doc@example.com", doctor_id);
        assert_eq!(user.email, "doc@example.com");
        assert_eq!(user.role, "doctor");

        let user_model = user.to_user();
        assert_eq!(user_model.email, Some(user.email.clone()));
        assert_eq!(user_model.role, Some(user.role.clone()));
        assert_eq!(user_model.id, user.id);
        assert_eq!(
            user_model.metadata.unwrap()["doctor_id"],
            json!(doctor_id.to_string())
        );
    }

    #[test]
    fn test_jwt_token_creation() {
        let user = TestUser::default();
        let secret = "test-secret";
        let token = JwtTestUtils::create_test_token(&user, secret, Some(1));

        assert!(token.contains('.'));
        assert_eq!(token.split('.').count(), 3);
    }
}
