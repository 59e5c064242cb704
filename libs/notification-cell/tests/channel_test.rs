use assert_matches::assert_matches;
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use notification_cell::{
    EdgeFunctionChannel, NotificationChannel, NotificationError, NotificationIntent, NotificationKind,
};
use shared_utils::test_utils::TestConfig;

#[tokio::test]
async fn posts_intent_to_edge_function() {
    let server = MockServer::start().await;
    let user_id = Uuid::new_v4();

    Mock::given(method("POST"))
        .and(path("/functions/v1/send-notification"))
        .and(header("X-Internal-Secret", "test-internal-secret"))
        .and(body_partial_json(json!({
            "user_id": user_id,
            "type": "appointment_confirmation",
            "title": "Appointment Confirmed"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": true })))
        .expect(1)
        .mount(&server)
        .await;

    let config = TestConfig::default().with_supabase_url(&server.uri()).to_app_config();
    let channel = EdgeFunctionChannel::new(&config);
    let intent = NotificationIntent::new(
        user_id,
        Uuid::new_v4(),
        NotificationKind::AppointmentConfirmation,
        "Appointment Confirmed",
        "Your token number is 1",
    );

    channel.deliver(&intent).await.unwrap();
}

#[tokio::test]
async fn edge_function_error_is_delivery_failure() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/functions/v1/send-notification"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let config = TestConfig::default().with_supabase_url(&server.uri()).to_app_config();
    let channel = EdgeFunctionChannel::new(&config);
    let intent = NotificationIntent::new(
        Uuid::new_v4(),
        Uuid::new_v4(),
        NotificationKind::AppointmentCancelled,
        "Appointment Cancelled",
        "Your appointment was cancelled",
    );

    assert_matches!(channel.deliver(&intent).await, Err(NotificationError::Delivery(_)));
}

#[tokio::test]
async fn missing_internal_secret_is_not_configured() {
    let mut config = TestConfig::default().to_app_config();
    config.internal_service_secret = None;
    let channel = EdgeFunctionChannel::new(&config);
    let intent = NotificationIntent::new(
        Uuid::new_v4(),
        Uuid::new_v4(),
        NotificationKind::NewAppointment,
        "New Appointment",
        "Token 1",
    );

    assert_matches!(channel.deliver(&intent).await, Err(NotificationError::NotConfigured(_)));
}
