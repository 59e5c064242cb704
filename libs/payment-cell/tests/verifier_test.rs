use assert_matches::assert_matches;

use payment_cell::{compute_signature, verify, GatewayConfirmation, PaymentError, PaymentVerifier};

const SECRET: &str = "test-razorpay-secret";

fn confirmation(order_id: &str, payment_id: &str, signature: String) -> GatewayConfirmation {
    GatewayConfirmation {
        order_id: order_id.to_string(),
        payment_id: payment_id.to_string(),
        signature,
    }
}

#[test]
fn accepts_signature_from_same_secret() {
    let signature = compute_signature("order_abc", "pay_xyz", SECRET);
    assert!(verify("order_abc", "pay_xyz", &signature, SECRET));
}

#[test]
fn rejects_signature_for_other_payment() {
    let signature = compute_signature("order_abc", "pay_other", SECRET);
    assert!(!verify("order_abc", "pay_xyz", &signature, SECRET));
}

#[test]
fn rejects_signature_from_other_secret() {
    let signature = compute_signature("order_abc", "pay_xyz", "another-secret");
    assert!(!verify("order_abc", "pay_xyz", &signature, SECRET));
}

#[test]
fn separator_is_part_of_signed_message() {
    // "order_a|bpay" and "order_ab|pay" must not collide
    let signature = compute_signature("order_a", "bpay", SECRET);
    assert!(!verify("order_ab", "pay", &signature, SECRET));
}

#[test]
fn rejects_truncated_signature() {
    let signature = compute_signature("order_abc", "pay_xyz", SECRET);
    assert!(!verify("order_abc", "pay_xyz", &signature[..62], SECRET));
}

#[test]
fn verifier_without_secret_is_a_configuration_error() {
    let signature = compute_signature("order_abc", "pay_xyz", SECRET);

    let verifier = PaymentVerifier::new(None);
    assert_matches!(
        verifier.verify_confirmation(&confirmation("order_abc", "pay_xyz", signature.clone())),
        Err(PaymentError::SecretNotConfigured)
    );

    let verifier = PaymentVerifier::new(Some(String::new()));
    assert_matches!(
        verifier.verify_confirmation(&confirmation("order_abc", "pay_xyz", signature)),
        Err(PaymentError::SecretNotConfigured)
    );
}

#[test]
fn verifier_reports_order_on_mismatch() {
    let verifier = PaymentVerifier::new(Some(SECRET.to_string()));
    let forged = compute_signature("order_abc", "pay_forged", SECRET);

    assert_matches!(
        verifier.verify_confirmation(&confirmation("order_abc", "pay_xyz", forged)),
        Err(PaymentError::VerificationFailed { order_id }) if order_id == "order_abc"
    );

    let genuine = compute_signature("order_abc", "pay_xyz", SECRET);
    assert!(verifier.verify_confirmation(&confirmation("order_abc", "pay_xyz", genuine)).is_ok());
}
