//! Address handling shared by inbound and outbound paths.

use absolute_learner::whatsapp::{
    channel_address, mask_phone, strip_channel_prefix, InboundMessage, WebhookError,
    WebhookPayload,
};

#[test]
fn inbound_and_outbound_addresses_round_trip() {
    let phone = strip_channel_prefix("whatsapp:+15550001111");
    assert_eq!(channel_address(phone), "whatsapp:+15550001111");
}

#[test]
fn payload_deserializes_from_twilio_json_shape() {
    let payload: WebhookPayload = serde_json::from_str(
        r#"{"Body":"start","From":"whatsapp:+15550001111","ProfileName":"Ada","MessageSid":"SM1","NumMedia":"0"}"#,
    )
    .expect("twilio json");
    let msg = InboundMessage::try_from(payload).expect("valid");
    assert_eq!(msg.phone, "+15550001111");
    assert_eq!(msg.text, "start");
    assert_eq!(msg.name.as_deref(), Some("Ada"));
}

#[test]
fn empty_payload_reports_sender_first() {
    let err = InboundMessage::try_from(WebhookPayload::default()).expect_err("invalid");
    assert_eq!(err, WebhookError::MissingSender);
}

#[test]
fn empty_body_is_a_message_but_absent_body_is_not() {
    let media_only: WebhookPayload =
        serde_json::from_str(r#"{"Body":"","From":"whatsapp:+1555","NumMedia":"1"}"#)
            .expect("twilio json");
    let msg = InboundMessage::try_from(media_only).expect("valid");
    assert_eq!(msg.text, "");

    let no_body: WebhookPayload =
        serde_json::from_str(r#"{"From":"whatsapp:+1555"}"#).expect("twilio json");
    assert_eq!(
        InboundMessage::try_from(no_body),
        Err(WebhookError::MissingBody)
    );
}

#[test]
fn masking_never_reveals_more_than_four_digits() {
    let masked = mask_phone("+447700900123");
    assert!(masked.ends_with("0123"));
    assert_eq!(masked.chars().filter(|c| *c == '*').count(), 9);
    assert_eq!(mask_phone(""), "");
}
