//! Integration tests for the speech provider client against a mock server
//!
//! Run with: cargo test --test speech_client_test

use golosok::speech::{SpeechClient, SpeechError};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_synthesize_returns_audio_bytes() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/audio/stream"))
        .and(header("authorization", "Bearer test-key"))
        .and(header("accept", "audio/mpeg"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"mp3-bytes".to_vec()))
        .mount(&server)
        .await;

    let client = SpeechClient::new("test-key", server.uri());
    let audio = client.synthesize("привет", "voice-1").await.unwrap();

    assert_eq!(audio, b"mp3-bytes".to_vec());
}

#[tokio::test]
async fn test_synthesize_relays_provider_message_on_4xx() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/audio/stream"))
        .respond_with(
            ResponseTemplate::new(400).set_body_string(r#"{"message": "voice_id not found"}"#),
        )
        .mount(&server)
        .await;

    let client = SpeechClient::new("test-key", server.uri());
    let err = client.synthesize("text", "missing-voice").await.unwrap_err();

    match err {
        SpeechError::Rejected(message) => assert_eq!(message, "voice_id not found"),
        other => panic!("expected Rejected, got {:?}", other),
    }
}

#[tokio::test]
async fn test_synthesize_5xx_is_unavailable() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/audio/stream"))
        .respond_with(ResponseTemplate::new(503).set_body_string("upstream down"))
        .mount(&server)
        .await;

    let client = SpeechClient::new("test-key", server.uri());
    let err = client.synthesize("text", "voice-1").await.unwrap_err();

    assert!(matches!(err, SpeechError::Unavailable(_)));
}

#[tokio::test]
async fn test_clone_voice_parses_voice_id() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/voices"))
        .and(header("authorization", "Bearer test-key"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(r#"{"id": "voice-777", "status": "processing"}"#),
        )
        .mount(&server)
        .await;

    let client = SpeechClient::new("test-key", server.uri());
    let cloned = client.clone_voice("Alice", vec![0u8; 128]).await.unwrap();

    assert_eq!(cloned.voice_id, "voice-777");
    assert_eq!(cloned.status, "processing");
}

#[tokio::test]
async fn test_clone_voice_without_id_is_rejected() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/voices"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"status": "processing"}"#))
        .mount(&server)
        .await;

    let client = SpeechClient::new("test-key", server.uri());
    let err = client.clone_voice("Alice", vec![0u8; 128]).await.unwrap_err();

    assert!(matches!(err, SpeechError::Rejected(_)));
}

#[tokio::test]
async fn test_clone_voice_relays_rejection_message() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/voices"))
        .respond_with(
            ResponseTemplate::new(422).set_body_string(r#"{"message": "sample too short"}"#),
        )
        .mount(&server)
        .await;

    let client = SpeechClient::new("test-key", server.uri());
    let err = client.clone_voice("Alice", vec![0u8; 16]).await.unwrap_err();

    match err {
        SpeechError::Rejected(message) => assert_eq!(message, "sample too short"),
        other => panic!("expected Rejected, got {:?}", other),
    }
}
