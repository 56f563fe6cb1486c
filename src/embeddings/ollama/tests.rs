use super::*;
use crate::config::OllamaConfig;

#[test]
fn client_configuration() {
    let config = OllamaConfig {
        protocol: "http".to_string(),
        host: "test-host".to_string(),
        port: 1234,
        batch_size: 128,
        ..OllamaConfig::default()
    };
    let client = OllamaClient::new(&config, "test-model", 384).expect("Failed to create client");

    assert_eq!(client.model, "test-model");
    assert_eq!(client.batch_size, 128);
    assert_eq!(client.base_url.host_str(), Some("test-host"));
    assert_eq!(client.base_url.port(), Some(1234));
    assert_eq!(client.retry_attempts, config.retry_attempts);
    assert_eq!(client.model_id(), "test-model");
    assert_eq!(client.dimension(), 384);
}

#[test]
fn client_builder_methods() {
    let client = OllamaClient::new(&OllamaConfig::default(), DEFAULT_EMBEDDING_MODEL, 768)
        .expect("Failed to create client")
        .with_timeout(Duration::from_secs(60))
        .with_retry_attempts(5)
        .with_backoff_unit(Duration::from_millis(10));

    assert_eq!(client.retry_attempts, 5);
    assert_eq!(client.backoff_unit, Duration::from_millis(10));
}

#[test]
fn retry_attempts_never_zero() {
    let client = OllamaClient::new(&OllamaConfig::default(), DEFAULT_EMBEDDING_MODEL, 768)
        .expect("Failed to create client")
        .with_retry_attempts(0);

    assert_eq!(client.retry_attempts, 1);
}

#[test]
fn embed_request_uses_input_field() {
    let texts = vec!["likes tea".to_string()];
    let request = EmbedRequest {
        model: "nomic-embed-text:latest",
        input: &texts,
    };

    let json = serde_json::to_value(&request).expect("can serialize request");
    assert_eq!(json["model"], "nomic-embed-text:latest");
    assert_eq!(json["input"][0], "likes tea");
}

#[test]
fn embed_response_parsing() {
    let response: EmbedResponse =
        serde_json::from_str(r#"{"model":"m","embeddings":[[0.1,0.2],[0.3,0.4]]}"#)
            .expect("can parse response");

    assert_eq!(response.embeddings.len(), 2);
    assert_eq!(response.embeddings[1], vec![0.3, 0.4]);
}
