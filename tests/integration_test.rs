use resumable_exporter::config::KafkaConfig;
use resumable_exporter::position::next_key;
use resumable_exporter::{Config, Exporter, Position};
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::Message;
use serde_json::{json, Value};
use std::env;
use std::time::Duration;
use tokio::time::timeout;

#[tokio::test]
#[ignore] // Run with: cargo test --ignored integration_test::test_end_to_end_export
async fn test_end_to_end_export() {
    tracing_subscriber::fmt()
        .with_env_filter("resumable_exporter=debug")
        .try_init()
        .ok();

    let config = get_test_config(false);
    let name = format!("it-{}-exporter", std::process::id());

    let mut exporter = Exporter::new(name.clone(), &config).unwrap();
    exporter.connect().await.unwrap();
    assert!(exporter.get_last_position().await.unwrap().is_none());

    for n in 1..=5u64 {
        exporter
            .export(
                json!({"timestamp": 1000 + n, "key": n}),
                Some("key"),
                Position::from(json!({"timestamp": 1000 + n, "key": n})),
            )
            .await
            .unwrap();
    }
    let topic = exporter.topic_name().to_string();
    exporter.disconnect().await.unwrap();

    // A fresh exporter resumes after the last saved key
    let mut restarted = Exporter::new(name, &config).unwrap();
    restarted.connect().await.unwrap();
    let last = restarted.get_last_position().await.unwrap();
    assert_eq!(next_key(last.as_ref()), 6);
    restarted.disconnect().await.unwrap();

    let keys = consume_keys(&config.kafka, &topic, 5).await;
    assert_eq!(keys, vec![1, 2, 3, 4, 5]);
}

#[tokio::test]
#[ignore] // Run with: cargo test --ignored integration_test::test_transactional_export
async fn test_transactional_export() {
    tracing_subscriber::fmt()
        .with_env_filter("resumable_exporter=debug")
        .try_init()
        .ok();

    let config = get_test_config(true);
    let name = format!("it-tx-{}-exporter", std::process::id());

    let mut exporter = Exporter::new(name, &config).unwrap();
    exporter.connect().await.unwrap();
    exporter.init_transactions().await.unwrap();

    for _ in 0..3 {
        let last = exporter.get_last_position().await.unwrap();
        let key = next_key(last.as_ref());
        exporter
            .export(
                json!({"timestamp": 2000 + key, "key": key}),
                Some("key"),
                Position::from(json!({"timestamp": 2000 + key, "key": key})),
            )
            .await
            .unwrap();
    }

    let last = exporter.get_last_position().await.unwrap().unwrap();
    assert_eq!(last.key(), Some(3));

    let topic = exporter.topic_name().to_string();
    exporter.disconnect().await.unwrap();

    let keys = consume_keys(&config.kafka, &topic, 3).await;
    assert_eq!(keys, vec![1, 2, 3]);
}

#[tokio::test]
#[ignore] // Run with: cargo test --ignored integration_test::test_unreachable_zookeeper
async fn test_unreachable_zookeeper() {
    let mut config = get_test_config(false);
    config.zookeeper.url = "127.0.0.1:1".to_string();
    config.zookeeper.connect_timeout_ms = 1_000;

    let mut exporter = Exporter::new("unreachable-exporter", &config).unwrap();
    assert!(exporter.connect().await.is_err());
    assert!(!exporter.is_connected());
}

/// Get test configuration from environment variables
fn get_test_config(transactional: bool) -> Config {
    let mut config = Config::default();
    config.zookeeper.url = env::var("TEST_ZOOKEEPER_URL").unwrap_or_else(|_| "localhost:2181".to_string());
    config.kafka.url = env::var("TEST_KAFKA_URL").unwrap_or_else(|_| "localhost:9092".to_string());
    config.kafka.compression_codec = "none".to_string(); // No compression for tests
    config.kafka.transactional = transactional;
    config
}

async fn consume_keys(kafka_config: &KafkaConfig, topic: &str, expected: usize) -> Vec<u64> {
    let consumer: StreamConsumer = ClientConfig::new()
        .set("bootstrap.servers", &kafka_config.url)
        .set("group.id", format!("test_consumer_{}", std::process::id()))
        .set("auto.offset.reset", "earliest")
        .set("enable.auto.commit", "false")
        .set("isolation.level", "read_committed")
        .create()
        .expect("Failed to create consumer");

    consumer
        .subscribe(&[topic])
        .expect("Failed to subscribe to topic");

    let mut keys = Vec::new();
    let start = tokio::time::Instant::now();

    while keys.len() < expected && start.elapsed() < Duration::from_secs(15) {
        if let Ok(Ok(message)) = timeout(Duration::from_secs(1), consumer.recv()).await {
            if let Some(payload) = message.payload() {
                let json: Value = serde_json::from_slice(payload).unwrap();
                if let Some(key) = json["key"].as_u64() {
                    assert_eq!(message.key(), Some(key.to_string().as_bytes()));
                    keys.push(key);
                }
            }
        }
    }

    keys
}
