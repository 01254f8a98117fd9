#[path = "common.rs"]
mod common;

use std::time::Duration;

use common::{start_broker, test_config, STEP};
use linemq::{Client, ClientError};
use tokio::time::timeout;

#[tokio::test]
async fn client_round_trip_with_backlog_and_live_pushes() {
    let broker = start_broker(test_config()).await;

    let mut producer = Client::connect(broker.addr).await.unwrap();
    producer.create_queue("orders", 5, 60).await.unwrap();
    producer.send_message("orders", "first order").await.unwrap();
    producer.send_message("orders", "second order").await.unwrap();

    let consumer = Client::connect(broker.addr).await.unwrap();
    let mut sub = consumer.open_queue("orders").await.unwrap();
    assert_eq!(sub.queue(), "orders");

    producer.send_message("orders", "third order").await.unwrap();

    for expected in ["first order", "second order", "third order"] {
        let got = timeout(STEP, sub.next_message()).await.unwrap().unwrap();
        assert_eq!(got.as_deref(), Some(expected));
    }
}

#[tokio::test]
async fn client_reports_refusals() {
    let broker = start_broker(test_config()).await;
    let mut client = Client::connect(broker.addr).await.unwrap();

    client.create_queue("q", 1, 60).await.unwrap();
    assert!(matches!(
        client.create_queue("q", 1, 60).await,
        Err(ClientError::Rejected)
    ));

    client.send_message("q", "one").await.unwrap();
    assert!(matches!(
        client.send_message("q", "two").await,
        Err(ClientError::Rejected)
    ));

    assert!(matches!(
        client.send_message("q", "multi\nline").await,
        Err(ClientError::InvalidArgument(_))
    ));
    assert!(matches!(
        client.create_queue("bad name", 1, 1).await,
        Err(ClientError::InvalidArgument(_))
    ));

    let other = Client::connect(broker.addr).await.unwrap();
    assert!(matches!(
        other.open_queue("missing").await,
        Err(ClientError::Rejected)
    ));
}

#[tokio::test]
async fn subscription_ends_when_broker_shuts_down() {
    let broker = start_broker(test_config()).await;
    let mut client = Client::connect(broker.addr).await.unwrap();
    client.create_queue("q", 1, 60).await.unwrap();

    let consumer = Client::connect(broker.addr).await.unwrap();
    let mut sub = consumer.open_queue("q").await.unwrap();

    drop(broker);

    let end = timeout(STEP, sub.next_message()).await.unwrap();
    assert!(matches!(end, Ok(None) | Err(_)));

    // nothing is listening any more
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(client.send_message("q", "late").await.is_err());
}
