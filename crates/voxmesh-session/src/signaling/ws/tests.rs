use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message as WsMessage;

use super::*;
use crate::protocol::InboundMessage;

fn config_for(addr: SocketAddr) -> WsConfig {
    WsConfig {
        url: format!("ws://{addr}"),
        connect_timeout_secs: 5,
        reconnect_delay_secs: 1,
        max_reconnect_delay_secs: 2,
        heartbeat_interval_secs: 30,
    }
}

#[test]
fn display_url_strips_query() {
    let config = WsConfig {
        url: "wss://voice.example.com/ws?token=secret".into(),
        connect_timeout_secs: 15,
        reconnect_delay_secs: 1,
        max_reconnect_delay_secs: 30,
        heartbeat_interval_secs: 25,
    };
    assert_eq!(config.display_url(), "wss://voice.example.com/ws");
}

#[test]
fn subscriber_slot_release_is_token_scoped() {
    let slot = SubscriberSlot::default();
    let (tx, _rx) = mpsc::channel(1);
    slot.install(Subscriber {
        token: 1,
        room_id: "a".into(),
        tx: tx.clone(),
    });
    slot.install(Subscriber {
        token: 2,
        room_id: "b".into(),
        tx,
    });

    assert!(!slot.release(1));
    assert_eq!(slot.current().map(|(room, _)| room), Some("b".to_string()));
    assert!(slot.release(2));
    assert!(slot.current().is_none());
}

#[tokio::test]
async fn exchanges_frames_and_reports_lost_connection() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let channel = WsSignalingChannel::connect(config_for(addr));
    let mut sub = channel.subscribe("room-1");

    let (stream, _) = listener.accept().await.unwrap();
    let mut server = tokio_tungstenite::accept_async(stream).await.unwrap();

    channel
        .send(OutboundMessage::Join {
            room_id: "room-1".into(),
        })
        .await
        .unwrap();
    let frame = loop {
        match server.next().await.unwrap().unwrap() {
            WsMessage::Text(text) => break text.to_string(),
            _ => continue,
        }
    };
    let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
    assert_eq!(value["event"], "join");
    assert_eq!(value["payload"]["roomId"], "room-1");
    assert!(channel.is_connected());

    let inbound = r#"{"event":"auto-join","payload":{"roomId":"room-1"}}"#.to_string();
    server.send(WsMessage::Text(inbound.into())).await.unwrap();
    let msg = tokio::time::timeout(Duration::from_secs(5), sub.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        msg,
        InboundMessage::AutoJoin {
            room_id: "room-1".into()
        }
    );

    drop(server);
    let msg = tokio::time::timeout(Duration::from_secs(5), sub.recv())
        .await
        .unwrap()
        .unwrap();
    match msg {
        InboundMessage::Error { message, code } => {
            assert_eq!(message, CONNECTION_LOST_MESSAGE);
            assert!(code.is_none());
        }
        other => panic!("expected error, got {other:?}"),
    }
    assert!(!channel.is_connected());

    channel.disconnect().await;
}

#[tokio::test]
async fn dropping_subscription_releases_slot() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let channel = WsSignalingChannel::connect(config_for(listener.local_addr().unwrap()));

    let sub = channel.subscribe("room-1");
    assert!(channel.subscriber.current().is_some());
    drop(sub);
    assert!(channel.subscriber.current().is_none());

    channel.disconnect().await;
}
