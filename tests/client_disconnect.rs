//! Client-disconnect detection tests.
//!
//! The gateway learns about a disconnect when axum drops the response body;
//! these tests cover the one-way phase transitions and the drop-triggered
//! signal.

use claude_compat_gateway::gateway::disconnect::{ClientPhase, ClientWatch, WatchedBody};
use futures::StreamExt;
use std::time::Duration;

fn one_chunk() -> impl futures::Stream<Item = Result<bytes::Bytes, std::io::Error>> + Unpin {
    futures::stream::iter(vec![Ok(bytes::Bytes::from("x"))])
}

#[test]
fn test_phase_transitions_are_one_way() {
    let watch = ClientWatch::new();
    assert_eq!(watch.phase(), ClientPhase::Streaming);
    assert!(!watch.is_disconnected());

    // Draining first makes a later disconnect a no-op
    watch.mark_drained();
    watch.mark_disconnected();
    assert_eq!(watch.phase(), ClientPhase::Drained);
    assert!(!watch.is_disconnected());

    // And the other way around
    let watch = ClientWatch::new();
    watch.mark_disconnected();
    watch.mark_drained();
    assert_eq!(watch.phase(), ClientPhase::Disconnected);
    assert!(watch.is_disconnected());
}

#[tokio::test]
async fn test_body_drop_reports_disconnect() {
    let watch = ClientWatch::new();

    {
        let _body = WatchedBody::new(one_chunk(), watch.clone());
        assert_eq!(watch.phase(), ClientPhase::Streaming);

        // _body goes out of scope here, mid-stream
    }

    assert_eq!(watch.phase(), ClientPhase::Disconnected);
}

#[tokio::test]
async fn test_drained_body_drop_is_not_a_disconnect() {
    let watch = ClientWatch::new();

    {
        let mut body = WatchedBody::new(one_chunk(), watch.clone());
        while body.next().await.is_some() {}
        watch.mark_drained();
    }

    assert_eq!(watch.phase(), ClientPhase::Drained);
    assert!(!watch.is_disconnected());
}

#[tokio::test]
async fn test_watched_body_forwards_items() {
    let watch = ClientWatch::new();
    let mut body = WatchedBody::new(one_chunk(), watch.clone());

    let item = body.next().await.unwrap().unwrap();
    assert_eq!(&item[..], b"x");
    assert!(body.next().await.is_none());
}

#[tokio::test]
async fn test_disconnected_future_resolves_on_disconnect() {
    let watch = ClientWatch::new();

    let waiter = {
        let watch = watch.clone();
        tokio::spawn(async move { watch.disconnected().await })
    };

    tokio::time::sleep(Duration::from_millis(10)).await;
    watch.mark_disconnected();

    tokio::time::timeout(Duration::from_secs(1), waiter)
        .await
        .expect("disconnect signal observed")
        .unwrap();
}

#[tokio::test]
async fn test_disconnected_future_pends_after_drain() {
    let watch = ClientWatch::new();
    watch.mark_drained();

    let result =
        tokio::time::timeout(Duration::from_millis(50), watch.disconnected()).await;
    assert!(result.is_err(), "drained stream must not look like a disconnect");
}
