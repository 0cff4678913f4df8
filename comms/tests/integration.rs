use comms::{Msg, SignalSource, SocketEvent};
use futures::SinkExt;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::{
    Message,
    handshake::server::{Request, Response},
};

#[tokio::test]
async fn ws_source_yields_text_frames_then_closes() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();

        let mut query = None;
        let mut ws = tokio_tungstenite::accept_hdr_async(stream, |req: &Request, resp: Response| {
            query = req.uri().query().map(str::to_owned);
            Ok(resp)
        })
        .await
        .unwrap();

        ws.send(Message::Text("trigger_learning_round_7".into()))
            .await
            .unwrap();
        ws.send(Message::Binary(vec![1, 2, 3])).await.unwrap();
        ws.send(Message::Text("hello".into())).await.unwrap();
        ws.close(None).await.unwrap();

        query
    });

    let mut source = comms::connect(&addr.to_string(), "header.payload.sig")
        .await
        .unwrap();

    let SocketEvent::Text(first) = source.next_event().await else {
        panic!("expected a text frame");
    };
    assert_eq!(Msg::parse(&first), Msg::TriggerRound("7"));

    // Binary frames are skipped.
    assert_eq!(source.next_event().await, SocketEvent::Text("hello".into()));

    assert!(matches!(source.next_event().await, SocketEvent::Closed(_)));
    assert!(matches!(source.next_event().await, SocketEvent::Closed(_)));

    let query = server.await.unwrap();
    assert_eq!(query.as_deref(), Some("token=header.payload.sig"));
}

#[tokio::test]
async fn connecting_to_a_dead_endpoint_fails() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    assert!(comms::connect(&addr.to_string(), "t").await.is_err());
}
