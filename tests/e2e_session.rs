//! End-to-end session tests.
//!
//! These tests run complete sessions over real TCP connections: framing,
//! the buffer-lifecycle decorator, request routing and the queued writer.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use peerwire::prelude::*;
use peerwire::transport::FRAME_HEADER_SIZE;
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::time::timeout;

type Client = ClearBuffersAfterReadDecorator<FramedMessageClient<TcpNetworkClient>>;

async fn decorated(tcp: TcpNetworkClient) -> Arc<Client> {
    Arc::new(ClearBuffersAfterReadDecorator::new(FramedMessageClient::new(tcp)).unwrap())
}

/// Read the next message, failing the test on timeout or disconnect.
async fn next_message(client: &Client) -> peerwire::transport::NetworkIncomingMessage {
    timeout(
        Duration::from_secs(5),
        client.read_message(&CancellationToken::new()),
    )
    .await
    .expect("read timed out")
    .unwrap()
    .completed()
    .flatten()
    .expect("peer disconnected")
}

/// Server accepting one connection and answering `Ping` with `Pong`.
async fn spawn_ping_server(
    requests: Arc<AtomicUsize>,
) -> (SocketAddr, tokio::task::JoinHandle<peerwire::Result<()>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = tokio::spawn(async move {
        let (stream, _) = listener.accept().await?;
        let tcp = TcpNetworkClient::from_stream(stream).await?;
        let details = tcp.connection_details().ok_or(PeerError::NotConnected)?;
        let client = decorated(tcp).await;

        let (service, outbound) = QueuedSendService::new(OperationKinds::RESPONSES_AND_EVENTS);
        let handler = move |sender: &SessionSender, request: &RequestMessage, _: &MessageParameters| {
            requests.fetch_add(1, Ordering::SeqCst);
            if request.payload().is("Ping") {
                let seq = request.payload().field("seq").unwrap_or(Value::Null);
                let pong = Payload::new("Pong").with_field("seq", seq);
                let result = sender.send_response(pong, DeliveryMethod::ReliableOrdered);
                assert!(matches!(result, Ok(SendResult::Enqueued)));
            }
        };
        let session = PeerSession::client(Arc::new(handler), Arc::new(service), details);

        let token = CancellationToken::new();
        let writer = tokio::spawn(run_writer(Arc::clone(&client), outbound, token.clone()));
        let result = drive_session(&session, &*client, &token).await;
        token.cancel();
        let _ = writer.await;
        result
    });

    (addr, handle)
}

/// Test Ping request reaches the handler once and Pong comes back
#[tokio::test]
async fn test_ping_pong_over_tcp() {
    let requests = Arc::new(AtomicUsize::new(0));
    let (addr, server) = spawn_ping_server(Arc::clone(&requests)).await;

    let tcp = TcpNetworkClient::new();
    assert!(tcp
        .connect_async(&addr.ip().to_string(), addr.port())
        .await
        .unwrap());
    let client = decorated(tcp).await;

    client
        .write_message(peerwire::transport::OutgoingMessage {
            envelope: Envelope::request(Payload::new("Ping").with_field("seq", 41)),
            parameters: MessageParameters::default(),
        })
        .await
        .unwrap();

    let reply = next_message(&client).await;
    assert_eq!(reply.envelope.operation_kind(), OperationKind::Response);
    assert!(reply.envelope.payload().is("Pong"));
    assert_eq!(reply.envelope.payload().field("seq"), Some(Value::from(41)));
    assert_eq!(reply.parameters.delivery_method, DeliveryMethod::ReliableOrdered);
    assert_eq!(requests.load(Ordering::SeqCst), 1);

    client.disconnect_async(Duration::ZERO).await.unwrap();
    timeout(Duration::from_secs(5), server)
        .await
        .expect("server did not notice the disconnect")
        .unwrap()
        .unwrap();
}

/// Test events are dispatched to subscribers and do not reach the request hook
#[tokio::test]
async fn test_events_routed_by_subscription() {
    let requests = Arc::new(AtomicUsize::new(0));
    let (addr, server) = spawn_ping_server(Arc::clone(&requests)).await;

    let tcp = TcpNetworkClient::new();
    assert!(tcp.connect_async("127.0.0.1", addr.port()).await.unwrap());
    let client = decorated(tcp).await;

    for envelope in [
        Envelope::event(Payload::new("Chat")),
        Envelope::request(Payload::new("Ping")),
    ] {
        client
            .write_message(peerwire::transport::OutgoingMessage {
                envelope,
                parameters: MessageParameters::new(DeliveryMethod::ReliableOrdered),
            })
            .await
            .unwrap();
    }

    let reply = next_message(&client).await;
    assert!(reply.envelope.payload().is("Pong"));
    assert_eq!(requests.load(Ordering::SeqCst), 1);

    client.disconnect_async(Duration::ZERO).await.unwrap();
    let _ = timeout(Duration::from_secs(5), server).await;
}

/// Frame with a valid header and checksum whose body decodes to no envelope
fn frame_without_payload() -> Vec<u8> {
    let body = br#"{"kind":"REQUEST"}"#;
    let mut frame = Vec::with_capacity(FRAME_HEADER_SIZE + body.len());
    frame.extend_from_slice(&(body.len() as u32).to_be_bytes());
    frame.push(0);
    frame.push(DeliveryMethod::ReliableOrdered.as_u8());
    frame.push(0);
    frame.extend_from_slice(&crc32fast::hash(body).to_be_bytes());
    frame.extend_from_slice(body);
    frame
}

/// Test a malformed frame is skipped and the session keeps answering
#[tokio::test]
async fn test_session_survives_malformed_frame() {
    let requests = Arc::new(AtomicUsize::new(0));
    let (addr, server) = spawn_ping_server(Arc::clone(&requests)).await;

    let tcp = TcpNetworkClient::new();
    assert!(tcp.connect_async("127.0.0.1", addr.port()).await.unwrap());
    tcp.write_all_async(&frame_without_payload()).await.unwrap();
    let client = decorated(tcp).await;

    client
        .write_message(peerwire::transport::OutgoingMessage {
            envelope: Envelope::request(Payload::new("Ping").with_field("seq", 7)),
            parameters: MessageParameters::default(),
        })
        .await
        .unwrap();

    let reply = next_message(&client).await;
    assert!(reply.envelope.payload().is("Pong"));
    assert_eq!(reply.envelope.payload().field("seq"), Some(Value::from(7)));
    assert_eq!(requests.load(Ordering::SeqCst), 1);

    client.disconnect_async(Duration::ZERO).await.unwrap();
    timeout(Duration::from_secs(5), server)
        .await
        .expect("server did not notice the disconnect")
        .unwrap()
        .unwrap();
}

/// Send service stub with toggleable transport permission that counts calls
#[derive(Default)]
struct CountingService {
    transport_allows: AtomicBool,
    calls: AtomicUsize,
}

impl NetworkMessageSendService for CountingService {
    fn can_send(&self, _kind: OperationKind) -> bool {
        self.transport_allows.load(Ordering::SeqCst)
    }

    fn try_send_message(
        &self,
        _kind: OperationKind,
        _payload: Payload,
        _parameters: MessageParameters,
    ) -> peerwire::Result<SendResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(SendResult::Sent)
    }
}

fn local_details() -> ConnectionDetails {
    let addr: SocketAddr = "127.0.0.1:9000".parse().unwrap();
    ConnectionDetails::new(addr, addr)
}

fn no_requests(_: &SessionSender, _: &RequestMessage, _: &MessageParameters) {}

/// Test send_event with an absent payload fails before the transport is touched
#[test]
fn test_send_event_absent_payload() {
    let service = Arc::new(CountingService::default());
    service.transport_allows.store(true, Ordering::SeqCst);
    let session = PeerSession::client(Arc::new(no_requests), service.clone(), local_details());

    let err = session
        .send_event(None, DeliveryMethod::ReliableOrdered)
        .unwrap_err();
    assert!(err.is_invalid_argument());
    assert_eq!(service.calls.load(Ordering::SeqCst), 0);

    assert_eq!(
        session
            .send_event(Payload::new("Tick"), DeliveryMethod::ReliableOrdered)
            .unwrap(),
        SendResult::Sent
    );
    assert_eq!(service.calls.load(Ordering::SeqCst), 1);
}

/// Test the client session permission matrix follows the transport on every call
#[test]
fn test_client_session_can_send_follows_transport() {
    let service = Arc::new(CountingService::default());
    let session = PeerSession::client(Arc::new(no_requests), service.clone(), local_details());

    for allowed in [false, true, false, true] {
        service.transport_allows.store(allowed, Ordering::SeqCst);
        assert_eq!(session.can_send(OperationKind::Response), allowed);
        assert_eq!(session.can_send(OperationKind::Event), allowed);
        assert!(!session.can_send(OperationKind::Request));
    }
}

/// Test a generic peer sends requests through the peer-facing contract
#[tokio::test]
async fn test_peer_payload_send_service_round_trip() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        decorated(TcpNetworkClient::from_stream(stream).await.unwrap()).await
    });

    let tcp = TcpNetworkClient::new();
    assert!(tcp.connect_async("127.0.0.1", port).await.unwrap());
    let client = decorated(tcp).await;
    let accepted = server.await.unwrap();

    let (service, outbound) = QueuedSendService::new(OperationKinds::REQUESTS);
    let token = CancellationToken::new();
    let writer = tokio::spawn(run_writer(Arc::clone(&client), outbound, token.clone()));

    let result = service
        .send_message(Payload::new("Login").with_field("user", "ada"), DeliveryMethod::ReliableUnordered)
        .await;
    assert_eq!(result, SendResult::Enqueued);

    let received = next_message(&accepted).await;
    assert_eq!(received.envelope.operation_kind(), OperationKind::Request);
    assert_eq!(
        received.parameters.delivery_method,
        DeliveryMethod::ReliableUnordered
    );

    token.cancel();
    writer.await.unwrap().unwrap();
}
