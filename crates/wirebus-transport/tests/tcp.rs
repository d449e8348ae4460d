//! Integration tests for the TCP transport.
//!
//! These spin up a real listener and client over loopback to verify that
//! bytes actually flow in both directions and that EOF is reported as a
//! clean close.

use tokio::io::{AsyncReadExt, AsyncWriteExt};

use wirebus_transport::{
    Connection, TcpConnection, TcpTransport, Transport,
};

/// Binds a transport on a random loopback port and returns it with the
/// address a client can dial.
async fn bind_transport() -> (TcpTransport, String) {
    let transport = TcpTransport::bind("127.0.0.1:0")
        .await
        .expect("should bind");
    let addr = transport
        .local_addr()
        .expect("should have local addr")
        .to_string();
    (transport, addr)
}

#[tokio::test]
async fn test_tcp_accept_and_send_receive() {
    let (mut transport, addr) = bind_transport().await;

    let server_handle = tokio::spawn(async move {
        transport.accept().await.expect("should accept")
    });

    let mut client = tokio::net::TcpStream::connect(&addr)
        .await
        .expect("client should connect");
    let server_conn = server_handle.await.expect("task should complete");

    assert!(server_conn.id().into_inner() > 0);

    // --- Server sends, client receives ---
    server_conn
        .send(b"hello from server")
        .await
        .expect("send should succeed");

    let mut buf = [0u8; 64];
    let n = client.read(&mut buf).await.unwrap();
    assert_eq!(&buf[..n], b"hello from server");

    // --- Client sends, server receives ---
    client.write_all(b"hello from client").await.unwrap();

    let received = server_conn
        .recv()
        .await
        .expect("recv should succeed")
        .expect("should have data");
    assert_eq!(received, b"hello from client");

    server_conn.close().await.expect("close should succeed");
}

#[tokio::test]
async fn test_tcp_recv_returns_none_on_peer_close() {
    let (mut transport, addr) = bind_transport().await;

    let server_handle = tokio::spawn(async move {
        transport.accept().await.expect("should accept")
    });

    let client = tokio::net::TcpStream::connect(&addr)
        .await
        .expect("client should connect");
    let server_conn = server_handle.await.unwrap();

    // Client drops its socket entirely.
    drop(client);

    let result = server_conn.recv().await.expect("recv should not error");
    assert!(result.is_none(), "should return None on peer close");
}

#[tokio::test]
async fn test_tcp_connect_pairs_with_accept() {
    // Both ends through our own types: TcpConnection::connect on the
    // client side, Transport::accept on the server side.
    let (mut transport, addr) = bind_transport().await;

    let server_handle = tokio::spawn(async move {
        transport.accept().await.expect("should accept")
    });

    let client_conn = TcpConnection::connect(&addr)
        .await
        .expect("should connect");
    let server_conn = server_handle.await.unwrap();

    assert_ne!(client_conn.id(), server_conn.id());

    client_conn.send(b"ping").await.unwrap();
    let got = server_conn.recv().await.unwrap().unwrap();
    assert_eq!(got, b"ping");

    server_conn.send(b"pong").await.unwrap();
    let got = client_conn.recv().await.unwrap().unwrap();
    assert_eq!(got, b"pong");
}

#[tokio::test]
async fn test_tcp_connect_to_closed_port_fails() {
    // Bind and immediately drop to get a port with no listener.
    let (transport, addr) = bind_transport().await;
    drop(transport);

    let result = TcpConnection::connect(&addr).await;
    assert!(result.is_err(), "connect to dead port should fail");
}
