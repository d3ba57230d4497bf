use std::collections::HashMap;
use std::time::Duration;

use anyhow::Result;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use codec::{ProtocolVersion, decode_header, header_len};
use rcon_session::{Session, SessionOptions};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

async fn fake_peer() -> Result<(TcpListener, String, u16)> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    Ok((listener, addr.ip().to_string(), addr.port()))
}

async fn read_v2_request(stream: &mut TcpStream) -> Result<(u32, serde_json::Value)> {
    let mut header = [0u8; 8];
    stream.read_exact(&mut header).await?;
    let (id, len) = decode_header(&header);
    let mut body = vec![0u8; len as usize];
    stream.read_exact(&mut body).await?;
    Ok((id, serde_json::from_slice(&body)?))
}

async fn write_v2_response(
    stream: &mut TcpStream,
    request_id: u32,
    status: u16,
    content_body: &str,
) -> Result<()> {
    let envelope = serde_json::json!({
        "name": "",
        "version": 2,
        "statusCode": status,
        "statusMessage": if status == 200 { "OK" } else { "Error" },
        "contentBody": content_body,
    });
    let body = serde_json::to_vec(&envelope)?;
    stream.write_all(&request_id.to_le_bytes()).await?;
    stream.write_all(&(body.len() as u32).to_le_bytes()).await?;
    stream.write_all(&body).await?;
    Ok(())
}

#[tokio::test]
async fn scenario_a_handshake_and_login() -> Result<()> {
    let (listener, host, port) = fake_peer().await?;

    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();

        let (id, body) = read_v2_request(&mut stream).await.unwrap();
        assert_eq!(body["Name"], "ServerConnect");
        assert_eq!(body["AuthToken"], " ");
        write_v2_response(&mut stream, id, 200, &BASE64.encode(b"abcd"))
            .await
            .unwrap();

        let mut header = [0u8; 8];
        stream.read_exact(&mut header).await.unwrap();
        let (_, len) = decode_header(&header);
        let mut ciphered = vec![0u8; len as usize];
        stream.read_exact(&mut ciphered).await.unwrap();
        let login_body = codec::xor(b"abcd", &ciphered, 0).unwrap();
        let login: serde_json::Value = serde_json::from_slice(&login_body).unwrap();
        assert_eq!(login["Name"], "Login");
        assert_eq!(login["ContentBody"], "hunter2");

        let reply = serde_json::to_vec(&serde_json::json!({
            "name": "", "version": 2, "statusCode": 200, "statusMessage": "OK", "contentBody": "TOKEN",
        }))
        .unwrap();
        let ciphered_reply = codec::xor(b"abcd", &reply, 0).unwrap();
        stream.write_all(&2u32.to_le_bytes()).await.unwrap();
        stream
            .write_all(&(ciphered_reply.len() as u32).to_le_bytes())
            .await
            .unwrap();
        stream.write_all(&ciphered_reply).await.unwrap();

        stream
    });

    let session = Session::connect(SessionOptions {
        host,
        port,
        password: "hunter2".to_string(),
        version: ProtocolVersion::V2,
        connect_timeout: Duration::from_secs(2),
        request_timeout: Duration::from_secs(2),
        allow_concurrent_requests: false,
        on_connection_lost: None,
    })
    .await?;

    assert!(session.is_connected());
    server.await?;
    Ok(())
}

/// Scenario B: three concurrent `execute` calls get their own ids in issue
/// order, but the peer answers them out of order; each caller must still
/// resolve to its own response, correlated by `request_id` rather than by
/// send/receive order.
#[tokio::test]
async fn scenario_b_out_of_order_responses_correlate_by_request_id() -> Result<()> {
    let (listener, host, port) = fake_peer().await?;

    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();

        let (id, _) = read_v2_request(&mut stream).await.unwrap();
        write_v2_response(&mut stream, id, 200, &BASE64.encode(b"k"))
            .await
            .unwrap();
        let (id, _) = read_v2_request(&mut stream).await.unwrap();
        write_v2_response(&mut stream, id, 200, "TOKEN").await.unwrap();

        let mut ids_by_name = HashMap::new();
        for _ in 0..3 {
            let (id, body) = read_v2_request(&mut stream).await.unwrap();
            ids_by_name.insert(body["Name"].as_str().unwrap().to_string(), id);
        }

        for name in ["CommandC", "CommandA", "CommandB"] {
            let id = ids_by_name[name];
            write_v2_response(&mut stream, id, 200, &format!("reply-to-{name}"))
                .await
                .unwrap();
        }
    });

    let session = Session::connect(SessionOptions {
        host,
        port,
        password: "pw".to_string(),
        version: ProtocolVersion::V2,
        connect_timeout: Duration::from_secs(2),
        request_timeout: Duration::from_secs(2),
        allow_concurrent_requests: true,
        on_connection_lost: None,
    })
    .await?;

    let (a, b, c) = tokio::join!(
        session.execute("CommandA", ProtocolVersion::V2, String::new()),
        session.execute("CommandB", ProtocolVersion::V2, String::new()),
        session.execute("CommandC", ProtocolVersion::V2, String::new()),
    );

    assert_eq!(a?.content_body, "reply-to-CommandA");
    assert_eq!(b?.content_body, "reply-to-CommandB");
    assert_eq!(c?.content_body, "reply-to-CommandC");

    server.await?;
    Ok(())
}

#[tokio::test]
async fn scenario_d_connection_lost_mid_flight() -> Result<()> {
    let (listener, host, port) = fake_peer().await?;

    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let (id, _) = read_v2_request(&mut stream).await.unwrap();
        write_v2_response(&mut stream, id, 200, &BASE64.encode(b"k")).await.unwrap();
        let (_, _) = read_v2_request(&mut stream).await.unwrap();
        write_v2_response(&mut stream, 2, 200, "TOKEN").await.unwrap();

        // A pending command is read but never answered; the peer then drops
        // the connection with the request still in flight.
        let _ = read_v2_request(&mut stream).await.unwrap();
        drop(stream);
    });

    let session = Session::connect(SessionOptions {
        host,
        port,
        password: "pw".to_string(),
        version: ProtocolVersion::V2,
        connect_timeout: Duration::from_secs(2),
        request_timeout: Duration::from_secs(2),
        allow_concurrent_requests: true,
        on_connection_lost: None,
    })
    .await?;

    let result = session
        .execute("GetPlayers", ProtocolVersion::V2, String::new())
        .await;
    assert!(matches!(result, Err(rcon_session::Error::ConnectionLost(_))));
    assert!(!session.is_connected());

    server.await?;
    Ok(())
}

#[tokio::test]
async fn scenario_f_v1_handshake_strips_xor_seed() -> Result<()> {
    let (listener, host, port) = fake_peer().await?;

    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();

        let mut buf = vec![0u8; 256];
        let n = stream.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"ServerConnect");

        // Seed bytes plus the ServerConnect reply, sent as one write so the
        // client must strip exactly the first 4 bytes.
        let mut first_write = vec![0xDE, 0xAD, 0xBE, 0xEF];
        first_write.extend_from_slice(BASE64.encode(b"abcd").as_bytes());
        stream.write_all(&first_write).await.unwrap();

        let n = stream.read(&mut buf).await.unwrap();
        let decoded = codec::xor(b"abcd", &buf[..n], 0).unwrap();
        assert_eq!(decoded, b"Login pw");

        let ciphered_token = codec::xor(b"abcd", b"TOKEN", 0).unwrap();
        stream.write_all(&ciphered_token).await.unwrap();
        stream
    });

    let session = Session::connect(SessionOptions {
        host,
        port,
        password: "pw".to_string(),
        version: ProtocolVersion::V1,
        connect_timeout: Duration::from_secs(2),
        request_timeout: Duration::from_secs(2),
        allow_concurrent_requests: false,
        on_connection_lost: None,
    })
    .await?;

    assert!(session.is_connected());
    server.await?;
    Ok(())
}
