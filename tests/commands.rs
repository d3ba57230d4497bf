use anyhow::Result;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use rcon_client::{Connection, ProtocolVersion, RconCommands};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

async fn read_request(stream: &mut TcpStream, key: Option<&[u8]>) -> (u32, serde_json::Value) {
    let mut header = [0u8; 8];
    stream.read_exact(&mut header).await.unwrap();
    let (id, len) = codec::decode_header(&header);
    let mut body = vec![0u8; len as usize];
    stream.read_exact(&mut body).await.unwrap();
    if let Some(key) = key {
        body = codec::xor(key, &body, 0).unwrap();
    }
    (id, serde_json::from_slice(&body).unwrap())
}

async fn write_response(
    stream: &mut TcpStream,
    id: u32,
    status: u16,
    message: &str,
    content_body: &str,
    key: Option<&[u8]>,
) {
    let envelope = serde_json::json!({
        "name": "KickPlayer", "version": 2, "statusCode": status,
        "statusMessage": message, "contentBody": content_body,
    });
    let mut body = serde_json::to_vec(&envelope).unwrap();
    if let Some(key) = key {
        body = codec::xor(key, &body, 0).unwrap();
    }
    stream.write_all(&id.to_le_bytes()).await.unwrap();
    stream.write_all(&(body.len() as u32).to_le_bytes()).await.unwrap();
    stream.write_all(&body).await.unwrap();
}

/// Scenario C: `kick_player` maps a `400` status to `Ok(false)` instead of
/// raising, but a `500` still raises `Error::Command`.
#[tokio::test]
async fn kick_player_maps_400_to_false_and_500_to_error() -> Result<()> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let key: &[u8] = b"abcd";

    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();

        let (id, _) = read_request(&mut stream, None).await;
        write_response(&mut stream, id, 200, "OK", &BASE64.encode(key), None).await;

        let (id, _) = read_request(&mut stream, Some(key)).await;
        write_response(&mut stream, id, 200, "OK", "TOKEN", Some(key)).await;

        let (id, body) = read_request(&mut stream, Some(key)).await;
        assert_eq!(body["Name"], "KickPlayer");
        write_response(&mut stream, id, 400, "Player not found", "", Some(key)).await;

        let (id, _) = read_request(&mut stream, Some(key)).await;
        write_response(&mut stream, id, 500, "Internal error", "", Some(key)).await;
    });

    let connection = Connection::new(
        addr.ip().to_string(),
        addr.port(),
        "pw".to_string(),
        ProtocolVersion::V2,
    );

    let not_found = connection
        .kick_player("xyz", "bye", ProtocolVersion::V2)
        .await?;
    assert!(!not_found);

    let err = connection
        .kick_player("xyz", "bye", ProtocolVersion::V2)
        .await;
    assert!(matches!(err, Err(rcon_client::Error::Command { .. })));

    server.await?;
    Ok(())
}
