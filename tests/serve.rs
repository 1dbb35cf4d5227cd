use assert_cmd::prelude::*;
use futures_util::{SinkExt, StreamExt};
use secp256k1::{Keypair, Message, Secp256k1};
use sha2::{Digest, Sha256};
use std::{fs, net::TcpListener, process::Command, time::Duration};
use tempfile::TempDir;
use tokio::time::sleep;
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;

fn free_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

fn signed_event_json(kind: i64, created_at: i64) -> serde_json::Value {
    let secp = Secp256k1::new();
    let kp = Keypair::from_seckey_slice(&secp, &[1u8; 32]).unwrap();
    let pubkey = hex::encode(kp.x_only_public_key().0.serialize());
    let tags: Vec<Vec<String>> = vec![];
    let arr = serde_json::json!([0, pubkey, created_at, kind, tags, ""]);
    let data = serde_json::to_vec(&arr).unwrap();
    let hash = Sha256::digest(&data);
    let id = hex::encode(hash);
    let msg = Message::from_digest_slice(&hash).unwrap();
    let sig = secp.sign_schnorr_no_aux_rand(&msg, &kp);
    serde_json::json!({
        "id": id,
        "pubkey": pubkey,
        "created_at": created_at,
        "kind": kind,
        "tags": tags,
        "content": "",
        "sig": hex::encode(sig.as_ref()),
    })
}

#[tokio::test]
async fn serve_cli_speaks_nostr() {
    let dir = TempDir::new().unwrap();
    let port = free_port();
    let env_path = dir.path().join("env");
    fs::write(
        &env_path,
        format!(
            "STORE_ROOT={}\nBIND=127.0.0.1:{}\nRELAY_NAME=itest\n",
            dir.path().display(),
            port
        ),
    )
    .unwrap();

    let mut child = Command::cargo_bin("castr")
        .unwrap()
        .args(["--env", env_path.to_str().unwrap(), "serve"])
        .spawn()
        .unwrap();

    // allow the server to start
    sleep(Duration::from_millis(300)).await;

    // HTTP health check
    let url = format!("http://127.0.0.1:{}/healthz", port);
    let body: serde_json::Value = reqwest::get(&url).await.unwrap().json().await.unwrap();
    assert_eq!(body["status"], "ok");

    // NIP-11 information document
    let info: serde_json::Value = reqwest::Client::new()
        .get(format!("http://127.0.0.1:{}/", port))
        .header("accept", "application/nostr+json")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(info["name"], "itest");
    assert_eq!(info["software"], "castr");

    // publish over WebSocket, then read it back
    let ws_url = format!("ws://127.0.0.1:{}/", port);
    let (mut ws, _) = tokio_tungstenite::connect_async(&ws_url).await.unwrap();
    let ev = signed_event_json(1, 100);
    ws.send(WsMessage::Text(
        serde_json::json!(["EVENT", ev]).to_string(),
    ))
    .await
    .unwrap();
    let mut got_ok = false;
    while let Some(msg) = ws.next().await {
        if let WsMessage::Text(t) = msg.unwrap() {
            let v: serde_json::Value = serde_json::from_str(&t).unwrap();
            if v[0] == "OK" {
                assert_eq!(v[1], ev["id"]);
                assert_eq!(v[2], true);
                got_ok = true;
                break;
            }
        }
    }
    assert!(got_ok);

    let req = serde_json::json!(["REQ", "s", { "kinds": [1] }]);
    ws.send(WsMessage::Text(req.to_string())).await.unwrap();
    let mut ids = vec![];
    let mut got_eose = false;
    while let Some(msg) = ws.next().await {
        if let WsMessage::Text(t) = msg.unwrap() {
            let v: serde_json::Value = serde_json::from_str(&t).unwrap();
            match v[0].as_str() {
                Some("EVENT") => ids.push(v[2]["id"].as_str().unwrap().to_string()),
                Some("EOSE") => {
                    got_eose = true;
                    break;
                }
                _ => {}
            }
        }
    }
    assert!(got_eose);
    assert_eq!(ids, vec![ev["id"].as_str().unwrap().to_string()]);

    child.kill().unwrap();
    let _ = child.wait();
}

#[test]
fn serve_cli_fails_on_taken_port() {
    let dir = TempDir::new().unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let env_path = dir.path().join("env");
    fs::write(
        &env_path,
        format!(
            "STORE_ROOT={}\nBIND=127.0.0.1:{}\n",
            dir.path().display(),
            port
        ),
    )
    .unwrap();

    Command::cargo_bin("castr")
        .unwrap()
        .args(["--env", env_path.to_str().unwrap(), "serve"])
        .assert()
        .failure();
}
