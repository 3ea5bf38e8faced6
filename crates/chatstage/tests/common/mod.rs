//! Test utilities and common setup.
#![allow(dead_code)]

use std::time::Duration;

use axum::Router;
use axum::body::Body;
use chatstage::{ChatApp, ServerOptions};
use http_body_util::BodyExt;
use serde_json::Value;

/// Create a fresh app and a router serving it.
pub fn test_app() -> (ChatApp, Router) {
    let app = ChatApp::new();
    let router = app.router(&ServerOptions::default());
    (app, router)
}

/// Create an app whose handler replies with `echo:<content>`.
pub fn echo_app() -> (ChatApp, Router) {
    let (app, router) = test_app();
    app.on_chat_message(|app, message| async move {
        app.reply(format!("echo:{}", message.content));
        Ok::<_, anyhow::Error>(())
    });
    (app, router)
}

/// Read `count` SSE frames from a streaming body and decode their JSON payloads.
pub async fn read_sse_events(body: &mut Body, count: usize) -> Vec<Value> {
    let mut buffer = String::new();
    let mut events = Vec::new();

    while events.len() < count {
        let frame = tokio::time::timeout(Duration::from_secs(5), body.frame())
            .await
            .expect("timed out waiting for SSE frame")
            .expect("stream ended early")
            .expect("body error");
        if let Ok(data) = frame.into_data() {
            buffer.push_str(std::str::from_utf8(&data).unwrap());
        }

        while let Some(end) = buffer.find("\n\n") {
            let block: String = buffer.drain(..end + 2).collect();
            for line in block.lines() {
                if let Some(json) = line.strip_prefix("data:") {
                    events.push(serde_json::from_str(json.trim_start()).unwrap());
                }
            }
        }
    }

    events
}
