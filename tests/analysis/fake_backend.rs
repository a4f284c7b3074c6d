// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
// Canned HTTP backend on 127.0.0.1:0 that records what it receives

use axum::{
    body::Bytes,
    http::{HeaderMap, StatusCode, Uri},
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{ImageFormat, Rgb, RgbImage};
use serde_json::Value;
use std::io::Cursor;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;

#[derive(Debug, Clone)]
pub struct Recorded {
    pub path: String,
    pub query: Option<String>,
    pub moondream_auth: Option<String>,
    pub body: Value,
}

pub struct FakeBackend {
    /// Base URL including the `/v1` prefix
    pub base_url: String,
    requests: Arc<Mutex<Vec<Recorded>>>,
}

impl FakeBackend {
    pub async fn spawn(status: StatusCode, response: Value) -> Self {
        Self::spawn_with_delay(status, response, Duration::ZERO).await
    }

    pub async fn spawn_with_delay(status: StatusCode, response: Value, delay: Duration) -> Self {
        let requests = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&requests);

        let app = Router::new().fallback(move |uri: Uri, headers: HeaderMap, body: Bytes| {
            let recorded = Arc::clone(&recorded);
            let response = response.clone();
            async move {
                recorded.lock().unwrap().push(Recorded {
                    path: uri.path().to_string(),
                    query: uri.query().map(str::to_string),
                    moondream_auth: headers
                        .get("x-moondream-auth")
                        .and_then(|v| v.to_str().ok())
                        .map(str::to_string),
                    body: serde_json::from_slice(&body).unwrap_or(Value::Null),
                });
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                (status, Json(response))
            }
        });

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{}/v1", addr),
            requests,
        }
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }
}

/// A solid-color PNG of the given size
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_pixel(width, height, Rgb([90, 120, 200]));
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageFormat::Png).unwrap();
    buf.into_inner()
}

pub fn png_base64(width: u32, height: u32) -> String {
    STANDARD.encode(png_bytes(width, height))
}
