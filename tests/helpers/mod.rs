//! Shared helpers: temp-dir backed routers, multipart bodies and sample images.

#![allow(dead_code)]

use axum::{
    Router,
    body::Body,
    http::{Request, Response, header},
};
use http_body_util::BodyExt;
use image::{ImageBuffer, ImageFormat, Rgb, RgbImage};
use imgdrop_server::{
    config::AppConfig,
    routes::{AppState, create_router},
    storage::{LocalFileStorage, Storage},
};
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

const BOUNDARY: &str = "imgdrop-test-boundary";

/// Router over a fresh upload directory that lives as long as `dir`.
pub struct TestApp {
    pub router: Router,
    pub dir: TempDir,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    pub fn with_config(tweak: impl FnOnce(&mut AppConfig)) -> Self {
        let dir = tempfile::tempdir().expect("temp dir");
        let mut config = AppConfig::with_upload_dir(dir.path());
        tweak(&mut config);
        let storage = LocalFileStorage::new(dir.path().to_path_buf()).expect("storage");
        Self::with_storage(dir, config, Arc::new(storage))
    }

    pub fn with_storage(dir: TempDir, config: AppConfig, storage: Arc<dyn Storage>) -> Self {
        let router = create_router(AppState::new(config, storage));
        Self { router, dir }
    }

    pub fn stored_files(&self) -> Vec<String> {
        list_dir(self.dir.path())
    }

    pub async fn upload(&self, parts: &[Part]) -> (u16, serde_json::Value) {
        let response = self.send(multipart_request(parts)).await;
        let status = response.status().as_u16();
        let body = body_bytes(response).await;
        let json = serde_json::from_slice(&body).expect("json body");
        (status, json)
    }

    pub async fn get(&self, uri: &str) -> Response<Body> {
        let request = Request::builder()
            .uri(uri)
            .body(Body::empty())
            .expect("request");
        self.send(request).await
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.expect("infallible")
    }
}

pub fn list_dir(path: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(path)
        .expect("read dir")
        .map(|entry| entry.expect("entry").file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .expect("body")
        .to_bytes()
        .to_vec()
}

/// One multipart part. `filename: None` makes it a plain form value.
pub struct Part {
    pub name: &'static str,
    pub filename: Option<&'static str>,
    pub content_type: Option<&'static str>,
    pub data: Vec<u8>,
}

impl Part {
    pub fn file(
        name: &'static str,
        filename: &'static str,
        content_type: &'static str,
        data: Vec<u8>,
    ) -> Self {
        Self {
            name,
            filename: Some(filename),
            content_type: Some(content_type),
            data,
        }
    }

    pub fn image(filename: &'static str, content_type: &'static str, data: Vec<u8>) -> Self {
        Self::file("image", filename, content_type, data)
    }

    pub fn text(name: &'static str, value: &str) -> Self {
        Self {
            name,
            filename: None,
            content_type: None,
            data: value.as_bytes().to_vec(),
        }
    }
}

pub fn multipart_content_type() -> String {
    format!("multipart/form-data; boundary={BOUNDARY}")
}

/// Boundary line, part headers and data of one part, without the trailing CRLF.
pub fn part_bytes(part: &Part) -> Vec<u8> {
    let mut bytes = format!("--{BOUNDARY}\r\n").into_bytes();
    let mut disposition = format!("Content-Disposition: form-data; name=\"{}\"", part.name);
    if let Some(filename) = part.filename {
        disposition.push_str(&format!("; filename=\"{filename}\""));
    }
    bytes.extend_from_slice(disposition.as_bytes());
    bytes.extend_from_slice(b"\r\n");
    if let Some(content_type) = part.content_type {
        bytes.extend_from_slice(format!("Content-Type: {content_type}\r\n").as_bytes());
    }
    bytes.extend_from_slice(b"\r\n");
    bytes.extend_from_slice(&part.data);
    bytes
}

pub fn multipart_request(parts: &[Part]) -> Request<Body> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(&part_bytes(part));
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    upload_request(Body::from(body))
}

pub fn upload_request(body: Body) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/upload")
        .header(header::CONTENT_TYPE, multipart_content_type())
        .body(body)
        .expect("request")
}

/// Encodes a noisy gradient so lossy formats do not collapse to a few bytes.
pub fn sample_image(format: ImageFormat, width: u32, height: u32) -> Vec<u8> {
    let img: RgbImage = ImageBuffer::from_fn(width, height, |x, y| {
        let noise = (x.wrapping_mul(7919) ^ y.wrapping_mul(104_729)) % 256;
        Rgb([(x % 256) as u8, (y % 256) as u8, noise as u8])
    });
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, format).expect("encode");
    out.into_inner()
}
