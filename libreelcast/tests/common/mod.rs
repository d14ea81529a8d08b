//! Shared fixtures for integration tests

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use libreelcast::config::Config;
use libreelcast::credentials::StaticCredentialProvider;
use libreelcast::media::{ProbedMedia, StaticProbe};
use libreelcast::transport::{HttpResponse, Method, ScriptedTransport};
use libreelcast::types::PlatformId;
use libreelcast::VideoUploader;
use serde_json::json;

pub const YT_SESSION: &str = "https://upload.test/session/abc";

/// Probe result for a video of the given length, otherwise within every default limit
pub fn media(duration_secs: f64) -> ProbedMedia {
    ProbedMedia {
        duration_secs,
        width: 1080,
        height: 1920,
        container: "mp4".to_string(),
        video_codec: "h264".to_string(),
        size_bytes: 50 * 1024 * 1024,
        fps: Some(30.0),
        bitrate: Some(8_000_000),
    }
}

/// Config pointing every platform endpoint at test hosts
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.youtube.api_base = "https://api.test".to_string();
    config.youtube.oauth_base = "https://oauth.test".to_string();
    config.youtube.chunk_size = 256 * 1024;
    config.instagram.account_id = Some("17841".to_string());
    config.instagram.graph_base = "https://graph.test".to_string();
    config.instagram.rupload_base = "https://rupload.test".to_string();
    config.instagram.refresh_base = "https://refresh.test".to_string();
    config.instagram.status_poll_interval = Duration::ZERO;
    config.upload.base_delay = Duration::from_millis(10);
    config.upload.max_delay = Duration::from_millis(100);
    config
}

pub fn credentials() -> StaticCredentialProvider {
    StaticCredentialProvider::new()
        .with_token(PlatformId::YouTube, "yt-token", None)
        .with_token(PlatformId::Instagram, "ig-token", None)
}

pub fn uploader(config: Config, duration_secs: f64, transport: Arc<ScriptedTransport>) -> VideoUploader {
    VideoUploader::new(
        config,
        Arc::new(StaticProbe::new(media(duration_secs))),
        Arc::new(credentials()),
        transport,
    )
}

pub fn json_ok(value: serde_json::Value) -> HttpResponse {
    HttpResponse::new(200).with_json(value)
}

/// A YouTube upload that completes in one chunk
pub fn script_youtube(transport: &ScriptedTransport, video_id: &str) {
    transport
        .on(Method::Get, "oauth.test/tokeninfo", json_ok(json!({"sub": "channel-1"})))
        .on(
            Method::Post,
            "api.test/upload/youtube/v3/videos",
            HttpResponse::new(200).with_header("Location", YT_SESSION),
        )
        .on(Method::Put, "upload.test/session/abc", json_ok(json!({"id": video_id})));
}

/// A Reel that is processed on the first status check
pub fn script_instagram(transport: &ScriptedTransport, media_id: &str) {
    transport
        .on(Method::Get, "graph.test/me", json_ok(json!({"id": "17841"})))
        .on(
            Method::Post,
            "graph.test/17841/media",
            json_ok(json!({"id": "c-1", "uri": "https://rupload.test/c-1"})),
        )
        .on(Method::Post, "rupload.test/c-1", json_ok(json!({"success": true})))
        .on(Method::Get, "graph.test/c-1", json_ok(json!({"status_code": "FINISHED"})))
        .on(Method::Post, "graph.test/17841/media_publish", json_ok(json!({"id": media_id})))
        .on(
            Method::Get,
            &format!("graph.test/{}", media_id),
            json_ok(json!({"permalink": format!("https://www.instagram.com/reel/{}/", media_id)})),
        );
}
