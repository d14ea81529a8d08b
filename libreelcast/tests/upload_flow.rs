//! End-to-end uploads through `VideoUploader` with a scripted HTTP transport

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;
use libreelcast::credentials::StaticCredentialProvider;
use libreelcast::media::{StaticProbe, VideoSource};
use libreelcast::transport::{HttpResponse, Method, ScriptedTransport};
use libreelcast::{ErrorKind, PlatformId, ReelcastError, VideoMetadata, VideoUploader};
use serde_json::json;

fn source() -> VideoSource {
    VideoSource::from_bytes(vec![7u8; 4096])
}

fn metadata() -> VideoMetadata {
    VideoMetadata::new("Derby highlights", "Best moments of the derby").with_tags(["football"])
}

#[tokio::test]
async fn test_compatible_video_reaches_both_platforms() {
    let transport = Arc::new(ScriptedTransport::new());
    script_youtube(&transport, "yt-1");
    script_instagram(&transport, "m-1");

    let uploader = uploader(test_config(), 45.0, transport.clone());
    let result = uploader
        .upload_video(source(), metadata(), &PlatformId::ALL, None)
        .await
        .unwrap();

    assert!(result.all_succeeded());
    let youtube = result.get(PlatformId::YouTube).unwrap();
    assert_eq!(youtube.video_id.as_deref(), Some("yt-1"));
    assert_eq!(
        youtube.video_url.as_deref(),
        Some("https://youtube.com/shorts/yt-1")
    );
    assert_eq!(youtube.attempts, 1);

    let instagram = result.get(PlatformId::Instagram).unwrap();
    assert_eq!(instagram.video_id.as_deref(), Some("m-1"));
    assert_eq!(
        instagram.video_url.as_deref(),
        Some("https://www.instagram.com/reel/m-1/")
    );
    assert_eq!(transport.pending(), 0);
}

#[tokio::test]
async fn test_too_long_for_youtube_still_reaches_instagram() {
    let transport = Arc::new(ScriptedTransport::new());
    script_instagram(&transport, "m-1");

    let uploader = uploader(test_config(), 75.0, transport.clone());
    let result = uploader
        .upload_video(source(), metadata(), &PlatformId::ALL, None)
        .await
        .unwrap();

    let youtube = result.get(PlatformId::YouTube).unwrap();
    assert!(!youtube.success);
    assert_eq!(youtube.error_kind(), Some(ErrorKind::Validation));
    assert_eq!(youtube.attempts, 0);
    assert!(youtube.error.as_ref().unwrap().message.contains("Video too long"));

    assert!(result.get(PlatformId::Instagram).unwrap().success);
    assert!(transport.requests_to(Method::Get, "oauth.test").is_empty());
    assert!(transport.requests_to(Method::Post, "api.test").is_empty());
}

#[tokio::test]
async fn test_configured_duration_limits_apply() {
    let mut config = test_config();
    config.youtube.max_duration = Duration::from_secs(60);
    config.instagram.max_duration = Duration::from_secs(120);

    let transport = Arc::new(ScriptedTransport::new());
    script_instagram(&transport, "m-1");

    let uploader = uploader(config, 95.0, transport.clone());
    let result = uploader
        .upload_video(source(), metadata(), &PlatformId::ALL, None)
        .await
        .unwrap();

    assert_eq!(
        result.get(PlatformId::YouTube).unwrap().error_kind(),
        Some(ErrorKind::Validation)
    );
    assert!(result.get(PlatformId::Instagram).unwrap().success);
}

#[tokio::test]
async fn test_rejection_on_one_platform_does_not_affect_the_other() {
    let transport = Arc::new(ScriptedTransport::new());
    transport
        .on(Method::Get, "oauth.test/tokeninfo", json_ok(json!({"sub": "channel-1"})))
        .on(
            Method::Post,
            "api.test/upload/youtube/v3/videos",
            HttpResponse::new(400).with_json(json!({
                "error": {
                    "code": 400,
                    "message": "Invalid video metadata",
                    "errors": [{"reason": "invalidTitle"}]
                }
            })),
        );
    script_instagram(&transport, "m-1");

    let uploader = uploader(test_config(), 45.0, transport.clone());
    let result = uploader
        .upload_video(source(), metadata(), &PlatformId::ALL, None)
        .await
        .unwrap();

    let youtube = result.get(PlatformId::YouTube).unwrap();
    assert_eq!(youtube.error_kind(), Some(ErrorKind::Rejected));
    assert_eq!(youtube.attempts, 1);
    assert!(result.get(PlatformId::Instagram).unwrap().success);
    assert!(result.any_succeeded());
    assert!(!result.all_succeeded());
}

#[tokio::test]
async fn test_missing_credential_fails_only_that_platform() {
    let transport = Arc::new(ScriptedTransport::new());
    script_youtube(&transport, "yt-1");

    let uploader = VideoUploader::new(
        test_config(),
        Arc::new(StaticProbe::new(media(45.0))),
        Arc::new(StaticCredentialProvider::new().with_token(PlatformId::YouTube, "yt-token", None)),
        transport.clone(),
    );
    let result = uploader
        .upload_video(source(), metadata(), &PlatformId::ALL, None)
        .await
        .unwrap();

    assert!(result.get(PlatformId::YouTube).unwrap().success);
    let instagram = result.get(PlatformId::Instagram).unwrap();
    assert_eq!(instagram.error_kind(), Some(ErrorKind::Authentication));
    assert!(transport.requests_to(Method::Get, "graph.test").is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_deadline_times_out_slow_platform() {
    let transport = Arc::new(ScriptedTransport::new());
    script_youtube(&transport, "yt-1");
    transport.on_delayed(
        Method::Get,
        "graph.test/me",
        Duration::from_secs(600),
        json_ok(json!({"id": "17841"})),
    );

    let uploader = uploader(test_config(), 45.0, transport);
    let result = uploader
        .upload_video(
            source(),
            metadata(),
            &PlatformId::ALL,
            Some(Duration::from_secs(30)),
        )
        .await
        .unwrap();

    assert!(result.get(PlatformId::YouTube).unwrap().success);
    assert_eq!(
        result.get(PlatformId::Instagram).unwrap().error_kind(),
        Some(ErrorKind::TimedOut)
    );
}

#[tokio::test]
async fn test_disabled_platforms_are_skipped() {
    let mut config = test_config();
    config.instagram.enabled = false;

    let transport = Arc::new(ScriptedTransport::new());
    script_youtube(&transport, "yt-1");

    let uploader = uploader(config, 45.0, transport);
    let result = uploader
        .upload_video(source(), metadata(), &PlatformId::ALL, None)
        .await
        .unwrap();

    assert_eq!(result.len(), 1);
    assert!(result.get(PlatformId::Instagram).is_none());

    let err = uploader
        .upload_video(source(), metadata(), &[PlatformId::Instagram], None)
        .await
        .unwrap_err();
    assert!(matches!(err, ReelcastError::InvalidInput(_)));
}

#[tokio::test]
async fn test_check_compatibility_makes_no_requests() {
    let transport = Arc::new(ScriptedTransport::new());
    let uploader = uploader(test_config(), 75.0, transport.clone());

    let report = uploader
        .check_compatibility(source(), metadata(), &PlatformId::ALL)
        .await
        .unwrap();

    assert!(!report.passed_for(PlatformId::YouTube));
    assert!(report.passed_for(PlatformId::Instagram));
    assert_eq!(report.passing_platforms(), vec![PlatformId::Instagram]);
    assert!(transport.requests().is_empty());
}

#[tokio::test]
async fn test_connection_check_reports_each_platform() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.on(
        Method::Get,
        "oauth.test/tokeninfo",
        json_ok(json!({"sub": "channel-1"})),
    );

    let uploader = VideoUploader::new(
        test_config(),
        Arc::new(StaticProbe::new(media(45.0))),
        Arc::new(StaticCredentialProvider::new().with_token(PlatformId::YouTube, "yt-token", None)),
        transport.clone(),
    );
    let checks = uploader.test_connections(&PlatformId::ALL).await.unwrap();

    assert_eq!(checks.len(), 2);
    assert_eq!(checks[0].platform, PlatformId::YouTube);
    assert!(checks[0].connected());
    assert_eq!(checks[0].account_id.as_deref(), Some("channel-1"));
    assert_eq!(checks[1].platform, PlatformId::Instagram);
    assert!(!checks[1].connected());

    // authentication only, nothing is uploaded
    assert!(transport.requests_to(Method::Post, "").is_empty());
    assert!(transport.requests_to(Method::Put, "").is_empty());
}

#[tokio::test]
async fn test_youtube_video_status() {
    let transport = Arc::new(ScriptedTransport::new());
    transport
        .on(Method::Get, "oauth.test/tokeninfo", json_ok(json!({"sub": "channel-1"})))
        .on(
            Method::Get,
            "api.test/youtube/v3/videos",
            json_ok(json!({
                "items": [{
                    "id": "yt-1",
                    "status": {"uploadStatus": "processed", "privacyStatus": "public"},
                    "processingDetails": {"processingStatus": "succeeded"}
                }]
            })),
        );

    let status = uploader(test_config(), 45.0, transport)
        .youtube_video_status("yt-1")
        .await
        .unwrap();

    assert_eq!(status.video_id, "yt-1");
    assert_eq!(status.privacy_status.as_deref(), Some("public"));
    assert_eq!(status.processing_status.as_deref(), Some("succeeded"));
}
