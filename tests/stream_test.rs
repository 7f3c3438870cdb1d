//! Integration tests for `/stream/{id}`: direct delivery, ranges, source
//! selection, rejection paths and the transcode pipe.

#![cfg(unix)]

mod common;

use std::time::Duration;

use common::{
    mkv_bytes, mp4_bytes, TestHarness, FFMPEG_CAT, FFMPEG_ENDLESS, FFMPEG_LATIN1_STDERR,
    FFPROBE_COUNTING, FFPROBE_H264_120S,
};
use futures::StreamExt;

fn header<'a>(resp: &'a reqwest::Response, name: &str) -> &'a str {
    resp.headers()
        .get(name)
        .unwrap_or_else(|| panic!("missing header {name}"))
        .to_str()
        .unwrap()
}

// ---------------------------------------------------------------------------
// Direct engine
// ---------------------------------------------------------------------------

#[tokio::test]
async fn full_request_returns_identical_bytes() {
    let h = TestHarness::new(&[("100", "Heat (1995)/Heat.mp4")]);
    let data = mp4_bytes(50_000);
    h.write_film("Heat (1995)/Heat.mp4", &data);
    let addr = h.serve().await;

    let resp = reqwest::get(format!("http://{addr}/stream/100")).await.unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(header(&resp, "content-type"), "video/mp4");
    assert_eq!(header(&resp, "content-length"), "50000");
    assert_eq!(header(&resp, "accept-ranges"), "bytes");
    assert_eq!(
        header(&resp, "cache-control"),
        "public, max-age=31536000, immutable"
    );
    assert!(resp.headers().contains_key("etag"));
    assert!(resp.headers().contains_key("last-modified"));
    assert!(resp.headers().contains_key("x-request-id"));

    let body = resp.bytes().await.unwrap();
    assert_eq!(body.as_ref(), data.as_slice());
    assert!(h.wait_for_registry_empty(Duration::from_secs(2)).await);
}

#[tokio::test]
async fn single_range_returns_partial_content() {
    let h = TestHarness::new(&[("100", "Heat/Heat.mp4")]);
    let data = mp4_bytes(10_000);
    h.write_film("Heat/Heat.mp4", &data);
    let addr = h.serve().await;

    let client = reqwest::Client::new();
    let resp = client
        .get(format!("http://{addr}/stream/100"))
        .header("Range", "bytes=1000-1999")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 206);
    assert_eq!(header(&resp, "content-range"), "bytes 1000-1999/10000");
    assert_eq!(header(&resp, "content-length"), "1000");
    let body = resp.bytes().await.unwrap();
    assert_eq!(body.as_ref(), &data[1000..2000]);

    let resp = client
        .get(format!("http://{addr}/stream/100"))
        .header("Range", "bytes=9500-")
        .send()
        .await
        .unwrap();
    assert_eq!(header(&resp, "content-range"), "bytes 9500-9999/10000");
    assert_eq!(resp.bytes().await.unwrap().as_ref(), &data[9500..]);
}

#[tokio::test]
async fn multiple_ranges_keep_header_order() {
    let h = TestHarness::new(&[("100", "Heat/Heat.mp4")]);
    let data = mp4_bytes(10_000);
    h.write_film("Heat/Heat.mp4", &data);
    let addr = h.serve().await;

    let resp = reqwest::Client::new()
        .get(format!("http://{addr}/stream/100"))
        .header("Range", "bytes=9000-9009,-5,100-104,20000-30000")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 206);

    let content_type = header(&resp, "content-type").to_string();
    let boundary = content_type
        .strip_prefix("multipart/byteranges; boundary=")
        .expect("multipart content type")
        .to_string();
    let declared: usize = header(&resp, "content-length").parse().unwrap();
    let body = resp.bytes().await.unwrap();
    assert_eq!(body.len(), declared);

    let mut expected = Vec::new();
    for (start, end) in [(9000usize, 9009usize), (9995, 9999), (100, 104)] {
        expected.extend_from_slice(
            format!(
                "--{boundary}\r\nContent-Type: video/mp4\r\nContent-Range: bytes {start}-{end}/10000\r\n\r\n"
            )
            .as_bytes(),
        );
        expected.extend_from_slice(&data[start..=end]);
        expected.extend_from_slice(b"\r\n");
    }
    expected.extend_from_slice(format!("--{boundary}--").as_bytes());
    assert_eq!(body.as_ref(), expected.as_slice());
}

#[tokio::test]
async fn unsatisfiable_range_is_416() {
    let h = TestHarness::new(&[("100", "Heat/Heat.mp4")]);
    h.write_film("Heat/Heat.mp4", &mp4_bytes(1000));
    let addr = h.serve().await;

    let resp = reqwest::Client::new()
        .get(format!("http://{addr}/stream/100"))
        .header("Range", "bytes=1000-2000")
        .header("x-request-id", "req-416")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 416);
    assert_eq!(header(&resp, "content-range"), "bytes */1000");
    assert_eq!(header(&resp, "x-request-id"), "req-416");

    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["code"], "range_not_satisfiable");
    assert_eq!(body["request_id"], "req-416");
    assert!(h.wait_for_registry_empty(Duration::from_secs(2)).await);
}

#[tokio::test]
async fn head_returns_headers_without_body() {
    let h = TestHarness::new(&[("100", "Heat/Heat.mp4")]);
    h.write_film("Heat/Heat.mp4", &mp4_bytes(4096));
    let addr = h.serve().await;

    let resp = reqwest::Client::new()
        .head(format!("http://{addr}/stream/100"))
        .header("Range", "bytes=0-9")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(header(&resp, "content-length"), "4096");
    assert_eq!(header(&resp, "accept-ranges"), "bytes");
    assert!(resp.bytes().await.unwrap().is_empty());
    assert!(h.wait_for_registry_empty(Duration::from_secs(2)).await);
}

#[tokio::test]
async fn non_bytes_range_unit_serves_everything() {
    let h = TestHarness::new(&[("100", "Heat/Heat.mp4")]);
    h.write_film("Heat/Heat.mp4", &mp4_bytes(2048));
    let addr = h.serve().await;

    let resp = reqwest::Client::new()
        .get(format!("http://{addr}/stream/100"))
        .header("Range", "items=0-1")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.bytes().await.unwrap().len(), 2048);
}

// ---------------------------------------------------------------------------
// Source selection and rejection
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unknown_program_is_404() {
    let h = TestHarness::new(&[]);
    let addr = h.serve().await;

    let resp = reqwest::get(format!("http://{addr}/stream/nope")).await.unwrap();
    assert_eq!(resp.status(), 404);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["code"], "not_found");
}

#[tokio::test]
async fn invalid_program_id_is_400() {
    let h = TestHarness::new(&[]);
    let addr = h.serve().await;

    let resp = reqwest::get(format!("http://{addr}/stream/bad%20id"))
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn missing_file_is_404() {
    let h = TestHarness::new(&[("100", "Gone/Gone.mp4")]);
    let addr = h.serve().await;

    let resp = reqwest::get(format!("http://{addr}/stream/100")).await.unwrap();
    assert_eq!(resp.status(), 404);
    assert!(h.wait_for_registry_empty(Duration::from_secs(2)).await);
}

#[tokio::test]
async fn unknown_container_is_415() {
    let h = TestHarness::new(&[("100", "Disc/Disc.iso")]);
    h.write_film("Disc/Disc.iso", b"not a film");
    let addr = h.serve().await;

    let resp = reqwest::get(format!("http://{addr}/stream/100")).await.unwrap();
    assert_eq!(resp.status(), 415);
}

#[tokio::test]
async fn content_mismatch_is_415() {
    let h = TestHarness::new(&[("100", "Fake/Fake.mp4")]);
    h.write_film("Fake/Fake.mp4", b"this is plain text pretending to be a film");
    let addr = h.serve().await;

    let resp = reqwest::get(format!("http://{addr}/stream/100")).await.unwrap();
    assert_eq!(resp.status(), 415);
    assert!(h.wait_for_registry_empty(Duration::from_secs(2)).await);
}

#[tokio::test]
async fn sibling_is_preferred_over_original() {
    let h = TestHarness::new(&[("100", "Heat/Heat.mkv")]);
    h.write_film("Heat/Heat.mkv", &mkv_bytes(8192));
    let sibling = mp4_bytes(3000);
    h.write_film("Heat/Plex Versions/Original Quality/Heat - 1080p.mp4", &mp4_bytes(10));
    h.write_film("Heat/Plex Versions/Original Quality/Heat.mp4", &sibling);
    let addr = h.serve().await;

    let resp = reqwest::get(format!("http://{addr}/stream/100")).await.unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(header(&resp, "accept-ranges"), "bytes");
    assert_eq!(resp.bytes().await.unwrap().as_ref(), sibling.as_slice());
    assert!(h.ffmpeg_args().is_none());
}

#[tokio::test]
async fn placeholder_txt_suffix_is_stripped() {
    let h = TestHarness::new(&[("100", "Alien/Alien.mp4.txt")]);
    let data = mp4_bytes(1234);
    h.write_film("Alien/Alien.mp4", &data);
    let addr = h.serve().await;

    let resp = reqwest::get(format!("http://{addr}/stream/100")).await.unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.bytes().await.unwrap().as_ref(), data.as_slice());
}

#[tokio::test]
async fn symlink_escape_is_rejected() {
    let h = TestHarness::new(&[("100", "Evil/Evil.mp4")]);
    let outside = h.dir.path().join("private");
    std::fs::create_dir_all(&outside).unwrap();
    std::fs::write(outside.join("secret.mp4"), mp4_bytes(512)).unwrap();
    std::fs::create_dir_all(h.films_dir().join("Evil")).unwrap();
    std::os::unix::fs::symlink(
        outside.join("secret.mp4"),
        h.films_dir().join("Evil").join("Evil.mp4"),
    )
    .unwrap();
    let addr = h.serve().await;

    let resp = reqwest::get(format!("http://{addr}/stream/100")).await.unwrap();
    assert_eq!(resp.status(), 403);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["code"], "access_denied");
    assert!(h.wait_for_registry_empty(Duration::from_secs(2)).await);
}

// ---------------------------------------------------------------------------
// Transcode engine
// ---------------------------------------------------------------------------

#[tokio::test]
async fn transcode_pipes_ffmpeg_output() {
    let h = TestHarness::new(&[("200", "Brazil/Brazil.mkv")]);
    let data = mkv_bytes(20_000);
    h.write_film("Brazil/Brazil.mkv", &data);
    let addr = h.serve().await;

    let resp = reqwest::get(format!("http://{addr}/stream/200")).await.unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(header(&resp, "content-type"), "video/mp4");
    assert_eq!(header(&resp, "accept-ranges"), "none");
    assert_eq!(header(&resp, "cache-control"), "no-store");

    // The fake ffmpeg copies stdin, which is the verified descriptor.
    let body = resp.bytes().await.unwrap();
    assert_eq!(body.as_ref(), data.as_slice());

    let args = h.ffmpeg_args().expect("ffmpeg ran");
    assert!(args.contains("-i /dev/stdin"));
    assert!(args.contains("-c:v copy"));
    assert!(args.contains("-movflags frag_keyframe+empty_moov+default_base_moof"));
    assert!(!args.contains("-ss"));
    assert!(h.wait_for_registry_empty(Duration::from_secs(5)).await);
}

#[tokio::test]
async fn transcode_seeks_from_range_offset() {
    let h = TestHarness::new(&[("200", "Brazil/Brazil.avi")]);
    h.write_film("Brazil/Brazil.avi", &vec![0u8; 10_000]);
    let addr = h.serve().await;

    let resp = reqwest::Client::new()
        .get(format!("http://{addr}/stream/200"))
        .header("Range", "bytes=5000-")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    resp.bytes().await.unwrap();

    let args = h.ffmpeg_args().expect("ffmpeg ran");
    assert!(args.contains("-ss 60.000"), "args: {args}");
}

#[tokio::test]
async fn transcode_head_spawns_nothing() {
    let h = TestHarness::new(&[("200", "Brazil/Brazil.mkv")]);
    h.write_film("Brazil/Brazil.mkv", &mkv_bytes(4096));
    let addr = h.serve().await;

    let resp = reqwest::Client::new()
        .head(format!("http://{addr}/stream/200"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(header(&resp, "content-type"), "video/mp4");
    assert_eq!(header(&resp, "accept-ranges"), "none");
    assert!(resp.headers().get("content-length").is_none());
    assert!(h.ffmpeg_args().is_none());
    assert!(h.ctx.durations.is_empty());
}

#[tokio::test]
async fn transcode_output_survives_non_utf8_diagnostics() {
    let h = TestHarness::with_tools(
        &[("200", "Vilnius/Vilnius.avi")],
        FFMPEG_LATIN1_STDERR,
        FFPROBE_H264_120S,
    );
    h.write_film("Vilnius/Vilnius.avi", &vec![0u8; 4096]);
    let addr = h.serve().await;

    let resp = reqwest::get(format!("http://{addr}/stream/200")).await.unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), "finished\n");
    assert!(h.wait_for_registry_empty(Duration::from_secs(5)).await);
}

#[tokio::test]
async fn client_disconnect_kills_transcode() {
    let h = TestHarness::with_tools(
        &[("200", "Brazil/Brazil.mkv")],
        FFMPEG_ENDLESS,
        FFPROBE_H264_120S,
    );
    h.write_film("Brazil/Brazil.mkv", &mkv_bytes(4096));
    let addr = h.serve().await;

    let resp = reqwest::get(format!("http://{addr}/stream/200")).await.unwrap();
    assert_eq!(resp.status(), 200);

    let mut stream = resp.bytes_stream();
    let first = stream.next().await.unwrap().unwrap();
    assert!(first.starts_with(b"filmvault"));
    assert_eq!(h.ctx.registry.len(), 2);

    let pid = ffmpeg_pid(&h).expect("ffmpeg registered");
    let proc_dir = std::path::PathBuf::from(format!("/proc/{pid}"));
    assert!(proc_dir.exists());

    drop(stream);
    assert!(
        h.wait_for_registry_empty(Duration::from_secs(5)).await,
        "leaked: {:?}",
        h.ctx.registry.stats()
    );

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while proc_dir.exists() && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(!proc_dir.exists(), "ffmpeg pid {pid} still running");
}

/// Pid of the running ffmpeg, read from its registry entry.
fn ffmpeg_pid(h: &TestHarness) -> Option<u32> {
    h.ctx.registry.stats().details.iter().find_map(|d| {
        d.metadata
            .strip_prefix("ffmpeg pid=")?
            .split_whitespace()
            .next()?
            .parse()
            .ok()
    })
}

#[tokio::test]
async fn concurrent_transcodes_probe_once() {
    let h = TestHarness::with_tools(
        &[("200", "Brazil/Brazil.mkv")],
        FFMPEG_CAT,
        FFPROBE_COUNTING,
    );
    h.write_film("Brazil/Brazil.mkv", &mkv_bytes(4096));
    let addr = h.serve().await;

    let url = format!("http://{addr}/stream/200");
    let (a, b, c) = tokio::join!(reqwest::get(&url), reqwest::get(&url), reqwest::get(&url));
    for resp in [a, b, c] {
        resp.unwrap().bytes().await.unwrap();
    }
    assert_eq!(h.ffprobe_calls(), 1);
    assert_eq!(h.ctx.durations.len(), 1);
}

// ---------------------------------------------------------------------------
// Operational routes
// ---------------------------------------------------------------------------

#[tokio::test]
async fn health_and_fd_stats() {
    let h = TestHarness::new(&[]);
    let addr = h.serve().await;

    let health: serde_json::Value = reqwest::get(format!("http://{addr}/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");
    assert_eq!(health["catalog"], "json");

    let fds: serde_json::Value = reqwest::get(format!("http://{addr}/admin/fds"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(fds["open"], 0);
    assert!(fds["details"].as_array().unwrap().is_empty());
}
