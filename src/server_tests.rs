use super::*;
use crate::config::DownloadType;
use crate::identity::{StaticDirectory, UserRecord};
use axum::http::HeaderValue;
use std::fs;

fn state_for(root: &std::path::Path, tweak: impl FnOnce(&mut Settings)) -> AppState {
    let mut settings = Settings { upload_dir: Some(root.to_path_buf()), ..Settings::default() };
    tweak(&mut settings);
    let directory = StaticDirectory::new();
    directory.insert_role("editor", "Editor");
    directory.insert_user(UserRecord {
        id: 7,
        login: "ed".into(),
        display_name: "Ed Itor".into(),
        roles: vec!["editor".into()],
    });
    AppState::new(Arc::new(settings), Arc::new(directory))
}

fn granted() -> HeaderMap {
    let mut h = HeaderMap::new();
    h.insert("x-access-granted", HeaderValue::from_static("1"));
    h
}

fn query(pairs: &[(&str, &str)]) -> Query<HashMap<String, String>> {
    Query(pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect())
}

async fn call(state: &AppState, headers: HeaderMap, pairs: &[(&str, &str)]) -> Response {
    let uri: Uri = "/protected-file".parse().unwrap();
    get_file(State(state.clone()), uri, headers, query(pairs)).await
}

async fn body_bytes(resp: Response) -> Vec<u8> {
    axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap().to_vec()
}

async fn error_code(resp: Response) -> String {
    let v: serde_json::Value = serde_json::from_slice(&body_bytes(resp).await).unwrap();
    v["code"].as_str().unwrap_or_default().to_string()
}

#[tokio::test]
async fn streams_authorized_download() {
    let tmp = tempfile::tempdir().unwrap();
    fs::create_dir_all(tmp.path().join("2024")).unwrap();
    let data: Vec<u8> = (0..4000u32).map(|i| (i % 256) as u8).collect();
    fs::write(tmp.path().join("2024").join("big file.zip"), &data).unwrap();
    let state = state_for(tmp.path(), |s| s.download_type = DownloadType::Chunked);

    let resp = call(&state, granted(), &[("file", "2024/big file.zip")]).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let h = resp.headers();
    assert_eq!(h.get("content-length").unwrap(), "4000");
    assert_eq!(h.get("content-disposition").unwrap(), "attachment; filename=\"big_file.zip\"");
    assert_eq!(h.get("content-transfer-encoding").unwrap(), "binary");
    assert_eq!(body_bytes(resp).await, data);
}

#[tokio::test]
async fn images_are_served_inline() {
    let tmp = tempfile::tempdir().unwrap();
    fs::write(tmp.path().join("pic.png"), b"\x89PNG\r\n\x1a\nxxxx").unwrap();
    let state = state_for(tmp.path(), |_| {});
    let resp = call(&state, granted(), &[("file", "pic.png")]).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp.headers().get("content-disposition").is_none());
    assert_eq!(resp.headers().get("content-type").unwrap(), "image/png");
}

#[tokio::test]
async fn denied_without_upstream_grant() {
    let tmp = tempfile::tempdir().unwrap();
    fs::write(tmp.path().join("a.pdf"), b"%PDF-1.4").unwrap();
    let state = state_for(tmp.path(), |_| {});
    let resp = call(&state, HeaderMap::new(), &[("file", "a.pdf")]).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    assert_eq!(error_code(resp).await, "access_denied");
}

#[tokio::test]
async fn missing_file_is_404() {
    let tmp = tempfile::tempdir().unwrap();
    let state = state_for(tmp.path(), |_| {});
    let resp = call(&state, granted(), &[("file", "nothing.zip")]).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_eq!(error_code(resp).await, "file_not_found");
}

#[tokio::test]
async fn traversal_and_empty_requests_are_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    let state = state_for(tmp.path(), |_| {});
    for file in ["../etc/passwd", "/abs.zip", "a/./b.zip", ".htaccess", "sub/.hidden.pdf"] {
        let resp = call(&state, granted(), &[("file", file)]).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "{file}");
        assert_eq!(error_code(resp).await, "invalid_path");
    }
    let resp = call(&state, granted(), &[]).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(error_code(resp).await, "missing_file");
}

#[cfg(unix)]
#[tokio::test]
async fn unreadable_file_is_403() {
    use std::os::unix::fs::PermissionsExt;

    let tmp = tempfile::tempdir().unwrap();
    let p = tmp.path().join("locked.pdf");
    fs::write(&p, b"%PDF-1.4").unwrap();
    fs::set_permissions(&p, fs::Permissions::from_mode(0o000)).unwrap();
    if fs::File::open(&p).is_ok() {
        // permissions are not enforced for this user
        return;
    }
    let state = state_for(tmp.path(), |_| {});
    let resp = call(&state, granted(), &[("file", "locked.pdf")]).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    assert!(resp.headers().get("content-disposition").is_none());
    assert_eq!(error_code(resp).await, "file_access");
}

#[cfg(unix)]
#[tokio::test]
async fn symlinked_directory_does_not_escape_upload_dir() {
    let tmp = tempfile::tempdir().unwrap();
    let outside = tempfile::tempdir().unwrap();
    fs::write(outside.path().join("secret.txt"), b"top secret").unwrap();
    std::os::unix::fs::symlink(outside.path(), tmp.path().join("shared")).unwrap();
    let state = state_for(tmp.path(), |_| {});
    let resp = call(&state, granted(), &[("file", "shared/secret.txt")]).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(error_code(resp).await, "invalid_path");
}

#[tokio::test]
async fn unconfigured_upload_dir_is_a_config_error() {
    let state = AppState::new(Arc::new(Settings::default()), Arc::new(StaticDirectory::new()));
    let resp = call(&state, granted(), &[("file", "a.zip")]).await;
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(error_code(resp).await, "upload_dir_unset");
}

#[tokio::test]
async fn group_allow_list_uses_caller_memberships() {
    let tmp = tempfile::tempdir().unwrap();
    fs::write(tmp.path().join("a.zip"), b"PK\x03\x04zz").unwrap();
    let state = state_for(tmp.path(), |s| s.allowed_groups = vec!["role|editor".into()]);

    let anon = call(&state, HeaderMap::new(), &[("file", "a.zip")]).await;
    assert_eq!(anon.status(), StatusCode::FORBIDDEN);

    let mut editor = HeaderMap::new();
    editor.insert(USER_ID_HEADER, HeaderValue::from_static("7"));
    let resp = call(&state, editor, &[("file", "a.zip")]).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_bytes(resp).await, b"PK\x03\x04zz");

    let mut stranger = HeaderMap::new();
    stranger.insert(USER_ID_HEADER, HeaderValue::from_static("99"));
    let resp = call(&state, stranger, &[("file", "a.zip")]).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

#[test]
fn route_follows_delivery_script() {
    let s = Settings { delivery_script: "/downloads/get/".into(), ..Settings::default() };
    assert_eq!(delivery_route(&s), "/downloads/get");
    assert_eq!(delivery_route(&Settings::default()), "/protected-file");
}

#[test]
fn error_response_carries_status() {
    let resp = error_response(&AppError::not_found("x", "y"));
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}
