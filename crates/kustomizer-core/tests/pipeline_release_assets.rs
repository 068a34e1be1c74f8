//! Release-asset strategy against a local HTTP server standing in for the
//! GitHub API and its download redirects.

mod common;

use axum::extract::{Path as UrlPath, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use common::*;
use kustomizer_core::acquire::download_release_assets;
use kustomizer_core::{
    AssetSource, Credentials, Dispatcher, EventKind, GithubReleases, InboundEvent,
    KustomizerError, Pipeline, Publication, ReleaseAsset, Revision, Settings,
};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;

const RELEASE_ID: u64 = 42;

#[derive(Clone)]
struct ServerState {
    base_url: String,
}

async fn list_assets(
    State(state): State<ServerState>,
    UrlPath((_owner, _repo, id)): UrlPath<(String, String, u64)>,
) -> Response {
    if id != RELEASE_ID {
        return (StatusCode::NOT_FOUND, "Not Found").into_response();
    }
    Json(json!([
        {
            "name": "a.yaml",
            "browser_download_url": format!("{}/download/a.yaml", state.base_url),
        },
        {
            "name": "b.yaml",
            "browser_download_url": format!("{}/download/b.yaml", state.base_url),
        },
    ]))
    .into_response()
}

// Mimics the hop from the public download URL to signed object storage.
async fn download(UrlPath(name): UrlPath<String>) -> Response {
    (
        StatusCode::FOUND,
        [(header::LOCATION, format!("/storage/release 42/{name}"))],
    )
        .into_response()
}

async fn storage(UrlPath((bucket, name)): UrlPath<(String, String)>) -> Response {
    if bucket != "release 42" {
        return (StatusCode::FORBIDDEN, "bad signature").into_response();
    }
    match name.as_str() {
        "a.yaml" => "kind: ConfigMap\nname: a\n".into_response(),
        "b.yaml" => "kind: ConfigMap\nname: b\n".into_response(),
        _ => (StatusCode::NOT_FOUND, "Not Found").into_response(),
    }
}

/// Serve the fixture API on an ephemeral port and return its base URL.
async fn serve() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());
    let app = Router::new()
        .route("/repos/:owner/:repo/releases/:id/assets", get(list_assets))
        .route("/download/:name", get(download))
        .route("/storage/:bucket/:name", get(storage))
        .with_state(ServerState {
            base_url: base_url.clone(),
        });
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    base_url
}

#[tokio::test]
async fn lists_and_downloads_through_redirects() {
    let base_url = serve().await;
    let client = GithubReleases::new(&base_url).unwrap();
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("acme/app-run");

    let revision = download_release_assets(&client, "acme", "app", RELEASE_ID, &dest)
        .await
        .expect("download");

    match revision {
        Revision::Assets { root, files } => {
            assert_eq!(root, dest);
            assert_eq!(files, vec![dest.join("a.yaml"), dest.join("b.yaml")]);
        }
        other => panic!("expected assets, got {other:?}"),
    }
    assert_eq!(
        std::fs::read_to_string(dest.join("a.yaml")).unwrap(),
        "kind: ConfigMap\nname: a\n"
    );
    assert_eq!(
        std::fs::read_to_string(dest.join("b.yaml")).unwrap(),
        "kind: ConfigMap\nname: b\n"
    );
}

#[tokio::test]
async fn unknown_release_is_an_asset_list_error() {
    let base_url = serve().await;
    let client = GithubReleases::new(&base_url).unwrap();

    let err = client.list_assets("acme", "app", 7).await.unwrap_err();
    match err {
        KustomizerError::AssetList(cause) => assert!(cause.contains("404"), "{cause}"),
        other => panic!("expected AssetList, got {other:?}"),
    }
}

#[tokio::test]
async fn missing_asset_is_a_download_error() {
    let base_url = serve().await;
    let client = GithubReleases::new(&base_url).unwrap();
    let dir = tempfile::tempdir().unwrap();
    let asset = ReleaseAsset {
        name: "c.yaml".to_string(),
        browser_download_url: format!("{base_url}/download/c.yaml"),
    };

    let err = client
        .download(&asset, &dir.path().join("c.yaml"))
        .await
        .unwrap_err();
    match err {
        KustomizerError::Download { asset, cause } => {
            assert_eq!(asset, "c.yaml");
            assert!(cause.contains("404"), "{cause}");
        }
        other => panic!("expected Download, got {other:?}"),
    }
}

#[tokio::test]
async fn release_event_publishes_rendered_assets() {
    let base_url = serve().await;
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();

    let overlay_work = root.join("work/overlay");
    init_repo(&overlay_work);
    write(&overlay_work, "kustomization.yaml", "resources:\n- a.yaml\n- b.yaml\n");
    write(&overlay_work, "a.yaml", "kind: ConfigMap\nname: base\n");
    commit_all(&overlay_work, "base overlay");
    let overlay_remote = bare_remote(&overlay_work, &root.join("remotes/overlay.git"));
    let before = remote_commit_count(&overlay_remote, "main");

    let home: PathBuf = root.join("home");
    let settings = Settings::new(
        &home,
        overlay_remote.to_string_lossy(),
        Credentials::new("kustomizer", "token"),
    );
    let pipeline = Pipeline::new(
        Arc::new(settings),
        Arc::new(GithubReleases::new(&base_url).unwrap()),
        Arc::new(ConcatEngine),
    );
    let event = InboundEvent {
        id: Some(RELEASE_ID.to_string()),
        kind: Some(EventKind::Release),
        owner: Some("acme".to_string()),
        repository: Some("app".to_string()),
        clone_url: None,
    };

    let report = Dispatcher::new(Arc::new(pipeline), 1)
        .dispatch(&event)
        .await
        .expect("pipeline run");

    assert!(report.revision.root().starts_with(home.join("acme")));
    assert!(matches!(report.publication, Publication::Pushed { .. }));
    assert_eq!(remote_commit_count(&overlay_remote, "main"), before + 1);
    assert_eq!(
        remote_file(&overlay_remote, "main", "output.yaml"),
        "kind: ConfigMap\nname: a\n---\nkind: ConfigMap\nname: b"
    );
}
