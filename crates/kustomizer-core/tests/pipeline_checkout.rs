//! End-to-end runs of the clone-and-checkout strategy against local remotes.

mod common;

use common::*;
use kustomizer_core::{
    Credentials, Dispatcher, EventKind, GithubReleases, InboundEvent, KustomizerError, Pipeline,
    Publication, Revision, Settings,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;

struct Fixture {
    _dir: tempfile::TempDir,
    home: PathBuf,
    overlay_remote: PathBuf,
    source_remote: PathBuf,
    tagged: String,
    tip: String,
}

/// Overlay with a base deployment; source with an override tagged v1.2.0
/// and one later commit on top.
fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();

    let overlay_work = root.join("work/overlay");
    init_repo(&overlay_work);
    write(&overlay_work, "kustomization.yaml", "resources:\n- deployment.yaml\n- service.yaml\n");
    write(&overlay_work, "deployment.yaml", "kind: Deployment\nimage: base\n");
    write(&overlay_work, "service.yaml", "kind: Service\n");
    commit_all(&overlay_work, "base overlay");
    let overlay_remote = bare_remote(&overlay_work, &root.join("remotes/overlay.git"));

    let source_work = root.join("work/app");
    init_repo(&source_work);
    write(&source_work, "deployment.yaml", "kind: Deployment\nimage: app:v1.2.0\n");
    write(&source_work, "README.md", "app\n");
    let tagged = commit_all(&source_work, "release 1.2.0");
    git(&source_work, &["tag", "v1.2.0"]);
    write(&source_work, "deployment.yaml", "kind: Deployment\nimage: app:next\n");
    let tip = commit_all(&source_work, "next");
    let source_remote = bare_remote(&source_work, &root.join("remotes/app.git"));

    Fixture {
        home: root.join("home"),
        overlay_remote,
        source_remote,
        tagged,
        tip,
        _dir: dir,
    }
}

fn dispatcher(f: &Fixture) -> Dispatcher {
    let settings = Settings::new(
        &f.home,
        f.overlay_remote.to_string_lossy(),
        Credentials::new("kustomizer", "token"),
    );
    let pipeline = Pipeline::new(
        Arc::new(settings),
        Arc::new(GithubReleases::new("http://127.0.0.1:9").unwrap()),
        Arc::new(ConcatEngine),
    );
    Dispatcher::new(Arc::new(pipeline), 4)
}

fn event(f: &Fixture, kind: EventKind, id: &str) -> InboundEvent {
    InboundEvent {
        id: Some(id.to_string()),
        kind: Some(kind),
        owner: Some("acme".to_string()),
        repository: Some("app".to_string()),
        clone_url: Some(f.source_remote.to_string_lossy().into_owned()),
    }
}

fn dir_entries(path: &Path) -> usize {
    std::fs::read_dir(path).map(|d| d.count()).unwrap_or(0)
}

#[tokio::test]
async fn tag_event_renders_and_pushes_one_commit() {
    let f = fixture();
    let before = remote_commit_count(&f.overlay_remote, "main");

    let report = dispatcher(&f)
        .dispatch(&event(&f, EventKind::Tag, "v1.2.0"))
        .await
        .expect("pipeline run");

    match &report.revision {
        Revision::Commit { hash, .. } => assert_eq!(hash, &f.tagged),
        other => panic!("expected commit revision, got {other:?}"),
    }
    match &report.publication {
        Publication::Pushed { message, .. } => assert_eq!(message, "adding output.yaml"),
        other => panic!("expected push, got {other:?}"),
    }
    assert_eq!(report.merge.overridden, 1);

    assert_eq!(remote_commit_count(&f.overlay_remote, "main"), before + 1);
    assert_eq!(changed_files(&f.overlay_remote, "main"), vec!["output.yaml"]);

    let rendered = remote_file(&f.overlay_remote, "main", "output.yaml");
    assert_eq!(
        rendered,
        "kind: Deployment\nimage: app:v1.2.0\n---\nkind: Service"
    );

    let author = git(&f.overlay_remote, &["log", "-1", "--format=%an <%ae>", "main"]);
    assert_eq!(author, "kustomizer <kustomizer@triggermesh.io>");
}

#[tokio::test]
async fn unchanged_revision_publishes_nothing_the_second_time() {
    let f = fixture();
    let dispatcher = dispatcher(&f);
    let tag = event(&f, EventKind::Tag, "v1.2.0");

    let first = dispatcher.dispatch(&tag).await.expect("first run");
    let count = remote_commit_count(&f.overlay_remote, "main");
    let second = dispatcher.dispatch(&tag).await.expect("second run");

    assert_eq!(first.manifest.digest, second.manifest.digest);
    assert_eq!(
        std::fs::read(&first.manifest.path).unwrap(),
        std::fs::read(&second.manifest.path).unwrap()
    );
    assert_ne!(first.run_id, second.run_id);
    assert_eq!(second.publication, Publication::Unchanged);
    assert_eq!(remote_commit_count(&f.overlay_remote, "main"), count);
}

#[tokio::test]
async fn commit_event_updates_existing_manifest() {
    let f = fixture();
    let dispatcher = dispatcher(&f);

    dispatcher
        .dispatch(&event(&f, EventKind::Tag, "v1.2.0"))
        .await
        .expect("tag run");
    let report = dispatcher
        .dispatch(&event(&f, EventKind::Commit, &f.tip))
        .await
        .expect("commit run");

    match &report.publication {
        Publication::Pushed { message, .. } => assert_eq!(message, "updating output.yaml"),
        other => panic!("expected push, got {other:?}"),
    }
    let rendered = remote_file(&f.overlay_remote, "main", "output.yaml");
    assert!(rendered.contains("image: app:next"), "{rendered}");
    assert_eq!(changed_files(&f.overlay_remote, "main"), vec!["output.yaml"]);
}

#[tokio::test]
async fn unknown_tag_fails_and_keeps_workspace() {
    let f = fixture();
    let before = remote_commit_count(&f.overlay_remote, "main");

    let err = dispatcher(&f)
        .dispatch(&event(&f, EventKind::Tag, "v3.0"))
        .await
        .unwrap_err();

    match err {
        KustomizerError::TagNotFound { name } => assert_eq!(name, "v3.0"),
        other => panic!("expected TagNotFound, got {other:?}"),
    }
    assert_eq!(remote_commit_count(&f.overlay_remote, "main"), before);
    // The cloned source stays behind for inspection; later stages never ran.
    assert_eq!(dir_entries(&f.home.join("acme")), 1);
}

#[tokio::test]
async fn build_failure_stops_before_publish() {
    let f = fixture();
    let overlay_work = f.home.parent().unwrap().join("work/overlay");
    write(&overlay_work, "kustomization.yaml", "resources:\n- missing.yaml\n");
    commit_all(&overlay_work, "broken overlay");
    git(
        &overlay_work,
        &["push", "--quiet", &f.overlay_remote.to_string_lossy(), "main"],
    );
    let before = remote_commit_count(&f.overlay_remote, "main");

    let err = dispatcher(&f)
        .dispatch(&event(&f, EventKind::Tag, "v1.2.0"))
        .await
        .unwrap_err();

    match err {
        KustomizerError::Build { cause } => assert!(cause.contains("missing.yaml"), "{cause}"),
        other => panic!("expected Build, got {other:?}"),
    }
    assert_eq!(remote_commit_count(&f.overlay_remote, "main"), before);
}

#[tokio::test]
async fn unreachable_overlay_is_a_clone_error() {
    let f = fixture();
    let settings = Settings::new(
        &f.home,
        f.home.join("no-such-overlay.git").to_string_lossy(),
        Credentials::new("kustomizer", "token"),
    );
    let pipeline = Pipeline::new(
        Arc::new(settings),
        Arc::new(GithubReleases::new("http://127.0.0.1:9").unwrap()),
        Arc::new(ConcatEngine),
    );

    let err = Dispatcher::new(Arc::new(pipeline), 1)
        .dispatch(&event(&f, EventKind::Tag, "v1.2.0"))
        .await
        .unwrap_err();
    assert!(matches!(err, KustomizerError::Clone { .. }), "{err:?}");
}

#[tokio::test]
async fn concurrent_events_for_one_repository_are_serialized() {
    let f = fixture();
    let dispatcher = dispatcher(&f);
    let before = remote_commit_count(&f.overlay_remote, "main");
    let tag = event(&f, EventKind::Tag, "v1.2.0");

    let (a, b) = tokio::join!(dispatcher.dispatch(&tag), dispatcher.dispatch(&tag));
    let (a, b) = (a.expect("run a"), b.expect("run b"));

    assert_ne!(a.run_id, b.run_id);
    let pushed = [&a, &b]
        .iter()
        .filter(|r| matches!(r.publication, Publication::Pushed { .. }))
        .count();
    assert_eq!(pushed, 1);
    assert_eq!(remote_commit_count(&f.overlay_remote, "main"), before + 1);
}
