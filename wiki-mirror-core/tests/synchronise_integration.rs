use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::{Duration, Utc};
use tempfile::tempdir;

use wiki_mirror_core::config::{StandalonePage, SyncConfig};
use wiki_mirror_core::contract::{ChildrenPage, MockWikiApi, WikiNode};
use wiki_mirror_core::output::parse_front_matter;
use wiki_mirror_core::synchronise::{synchronise, SyncError};
use wiki_mirror_core::transport::TransportError;

fn days_ago(days: i64) -> Option<String> {
    Some((Utc::now() - Duration::days(days)).timestamp().to_string())
}

fn node(token: &str, title: &str, has_child: bool, edited: Option<String>) -> WikiNode {
    WikiNode {
        node_token: token.to_string(),
        obj_token: format!("obj_{token}"),
        obj_type: "docx".to_string(),
        title: title.to_string(),
        has_child,
        edit_timestamp: edited,
    }
}

/// In-memory wiki: children per node token and content per obj token.
#[derive(Default)]
struct FakeWiki {
    children: HashMap<String, Vec<WikiNode>>,
    contents: HashMap<String, Result<String, TransportError>>,
    fetched: Arc<Mutex<Vec<String>>>,
}

impl FakeWiki {
    fn child(mut self, parent: &str, node: WikiNode) -> Self {
        self.children.entry(parent.to_string()).or_default().push(node);
        self
    }

    fn content(mut self, node_token: &str, markdown: &str) -> Self {
        self.contents
            .insert(format!("obj_{node_token}"), Ok(markdown.to_string()));
        self
    }

    fn failing(mut self, node_token: &str, error: TransportError) -> Self {
        self.contents.insert(format!("obj_{node_token}"), Err(error));
        self
    }

    fn into_mock(self) -> (MockWikiApi, Arc<Mutex<Vec<String>>>) {
        let mut api = MockWikiApi::new();
        api.expect_authenticate().returning(|| Ok(()));

        let children = self.children;
        api.expect_list_children().returning(move |token, _| {
            Ok(ChildrenPage {
                items: children.get(token).cloned().unwrap_or_default(),
                has_more: false,
                page_token: None,
            })
        });

        let contents = self.contents;
        let fetched = Arc::clone(&self.fetched);
        api.expect_fetch_content().returning(move |obj_token| {
            fetched.lock().unwrap().push(obj_token.to_string());
            contents
                .get(obj_token)
                .cloned()
                .unwrap_or_else(|| panic!("unexpected fetch of {obj_token}"))
        });
        (api, self.fetched)
    }
}

fn config(output_dir: &Path, freshness_days: u32) -> SyncConfig {
    let mut config = SyncConfig::new(output_dir, "space", "root");
    config.freshness_days = freshness_days;
    config
}

fn front_matter(path: &Path) -> serde_yaml::Value {
    let text = fs::read_to_string(path).unwrap();
    parse_front_matter(&text).unwrap()
}

#[tokio::test]
async fn writes_index_and_leaf_under_resolved_slugs() {
    let out = tempdir().unwrap();
    let (api, _) = FakeWiki::default()
        .child("root", node("n_guide", "Guide", true, None))
        .child("n_guide", node("abc123", "Details", false, None))
        .content("n_guide", "```text\nslug: guide\n```\n\n# Guide\n\nWelcome\\!")
        .content("abc123", "Leaf body")
        .into_mock();

    let report = synchronise(&config(out.path(), 0), &api).await.unwrap();

    assert_eq!(report.discovered, 2);
    assert_eq!(report.stale, 2);
    assert_eq!(report.written, 2);
    assert_eq!(report.failed, 0);

    let index = out.path().join("guide/index.md");
    assert_eq!(
        fs::read_to_string(&index).unwrap(),
        "---\ntitle: Guide\nsidebar_position: 1\n---\n\n# Guide\n\nWelcome!\n"
    );

    let leaf = out.path().join("guide/abc123.md");
    let meta = front_matter(&leaf);
    assert_eq!(meta.get("title").and_then(|v| v.as_str()), Some("Details"));
    assert!(meta.get("slug").is_none());
    assert_eq!(meta.get("sidebar_position").and_then(|v| v.as_u64()), Some(1));
}

#[tokio::test]
async fn second_identical_run_leaves_files_unchanged() {
    let out = tempdir().unwrap();
    let wiki = || {
        FakeWiki::default()
            .child("root", node("leaf", "Leaf", false, None))
            .content("leaf", "```\nslug: leaf-page\n```\nText")
            .into_mock()
            .0
    };

    let first = synchronise(&config(out.path(), 0), &wiki()).await.unwrap();
    assert_eq!(first.written, 1);
    let second = synchronise(&config(out.path(), 0), &wiki()).await.unwrap();
    assert_eq!(second.written, 0);
    assert_eq!(second.unchanged, 1);
    assert!(out.path().join("leaf-page.md").exists());
}

#[tokio::test]
async fn fresh_documents_are_not_fetched_or_touched() {
    let out = tempdir().unwrap();
    let existing = out.path().join("old-doc.md");
    fs::write(&existing, "local copy").unwrap();

    let (api, fetched) = FakeWiki::default()
        .child("root", node("old-doc", "Old", false, days_ago(10)))
        .child("root", node("new-doc", "New", false, days_ago(1)))
        .content("new-doc", "fresh edit")
        .into_mock();

    let report = synchronise(&config(out.path(), 3), &api).await.unwrap();

    assert_eq!(report.fresh, 1);
    assert_eq!(report.stale, 1);
    assert_eq!(*fetched.lock().unwrap(), vec!["obj_new-doc".to_string()]);
    assert_eq!(fs::read_to_string(&existing).unwrap(), "local copy");
    let new_doc = fs::read_to_string(out.path().join("new-doc.md")).unwrap();
    assert!(new_doc.contains("sidebar_position: 2"));
}

#[tokio::test]
async fn fresh_ancestor_slug_is_looked_up_without_writing_it() {
    let out = tempdir().unwrap();
    let (api, fetched) = FakeWiki::default()
        .child("root", node("n_parent", "Parent", true, days_ago(30)))
        .child("n_parent", node("n_child", "Child", false, days_ago(0)))
        .content("n_parent", "```text\nslug: handbook\n```\nParent body")
        .content("n_child", "```text\nslug: onboarding\n```\nChild body")
        .into_mock();

    let report = synchronise(&config(out.path(), 3), &api).await.unwrap();

    assert_eq!(report.written, 1);
    assert!(out.path().join("handbook/onboarding.md").exists());
    assert!(!out.path().join("handbook/index.md").exists());
    assert_eq!(fetched.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn disabled_ancestor_lookup_falls_back_to_raw_tokens() {
    let out = tempdir().unwrap();
    let (api, fetched) = FakeWiki::default()
        .child("root", node("n_parent", "Parent", true, days_ago(30)))
        .child("n_parent", node("n_child", "Child", false, days_ago(0)))
        .content("n_child", "```text\nslug: onboarding\n```\nChild body")
        .into_mock();

    let mut config = config(out.path(), 3);
    config.resolve_ancestor_slugs = false;
    synchronise(&config, &api).await.unwrap();

    assert!(out.path().join("n_parent/onboarding.md").exists());
    assert_eq!(*fetched.lock().unwrap(), vec!["obj_n_child".to_string()]);
}

#[tokio::test]
async fn moved_slug_replaces_the_stale_sibling() {
    let out = tempdir().unwrap();
    let guide = out.path().join("guide");
    fs::create_dir_all(&guide).unwrap();
    fs::write(
        guide.join("renamed-before.md"),
        "---\ntitle: Intro\nslug: intro\n---\n\nold body\n",
    )
    .unwrap();

    let (api, _) = FakeWiki::default()
        .child("root", node("n_guide", "Guide", true, None))
        .child("n_guide", node("n_intro", "Intro", false, None))
        .content("n_guide", "```text\nslug: guide\n```\nGuide")
        .content("n_intro", "```text\nslug: intro\n```\nnew body")
        .into_mock();

    let report = synchronise(&config(out.path(), 0), &api).await.unwrap();

    assert_eq!(report.removed_duplicates, 1);
    assert!(!guide.join("renamed-before.md").exists());
    let intro = guide.join("intro.md");
    assert_eq!(
        front_matter(&intro).get("slug").and_then(|v| v.as_str()),
        Some("intro")
    );
}

#[tokio::test]
async fn empty_and_failing_documents_are_skipped() {
    let out = tempdir().unwrap();
    let previous = out.path().join("blank.md");
    fs::write(&previous, "previous content").unwrap();

    let (api, _) = FakeWiki::default()
        .child("root", node("blank", "Blank", false, None))
        .child("root", node("broken", "Broken", false, None))
        .child("root", node("fine", "Fine", false, None))
        .content("blank", "  \n ")
        .failing(
            "broken",
            TransportError::Api {
                code: 1770002,
                msg: "not found".into(),
            },
        )
        .content("fine", "ok")
        .into_mock();

    let report = synchronise(&config(out.path(), 0), &api).await.unwrap();

    assert_eq!(report.empty, 1);
    assert_eq!(report.failed, 1);
    assert_eq!(report.written, 1);
    assert_eq!(fs::read_to_string(&previous).unwrap(), "previous content");
    assert!(!out.path().join("broken.md").exists());
    assert!(out.path().join("fine.md").exists());
}

#[tokio::test]
async fn listing_failure_aborts_the_run() {
    let out = tempdir().unwrap();
    let mut api = MockWikiApi::new();
    api.expect_authenticate().returning(|| Ok(()));
    api.expect_list_children().returning(|token, _| match token {
        "root" => Ok(ChildrenPage {
            items: vec![node("dir", "Dir", true, None)],
            has_more: false,
            page_token: None,
        }),
        _ => Err(TransportError::Status {
            url: "http://wiki/nodes".into(),
            status: 500,
            code: None,
            message: "boom".into(),
        }),
    });
    api.expect_fetch_content().never();

    let err = synchronise(&config(out.path(), 0), &api).await.unwrap_err();
    assert!(matches!(err, SyncError::Discovery(ref e) if e.node_token == "dir"));
    assert_eq!(fs::read_dir(out.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn authentication_failure_aborts_the_run() {
    let out = tempdir().unwrap();
    let mut api = MockWikiApi::new();
    api.expect_authenticate().returning(|| {
        Err(TransportError::Api {
            code: 10014,
            msg: "app secret invalid".into(),
        })
    });
    api.expect_list_children().never();

    let err = synchronise(&config(out.path(), 0), &api).await.unwrap_err();
    assert!(matches!(err, SyncError::Authentication(_)));
    assert!(err.to_string().contains("app secret invalid"));
}

#[tokio::test]
async fn disabled_run_makes_no_remote_calls() {
    let out = tempdir().unwrap();
    let api = MockWikiApi::new();
    let mut config = config(out.path(), 0);
    config.disabled = true;

    let report = synchronise(&config, &api).await.unwrap();
    assert!(report.skipped);
    assert_eq!(report.discovered, 0);
}

#[tokio::test]
async fn standalone_page_is_written_at_its_fixed_location() {
    let out = tempdir().unwrap();
    let (api, _) = FakeWiki::default()
        .content("about", "# About us &amp; friends")
        .into_mock();

    let mut config = config(out.path(), 3);
    config.standalone_pages.push(StandalonePage {
        obj_token: "obj_about".into(),
        title: "About".into(),
        output: "pages/about.md".into(),
    });

    let report = synchronise(&config, &api).await.unwrap();

    assert_eq!(report.written, 1);
    let about = out.path().join("pages/about.md");
    assert_eq!(
        fs::read_to_string(&about).unwrap(),
        "---\ntitle: About\nsidebar_position: 0\n---\n\n# About us & friends\n"
    );
}
