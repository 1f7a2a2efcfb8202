use anyhow::{Context, Result};
use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use mqtt_mapping_admin::{
    mapping::Mapping,
    serve,
    store::MappingStore,
    substitution::{IDENTITY_TARGET_PATH, MappingSubstitution},
};
use tempdir::TempDir;
use tower::ServiceExt;

struct TestApp {
    app: Router,
    store: MappingStore,
    _tempdir: TempDir,
}

impl TestApp {
    fn new() -> Result<Self> {
        let tempdir = TempDir::new("mapping-admin-tests").context("could not create tempdir")?;
        let store = MappingStore::open(tempdir.path())?;
        let app = serve::router(MappingStore::open(tempdir.path())?)?;

        Ok(TestApp {
            app,
            store,
            _tempdir: tempdir,
        })
    }

    async fn send(&self, method: &str, uri: &str, form: &str) -> Result<(StatusCode, String, Option<String>)> {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(form.to_string()))?;
        let response = self.app.clone().oneshot(request).await?;

        let status = response.status();
        let location = response
            .headers()
            .get(header::LOCATION)
            .and_then(|l| l.to_str().ok())
            .map(String::from);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;

        Ok((status, String::from_utf8(bytes.to_vec())?, location))
    }

    /// Creates a mapping through the new-mapping form and returns its id.
    async fn create(&self, topic: &str) -> Result<String> {
        let (status, _, location) = self.send("POST", "/mapping", &format!("topic={}", topic)).await?;
        assert_eq!(status, StatusCode::SEE_OTHER);

        let location = location.context("create did not redirect")?;
        let id = location
            .strip_prefix("/mapping/")
            .and_then(|rest| rest.strip_suffix("/edit"))
            .context("unexpected redirect target")?;

        Ok(id.to_string())
    }

    async fn add(&self, id: &str, form: &str) -> Result<String> {
        let (status, body, _) = self.send("POST", &format!("/mapping/{}/substitution", id), form).await?;
        assert_eq!(status, StatusCode::OK);
        Ok(body)
    }

    async fn commit(&self, id: &str, topic: &str) -> Result<Mapping> {
        let form = format!("topic={}&template_topic={}", topic, topic);
        let (status, body, _) = self.send("POST", &format!("/mapping/{}", id), &form).await?;
        assert_eq!(status, StatusCode::SEE_OTHER, "commit rejected: {}", body);

        Ok(self.store.get(id)?)
    }
}

fn sub(source: &str, target: &str, defines_identifier: bool) -> MappingSubstitution {
    MappingSubstitution::new(source, target, defines_identifier).unwrap()
}

#[tokio::test]
async fn test_create_seeds_wildcard_identifier() -> Result<()> {
    let app = TestApp::new()?;
    let wildcard = app.create("device/%2B/data").await?;
    let plain = app.create("device/110").await?;

    assert_eq!(
        app.store.get(&wildcard)?.substitutions,
        vec![MappingSubstitution::identifier_from_topic()]
    );
    assert!(app.store.get(&plain)?.substitutions.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_add_keeps_last_identifier() -> Result<()> {
    let app = TestApp::new()?;
    let id = app.create("device/%2B/data").await?;

    app.add(&id, "path_source=temp&path_target=c8y_T.T.value").await?;
    app.add(&id, "path_source=serial&path_target=source.id").await?;
    let body = app.add(&id, "path_source=&path_target=x").await?;
    assert!(body.contains("source path is missing"), "{}", body);

    let stored = app.commit(&id, "device/%2B/data").await?;
    assert_eq!(
        stored.substitutions,
        vec![
            MappingSubstitution {
                defines_identifier: false,
                ..MappingSubstitution::identifier_from_topic()
            },
            sub("temp", "c8y_T.T.value", false),
            sub("serial", IDENTITY_TARGET_PATH, true),
        ]
    );

    Ok(())
}

#[tokio::test]
async fn test_clear_reseeds_wildcard_topic() -> Result<()> {
    let app = TestApp::new()?;
    let id = app.create("device/%2B").await?;
    app.add(&id, "path_source=a&path_target=b").await?;
    app.add(&id, "path_source=c&path_target=d&defines_identifier=on").await?;

    let (status, _, _) = app.send("DELETE", &format!("/mapping/{}/substitution", id), "").await?;
    assert_eq!(status, StatusCode::OK);

    let stored = app.commit(&id, "device/%2B").await?;
    assert_eq!(stored.substitutions, vec![MappingSubstitution::identifier_from_topic()]);

    Ok(())
}

#[tokio::test]
async fn test_remove_selected_takes_highlighted() -> Result<()> {
    let app = TestApp::new()?;
    let id = app.create("device/110").await?;
    for source in ["a", "b", "c"] {
        app.add(&id, &format!("path_source={}&path_target=t.{}", source, source)).await?;
    }

    let (_, body, _) = app.send("DELETE", &format!("/mapping/{}/selection", id), "").await?;
    assert!(body.contains("class=\"error\""), "nothing highlighted yet: {}", body);

    for _ in 0..2 {
        let (status, _, _) = app.send("POST", &format!("/mapping/{}/selection/next", id), "").await?;
        assert_eq!(status, StatusCode::OK);
    }
    let (status, _, _) = app.send("DELETE", &format!("/mapping/{}/selection", id), "").await?;
    assert_eq!(status, StatusCode::OK);

    let stored = app.commit(&id, "device/110").await?;
    assert_eq!(stored.substitutions, vec![sub("a", "t.a", false), sub("c", "t.c", false)]);

    Ok(())
}

#[tokio::test]
async fn test_topic_change_then_commit() -> Result<()> {
    let app = TestApp::new()?;
    let id = app.create("device/110").await?;
    app.add(&id, "path_source=a&path_target=b").await?;
    app.send("POST", &format!("/mapping/{}/identifier-level/next", id), "").await?;

    let (status, body, _) = app
        .send("POST", &format!("/mapping/{}/topic", id), "topic=sensor/%2B/")
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("id=\"substitutions\""));
    assert!(body.contains("id=\"template-topic\" hx-swap-oob=\"true\""), "{}", body);
    assert!(body.contains("name=\"template_topic\""));

    let stored = app.commit(&id, "sensor/%2B").await?;
    assert_eq!(stored.topic, "sensor/+");
    assert_eq!(stored.template_topic, "sensor/+");
    assert_eq!(stored.identifier_level, None);
    assert_eq!(stored.substitutions, vec![MappingSubstitution::identifier_from_topic()]);

    Ok(())
}

#[tokio::test]
async fn test_topic_change_reports_duplicate() -> Result<()> {
    let app = TestApp::new()?;
    app.create("device/110").await?;
    let id = app.create("device/120").await?;

    let (status, body, _) = app
        .send("POST", &format!("/mapping/{}/topic", id), "topic=device/110/")
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("already used by another mapping"), "{}", body);

    Ok(())
}

#[tokio::test]
async fn test_out_of_range_target_is_reported() -> Result<()> {
    let app = TestApp::new()?;
    let id = app.create("device/110").await?;
    app.add(&id, &format!("path_source=temp&path_target=x[{}]", usize::MAX)).await?;

    let (status, body, _) = app
        .send(
            "POST",
            &format!("/mapping/{}/test", id),
            "topic_sample=device/110&payload=%7B%22temp%22%3A1%7D",
        )
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("is beyond the end of an array"), "{}", body);

    Ok(())
}

#[tokio::test]
async fn test_unknown_mapping_is_not_found() -> Result<()> {
    let app = TestApp::new()?;
    let (status, _, _) = app.send("GET", "/mapping/missing/edit", "").await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    Ok(())
}
