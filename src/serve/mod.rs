mod mapping;
mod substitution;

use anyhow::{Context, Result};
use axum::{
    Router,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{delete, get, post},
};
use rust_embed::RustEmbed;
use std::{
    collections::{HashMap, hash_map::Entry},
    sync::Arc,
};
use tera::Tera;
use tokio::sync::Mutex;
use tracing::info;

use crate::{
    config::Config,
    store::{MappingStore, StoreError},
    substitution::{SelectionChange, SubstitutionEditor},
};

#[derive(RustEmbed)]
#[folder = "$CARGO_MANIFEST_DIR/templates"]
struct Templates;

/// Editing state of one mapping between opening the editor and committing.
pub(crate) struct Session {
    pub editor: SubstitutionEditor,
    pub last_selection: Option<SelectionChange>,
    pub snoop_counter: usize,
}

impl Session {
    fn open(mapping: crate::mapping::Mapping) -> Self {
        Session {
            editor: SubstitutionEditor::open(mapping),
            last_selection: None,
            snoop_counter: 0,
        }
    }
}

pub(crate) struct AppState {
    store: MappingStore,
    tera: Tera,
    sessions: Mutex<HashMap<String, Session>>,
}

impl AppState {
    pub fn new(store: MappingStore) -> Result<Self> {
        Ok(AppState {
            store,
            tera: template_new()?,
            sessions: Mutex::new(HashMap::new()),
        })
    }

    pub fn store(&self) -> &MappingStore {
        &self.store
    }

    pub fn render(&self, name: &str, context: &tera::Context) -> Result<Html<String>, AppError> {
        let body = self
            .tera
            .render(name, context)
            .with_context(|| format!("could not render template {}", name))?;

        Ok(Html(body))
    }

    /// Runs `f` on the edit session of mapping `id`, opening one from the
    /// store if none exists.
    pub async fn with_session<R>(&self, id: &str, f: impl FnOnce(&mut Session) -> R) -> Result<R> {
        let mut sessions = self.sessions.lock().await;
        let session = match sessions.entry(id.to_string()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let mapping = self.store.get(id)?;
                info!("Opened edit session for mapping {}", id);
                entry.insert(Session::open(mapping))
            }
        };

        Ok(f(session))
    }

    pub async fn close_session(&self, id: &str) -> Option<Session> {
        let session = self.sessions.lock().await.remove(id);
        if session.is_some() {
            info!("Closed edit session for mapping {}", id);
        }
        session
    }
}

pub(crate) struct AppError(anyhow::Error);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self.0.downcast_ref::<StoreError>() {
            Some(StoreError::NotFound(_)) => StatusCode::NOT_FOUND,
            Some(StoreError::InvalidId(_)) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, format!("Something went wrong: {:?}", self.0)).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

pub fn router(store: MappingStore) -> Result<Router> {
    let state = AppState::new(store)?;

    Ok(Router::new()
        .route("/", get(mapping::list))
        .route("/mapping", post(mapping::create))
        .route("/mapping/new", get(mapping::new_form))
        .route("/mapping/{id}", post(mapping::commit).delete(mapping::delete))
        .route("/mapping/{id}/edit", get(mapping::edit))
        .route("/mapping/{id}/cancel", post(mapping::cancel))
        .route("/mapping/{id}/topic", post(mapping::change_topic))
        .route("/mapping/{id}/identifier-level/next", post(mapping::next_identifier_level))
        .route("/mapping/{id}/snooped/next", post(mapping::next_snooped_template))
        .route("/mapping/{id}/test", post(mapping::test))
        .route(
            "/mapping/{id}/substitution",
            post(substitution::add).delete(substitution::clear),
        )
        .route("/mapping/{id}/substitution/{index}", delete(substitution::remove))
        .route("/mapping/{id}/selection/next", post(substitution::select_next))
        .route("/mapping/{id}/selection", delete(substitution::remove_selected))
        .with_state(Arc::new(state)))
}

#[tokio::main]
pub async fn run(config: Config) -> Result<()> {
    let store = MappingStore::open(&config.mappings_dir)
        .with_context(|| format!("could not open mappings dir {:?}", config.mappings_dir))?;
    let app = router(store)?;

    let listener = tokio::net::TcpListener::bind(&config.listen)
        .await
        .with_context(|| format!("could not listen on {}", config.listen))?;

    info!("Serving at http://{}/", config.listen);
    axum::serve(listener, app)
        .await
        .with_context(|| "could not start server")?;

    Ok(())
}

pub fn template_new() -> Result<Tera> {
    let mut templates = Vec::new();
    for path in Templates::iter().filter(|p| p.ends_with(".html")) {
        let file = Templates::get(&path)
            .with_context(|| format!("embedded template disappeared: {}", path))?;
        let content = String::from_utf8(file.data.into_owned())
            .with_context(|| format!("Template file is not valid UTF-8: {}", path))?;
        templates.push((path.into_owned(), content));
    }

    let mut tera = Tera::default();
    tera.add_raw_templates(templates)
        .with_context(|| "Error loading templates")?;

    Ok(tera)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_templates_load() {
        let tera = template_new().unwrap();
        let names: Vec<&str> = tera.get_template_names().collect();
        assert!(names.contains(&"index.html"));
        assert!(names.contains(&"substitution/panel_partial.html"));
    }
}
