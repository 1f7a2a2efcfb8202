use axum::{extract, response::Html};
use serde::Deserialize;
use std::sync::Arc;
use tracing::warn;

use crate::{
    serve::{AppError, AppState, mapping::panel_context},
    substitution::MappingSubstitution,
};

#[derive(Deserialize)]
pub struct SubstitutionForm {
    #[serde(default)]
    path_source: String,
    #[serde(default)]
    path_target: String,
    #[serde(default)]
    defines_identifier: Option<String>,
}

#[axum::debug_handler]
pub async fn add(
    extract::State(state): extract::State<Arc<AppState>>,
    extract::Path(id): extract::Path<String>,
    extract::Form(sub_form): extract::Form<SubstitutionForm>,
) -> Result<Html<String>, AppError> {
    let context = state
        .with_session(&id, |session| {
            let error = match MappingSubstitution::new(
                &sub_form.path_source,
                &sub_form.path_target,
                sub_form.defines_identifier.is_some(),
            ) {
                Ok(substitution) => {
                    session.editor.add(substitution);
                    None
                }
                Err(e) => Some(e.to_string()),
            };
            panel_context(&id, session, error)
        })
        .await?;

    state.render("substitution/panel_partial.html", &context)
}

#[axum::debug_handler]
pub async fn clear(
    extract::State(state): extract::State<Arc<AppState>>,
    extract::Path(id): extract::Path<String>,
) -> Result<Html<String>, AppError> {
    let context = state
        .with_session(&id, |session| {
            session.editor.clear();
            session.last_selection = None;
            panel_context(&id, session, None)
        })
        .await?;

    state.render("substitution/panel_partial.html", &context)
}

#[axum::debug_handler]
pub async fn remove(
    extract::State(state): extract::State<Arc<AppState>>,
    extract::Path((id, index)): extract::Path<(String, usize)>,
) -> Result<Html<String>, AppError> {
    let context = state
        .with_session(&id, |session| {
            let error = match session.editor.remove_at(index) {
                Ok(_) => None,
                Err(e) => {
                    warn!("Could not remove substitution of mapping {}: {}", id, e);
                    Some(e.to_string())
                }
            };
            session.last_selection = None;
            panel_context(&id, session, error)
        })
        .await?;

    state.render("substitution/panel_partial.html", &context)
}

#[axum::debug_handler]
pub async fn select_next(
    extract::State(state): extract::State<Arc<AppState>>,
    extract::Path(id): extract::Path<String>,
) -> Result<Html<String>, AppError> {
    let context = state
        .with_session(&id, |session| {
            session.last_selection = session.editor.cycle_select();
            panel_context(&id, session, None)
        })
        .await?;

    state.render("substitution/panel_partial.html", &context)
}

#[axum::debug_handler]
pub async fn remove_selected(
    extract::State(state): extract::State<Arc<AppState>>,
    extract::Path(id): extract::Path<String>,
) -> Result<Html<String>, AppError> {
    let context = state
        .with_session(&id, |session| {
            let error = match session.editor.remove_selected() {
                Ok(_) => None,
                Err(e) => {
                    warn!("Could not remove selected substitution of mapping {}: {}", id, e);
                    Some(e.to_string())
                }
            };
            session.last_selection = None;
            panel_context(&id, session, error)
        })
        .await?;

    state.render("substitution/panel_partial.html", &context)
}
