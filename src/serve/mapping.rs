use anyhow::Result;
use axum::{
    extract,
    response::{Html, IntoResponse, Redirect, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::{
    form::MappingForm,
    mapping::{self, Api, Mapping, ValidationError, is_topic_unique},
    serve::{AppError, AppState, Session},
    substitution::SubstitutionEditor,
    topic::{derive_sample_topic, normalize_topic, split_levels, validate_topic_sample},
    transform,
};

#[derive(Serialize)]
struct MappingRow<'a> {
    mapping: &'a Mapping,
    issues: Vec<String>,
}

fn messages(errors: &[ValidationError]) -> Vec<String> {
    errors.iter().map(ToString::to_string).collect()
}

fn apis() -> Vec<String> {
    Api::ALL.iter().map(ToString::to_string).collect()
}

fn new_context(form: &MappingForm, errors: &[ValidationError]) -> tera::Context {
    let mut context = tera::Context::new();
    context.insert("id", "");
    context.insert("form", form);
    context.insert("template_topic", &form.template_topic);
    context.insert("apis", &apis());
    context.insert("errors", &messages(errors));
    context
}

fn list_context(mappings: &[Mapping]) -> tera::Context {
    let rows: Vec<MappingRow> = mappings
        .iter()
        .map(|m| MappingRow {
            mapping: m,
            issues: messages(&mapping::validate(m, mappings)),
        })
        .collect();

    let mut context = tera::Context::new();
    context.insert("rows", &rows);
    context
}

/// Context shared by the substitution panel and the edit page.
pub(crate) fn panel_context(id: &str, session: &Session, error: Option<String>) -> tera::Context {
    let mapping = session.editor.mapping();
    let marked_identifier = mapping.identifier_level.and_then(|level| {
        split_levels(&mapping.template_topic).get(level).cloned()
    });

    let mut context = tera::Context::new();
    context.insert("id", id);
    context.insert("substitutions", session.editor.substitutions());
    context.insert("summary", session.editor.summary());
    context.insert("selection", &session.last_selection);
    context.insert("marked_identifier", &marked_identifier);
    context.insert("error", &error);
    context
}

fn edit_context(id: &str, session: &Session, form: &MappingForm, errors: &[ValidationError]) -> tera::Context {
    let mut context = panel_context(id, session, None);
    context.insert("form", form);
    context.insert("template_topic", &form.template_topic);
    context.insert("source_template", &form.source_template);
    context.insert("apis", &apis());
    context.insert("errors", &messages(errors));
    context.insert(
        "topic_sample",
        &derive_sample_topic(&session.editor.mapping().template_topic),
    );
    context
}

#[axum::debug_handler]
pub async fn list(
    extract::State(state): extract::State<Arc<AppState>>,
) -> Result<Html<String>, AppError> {
    let mappings = state.store().list()?;
    state.render("index.html", &list_context(&mappings))
}

#[axum::debug_handler]
pub async fn new_form(
    extract::State(state): extract::State<Arc<AppState>>,
) -> Result<Html<String>, AppError> {
    let form = MappingForm::from_mapping(&Mapping::new(""));
    state.render("mapping/new.html", &new_context(&form, &[]))
}

#[axum::debug_handler]
pub async fn create(
    extract::State(state): extract::State<Arc<AppState>>,
    extract::Form(form): extract::Form<MappingForm>,
) -> Result<Response, AppError> {
    let candidate = SubstitutionEditor::open(form.commit(&Mapping::new(&form.topic))).into_mapping();
    let errors = mapping::validate(&candidate, &state.store().list()?);
    if !errors.is_empty() {
        warn!("Rejected new mapping for topic {}: {:?}", candidate.topic, errors);
        return Ok(state
            .render("mapping/new.html", &new_context(&form, &errors))?
            .into_response());
    }

    let id = state.store().create(candidate)?;
    info!("Created mapping {}", id);

    Ok(Redirect::to(&format!("/mapping/{}/edit", id)).into_response())
}

#[axum::debug_handler]
pub async fn edit(
    extract::State(state): extract::State<Arc<AppState>>,
    extract::Path(id): extract::Path<String>,
) -> Result<Html<String>, AppError> {
    let context = state
        .with_session(&id, |session| {
            let form = MappingForm::from_mapping(session.editor.mapping());
            edit_context(&id, session, &form, &[])
        })
        .await?;

    state.render("mapping/edit.html", &context)
}

#[axum::debug_handler]
pub async fn commit(
    extract::State(state): extract::State<Arc<AppState>>,
    extract::Path(id): extract::Path<String>,
    extract::Form(form): extract::Form<MappingForm>,
) -> Result<Response, AppError> {
    let mappings = state.store().list()?;
    let outcome = state
        .with_session(&id, |session| {
            let candidate = form.commit(session.editor.mapping());
            let errors = mapping::validate(&candidate, &mappings);
            if errors.is_empty() {
                Ok(candidate)
            } else {
                Err(edit_context(&id, session, &form, &errors))
            }
        })
        .await?;

    match outcome {
        Ok(candidate) => {
            state.store().save(&candidate)?;
            state.close_session(&id).await;
            Ok(Redirect::to("/").into_response())
        }
        Err(context) => Ok(state.render("mapping/edit.html", &context)?.into_response()),
    }
}

#[axum::debug_handler]
pub async fn cancel(
    extract::State(state): extract::State<Arc<AppState>>,
    extract::Path(id): extract::Path<String>,
) -> Redirect {
    state.close_session(&id).await;
    Redirect::to("/")
}

#[axum::debug_handler]
pub async fn delete(
    extract::State(state): extract::State<Arc<AppState>>,
    extract::Path(id): extract::Path<String>,
) -> Result<Html<String>, AppError> {
    state.store().delete(&id)?;
    state.close_session(&id).await;

    let mappings = state.store().list()?;
    state.render("mapping/list_partial.html", &list_context(&mappings))
}

#[derive(Deserialize)]
pub struct TopicForm {
    topic: String,
}

#[axum::debug_handler]
pub async fn change_topic(
    extract::State(state): extract::State<Arc<AppState>>,
    extract::Path(id): extract::Path<String>,
    extract::Form(topic_form): extract::Form<TopicForm>,
) -> Result<Html<String>, AppError> {
    let mappings = state.store().list()?;
    let context = state
        .with_session(&id, |session| {
            session.editor.change_topic(&topic_form.topic);
            session.last_selection = None;
            let topic = normalize_topic(&topic_form.topic);
            let error = (!is_topic_unique(&topic, &id, &mappings))
                .then(|| ValidationError::TopicNotUnique(topic).to_string());
            let mut context = panel_context(&id, session, error);
            context.insert("template_topic", &session.editor.mapping().template_topic);
            context.insert("oob", &true);
            context
        })
        .await?;

    // The template topic input follows the topic as an out-of-band swap.
    let Html(panel) = state.render("substitution/panel_partial.html", &context)?;
    let Html(template_topic) = state.render("mapping/template_topic_partial.html", &context)?;
    Ok(Html(panel + &template_topic))
}

#[axum::debug_handler]
pub async fn next_identifier_level(
    extract::State(state): extract::State<Arc<AppState>>,
    extract::Path(id): extract::Path<String>,
) -> Result<Html<String>, AppError> {
    let context = state
        .with_session(&id, |session| {
            session.editor.mark_next_identifier_level();
            panel_context(&id, session, None)
        })
        .await?;

    state.render("substitution/panel_partial.html", &context)
}

#[axum::debug_handler]
pub async fn next_snooped_template(
    extract::State(state): extract::State<Arc<AppState>>,
    extract::Path(id): extract::Path<String>,
) -> Result<Html<String>, AppError> {
    let source_template = state
        .with_session(&id, |session| {
            let Session {
                editor,
                snoop_counter,
                ..
            } = session;
            editor
                .load_next_snooped_template(snoop_counter)
                .map(String::from)
        })
        .await?;

    let mut context = tera::Context::new();
    context.insert("id", &id);
    context.insert("source_template", &source_template);
    state.render("mapping/source_partial.html", &context)
}

#[derive(Deserialize)]
pub struct TestForm {
    topic_sample: String,
    #[serde(default)]
    payload: String,
}

#[axum::debug_handler]
pub async fn test(
    extract::State(state): extract::State<Arc<AppState>>,
    extract::Path(id): extract::Path<String>,
    extract::Form(test_form): extract::Form<TestForm>,
) -> Result<Html<String>, AppError> {
    let outcome = state
        .with_session(&id, |session| {
            let mapping = session.editor.mapping();
            validate_topic_sample(&mapping.template_topic, &test_form.topic_sample).map_err(|e| e.to_string())?;
            if test_form.payload.trim().is_empty() {
                return transform::apply_to_template(mapping, &test_form.topic_sample)
                    .map_err(|e| e.to_string());
            }
            let payload: serde_json::Value =
                serde_json::from_str(&test_form.payload).map_err(|e| format!("payload is not valid JSON: {}", e))?;
            transform::apply(mapping, &test_form.topic_sample, &payload).map_err(|e| e.to_string())
        })
        .await?;

    if let Err(error) = &outcome {
        warn!("Test of mapping {} failed: {}", id, error);
    }
    let mut context = tera::Context::new();
    context.insert("result", &outcome.as_ref().ok());
    context.insert("error", &outcome.as_ref().err());
    state.render("mapping/test_partial.html", &context)
}
