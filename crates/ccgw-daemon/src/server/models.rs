//! Model catalogue endpoints.

use axum::Json;
use axum::extract::Path;
use ccgw_core::models::{available_models, find_model};
use ccgw_core::openai::{ModelList, ModelObject};

use super::ApiError;

pub async fn list_models() -> Json<ModelList> {
    Json(ModelList {
        object: "list".to_string(),
        data: available_models().iter().map(ModelObject::from).collect(),
    })
}

pub async fn get_model(Path(id): Path<String>) -> Result<Json<ModelObject>, ApiError> {
    find_model(&id)
        .map(|info| Json(ModelObject::from(info)))
        .ok_or_else(|| ApiError::NotFound(format!("Model '{id}' not found")))
}
