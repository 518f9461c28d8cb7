use actix_multipart::Multipart;
use actix_web::{web, HttpResponse};
use serde::Serialize;

use crate::auth::Auth;
use crate::error::{ApiError, ApiErrorBody};
use crate::form::MessageForm;
use crate::models::*;
use crate::service::MessageStore;
use crate::storage::is_safe_name;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/messages")
            .service(
                web::resource(["", "/"])
                    .route(web::get().to(list_messages)),
            )
            .service(
                web::resource("/add")
                    .route(web::post().to(create_message)),
            )
            .service(
                web::resource("/{id}")
                    .route(web::get().to(get_message))
                    .route(web::put().to(update_message))
                    .route(web::delete().to(delete_message)),
            ),
    );
    // public, so stored identifiers work directly as link targets
    cfg.route("/uploads/{name}", web::get().to(get_attachment));
}

#[derive(Clone)]
pub struct AppState { pub messages: MessageStore }

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct MessageResponse {
    pub message: String,
    pub data: Message,
}

/// Multipart form accepted by create and update (documentation only).
#[derive(utoipa::ToSchema)]
#[allow(dead_code)]
pub struct MessageUpload {
    title: Option<String>,
    description: Option<String>,
    file_type: Option<String>,
    enable: Option<String>,
    start_date: Option<String>,
    end_date: Option<String>,
    #[schema(value_type = Vec<String>, format = Binary)]
    content: Vec<Vec<u8>>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct StatusResponse {
    pub message: String,
}

#[utoipa::path(
    get,
    path = "/messages",
    responses(
        (status = 200, description = "Messages owned by the caller", body = [Message]),
        (status = 401, description = "Unauthorized"),
        (status = 500, description = "Store failure", body = ApiErrorBody)
    )
)]
pub async fn list_messages(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let messages = data.messages.list(auth.owner_id()).await?;
    Ok(HttpResponse::Ok().json(messages))
}

#[utoipa::path(
    get,
    path = "/messages/{id}",
    params(("id" = Id, Path, description = "Message id")),
    responses(
        (status = 200, description = "Message", body = Message),
        (status = 404, description = "Not found or not owned", body = ApiErrorBody)
    )
)]
pub async fn get_message(auth: Auth, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    let message = data.messages.get(path.into_inner(), auth.owner_id()).await?;
    Ok(HttpResponse::Ok().json(message))
}

#[utoipa::path(
    post,
    path = "/messages/add",
    request_body(content = MessageUpload, content_type = "multipart/form-data", description = "`title` (required), `description`, `file_type`, `enable`, `start_date`, `end_date`, files in `content`"),
    responses(
        (status = 200, description = "Message created", body = MessageResponse),
        (status = 400, description = "Missing title, bad field or too many files", body = ApiErrorBody),
        (status = 413, description = "File too large", body = ApiErrorBody),
        (status = 500, description = "Store or file failure", body = ApiErrorBody)
    )
)]
pub async fn create_message(auth: Auth, data: web::Data<AppState>, payload: Multipart) -> Result<HttpResponse, ApiError> {
    let form = MessageForm::read(payload, data.messages.limits()).await?;
    let (new, uploads) = form.into_new_message()?;
    let message = data.messages.create(auth.owner_id(), new, uploads).await?;
    Ok(HttpResponse::Ok().json(MessageResponse { message: "Message added successfully".into(), data: message }))
}

#[utoipa::path(
    put,
    path = "/messages/{id}",
    params(("id" = Id, Path, description = "Message id")),
    request_body(content = MessageUpload, content_type = "multipart/form-data", description = "Any subset of the create fields; files in `content` replace all current attachments"),
    responses(
        (status = 200, description = "Message updated", body = MessageResponse),
        (status = 400, description = "Bad field or too many files", body = ApiErrorBody),
        (status = 404, description = "Not found or not owned", body = ApiErrorBody),
        (status = 500, description = "Store or file failure", body = ApiErrorBody)
    )
)]
pub async fn update_message(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: Multipart,
) -> Result<HttpResponse, ApiError> {
    let form = MessageForm::read(payload, data.messages.limits()).await?;
    let (changes, uploads) = form.into_update()?;
    let message = data.messages.update(path.into_inner(), auth.owner_id(), changes, uploads).await?;
    Ok(HttpResponse::Ok().json(MessageResponse { message: "Message updated successfully".into(), data: message }))
}

#[utoipa::path(
    delete,
    path = "/messages/{id}",
    params(("id" = Id, Path, description = "Message id")),
    responses(
        (status = 200, description = "Message deleted", body = StatusResponse),
        (status = 404, description = "Not found or not owned", body = ApiErrorBody),
        (status = 500, description = "Store failure", body = ApiErrorBody)
    )
)]
pub async fn delete_message(auth: Auth, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();
    let report = data.messages.delete(id, auth.owner_id()).await?;
    if !report.failed.is_empty() {
        tracing::warn!(message_id = id, failed = ?report.failed, "message deleted with leftover attachments");
    }
    Ok(HttpResponse::Ok().json(StatusResponse { message: "Message deleted successfully".into() }))
}

#[utoipa::path(
    get,
    path = "/uploads/{name}",
    params(("name" = String, Path, description = "Storage identifier from a message's `attachments`")),
    responses(
        (status = 200, description = "Attachment bytes with a sniffed content type"),
        (status = 404, description = "No such attachment", body = ApiErrorBody),
        (status = 500, description = "File store failure", body = ApiErrorBody)
    )
)]
pub async fn get_attachment(data: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse, ApiError> {
    let name = path.into_inner();
    if !is_safe_name(&name) {
        return Err(ApiError::AttachmentNotFound);
    }
    let (bytes, mime) = data.messages.attachment(&name).await?;
    Ok(HttpResponse::Ok().insert_header(("Content-Type", mime)).body(bytes))
}
