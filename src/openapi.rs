use crate::error::ApiErrorBody;
use crate::models::Message;
use crate::routes::{MessageResponse, MessageUpload, StatusResponse};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::list_messages,
        crate::routes::get_message,
        crate::routes::create_message,
        crate::routes::update_message,
        crate::routes::delete_message,
        crate::routes::get_attachment,
    ),
    components(schemas(Message, MessageResponse, MessageUpload, StatusResponse, ApiErrorBody)),
    tags(
        (name = "messages", description = "Owner-scoped messages with attachments"),
    )
)]
pub struct ApiDoc;
