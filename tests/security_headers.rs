#![cfg(feature = "inmem-store")]

use actix_web::{test, web, App};
use noticeboard::auth::create_jwt;
use noticeboard::config::UploadLimits;
use noticeboard::repo::inmem::InMemRepo;
use noticeboard::storage::FsAttachmentStore;
use noticeboard::{config, AppState, MessageStore, SecurityHeaders};
use std::sync::Arc;

fn app_state(dir: &std::path::Path) -> AppState {
    AppState {
        messages: MessageStore::new(
            Arc::new(InMemRepo::new()),
            Arc::new(FsAttachmentStore::new(dir)),
            UploadLimits::default(),
        ),
    }
}

fn token() -> String {
    std::env::set_var("JWT_SECRET", "test-secret-must-be-32-bytes-long!!");
    create_jwt(1, None).unwrap()
}

#[actix_web::test]
#[serial_test::serial]
async fn test_security_headers_present() {
    std::env::remove_var("ENABLE_HSTS");
    let dir = tempfile::tempdir().unwrap();
    let app = test::init_service(
        App::new()
            .wrap(SecurityHeaders::from_env())
            .app_data(web::Data::new(app_state(dir.path())))
            .configure(config),
    )
    .await;
    let req = test::TestRequest::get()
        .uri("/messages")
        .insert_header(("Authorization", format!("Bearer {}", token())))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());
    let headers = resp.headers();
    assert!(headers.get("content-security-policy").is_some());
    assert_eq!(headers.get("referrer-policy").unwrap(), "no-referrer");
    assert_eq!(headers.get("x-frame-options").unwrap(), "DENY");
    assert!(headers.get("strict-transport-security").is_none());
}

#[actix_web::test]
#[serial_test::serial]
async fn test_headers_on_error_responses() {
    std::env::remove_var("ENABLE_HSTS");
    let dir = tempfile::tempdir().unwrap();
    let app = test::init_service(
        App::new()
            .wrap(SecurityHeaders::from_env())
            .app_data(web::Data::new(app_state(dir.path())))
            .configure(config),
    )
    .await;
    let req = test::TestRequest::get().uri("/messages").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 401);
    assert_eq!(resp.headers().get("x-content-type-options").unwrap(), "nosniff");
}

#[actix_web::test]
#[serial_test::serial]
async fn test_env_var_enables_hsts() {
    std::env::set_var("ENABLE_HSTS", "1");
    let dir = tempfile::tempdir().unwrap();
    let app = test::init_service(
        App::new()
            .wrap(SecurityHeaders::from_env())
            .app_data(web::Data::new(app_state(dir.path())))
            .configure(config),
    )
    .await;
    let req = test::TestRequest::get()
        .uri("/messages")
        .insert_header(("Authorization", format!("Bearer {}", token())))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.headers().get("strict-transport-security").is_some());
    std::env::remove_var("ENABLE_HSTS");
}

#[actix_web::test]
#[serial_test::serial]
async fn test_builder_can_disable_hsts_even_when_env_set() {
    std::env::set_var("ENABLE_HSTS", "true");
    let dir = tempfile::tempdir().unwrap();
    let app = test::init_service(
        App::new()
            .wrap(SecurityHeaders::from_env().with_hsts(false))
            .app_data(web::Data::new(app_state(dir.path())))
            .configure(config),
    )
    .await;
    let req = test::TestRequest::get()
        .uri("/messages")
        .insert_header(("Authorization", format!("Bearer {}", token())))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.headers().get("strict-transport-security").is_none());
    std::env::remove_var("ENABLE_HSTS");
}
