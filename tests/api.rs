mod common;

use actix_web::cookie::SameSite;
use actix_web::cookie::time::Duration as CookieDuration;
use actix_web::http::StatusCode;
use actix_web::{App, test, web};
use chrono::{Duration, Utc};
use serde_json::{Value, json};
use std::sync::Arc;
use tokio::sync::Notify;

use common::{FakeGateway, JWT_SECRET, auth, bearer, sign_in, state};
use heartbeat_api::auth::models::{Role, UserResponse};
use heartbeat_api::auth::tokens::JwtHandler;
use heartbeat_api::{AppState, AuthService, routes};

async fn wait_until_idle(data: &web::Data<AppState>, alias: &str) {
    for _ in 0..200 {
        if !data.coordinator.status(alias).unwrap().in_progress {
            return;
        }
        actix_web::rt::time::sleep(std::time::Duration::from_millis(5)).await;
    }
    panic!("refresh of {} never finished", alias);
}

fn wire(state: AppState, auth: AuthService) -> (web::Data<AppState>, web::Data<AuthService>) {
    (web::Data::new(state), web::Data::new(auth))
}

#[actix_web::test]
async fn test_health_is_public() {
    let (data, auth) = wire(state(&[("dev", "dev-profile")], Arc::new(FakeGateway::default())), auth());
    let app = test::init_service(App::new().app_data(data).app_data(auth).configure(routes::configure)).await;

    let resp: Value = test::call_and_read_body_json(&app, test::TestRequest::get().uri("/health").to_request()).await;
    assert_eq!(resp, json!({ "status": "ok" }));

    let resp: Value =
        test::call_and_read_body_json(&app, test::TestRequest::get().uri("/auth/health").to_request()).await;
    assert_eq!(resp, json!({ "status": "healthy", "service": "authentication" }));
}

#[actix_web::test]
async fn test_dashboard_routes_require_a_session() {
    let (data, auth) = wire(state(&[("dev", "dev-profile")], Arc::new(FakeGateway::default())), auth());
    let app = test::init_service(App::new().app_data(data).app_data(auth).configure(routes::configure)).await;

    for uri in ["/aliases", "/clusters", "/service-details?service_name=a&cluster_name=b&alias=dev"] {
        let resp = test::call_service(&app, test::TestRequest::get().uri(uri).to_request()).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED, "{}", uri);

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body, json!({ "detail": "Not authenticated" }));
    }
}

#[actix_web::test]
async fn test_expired_token_is_reported() {
    let auth = auth();
    sign_in(&auth, "ana", Role::User);
    let stale = JwtHandler::new(JWT_SECRET, "HS256")
        .unwrap()
        .issue(
            &UserResponse {
                id: "1".to_string(),
                username: "ana".to_string(),
                email: "ana@example.com".to_string(),
                role: Role::User,
                last_login: None,
            },
            Utc::now() - Duration::days(2),
        )
        .unwrap();

    let (data, auth) = wire(state(&[("dev", "dev-profile")], Arc::new(FakeGateway::default())), auth);
    let app = test::init_service(App::new().app_data(data).app_data(auth).configure(routes::configure)).await;

    let req = test::TestRequest::get().uri("/aliases").insert_header(bearer(&stale.token)).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["detail"], "Token has expired");
}

#[actix_web::test]
async fn test_refreshed_snapshot_has_padded_history() {
    let gateway = Arc::new(FakeGateway {
        history_cpu: vec![10.0, 20.0, 30.0],
        current_cpu: 37.5,
        ..FakeGateway::with_service("dev-profile", "main", "api", 2)
    });
    let auth = auth();
    let token = sign_in(&auth, "ana", Role::User);
    let (data, auth) = wire(state(&[("dev", "dev-profile")], gateway), auth);
    let app = test::init_service(
        App::new().app_data(data.clone()).app_data(auth).configure(routes::configure),
    )
    .await;

    let req = test::TestRequest::get().uri("/refresh?alias=dev").to_request();
    let resp: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(resp["message"], "Refresh triggered for alias 'dev'");
    wait_until_idle(&data, "dev").await;

    let req = test::TestRequest::get().uri("/clusters?alias=dev").insert_header(bearer(&token)).to_request();
    let snapshots: Value = test::call_and_read_body_json(&app, req).await;

    assert_eq!(snapshots.as_array().unwrap().len(), 1);
    let snapshot = &snapshots[0];
    assert_eq!(snapshot["account_alias"], "dev");
    assert_eq!(snapshot["cluster_name"], "main");
    assert_eq!(snapshot["service_name"], "api");
    assert_eq!(snapshot["running_tasks"], 2);
    assert_eq!(snapshot["current_cpu"], 37.5);
    assert_eq!(
        snapshot["historical_cpu"],
        json!([0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 10.0, 20.0, 30.0])
    );
    assert_eq!(snapshot["historical_memory"], json!(vec![0.0; 12]));

    let req = test::TestRequest::get().uri("/refresh-status?alias=dev").to_request();
    let status: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(status["alias"], "dev");
    assert_eq!(status["in_progress"], false);
    assert_eq!(status["status"], "Refresh completed");
    assert!(status["last_updated"].is_string());
}

#[actix_web::test]
async fn test_unknown_alias_is_not_found() {
    let auth = auth();
    let token = sign_in(&auth, "ana", Role::User);
    let (data, auth) = wire(state(&[("dev", "dev-profile")], Arc::new(FakeGateway::default())), auth);
    let app = test::init_service(
        App::new().app_data(data.clone()).app_data(auth).configure(routes::configure),
    )
    .await;

    let resp = test::call_service(&app, test::TestRequest::get().uri("/refresh?alias=missing").to_request()).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["detail"], "Alias 'missing' not found");

    let resp =
        test::call_service(&app, test::TestRequest::get().uri("/refresh-status?alias=missing").to_request()).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let req = test::TestRequest::get().uri("/clusters?alias=missing").insert_header(bearer(&token)).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);

    assert!(data.cache.aliases().is_empty());
    assert_eq!(data.coordinator.status("dev").unwrap().status, "Not started");
}

#[actix_web::test]
async fn test_concurrent_triggers_start_one_fetch() {
    let gate = Arc::new(Notify::new());
    let gateway = Arc::new(FakeGateway {
        gate: Some(Arc::clone(&gate)),
        ..FakeGateway::with_service("dev-profile", "main", "api", 1)
    });
    let (data, auth) = wire(state(&[("dev", "dev-profile")], Arc::clone(&gateway)), auth());
    let app = test::init_service(
        App::new().app_data(data.clone()).app_data(auth).configure(routes::configure),
    )
    .await;

    let first: Value =
        test::call_and_read_body_json(&app, test::TestRequest::get().uri("/refresh?alias=dev").to_request()).await;
    let second: Value =
        test::call_and_read_body_json(&app, test::TestRequest::get().uri("/refresh?alias=dev").to_request()).await;

    assert_eq!(first["message"], "Refresh triggered for alias 'dev'");
    assert_eq!(second["message"], "Refresh already in progress for alias 'dev'");

    let status: Value =
        test::call_and_read_body_json(&app, test::TestRequest::get().uri("/refresh-status?alias=dev").to_request())
            .await;
    assert_eq!(status["in_progress"], true);
    assert_eq!(status["status"], "Refresh in progress");

    gate.notify_one();
    wait_until_idle(&data, "dev").await;

    assert_eq!(gateway.listings(), 1);
    assert_eq!(data.coordinator.status("dev").unwrap().status, "Refresh completed");
}

#[actix_web::test]
async fn test_all_clusters_follow_refresh_order() {
    let mut gateway = FakeGateway::with_service("dev-profile", "main", "api", 1);
    gateway.add_service("prod-profile", "edge", "gateway", 1);
    gateway.add_service("prod-profile", "edge", "billing", 1);
    let auth = auth();
    let token = sign_in(&auth, "ana", Role::User);
    let (data, auth) = wire(
        state(&[("dev", "dev-profile"), ("prod", "prod-profile")], Arc::new(gateway)),
        auth,
    );

    data.coordinator.refresh_alias("prod", "prod-profile").await.unwrap();
    data.coordinator.refresh_alias("dev", "dev-profile").await.unwrap();

    let app = test::init_service(App::new().app_data(data).app_data(auth).configure(routes::configure)).await;

    let req = test::TestRequest::get().uri("/clusters").insert_header(bearer(&token)).to_request();
    let snapshots: Value = test::call_and_read_body_json(&app, req).await;
    let names: Vec<&str> = snapshots
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["service_name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["gateway", "billing", "api"]);

    let req = test::TestRequest::get().uri("/aliases").insert_header(bearer(&token)).to_request();
    let aliases: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(aliases, json!(["dev", "prod"]));
}

#[actix_web::test]
async fn test_service_details() {
    let gateway = Arc::new(FakeGateway {
        history_cpu: (0..20).map(f64::from).collect(),
        ..FakeGateway::with_service("dev-profile", "main", "api", 2)
    });
    let auth = auth();
    let token = sign_in(&auth, "ana", Role::User);
    let (data, auth) = wire(state(&[("dev", "dev-profile")], gateway), auth);
    let app = test::init_service(App::new().app_data(data).app_data(auth).configure(routes::configure)).await;

    let req = test::TestRequest::get()
        .uri("/service-details?service_name=api&cluster_name=main&alias=dev")
        .insert_header(bearer(&token))
        .to_request();
    let details: Value = test::call_and_read_body_json(&app, req).await;

    let history: Vec<f64> = (8..20).map(f64::from).collect();
    assert_eq!(details["service_overview"]["historical_cpu"], json!(history));
    assert_eq!(details["current_tasks"]["tasks"][0]["task_id"], "api-task-1");
    assert_eq!(details["current_tasks"]["tasks"][0]["health_status"], "HEALTHY");
    assert_eq!(details["configuration"]["auto_scaling"]["status"], "DISABLED");
    assert_eq!(details["configuration"]["load_balancer"], json!({}));
    assert_eq!(details["configuration"]["network"]["network_mode"], "bridge");

    let req = test::TestRequest::get()
        .uri("/service-details?service_name=ghost&cluster_name=main&alias=dev")
        .insert_header(bearer(&token))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["detail"], "Service ghost not found in cluster main");

    let req = test::TestRequest::get()
        .uri("/service-details?service_name=api&cluster_name=main&alias=qa")
        .insert_header(bearer(&token))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn test_login_sets_session_cookie() {
    let auth = auth();
    sign_in(&auth, "wall", Role::Monitor);
    let (data, auth) = wire(state(&[("dev", "dev-profile")], Arc::new(FakeGateway::default())), auth);
    let app = test::init_service(App::new().app_data(data).app_data(auth).configure(routes::configure)).await;

    let req = test::TestRequest::post()
        .uri("/auth/login")
        .set_json(json!({ "username": "wall", "password": "correct horse" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let cookie = resp
        .response()
        .cookies()
        .find(|c| c.name() == "session_token")
        .map(|c| c.into_owned())
        .unwrap();
    assert_eq!(cookie.http_only(), Some(true));
    assert_eq!(cookie.secure(), Some(true));
    assert_eq!(cookie.same_site(), Some(SameSite::Lax));
    assert_eq!(cookie.max_age(), Some(CookieDuration::seconds(30 * 24 * 3600)));

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["message"], "Login successful");
    assert_eq!(body["token_type"], "bearer");
    assert_eq!(body["user"]["role"], "monitor");
    assert_eq!(body["access_token"], cookie.value());

    let req = test::TestRequest::get().uri("/aliases").cookie(cookie.clone()).to_request();
    let aliases: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(aliases, json!(["dev"]));

    let req = test::TestRequest::get().uri("/auth/session").cookie(cookie).to_request();
    let session: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(session["user"]["username"], "wall");
    assert_eq!(session["is_valid"], true);
    assert!(session["user"]["last_login"].is_string());
}

#[actix_web::test]
async fn test_login_rejects_bad_password() {
    let auth = auth();
    sign_in(&auth, "ana", Role::User);
    let (data, auth) = wire(state(&[("dev", "dev-profile")], Arc::new(FakeGateway::default())), auth);
    let app = test::init_service(App::new().app_data(data).app_data(auth).configure(routes::configure)).await;

    let req = test::TestRequest::post()
        .uri("/auth/login")
        .set_json(json!({ "username": "ana", "password": "wrong" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["detail"], "Invalid username or password");

    let req = test::TestRequest::post()
        .uri("/auth/login")
        .set_json(json!({ "username": "nobody", "password": "wrong" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["detail"], "Invalid username or password");
}

#[actix_web::test]
async fn test_create_user_is_admin_only() {
    let auth = auth();
    let admin = sign_in(&auth, "root", Role::Admin);
    let user = sign_in(&auth, "ana", Role::User);
    let (data, auth) = wire(state(&[("dev", "dev-profile")], Arc::new(FakeGateway::default())), auth);
    let app = test::init_service(App::new().app_data(data).app_data(auth).configure(routes::configure)).await;
    let new_user = json!({ "username": "bob", "email": "bob@example.com", "password": "pw" });

    let req = test::TestRequest::post()
        .uri("/auth/create-user")
        .insert_header(bearer(&user))
        .set_json(&new_user)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let req = test::TestRequest::post()
        .uri("/auth/create-user")
        .insert_header(bearer(&admin))
        .set_json(&new_user)
        .to_request();
    let created: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(created["username"], "bob");
    assert_eq!(created["email"], "bob@example.com");
    assert_eq!(created["role"], "user");

    let req = test::TestRequest::post()
        .uri("/auth/create-user")
        .insert_header(bearer(&admin))
        .set_json(&new_user)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);

    let req = test::TestRequest::get().uri("/auth/me").insert_header(bearer(&user)).to_request();
    let me: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(me["username"], "ana");
}

#[actix_web::test]
async fn test_logout_clears_cookie() {
    let (data, auth) = wire(state(&[("dev", "dev-profile")], Arc::new(FakeGateway::default())), auth());
    let app = test::init_service(App::new().app_data(data).app_data(auth).configure(routes::configure)).await;

    let resp = test::call_service(&app, test::TestRequest::post().uri("/auth/logout").to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let cookie = resp
        .response()
        .cookies()
        .find(|c| c.name() == "session_token")
        .map(|c| c.into_owned())
        .unwrap();
    assert_eq!(cookie.value(), "");
    assert_eq!(cookie.max_age(), Some(CookieDuration::ZERO));
}
