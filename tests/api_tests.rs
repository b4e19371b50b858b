use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};
use tower::ServiceExt;

use gatepass::clients::keystone::{
    Domain, IdentityApi, IdentityError, RemoteProject, RemoteUser, Role, UserCreate,
};
use gatepass::config::Config;

/// Scripted identity service standing in for Keystone.
#[derive(Default)]
struct MockIdentity {
    conflict_on_create: bool,
    fail_grant_add: bool,
    created: Mutex<Vec<UserCreate>>,
    grant_adds: Mutex<Vec<(String, String, String)>>,
}

#[async_trait]
impl IdentityApi for MockIdentity {
    async fn get_default_domain(&self) -> Result<Domain, IdentityError> {
        Ok(Domain {
            id: "dom-1".to_string(),
            name: "Default".to_string(),
        })
    }

    async fn get_default_role(&self) -> Result<Option<Role>, IdentityError> {
        Ok(Some(Role {
            id: "role-member".to_string(),
            name: "member".to_string(),
        }))
    }

    async fn tenant_list(&self) -> Result<(Vec<RemoteProject>, bool), IdentityError> {
        Ok((
            vec![
                RemoteProject {
                    id: "p-astro".to_string(),
                    name: "astro".to_string(),
                    enabled: true,
                },
                RemoteProject {
                    id: "p-old".to_string(),
                    name: "retired".to_string(),
                    enabled: false,
                },
                RemoteProject {
                    id: "p-7".to_string(),
                    name: "proj-a".to_string(),
                    enabled: true,
                },
            ],
            false,
        ))
    }

    async fn role_list(&self) -> Result<Vec<Role>, IdentityError> {
        Ok(vec![
            Role {
                id: "role-z".to_string(),
                name: "admin".to_string(),
            },
            Role {
                id: "role-member".to_string(),
                name: "member".to_string(),
            },
        ])
    }

    async fn user_create(&self, payload: &UserCreate) -> Result<RemoteUser, IdentityError> {
        if self.conflict_on_create {
            return Err(IdentityError::Conflict(payload.name.clone()));
        }
        self.created.lock().unwrap().push(payload.clone());
        Ok(RemoteUser {
            id: "remote-1".to_string(),
            name: payload.name.clone(),
            email: payload.email.clone(),
            description: payload.description.clone(),
            enabled: payload.enabled,
            domain_id: Some(payload.domain_id.clone()),
        })
    }

    async fn roles_for_user(
        &self,
        _user_id: &str,
        _project_id: &str,
    ) -> Result<Vec<Role>, IdentityError> {
        Ok(Vec::new())
    }

    async fn add_tenant_user_role(
        &self,
        project_id: &str,
        user_id: &str,
        role_id: &str,
    ) -> Result<(), IdentityError> {
        if self.fail_grant_add {
            return Err(IdentityError::Api {
                status: 500,
                message: "grant backend down".to_string(),
            });
        }
        self.grant_adds.lock().unwrap().push((
            project_id.to_string(),
            user_id.to_string(),
            role_id.to_string(),
        ));
        Ok(())
    }
}

async fn spawn_app_with(mock: MockIdentity) -> (Router, Arc<MockIdentity>) {
    let mut config = Config::default();
    config.general.database_path = "sqlite::memory:".to_string();
    config.provisioning.default_password = "shared-default".to_string();

    let mock = Arc::new(mock);
    let state = gatepass::api::create_app_state_with_identity(config, mock.clone())
        .await
        .expect("Failed to create app state");

    (gatepass::api::router(state), mock)
}

async fn spawn_app() -> (Router, Arc<MockIdentity>) {
    spawn_app_with(MockIdentity::default()).await
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn req(method: &str, uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("Content-Type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn seed_project(app: &Router) {
    let response = app
        .clone()
        .oneshot(req(
            "POST",
            "/api/projects",
            &json!({
                "id": 7,
                "name": "proj-a",
                "os_id": "p-7",
                "start": "2026-01-01T00:00:00Z"
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

async fn create_alice(app: &Router) -> Value {
    let response = app
        .clone()
        .oneshot(req(
            "POST",
            "/api/users",
            &json!({
                "name": "alice",
                "email": "alice@example.org",
                "idp": "edu-idp",
                "password": "initial-secret"
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    body_json(response).await["data"].clone()
}

#[tokio::test]
async fn test_user_create_and_timestamps() {
    let (app, _mock) = spawn_app().await;

    let user = create_alice(&app).await;

    assert_eq!(user["name"], "alice");
    assert!(user["project"].is_null());
    assert_eq!(user["created"], user["updated"]);

    // The stored credential must never appear in a response.
    let serialized = user.to_string();
    assert!(!serialized.contains("password"));
    assert!(!serialized.contains("initial-secret"));
}

#[tokio::test]
async fn test_user_update_sets_and_clears_project() {
    let (app, _mock) = spawn_app().await;
    seed_project(&app).await;
    let user = create_alice(&app).await;
    let id = user["id"].as_i64().unwrap();

    let update = json!({
        "name": "alice",
        "email": "alice@example.org",
        "idp": "edu-idp",
        "project": "7"
    });
    let response = app
        .clone()
        .oneshot(req("PUT", &format!("/api/users/{id}"), &update))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let updated = body_json(response).await["data"].clone();
    assert_eq!(updated["project"], 7);
    // Update stamps `updated` only.
    assert_eq!(updated["created"], user["created"]);

    let mut clearing = update.clone();
    clearing["project"] = json!("");
    let response = app
        .clone()
        .oneshot(req("PUT", &format!("/api/users/{id}"), &clearing))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let cleared = body_json(response).await["data"].clone();
    assert!(cleared["project"].is_null());
}

#[tokio::test]
async fn test_update_with_unknown_project_is_not_found() {
    let (app, _mock) = spawn_app().await;
    let user = create_alice(&app).await;
    let id = user["id"].as_i64().unwrap();

    let response = app
        .clone()
        .oneshot(req(
            "PUT",
            &format!("/api/users/{id}"),
            &json!({
                "name": "alice",
                "email": "alice@example.org",
                "idp": "edu-idp",
                "project": "99"
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_list_filter_by_project_name() {
    let (app, _mock) = spawn_app().await;
    seed_project(&app).await;
    let user = create_alice(&app).await;
    let id = user["id"].as_i64().unwrap();

    // Second user without a project; must not match the filter.
    app.clone()
        .oneshot(req(
            "POST",
            "/api/users",
            &json!({"name": "bob", "email": "bob@example.org", "idp": "edu-idp"}),
        ))
        .await
        .unwrap();

    app.clone()
        .oneshot(req(
            "PUT",
            &format!("/api/users/{id}"),
            &json!({
                "name": "alice",
                "email": "alice@example.org",
                "idp": "edu-idp",
                "project": "7"
            }),
        ))
        .await
        .unwrap();

    let response = app
        .clone()
        .oneshot(get("/api/users?project=proj-a"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let users = body["data"].as_array().unwrap();
    assert_eq!(users.len(), 1);
    assert_eq!(users[0]["name"], "alice");

    // Unknown project name is an error, not an empty result.
    let response = app
        .clone()
        .oneshot(get("/api/users?project=no-such-project"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_list_rejects_multiple_filters() {
    let (app, _mock) = spawn_app().await;

    let response = app
        .clone()
        .oneshot(get("/api/users?name=alice&idp=edu-idp"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_delete_is_idempotent() {
    let (app, _mock) = spawn_app().await;
    let user = create_alice(&app).await;
    let id = user["id"].as_i64().unwrap();

    for _ in 0..2 {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri(format!("/api/users/{id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = app
        .clone()
        .oneshot(req(
            "POST",
            "/api/users/batch-delete",
            &json!({"ids": [id, 12345]}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"]["deleted"], 0);
}

#[tokio::test]
async fn test_change_password() {
    let (app, _mock) = spawn_app().await;
    let user = create_alice(&app).await;
    let id = user["id"].as_i64().unwrap();

    let response = app
        .clone()
        .oneshot(req(
            "PUT",
            &format!("/api/users/{id}/password"),
            &json!({"password": "new-secret"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(req(
            "PUT",
            "/api/users/404/password",
            &json!({"password": "new-secret"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_activate_creates_user_and_grant() {
    let (app, mock) = spawn_app().await;
    let user = create_alice(&app).await;
    let id = user["id"].as_i64().unwrap();

    let response = app
        .clone()
        .oneshot(req(
            "POST",
            &format!("/api/users/{id}/activate"),
            &json!({"project_id": "p-7", "role_id": "role-member"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"]["user"]["name"], "alice");
    assert_eq!(body["data"]["warnings"].as_array().unwrap().len(), 0);

    {
        let adds = mock.grant_adds.lock().unwrap();
        assert_eq!(
            adds.as_slice(),
            &[(
                "p-7".to_string(),
                "remote-1".to_string(),
                "role-member".to_string()
            )]
        );

        // No password supplied: the configured fallback goes to the remote.
        let created = mock.created.lock().unwrap();
        assert_eq!(created[0].password, "shared-default");
    }

    // The local record is a provisioning log; it survives activation.
    let response = app.clone().oneshot(get(&format!("/api/users/{id}"))).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_activate_name_conflict_is_409() {
    let (app, mock) = spawn_app_with(MockIdentity {
        conflict_on_create: true,
        ..Default::default()
    })
    .await;
    let user = create_alice(&app).await;
    let id = user["id"].as_i64().unwrap();

    let response = app
        .clone()
        .oneshot(req(
            "POST",
            &format!("/api/users/{id}/activate"),
            &json!({"project_id": "p-7", "role_id": "role-member"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert!(mock.grant_adds.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_activate_grant_failure_is_degraded_success() {
    let (app, _mock) = spawn_app_with(MockIdentity {
        fail_grant_add: true,
        ..Default::default()
    })
    .await;
    let user = create_alice(&app).await;
    let id = user["id"].as_i64().unwrap();

    let response = app
        .clone()
        .oneshot(req(
            "POST",
            &format!("/api/users/{id}/activate"),
            &json!({"project_id": "p-7", "role_id": "role-member"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"]["user"]["id"], "remote-1");
    assert_eq!(
        body["data"]["warnings"][0],
        "Unable to add user to primary project."
    );
}

#[tokio::test]
async fn test_activate_unknown_user_is_404() {
    let (app, _mock) = spawn_app().await;

    let response = app
        .clone()
        .oneshot(req("POST", "/api/users/9000/activate", &json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_project_choices_ordering() {
    let (app, _mock) = spawn_app().await;
    seed_project(&app).await;
    let user = create_alice(&app).await;
    let id = user["id"].as_i64().unwrap();

    app.clone()
        .oneshot(req(
            "PUT",
            &format!("/api/users/{id}"),
            &json!({
                "name": "alice",
                "email": "alice@example.org",
                "idp": "edu-idp",
                "project": "7"
            }),
        ))
        .await
        .unwrap();

    let response = app
        .clone()
        .oneshot(get(&format!("/api/choices/projects?user_id={id}")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let names: Vec<&str> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["name"].as_str().unwrap())
        .collect();
    // Matching project first, disabled project excluded.
    assert_eq!(names, vec!["proj-a", "astro"]);
}

#[tokio::test]
async fn test_role_choices() {
    let (app, _mock) = spawn_app().await;

    let response = app.clone().oneshot(get("/api/choices/roles")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let ids: Vec<&str> = body["data"]["roles"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["role-member", "role-z"]);
    assert_eq!(body["data"]["default_role_id"], "role-member");
}

#[tokio::test]
async fn test_system_status() {
    let (app, _mock) = spawn_app().await;
    create_alice(&app).await;

    let response = app.clone().oneshot(get("/api/system/status")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"]["users"], 1);
    assert_eq!(body["data"]["projects"], 0);
    assert!(body["data"]["version"].is_string());
}
