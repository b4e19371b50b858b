use sea_orm::EntityTrait;

use gatepass::db::{ListError, NewUser, RawUserFilter, Store, UserUpdate};
use gatepass::entities::{projects, users};

async fn memory_store() -> Store {
    Store::new("sqlite::memory:")
        .await
        .expect("Failed to open in-memory store")
}

fn new_user(name: &str, project: Option<i32>) -> NewUser {
    NewUser {
        name: name.to_string(),
        email: format!("{name}@example.org"),
        idp: "edu-idp".to_string(),
        cn: None,
        source: None,
        duration: Some(365),
        project,
        password: None,
    }
}

fn proj(id: i32, name: &str) -> projects::Model {
    projects::Model {
        id,
        name: name.to_string(),
        os_id: format!("os-{id}"),
        start: "2026-01-01T00:00:00Z".to_string(),
        state: None,
        remaining: Some(1000.0),
        last_update: "2026-01-01T00:00:00Z".to_string(),
    }
}

#[tokio::test]
async fn created_and_updated_match_at_creation() {
    let store = memory_store().await;

    let user = store.create_user(new_user("alice", None)).await.unwrap();

    assert_eq!(user.created, user.updated);
    assert!(user.id > 0);
}

#[tokio::test]
async fn update_stamps_only_updated() {
    let store = memory_store().await;
    let user = store.create_user(new_user("alice", None)).await.unwrap();

    let updated = store
        .update_user(
            user.id,
            UserUpdate {
                name: "alice".to_string(),
                email: "alice@example.org".to_string(),
                idp: "other-idp".to_string(),
                cn: Some("Alice A.".to_string()),
                source: None,
                duration: Some(180),
                project: None,
            },
        )
        .await
        .unwrap()
        .expect("user exists");

    assert_eq!(updated.created, user.created);
    assert!(updated.updated >= user.updated);
    assert_eq!(updated.idp, "other-idp");
}

#[tokio::test]
async fn update_of_missing_user_returns_none() {
    let store = memory_store().await;

    let result = store
        .update_user(
            42,
            UserUpdate {
                name: "ghost".to_string(),
                email: "ghost@example.org".to_string(),
                idp: "edu-idp".to_string(),
                cn: None,
                source: None,
                duration: None,
                project: None,
            },
        )
        .await
        .unwrap();

    assert!(result.is_none());
}

#[tokio::test]
async fn delete_missing_user_is_noop() {
    let store = memory_store().await;

    let deleted = store.delete_user(42).await.unwrap();
    assert!(!deleted);

    let user = store.create_user(new_user("alice", None)).await.unwrap();
    assert!(store.delete_user(user.id).await.unwrap());
    assert!(!store.delete_user(user.id).await.unwrap());
}

#[tokio::test]
async fn list_is_insertion_ordered() {
    let store = memory_store().await;
    store.create_user(new_user("alice", None)).await.unwrap();
    store.create_user(new_user("bob", None)).await.unwrap();
    store.create_user(new_user("carol", None)).await.unwrap();

    let users = store.list_users(None).await.unwrap();
    let names: Vec<&str> = users.iter().map(|u| u.name.as_str()).collect();
    assert_eq!(names, vec!["alice", "bob", "carol"]);
}

#[tokio::test]
async fn project_filter_resolves_name_first() {
    let store = memory_store().await;
    store.upsert_project(proj(7, "proj-a")).await.unwrap();
    store.create_user(new_user("alice", Some(7))).await.unwrap();
    store.create_user(new_user("bob", None)).await.unwrap();

    let users = store
        .list_users(Some(RawUserFilter::Project("proj-a".to_string())))
        .await
        .unwrap();
    assert_eq!(users.len(), 1);
    assert_eq!(users[0].name, "alice");
    assert_eq!(users[0].project, Some(7));

    let err = store
        .list_users(Some(RawUserFilter::Project("nope".to_string())))
        .await
        .unwrap_err();
    assert!(matches!(err, ListError::ProjectNotFound(name) if name == "nope"));
}

#[tokio::test]
async fn passwords_are_stored_hashed() {
    let store = memory_store().await;

    let mut fields = new_user("alice", None);
    fields.password = Some("plaintext-secret".to_string());
    let user = store.create_user(fields).await.unwrap();

    let model = users::Entity::find_by_id(user.id)
        .one(&store.conn)
        .await
        .unwrap()
        .expect("row exists");
    let hash = model.password_hash.expect("hash stored");
    assert_ne!(hash, "plaintext-secret");
    assert!(hash.starts_with("$argon2"));

    store
        .set_user_password(user.id, "rotated-secret")
        .await
        .unwrap()
        .expect("user exists");

    let rotated = users::Entity::find_by_id(user.id)
        .one(&store.conn)
        .await
        .unwrap()
        .unwrap()
        .password_hash
        .unwrap();
    assert_ne!(rotated, hash);
    assert!(!rotated.contains("rotated-secret"));
}

#[tokio::test]
async fn project_upsert_refreshes_existing_row() {
    let store = memory_store().await;
    store.upsert_project(proj(7, "proj-a")).await.unwrap();

    let mut refreshed = proj(7, "proj-a");
    refreshed.remaining = Some(500.0);
    store.upsert_project(refreshed).await.unwrap();

    let projects = store.list_projects().await.unwrap();
    assert_eq!(projects.len(), 1);
    assert_eq!(projects[0].remaining, Some(500.0));
}
