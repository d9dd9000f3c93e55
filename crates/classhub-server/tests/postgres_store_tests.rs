//! PostgreSQL store tests
//!
//! These tests require a running PostgreSQL database and are skipped when
//! TEST_DATABASE_URL is not set.
//!
//! Run with: TEST_DATABASE_URL=postgres://... cargo test -p classhub-server --test postgres_store_tests

use classhub_server::db::{self, MembershipStore, PgStore};
use classhub_server::error::AppError;
use classhub_server::models::{Community, NewCommunity, UserRef};
use sqlx::PgPool;
use std::sync::Arc;

async fn test_store() -> Option<(Arc<PgStore>, PgPool)> {
    let Ok(database_url) = std::env::var("TEST_DATABASE_URL") else {
        eprintln!("TEST_DATABASE_URL not set, skipping");
        return None;
    };

    let pool = db::init_pool(&database_url)
        .await
        .expect("Failed to connect to test database");
    db::run_migrations(&pool)
        .await
        .expect("Failed to run migrations");

    Some((Arc::new(PgStore::new(pool.clone())), pool))
}

async fn insert_user(pool: &PgPool, prefix: &str) -> UserRef {
    let name = format!("{}_{}", prefix, uuid::Uuid::new_v4().simple());
    sqlx::query_as::<_, UserRef>(
        "INSERT INTO users (username, email) VALUES ($1, $2) RETURNING id, username, email",
    )
    .bind(&name)
    .bind(format!("{name}@test.com"))
    .fetch_one(pool)
    .await
    .expect("Failed to insert user")
}

async fn insert_community(store: &PgStore, tutor: &UserRef, max_participants: i32) -> Community {
    store
        .create_community(NewCommunity {
            slug: format!("test-{}", uuid::Uuid::new_v4().simple()),
            name: "Math 101".to_string(),
            description: None,
            tutor_id: tutor.id,
            max_participants,
        })
        .await
        .expect("Failed to create community")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_exit_and_removal_of_same_member_serialize() {
    let Some((store, pool)) = test_store().await else {
        return;
    };
    let tutor = insert_user(&pool, "tutor").await;
    let member = insert_user(&pool, "member").await;
    let community = insert_community(&store, &tutor, 5).await;

    store.add_participant(community.id, member.id).await.unwrap();

    let exit = {
        let store = store.clone();
        let (community_id, user_id) = (community.id, member.id);
        tokio::spawn(async move { store.exit_participant(community_id, user_id).await })
    };
    let remove = {
        let store = store.clone();
        let community = community.clone();
        let user_id = member.id;
        tokio::spawn(async move { store.remove_participant(&community, user_id).await })
    };

    let exited = exit.await.unwrap();
    let removed = remove.await.unwrap();

    // exactly one of them finds the membership
    match (&exited, &removed) {
        (Ok(()), Err(AppError::NotMember)) => {
            assert!(store.notifications(member.id).await.unwrap().is_empty());
        }
        (Err(AppError::NotMember), Ok(notification)) => {
            let notifications = store.notifications(member.id).await.unwrap();
            assert_eq!(notifications.len(), 1);
            assert_eq!(notifications[0].id, notification.id);
        }
        other => panic!("unexpected results: {other:?}"),
    }
    assert!(!store.is_participant(community.id, member.id).await.unwrap());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_direct_joins_respect_capacity() {
    let Some((store, pool)) = test_store().await else {
        return;
    };
    let tutor = insert_user(&pool, "tutor").await;
    let community = insert_community(&store, &tutor, 2).await;

    let mut handles = Vec::new();
    for _ in 0..6 {
        let user = insert_user(&pool, "guest").await;
        let store = store.clone();
        let community_id = community.id;
        handles.push(tokio::spawn(async move {
            store.add_participant(community_id, user.id).await
        }));
    }

    let mut joined = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(()) => joined += 1,
            Err(AppError::CapacityExceeded) => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    assert_eq!(joined, 2);
    assert_eq!(store.participants(community.id).await.unwrap().len(), 2);
}
