use std::collections::HashSet;

use sqlx::PgPool;
use userline::application::repos::{
    CreateUserParams, EdgeChange, RelationsRepo, RepoError, UpdateUserParams, UserStatsRepo,
    UsersRepo,
};
use userline::infra::db::PostgresRepositories;

fn params(username: &str) -> CreateUserParams {
    CreateUserParams {
        username: username.to_string(),
        phone: 13_000_000_001,
        email: format!("{username}@example.com"),
        avatar: String::new(),
        sex: 2,
    }
}

#[sqlx::test(migrations = "./migrations")]
async fn created_user_round_trips(pool: PgPool) {
    let repos = PostgresRepositories::new(pool);

    let created = repos.create_user(params("ada")).await.expect("create user");
    let found = repos
        .find_user_by_id(created.id)
        .await
        .expect("find user")
        .expect("user exists");
    assert_eq!(found, created);

    assert!(repos.find_user_by_id(created.id + 1000).await.unwrap().is_none());

    let stats = repos.stats_by_user_ids(&[created.id]).await.unwrap();
    assert_eq!(stats[&created.id].follow_count, 0);
}

#[sqlx::test(migrations = "./migrations")]
async fn duplicate_username_is_reported(pool: PgPool) {
    let repos = PostgresRepositories::new(pool);

    repos.create_user(params("ada")).await.unwrap();
    let err = repos.create_user(params("ada")).await.unwrap_err();

    assert!(
        matches!(&err, RepoError::Duplicate { constraint } if constraint == "user_base_username_key"),
        "{err:?}"
    );
}

#[sqlx::test(migrations = "./migrations")]
async fn update_keeps_unset_fields(pool: PgPool) {
    let repos = PostgresRepositories::new(pool);
    let created = repos.create_user(params("grace")).await.unwrap();

    let updated = repos
        .update_user(UpdateUserParams {
            id: created.id,
            avatar: Some("https://img.example.com/g.png".to_string()),
            sex: None,
        })
        .await
        .unwrap();

    assert_eq!(updated.avatar, "https://img.example.com/g.png");
    assert_eq!(updated.sex, 2);

    let err = repos
        .update_user(UpdateUserParams {
            id: created.id + 1000,
            avatar: None,
            sex: Some(1),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, RepoError::NotFound), "{err:?}");
}

#[sqlx::test(migrations = "./migrations")]
async fn follow_edges_maintain_both_sides(pool: PgPool) {
    let repos = PostgresRepositories::new(pool);
    let ada = repos.create_user(params("ada")).await.unwrap().id;
    let grace = repos.create_user(params("grace")).await.unwrap().id;

    assert_eq!(repos.follow(ada, grace).await.unwrap(), EdgeChange::Applied);
    assert_eq!(repos.follow(ada, grace).await.unwrap(), EdgeChange::Unchanged);

    let following = repos.following_among(ada, &[grace]).await.unwrap();
    assert_eq!(following, HashSet::from([grace]));
    let followers = repos.followers_among(grace, &[ada]).await.unwrap();
    assert_eq!(followers, HashSet::from([ada]));
    assert!(repos.following_among(grace, &[ada]).await.unwrap().is_empty());

    let stats = repos.stats_by_user_ids(&[ada, grace]).await.unwrap();
    assert_eq!(stats[&ada].follow_count, 1);
    assert_eq!(stats[&grace].follower_count, 1);

    assert_eq!(repos.unfollow(ada, grace).await.unwrap(), EdgeChange::Applied);
    assert_eq!(repos.unfollow(ada, grace).await.unwrap(), EdgeChange::Unchanged);

    let stats = repos.stats_by_user_ids(&[ada, grace]).await.unwrap();
    assert_eq!(stats[&ada].follow_count, 0);
    assert_eq!(stats[&grace].follower_count, 0);
    assert!(repos.followers_among(grace, &[ada]).await.unwrap().is_empty());
}
