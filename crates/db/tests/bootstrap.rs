use ledgerscan_core::roles::{ROLE_ADMIN, ROLE_USER};
use ledgerscan_db::models::user::CreateUser;
use ledgerscan_db::repositories::UserRepo;
use sqlx::PgPool;

fn new_user(username: &str, role: &str) -> CreateUser {
    CreateUser {
        username: username.to_string(),
        password_hash: "$argon2id$v=19$m=19456,t=2,p=1$c2FsdA$aGFzaA".to_string(),
        role: role.to_string(),
    }
}

/// Connect, migrate, and verify the users table.
#[sqlx::test(migrations = "../../db/migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_full_bootstrap(pool: PgPool) {
    ledgerscan_db::health_check(&pool).await.unwrap();

    let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count.0, 0);
}

#[sqlx::test(migrations = "../../db/migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_create_and_find_user(pool: PgPool) {
    let created = UserRepo::create(&pool, &new_user("alice", ROLE_USER))
        .await
        .unwrap();
    assert!(created.is_active);
    assert!(created.last_login_at.is_none());

    let by_name = UserRepo::find_by_username(&pool, "alice")
        .await
        .unwrap()
        .expect("user by name");
    assert_eq!(by_name.id, created.id);

    let by_id = UserRepo::find_by_id(&pool, created.id)
        .await
        .unwrap()
        .expect("user by id");
    assert_eq!(by_id.role, ROLE_USER);

    assert!(UserRepo::find_by_username(&pool, "ALICE").await.unwrap().is_none());
}

#[sqlx::test(migrations = "../../db/migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_username_is_unique(pool: PgPool) {
    UserRepo::create(&pool, &new_user("bob", ROLE_USER)).await.unwrap();
    let dup = UserRepo::create(&pool, &new_user("bob", ROLE_ADMIN)).await;
    assert!(dup.is_err());
}

#[sqlx::test(migrations = "../../db/migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_role_check_constraint(pool: PgPool) {
    let bad = UserRepo::create(&pool, &new_user("carol", "superuser")).await;
    assert!(bad.is_err());
}

#[sqlx::test(migrations = "../../db/migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_admin_existence_and_login_stamp(pool: PgPool) {
    assert!(!UserRepo::exists_with_role(&pool, ROLE_ADMIN).await.unwrap());

    let admin = UserRepo::create(&pool, &new_user("root", ROLE_ADMIN)).await.unwrap();
    assert!(UserRepo::exists_with_role(&pool, ROLE_ADMIN).await.unwrap());

    UserRepo::record_successful_login(&pool, admin.id).await.unwrap();
    let reloaded = UserRepo::find_by_id(&pool, admin.id).await.unwrap().unwrap();
    assert!(reloaded.last_login_at.is_some());
}
