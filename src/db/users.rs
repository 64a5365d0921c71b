use crate::Result;
use sqlx::SqlitePool;

/// users 表的一行，password 存 Argon2 的 PHC 字符串
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub name: Option<String>,
    pub email: String,
    pub password: String,
}

pub async fn find_by_email(pool: &SqlitePool, email: &str) -> Result<Option<User>> {
    let user =
        sqlx::query_as::<_, User>("SELECT id, name, email, password FROM users WHERE email = ?")
            .bind(email)
            .fetch_optional(pool)
            .await?;
    Ok(user)
}

pub async fn insert(
    pool: &SqlitePool,
    name: Option<&str>,
    email: &str,
    password_hash: &str,
) -> Result<i64> {
    let result = sqlx::query("INSERT INTO users (name, email, password) VALUES (?, ?, ?)")
        .bind(name)
        .bind(email)
        .bind(password_hash)
        .execute(pool)
        .await?;
    Ok(result.last_insert_rowid())
}
