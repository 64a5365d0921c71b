pub mod users;

pub use users::User;

use crate::Result;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

/// 打开 SQLite 连接池并保证表结构就绪
pub async fn open_pool(database_url: &str) -> Result<SqlitePool> {
    tracing::info!("Opening database: {}", database_url);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await?;

    sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;
    sqlx::query("PRAGMA foreign_keys = ON").execute(&pool).await?;

    init_schema(&pool).await?;
    Ok(pool)
}

async fn init_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT,
            email TEXT UNIQUE,
            password TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}
