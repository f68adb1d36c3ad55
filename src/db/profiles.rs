use std::collections::HashMap;

use sqlx::SqlitePool;

use super::ProfileId;

pub const UNKNOWN_NAME: &str = "Unknown user";

pub async fn create(db_pool: &SqlitePool, user_id: &str, display_name: &str) -> Result<ProfileId, sqlx::Error> {
    let result = sqlx::query("INSERT INTO profiles (user_id,display_name) VALUES (?,?)")
        .bind(user_id)
        .bind(display_name)
        .execute(db_pool)
        .await?;

    Ok(result.last_insert_rowid())
}

/// Display name of the first profile owned by `user_id`.
pub async fn display_name(db_pool: &SqlitePool, user_id: &str) -> Result<String, sqlx::Error> {
    let name: Option<(String,)> =
        sqlx::query_as("SELECT display_name FROM profiles WHERE user_id=? ORDER BY id LIMIT 1")
            .bind(user_id)
            .fetch_optional(db_pool)
            .await?;

    Ok(name.map(|(name,)| name).unwrap_or_else(|| UNKNOWN_NAME.to_owned()))
}

pub async fn display_names(db_pool: &SqlitePool, user_ids: &[&str]) -> Result<HashMap<String, String>, sqlx::Error> {
    let mut names = HashMap::new();
    for &user_id in user_ids {
        if names.contains_key(user_id) {
            continue;
        }
        names.insert(user_id.to_owned(), display_name(db_pool, user_id).await?);
    }

    Ok(names)
}
