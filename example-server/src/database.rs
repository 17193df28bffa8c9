use sqlx::sqlite::SqlitePool;

/// Create the demo schema and seed it once
pub async fn setup(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            email TEXT UNIQUE NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            is_active BOOLEAN DEFAULT true
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS orders (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER REFERENCES users(id),
            total REAL NOT NULL,
            status TEXT DEFAULT 'pending',
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE VIEW IF NOT EXISTS active_users AS
        SELECT id, name, email FROM users WHERE is_active
        "#,
    )
    .execute(pool)
    .await?;

    seed_sample_data(pool).await
}

async fn seed_sample_data(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    let user_count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
        .fetch_one(pool)
        .await?;

    if user_count.0 > 0 {
        return Ok(());
    }

    let names = ["Alice", "Bob", "Charlie", "Diana", "Evan", "Fiona", "George", "Hannah"];
    let statuses = ["pending", "shipped", "completed", "cancelled"];

    for (index, name) in names.iter().enumerate() {
        sqlx::query("INSERT INTO users (name, email, is_active) VALUES (?, ?, ?)")
            .bind(*name)
            .bind(format!("{}@example.com", name.to_lowercase()))
            .bind(index % 3 != 0)
            .execute(pool)
            .await?;
    }

    for index in 0..40 {
        sqlx::query("INSERT INTO orders (user_id, total, status) VALUES (?, ?, ?)")
            .bind((index % names.len() + 1) as i64)
            .bind(9.99 + index as f64 * 4.5)
            .bind(statuses[index % statuses.len()])
            .execute(pool)
            .await?;
    }

    tracing::info!(users = names.len(), orders = 40, "sample data seeded");
    Ok(())
}
