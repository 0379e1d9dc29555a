use anyhow::{Context, Result};
use log::info;
use sqlx::{Executor, PgPool};
use std::{fs, path::Path};

const SCHEMA_DIRS: [&str; 3] = [
    "src/databases/users",
    "src/databases/products",
    "src/databases/messages",
];

const REQUIRED_TABLES: [&str; 3] = ["users", "products", "messages"];

fn load_all_schemas(schema_dirs: &[&str]) -> Result<String> {
    let mut combined_sql = String::new();

    for dir in schema_dirs {
        let schema_path = Path::new(env!("CARGO_MANIFEST_DIR")).join(dir).join("schema.sql");
        let sql = fs::read_to_string(&schema_path)
            .with_context(|| format!("Failed to read schema file: {:?}", schema_path))?;
        combined_sql.push_str(&sql);
        combined_sql.push('\n');
    }

    Ok(combined_sql)
}

async fn check_tables_exist(pool: &PgPool, tables: &[&str]) -> Result<bool> {
    for &table in tables {
        let exists: (bool,) = sqlx::query_as(
            "SELECT EXISTS (
                SELECT 1 FROM information_schema.tables
                WHERE table_schema = 'public' AND table_name = $1
            )",
        )
        .bind(table)
        .fetch_one(pool)
        .await?;

        if !exists.0 {
            info!("Table '{}' does not exist yet.", table);
            return Ok(false);
        }
    }
    Ok(true)
}

pub async fn setup_backend() -> Result<PgPool> {
    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
    let pool = PgPool::connect(&database_url)
        .await
        .context("Failed to connect to database")?;

    let tables_exist = check_tables_exist(&pool, &REQUIRED_TABLES).await?;

    if !tables_exist {
        info!("Some tables missing. Running schema SQL to create tables...");
        let combined_schema_sql = load_all_schemas(&SCHEMA_DIRS)?;
        pool.execute(combined_schema_sql.as_str())
            .await
            .context("Failed to execute schema SQL")?;
        info!("Schema SQL executed successfully.");
    } else {
        info!("All required tables exist.");
    }

    Ok(pool)
}
