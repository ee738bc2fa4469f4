//! Bulk-import ingredients from a headerless `name,measurement_unit`
//! CSV file, skipping rows already present in the catalog.
//!
//! Usage: `import_ingredients <file.csv>`

use anyhow::Context;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()))
        .init();

    let path = std::env::args()
        .nth(1)
        .context("usage: import_ingredients <file.csv>")?;
    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;

    let db = sqlx::postgres::PgPoolOptions::new()
        .max_connections(2)
        .connect(&database_url)
        .await
        .context("connect to database")?;

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .from_path(&path)
        .with_context(|| format!("open {path}"))?;

    let mut names = Vec::new();
    let mut units = Vec::new();
    for record in reader.records() {
        let record = record?;
        let name = record.get(0).context("row missing name column")?.trim();
        let unit = record
            .get(1)
            .context("row missing measurement unit column")?
            .trim();
        if name.is_empty() {
            continue;
        }
        names.push(name.to_string());
        units.push(unit.to_string());
    }

    let inserted = sqlx::query(
        r#"
        INSERT INTO ingredients (name, measurement_unit)
        SELECT name, measurement_unit
        FROM UNNEST($1::text[], $2::text[]) AS t(name, measurement_unit)
        ON CONFLICT (name, measurement_unit) DO NOTHING
        "#,
    )
    .bind(names.clone())
    .bind(units)
    .execute(&db)
    .await?
    .rows_affected();

    tracing::info!(total = names.len(), inserted, "ingredient import finished");
    Ok(())
}
