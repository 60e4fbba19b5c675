use log::*;
use sqlx::{migrate, migrate::MigrateDatabase, Sqlite};

use crate::SqliteDatabase;

/// Gives a test a clean database at `url`: any old file is dropped, the schema is migrated from
/// scratch, and test logging is wired up on the first call.
pub async fn prepare_test_env(url: &str) {
    dotenvy::from_filename(".env.test").ok();
    let _ = env_logger::try_init();
    recreate_database(url).await;
    let db = SqliteDatabase::new_with_url(url, 5).await.expect("Could not connect to the test database");
    migrate!("./src/sqlite/migrations").run(db.pool()).await.expect("Could not run the migrations");
    debug!("🧪️ Test database at {url} is ready");
}

/// A unique database url per test. The files land under `../data` so that they end up in the
/// workspace no matter which crate runs the tests.
pub fn random_db_path() -> String {
    let _ = std::fs::create_dir_all("../data");
    format!("sqlite://../data/test_wallet_{}", rand::random::<u64>())
}

async fn recreate_database(url: &str) {
    if let Err(e) = Sqlite::drop_database(url).await {
        warn!("🧪️ Could not drop {url}: {e:?}");
    }
    Sqlite::create_database(url).await.expect("Could not create the test database");
    trace!("🧪️ Created test database {url}");
}
