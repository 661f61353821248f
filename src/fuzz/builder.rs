use crate::db::maybe_create_db;
use std::{
    env, process,
    str::FromStr,
    sync::atomic::{AtomicUsize, Ordering},
    thread,
};

use tokio_postgres::NoTls;

static DB_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// A throwaway ledger database, created next to the one pointed to by `$POSTGRES_URI`.
///
/// It is dropped along with the builder, even if the test panicked.
pub struct LedgerTestBuilder {
    pub postgres_config: tokio_postgres::Config,
    admin_config: tokio_postgres::Config,
    db_name: String,
}

async fn admin_execute(
    config: &tokio_postgres::Config,
    query: &str,
) -> Result<(), tokio_postgres::Error> {
    let (client, connection) = config.connect(NoTls).await?;
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            log::error!("Test database connection error: {}", e);
        }
    });
    client.batch_execute(query).await
}

impl LedgerTestBuilder {
    /// A database with the ledger schema applied.
    ///
    /// Panics if `$POSTGRES_URI` isn't set: tests using this must be run with
    /// `--include-ignored` against a PostgreSQL server.
    pub async fn new() -> Self {
        let builder = Self::empty().await;
        maybe_create_db(&builder.postgres_config).await.unwrap();
        builder
    }

    /// A database without any table.
    pub async fn empty() -> Self {
        let uri = env::var("POSTGRES_URI")
            .expect("POSTGRES_URI must point to a PostgreSQL server to run the database tests");
        let admin_config = tokio_postgres::Config::from_str(&uri).unwrap();

        let db_name = format!(
            "deposit_ledger_test_{}_{}",
            process::id(),
            DB_COUNTER.fetch_add(1, Ordering::SeqCst)
        );
        // Not a single batch, these can't run within a transaction block
        admin_execute(&admin_config, &format!("DROP DATABASE IF EXISTS {}", db_name))
            .await
            .unwrap();
        admin_execute(&admin_config, &format!("CREATE DATABASE {}", db_name))
            .await
            .unwrap();

        let mut postgres_config = admin_config.clone();
        postgres_config.dbname(&db_name);

        LedgerTestBuilder {
            postgres_config,
            admin_config,
            db_name,
        }
    }
}

impl Drop for LedgerTestBuilder {
    fn drop(&mut self) {
        let admin_config = self.admin_config.clone();
        let query = format!("DROP DATABASE IF EXISTS {} WITH (FORCE)", self.db_name);

        // We are usually dropped from within the test's runtime, which we can't block on. Use
        // our own on a separate thread. Never panic here, we may already be unwinding.
        let res = thread::spawn(move || {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .map_err(|e| e.to_string())?;
            rt.block_on(admin_execute(&admin_config, &query))
                .map_err(|e| e.to_string())
        })
        .join();
        match res {
            Ok(Ok(())) => {}
            Ok(Err(e)) => eprintln!("Error dropping test database '{}': {}", self.db_name, e),
            Err(_) => eprintln!("Panic while dropping test database '{}'", self.db_name),
        }
    }
}
