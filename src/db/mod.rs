mod schema;
pub use schema::{DbDepositRequest, DbMoveTx, DbWithdrawalSig, SCHEMA_VERSION};

use crate::validation::{check_evm_address, check_text, check_sig, check_txid, ValidationError};
use schema::SCHEMA;

use std::fmt;

use serde::Serialize;
use tokio_postgres::{error::SqlState, types::Type, Client, NoTls, Row};

#[derive(Debug)]
pub enum DbError {
    /// An error originating from the Postgres backend
    Postgres(tokio_postgres::Error),
    /// A field did not pass the format checks, nothing was sent to the database
    Validation(ValidationError),
    /// Trying to record the same move transaction twice
    Duplicate { move_txid: String },
    /// The database was created by an incompatible version of the schema
    Version { expected: i32, found: i32 },
}

impl fmt::Display for DbError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Postgres(e) => write!(f, "{}", e),
            Self::Validation(e) => write!(f, "Invalid record: {}", e),
            Self::Duplicate { move_txid } => {
                write!(f, "Move transaction '{}' is already recorded", move_txid)
            }
            Self::Version { expected, found } => write!(
                f,
                "Unexpected database version: expected {}, found {}",
                expected, found
            ),
        }
    }
}

impl std::error::Error for DbError {}

impl From<tokio_postgres::Error> for DbError {
    fn from(e: tokio_postgres::Error) -> Self {
        Self::Postgres(e)
    }
}

impl From<ValidationError> for DbError {
    fn from(e: ValidationError) -> Self {
        Self::Validation(e)
    }
}

/// Number of rows in each of the tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LedgerCounts {
    pub deposit_requests: i64,
    pub move_txs: i64,
    pub withdrawal_sigs: i64,
}

async fn establish_connection(
    config: &tokio_postgres::Config,
) -> Result<Client, tokio_postgres::Error> {
    let (client, connection) = config.connect(NoTls).await?;

    tokio::spawn(async move {
        if let Err(e) = connection.await {
            log::error!("Database connection error: {}", e);
        }
    });

    Ok(client)
}

// Arbitrary key for the advisory lock serializing schema creation
const SCHEMA_LOCK_KEY: i64 = 0x6465_706f_7369_7473;

/// Create the tables if they don't exist yet, and make sure we are compatible with the ones
/// that do.
///
/// Safe to call from several processes at once: `CREATE TABLE IF NOT EXISTS` is not, so the
/// transactions are serialized with an advisory lock.
pub async fn maybe_create_db(config: &tokio_postgres::Config) -> Result<(), DbError> {
    let mut client = establish_connection(config).await?;
    let tx = client.transaction().await?;

    tx.execute("SELECT pg_advisory_xact_lock($1)", &[&SCHEMA_LOCK_KEY])
        .await?;
    tx.batch_execute(SCHEMA).await?;
    tx.execute(
        "INSERT INTO version (version) SELECT $1::INTEGER WHERE NOT EXISTS (SELECT 1 FROM version)",
        &[&SCHEMA_VERSION],
    )
    .await?;
    let found: i32 = tx
        .query_one("SELECT version FROM version", &[])
        .await?
        .get(0);
    if found != SCHEMA_VERSION {
        return Err(DbError::Version {
            expected: SCHEMA_VERSION,
            found,
        });
    }

    tx.commit().await?;

    Ok(())
}

// Rejected records never reach the database, but we still want a trace of them.
fn check_record<T>(record: &str, res: Result<T, ValidationError>) -> Result<T, DbError> {
    res.map_err(|e| {
        log::debug!("Rejecting {}: {}", record, e);
        DbError::Validation(e)
    })
}

fn deposit_request_from_row(row: &Row) -> DbDepositRequest {
    DbDepositRequest {
        id: row.get("id"),
        start_utxo: row.get("start_utxo"),
        recovery_taproot_address: row.get("recovery_taproot_address"),
        evm_address: row.get("evm_address"),
        created_at: row.get("created_at"),
    }
}

fn move_tx_from_row(row: &Row) -> DbMoveTx {
    DbMoveTx {
        id: row.get("id"),
        start_utxo: row.get("start_utxo"),
        recovery_taproot_address: row.get("recovery_taproot_address"),
        evm_address: row.get("evm_address"),
        move_txid: row.get("move_txid"),
        created_at: row.get("created_at"),
    }
}

fn withdrawal_sig_from_row(row: &Row) -> DbWithdrawalSig {
    DbWithdrawalSig {
        idx: row.get("idx"),
        bridge_fund_txid: row.get("bridge_fund_txid"),
        sig: row.get("sig"),
        created_at: row.get("created_at"),
    }
}

/// A connection to the ledger database.
///
/// Records are append-only: there is no way to update or delete a row through this
/// connection. Every insert is a single statement, so it is either committed or rejected as a
/// whole. The connection can be shared between tasks, concurrent queries get pipelined.
pub struct DbConnection {
    client: Client,
}

impl DbConnection {
    pub async fn new(config: &tokio_postgres::Config) -> Result<DbConnection, DbError> {
        let client = establish_connection(config).await?;
        Ok(DbConnection { client })
    }

    /// Record the intent to deposit, returns the id of the new row.
    pub async fn record_deposit_request(
        &self,
        start_utxo: &str,
        recovery_taproot_address: &str,
        evm_address: &str,
    ) -> Result<i32, DbError> {
        const RECORD: &str = "deposit request";
        check_record(RECORD, check_text("start_utxo", start_utxo))?;
        check_record(
            RECORD,
            check_text("recovery_taproot_address", recovery_taproot_address),
        )?;
        let evm_address = check_record(RECORD, check_evm_address(evm_address))?;

        let statement = self
            .client
            .prepare_typed(
                "INSERT INTO new_deposit_requests (start_utxo, recovery_taproot_address, evm_address) \
                 VALUES ($1, $2, $3) RETURNING id",
                &[Type::TEXT, Type::TEXT, Type::TEXT],
            )
            .await?;
        let id: i32 = self
            .client
            .query_one(
                &statement,
                &[&start_utxo, &recovery_taproot_address, &evm_address],
            )
            .await?
            .get(0);
        log::debug!(
            "Recorded deposit request #{} for EVM address '{}' (start utxo '{}')",
            id,
            evm_address,
            start_utxo
        );

        Ok(id)
    }

    /// Record a move transaction, returns the id of the new row.
    ///
    /// Fails with [DbError::Duplicate] if this `move_txid` was already recorded. The check is
    /// done by the database within the insert, so two concurrent calls can't both succeed.
    pub async fn record_move_tx(
        &self,
        start_utxo: &str,
        recovery_taproot_address: &str,
        evm_address: &str,
        move_txid: &str,
    ) -> Result<i32, DbError> {
        const RECORD: &str = "move tx";
        check_record(RECORD, check_text("start_utxo", start_utxo))?;
        check_record(
            RECORD,
            check_text("recovery_taproot_address", recovery_taproot_address),
        )?;
        let evm_address = check_record(RECORD, check_evm_address(evm_address))?;
        let move_txid = check_record(RECORD, check_txid("move_txid", move_txid))?;

        let statement = self
            .client
            .prepare_typed(
                "INSERT INTO deposit_move_txs (start_utxo, recovery_taproot_address, evm_address, move_txid) \
                 VALUES ($1, $2, $3, $4) RETURNING id",
                &[Type::TEXT, Type::TEXT, Type::TEXT, Type::TEXT],
            )
            .await?;
        let id: i32 = match self
            .client
            .query_one(
                &statement,
                &[
                    &start_utxo,
                    &recovery_taproot_address,
                    &evm_address,
                    &move_txid,
                ],
            )
            .await
        {
            Ok(row) => row.get(0),
            Err(e) if e.code() == Some(&SqlState::UNIQUE_VIOLATION) => {
                log::debug!("Refusing to record move tx '{}' twice", move_txid);
                return Err(DbError::Duplicate { move_txid });
            }
            Err(e) => return Err(e.into()),
        };
        log::debug!(
            "Recorded move tx '{}' as #{} for EVM address '{}'",
            move_txid,
            id,
            evm_address
        );

        Ok(id)
    }

    /// Record a signature for spending from `bridge_fund_txid`, returns the idx of the new row.
    ///
    /// The same signature may be recorded any number of times.
    pub async fn record_withdrawal_sig(
        &self,
        bridge_fund_txid: &str,
        sig: &str,
    ) -> Result<i32, DbError> {
        const RECORD: &str = "withdrawal signature";
        let bridge_fund_txid =
            check_record(RECORD, check_txid("bridge_fund_txid", bridge_fund_txid))?;
        let sig = check_record(RECORD, check_sig(sig))?;

        let statement = self
            .client
            .prepare_typed(
                "INSERT INTO withdrawal_sigs (bridge_fund_txid, sig) VALUES ($1, $2) RETURNING idx",
                &[Type::TEXT, Type::TEXT],
            )
            .await?;
        let idx: i32 = self
            .client
            .query_one(&statement, &[&bridge_fund_txid, &sig])
            .await?
            .get(0);
        log::debug!(
            "Recorded withdrawal signature #{} for bridge fund tx '{}'",
            idx,
            bridge_fund_txid
        );

        Ok(idx)
    }

    pub async fn deposit_request(&self, id: i32) -> Result<Option<DbDepositRequest>, DbError> {
        let statement = self
            .client
            .prepare_typed(
                "SELECT * FROM new_deposit_requests WHERE id = $1",
                &[Type::INT4],
            )
            .await?;
        Ok(self
            .client
            .query_opt(&statement, &[&id])
            .await?
            .map(|row| deposit_request_from_row(&row)))
    }

    /// All the deposit requests for this EVM address, oldest first.
    pub async fn deposit_requests_by_evm_address(
        &self,
        evm_address: &str,
    ) -> Result<Vec<DbDepositRequest>, DbError> {
        let evm_address = match check_evm_address(evm_address) {
            Ok(evm_address) => evm_address,
            Err(_) => return Ok(Vec::new()),
        };

        let statement = self
            .client
            .prepare_typed(
                "SELECT * FROM new_deposit_requests WHERE evm_address = $1 ORDER BY id",
                &[Type::TEXT],
            )
            .await?;
        Ok(self
            .client
            .query(&statement, &[&evm_address])
            .await?
            .iter()
            .map(deposit_request_from_row)
            .collect())
    }

    /// All the deposit requests spending this UTXO, oldest first.
    pub async fn deposit_requests_by_start_utxo(
        &self,
        start_utxo: &str,
    ) -> Result<Vec<DbDepositRequest>, DbError> {
        if check_text("start_utxo", start_utxo).is_err() {
            return Ok(Vec::new());
        }

        let statement = self
            .client
            .prepare_typed(
                "SELECT * FROM new_deposit_requests WHERE start_utxo = $1 ORDER BY id",
                &[Type::TEXT],
            )
            .await?;
        Ok(self
            .client
            .query(&statement, &[&start_utxo])
            .await?
            .iter()
            .map(deposit_request_from_row)
            .collect())
    }

    pub async fn move_tx(&self, id: i32) -> Result<Option<DbMoveTx>, DbError> {
        let statement = self
            .client
            .prepare_typed("SELECT * FROM deposit_move_txs WHERE id = $1", &[Type::INT4])
            .await?;
        Ok(self
            .client
            .query_opt(&statement, &[&id])
            .await?
            .map(|row| move_tx_from_row(&row)))
    }

    pub async fn move_tx_by_txid(&self, move_txid: &str) -> Result<Option<DbMoveTx>, DbError> {
        let move_txid = match check_txid("move_txid", move_txid) {
            Ok(move_txid) => move_txid,
            Err(_) => return Ok(None),
        };

        let statement = self
            .client
            .prepare_typed(
                "SELECT * FROM deposit_move_txs WHERE move_txid = $1",
                &[Type::TEXT],
            )
            .await?;
        Ok(self
            .client
            .query_opt(&statement, &[&move_txid])
            .await?
            .map(|row| move_tx_from_row(&row)))
    }

    pub async fn move_txs_by_evm_address(
        &self,
        evm_address: &str,
    ) -> Result<Vec<DbMoveTx>, DbError> {
        let evm_address = match check_evm_address(evm_address) {
            Ok(evm_address) => evm_address,
            Err(_) => return Ok(Vec::new()),
        };

        let statement = self
            .client
            .prepare_typed(
                "SELECT * FROM deposit_move_txs WHERE evm_address = $1 ORDER BY id",
                &[Type::TEXT],
            )
            .await?;
        Ok(self
            .client
            .query(&statement, &[&evm_address])
            .await?
            .iter()
            .map(move_tx_from_row)
            .collect())
    }

    pub async fn move_txs_by_start_utxo(&self, start_utxo: &str) -> Result<Vec<DbMoveTx>, DbError> {
        if check_text("start_utxo", start_utxo).is_err() {
            return Ok(Vec::new());
        }

        let statement = self
            .client
            .prepare_typed(
                "SELECT * FROM deposit_move_txs WHERE start_utxo = $1 ORDER BY id",
                &[Type::TEXT],
            )
            .await?;
        Ok(self
            .client
            .query(&statement, &[&start_utxo])
            .await?
            .iter()
            .map(move_tx_from_row)
            .collect())
    }

    pub async fn withdrawal_sig(&self, idx: i32) -> Result<Option<DbWithdrawalSig>, DbError> {
        let statement = self
            .client
            .prepare_typed("SELECT * FROM withdrawal_sigs WHERE idx = $1", &[Type::INT4])
            .await?;
        Ok(self
            .client
            .query_opt(&statement, &[&idx])
            .await?
            .map(|row| withdrawal_sig_from_row(&row)))
    }

    /// All the signatures gathered for spending from this transaction, in the order they were
    /// recorded.
    pub async fn withdrawal_sigs_by_txid(
        &self,
        bridge_fund_txid: &str,
    ) -> Result<Vec<DbWithdrawalSig>, DbError> {
        let bridge_fund_txid = match check_txid("bridge_fund_txid", bridge_fund_txid) {
            Ok(txid) => txid,
            Err(_) => return Ok(Vec::new()),
        };

        let statement = self
            .client
            .prepare_typed(
                "SELECT * FROM withdrawal_sigs WHERE bridge_fund_txid = $1 ORDER BY idx",
                &[Type::TEXT],
            )
            .await?;
        Ok(self
            .client
            .query(&statement, &[&bridge_fund_txid])
            .await?
            .iter()
            .map(withdrawal_sig_from_row)
            .collect())
    }

    pub async fn counts(&self) -> Result<LedgerCounts, DbError> {
        let row = self
            .client
            .query_one(
                "SELECT \
                 (SELECT COUNT(*) FROM new_deposit_requests), \
                 (SELECT COUNT(*) FROM deposit_move_txs), \
                 (SELECT COUNT(*) FROM withdrawal_sigs)",
                &[],
            )
            .await?;

        Ok(LedgerCounts {
            deposit_requests: row.get(0),
            move_txs: row.get(1),
            withdrawal_sigs: row.get(2),
        })
    }
}
