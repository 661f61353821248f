use deposit_ledger::{
    db::{DbConnection, DbError},
    fuzz::builder::LedgerTestBuilder,
    validation::{EVM_ADDRESS_HEX_LEN, SIG_HEX_LEN, TXID_HEX_LEN},
};
use honggfuzz::fuzz;
use serde::Deserialize;
use tokio::runtime::Runtime;

#[derive(Debug, Deserialize)]
enum Record {
    DepositRequest {
        start_utxo: String,
        recovery_taproot_address: String,
        evm_address: String,
    },
    MoveTx {
        start_utxo: String,
        recovery_taproot_address: String,
        evm_address: String,
        move_txid: String,
    },
    WithdrawalSig {
        bridge_fund_txid: String,
        sig: String,
    },
}

fn is_hex(s: &str, len: usize) -> bool {
    s.len() == len && s.chars().all(|c| c.is_ascii_hexdigit())
}

fn main() {
    let current_runtime = Runtime::new().unwrap();
    // The database is dropped along with the builder, keep it around
    let (_builder, db_conn) = current_runtime.block_on(async {
        let builder = LedgerTestBuilder::new().await;
        let db_conn = DbConnection::new(&builder.postgres_config).await.unwrap();
        (builder, db_conn)
    });

    loop {
        fuzz!(|data: &[u8]| {
            let record: Record = match serde_json::from_slice(data) {
                Ok(record) => record,
                Err(_) => return,
            };

            // Whatever made it to the database must be well-formed, and read back as such
            current_runtime.block_on(async {
                let counts_before = db_conn.counts().await.unwrap();
                match record {
                    Record::DepositRequest {
                        start_utxo,
                        recovery_taproot_address,
                        evm_address,
                    } => match db_conn
                        .record_deposit_request(&start_utxo, &recovery_taproot_address, &evm_address)
                        .await
                    {
                        Ok(id) => {
                            let req = db_conn.deposit_request(id).await.unwrap().unwrap();
                            assert!(is_hex(&req.evm_address, EVM_ADDRESS_HEX_LEN));
                        }
                        Err(DbError::Validation(_)) => {
                            assert_eq!(db_conn.counts().await.unwrap(), counts_before)
                        }
                        Err(e) => panic!("Unexpected error: {}", e),
                    },
                    Record::MoveTx {
                        start_utxo,
                        recovery_taproot_address,
                        evm_address,
                        move_txid,
                    } => match db_conn
                        .record_move_tx(
                            &start_utxo,
                            &recovery_taproot_address,
                            &evm_address,
                            &move_txid,
                        )
                        .await
                    {
                        Ok(id) => {
                            let tx = db_conn.move_tx(id).await.unwrap().unwrap();
                            assert!(is_hex(&tx.evm_address, EVM_ADDRESS_HEX_LEN));
                            assert!(is_hex(&tx.move_txid, TXID_HEX_LEN));
                        }
                        Err(DbError::Validation(_)) | Err(DbError::Duplicate { .. }) => {
                            assert_eq!(db_conn.counts().await.unwrap(), counts_before)
                        }
                        Err(e) => panic!("Unexpected error: {}", e),
                    },
                    Record::WithdrawalSig {
                        bridge_fund_txid,
                        sig,
                    } => match db_conn.record_withdrawal_sig(&bridge_fund_txid, &sig).await {
                        Ok(idx) => {
                            let row = db_conn.withdrawal_sig(idx).await.unwrap().unwrap();
                            assert!(is_hex(&row.bridge_fund_txid, TXID_HEX_LEN));
                            assert!(is_hex(&row.sig, SIG_HEX_LEN));
                        }
                        Err(DbError::Validation(_)) => {
                            assert_eq!(db_conn.counts().await.unwrap(), counts_before)
                        }
                        Err(e) => panic!("Unexpected error: {}", e),
                    },
                }
            });
        });
    }
}
