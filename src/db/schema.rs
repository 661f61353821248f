use chrono::NaiveDateTime;
use serde::Serialize;

pub const SCHEMA_VERSION: i32 = 1;

pub const SCHEMA: &str = "\
CREATE TABLE IF NOT EXISTS version (
    version INTEGER UNIQUE NOT NULL
);

CREATE TABLE IF NOT EXISTS new_deposit_requests (
    id SERIAL PRIMARY KEY,
    start_utxo TEXT NOT NULL CHECK (start_utxo <> ''),
    recovery_taproot_address TEXT NOT NULL CHECK (recovery_taproot_address <> ''),
    evm_address TEXT NOT NULL CHECK (evm_address ~ '^[a-fA-F0-9]{40}$'),
    created_at TIMESTAMP NOT NULL DEFAULT NOW()
);

CREATE TABLE IF NOT EXISTS deposit_move_txs (
    id SERIAL PRIMARY KEY,
    start_utxo TEXT NOT NULL CHECK (start_utxo <> ''),
    recovery_taproot_address TEXT NOT NULL CHECK (recovery_taproot_address <> ''),
    evm_address TEXT NOT NULL CHECK (evm_address ~ '^[a-fA-F0-9]{40}$'),
    move_txid TEXT UNIQUE NOT NULL CHECK (move_txid ~ '^[a-fA-F0-9]{64}$'),
    created_at TIMESTAMP NOT NULL DEFAULT NOW()
);

CREATE TABLE IF NOT EXISTS withdrawal_sigs (
    idx SERIAL PRIMARY KEY,
    bridge_fund_txid TEXT NOT NULL CHECK (bridge_fund_txid ~ '^[a-fA-F0-9]{64}$'),
    sig TEXT NOT NULL CHECK (sig ~ '^[a-fA-F0-9]{128}$'),
    created_at TIMESTAMP NOT NULL DEFAULT NOW()
);

CREATE INDEX IF NOT EXISTS deposit_requests_evm_address ON new_deposit_requests (evm_address);
CREATE INDEX IF NOT EXISTS deposit_requests_start_utxo ON new_deposit_requests (start_utxo);
CREATE INDEX IF NOT EXISTS move_txs_evm_address ON deposit_move_txs (evm_address);
CREATE INDEX IF NOT EXISTS move_txs_start_utxo ON deposit_move_txs (start_utxo);
CREATE INDEX IF NOT EXISTS withdrawal_sigs_bridge_fund_txid ON withdrawal_sigs (bridge_fund_txid);
";

// A row in the "new_deposit_requests" table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DbDepositRequest {
    pub id: i32,
    pub start_utxo: String,
    pub recovery_taproot_address: String,
    pub evm_address: String,
    pub created_at: NaiveDateTime,
}

// A row in the "deposit_move_txs" table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DbMoveTx {
    pub id: i32,
    pub start_utxo: String,
    pub recovery_taproot_address: String,
    pub evm_address: String,
    pub move_txid: String,
    pub created_at: NaiveDateTime,
}

// A row in the "withdrawal_sigs" table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DbWithdrawalSig {
    pub idx: i32,
    pub bridge_fund_txid: String,
    pub sig: String,
    pub created_at: NaiveDateTime,
}
