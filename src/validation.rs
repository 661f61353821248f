//! Format checks applied to every record before it reaches the database.
//!
//! The same constraints are declared as `CHECK`s in the schema, but we never want to rely on
//! parsing a Postgres error to tell the caller which field was wrong.

use std::fmt;

/// Length of an EVM account address, hex-encoded and without the `0x` prefix.
pub const EVM_ADDRESS_HEX_LEN: usize = 40;
/// Length of a hex-encoded Bitcoin txid.
pub const TXID_HEX_LEN: usize = 64;
/// Length of a hex-encoded 64 bytes signature.
pub const SIG_HEX_LEN: usize = 128;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A not-null text column was given an empty string
    Empty { field: &'static str },
    /// Postgres can't store a NUL character in a text column
    NulCharacter { field: &'static str, index: usize },
    /// A fixed-size hex column was given a string of the wrong length
    Length {
        field: &'static str,
        expected: usize,
        got: usize,
    },
    /// A fixed-size hex column was given a non-hexadecimal character
    NotHex {
        field: &'static str,
        character: char,
        index: usize,
    },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Empty { field } => write!(f, "'{}' must not be empty", field),
            Self::NulCharacter { field, index } => {
                write!(f, "'{}' contains a NUL character at position {}", field, index)
            }
            Self::Length {
                field,
                expected,
                got,
            } => write!(
                f,
                "'{}' must be {} hex characters long, got {}",
                field, expected, got
            ),
            Self::NotHex {
                field,
                character,
                index,
            } => write!(
                f,
                "'{}' contains invalid hex character '{}' at position {}",
                field, character, index
            ),
        }
    }
}

impl std::error::Error for ValidationError {}

/// Check a free-form text column. Anything goes as long as it can be stored.
pub fn check_text(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.is_empty() {
        return Err(ValidationError::Empty { field });
    }
    if let Some(index) = value.chars().position(|c| c == '\0') {
        return Err(ValidationError::NulCharacter { field, index });
    }
    Ok(())
}

/// Check `value` is exactly `len` hex characters, either case, and return it lowercased.
///
/// Hex columns are stored lowercased so that the uniqueness of `move_txid` and the equality
/// lookups can't be defeated by a change of case.
pub fn check_hex(field: &'static str, value: &str, len: usize) -> Result<String, ValidationError> {
    let got = value.chars().count();
    if got != len {
        return Err(ValidationError::Length {
            field,
            expected: len,
            got,
        });
    }

    if hex::decode(value).is_ok() {
        return Ok(value.to_ascii_lowercase());
    }

    // The decoder reports byte offsets, which are off as soon as a multi-byte character is
    // involved. Point at the first offending character ourselves.
    let (index, character) = value
        .chars()
        .enumerate()
        .find(|(_, c)| !c.is_ascii_hexdigit())
        .unwrap_or((0, '\0'));
    Err(ValidationError::NotHex {
        field,
        character,
        index,
    })
}

pub fn check_evm_address(value: &str) -> Result<String, ValidationError> {
    check_hex("evm_address", value, EVM_ADDRESS_HEX_LEN)
}

pub fn check_txid(field: &'static str, value: &str) -> Result<String, ValidationError> {
    check_hex(field, value, TXID_HEX_LEN)
}

pub fn check_sig(value: &str) -> Result<String, ValidationError> {
    check_hex("sig", value, SIG_HEX_LEN)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evm_address_format() {
        assert_eq!(check_evm_address(&"a".repeat(40)), Ok("a".repeat(40)));
        assert_eq!(
            check_evm_address("00112233445566778899AABBCCDDEEFFaabbccdd"),
            Ok("00112233445566778899aabbccddeeffaabbccdd".to_string())
        );

        assert_eq!(
            check_evm_address(&"a".repeat(39)),
            Err(ValidationError::Length {
                field: "evm_address",
                expected: 40,
                got: 39
            })
        );
        assert_eq!(
            check_evm_address(&"a".repeat(41)),
            Err(ValidationError::Length {
                field: "evm_address",
                expected: 40,
                got: 41
            })
        );
        assert_eq!(
            check_evm_address(&"g".repeat(40)),
            Err(ValidationError::NotHex {
                field: "evm_address",
                character: 'g',
                index: 0
            })
        );
        // A prefixed address is 42 characters, and wouldn't be hex anyways
        assert!(check_evm_address(&format!("0x{}", "a".repeat(38))).is_err());
        assert!(check_evm_address("").is_err());
    }

    #[test]
    fn txid_and_sig_format() {
        assert!(check_txid("move_txid", &"b".repeat(64)).is_ok());
        assert_eq!(
            check_txid("bridge_fund_txid", &"b".repeat(63)),
            Err(ValidationError::Length {
                field: "bridge_fund_txid",
                expected: 64,
                got: 63
            })
        );
        let mut txid = "0".repeat(64);
        txid.replace_range(17..18, " ");
        assert_eq!(
            check_txid("move_txid", &txid),
            Err(ValidationError::NotHex {
                field: "move_txid",
                character: ' ',
                index: 17
            })
        );

        assert!(check_sig(&"Cd".repeat(64)).is_ok());
        assert_eq!(
            check_sig(&"c".repeat(127)),
            Err(ValidationError::Length {
                field: "sig",
                expected: 128,
                got: 127
            })
        );
    }

    #[test]
    fn multibyte_characters() {
        // 40 chars, but more than 40 bytes
        let addr = format!("{}é", "a".repeat(39));
        assert_eq!(
            check_evm_address(&addr),
            Err(ValidationError::NotHex {
                field: "evm_address",
                character: 'é',
                index: 39
            })
        );
    }

    #[test]
    fn free_form_text() {
        assert!(check_text("start_utxo", "x").is_ok());
        assert!(check_text("recovery_taproot_address", "not even an address").is_ok());
        assert_eq!(
            check_text("start_utxo", ""),
            Err(ValidationError::Empty {
                field: "start_utxo"
            })
        );
        assert_eq!(
            check_text("start_utxo", "ab\0cd"),
            Err(ValidationError::NulCharacter {
                field: "start_utxo",
                index: 2
            })
        );
        assert_eq!(
            ValidationError::Empty {
                field: "start_utxo"
            }
            .to_string(),
            "'start_utxo' must not be empty"
        );
    }
}
