//! Wire shapes of the Etherscan proxy API and their conversion into domain
//! blocks.

use block_delta_domain::{parse_height, Address, Block, BlockHeight, Transaction};
use serde::Deserialize;
use serde_json::Value;

use super::FetchError;

/// Envelope wrapped around every proxy response.
///
/// Successful proxy calls look like JSON-RPC (`{"jsonrpc", "id", "result"}`);
/// throttled or rejected calls carry a `status`/`message` pair instead, and
/// node-side failures an `error` object.
#[derive(Debug, Deserialize)]
pub struct Envelope {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub result: Value,
    #[serde(default)]
    pub error: Option<Value>,
}

impl Envelope {
    pub fn parse(body: &[u8]) -> Result<Self, FetchError> {
        Ok(serde_json::from_slice(body)?)
    }

    /// Returns the `result` payload, or `Upstream` when the envelope reports
    /// a status or an error.
    pub fn into_result(self) -> Result<Value, FetchError> {
        if !self.status.is_empty() {
            let detail = match &self.result {
                Value::String(text) => text.clone(),
                other => other.to_string(),
            };
            return Err(FetchError::Upstream(format!(
                "status `{}` ({}): {}",
                self.status, self.message, detail
            )));
        }

        if let Some(error) = self.error.filter(|error| !error.is_null()) {
            return Err(FetchError::Upstream(error.to_string()));
        }

        Ok(self.result)
    }
}

#[derive(Debug, Deserialize)]
pub struct BlockResult {
    #[serde(default)]
    pub transactions: Vec<WireTransaction>,
}

#[derive(Debug, Deserialize)]
pub struct WireTransaction {
    pub from: String,
    /// `null` when the transaction deploys a contract.
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
}

impl From<WireTransaction> for Transaction {
    fn from(wire: WireTransaction) -> Self {
        let to = wire
            .to
            .filter(|to| !to.trim().is_empty())
            .map(Address::new);
        Transaction::new(Address::new(wire.from), to, wire.value.unwrap_or_default())
    }
}

/// Decodes an `eth_blockNumber` response body.
pub fn parse_height_response(body: &[u8]) -> Result<BlockHeight, FetchError> {
    let result = Envelope::parse(body)?.into_result()?;
    match result {
        Value::String(hex) => {
            parse_height(&hex).map_err(|err| FetchError::Decode(err.to_string()))
        }
        other => Err(FetchError::Decode(format!(
            "expected hex height string, got {other}"
        ))),
    }
}

/// Decodes an `eth_getBlockByNumber` response body.
pub fn parse_block_response(height: BlockHeight, body: &[u8]) -> Result<Block, FetchError> {
    let result = Envelope::parse(body)?.into_result()?;
    decode_block(height, result)
}

/// Converts the `result` object of a block query. A `null` result means the
/// provider does not have the block (yet).
pub fn decode_block(height: BlockHeight, result: Value) -> Result<Block, FetchError> {
    if result.is_null() {
        return Err(FetchError::Decode(format!("block {height} not available")));
    }

    let block: BlockResult = serde_json::from_value(result)?;
    let transactions = block.transactions.into_iter().map(Transaction::from).collect();
    Ok(Block::new(height, transactions))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::FetchErrorKind;
    use block_delta_domain::Ledger;

    const FIXTURE: &str = include_str!("../../fixtures/block_transactions.json");

    #[test]
    fn reference_fixture_selects_largest_spender() {
        let result: Value = serde_json::from_str(FIXTURE).expect("fixture parses");
        let block = decode_block(19_530_226, result).expect("fixture decodes");

        let mut ledger = Ledger::new();
        ledger.apply_block(&block).expect("fixture applies");
        let change = ledger.max_abs_change().expect("change selected");

        assert_eq!(
            change.address_str(),
            "0x49b21bdfa30333858956342f4028ce72e37eb851"
        );
        assert_eq!(change.value(), "-460110000000000000");
    }

    #[test]
    fn tip_height_is_decoded_from_hex() {
        let body = br#"{"jsonrpc":"2.0","id":83,"result":"0x12a05f2"}"#;
        assert_eq!(parse_height_response(body).unwrap(), 19_530_226);
    }

    #[test]
    fn non_string_tip_is_a_decode_error() {
        let body = br#"{"jsonrpc":"2.0","id":83,"result":12}"#;
        let err = parse_height_response(body).unwrap_err();
        assert_eq!(err.kind(), FetchErrorKind::Decode);
    }

    #[test]
    fn status_field_marks_upstream_rejection() {
        let body = br#"{"status":"0","message":"NOTOK","result":"Max rate limit reached"}"#;
        let err = parse_block_response(1, body).unwrap_err();
        assert_eq!(err.kind(), FetchErrorKind::Upstream);
        assert!(err.to_string().contains("Max rate limit reached"));
    }

    #[test]
    fn error_object_marks_upstream_rejection() {
        let body =
            br#"{"jsonrpc":"2.0","id":1,"error":{"code":-32000,"message":"header not found"}}"#;
        let err = parse_block_response(1, body).unwrap_err();
        assert_eq!(err.kind(), FetchErrorKind::Upstream);
    }

    #[test]
    fn missing_block_is_a_decode_error() {
        let body = br#"{"jsonrpc":"2.0","id":1,"result":null}"#;
        let err = parse_block_response(7, body).unwrap_err();
        assert_eq!(err.kind(), FetchErrorKind::Decode);
    }

    #[test]
    fn garbage_body_is_a_decode_error() {
        let err = parse_block_response(7, b"<html>bad gateway</html>").unwrap_err();
        assert_eq!(err.kind(), FetchErrorKind::Decode);
    }

    #[test]
    fn null_and_empty_recipients_become_contract_creations() {
        let body = br#"{"jsonrpc":"2.0","id":1,"result":{"transactions":[
            {"from":"0xAA","to":null,"value":"0x1"},
            {"from":"0xaa","to":"","value":"0x2"},
            {"from":"0xaa","value":"0x3"},
            {"from":"0xaa","to":"0xBB","value":"0x4"}
        ]}}"#;
        let block = parse_block_response(9, body).unwrap();

        assert_eq!(block.height, 9);
        assert_eq!(block.transactions.len(), 4);
        assert!(block.transactions[..3].iter().all(Transaction::is_contract_creation));
        assert_eq!(block.transactions[0].from.as_str(), "0xaa");
        assert_eq!(
            block.transactions[3].to.as_ref().map(Address::as_str),
            Some("0xbb")
        );
    }

    #[test]
    fn sender_must_be_a_string() {
        let body = br#"{"result":{"transactions":[{"from":null,"to":"0xbb","value":"0x1"}]}}"#;
        let err = parse_block_response(1, body).unwrap_err();
        assert_eq!(err.kind(), FetchErrorKind::Decode);
    }
}
