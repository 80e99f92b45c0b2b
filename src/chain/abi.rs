//! Contract interfaces and ABI artifact verification.
//!
//! Calls and log decoding go through the `sol!` interfaces below. The ABI
//! artifacts deployed next to the binary are loaded at startup and checked
//! against them, so a contract whose event shape changed fails at boot
//! instead of every log failing to decode.

use alloy::json_abi::{Event, JsonAbi};
use alloy::primitives::B256;
use alloy::sol;
use alloy::sol_types::SolEvent;
use std::path::{Path, PathBuf};
use thiserror::Error;

sol! {
    #[sol(rpc)]
    interface IRaffle {
        event RaffleEntered(address indexed participant, uint256 tickets);

        function getTimeLeftToDraw() external view returns (uint256);
        function getTicketCost() external view returns (uint256);
        function getTotalTickets() external view returns (uint256);
        function getTotalParticipants() external view returns (uint256);
    }

    #[sol(rpc)]
    interface IERC20Metadata {
        function totalSupply() external view returns (uint256);
        function symbol() external view returns (string);
        function name() external view returns (string);
        function decimals() external view returns (uint8);
    }
}

pub const RAFFLE_ENTERED: &str = "RaffleEntered";

/// keccak256("RaffleEntered(address,uint256)")
pub const RAFFLE_ENTERED_TOPIC: B256 = IRaffle::RaffleEntered::SIGNATURE_HASH;

/// Which `RaffleEntered` inputs are topics rather than data.
const RAFFLE_ENTERED_INDEXED: [bool; 2] = [true, false];

pub const RAFFLE_FUNCTIONS: [&str; 4] = [
    "getTimeLeftToDraw",
    "getTicketCost",
    "getTotalTickets",
    "getTotalParticipants",
];

pub const TOKEN_FUNCTIONS: [&str; 4] = ["totalSupply", "symbol", "name", "decimals"];

#[derive(Error, Debug)]
pub enum AbiError {
    #[error("failed to read ABI file {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse ABI file {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("ABI has no function `{0}`")]
    MissingFunction(String),
    #[error("ABI has no event `{0}`")]
    MissingEvent(String),
    #[error("event {found} does not match expected {expected}")]
    EventMismatch { found: String, expected: String },
}

/// Load an ABI from disk.
pub fn load_abi(path: &Path) -> Result<JsonAbi, AbiError> {
    let contents = std::fs::read_to_string(path).map_err(|source| AbiError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_abi(&contents).map_err(|source| AbiError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Accepts a bare ABI array or a Hardhat/Foundry artifact with an `abi` key.
pub fn parse_abi(contents: &str) -> Result<JsonAbi, serde_json::Error> {
    let value: serde_json::Value = serde_json::from_str(contents)?;
    match value.get("abi") {
        Some(abi) => serde_json::from_value(abi.clone()),
        None => serde_json::from_value(value),
    }
}

/// Check the raffle ABI exposes every view the relay reads and a
/// `RaffleEntered` event that decodes the way [`IRaffle::RaffleEntered`] does.
pub fn verify_raffle_abi(abi: &JsonAbi) -> Result<(), AbiError> {
    require_functions(abi, &RAFFLE_FUNCTIONS)?;

    let events = abi
        .event(RAFFLE_ENTERED)
        .ok_or_else(|| AbiError::MissingEvent(RAFFLE_ENTERED.to_string()))?;

    let matches = events.iter().any(|event| {
        event.selector() == RAFFLE_ENTERED_TOPIC
            && !event.anonymous
            && event.inputs.iter().map(|p| p.indexed).eq(RAFFLE_ENTERED_INDEXED)
    });
    if matches {
        return Ok(());
    }

    Err(AbiError::EventMismatch {
        found: events.iter().map(describe_event).collect::<Vec<_>>().join(", "),
        expected: "RaffleEntered(address indexed,uint256)".to_string(),
    })
}

/// Check the token ABI exposes the ERC-20 metadata views.
pub fn verify_token_abi(abi: &JsonAbi) -> Result<(), AbiError> {
    require_functions(abi, &TOKEN_FUNCTIONS)
}

fn require_functions(abi: &JsonAbi, names: &[&str]) -> Result<(), AbiError> {
    match names.iter().find(|name| abi.function(name).is_none()) {
        Some(missing) => Err(AbiError::MissingFunction(missing.to_string())),
        None => Ok(()),
    }
}

fn describe_event(event: &Event) -> String {
    let inputs: Vec<String> = event
        .inputs
        .iter()
        .map(|p| {
            if p.indexed {
                format!("{} indexed", p.ty)
            } else {
                p.ty.clone()
            }
        })
        .collect();
    format!("{}({})", event.name, inputs.join(","))
}
