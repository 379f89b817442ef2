//! FlightSuretyApp bindings for the calls and the event the oracle server uses.

use alloy_primitives::B256;
use alloy_sol_types::{sol, SolCall, SolEvent};

use crate::models::{OracleRequest, StatusCode};

sol! {
    interface FlightSuretyApp {
        event OracleRequest(uint8 index, address airline, string flight, uint256 timestamp);

        function registerOracle() external payable;
        function getMyIndexes() external view returns (uint8[3]);
        function isOperational() external view returns (bool);
        function submitOracleResponse(
            uint8 index,
            address airline,
            string flight,
            uint256 timestamp,
            uint8 statusCode
        ) external;
    }
}

/// Decoded `OracleRequest` event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OracleRequestLog {
    /// Index the contract drew for this request
    pub index: u8,
    pub request: OracleRequest,
}

pub fn submit_oracle_response(index: u8, request: &OracleRequest, code: StatusCode) -> Vec<u8> {
    FlightSuretyApp::submitOracleResponseCall {
        index,
        airline: request.airline,
        flight: request.flight.clone(),
        timestamp: request.timestamp,
        statusCode: code.code(),
    }
    .abi_encode()
}

pub fn register_oracle() -> Vec<u8> {
    FlightSuretyApp::registerOracleCall {}.abi_encode()
}

pub fn get_my_indexes() -> Vec<u8> {
    FlightSuretyApp::getMyIndexesCall {}.abi_encode()
}

pub fn decode_my_indexes(data: &[u8]) -> Result<[u8; 3], alloy_sol_types::Error> {
    Ok(FlightSuretyApp::getMyIndexesCall::abi_decode_returns(data, true)?._0)
}

pub fn is_operational() -> Vec<u8> {
    FlightSuretyApp::isOperationalCall {}.abi_encode()
}

pub fn decode_is_operational(data: &[u8]) -> Result<bool, alloy_sol_types::Error> {
    Ok(FlightSuretyApp::isOperationalCall::abi_decode_returns(data, true)?._0)
}

pub fn oracle_request_topic() -> B256 {
    FlightSuretyApp::OracleRequest::SIGNATURE_HASH
}

/// Decode an `OracleRequest` log from its topics and non-indexed data.
pub fn decode_oracle_request(
    topics: &[B256],
    data: &[u8],
) -> Result<OracleRequestLog, alloy_sol_types::Error> {
    let event = FlightSuretyApp::OracleRequest::decode_raw_log(topics.iter().copied(), data, true)?;
    Ok(OracleRequestLog {
        index: event.index,
        request: OracleRequest::new(event.airline, event.flight, event.timestamp),
    })
}
