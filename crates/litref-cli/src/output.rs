//! JSON documents and exit codes shared by the subcommands.
//!
//! Every subcommand prints exactly one JSON document to stdout; progress
//! and diagnostics go to stderr. Exit codes are part of the contract:
//! 0 success, 1 not found, 2 configuration error, 3 API/transport failure.

use std::process::ExitCode;

use litref_core::Error;
use serde_json::{Value, json};

pub fn exit_code_for(err: &Error) -> u8 {
    match err {
        Error::NotFound(_) => 1,
        Error::Config(_) | Error::UnknownApi(_) => 2,
        Error::RateLimited(_) | Error::Network(_) | Error::Api(_) => 3,
    }
}

pub fn exit(err: &Error) -> ExitCode {
    ExitCode::from(exit_code_for(err))
}

pub fn error_type(err: &Error) -> &'static str {
    match err {
        Error::NotFound(_) => "not_found",
        Error::Config(_) | Error::UnknownApi(_) => "config_error",
        Error::RateLimited(_) => "rate_limit",
        Error::Network(_) => "network_error",
        Error::Api(_) => "api_error",
    }
}

/// Whether retrying the same invocation later could plausibly succeed.
pub fn recoverable(err: &Error) -> bool {
    matches!(err, Error::RateLimited(_) | Error::Network(_))
}

pub fn print_json(doc: &Value) {
    println!("{}", serde_json::to_string_pretty(doc).unwrap_or_default());
}

/// `abstract` subcommand result document.
pub fn abstract_document(query: &Value, text: Option<&str>, source: Option<&Value>) -> Value {
    json!({
        "status": if text.is_some() { "success" } else { "not_found" },
        "query": query,
        "abstract": text,
        "abstract_source": source,
    })
}

/// `abstract` subcommand error document.
pub fn abstract_error(query: &Value, err: &Error) -> Value {
    json!({
        "status": "error",
        "query": query,
        "abstract": Value::Null,
        "abstract_source": Value::Null,
        "error": {
            "type": error_type(err),
            "message": err.to_string(),
        }
    })
}

/// Standard search/verify success document.
pub fn success_document(source: &str, query: &Value, results: Vec<Value>) -> Value {
    json!({
        "status": "success",
        "source": source,
        "query": query,
        "count": results.len(),
        "results": results,
        "errors": [],
    })
}

/// Standard document for results accompanied by pagination failures.
pub fn partial_document(
    source: &str,
    query: &Value,
    results: Vec<Value>,
    errors: Vec<Value>,
    warning: String,
) -> Value {
    json!({
        "status": "partial",
        "source": source,
        "query": query,
        "count": results.len(),
        "results": results,
        "errors": errors,
        "warning": warning,
    })
}

/// Standard search/verify error document.
pub fn error_document(source: &str, query: &Value, err: &Error) -> Value {
    json!({
        "status": "error",
        "source": source,
        "query": query,
        "results": [],
        "count": 0,
        "errors": [{
            "type": error_type(err),
            "message": err.to_string(),
            "recoverable": recoverable(err),
        }],
    })
}
