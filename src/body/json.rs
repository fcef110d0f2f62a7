//! JSON body parsing: `application/json` and `application/*+json`.

use serde_json::Value;

use crate::error::AppError;

pub fn parse(bytes: &[u8]) -> Result<Value, AppError> {
    serde_json::from_slice(bytes)
        .map_err(|e| AppError::BadRequest(format!("malformed JSON body: {e}")))
}
