use crate::config::CallbackFields;
use crate::domain::callback::{NormalizedCallback, ResponseCode, SourceChannel};
use crate::domain::pending::TxnRef;
use crate::error::{ReconcileError, Result};
use rust_decimal::Decimal;
use std::borrow::Cow;
use std::collections::BTreeMap;
use tracing::debug;

/// Turns a raw provider redirect into a typed callback.
///
/// Only the reference and response code are mandatory. Parameter order does
/// not matter and unknown parameters end up in `metadata`.
#[derive(Debug, Clone, Default)]
pub struct CallbackNormalizer {
    fields: CallbackFields,
}

impl CallbackNormalizer {
    pub fn new(fields: CallbackFields) -> Self {
        Self { fields }
    }

    pub fn normalize(&self, raw: &str, channel: SourceChannel) -> Result<NormalizedCallback> {
        let mut params = query_params(raw);

        let reference = take_required(&mut params, &self.fields.reference)?;
        let response_code = take_required(&mut params, &self.fields.response_code)?;
        let raw_amount = params.remove(&self.fields.amount).and_then(|amount| {
            let parsed = amount.trim().parse::<Decimal>().ok();
            if parsed.is_none() {
                debug!(%amount, "Ignoring unparsable callback amount");
            }
            parsed
        });

        Ok(NormalizedCallback {
            reference: TxnRef::new(reference),
            response_code: ResponseCode::parse(&response_code),
            raw_amount,
            source_channel: channel,
            metadata: params,
        })
    }
}

fn take_required(params: &mut BTreeMap<String, String>, field: &str) -> Result<String> {
    params
        .remove(field)
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| ReconcileError::MalformedCallback(format!("missing `{field}`")))
}

/// Key/value pairs after the first `?`. Pairs without `=` or without a key are
/// skipped; the first occurrence of a repeated key wins.
fn query_params(raw: &str) -> BTreeMap<String, String> {
    let mut params = BTreeMap::new();
    let Some((_, query)) = raw.split_once('?') else {
        return params;
    };
    let query = query.split('#').next().unwrap_or_default();

    for pair in query.split('&') {
        let Some((key, value)) = pair.split_once('=') else {
            continue;
        };
        if key.is_empty() {
            continue;
        }
        params
            .entry(key.to_string())
            .or_insert_with(|| decode_value(value));
    }
    params
}

fn decode_value(value: &str) -> String {
    let value = value.replace('+', " ");
    match urlencoding::decode(&value) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => match urlencoding::decode_binary(value.as_bytes()) {
            Cow::Borrowed(bytes) => String::from_utf8_lossy(bytes).into_owned(),
            Cow::Owned(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        },
    }
}
