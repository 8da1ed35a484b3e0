use std::collections::BTreeMap;
use std::str::FromStr;

use serde_json::{Map, Value};
use thiserror::Error;

use crate::domain::models::{DeviceDescriptor, DeviceId, LoginResponse, PositionSample};

#[derive(Debug, Clone, Error, PartialEq)]
pub enum PayloadError {
    #[error("body is not valid JSON: {0}")]
    InvalidJson(String),
    #[error("payload must be a JSON object")]
    InvalidPayloadType,
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("field has an unexpected type: {0}")]
    InvalidField(&'static str),
    #[error("device entry {index} is malformed: {reason}")]
    InvalidDevice { index: usize, reason: String },
    #[error("response contained no data")]
    NoData,
}

/// What to do with a device entry that cannot be mapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeviceListPolicy {
    /// Drop the offending entry and keep the rest.
    #[default]
    SkipInvalid,
    /// Fail the whole listing.
    AllOrNothing,
}

impl FromStr for DeviceListPolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "skip_invalid" => Ok(Self::SkipInvalid),
            "all_or_nothing" => Ok(Self::AllOrNothing),
            other => Err(format!("unknown device list policy: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SkippedDevice {
    pub index: usize,
    pub device_id: Option<DeviceId>,
    pub error: PayloadError,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct DeviceCatalog {
    pub devices: BTreeMap<DeviceId, DeviceDescriptor>,
    pub skipped: Vec<SkippedDevice>,
}

pub fn parse_login(payload: &Value) -> Result<LoginResponse, PayloadError> {
    let success = success_object(payload)?;

    let token = match success.get("token") {
        Some(Value::String(token)) if !token.is_empty() => token.clone(),
        Some(Value::String(_)) | None | Some(Value::Null) => {
            return Err(PayloadError::MissingField("success.token"));
        }
        Some(_) => return Err(PayloadError::InvalidField("success.token")),
    };

    Ok(LoginResponse {
        token,
        user_id: success.get("userID").and_then(parse_i64),
        route_icon: success
            .get("routeIcon")
            .and_then(Value::as_str)
            .map(str::to_string),
    })
}

pub fn parse_device_list(
    payload: &Value,
    policy: DeviceListPolicy,
) -> Result<DeviceCatalog, PayloadError> {
    let entries = success_array(payload)?;
    let mut catalog = DeviceCatalog::default();

    for (index, entry) in entries.iter().enumerate() {
        match parse_device(entry) {
            Ok(descriptor) => {
                catalog.devices.insert(descriptor.id, descriptor);
            }
            Err(error) => {
                if policy == DeviceListPolicy::AllOrNothing {
                    return Err(PayloadError::InvalidDevice {
                        index,
                        reason: error.to_string(),
                    });
                }

                catalog.skipped.push(SkippedDevice {
                    index,
                    device_id: entry.get("id").and_then(parse_i64).map(DeviceId),
                    error,
                });
            }
        }
    }

    Ok(catalog)
}

pub fn parse_latest_position(payload: &Value) -> Result<PositionSample, PayloadError> {
    let entries = success_array(payload)?;
    let first = entries.first().ok_or(PayloadError::NoData)?;
    parse_position(first)
}

fn parse_device(entry: &Value) -> Result<DeviceDescriptor, PayloadError> {
    let object = entry.as_object().ok_or(PayloadError::InvalidPayloadType)?;

    let id = require(object, "id", parse_i64)?;
    let name = require(object, "name", parse_text)?;
    let imei = require(object, "imei", parse_text)?;

    let first_model = object
        .get("device_models")
        .ok_or(PayloadError::MissingField("device_models"))?
        .as_array()
        .ok_or(PayloadError::InvalidField("device_models"))?
        .first()
        .and_then(Value::as_object)
        .ok_or(PayloadError::MissingField("device_models[0]"))?;

    let model = require(first_model, "model", parse_text)?;
    let has_battery = match first_model.get("standalone_battery") {
        Some(Value::Bool(flag)) => *flag,
        Some(value) => parse_f64(value) == Some(1.0),
        None => false,
    };

    Ok(DeviceDescriptor {
        id: DeviceId(id),
        name,
        imei,
        model,
        has_battery,
    })
}

fn parse_position(entry: &Value) -> Result<PositionSample, PayloadError> {
    let object = entry.as_object().ok_or(PayloadError::InvalidPayloadType)?;

    Ok(PositionSample {
        latitude: require(object, "lat", parse_f64)?,
        longitude: require(object, "lng", parse_f64)?,
        heading: require(object, "direction", parse_f64)?,
        battery: require(object, "battery", parse_f64)?,
        speed: require(object, "speed", parse_f64)?,
        device_id: DeviceId(require(object, "iddevice", parse_i64)?),
        accuracy: require(object, "accuracy", parse_f64)?,
    })
}

fn success_object(payload: &Value) -> Result<&Map<String, Value>, PayloadError> {
    let object = payload.as_object().ok_or(PayloadError::InvalidPayloadType)?;
    object
        .get("success")
        .ok_or(PayloadError::MissingField("success"))?
        .as_object()
        .ok_or(PayloadError::InvalidField("success"))
}

fn success_array(payload: &Value) -> Result<&Vec<Value>, PayloadError> {
    let object = payload.as_object().ok_or(PayloadError::InvalidPayloadType)?;
    object
        .get("success")
        .ok_or(PayloadError::MissingField("success"))?
        .as_array()
        .ok_or(PayloadError::InvalidField("success"))
}

fn require<T>(
    object: &Map<String, Value>,
    key: &'static str,
    parse: fn(&Value) -> Option<T>,
) -> Result<T, PayloadError> {
    match object.get(key) {
        None | Some(Value::Null) => Err(PayloadError::MissingField(key)),
        Some(value) => parse(value).ok_or(PayloadError::InvalidField(key)),
    }
}

fn parse_f64(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    };
    number.filter(|number| number.is_finite())
}

fn parse_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number.as_i64().or_else(|| {
            number
                .as_f64()
                .filter(|float| float.fract() == 0.0 && float.is_finite())
                .map(|float| float as i64)
        }),
        Value::String(text) => text.trim().parse::<i64>().ok(),
        _ => None,
    }
}

fn parse_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}
