//! Entry parameters
//!
//! Each parameter is stored under its own key next to a format key, and the
//! names are tracked in a per-entry index updated with compare-and-set so
//! concurrent writers never lose each other's names.
//!
//! Text values are stored verbatim (`plain`). Every other value is stored
//! `tagged`: a version byte, the payload length as a big-endian `u32`, then
//! the bincode encoding of the [`ParameterValue`].

use crate::context::StoreContext;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{trace, warn};
use transio_common::{Error, ParameterFormat, ParameterValue, Result};
use transio_kv::KeyValueStore;

const TAGGED_V1: u8 = 1;
const TAGGED_HEADER: usize = 5;

/// Encode a value into its stored bytes and format
pub fn encode_value(value: &ParameterValue) -> Result<(Vec<u8>, ParameterFormat)> {
    match value {
        ParameterValue::Text(text) => Ok((text.as_bytes().to_vec(), ParameterFormat::Plain)),
        other => {
            let payload =
                bincode::serialize(other).map_err(|e| Error::Serialization(e.to_string()))?;
            let len = u32::try_from(payload.len())
                .map_err(|_| Error::Serialization("parameter value too large".into()))?;
            let mut bytes = Vec::with_capacity(TAGGED_HEADER + payload.len());
            bytes.push(TAGGED_V1);
            bytes.extend_from_slice(&len.to_be_bytes());
            bytes.extend_from_slice(&payload);
            Ok((bytes, ParameterFormat::TaggedBinary))
        }
    }
}

/// Decode stored bytes written with `format`
pub fn decode_value(bytes: &[u8], format: ParameterFormat) -> Result<ParameterValue> {
    match format {
        ParameterFormat::Plain => String::from_utf8(bytes.to_vec())
            .map(ParameterValue::Text)
            .map_err(|e| Error::Deserialization(format!("plain parameter is not UTF-8: {e}"))),
        ParameterFormat::TaggedBinary => {
            if bytes.len() < TAGGED_HEADER {
                return Err(Error::Deserialization("truncated tagged parameter".into()));
            }
            if bytes[0] != TAGGED_V1 {
                return Err(Error::Deserialization(format!(
                    "unknown parameter tag {}",
                    bytes[0]
                )));
            }
            let mut len = [0u8; 4];
            len.copy_from_slice(&bytes[1..TAGGED_HEADER]);
            let len = u32::from_be_bytes(len) as usize;
            let payload = &bytes[TAGGED_HEADER..];
            if payload.len() != len {
                return Err(Error::Deserialization(format!(
                    "tagged parameter length {} does not match header {}",
                    payload.len(),
                    len
                )));
            }
            Ok(bincode::deserialize(payload)?)
        }
    }
}

fn encode_names(names: &[String]) -> Result<Vec<u8>> {
    bincode::serialize(names).map_err(|e| Error::Serialization(e.to_string()))
}

/// Parameters of the entries of one store
#[derive(Clone)]
pub struct ParameterStore {
    ctx: Arc<StoreContext>,
}

impl ParameterStore {
    pub(crate) fn new(ctx: Arc<StoreContext>) -> Self {
        Self { ctx }
    }

    fn decode_names(&self, entry: &str, bytes: &[u8]) -> Vec<String> {
        bincode::deserialize(bytes).unwrap_or_else(|e| {
            warn!("Ignoring corrupt parameter index of {}: {}", entry, e);
            Vec::new()
        })
    }

    /// Names currently recorded in the index of `entry`
    pub fn parameter_names(&self, entry: &str) -> Result<Vec<String>> {
        Ok(self
            .ctx
            .kv
            .get(&self.ctx.keys.parameter_names(entry))?
            .map(|bytes| self.decode_names(entry, &bytes))
            .unwrap_or_default())
    }

    fn write_value(&self, entry: &str, name: &str, value: &ParameterValue) -> Result<()> {
        let (bytes, format) = encode_value(value)?;
        let ttl = self.ctx.active_ttl();
        self.ctx
            .kv
            .put(&self.ctx.keys.parameter(entry, name), Some(bytes.as_slice()), ttl)?;
        self.ctx.kv.put(
            &self.ctx.keys.parameter_format(entry, name),
            Some(format.as_str().as_bytes()),
            ttl,
        )
    }

    fn index_names(&self, entry: &str, names: &[&str]) -> Result<()> {
        let key = self.ctx.keys.parameter_names(entry);
        self.ctx
            .updater
            .update(&key, self.ctx.active_ttl(), |old| {
                let mut current = old
                    .map(|bytes| self.decode_names(entry, bytes))
                    .unwrap_or_default();
                let before = current.len();
                for name in names {
                    if !current.iter().any(|n| n == name) {
                        current.push((*name).to_string());
                    }
                }
                if old.is_some() && current.len() == before {
                    return Ok(old.map(<[u8]>::to_vec));
                }
                encode_names(&current).map(Some)
            })?;
        // An unchanged index is not rewritten; it still goes back to the active TTL
        self.ctx.kv.set_ttl(&key, self.ctx.active_ttl())?;
        Ok(())
    }

    /// Store one parameter and record its name
    pub fn put_parameter(&self, entry: &str, name: &str, value: &ParameterValue) -> Result<()> {
        self.write_value(entry, name, value)?;
        self.index_names(entry, &[name])?;
        self.ctx.mark_entry_exists(entry)?;
        trace!("put_parameter({}, {})", entry, name);
        Ok(())
    }

    /// Store several parameters with a single index update
    pub fn put_parameters(&self, entry: &str, values: &HashMap<String, ParameterValue>) -> Result<()> {
        for (name, value) in values {
            self.write_value(entry, name, value)?;
        }
        let names: Vec<&str> = values.keys().map(String::as_str).collect();
        self.index_names(entry, &names)?;
        self.ctx.mark_entry_exists(entry)
    }

    /// Read one parameter. Undecodable values read as absent.
    pub fn get_parameter(&self, entry: &str, name: &str) -> Result<Option<ParameterValue>> {
        let Some(bytes) = self.ctx.kv.get(&self.ctx.keys.parameter(entry, name))? else {
            return Ok(None);
        };
        let format = match self
            .ctx
            .kv
            .get_string(&self.ctx.keys.parameter_format(entry, name))
        {
            Ok(Some(format)) => format.parse().unwrap_or_else(|e| {
                warn!("Parameter {} of {}: {}, reading as plain", name, entry, e);
                ParameterFormat::Plain
            }),
            Ok(None) => ParameterFormat::Plain,
            Err(e) => {
                warn!("Parameter {} of {}: unreadable format: {}", name, entry, e);
                ParameterFormat::Plain
            }
        };
        match decode_value(&bytes, format) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                warn!("Skipping corrupt parameter {} of {}: {}", name, entry, e);
                Ok(None)
            }
        }
    }

    /// Every parameter of `entry`; `None` when the entry does not exist
    pub fn get_parameters(&self, entry: &str) -> Result<Option<HashMap<String, ParameterValue>>> {
        if !self.ctx.exists(entry)? {
            return Ok(None);
        }
        let mut values = HashMap::new();
        for name in self.parameter_names(entry)? {
            if let Some(value) = self.get_parameter(entry, &name)? {
                values.insert(name, value);
            }
        }
        Ok(Some(values))
    }

    /// Delete every parameter of `entry` along with its index
    pub fn remove_parameters(&self, entry: &str) -> Result<()> {
        for name in self.parameter_names(entry)? {
            self.ctx.kv.put(&self.ctx.keys.parameter(entry, &name), None, None)?;
            self.ctx
                .kv
                .put(&self.ctx.keys.parameter_format(entry, &name), None, None)?;
        }
        self.ctx
            .kv
            .put(&self.ctx.keys.parameter_names(entry), None, None)
    }

    /// Give every parameter key of `entry` the released TTL
    pub(crate) fn release(&self, entry: &str) -> Result<()> {
        let ttl = self.ctx.released_ttl();
        for name in self.parameter_names(entry)? {
            self.ctx.kv.set_ttl(&self.ctx.keys.parameter(entry, &name), ttl)?;
            self.ctx
                .kv
                .set_ttl(&self.ctx.keys.parameter_format(entry, &name), ttl)?;
        }
        self.ctx
            .kv
            .set_ttl(&self.ctx.keys.parameter_names(entry), ttl)?;
        Ok(())
    }
}
