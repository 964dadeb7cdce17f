//! The out-of-scope schema/config collaborator (§4.5, §11.3), given the
//! thinnest implementation that lets the example binary and the test suite
//! run without a real YAML schema parser. A real embedder supplies their own
//! [`SchemaSource`] (e.g. backed by `serde_yaml`) and their own config
//! format; this one exists to stand in for both, not to be one.

use std::collections::HashMap;
use std::fs;
use std::sync::RwLock;

use hound_abi::{Error, InitArg, InitArgs, Result, SchemaDescriptor};
use hound_core::SchemaSource;

use crate::Broker;

/// In-memory [`SchemaSource`]: a map from `(schema_base, schema_file)` to
/// pre-built descriptors, populated by [`StaticSchemaSource::insert`], with
/// built-in driver kinds (`hound_drivers::builtin_schema`) as a fallback
/// keyed by `schema_file` alone.
pub struct StaticSchemaSource {
    schemas: RwLock<HashMap<(String, String), Vec<SchemaDescriptor>>>,
}

impl Default for StaticSchemaSource {
    fn default() -> Self {
        Self::new()
    }
}

impl StaticSchemaSource {
    pub fn new() -> Self {
        Self {
            schemas: RwLock::new(HashMap::new()),
        }
    }

    /// Register a fixed set of descriptors under `(schema_base,
    /// schema_file)`, overriding the built-in fallback for that pair.
    pub fn insert(&self, schema_base: &str, schema_file: &str, descs: Vec<SchemaDescriptor>) {
        self.schemas
            .write()
            .unwrap()
            .insert((schema_base.to_string(), schema_file.to_string()), descs);
    }
}

impl SchemaSource for StaticSchemaSource {
    fn load(&self, schema_base: &str, schema_file: &str) -> Result<Vec<SchemaDescriptor>> {
        let key = (schema_base.to_string(), schema_file.to_string());
        if let Some(descs) = self.schemas.read().unwrap().get(&key) {
            return Ok(descs.clone());
        }
        hound_drivers::builtin_schema(schema_file)
            .map(|d| vec![d])
            .ok_or(Error::InvalidVal)
    }
}

/// One parsed line of a config file: `driver_name path schema_file
/// key=value...`. Blank lines and lines starting with `#` are skipped.
struct ConfigLine {
    driver_name: String,
    path: String,
    schema_file: String,
    args: InitArgs,
}

fn parse_arg_value(raw: &str) -> InitArg {
    if let Ok(v) = raw.parse::<i64>() {
        return InitArg::I64(v);
    }
    if let Ok(v) = raw.parse::<f64>() {
        return InitArg::F64(v);
    }
    match raw {
        "true" => InitArg::Bool(true),
        "false" => InitArg::Bool(false),
        _ => InitArg::Str(raw.to_string()),
    }
}

fn parse_config_line(line: &str) -> Option<ConfigLine> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    let mut fields = line.split_whitespace();
    let driver_name = fields.next()?.to_string();
    let path = fields.next()?.to_string();
    let schema_file = fields.next()?.to_string();

    let mut args = InitArgs::new();
    for field in fields {
        if let Some((key, value)) = field.split_once('=') {
            args.insert(key.to_string(), parse_arg_value(value));
        }
    }

    Some(ConfigLine {
        driver_name,
        path,
        schema_file,
        args,
    })
}

impl Broker {
    /// `init_config(path, schema_base)` (§6): read a line-oriented config
    /// file and `init_driver` each entry. The first line to fail aborts the
    /// rest; drivers already registered from earlier lines are left in
    /// place (mirrors `register_driver`'s own "validate before mutating,
    /// but don't unwind a sibling's already-committed state" scope).
    pub fn init_config(&self, path: &str, schema_base: &str) -> Result<()> {
        let contents = fs::read_to_string(path).map_err(|_| Error::IoError)?;
        for (lineno, raw_line) in contents.lines().enumerate() {
            let Some(entry) = parse_config_line(raw_line) else {
                continue;
            };
            self.init_driver(
                &entry.driver_name,
                &entry.path,
                schema_base,
                &entry.schema_file,
                &entry.args,
            )
            .map_err(|e| {
                log::error!(
                    "hound: config line {} ({}) failed: {e}",
                    lineno + 1,
                    entry.driver_name
                );
                e
            })?;
        }
        Ok(())
    }
}
