//! Driver initializer arguments (§6: "recognized init-argument kinds: typed
//! variant with the base types listed in §3").

use std::collections::HashMap;

/// One typed initializer argument value.
#[derive(Clone, Debug, PartialEq)]
pub enum InitArg {
    Bool(bool),
    I64(i64),
    U64(u64),
    F64(f64),
    Str(String),
    Bytes(Vec<u8>),
}

impl InitArg {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::I64(v) => Some(*v),
            Self::U64(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::U64(v) => Some(*v),
            Self::I64(v) => u64::try_from(*v).ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(v) => Some(v.as_str()),
            _ => None,
        }
    }
}

/// Named bag of init arguments passed to `ops.init` at registration time.
pub type InitArgs = HashMap<String, InitArg>;
