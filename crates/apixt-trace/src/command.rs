//! Trace records and their wire format.
//!
//! Every record in a trace is a [`Command`]. On the wire each command is one
//! JSON object carrying a numeric `cmd` discriminator plus kind-specific
//! fields; the viewer rebuilds the tree from the order of the lines.

use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use serde_json::Value;

use crate::error::Result;

/// Numeric discriminators used on the wire.
pub mod code {
    pub const END: u8 = 0;
    pub const SECTION_OPEN: u8 = 1;
    pub const SECTION_CLOSE: u8 = 2;
    pub const DETAILS_OPEN: u8 = 3;
    pub const DETAILS_CLOSE: u8 = 4;
    pub const DEBUG: u8 = 5;
    pub const BLOCK: u8 = 6;
    pub const ABORT: u8 = 7;
}

/// A single trace record.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Command {
    /// Reserved or suppressed slot. Never serialized.
    #[default]
    Undefined,
    /// The trace is complete.
    End,
    SectionOpen {
        name: String,
    },
    SectionClose,
    DetailsOpen,
    DetailsClose,
    /// A `d()` dump of one or more values.
    Debug {
        name: String,
        vars: Vec<DebugVar>,
    },
    Block {
        name: String,
        data: BlockData,
    },
    /// Processing was halted at a checkpoint.
    Abort {
        status: String,
        /// Token that resumes past the checkpoint on the next request.
        next: String,
    },
}

impl Command {
    /// Wire discriminator, or `None` for [`Command::Undefined`].
    pub fn code(&self) -> Option<u8> {
        match self {
            Command::Undefined => None,
            Command::End => Some(code::END),
            Command::SectionOpen { .. } => Some(code::SECTION_OPEN),
            Command::SectionClose => Some(code::SECTION_CLOSE),
            Command::DetailsOpen => Some(code::DETAILS_OPEN),
            Command::DetailsClose => Some(code::DETAILS_CLOSE),
            Command::Debug { .. } => Some(code::DEBUG),
            Command::Block { .. } => Some(code::BLOCK),
            Command::Abort { .. } => Some(code::ABORT),
        }
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Command::Undefined)
    }
}

#[derive(Serialize)]
struct Wire<T> {
    cmd: u8,
    #[serde(flatten)]
    body: T,
}

#[derive(Serialize)]
struct Empty {}

#[derive(Serialize)]
struct NamedBody<'a> {
    name: &'a str,
}

#[derive(Serialize)]
struct DebugBody<'a> {
    name: &'a str,
    vars: &'a [DebugVar],
}

#[derive(Serialize)]
struct BlockBody<'a> {
    name: &'a str,
    hash: &'a str,
    #[serde(flatten)]
    data: &'a BlockData,
}

#[derive(Serialize)]
struct AbortBody<'a> {
    status: &'a str,
    next: &'a str,
}

impl Serialize for Command {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let Some(cmd) = self.code() else {
            return serializer.serialize_unit();
        };
        match self {
            Command::SectionOpen { name } => Wire {
                cmd,
                body: NamedBody { name },
            }
            .serialize(serializer),
            Command::Debug { name, vars } => Wire {
                cmd,
                body: DebugBody { name, vars },
            }
            .serialize(serializer),
            Command::Block { name, data } => Wire {
                cmd,
                body: BlockBody {
                    name,
                    hash: name,
                    data,
                },
            }
            .serialize(serializer),
            Command::Abort { status, next } => Wire {
                cmd,
                body: AbortBody { status, next },
            }
            .serialize(serializer),
            _ => Wire { cmd, body: Empty {} }.serialize(serializer),
        }
    }
}

/// Payload of a block record.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockData {
    /// Mime type the viewer uses to render `content`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime: Option<String>,

    pub content: Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub footer: Option<Footer>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

impl BlockData {
    /// Block with raw JSON content and no mime type.
    pub fn new(content: impl Into<Value>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }

    /// Block holding text of the given mime type.
    pub fn text(mime: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(content.into()).with_mime(mime)
    }

    /// Block holding any serializable value, rendered as JSON.
    ///
    /// Fails when the value cannot be represented as JSON
    /// (e.g. a map with non-string keys).
    pub fn json(content: &impl Serialize) -> Result<Self> {
        Ok(Self::new(serde_json::to_value(content)?).with_mime("text/json"))
    }

    pub fn with_mime(mut self, mime: impl Into<String>) -> Self {
        self.mime = Some(mime.into());
        self
    }

    pub fn with_footer(mut self, footer: Footer) -> Self {
        self.footer = Some(footer);
        self
    }

    pub fn with_error(mut self, is_error: bool) -> Self {
        self.is_error = Some(is_error);
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }
}

/// Ordered key/value pairs shown under a block.
///
/// Serialized as a JSON object that keeps insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Footer(Vec<(String, Value)>);

impl Footer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry, replacing the value if the key already exists.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        let value = value.into();
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.0.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for Footer {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, value) in &self.0 {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

/// One value captured by a `d()` call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DebugVar {
    /// Rust type name of the value.
    pub name: String,
    pub value: Value,
}

impl DebugVar {
    /// Capture `value` with its type name. Values that cannot be encoded
    /// are recorded as their error message.
    pub fn of<T: Serialize + ?Sized>(value: &T) -> Self {
        let value = serde_json::to_value(value)
            .unwrap_or_else(|e| Value::String(format!("<unserializable: {e}>")));
        Self {
            name: std::any::type_name::<T>().to_string(),
            value,
        }
    }
}
