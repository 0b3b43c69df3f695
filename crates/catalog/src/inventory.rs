//! Cross-reference inventories.
//!
//! An inventory maps `domain:role` to object names, and each name to a
//! `[project, version, uri, display]` quadruple. Builds publish it either as
//! the decoded mapping (JSON) or as a Sphinx `objects.inv` version 2 file.
//!
//! Parsing is lenient per entry: a malformed group or object is recorded as a
//! [`Rejection`] and the rest of the inventory is still usable. Only an
//! inventory that is unusable as a whole fails with
//! [`InvalidInventory`](ErrorKind::InvalidInventory).

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use flate2::read::ZlibDecoder;
use regex::Regex;
use serde_json::Value;
use std::io::Read;
use std::sync::LazyLock;

const OBJECTS_INV_MAGIC: &str = "# Sphinx inventory version 2";
/// Display name meaning "same as the object name".
const SAME_AS_NAME: &str = "-";

static OBJECTS_INV_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.+?)\s+(\S+)\s+(-?\d+)\s+?(\S*)\s+(.*)$").unwrap());

/// One exported object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryEntry {
    pub domain: String,
    pub role: String,
    pub name: String,
    pub project: String,
    pub project_version: String,
    /// Page path relative to the version root, optionally followed by
    /// `#anchor`.
    pub uri: String,
    /// As published; see [`display_name`](Self::display_name).
    pub display_name: String,
}
impl InventoryEntry {
    /// The name to show for this object, with `-` resolved to the object name.
    pub fn display_name(&self) -> &str {
        match self.display_name.as_str() {
            SAME_AS_NAME => &self.name,
            display => display,
        }
    }

    pub fn target(&self) -> Target {
        Target::parse(&self.uri)
    }
}

/// The page and in-page anchor an inventory uri points at.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Target {
    pub page_path: String,
    /// Fragment without the `#`; empty when the uri has none.
    pub anchor: String,
}
impl Target {
    /// Split `uri` on its first `#`.
    ///
    /// Directory-style builds link to `api/` rather than `api/index.html`, so
    /// a page path that is empty or ends in `/` resolves to the `index.html`
    /// inside it.
    pub fn parse(uri: &str) -> Self {
        let (path, anchor) = uri.split_once('#').unwrap_or((uri, ""));
        let page_path = match path.is_empty() || path.ends_with('/') {
            true => format!("{path}index.html"),
            false => path.to_string(),
        };
        Self { page_path, anchor: anchor.to_string() }
    }
}

/// An inventory item that could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    /// The group key, `group/name`, or line number that was rejected.
    pub key: String,
    pub reason: String,
}
impl Rejection {
    fn new(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self { key: key.into(), reason: reason.into() }
    }
}

/// A parsed inventory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Inventory {
    /// Project name from the inventory header, when the format has one.
    pub project: Option<String>,
    /// Project version from the inventory header, when the format has one.
    pub version: Option<String>,
    pub entries: Vec<InventoryEntry>,
    pub rejections: Vec<Rejection>,
}
impl Inventory {
    /// Parse the decoded mapping form:
    ///
    /// ```json
    /// {"py:function": {"sample.test.function": ["proj", "1.0", "test.html#sample-test-func", "-"]}}
    /// ```
    pub fn from_json(source: &str) -> Result<Self> {
        let value: Value =
            serde_json::from_str(source).or_raise(|| ErrorKind::InvalidInventory("malformed JSON".to_string()))?;
        let Value::Object(groups) = value else {
            exn::bail!(ErrorKind::InvalidInventory("top level must be an object".to_string()));
        };
        let mut inventory = Self::default();
        for (group, objects) in groups {
            let Some((domain, role)) = split_role(&group) else {
                inventory.rejections.push(Rejection::new(group, "expected a `domain:role` key"));
                continue;
            };
            let Value::Object(objects) = objects else {
                inventory.rejections.push(Rejection::new(group.clone(), "expected an object of names"));
                continue;
            };
            for (name, fields) in objects {
                let key = format!("{group}/{name}");
                if name.is_empty() {
                    inventory.rejections.push(Rejection::new(key, "empty object name"));
                    continue;
                }
                let Some([project, project_version, uri, display_name]) = quadruple(&fields) else {
                    inventory.rejections.push(Rejection::new(key, "expected [project, version, uri, display]"));
                    continue;
                };
                inventory.entries.push(InventoryEntry {
                    domain: domain.to_string(),
                    role: role.to_string(),
                    name,
                    project,
                    project_version,
                    uri,
                    display_name,
                });
            }
        }
        tracing::debug!(entries = inventory.entries.len(), rejected = inventory.rejections.len(), "parsed inventory");
        Ok(inventory)
    }

    /// Parse a Sphinx `objects.inv` (version 2): four plain-text header
    /// lines followed by a zlib stream of `name domain:role priority uri
    /// display` lines. A trailing `$` in the uri stands for the object name.
    pub fn from_objects_inv(bytes: &[u8]) -> Result<Self> {
        let mut rest = bytes;
        let mut header = Vec::with_capacity(4);
        for _ in 0..4 {
            let Some(end) = rest.iter().position(|b| *b == b'\n') else {
                exn::bail!(ErrorKind::InvalidInventory("truncated header".to_string()));
            };
            let line = std::str::from_utf8(&rest[..end])
                .or_raise(|| ErrorKind::InvalidInventory("header is not UTF-8".to_string()))?;
            header.push(line.trim_end_matches('\r'));
            rest = &rest[end + 1..];
        }
        if header[0] != OBJECTS_INV_MAGIC {
            exn::bail!(ErrorKind::InvalidInventory(format!("unsupported inventory header `{}`", header[0])));
        }
        if !header[3].contains("zlib") {
            exn::bail!(ErrorKind::InvalidInventory("body is not zlib compressed".to_string()));
        }

        let mut body = String::new();
        ZlibDecoder::new(rest)
            .read_to_string(&mut body)
            .or_raise(|| ErrorKind::InvalidInventory("cannot decompress body".to_string()))?;

        let mut inventory = Self {
            project: header[1].strip_prefix("# Project: ").map(str::to_string),
            version: header[2].strip_prefix("# Version: ").map(str::to_string),
            ..Self::default()
        };
        let project = inventory.project.clone().unwrap_or_default();
        let version = inventory.version.clone().unwrap_or_default();
        for (number, line) in body.lines().enumerate() {
            let line = line.trim_end();
            if line.is_empty() {
                continue;
            }
            let key = format!("line {}", number + 1);
            let Some(captures) = OBJECTS_INV_LINE.captures(line) else {
                inventory.rejections.push(Rejection::new(key, "unrecognised inventory line"));
                continue;
            };
            let name = &captures[1];
            let Some((domain, role)) = split_role(&captures[2]) else {
                inventory.rejections.push(Rejection::new(key, "expected a `domain:role` type"));
                continue;
            };
            let location = &captures[4];
            let uri = match location.strip_suffix('$') {
                Some(base) => format!("{base}{name}"),
                None => location.to_string(),
            };
            inventory.entries.push(InventoryEntry {
                domain: domain.to_string(),
                role: role.to_string(),
                name: name.to_string(),
                project: project.clone(),
                project_version: version.clone(),
                uri,
                display_name: captures[5].to_string(),
            });
        }
        tracing::debug!(entries = inventory.entries.len(), rejected = inventory.rejections.len(), "parsed objects.inv");
        Ok(inventory)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Split `domain:role` on the first `:`, requiring both halves.
fn split_role(key: &str) -> Option<(&str, &str)> {
    key.split_once(':').filter(|(domain, role)| !domain.is_empty() && !role.is_empty())
}

fn quadruple(value: &Value) -> Option<[String; 4]> {
    let Value::Array(items) = value else {
        return None;
    };
    let [project, version, uri, display] = items.as_slice() else {
        return None;
    };
    Some([
        project.as_str()?.to_string(),
        version.as_str()?.to_string(),
        uri.as_str()?.to_string(),
        display.as_str()?.to_string(),
    ])
}
