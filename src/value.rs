//! Unified access to request values.
//!
//! Query parameters, path parameters, headers, form fields and uploads all
//! surface as a [`Value`]. The variant tells you the shape; the accessors do
//! the rest:
//!
//! ```rust
//! use weft::Value;
//!
//! let query = Value::from_query("page=2&user.name=alice&tag=a&tag=b");
//!
//! assert_eq!(query.get("page").int_value().unwrap(), 2);
//! assert_eq!(query.get("user").get("name").value().unwrap(), "alice");
//! assert_eq!(query.get("tag").to_list(), ["a", "b"]);
//! assert_eq!(query.get("size").int_value_or(20).unwrap(), 20);
//! ```
//!
//! # Coercion
//!
//! Leaves always hold the raw string. Numbers and booleans are parsed on
//! demand. A value that is absent fails with [`Error::Missing`]; a value that
//! is present but malformed fails with [`Error::TypeMismatch`]. The `*_or`
//! accessors substitute their default for the first case only.

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use bytes::Bytes;
use chrono::DateTime;

use crate::error::{Error, Result};
use crate::media_type::MediaType;

pub const DEFAULT_START_DELIMITER: &str = "${";
pub const DEFAULT_END_DELIMITER: &str = "}";

/// A request value: absent, a single string, a sequence, a nested object, or
/// an uploaded file.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Missing { name: String },
    Single { name: String, value: String },
    Array { name: String, items: Vec<Value> },
    Object { name: String, fields: Vec<(String, Value)> },
    Upload(FileUpload),
}

/// A file received in a multipart request. Decoding happens upstream; this
/// only carries the result.
#[derive(Clone, Debug, PartialEq)]
pub struct FileUpload {
    name: String,
    filename: String,
    content_type: Option<MediaType>,
    content: Bytes,
}

impl FileUpload {
    pub fn new(name: impl Into<String>, filename: impl Into<String>, content: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            filename: filename.into(),
            content_type: None,
            content: content.into(),
        }
    }

    pub fn with_content_type(mut self, content_type: MediaType) -> Self {
        self.content_type = Some(content_type);
        self
    }

    pub fn name(&self) -> &str { &self.name }
    pub fn filename(&self) -> &str { &self.filename }
    pub fn content_type(&self) -> Option<&MediaType> { self.content_type.as_ref() }
    pub fn content(&self) -> &Bytes { &self.content }
    pub fn size(&self) -> usize { self.content.len() }
}

// ── Construction ─────────────────────────────────────────────────────────────

impl Value {
    pub fn missing(name: impl Into<String>) -> Self {
        Self::Missing { name: name.into() }
    }

    pub fn single(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Single { name: name.into(), value: value.into() }
    }

    pub fn array(name: impl Into<String>, items: impl IntoIterator<Item = Value>) -> Self {
        Self::Array { name: name.into(), items: items.into_iter().collect() }
    }

    pub fn object<K: Into<String>>(
        name: impl Into<String>,
        fields: impl IntoIterator<Item = (K, Value)>,
    ) -> Self {
        Self::Object {
            name: name.into(),
            fields: fields.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    pub fn upload(file: FileUpload) -> Self {
        Self::Upload(file)
    }

    /// Picks the variant from the number of values: none is `Missing`, one is
    /// `Single`, more is an `Array` of singles sharing `name`.
    pub fn create<S: Into<String>>(name: impl Into<String>, values: impl IntoIterator<Item = S>) -> Self {
        let name = name.into();
        let mut values: Vec<String> = values.into_iter().map(Into::into).collect();
        match values.len() {
            0 => Self::Missing { name },
            1 => Self::Single { value: values.remove(0), name },
            _ => Self::Array {
                items: values.into_iter().map(|v| Value::single(name.clone(), v)).collect(),
                name,
            },
        }
    }

    /// Builds an object from flat `key=value` pairs. Keys may address nested
    /// values with dots or brackets (`user.name`, `user[name]`, `tags[0]`).
    /// A key seen more than once becomes an array.
    pub fn from_pairs<K, V>(name: impl Into<String>, pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: AsRef<str>,
        V: Into<String>,
    {
        let name = name.into();
        let mut fields = Vec::new();
        for (key, value) in pairs {
            let path = key_path(key.as_ref());
            if !path.is_empty() {
                put(&mut fields, &name, &path, value.into());
            }
        }
        Self::Object { name, fields }
    }

    /// Parses an `application/x-www-form-urlencoded` string (a query string
    /// without the leading `?`).
    pub fn from_query(query: &str) -> Self {
        Self::from_pairs("", url::form_urlencoded::parse(query.as_bytes()))
    }

    /// Converts a JSON document. `null` becomes `Missing`; scalars become
    /// `Single` holding their JSON text (strings without quotes).
    pub fn from_json(name: impl Into<String>, json: &serde_json::Value) -> Self {
        let name = name.into();
        match json {
            serde_json::Value::Null => Self::Missing { name },
            serde_json::Value::String(s) => Self::Single { name, value: s.clone() },
            serde_json::Value::Bool(_) | serde_json::Value::Number(_) => {
                Self::Single { name, value: json.to_string() }
            }
            serde_json::Value::Array(items) => Self::Array {
                items: items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| Value::from_json(index_name(&name, i), item))
                    .collect(),
                name,
            },
            serde_json::Value::Object(map) => Self::Object {
                fields: map
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::from_json(child_name(&name, k), v)))
                    .collect(),
                name,
            },
        }
    }
}

// ── Navigation ───────────────────────────────────────────────────────────────

impl Value {
    pub fn name(&self) -> &str {
        match self {
            Self::Missing { name }
            | Self::Single { name, .. }
            | Self::Array { name, .. }
            | Self::Object { name, .. } => name,
            Self::Upload(file) => &file.name,
        }
    }

    /// Looks up a child by key. Arrays accept numeric keys. Anything not found
    /// comes back as `Missing`, named after the full path, so chained lookups
    /// never fail until a leaf is read.
    pub fn get(&self, key: &str) -> Cow<'_, Value> {
        match self {
            Self::Object { name, fields } => fields
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| Cow::Borrowed(v))
                .unwrap_or_else(|| Cow::Owned(Value::missing(child_name(name, key)))),
            Self::Array { .. } | Self::Single { .. } | Self::Upload(_) => match key.parse::<usize>() {
                Ok(index) => self.get_index(index),
                Err(_) => Cow::Owned(Value::missing(child_name(self.name(), key))),
            },
            Self::Missing { name } => Cow::Owned(Value::missing(child_name(name, key))),
        }
    }

    /// Looks up a dotted or bracketed path (`user.name`, `tags[0]`). A key
    /// stored verbatim under that name wins over the nested walk.
    pub fn path(&self, path: &str) -> Value {
        let exact = self.get(path);
        if exact.is_present() {
            return exact.into_owned();
        }
        let segments = key_path(path);
        let Some((first, rest)) = segments.split_first() else {
            return exact.into_owned();
        };
        let mut current = self.get(first).into_owned();
        for segment in rest {
            current = current.get(segment).into_owned();
        }
        current
    }

    /// Positional lookup. A single value (or upload) answers to index 0.
    pub fn get_index(&self, index: usize) -> Cow<'_, Value> {
        match self {
            Self::Array { name, items } => items
                .get(index)
                .map(Cow::Borrowed)
                .unwrap_or_else(|| Cow::Owned(Value::missing(index_name(name, index)))),
            Self::Single { .. } | Self::Upload(_) if index == 0 => Cow::Borrowed(self),
            Self::Object { .. } => self.get(&index.to_string()),
            _ => Cow::Owned(Value::missing(index_name(self.name(), index))),
        }
    }

    pub fn size(&self) -> usize {
        match self {
            Self::Missing { .. } => 0,
            Self::Single { .. } | Self::Upload(_) => 1,
            Self::Array { items, .. } => items.len(),
            Self::Object { fields, .. } => fields.len(),
        }
    }

    pub fn is_missing(&self) -> bool { matches!(self, Self::Missing { .. }) }
    pub fn is_present(&self) -> bool { !self.is_missing() }
    pub fn is_single(&self) -> bool { matches!(self, Self::Single { .. }) }
    pub fn is_array(&self) -> bool { matches!(self, Self::Array { .. }) }
    pub fn is_object(&self) -> bool { matches!(self, Self::Object { .. }) }
    pub fn is_upload(&self) -> bool { matches!(self, Self::Upload(_)) }

    pub fn as_upload(&self) -> Option<&FileUpload> {
        match self {
            Self::Upload(file) => Some(file),
            _ => None,
        }
    }
}

// ── Coercion ─────────────────────────────────────────────────────────────────

impl Value {
    /// The raw string. Arrays answer with their first item, uploads with their
    /// file name; objects have no string form.
    pub fn value(&self) -> Result<&str> {
        match self {
            Self::Single { value, .. } => Ok(value),
            Self::Missing { name } => Err(Error::missing(name.as_str())),
            Self::Array { name, items } => match items.first() {
                Some(first) => first.value(),
                None => Err(Error::missing(name.as_str())),
            },
            Self::Object { name, .. } => Err(Error::type_mismatch(name.as_str(), "String")),
            Self::Upload(file) => Ok(&file.filename),
        }
    }

    /// Like [`value`](Value::value), but `default` stands in for a missing value.
    pub fn value_or<'a>(&'a self, default: &'a str) -> Result<&'a str> {
        or_default(self.value(), default)
    }

    pub fn int_value(&self) -> Result<i32> {
        self.parse("int")
    }

    pub fn int_value_or(&self, default: i32) -> Result<i32> {
        or_default(self.int_value(), default)
    }

    /// Parses a base-10 integer, falling back to an RFC 1123 HTTP date
    /// (`Sun, 06 Nov 1994 08:49:37 GMT`) read as epoch milliseconds.
    pub fn long_value(&self) -> Result<i64> {
        let raw = self.value()?;
        if let Ok(n) = raw.parse::<i64>() {
            return Ok(n);
        }
        DateTime::parse_from_rfc2822(raw)
            .map(|date| date.timestamp_millis())
            .map_err(|_| Error::type_mismatch(self.name(), "long"))
    }

    pub fn long_value_or(&self, default: i64) -> Result<i64> {
        or_default(self.long_value(), default)
    }

    pub fn float_value(&self) -> Result<f32> {
        self.parse("float")
    }

    pub fn float_value_or(&self, default: f32) -> Result<f32> {
        or_default(self.float_value(), default)
    }

    pub fn double_value(&self) -> Result<f64> {
        self.parse("double")
    }

    pub fn double_value_or(&self, default: f64) -> Result<f64> {
        or_default(self.double_value(), default)
    }

    pub fn byte_value(&self) -> Result<i8> {
        self.parse("byte")
    }

    pub fn byte_value_or(&self, default: i8) -> Result<i8> {
        or_default(self.byte_value(), default)
    }

    /// `true` or `false`, ignoring ASCII case. Anything else is a mismatch.
    pub fn boolean_value(&self) -> Result<bool> {
        let raw = self.value()?;
        if raw.eq_ignore_ascii_case("true") {
            Ok(true)
        } else if raw.eq_ignore_ascii_case("false") {
            Ok(false)
        } else {
            Err(Error::type_mismatch(self.name(), "boolean"))
        }
    }

    pub fn boolean_value_or(&self, default: bool) -> Result<bool> {
        or_default(self.boolean_value(), default)
    }

    /// Converts through any [`FromStr`] type.
    pub fn to<T: FromStr>(&self) -> Result<T> {
        self.parse(std::any::type_name::<T>())
    }

    pub fn to_optional(&self) -> Option<String> {
        self.value().ok().map(str::to_owned)
    }

    /// Every leaf string, in order. Missing and object values give an empty list.
    pub fn to_list(&self) -> Vec<String> {
        match self {
            Self::Missing { .. } | Self::Object { .. } => Vec::new(),
            Self::Single { value, .. } => vec![value.clone()],
            Self::Upload(file) => vec![file.filename.clone()],
            Self::Array { items, .. } => items.iter().flat_map(Value::to_list).collect(),
        }
    }

    /// Flattens into `(path, values)` pairs, using dotted paths for nested
    /// objects. Order follows insertion.
    pub fn to_multimap(&self) -> Vec<(String, Vec<String>)> {
        let mut out = Vec::new();
        self.flatten("", &mut out);
        out
    }

    fn flatten(&self, prefix: &str, out: &mut Vec<(String, Vec<String>)>) {
        match self {
            Self::Object { fields, .. } => {
                for (key, value) in fields {
                    value.flatten(&child_name(prefix, key), out);
                }
            }
            Self::Missing { .. } => {}
            other => {
                let key = if prefix.is_empty() { other.name() } else { prefix };
                out.push((key.to_owned(), other.to_list()));
            }
        }
    }

    fn parse<T: FromStr>(&self, target: &'static str) -> Result<T> {
        self.value()?
            .parse::<T>()
            .map_err(|_| Error::type_mismatch(self.name(), target))
    }
}

fn or_default<T>(result: Result<T>, default: T) -> Result<T> {
    match result {
        Err(Error::Missing { .. }) => Ok(default),
        other => other,
    }
}

// ── Template resolution ──────────────────────────────────────────────────────

impl Value {
    /// Replaces every `${path}` in `expression` with the value found at
    /// `path` (dot-separated). Fails on a missing reference.
    pub fn resolve(&self, expression: &str) -> Result<String> {
        self.resolve_with(expression, false, DEFAULT_START_DELIMITER, DEFAULT_END_DELIMITER)
    }

    /// Template resolution with explicit delimiters.
    ///
    /// Empty delimiters are rejected with [`Error::MalformedExpression`].
    /// With `ignore_missing`, unresolved references are copied to the output
    /// untouched. Otherwise they fail with [`Error::MissingReference`]. An
    /// opening delimiter without a closing one fails with
    /// [`Error::MalformedExpression`]. Both errors report `line:column` of the
    /// opening delimiter.
    pub fn resolve_with(
        &self,
        expression: &str,
        ignore_missing: bool,
        start_delim: &str,
        end_delim: &str,
    ) -> Result<String> {
        if start_delim.is_empty() || end_delim.is_empty() {
            return Err(Error::MalformedExpression {
                start: start_delim.to_owned(),
                end: end_delim.to_owned(),
                line: 1,
                column: 1,
            });
        }
        if expression.is_empty() {
            return Ok(String::new());
        }
        let mut buffer = String::with_capacity(expression.len());
        let mut offset = 0;

        while let Some(found) = expression[offset..].find(start_delim) {
            let start = offset + found;
            let key_start = start + start_delim.len();
            let Some(key_len) = expression[key_start..].find(end_delim) else {
                let (line, column) = position(expression, start);
                return Err(Error::MalformedExpression {
                    start: start_delim.to_owned(),
                    end: end_delim.to_owned(),
                    line,
                    column,
                });
            };
            let end = key_start + key_len;
            let key = &expression[key_start..end];

            buffer.push_str(&expression[offset..start]);
            match self.lookup(key) {
                Ok(value) => buffer.push_str(&value),
                Err(Error::Missing { .. }) if ignore_missing => {
                    buffer.push_str(&expression[start..end + end_delim.len()]);
                }
                Err(Error::Missing { .. }) => {
                    let (line, column) = position(expression, start);
                    return Err(Error::MissingReference {
                        reference: format!("{start_delim}{key}{end_delim}"),
                        line,
                        column,
                    });
                }
                Err(err) => return Err(err),
            }
            offset = end + end_delim.len();
        }

        buffer.push_str(&expression[offset..]);
        Ok(buffer)
    }

    fn lookup(&self, key: &str) -> Result<String> {
        let mut segments = key.split('.');
        let first = segments.next().unwrap_or_default();
        let mut current = self.get(first);
        for segment in segments {
            current = Cow::Owned(current.get(segment).into_owned());
        }
        current.value().map(str::to_owned)
    }
}

/// `line` counts newlines before `offset` (at least 1); `column` is the
/// distance from the last newline before `offset`.
fn position(expression: &str, offset: usize) -> (usize, usize) {
    let snapshot = &expression[..offset];
    let line = snapshot.matches('\n').count().max(1);
    let chars = snapshot.chars().count();
    let column = match snapshot.rfind('\n') {
        Some(newline) => chars - snapshot[..newline].chars().count(),
        None => chars + 1,
    };
    (line, column)
}

// ── Key paths ────────────────────────────────────────────────────────────────

fn child_name(parent: &str, key: &str) -> String {
    if parent.is_empty() {
        key.to_owned()
    } else {
        format!("{parent}.{key}")
    }
}

fn index_name(parent: &str, index: usize) -> String {
    format!("{parent}[{index}]")
}

/// `a.b[c][0]` → `["a", "b", "c", "0"]`. Empty segments (`tags[]`) vanish.
fn key_path(key: &str) -> Vec<&str> {
    key.split(['.', '[', ']']).filter(|s| !s.is_empty()).collect()
}

fn put(fields: &mut Vec<(String, Value)>, parent: &str, path: &[&str], value: String) {
    let Some((head, rest)) = path.split_first() else { return };
    let name = child_name(parent, head);
    let existing = fields.iter().position(|(k, _)| k == head);

    if rest.is_empty() {
        match existing {
            Some(i) => append(&mut fields[i].1, name, value),
            None => fields.push(((*head).to_owned(), Value::Single { name, value })),
        }
        return;
    }

    let i = existing.unwrap_or_else(|| {
        fields.push(((*head).to_owned(), Value::Object { name: name.clone(), fields: Vec::new() }));
        fields.len() - 1
    });
    let slot = &mut fields[i].1;
    if !slot.is_object() {
        *slot = Value::Object { name, fields: Vec::new() };
    }
    if let Value::Object { name, fields } = slot {
        put(fields, name, rest, value);
    }
}

fn append(slot: &mut Value, name: String, value: String) {
    match slot {
        Value::Single { .. } => {
            let first = std::mem::replace(slot, Value::missing(""));
            *slot = Value::Array {
                items: vec![first, Value::single(name.clone(), value)],
                name,
            };
        }
        Value::Array { items, .. } => items.push(Value::single(name, value)),
        _ => *slot = Value::Single { name, value },
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing { .. } => f.write_str("<missing>"),
            Self::Single { value, .. } => f.write_str(value),
            Self::Upload(file) => f.write_str(&file.filename),
            Self::Array { items, .. } => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Self::Object { fields, .. } => {
                f.write_str("{")?;
                for (i, (key, value)) in fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{key}={value}")?;
                }
                f.write_str("}")
            }
        }
    }
}
