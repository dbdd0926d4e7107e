//! Encoding of driver values into Tcl source text, and remote references
//! to values kept inside the Tcl child.
//!
//! A Tcl return value is just a string. Without knowing its structure the
//! driver cannot turn it into anything richer, so results are wrapped in
//! [`TclRef`] handles. Passing a handle back as an argument makes the
//! child substitute its own stored value (`$cmd_results(<idx>)`) instead
//! of a re-encoded string; some Tcl-based tools rely on the internal
//! representation of such opaque handles staying identical across round
//! trips.

use std::fmt;
use std::num::{ParseFloatError, ParseIntError};

/// A driver-side value that can be rendered as a Tcl argument.
///
/// Sequences and mappings keep their insertion order; a mapping is
/// flattened to `key value key value ...` the way Tcl dicts are written.
#[derive(Debug, Clone, PartialEq)]
pub enum TclValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    List(Vec<TclValue>),
    Dict(Vec<(TclValue, TclValue)>),
    /// Reference to the child-side result table; see [`TclRef`].
    Ref { cmd_idx: u64, value: String },
}

impl TclValue {
    /// Builds an ordered mapping from key/value pairs.
    pub fn dict<K, V, I>(pairs: I) -> Self
    where
        K: Into<TclValue>,
        V: Into<TclValue>,
        I: IntoIterator<Item = (K, V)>,
    {
        TclValue::Dict(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Renders the value as a single brace-quoted Tcl word.
    ///
    /// A [`TclValue::Ref`] at the top level becomes a `$cmd_results(<idx>)`
    /// substitution so the child resolves it by identity. Nested inside a
    /// sequence or mapping the same reference degrades to its string
    /// value, because braces would quote the dollar sign literally there.
    pub fn encode(&self) -> String {
        self.encode_nested(false)
    }

    fn encode_nested(&self, nested: bool) -> String {
        match self {
            TclValue::Str(s) => braced(s),
            TclValue::Int(i) => braced(&i.to_string()),
            TclValue::Float(f) => braced(&f.to_string()),
            TclValue::Bool(b) => braced(if *b { "1" } else { "0" }),
            TclValue::List(items) => {
                let words: Vec<String> =
                    items.iter().map(|item| item.encode_nested(true)).collect();
                format!("{{{}}}", words.join(" "))
            }
            TclValue::Dict(pairs) => {
                let mut words = Vec::with_capacity(pairs.len() * 2);
                for (key, value) in pairs {
                    words.push(key.encode_nested(true));
                    words.push(value.encode_nested(true));
                }
                format!("{{{}}}", words.join(" "))
            }
            TclValue::Ref { cmd_idx, value } => {
                if nested {
                    braced(value)
                } else {
                    format!("$cmd_results({})", cmd_idx)
                }
            }
        }
    }
}

/// Builds a `[TclValue; N]` argument array from mixed expressions.
///
/// ```
/// use notcl::{tcl_args, TclValue};
///
/// let args = tcl_args![9, "+", 3];
/// assert_eq!(args[0], TclValue::Int(9));
/// ```
#[macro_export]
macro_rules! tcl_args {
    ($($arg:expr),* $(,)?) => {
        [$($crate::TclValue::from($arg)),*]
    };
}

fn braced(data: &str) -> String {
    format!("{{{}}}", escape_braces(data))
}

/// Prefixes every brace with a backslash so arbitrary text survives Tcl's
/// `{ }` grouping.
pub fn escape_braces(data: &str) -> String {
    let mut out = String::with_capacity(data.len());
    for c in data.chars() {
        if c == '{' || c == '}' {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

impl From<&str> for TclValue {
    fn from(s: &str) -> Self {
        TclValue::Str(s.to_owned())
    }
}

impl From<String> for TclValue {
    fn from(s: String) -> Self {
        TclValue::Str(s)
    }
}

impl From<i32> for TclValue {
    fn from(i: i32) -> Self {
        TclValue::Int(i as i64)
    }
}

impl From<i64> for TclValue {
    fn from(i: i64) -> Self {
        TclValue::Int(i)
    }
}

impl From<f64> for TclValue {
    fn from(f: f64) -> Self {
        TclValue::Float(f)
    }
}

impl From<bool> for TclValue {
    fn from(b: bool) -> Self {
        TclValue::Bool(b)
    }
}

impl<T: Into<TclValue>> From<Vec<T>> for TclValue {
    fn from(items: Vec<T>) -> Self {
        TclValue::List(items.into_iter().map(Into::into).collect())
    }
}

impl From<&TclRef> for TclValue {
    fn from(r: &TclRef) -> Self {
        TclValue::Ref {
            cmd_idx: r.cmd_idx(),
            value: r.value().to_owned(),
        }
    }
}

impl From<TclRef> for TclValue {
    fn from(r: TclRef) -> Self {
        TclValue::from(&r)
    }
}

/// A reference to a return value kept in the Tcl child's `cmd_results`
/// side table.
///
/// Two handles with the same `cmd_idx` within one session name the same
/// child-side value. Handles stay valid for the lifetime of the session;
/// the driver never evicts table entries.
#[derive(Debug, Clone)]
pub struct TclRef {
    cmd_idx: u64,
    value: String,
    cmd: String,
}

impl TclRef {
    pub(crate) fn new(cmd_idx: u64, value: String, cmd: String) -> Self {
        Self {
            cmd_idx,
            value,
            cmd,
        }
    }

    /// Index of the value in the child's result table.
    pub fn cmd_idx(&self) -> u64 {
        self.cmd_idx
    }

    /// The string form of the value.
    pub fn value(&self) -> &str {
        &self.value
    }

    /// The Tcl source the value originated from. Diagnostics only.
    pub fn cmd(&self) -> &str {
        &self.cmd
    }

    /// A Tcl substitution naming the child-side value by identity,
    /// e.g. `$cmd_results(123)`.
    pub fn ref_str(&self) -> String {
        format!("$cmd_results({})", self.cmd_idx)
    }

    pub fn to_i64(&self) -> Result<i64, ParseIntError> {
        self.value.parse()
    }

    pub fn to_f64(&self) -> Result<f64, ParseFloatError> {
        self.value.parse()
    }
}

impl fmt::Display for TclRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}
