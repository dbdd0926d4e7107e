//! Framed messages exchanged with the Tcl child.
//!
//! A message is a flat list of key/value pairs. On the wire it is encoded
//! as `KEY\nBASE64(VALUE)\n...` with no trailing newline; the frame ends
//! when the writer closes the pipe. Values are base64 so that arbitrary
//! Tcl results (embedded newlines included) survive the line-oriented
//! framing.

use crate::error::{Error, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

/// An ordered key/value mapping, the raw form of every message.
///
/// Keys may only contain `a-z`, `A-Z` and underscores. Insertion order is
/// kept across a decode/re-encode round trip but carries no meaning.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawMessage {
    items: Vec<(String, String)>,
}

impl RawMessage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `key` to `value`, replacing an earlier entry in place.
    pub fn insert<K: Into<String>, V: Into<String>>(&mut self, key: K, value: V) {
        let key = key.into();
        let value = value.into();
        match self.items.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.items.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.items
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// The message tag carried under the reserved `class` key.
    pub fn class(&self) -> Option<&str> {
        self.get("class")
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.items.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Encodes the message into one wire frame.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut frame = Vec::new();
        for (i, (key, value)) in self.items.iter().enumerate() {
            if !valid_key(key) {
                return Err(Error::InvalidKey(key.clone()));
            }
            if i > 0 {
                frame.push(b'\n');
            }
            frame.extend_from_slice(key.as_bytes());
            frame.push(b'\n');
            frame.extend_from_slice(BASE64.encode(value.as_bytes()).as_bytes());
        }
        Ok(frame)
    }

    /// Decodes one wire frame, read until EOF.
    pub fn decode(data: &[u8]) -> Result<RawMessage> {
        let tokens: Vec<&[u8]> = data.split(|&b| b == b'\n').collect();
        if tokens.len() % 2 != 0 {
            return Err(Error::MalformedFrame(format!(
                "frame requires an even number of tokens (key value pairs), got {}",
                tokens.len()
            )));
        }

        let mut msg = RawMessage::new();
        for pair in tokens.chunks_exact(2) {
            let key = match std::str::from_utf8(pair[0]) {
                Ok(key) if key.is_ascii() => key,
                _ => return Err(Error::MalformedFrame("key is not ascii".into())),
            };
            let value = BASE64
                .decode(pair[1])
                .map_err(|err| Error::MalformedFrame(format!("bad base64 value: {}", err)))?;
            let value = String::from_utf8(value)
                .map_err(|_| Error::MalformedFrame("value is not valid utf-8".into()))?;
            msg.insert(key, value);
        }
        Ok(msg)
    }

    /// Interprets the raw message as a typed one.
    pub fn into_message<M: Message>(self) -> Result<M> {
        M::from_raw(self)
    }
}

fn valid_key(key: &str) -> bool {
    !key.is_empty() && key.bytes().all(|b| b.is_ascii_alphabetic() || b == b'_')
}

/// A typed view over a [`RawMessage`] with a fixed tag and required keys.
///
/// Extra keys are ignored but kept, so a decode/re-encode round trip is
/// lossless.
pub trait Message: Sized {
    /// Value of the `class` key identifying this message on the wire.
    const CLASS: &'static str;

    /// Builds the typed message, failing with
    /// [`Error::WrongMessageClass`] when the tag differs or a required
    /// key is absent.
    fn from_raw(raw: RawMessage) -> Result<Self>;

    fn to_raw(&self) -> RawMessage;
}

macro_rules! message_class {
    ($(#[$attr:meta])* $name:ident { $($field:ident),+ $(,)? }) => {
        $(#[$attr])*
        #[derive(Debug, Clone, PartialEq, Eq)]
        pub struct $name {
            raw: RawMessage,
        }

        impl $name {
            pub fn new($($field: &str),+) -> Self {
                let mut raw = RawMessage::new();
                raw.insert("class", stringify!($name));
                $(raw.insert(stringify!($field), $field);)+
                Self { raw }
            }

            $(
                pub fn $field(&self) -> &str {
                    self.raw
                        .get(stringify!($field))
                        .expect("required key is checked on construction")
                }
            )+
        }

        impl Message for $name {
            const CLASS: &'static str = stringify!($name);

            fn from_raw(raw: RawMessage) -> Result<Self> {
                if raw.class() != Some(Self::CLASS) {
                    return Err(Error::WrongMessageClass(format!(
                        "expected class {}, got {:?}",
                        Self::CLASS,
                        raw.class()
                    )));
                }
                $(
                    if raw.get(stringify!($field)).is_none() {
                        return Err(Error::WrongMessageClass(format!(
                            "{} frame lacks required key '{}'",
                            Self::CLASS,
                            stringify!($field)
                        )));
                    }
                )+
                Ok(Self { raw })
            }

            fn to_raw(&self) -> RawMessage {
                self.raw.clone()
            }
        }
    };
}

message_class!(
    /// Sent by the child exactly once after startup.
    TclHello {
        patchlevel,
        commands,
        globals,
        nameofexecutable,
    }
);

message_class!(
    /// A Tcl source string the driver wants evaluated.
    PyProcedureCall { command }
);

message_class!(
    /// The child's response to the preceding [`PyProcedureCall`].
    ///
    /// `err_code` is `"0"` on success; `cmd_idx` names the slot of the
    /// `cmd_results` side table holding the return value.
    TclProcedureResult {
        err_code,
        result,
        cmd_idx,
    }
);

message_class!(
    /// Shutdown request: `quit="1"` terminates the child, `quit="0"`
    /// hands it over to interactive use.
    PyExit { quit }
);

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> RawMessage {
        let mut msg = RawMessage::new();
        msg.insert("class", "PyProcedureCall");
        msg.insert("command", "puts {Guten Tag}");
        msg
    }

    #[test]
    fn roundtrip() {
        let msg = sample();
        let decoded = RawMessage::decode(&msg.encode().unwrap()).unwrap();
        assert_eq!(msg, decoded);
    }

    #[test]
    fn roundtrip_keeps_order_and_special_chars() {
        let mut msg = RawMessage::new();
        msg.insert("class", "TclProcedureResult");
        msg.insert("result", "line one\nline {two}\tümlaut");
        msg.insert("err_code", "0");
        msg.insert("cmd_idx", "7");

        let decoded = RawMessage::decode(&msg.encode().unwrap()).unwrap();
        assert_eq!(msg, decoded);
        let keys: Vec<&str> = decoded.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, ["class", "result", "err_code", "cmd_idx"]);
    }

    #[test]
    fn no_trailing_newline() {
        let frame = sample().encode().unwrap();
        assert_ne!(frame.last(), Some(&b'\n'));
    }

    #[test]
    fn insert_replaces_in_place() {
        let mut msg = RawMessage::new();
        msg.insert("a", "1");
        msg.insert("b", "2");
        msg.insert("a", "3");
        assert_eq!(msg.get("a"), Some("3"));
        assert_eq!(msg.len(), 2);
    }

    #[test]
    fn odd_token_count_is_malformed() {
        let err = RawMessage::decode(b"class").unwrap_err();
        assert!(matches!(err, Error::MalformedFrame(_)));

        // An empty stream splits into a single empty token.
        let err = RawMessage::decode(b"").unwrap_err();
        assert!(matches!(err, Error::MalformedFrame(_)));
    }

    #[test]
    fn bad_base64_is_malformed() {
        let err = RawMessage::decode(b"class\n!!!not-base64!!!").unwrap_err();
        assert!(matches!(err, Error::MalformedFrame(_)));
    }

    #[test]
    fn invalid_keys_rejected_on_encode() {
        for key in &["", "with space", "dash-ed", "digits123", "plus+"] {
            let mut msg = RawMessage::new();
            msg.insert(*key, "value");
            let err = msg.encode().unwrap_err();
            assert!(matches!(err, Error::InvalidKey(_)), "key {:?}", key);
        }

        let mut msg = RawMessage::new();
        msg.insert("Underscored_Key", "value");
        assert!(msg.encode().is_ok());
    }

    #[test]
    fn typed_message_accessors() {
        let call = PyProcedureCall::new("expr 1 + 1");
        assert_eq!(call.command(), "expr 1 + 1");
        assert_eq!(call.to_raw().class(), Some("PyProcedureCall"));
    }

    #[test]
    fn wrong_class_is_rejected() {
        let raw = PyExit::new("1").to_raw();
        let err = raw.into_message::<PyProcedureCall>().unwrap_err();
        assert!(matches!(err, Error::WrongMessageClass(_)));
    }

    #[test]
    fn missing_required_key_is_rejected() {
        let mut raw = RawMessage::new();
        raw.insert("class", "TclProcedureResult");
        raw.insert("err_code", "0");
        let err = raw.into_message::<TclProcedureResult>().unwrap_err();
        assert!(matches!(err, Error::WrongMessageClass(_)));
    }

    #[test]
    fn extra_keys_survive_roundtrip() {
        let mut raw = PyExit::new("0").to_raw();
        raw.insert("annotation", "kept");

        let exit = raw.clone().into_message::<PyExit>().unwrap();
        assert_eq!(exit.quit(), "0");
        assert_eq!(exit.to_raw(), raw);

        let rewired = RawMessage::decode(&exit.to_raw().encode().unwrap()).unwrap();
        assert_eq!(rewired.get("annotation"), Some("kept"));
    }
}
