//! Raw backend commands that bypass the typed key/value API.

use crate::error::{BridgeError, Result};

/// Scope of a structured command, as the REST control plane numbers it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandScope {
    Database = 1,
    Document = 2,
}

impl TryFrom<u32> for CommandScope {
    type Error = BridgeError;

    fn try_from(value: u32) -> Result<Self> {
        match value {
            1 => Ok(CommandScope::Database),
            2 => Ok(CommandScope::Document),
            other => Err(BridgeError::Command(format!("unknown command type {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpVerb {
    Get,
    Put,
    Post,
    Delete,
    Copy,
    Head,
}

impl std::str::FromStr for HttpVerb {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GET" => Ok(HttpVerb::Get),
            "PUT" => Ok(HttpVerb::Put),
            "POST" => Ok(HttpVerb::Post),
            "DELETE" => Ok(HttpVerb::Delete),
            "COPY" => Ok(HttpVerb::Copy),
            "HEAD" => Ok(HttpVerb::Head),
            other => Err(BridgeError::Command(format!("unsupported HTTP verb '{other}'"))),
        }
    }
}

/// HTTP-shaped request against a backend's REST control plane.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpCommand {
    pub scope: CommandScope,
    pub verb: HttpVerb,
    pub base_url: String,
    pub endpoint: String,
    pub query_params: String,
    pub body: String,
}

impl HttpCommand {
    /// Build a request from the raw scope number and verb name.
    pub fn from_raw(
        command_type: u32,
        verb: &str,
        base_url: &str,
        endpoint: &str,
        query_params: &str,
        body: &str,
    ) -> Result<Self> {
        Ok(Self {
            scope: CommandScope::try_from(command_type)?,
            verb: verb.parse()?,
            base_url: base_url.to_string(),
            endpoint: endpoint.to_string(),
            query_params: query_params.to_string(),
            body: body.to_string(),
        })
    }
}

/// One passthrough request, in any of its three shapes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Fire-and-forget administrative statement.
    Text(String),
    /// Two-way request/response exchange returning a JSON document.
    Http(HttpCommand),
    /// Pre-serialized argument list, forwarded unparsed. See [`ArgList`].
    Args(Vec<u8>),
}

impl Command {
    pub fn kind(&self) -> &'static str {
        match self {
            Command::Text(_) => "text",
            Command::Http(_) => "http",
            Command::Args(_) => "args",
        }
    }
}

/// Length-prefixed argument list: each argument is a little-endian `u32`
/// byte count followed by that many bytes.
pub struct ArgList;

impl ArgList {
    pub fn encode<A: AsRef<[u8]>>(args: &[A]) -> Vec<u8> {
        let total = args.iter().map(|a| 4 + a.as_ref().len()).sum();
        let mut out = Vec::with_capacity(total);
        for arg in args {
            let arg = arg.as_ref();
            out.extend_from_slice(&(arg.len() as u32).to_le_bytes());
            out.extend_from_slice(arg);
        }
        out
    }

    pub fn decode(mut bytes: &[u8]) -> Result<Vec<Vec<u8>>> {
        let mut args = Vec::new();
        while !bytes.is_empty() {
            if bytes.len() < 4 {
                return Err(BridgeError::Command("truncated argument length".into()));
            }
            let (len, rest) = bytes.split_at(4);
            let len = u32::from_le_bytes([len[0], len[1], len[2], len[3]]) as usize;
            if rest.len() < len {
                return Err(BridgeError::Command(format!(
                    "argument of {len} bytes overruns the list"
                )));
            }
            let (arg, rest) = rest.split_at(len);
            args.push(arg.to_vec());
            bytes = rest;
        }
        Ok(args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arg_list_keeps_binary_arguments() {
        let args: Vec<&[u8]> = vec![b"MGET", b"a,b", b"", &[0, 255, 10]];
        let encoded = ArgList::encode(&args);
        let decoded = ArgList::decode(&encoded).unwrap();
        assert_eq!(decoded.len(), 4);
        assert_eq!(decoded[1], b"a,b");
        assert!(decoded[2].is_empty());
        assert_eq!(decoded[3], vec![0, 255, 10]);
    }

    #[test]
    fn test_arg_list_rejects_overrun() {
        let mut encoded = ArgList::encode(&[b"GET".as_slice()]);
        encoded[0] = 200;
        assert!(ArgList::decode(&encoded).is_err());
        assert!(ArgList::decode(&[1, 0]).is_err());
    }

    #[test]
    fn test_scope_and_verb_parsing() {
        assert_eq!(CommandScope::try_from(2).unwrap(), CommandScope::Document);
        assert!(CommandScope::try_from(3).is_err());
        assert_eq!("delete".parse::<HttpVerb>().unwrap(), HttpVerb::Delete);
        assert!("PATCH".parse::<HttpVerb>().is_err());
    }

    #[test]
    fn test_http_command_from_raw() {
        let request = HttpCommand::from_raw(1, "get", "http://h", "/stores", "a=1", "{}").unwrap();
        assert_eq!(request.scope, CommandScope::Database);
        assert_eq!(request.verb, HttpVerb::Get);
        assert_eq!(request.endpoint, "/stores");
        assert_eq!(request.body, "{}");

        let err = HttpCommand::from_raw(9, "GET", "", "/", "", "").unwrap_err();
        assert_eq!(err.code(), crate::error::code::RUN_DATA_STORE_COMMAND_ERROR);
    }
}
