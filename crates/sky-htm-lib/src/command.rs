//! Textual lookup commands
//!
//! One command per string, whitespace separated:
//!
//! - `J2000 <depth> <ra> <dec>`: trixel holding an equatorial position (degrees)
//! - `CARTESIAN <depth> <x> <y> <z>`: trixel holding a direction
//! - `NAME <name>`: decode a trixel name
//! - `ID <id>`: decode a packed trixel ID

use crate::trixel::{self, MAX_DEPTH, TrixelId};
use crate::vector::Vector3;
use crate::{HtmError, Result};
use std::fmt;
use std::str::{FromStr, SplitWhitespace};

/// A parsed lookup command
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    J2000 { depth: usize, ra: f64, dec: f64 },
    Cartesian { depth: usize, vector: Vector3 },
    Name(String),
    Id(u64),
}

/// Result of running a [`Command`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lookup {
    pub id: TrixelId,
    pub name: String,
}

impl Command {
    pub fn parse(text: &str) -> Result<Self> {
        let mut tokens = text.split_whitespace();
        let keyword = tokens
            .next()
            .ok_or_else(|| HtmError::InvalidCommand("empty command".to_owned()))?;

        let command = match keyword {
            "J2000" => {
                let depth = parse_depth(&mut tokens)?;
                let [ra, dec] = parse_floats::<2>(&mut tokens, text)?;
                Command::J2000 { depth, ra, dec }
            }
            "CARTESIAN" => {
                let depth = parse_depth(&mut tokens)?;
                let [x, y, z] = parse_floats::<3>(&mut tokens, text)?;
                Command::Cartesian {
                    depth,
                    vector: Vector3::new(x, y, z),
                }
            }
            "NAME" => {
                let name = tokens
                    .next()
                    .ok_or_else(|| HtmError::InvalidCommand(format!("expected name in {text:?}")))?;
                Command::Name(name.to_owned())
            }
            "ID" => {
                let id = tokens
                    .next()
                    .filter(|token| is_integer(token))
                    .and_then(|token| token.parse().ok())
                    .ok_or_else(|| HtmError::InvalidCommand(format!("expected integer ID in {text:?}")))?;
                Command::Id(id)
            }
            other => {
                return Err(HtmError::InvalidCommand(format!("unexpected command {other:?}")));
            }
        };

        if let Some(extra) = tokens.next() {
            return Err(HtmError::InvalidCommand(format!(
                "unexpected trailing {extra:?} in {text:?}"
            )));
        }
        Ok(command)
    }

    /// Resolve the command to a trixel
    pub fn execute(&self) -> Result<Lookup> {
        let id = match self {
            Command::J2000 { depth, ra, dec } => trixel::ra_dec_to_id(*ra, *dec, *depth)?,
            Command::Cartesian { depth, vector } => trixel::vector_to_id(vector, *depth)?,
            Command::Name(name) => trixel::name_to_id(name)?,
            Command::Id(raw) => TrixelId::new(*raw)?,
        };
        tracing::debug!(command = ?self, id = id.get(), "executed lookup");
        Ok(Lookup {
            id,
            name: id.name(),
        })
    }
}

impl FromStr for Command {
    type Err = HtmError;

    fn from_str(s: &str) -> Result<Self> {
        Command::parse(s)
    }
}

impl fmt::Display for Lookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.id.get(), self.name)
    }
}

fn is_integer(token: &str) -> bool {
    !token.is_empty() && token.bytes().all(|b| b == b'+' || b.is_ascii_digit())
}

fn parse_depth(tokens: &mut SplitWhitespace<'_>) -> Result<usize> {
    let token = tokens
        .next()
        .ok_or_else(|| HtmError::InvalidCommand("expected depth".to_owned()))?;
    let depth: usize = token
        .parse()
        .ok()
        .filter(|_| is_integer(token))
        .ok_or_else(|| HtmError::InvalidCommand(format!("expected integer depth, got {token:?}")))?;
    if depth > MAX_DEPTH {
        return Err(HtmError::DepthTooLarge {
            depth,
            max: MAX_DEPTH,
        });
    }
    Ok(depth)
}

fn parse_floats<const N: usize>(tokens: &mut SplitWhitespace<'_>, text: &str) -> Result<[f64; N]> {
    let mut values = [0.0; N];
    for value in &mut values {
        let token = tokens
            .next()
            .ok_or_else(|| HtmError::InvalidCommand(format!("expected vector in {text:?}")))?;
        *value = token
            .parse()
            .map_err(|_| HtmError::InvalidCommand(format!("expected float, got {token:?}")))?;
    }
    Ok(values)
}
