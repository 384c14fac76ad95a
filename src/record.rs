use crate::CuboidError;
use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};
use std::fmt;

/// On-disk shape of a run. Every record in one run file uses the same layout.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordLayout {
    /// Two edges and their hypotenuse: A, B, G (24 bytes).
    #[default]
    Pair,
    /// Three edges and the space diagonal: A, B, C, G (32 bytes).
    Quadruple,
}

impl RecordLayout {
    pub const fn record_size(self) -> usize {
        match self {
            RecordLayout::Pair => 24,
            RecordLayout::Quadruple => 32,
        }
    }

    pub const fn extension(self) -> &'static str {
        match self {
            RecordLayout::Pair => "nptf",
            RecordLayout::Quadruple => "npt4",
        }
    }
}

impl fmt::Display for RecordLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordLayout::Pair => write!(f, "pair"),
            RecordLayout::Quadruple => write!(f, "quadruple"),
        }
    }
}

/// A candidate record.
///
/// Field order is the sort order: G first, then A, B, C. Edges are canonicalized
/// to ascending order on construction, so the same triple found from different
/// (m, n, k) compares and serializes identically. Pair records carry `c == 0`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Record {
    g: u64,
    a: u64,
    b: u64,
    c: u64,
}

impl Record {
    pub fn pair(x: u64, y: u64, g: u64) -> Self {
        let (a, b) = if x <= y { (x, y) } else { (y, x) };
        Record { g, a, b, c: 0 }
    }

    pub fn quadruple(x: u64, y: u64, z: u64, g: u64) -> Self {
        let mut edges = [x, y, z];
        edges.sort_unstable();
        Record {
            g,
            a: edges[0],
            b: edges[1],
            c: edges[2],
        }
    }

    pub fn g(&self) -> u64 {
        self.g
    }

    pub fn a(&self) -> u64 {
        self.a
    }

    pub fn b(&self) -> u64 {
        self.b
    }

    pub fn c(&self) -> u64 {
        self.c
    }

    /// Shorter leg of a pair record.
    pub fn short_edge(&self) -> u64 {
        self.a
    }

    /// Longer leg of a pair record.
    pub fn long_edge(&self) -> u64 {
        self.b
    }

    pub fn is_quadruple(&self) -> bool {
        self.c != 0
    }

    /// Encodes into the front of `buf`, returning the number of bytes written.
    pub fn encode_into(&self, layout: RecordLayout, buf: &mut [u8]) -> Result<usize, CuboidError> {
        let written = match layout {
            RecordLayout::Pair => {
                if self.c != 0 {
                    return Err(CuboidError::Other(format!(
                        "record {} has three edges and cannot use the pair layout",
                        self
                    )));
                }
                let wire = PairWire {
                    a: self.a,
                    b: self.b,
                    g: self.g,
                };
                bincode::encode_into_slice(wire, buf, wire_config())?
            }
            RecordLayout::Quadruple => {
                let wire = QuadrupleWire {
                    a: self.a,
                    b: self.b,
                    c: self.c,
                    g: self.g,
                };
                bincode::encode_into_slice(wire, buf, wire_config())?
            }
        };
        debug_assert_eq!(written, layout.record_size());
        Ok(written)
    }

    pub fn encode(&self, layout: RecordLayout) -> Result<Vec<u8>, CuboidError> {
        let mut buf = vec![0u8; layout.record_size()];
        self.encode_into(layout, &mut buf)?;
        Ok(buf)
    }

    /// Decodes one record from exactly `layout.record_size()` leading bytes.
    pub fn decode(layout: RecordLayout, bytes: &[u8]) -> Result<Self, CuboidError> {
        match layout {
            RecordLayout::Pair => {
                let (wire, _): (PairWire, usize) =
                    bincode::decode_from_slice(bytes, wire_config())?;
                Ok(Record {
                    g: wire.g,
                    a: wire.a,
                    b: wire.b,
                    c: 0,
                })
            }
            RecordLayout::Quadruple => {
                let (wire, _): (QuadrupleWire, usize) =
                    bincode::decode_from_slice(bytes, wire_config())?;
                Ok(Record {
                    g: wire.g,
                    a: wire.a,
                    b: wire.b,
                    c: wire.c,
                })
            }
        }
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.c > 0 {
            write!(f, "{}^2 + {}^2 + {}^2 = {}^2", self.a, self.b, self.c, self.g)
        } else {
            write!(f, "{}^2 + {}^2 = {}^2", self.a, self.b, self.g)
        }
    }
}

// Wire order is A, B, [C,] G regardless of sort order.
#[derive(Encode, Decode)]
struct PairWire {
    a: u64,
    b: u64,
    g: u64,
}

#[derive(Encode, Decode)]
struct QuadrupleWire {
    a: u64,
    b: u64,
    c: u64,
    g: u64,
}

fn wire_config() -> impl bincode::config::Config {
    bincode::config::standard()
        .with_little_endian()
        .with_fixed_int_encoding()
}
