//! Trixel encoding on the Hierarchical Triangular Mesh
//!
//! The mesh starts from the eight faces of an octahedron and splits every spherical
//! triangle into four children at each level. A trixel is identified either by its
//! path name or by a packed 64-bit ID:
//!
//! ```text
//!   name   N  0  1  2  3
//!   bits  11 00 01 10 11      = 795
//! ```
//!
//! The leading bit pair is the sentinel (`11` for the northern, `10` for the southern
//! hemisphere) and every following pair is one child digit, most significant first.
//! The position of the sentinel gives the name length, so decoding needs no extra
//! length field.

use crate::skiplist::Key;
use crate::vector::{EPSILON, Vector3};
use crate::{HtmError, Result};
use std::fmt;
use std::num::NonZeroU64;
use std::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Longest trixel name that still fits in 64 bits
pub const HTM_NAME_MAX: usize = 32;

/// Deepest mesh level that can be encoded
pub const MAX_DEPTH: usize = HTM_NAME_MAX - 2;

/// Three vertices of a spherical triangle, counter-clockwise seen from outside
pub type Triangle = [Vector3; 3];

/// Octahedron vertices
const ANCHORS: [Vector3; 6] = [
    Vector3::new(0.0, 0.0, 1.0),  // 0
    Vector3::new(1.0, 0.0, 0.0),  // 1
    Vector3::new(0.0, 1.0, 0.0),  // 2
    Vector3::new(-1.0, 0.0, 0.0), // 3
    Vector3::new(0.0, -1.0, 0.0), // 4
    Vector3::new(0.0, 0.0, -1.0), // 5
];

/// Anchor indices of the southern roots S0..S3
const S_INDEXES: [[usize; 3]; 4] = [[1, 5, 2], [2, 5, 3], [3, 5, 4], [4, 5, 1]];

/// Anchor indices of the northern roots N0..N3
const N_INDEXES: [[usize; 3]; 4] = [[1, 0, 4], [4, 0, 3], [3, 0, 2], [2, 0, 1]];

/// Root trixel per sign octant `(x > 0) << 2 | (y > 0) << 1 | (z > 0)`,
/// stored as (northern, root digit)
const OCTANT_ROOTS: [(bool, u8); 8] = [
    (false, 2), // S2
    (true, 1),  // N1
    (false, 1), // S1
    (true, 2),  // N2
    (false, 3), // S3
    (true, 0),  // N0
    (false, 0), // S0
    (true, 3),  // N3
];

/// Packed identity of a trixel. Zero is never a valid ID, so it is not representable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "u64", into = "u64"))]
pub struct TrixelId(NonZeroU64);

/// Root triangle containing a direction, as picked by [`starting_triangle`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StartingTriangle {
    pub vertices: Triangle,
    /// Two-character root name, e.g. `"N3"`
    pub name: &'static str,
    pub id: TrixelId,
}

impl TrixelId {
    /// Validate a raw packed ID
    pub fn new(raw: u64) -> Result<Self> {
        name_length(raw).ok_or(HtmError::InvalidId(raw))?;
        NonZeroU64::new(raw)
            .map(TrixelId)
            .ok_or(HtmError::InvalidId(raw))
    }

    /// Raw packed value
    #[inline]
    pub fn get(self) -> u64 {
        self.0.get()
    }

    /// Mesh level (0 for the eight roots). Trusts the ID, no re-validation.
    #[inline]
    pub fn level(self) -> usize {
        (u64::BITS - self.get().leading_zeros()) as usize / 2 - 2
    }

    /// Path name, e.g. `"N0123"`
    pub fn name(self) -> String {
        let raw = self.get();
        let level = self.level();
        let mut name = String::with_capacity(level + 2);
        name.push(if (raw >> (2 * level + 2)) & 1 == 1 { 'N' } else { 'S' });
        for pair in (0..=level).rev() {
            name.push(char::from(b'0' + ((raw >> (2 * pair)) & 3) as u8));
        }
        name
    }

    /// Parent trixel, `None` for a root
    pub fn parent(self) -> Option<TrixelId> {
        if self.level() == 0 {
            return None;
        }
        NonZeroU64::new(self.get() >> 2).map(TrixelId)
    }

    /// The four children, in digit order
    pub fn children(self) -> Result<[TrixelId; 4]> {
        let level = self.level();
        if level >= MAX_DEPTH {
            return Err(HtmError::DepthTooLarge {
                depth: level + 1,
                max: MAX_DEPTH,
            });
        }
        let base = self.get() << 2;
        let child = |digit: u64| {
            NonZeroU64::new(base | digit)
                .map(TrixelId)
                .ok_or(HtmError::InvalidId(base | digit))
        };
        Ok([child(0)?, child(1)?, child(2)?, child(3)?])
    }

    /// Inclusive range of all descendants at `depth`
    pub fn descendant_range(self, depth: usize) -> Result<(TrixelId, TrixelId)> {
        let level = self.level();
        if depth > MAX_DEPTH {
            return Err(HtmError::DepthTooLarge {
                depth,
                max: MAX_DEPTH,
            });
        }
        if depth < level {
            return Err(HtmError::DepthMismatch {
                expected: depth,
                found: level,
            });
        }
        let shift = 2 * (depth - level) as u32;
        let lo = self.get() << shift;
        let hi = lo | ((1u64 << shift) - 1);
        Ok((TrixelId::new(lo)?, TrixelId::new(hi)?))
    }

    /// Signed skip-list key for this ID
    pub fn as_key(self) -> Result<Key> {
        Key::try_from(self.get()).map_err(|_| HtmError::KeyOutOfRange(self.get()))
    }

    /// Recover an ID from a skip-list key
    pub fn from_key(key: Key) -> Result<TrixelId> {
        let raw = u64::try_from(key).map_err(|_| HtmError::InvalidId(key as u64))?;
        TrixelId::new(raw)
    }
}

impl fmt::Display for TrixelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

impl FromStr for TrixelId {
    type Err = HtmError;

    fn from_str(s: &str) -> Result<Self> {
        name_to_id(s)
    }
}

impl TryFrom<u64> for TrixelId {
    type Error = HtmError;

    fn try_from(raw: u64) -> Result<Self> {
        TrixelId::new(raw)
    }
}

impl From<TrixelId> for u64 {
    fn from(id: TrixelId) -> u64 {
        id.get()
    }
}

/// Name length encoded by the sentinel pair, `None` if the ID is malformed
#[inline]
fn name_length(raw: u64) -> Option<usize> {
    let zeros = raw.leading_zeros();
    // The highest set bit must be the high bit of a pair
    if raw == 0 || zeros % 2 == 1 {
        return None;
    }
    let size = ((u64::BITS - zeros) / 2) as usize;
    (size >= 2).then_some(size)
}

/// Encode a trixel name into its packed ID
///
/// The name must start with `N` or `S`, be 2 to 32 characters long and contain only
/// the digits `0`-`3` after the hemisphere.
pub fn name_to_id(name: &str) -> Result<TrixelId> {
    let invalid = |reason| HtmError::InvalidName {
        name: name.to_string(),
        reason,
    };
    let bytes = name.as_bytes();

    let north = match bytes.first() {
        Some(b'N') => true,
        Some(b'S') => false,
        Some(_) => return Err(invalid("hemisphere must be N or S")),
        None => return Err(invalid("too short")),
    };
    let size = bytes.len();
    if size < 2 {
        return Err(invalid("too short"));
    }
    if size > HTM_NAME_MAX {
        return Err(invalid("too long"));
    }

    let mut raw: u64 = 0;
    for (i, &c) in bytes.iter().enumerate().skip(1) {
        if !(b'0'..=b'3').contains(&c) {
            return Err(invalid("digits must be 0-3"));
        }
        raw |= u64::from(c - b'0') << (2 * (size - i - 1));
    }
    raw |= (2 + north as u64) << (2 * size - 2);

    NonZeroU64::new(raw)
        .map(TrixelId)
        .ok_or(HtmError::InvalidId(raw))
}

/// Decode a raw packed ID into its trixel name
pub fn id_to_name(id: u64) -> Result<String> {
    Ok(TrixelId::new(id)?.name())
}

/// Mesh level of a trixel
#[inline]
pub fn id_level(id: TrixelId) -> usize {
    id.level()
}

/// Whether `p` lies inside the counter-clockwise spherical triangle `v1, v2, v3`
///
/// Points within [`EPSILON`] of an edge count as inside. `p` need not be normalized.
#[inline]
pub fn point_in_spherical_triangle(p: &Vector3, v1: &Vector3, v2: &Vector3, v3: &Vector3) -> bool {
    v1.cross(v2).dot(p) >= -EPSILON
        && v2.cross(v3).dot(p) >= -EPSILON
        && v3.cross(v1).dot(p) >= -EPSILON
}

/// Root triangle containing `p`, chosen by the sign octant of its components
pub fn starting_triangle(p: &Vector3) -> StartingTriangle {
    let octant = ((p.x > 0.0) as usize) << 2 | ((p.y > 0.0) as usize) << 1 | (p.z > 0.0) as usize;
    let (north, digit) = OCTANT_ROOTS[octant];
    StartingTriangle {
        vertices: root_triangle(north, digit),
        name: root_name(north, digit),
        id: root_id(north, digit),
    }
}

/// The eight level-0 trixels in ID order, S0..S3 then N0..N3
pub fn roots() -> [TrixelId; 8] {
    [
        root_id(false, 0),
        root_id(false, 1),
        root_id(false, 2),
        root_id(false, 3),
        root_id(true, 0),
        root_id(true, 1),
        root_id(true, 2),
        root_id(true, 3),
    ]
}

#[inline]
fn root_triangle(north: bool, digit: u8) -> Triangle {
    let corners = if north {
        N_INDEXES[digit as usize]
    } else {
        S_INDEXES[digit as usize]
    };
    [ANCHORS[corners[0]], ANCHORS[corners[1]], ANCHORS[corners[2]]]
}

const fn root_id(north: bool, digit: u8) -> TrixelId {
    let raw = ((2 + north as u64) << 2) | digit as u64;
    // raw is at least 8
    TrixelId(NonZeroU64::MIN.saturating_add(raw - 1))
}

#[inline]
fn root_name(north: bool, digit: u8) -> &'static str {
    const NAMES: [[&str; 4]; 2] = [["S0", "S1", "S2", "S3"], ["N0", "N1", "N2", "N3"]];
    NAMES[north as usize][digit as usize]
}

/// Split a triangle into its four children, in digit order
///
/// With midpoints `w0 = mid(v1, v2)`, `w1 = mid(v0, v2)`, `w2 = mid(v0, v1)` the
/// children are `(v0, w2, w1)`, `(v1, w0, w2)`, `(v2, w1, w0)` and `(w0, w1, w2)`.
#[inline]
pub fn subdivide(tri: &Triangle) -> [Triangle; 4] {
    let [v0, v1, v2] = *tri;
    let w0 = v1.midpoint(&v2);
    let w1 = v0.midpoint(&v2);
    let w2 = v0.midpoint(&v1);
    [[v0, w2, w1], [v1, w0, w2], [v2, w1, w0], [w0, w1, w2]]
}

/// Pick the child of `tri` containing `p`
fn select_child(p: &Vector3, tri: &Triangle) -> (u8, Triangle) {
    let children = subdivide(tri);
    for (digit, child) in children.iter().enumerate() {
        if point_in_spherical_triangle(p, &child[0], &child[1], &child[2]) {
            return (digit as u8, *child);
        }
    }

    // Rounding can leave a point a hair outside every child; take the closest one
    let margin = |c: &Triangle| {
        c[0].cross(&c[1])
            .dot(p)
            .min(c[1].cross(&c[2]).dot(p))
            .min(c[2].cross(&c[0]).dot(p))
    };
    let mut best = 0;
    for digit in 1..4 {
        if margin(&children[digit]) > margin(&children[best]) {
            best = digit;
        }
    }
    tracing::warn!(?p, digit = best, "point outside all children, using closest");
    (best as u8, children[best])
}

/// Trixel ID at `depth` containing the direction `p`
///
/// `p` need not be normalized but must be finite and non-zero.
pub fn vector_to_id(p: &Vector3, depth: usize) -> Result<TrixelId> {
    if depth > MAX_DEPTH {
        return Err(HtmError::DepthTooLarge {
            depth,
            max: MAX_DEPTH,
        });
    }
    if !p.is_finite() || p.length() < EPSILON {
        return Err(HtmError::InvalidVector);
    }

    let start = starting_triangle(p);
    let mut tri = start.vertices;
    // Appending a digit to the name appends a bit pair to the ID
    let mut raw = start.id.get();
    for _ in 0..depth {
        let (digit, child) = select_child(p, &tri);
        raw = (raw << 2) | u64::from(digit);
        tri = child;
    }
    TrixelId::new(raw)
}

/// Trixel ID at `depth` containing the position (ra, dec) in degrees
pub fn ra_dec_to_id(ra: f64, dec: f64, depth: usize) -> Result<TrixelId> {
    vector_to_id(&Vector3::from_ra_dec(ra, dec), depth)
}

/// Vertices of the trixel with the given name
pub fn name_to_triangle(name: &str) -> Result<Triangle> {
    Ok(id_to_triangle(name_to_id(name)?))
}

/// Vertices of a trixel, by replaying its path from the root triangle
pub fn id_to_triangle(id: TrixelId) -> Triangle {
    let raw = id.get();
    let level = id.level();
    let north = (raw >> (2 * level + 2)) & 1 == 1;
    let root_digit = ((raw >> (2 * level)) & 3) as u8;

    let mut tri = root_triangle(north, root_digit);
    for pair in (0..level).rev() {
        let digit = ((raw >> (2 * pair)) & 3) as usize;
        tri = subdivide(&tri)[digit];
    }
    tri
}

/// Unit vector at the centre of a trixel
pub fn trixel_center(id: TrixelId) -> Vector3 {
    let [v0, v1, v2] = id_to_triangle(id);
    (v0 + v1 + v2).normalize()
}
