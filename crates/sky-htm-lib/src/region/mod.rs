//! Spherical query regions
//!
//! A [`Constraint`] is a cap on the unit sphere, a [`ConvexRegion`] intersects
//! constraints and a [`Domain`] unites convex regions. The plain-text descriptor
//! format for all three lives in [`parse`]. Regions turn into trixel ranges with
//! [`Domain::intersect`].

mod cover;
pub mod parse;

use crate::vector::{EPSILON, Vector3};
use smallvec::SmallVec;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

pub use cover::Coverage;
pub use parse::{RegionReader, write_constraint, write_convex, write_domain};

/// Which side of the great circle a cap's boundary lies on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Sign {
    /// Cap larger than a hemisphere (`d < 0`)
    Negative,
    /// Exactly a hemisphere (`d == 0`)
    Zero,
    /// Cap smaller than a hemisphere (`d > 0`)
    Positive,
    /// Convex region mixing negative and positive constraints
    Mixed,
}

/// Half-space `a · v > d` on the unit sphere
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Constraint {
    a: Vector3,
    d: f64,
    s: f64,
    sign: Sign,
}

impl Constraint {
    /// Build a constraint from a direction and a dot-product threshold. The direction
    /// is normalized.
    pub fn new(direction: Vector3, d: f64) -> Self {
        let sign = if d < -EPSILON {
            Sign::Negative
        } else if d > EPSILON {
            Sign::Positive
        } else {
            Sign::Zero
        };
        Self {
            a: direction.normalize(),
            d,
            s: d.clamp(-1.0, 1.0).acos(),
            sign,
        }
    }

    /// Circular cap of `radius` degrees around `center`
    pub fn cone(center: Vector3, radius: f64) -> Self {
        Self::new(center, radius.to_radians().cos())
    }

    #[inline]
    pub fn direction(&self) -> Vector3 {
        self.a
    }

    /// Cosine of the cap's angular radius
    #[inline]
    pub fn distance(&self) -> f64 {
        self.d
    }

    /// Angular radius in radians
    #[inline]
    pub fn angle(&self) -> f64 {
        self.s
    }

    #[inline]
    pub fn sign(&self) -> Sign {
        self.sign
    }

    /// Whether the direction `v` lies strictly inside the cap
    #[inline]
    pub fn contains(&self, v: &Vector3) -> bool {
        self.a.angle_to(v) < self.s
    }
}

/// Intersection of constraints, kept sorted by ascending opening angle
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ConvexRegion {
    constraints: SmallVec<[Constraint; 4]>,
    sign: Sign,
}

impl Default for ConvexRegion {
    fn default() -> Self {
        Self::new()
    }
}

impl ConvexRegion {
    pub fn new() -> Self {
        Self {
            constraints: SmallVec::new(),
            sign: Sign::Zero,
        }
    }

    /// Spherical triangle with the given corners, in any winding
    ///
    /// Three hemisphere constraints through pairs of corners, each oriented towards
    /// the third. Collinear corners produce a region with no constraints.
    pub fn from_triangle(v1: &Vector3, v2: &Vector3, v3: &Vector3) -> Self {
        let mut convex = Self::new();
        let planes = [(v2.cross(v3), v1), (v3.cross(v1), v2), (v1.cross(v2), v3)];
        let sides = planes.map(|(a, corner)| a.dot(corner));

        if sides[0] * sides[1] * sides[2] != 0.0 {
            for ((a, _), side) in planes.into_iter().zip(sides) {
                let inward = if side < 0.0 { -a } else { a };
                convex.constraints.push(Constraint::new(inward, 0.0));
            }
        }
        convex
    }

    /// Spherical quadrilateral with the given corners, in any order
    ///
    /// Edges are the corner-pair planes with both remaining corners on the same
    /// side. When one corner lies inside the triangle of the other three, only that
    /// triangle's edges qualify.
    pub fn from_rectangle(v1: &Vector3, v2: &Vector3, v3: &Vector3, v4: &Vector3) -> Self {
        let corners = [v1, v2, v3, v4];
        let mut planes = [Vector3::default(); 6];
        let mut sides = [[0.0f64; 2]; 6];

        let mut k = 0;
        for i in 0..4 {
            for j in i + 1..4 {
                planes[k] = corners[i].cross(corners[j]).normalize();
                let mut m = 0;
                for (l, corner) in corners.iter().enumerate() {
                    if l != i && l != j {
                        sides[k][m] = planes[k].dot(corner);
                        m += 1;
                    }
                }
                k += 1;
            }
        }

        let mut convex = Self::new();
        for (plane, [s0, s1]) in planes.iter().zip(sides) {
            // Strictly positive so aligned corners do not count as edges
            if s0 * s1 > 0.0 {
                let inward = if s0 > 0.0 { *plane } else { -*plane };
                convex.constraints.push(Constraint::new(inward, 0.0));
            }
        }

        // Three aligned corners leave one edge out; the first degenerate plane is it
        if convex.constraints.len() == 2
            && let Some((plane, [s0, s1])) = planes
                .iter()
                .zip(sides)
                .find(|(_, [s0, s1])| *s0 == 0.0 || *s1 == 0.0)
        {
            let inward = if s0 + s1 > 0.0 { *plane } else { -*plane };
            convex.constraints.push(Constraint::new(inward, 0.0));
        }
        convex
    }

    /// Add a constraint, keeping the ascending-angle order and the aggregate sign
    pub fn add(&mut self, constraint: Constraint) {
        let at = self
            .constraints
            .iter()
            .position(|c| constraint.s < c.s)
            .unwrap_or(self.constraints.len());
        self.constraints.insert(at, constraint);

        if self.constraints.len() == 1 {
            self.sign = constraint.sign;
            return;
        }
        self.sign = match (self.sign, constraint.sign) {
            (Sign::Negative, Sign::Positive) | (Sign::Positive, Sign::Negative) => Sign::Mixed,
            (Sign::Zero, sign) => sign,
            (sign, _) => sign,
        };
    }

    #[inline]
    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.constraints.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    #[inline]
    pub fn sign(&self) -> Sign {
        self.sign
    }

    /// Whether `v` satisfies every constraint. A region without constraints holds
    /// every direction.
    pub fn contains(&self, v: &Vector3) -> bool {
        self.constraints.iter().all(|c| c.contains(v))
    }
}

/// Union of convex regions
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Domain {
    convexes: Vec<ConvexRegion>,
}

impl Domain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, convex: ConvexRegion) {
        self.convexes.push(convex);
    }

    #[inline]
    pub fn convexes(&self) -> &[ConvexRegion] {
        &self.convexes
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.convexes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.convexes.is_empty()
    }

    /// Whether any convex region holds `v`
    pub fn contains(&self, v: &Vector3) -> bool {
        self.convexes.iter().any(|c| c.contains(v))
    }

    /// Total number of constraints across all convex regions
    pub fn constraint_count(&self) -> usize {
        self.convexes.iter().map(ConvexRegion::len).sum()
    }
}

impl FromIterator<ConvexRegion> for Domain {
    fn from_iter<I: IntoIterator<Item = ConvexRegion>>(iter: I) -> Self {
        Self {
            convexes: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::FRAC_PI_2;

    #[test]
    fn test_constraint_sign_and_angle() {
        let c = Constraint::new(Vector3::new(0.0, 0.0, 2.0), 0.5);
        assert_eq!(c.sign(), Sign::Positive);
        assert_eq!(c.direction(), Vector3::Z);
        assert!((c.angle() - 60f64.to_radians()).abs() < 1e-12);

        assert_eq!(Constraint::new(Vector3::X, 0.0).sign(), Sign::Zero);
        assert_eq!(Constraint::new(Vector3::X, 1e-16).sign(), Sign::Zero);
        assert_eq!(Constraint::new(Vector3::X, -0.2).sign(), Sign::Negative);
    }

    #[test]
    fn test_cone_contains() {
        let cone = Constraint::cone(Vector3::from_ra_dec(10.0, 20.0), 5.0);
        assert!(cone.contains(&Vector3::from_ra_dec(10.0, 20.0)));
        assert!(cone.contains(&Vector3::from_ra_dec(12.0, 22.0)));
        assert!(!cone.contains(&Vector3::from_ra_dec(10.0, 26.0)));
    }

    #[test]
    fn test_add_orders_and_tracks_sign() {
        let mut convex = ConvexRegion::new();
        convex.add(Constraint::new(Vector3::Z, 0.0));
        assert_eq!(convex.sign(), Sign::Zero);
        convex.add(Constraint::new(Vector3::X, 0.9));
        assert_eq!(convex.sign(), Sign::Positive);
        convex.add(Constraint::new(Vector3::Y, 0.5));
        assert_eq!(convex.sign(), Sign::Positive);

        let angles: Vec<f64> = convex.constraints().iter().map(Constraint::angle).collect();
        assert!(angles.windows(2).all(|w| w[0] <= w[1]));
        assert!((angles[2] - FRAC_PI_2).abs() < 1e-12);

        convex.add(Constraint::new(-Vector3::Z, -0.5));
        assert_eq!(convex.sign(), Sign::Mixed);
        convex.add(Constraint::new(Vector3::Z, 0.0));
        assert_eq!(convex.sign(), Sign::Mixed);
    }

    #[test]
    fn test_triangle_holds_its_centroid_either_winding() {
        let (a, b, c) = (Vector3::X, Vector3::Y, Vector3::Z);
        let centroid = (a + b + c).normalize();
        for convex in [
            ConvexRegion::from_triangle(&a, &b, &c),
            ConvexRegion::from_triangle(&a, &c, &b),
        ] {
            assert_eq!(convex.len(), 3);
            assert_eq!(convex.sign(), Sign::Zero);
            assert!(convex.contains(&centroid));
            assert!(!convex.contains(&-centroid));
            assert!(!convex.contains(&Vector3::new(1.0, 1.0, -0.2).normalize()));
        }
    }

    #[test]
    fn test_collinear_triangle_is_unconstrained() {
        let a = Vector3::X;
        let b = Vector3::new(1.0, 1.0, 0.0).normalize();
        let convex = ConvexRegion::from_triangle(&a, &b, &Vector3::Y);
        assert!(convex.is_empty());
    }

    #[test]
    fn test_rectangle_any_corner_order() {
        let corners = [
            Vector3::from_ra_dec(10.0, -5.0),
            Vector3::from_ra_dec(20.0, -5.0),
            Vector3::from_ra_dec(20.0, 5.0),
            Vector3::from_ra_dec(10.0, 5.0),
        ];
        let inside = Vector3::from_ra_dec(15.0, 0.0);
        let outside = Vector3::from_ra_dec(25.0, 0.0);

        let ordered = ConvexRegion::from_rectangle(&corners[0], &corners[1], &corners[2], &corners[3]);
        let crossed = ConvexRegion::from_rectangle(&corners[0], &corners[2], &corners[1], &corners[3]);
        for convex in [ordered, crossed] {
            assert_eq!(convex.len(), 4);
            assert!(convex.contains(&inside));
            assert!(!convex.contains(&outside));
        }
    }

    #[test]
    fn test_rectangle_with_corner_inside_is_triangle() {
        let a = Vector3::from_ra_dec(0.0, 0.0);
        let b = Vector3::from_ra_dec(20.0, 0.0);
        let c = Vector3::from_ra_dec(10.0, 20.0);
        let inner = Vector3::from_ra_dec(10.0, 5.0);
        let convex = ConvexRegion::from_rectangle(&a, &b, &c, &inner);
        assert_eq!(convex.len(), 3);
        assert!(convex.contains(&Vector3::from_ra_dec(10.0, 10.0)));
    }

    #[test]
    fn test_domain_union() {
        let mut domain = Domain::new();
        assert!(!domain.contains(&Vector3::Z));
        let mut north = ConvexRegion::new();
        north.add(Constraint::cone(Vector3::Z, 10.0));
        let mut south = ConvexRegion::new();
        south.add(Constraint::cone(-Vector3::Z, 10.0));
        domain.add(north);
        domain.add(south);

        assert_eq!(domain.len(), 2);
        assert_eq!(domain.constraint_count(), 2);
        assert!(domain.contains(&Vector3::Z));
        assert!(domain.contains(&-Vector3::Z));
        assert!(!domain.contains(&Vector3::X));
    }

    #[test]
    fn test_empty_convex_holds_everything() {
        let convex = ConvexRegion::new();
        assert!(convex.contains(&Vector3::X));
        assert!(convex.contains(&-Vector3::Z));
    }
}
