//! Region to trixel range conversion
//!
//! The mesh is walked from the eight roots. Each trixel is classified against a convex
//! region: rejected trixels are dropped, full trixels contribute all their descendants
//! at the target depth and partial trixels are split until the target depth is reached.
//! Classification errs towards [`Coverage::Partial`], so the resulting ranges hold
//! every trixel that shares a point with the region.

use super::{Constraint, ConvexRegion, Domain, Sign};
use crate::range::TrixelRanges;
use crate::trixel::{self, MAX_DEPTH, Triangle, TrixelId};
use crate::vector::{EPSILON, Vector3};
use crate::{HtmError, Result};
use std::f64::consts::TAU;

/// How a trixel relates to a convex region
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coverage {
    /// Every point of the trixel is in the region
    Full,
    /// The trixel may share points with the region
    Partial,
    /// The trixel and the region are disjoint
    Reject,
}

impl Constraint {
    /// Vertex test, boundary inclusive
    #[inline]
    fn holds(&self, v: &Vector3) -> bool {
        self.a.dot(v) >= self.d
    }

    /// Whether the cap boundary meets the great-circle arc from `v1` to `v2`
    fn crosses_arc(&self, v1: &Vector3, v2: &Vector3) -> bool {
        let (v1, v2) = (v1.normalize(), v2.normalize());
        let arc = v1.angle_to(&v2);
        if arc < EPSILON {
            return false;
        }
        // v(t) = v1 cos t + w sin t for t in [0, arc]
        let w = (v2 - v1 * v1.dot(&v2)).normalize();
        let (g1, gw) = (self.a.dot(&v1), self.a.dot(&w));
        let amplitude = g1.hypot(gw);
        if amplitude < EPSILON {
            return self.d.abs() <= EPSILON;
        }
        if self.d.abs() > amplitude {
            return false;
        }

        let phase = gw.atan2(g1);
        let spread = (self.d / amplitude).clamp(-1.0, 1.0).acos();
        [phase - spread, phase + spread].into_iter().any(|t| {
            let t = t.rem_euclid(TAU);
            t <= arc + EPSILON || t >= TAU - EPSILON
        })
    }

    fn crosses_triangle(&self, [v0, v1, v2]: &Triangle) -> bool {
        self.crosses_arc(v0, v1) || self.crosses_arc(v1, v2) || self.crosses_arc(v2, v0)
    }
}

#[inline]
fn triangle_contains(tri: &Triangle, v: &Vector3) -> bool {
    trixel::point_in_spherical_triangle(v, &tri[0], &tri[1], &tri[2])
}

/// Smallest cap holding a counter-clockwise triangle, as (centre, angular radius)
fn bounding_circle([v0, v1, v2]: &Triangle) -> (Vector3, f64) {
    let centre = (*v1 - *v0).cross(&(*v2 - *v1)).normalize();
    (centre, centre.angle_to(v0))
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl ConvexRegion {
    /// Classify a counter-clockwise triangle against this region
    pub fn classify(&self, tri: &Triangle) -> Coverage {
        let inside = tri
            .iter()
            .filter(|v| self.constraints.iter().all(|c| c.holds(v)))
            .count();

        match inside {
            1 | 2 => Coverage::Partial,
            3 => {
                // Caps no larger than a hemisphere are convex, only negative ones can cut in
                let cut = self
                    .constraints
                    .iter()
                    .filter(|c| c.sign == Sign::Negative)
                    .any(|c| triangle_contains(tri, &-c.a) || c.crosses_triangle(tri));
                if cut {
                    Coverage::Partial
                } else {
                    Coverage::Full
                }
            }
            _ => self.classify_outside_corners(tri),
        }
    }

    /// No corner is in the region, so the overlap (if any) has to enter through an edge
    /// or sit wholly inside the triangle
    fn classify_outside_corners(&self, tri: &Triangle) -> Coverage {
        let (centre, radius) = bounding_circle(tri);
        let disjoint = |c: &Constraint| {
            if centre.angle_to(&c.a) > radius + c.s {
                return true;
            }
            !c.crosses_triangle(tri) && !triangle_contains(tri, &c.a) && !c.holds(&tri[0])
        };
        if self.constraints.iter().any(disjoint) {
            Coverage::Reject
        } else {
            Coverage::Partial
        }
    }

    /// Trixel ranges at `depth` covering this region
    pub fn intersect(&self, depth: usize) -> Result<TrixelRanges> {
        let mut ranges = TrixelRanges::new();
        self.intersect_into(depth, &mut ranges)?;
        Ok(ranges)
    }

    /// Merge the trixel ranges at `depth` covering this region into `ranges`
    pub fn intersect_into(&self, depth: usize, ranges: &mut TrixelRanges) -> Result<()> {
        if depth > MAX_DEPTH {
            return Err(HtmError::DepthTooLarge {
                depth,
                max: MAX_DEPTH,
            });
        }
        for root in trixel::roots() {
            self.cover(root, &trixel::id_to_triangle(root), depth, ranges)?;
        }
        Ok(())
    }

    fn cover(
        &self,
        id: TrixelId,
        tri: &Triangle,
        depth: usize,
        ranges: &mut TrixelRanges,
    ) -> Result<()> {
        match self.classify(tri) {
            Coverage::Reject => Ok(()),
            Coverage::Full => ranges.add_descendants(id, depth),
            Coverage::Partial if id.level() >= depth => ranges.add_trixel(id),
            Coverage::Partial => {
                for (child, child_tri) in id.children()?.into_iter().zip(trixel::subdivide(tri)) {
                    self.cover(child, &child_tri, depth, ranges)?;
                }
                Ok(())
            }
        }
    }
}

impl Domain {
    /// Trixel ranges at `depth` covering the union of all convex regions
    pub fn intersect(&self, depth: usize) -> Result<TrixelRanges> {
        let mut ranges = TrixelRanges::new();
        self.intersect_into(depth, &mut ranges)?;
        Ok(ranges)
    }

    pub fn intersect_into(&self, depth: usize, ranges: &mut TrixelRanges) -> Result<()> {
        profiling::scope!("region::intersect");
        for convex in &self.convexes {
            convex.intersect_into(depth, ranges)?;
        }
        tracing::debug!(
            depth,
            convexes = self.convexes.len(),
            ranges = ranges.len(),
            "intersected domain with mesh"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    fn key_of(v: &Vector3, depth: usize) -> i64 {
        trixel::vector_to_id(v, depth).unwrap().as_key().unwrap()
    }

    fn cone(ra: f64, dec: f64, radius: f64) -> ConvexRegion {
        let mut convex = ConvexRegion::new();
        convex.add(Constraint::cone(Vector3::from_ra_dec(ra, dec), radius));
        convex
    }

    #[test]
    fn test_arc_crossing() {
        let cap = Constraint::cone(Vector3::Z, 30.0);
        // Meridian from the equator to the pole crosses the cap edge once
        assert!(cap.crosses_arc(&Vector3::X, &Vector3::Z));
        // Equatorial arc stays far below the cap
        assert!(!cap.crosses_arc(&Vector3::X, &Vector3::Y));
        // Arc wholly inside the cap
        let a = Vector3::from_ra_dec(0.0, 80.0);
        let b = Vector3::from_ra_dec(90.0, 80.0);
        assert!(!cap.crosses_arc(&a, &b));
    }

    #[test]
    fn test_classify_root_triangles() {
        let north_cap = cone(0.0, 90.0, 10.0);
        let n0 = trixel::name_to_triangle("N0").unwrap();
        let s0 = trixel::name_to_triangle("S0").unwrap();
        assert_eq!(north_cap.classify(&n0), Coverage::Partial);
        assert_eq!(north_cap.classify(&s0), Coverage::Reject);

        let southern = cone(0.0, -90.0, 100.0);
        assert_eq!(southern.classify(&s0), Coverage::Full);
    }

    #[test]
    fn test_small_cap_inside_triangle() {
        // No corner of N1 is in the cap, but the cap sits in the middle of it
        let id: TrixelId = "N1".parse().unwrap();
        let centre = trixel::trixel_center(id);
        let mut convex = ConvexRegion::new();
        convex.add(Constraint::cone(centre, 1.0));
        assert_eq!(
            convex.classify(&trixel::id_to_triangle(id)),
            Coverage::Partial
        );
    }

    #[test]
    fn test_cone_across_trixel_boundaries() {
        // Centred on an octahedron vertex, so it spills into four roots
        let depth = 4;
        let region = cone(0.0, 0.0, 2.0);
        let ranges = region.intersect(depth).unwrap();
        assert!(!ranges.is_empty());

        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let mut hits = 0;
        while hits < 2_000 {
            let v = Vector3::from_ra_dec(rng.gen_range(-2.5..2.5), rng.gen_range(-2.5..2.5));
            if !region.contains(&v) {
                continue;
            }
            hits += 1;
            assert!(ranges.contains(key_of(&v, depth)), "missed {v}");
        }

        for (ra, dec) in [(1.0, 1.0), (359.0, 1.0), (1.0, -1.0), (359.0, -1.0)] {
            let v = Vector3::from_ra_dec(ra, dec);
            assert!(ranges.contains(key_of(&v, depth)));
        }
        for (ra, dec) in [(180.0, 0.0), (90.0, 45.0), (0.0, -60.0)] {
            let v = Vector3::from_ra_dec(ra, dec);
            assert!(!ranges.contains(key_of(&v, depth)));
        }
    }

    #[test]
    fn test_full_trixels_expand_to_depth() {
        let region = cone(45.0, 45.0, 80.0);
        let ranges = region.intersect(3).unwrap();

        let id = trixel::ra_dec_to_id(45.0, 45.0, 1).unwrap();
        let (lo, hi) = id.descendant_range(3).unwrap();
        assert_eq!(
            ranges.inclusion(lo.as_key().unwrap(), hi.as_key().unwrap()),
            crate::range::Inclusion::Inside
        );
        assert!(!ranges.contains(key_of(&Vector3::from_ra_dec(225.0, -45.0), 3)));
    }

    #[test]
    fn test_hole_keeps_surrounding_trixels() {
        // Everything except a one degree hole
        let mut convex = ConvexRegion::new();
        convex.add(Constraint::new(-Vector3::from_ra_dec(45.0, 60.0), -(1f64.to_radians().cos())));
        let ranges = convex.intersect(2).unwrap();
        assert_eq!(ranges.ranges(), vec![(128, 255)]);
    }

    #[test]
    fn test_domain_union_and_edge_cases() {
        let domain: Domain = [cone(10.0, 10.0, 3.0), cone(200.0, -30.0, 3.0)]
            .into_iter()
            .collect();
        let ranges = domain.intersect(5).unwrap();
        assert!(ranges.contains(key_of(&Vector3::from_ra_dec(10.0, 10.0), 5)));
        assert!(ranges.contains(key_of(&Vector3::from_ra_dec(200.0, -30.0), 5)));
        assert!(!ranges.contains(key_of(&Vector3::from_ra_dec(100.0, 0.0), 5)));

        assert!(Domain::new().intersect(5).unwrap().is_empty());

        let whole_sky: Domain = std::iter::once(ConvexRegion::new()).collect();
        assert_eq!(whole_sky.intersect(2).unwrap().ranges(), vec![(128, 255)]);

        assert!(matches!(
            domain.intersect(MAX_DEPTH + 1),
            Err(HtmError::DepthTooLarge { .. })
        ));
    }
}
