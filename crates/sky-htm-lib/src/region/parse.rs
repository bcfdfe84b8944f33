//! Plain-text region descriptors
//!
//! The format is line oriented. `#` starts a comment running to the end of the line,
//! and blank or comment-only lines between records are skipped. CRLF and LF line
//! endings are both accepted.
//!
//! ```text
//! #DOMAIN
//! 2
//! #CONVEX
//! 1
//! 0 0 1 0.5          # ax ay az d
//! #TRIANGLE_RADEC
//! 10 -5              # ra dec per corner
//! 20 -5
//! 15 5
//! ```
//!
//! A domain starts with its convex count. Each convex block may be introduced by one
//! of the shape keywords below; a block without a keyword is a generic convex region
//! (a constraint count followed by that many `ax ay az d` lines).
//!
//! | Keyword            | Body                                       |
//! |--------------------|--------------------------------------------|
//! | `#CONVEX`          | count, then `ax ay az d` per line          |
//! | `#CONVEX_RADEC`    | count, then `ra dec d` per line            |
//! | `#TRIANGLE`        | three `x y z` corners                      |
//! | `#TRIANGLE_RADEC`  | three `ra dec` corners                     |
//! | `#RECTANGLE`       | four `x y z` corners                       |
//! | `#RECTANGLE_RADEC` | four `ra dec` corners                      |

use super::{Constraint, ConvexRegion, Domain};
use crate::vector::Vector3;
use crate::{HtmError, Result};
use std::fmt;
use std::io::{BufRead, Write};
use std::str::FromStr;

/// Shape introducing a convex block inside a domain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Block {
    Convex,
    ConvexRaDec,
    Triangle,
    TriangleRaDec,
    Rectangle,
    RectangleRaDec,
}

impl Block {
    fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword {
            "CONVEX" => Some(Block::Convex),
            "CONVEX_RADEC" => Some(Block::ConvexRaDec),
            "TRIANGLE" => Some(Block::Triangle),
            "TRIANGLE_RADEC" => Some(Block::TriangleRaDec),
            "RECTANGLE" => Some(Block::Rectangle),
            "RECTANGLE_RADEC" => Some(Block::RectangleRaDec),
            _ => None,
        }
    }
}

/// Streaming reader for region descriptors
///
/// Errors carry the 1-based line number where reading stopped. A failed read leaves
/// the reader mid-record; discard it together with any partially built region.
pub struct RegionReader<R> {
    reader: R,
    line: usize,
    /// Line read ahead while looking for a block keyword
    pending: Option<String>,
}

impl<R: BufRead> RegionReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: 0,
            pending: None,
        }
    }

    /// Number of physical lines consumed so far
    #[inline]
    pub fn line(&self) -> usize {
        self.line
    }

    /// Read a constraint in `ax ay az d` form
    pub fn read_constraint(&mut self) -> Result<Constraint> {
        let [x, y, z, d] = self.read_numbers::<4>("constraint", "Could not read constraint")?;
        Ok(Constraint::new(Vector3::new(x, y, z), d))
    }

    /// Read a constraint in `ra dec d` form, angles in degrees
    pub fn read_constraint_radec(&mut self) -> Result<Constraint> {
        let [ra, dec, d] = self.read_numbers::<3>("constraint", "Could not read constraint")?;
        Ok(Constraint::new(Vector3::from_ra_dec(ra, dec), d))
    }

    /// Read a constraint count followed by that many `ax ay az d` constraints
    pub fn read_convex(&mut self) -> Result<ConvexRegion> {
        self.read_convex_with(Self::read_constraint)
    }

    /// Read a constraint count followed by that many `ra dec d` constraints
    pub fn read_convex_radec(&mut self) -> Result<ConvexRegion> {
        self.read_convex_with(Self::read_constraint_radec)
    }

    /// Read a convex count followed by that many convex blocks
    pub fn read_domain(&mut self) -> Result<Domain> {
        let count = self.read_count("domain")?;
        tracing::debug!(count, line = self.line, "reading domain");

        let mut domain = Domain::new();
        for _ in 0..count {
            let block = self.read_block_header()?;
            let convex = match block {
                Block::Convex => self.read_convex()?,
                Block::ConvexRaDec => self.read_convex_radec()?,
                Block::Triangle => {
                    let [v1, v2, v3] = self.read_corners::<3>(Self::read_vertex)?;
                    ConvexRegion::from_triangle(&v1, &v2, &v3)
                }
                Block::TriangleRaDec => {
                    let [v1, v2, v3] = self.read_corners::<3>(Self::read_vertex_radec)?;
                    ConvexRegion::from_triangle(&v1, &v2, &v3)
                }
                Block::Rectangle => {
                    let [v1, v2, v3, v4] = self.read_corners::<4>(Self::read_vertex)?;
                    ConvexRegion::from_rectangle(&v1, &v2, &v3, &v4)
                }
                Block::RectangleRaDec => {
                    let [v1, v2, v3, v4] = self.read_corners::<4>(Self::read_vertex_radec)?;
                    ConvexRegion::from_rectangle(&v1, &v2, &v3, &v4)
                }
            };
            tracing::debug!(?block, constraints = convex.len(), line = self.line, "read convex");
            domain.add(convex);
        }
        Ok(domain)
    }

    fn read_convex_with(
        &mut self,
        mut read: impl FnMut(&mut Self) -> Result<Constraint>,
    ) -> Result<ConvexRegion> {
        let count = self.read_count("convex")?;
        let mut convex = ConvexRegion::new();
        for _ in 0..count {
            convex.add(read(self)?);
        }
        Ok(convex)
    }

    fn read_vertex(&mut self) -> Result<Vector3> {
        let [x, y, z] = self.read_numbers::<3>("vertex", "Could not read vertex")?;
        Ok(Vector3::new(x, y, z))
    }

    fn read_vertex_radec(&mut self) -> Result<Vector3> {
        let [ra, dec] = self.read_numbers::<2>("vertex", "Could not read vertex")?;
        Ok(Vector3::from_ra_dec(ra, dec))
    }

    fn read_corners<const N: usize>(
        &mut self,
        mut read: impl FnMut(&mut Self) -> Result<Vector3>,
    ) -> Result<[Vector3; N]> {
        let mut corners = [Vector3::default(); N];
        for corner in &mut corners {
            *corner = read(self)?;
        }
        Ok(corners)
    }

    fn read_count(&mut self, context: &'static str) -> Result<usize> {
        let record = self.next_record(context)?;
        record.parse().map_err(|_| HtmError::Parse {
            line: self.line,
            message: format!("Could not read {context} count from {record:?}"),
        })
    }

    /// Read one record of exactly `N` whitespace-separated numbers
    fn read_numbers<const N: usize>(
        &mut self,
        context: &'static str,
        message: &str,
    ) -> Result<[f64; N]> {
        let record = self.next_record(context)?;
        let mut values = [0.0; N];
        let mut fields = record.split_whitespace();
        for value in &mut values {
            *value = fields
                .next()
                .and_then(|field| field.parse().ok())
                .ok_or_else(|| self.parse_error(message))?;
        }
        if fields.next().is_some() {
            return Err(self.parse_error(message));
        }
        Ok(values)
    }

    /// Skip blank lines and comments up to the next block, returning its shape
    fn read_block_header(&mut self) -> Result<Block> {
        loop {
            let Some(line) = self.next_line()? else {
                return Err(HtmError::UnexpectedEof {
                    line: self.line,
                    context: "convex",
                });
            };
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match trimmed.strip_prefix('#') {
                Some(comment) => {
                    // Keywords follow the `#` directly, "# TRIANGLE ..." is prose
                    let keyword = comment.split(char::is_whitespace).next().unwrap_or_default();
                    if let Some(block) = Block::from_keyword(keyword) {
                        return Ok(block);
                    }
                }
                None => {
                    self.pending = Some(line);
                    return Ok(Block::Convex);
                }
            }
        }
    }

    /// Next line holding data, with comments stripped and whitespace trimmed
    fn next_record(&mut self, context: &'static str) -> Result<String> {
        loop {
            let Some(line) = self.next_line()? else {
                return Err(HtmError::UnexpectedEof {
                    line: self.line,
                    context,
                });
            };
            let data = line.split('#').next().unwrap_or_default().trim();
            if !data.is_empty() {
                return Ok(data.to_owned());
            }
        }
    }

    fn next_line(&mut self) -> Result<Option<String>> {
        if let Some(line) = self.pending.take() {
            return Ok(Some(line));
        }
        let mut line = String::new();
        if self.reader.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        self.line += 1;
        let end = line.trim_end_matches(['\r', '\n']).len();
        line.truncate(end);
        Ok(Some(line))
    }

    fn parse_error(&self, message: &str) -> HtmError {
        HtmError::Parse {
            line: self.line,
            message: message.to_owned(),
        }
    }
}

/// Write a constraint as `ax ay az d`
pub fn write_constraint<W: Write>(mut writer: W, constraint: &Constraint) -> Result<()> {
    writeln!(writer, "{constraint}")?;
    Ok(())
}

/// Write a convex block: `#CONVEX`, the count, then one constraint per line
pub fn write_convex<W: Write>(mut writer: W, convex: &ConvexRegion) -> Result<()> {
    write!(writer, "{convex}")?;
    Ok(())
}

/// Write a domain: a `#DOMAIN` comment, the convex count, then each convex block
pub fn write_domain<W: Write>(mut writer: W, domain: &Domain) -> Result<()> {
    write!(writer, "{domain}")?;
    Ok(())
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.a, self.d)
    }
}

impl fmt::Display for ConvexRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "#CONVEX")?;
        writeln!(f, "{}", self.len())?;
        for constraint in self.constraints() {
            writeln!(f, "{constraint}")?;
        }
        Ok(())
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "#DOMAIN")?;
        writeln!(f, "{}", self.len())?;
        for convex in self.convexes() {
            write!(f, "{convex}")?;
        }
        Ok(())
    }
}

impl FromStr for Constraint {
    type Err = HtmError;

    fn from_str(s: &str) -> Result<Self> {
        RegionReader::new(s.as_bytes()).read_constraint()
    }
}

impl FromStr for ConvexRegion {
    type Err = HtmError;

    fn from_str(s: &str) -> Result<Self> {
        RegionReader::new(s.as_bytes()).read_convex()
    }
}

impl FromStr for Domain {
    type Err = HtmError;

    fn from_str(s: &str) -> Result<Self> {
        RegionReader::new(s.as_bytes()).read_domain()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::Sign;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_read_constraint_forms() {
        let c: Constraint = "0 0 2 0.5".parse().unwrap();
        assert_eq!(c.direction(), Vector3::Z);
        assert_eq!(c.distance(), 0.5);

        let mut reader = RegionReader::new("90 0 0.25\n".as_bytes());
        let c = reader.read_constraint_radec().unwrap();
        assert!((c.direction().y - 1.0).abs() < 1e-12);
        assert_eq!(c.distance(), 0.25);
    }

    #[test]
    fn test_convex_skips_comments_and_crlf() {
        let text = "# a comment\r\n\r\n  2   # two constraints\r\n1 0 0 0.1\r\n# between\r\n0 1 0 -0.2 # trailing\r\n";
        let convex: ConvexRegion = text.parse().unwrap();
        assert_eq!(convex.len(), 2);
        assert_eq!(convex.sign(), Sign::Mixed);
    }

    #[test]
    fn test_bad_constraint_reports_line() {
        let err = "2\n1 0 0 0.5\n1 zero 0 0.5\n".parse::<ConvexRegion>().unwrap_err();
        match err {
            HtmError::Parse { line, message } => {
                assert_eq!(line, 3);
                assert_eq!(message, "Could not read constraint");
            }
            other => panic!("unexpected error {other:?}"),
        }

        assert!(matches!(
            "1 0 0".parse::<Constraint>(),
            Err(HtmError::Parse { line: 1, .. })
        ));
        assert!(matches!(
            "1 0 0 0.5 7".parse::<Constraint>(),
            Err(HtmError::Parse { line: 1, .. })
        ));
    }

    #[test]
    fn test_premature_eof() {
        let err = "3\n1 0 0 0.5\n".parse::<ConvexRegion>().unwrap_err();
        assert!(matches!(
            err,
            HtmError::UnexpectedEof {
                line: 2,
                context: "constraint"
            }
        ));
        assert!(err.to_string().contains("Premature end-of-file"));

        assert!(matches!(
            "".parse::<Domain>(),
            Err(HtmError::UnexpectedEof { context: "domain", .. })
        ));
        assert!(matches!(
            "2\n#CONVEX\n0\n".parse::<Domain>(),
            Err(HtmError::UnexpectedEof { context: "convex", .. })
        ));
    }

    #[test]
    fn test_domain_with_shapes() {
        let text = "\
# query region
4
#TRIANGLE
1 0 0
0 1 0
0 0 1
#RECTANGLE_RADEC
10 -5
20 -5
20 5
10 5
#CONVEX_RADEC
1
0 90 0.9
1
0 0 -1 0.8
";
        let domain: Domain = text.parse().unwrap();
        assert_eq!(domain.len(), 4);
        let sizes: Vec<usize> = domain.convexes().iter().map(ConvexRegion::len).collect();
        assert_eq!(sizes, vec![3, 4, 1, 1]);

        assert!(domain.contains(&Vector3::new(1.0, 1.0, 1.0).normalize()));
        assert!(domain.contains(&Vector3::from_ra_dec(15.0, 0.0)));
        assert!(domain.contains(&Vector3::Z));
        assert!(domain.contains(&-Vector3::Z));
        assert!(!domain.contains(&Vector3::from_ra_dec(200.0, 10.0)));
    }

    #[test]
    fn test_domain_with_vertex_and_radec_corner_shapes() {
        let text = "\
2
#TRIANGLE_RADEC
0 0
90 0
0 90
#RECTANGLE   # corners around +x
1 -0.1 -0.1
1 0.1 -0.1
1 0.1 0.1
1 -0.1 0.1
";
        let domain: Domain = text.parse().unwrap();
        let sizes: Vec<usize> = domain.convexes().iter().map(ConvexRegion::len).collect();
        assert_eq!(sizes, vec![3, 4]);

        let [triangle, rectangle] = domain.convexes() else {
            panic!("expected two convexes");
        };
        assert!(triangle.contains(&Vector3::new(1.0, 1.0, 1.0).normalize()));
        assert!(!triangle.contains(&Vector3::from_ra_dec(180.0, 10.0)));
        assert!(rectangle.contains(&Vector3::X));
        assert!(rectangle.contains(&Vector3::from_ra_dec(3.0, -3.0)));
        assert!(!rectangle.contains(&Vector3::from_ra_dec(10.0, 0.0)));
        assert!(!rectangle.contains(&-Vector3::X));
    }

    #[test]
    fn test_spaced_keyword_is_a_comment() {
        let text = "\
1
# TRIANGLE of bright stars
1
0 0 1 0.5
";
        let domain: Domain = text.parse().unwrap();
        assert_eq!(domain.len(), 1);
        let convex = &domain.convexes()[0];
        assert_eq!(convex.len(), 1);
        assert_eq!(convex.constraints()[0].direction(), Vector3::Z);
        assert_eq!(convex.constraints()[0].distance(), 0.5);
    }

    #[test]
    fn test_unknown_hash_lines_are_comments() {
        let text = "1\n#NOT_A_SHAPE\n# note\n1\n0 0 1 0\n";
        let domain: Domain = text.parse().unwrap();
        assert_eq!(domain.convexes()[0].len(), 1);
    }

    #[test]
    fn test_convex_roundtrip() {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let mut convex = ConvexRegion::new();
        for _ in 0..7 {
            let direction = Vector3::new(
                rng.gen_range(-1.0..1.0),
                rng.gen_range(-1.0..1.0),
                rng.gen_range(-1.0..1.0),
            );
            convex.add(Constraint::new(direction, rng.gen_range(-1.0..1.0)));
        }

        let mut written = Vec::new();
        write_convex(&mut written, &convex).unwrap();
        let text = String::from_utf8(written).unwrap();
        assert!(text.starts_with("#CONVEX\n7\n"));

        let parsed: ConvexRegion = text.parse().unwrap();
        assert_eq!(parsed.len(), convex.len());
        for (a, b) in parsed.constraints().iter().zip(convex.constraints()) {
            assert_eq!(a.distance(), b.distance());
            assert!((a.direction() - b.direction()).length() < 1e-15);
        }
    }

    #[test]
    fn test_domain_roundtrip() {
        let mut domain = Domain::new();
        domain.add(ConvexRegion::from_triangle(&Vector3::X, &Vector3::Y, &Vector3::Z));
        let mut cone = ConvexRegion::new();
        cone.add(Constraint::cone(Vector3::from_ra_dec(45.0, 45.0), 3.0));
        domain.add(cone);

        let mut written = Vec::new();
        write_domain(&mut written, &domain).unwrap();
        let parsed: Domain = String::from_utf8(written).unwrap().parse().unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed.constraint_count(), 4);
        assert!(parsed.contains(&Vector3::from_ra_dec(45.0, 46.0)));
    }

    #[test]
    fn test_write_constraint() {
        let mut out = Vec::new();
        write_constraint(&mut out, &Constraint::new(Vector3::X, 0.5)).unwrap();
        assert_eq!(out, b"1 0 0 0.5\n");
    }
}
