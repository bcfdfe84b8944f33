use crate::cli::Commands;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use sky_htm_lib::region::{self, ConvexRegion, Domain, RegionReader};
use sky_htm_lib::trixel::{self, TrixelId};
use sky_htm_lib::{Command, Constraint, HtmError, SkipList, Value, Vector3};
use std::fs::File;
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};

/// Errors surfaced to the command line
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error(transparent)]
    Htm(#[from] HtmError),

    #[error("{}: {source}", path.display())]
    Region { path: PathBuf, source: HtmError },

    #[error("Cannot open {}: {source}", path.display())]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Output error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Count does not fit a skip-list value: {0}")]
    Count(#[from] std::num::TryFromIntError),

    #[error("Expected {expected} values for {what}, got {found}")]
    Arity {
        what: &'static str,
        expected: usize,
        found: usize,
    },
}

pub type Result<T> = std::result::Result<T, CliError>;

/// Execute one subcommand, writing its report to `out`
pub fn run<W: Write>(command: &Commands, out: &mut W) -> Result<()> {
    match command {
        Commands::Lookup { ra, dec, xyz, depth } => {
            let id = match (xyz, ra, dec) {
                (Some(xyz), _, _) => {
                    let [x, y, z] = exact::<3>("--xyz", xyz)?;
                    trixel::vector_to_id(&Vector3::new(x, y, z), *depth)?
                }
                (None, Some(ra), Some(dec)) => trixel::ra_dec_to_id(*ra, *dec, *depth)?,
                (None, ra, dec) => {
                    return Err(CliError::Arity {
                        what: "RA/Dec",
                        expected: 2,
                        found: usize::from(ra.is_some()) + usize::from(dec.is_some()),
                    });
                }
            };
            writeln!(out, "id: {}", id.get())?;
            writeln!(out, "name: {id}")?;
            writeln!(out, "level: {}", id.level())?;
        }
        Commands::Name { id } => {
            writeln!(out, "{}", trixel::id_to_name(*id)?)?;
        }
        Commands::Id { name } => {
            let id = trixel::name_to_id(name)?;
            writeln!(out, "{} (level {})", id.get(), id.level())?;
        }
        Commands::Triangle { name } => {
            let id: TrixelId = name.parse()?;
            for (corner, vertex) in trixel::id_to_triangle(id).iter().enumerate() {
                write_direction(out, &format!("v{corner}"), vertex)?;
            }
            write_direction(out, "centre", &trixel::trixel_center(id))?;
        }
        Commands::Region {
            file,
            contains,
            write,
            depth,
        } => {
            let domain = read_region(file)?;
            tracing::info!(
                path = %file.display(),
                convexes = domain.len(),
                constraints = domain.constraint_count(),
                "loaded region"
            );
            writeln!(out, "convexes: {}", domain.len())?;
            for (i, convex) in domain.convexes().iter().enumerate() {
                writeln!(
                    out,
                    "  #{i}: {} constraints, sign {:?}",
                    convex.len(),
                    convex.sign()
                )?;
            }
            if let Some(position) = contains {
                let [ra, dec] = exact::<2>("--contains", position)?;
                let inside = domain.contains(&Vector3::from_ra_dec(ra, dec));
                writeln!(out, "contains {ra} {dec}: {inside}")?;
            }
            if let Some(depth) = depth {
                let ranges = domain.intersect(*depth)?;
                writeln!(out, "ranges at depth {depth}: {}", ranges.len())?;
                write!(out, "{ranges}")?;
            }
            if *write {
                region::write_domain(&mut *out, &domain)?;
            }
        }
        Commands::Circle { ra, dec, radius } => {
            let mut convex = ConvexRegion::new();
            convex.add(Constraint::cone(Vector3::from_ra_dec(*ra, *dec), radius / 60.0));
            let domain: Domain = std::iter::once(convex).collect();
            region::write_domain(&mut *out, &domain)?;
        }
        Commands::Command { text } => {
            let lookup = Command::parse(text)?.execute()?;
            writeln!(out, "{lookup}")?;
        }
        Commands::SkiplistStats {
            count,
            probability,
            seed,
        } => {
            let seed = seed.unwrap_or_else(rand::random);
            tracing::debug!(seed, count, probability, "filling skip list");
            let mut list = SkipList::with_seed(*probability, seed)?;
            let mut keys = ChaCha8Rng::seed_from_u64(seed.wrapping_add(1));
            for value in 0..Value::try_from(*count)? {
                list.insert(keys.gen_range(0..i64::MAX), value);
            }
            writeln!(out, "keys: {} (level {})", list.len(), list.level())?;
            writeln!(out, "{}", list.stats())?;
        }
    }
    Ok(())
}

fn read_region(path: &Path) -> Result<Domain> {
    let file = File::open(path).map_err(|source| CliError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    RegionReader::new(BufReader::new(file))
        .read_domain()
        .map_err(|source| CliError::Region {
            path: path.to_path_buf(),
            source,
        })
}

fn write_direction<W: Write>(out: &mut W, label: &str, v: &Vector3) -> Result<()> {
    let (ra, dec) = v.to_ra_dec();
    writeln!(out, "{label}: {v}  (ra {ra:.6}, dec {dec:.6})")?;
    Ok(())
}

fn exact<const N: usize>(what: &'static str, values: &[f64]) -> Result<[f64; N]> {
    values.try_into().map_err(|_| CliError::Arity {
        what,
        expected: N,
        found: values.len(),
    })
}
