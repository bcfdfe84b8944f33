use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
/// Sky HTM - Hierarchical Triangular Mesh lookups, region files and index diagnostics
pub struct Cli {
    /// Log debug output (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Find the trixel holding a position
    #[clap(allow_negative_numbers = true)]
    Lookup {
        /// Right ascension in degrees
        #[arg(required_unless_present = "xyz", requires = "dec")]
        ra: Option<f64>,
        /// Declination in degrees
        dec: Option<f64>,
        /// Direction given as Cartesian components instead
        #[arg(long, num_args = 3, value_names = ["X", "Y", "Z"], conflicts_with = "ra")]
        xyz: Option<Vec<f64>>,
        /// Mesh depth
        #[arg(short, long, default_value_t = 5)]
        depth: usize,
    },

    /// Decode a packed trixel ID into its name
    Name { id: u64 },

    /// Encode a trixel name into its packed ID
    Id { name: String },

    /// Print the corners and centre of a trixel
    Triangle { name: String },

    /// Parse a region descriptor file and summarize it
    #[clap(allow_negative_numbers = true)]
    Region {
        file: PathBuf,
        /// Report whether the region holds this position (degrees)
        #[arg(long, num_args = 2, value_names = ["RA", "DEC"])]
        contains: Option<Vec<f64>>,
        /// Print the region back in normalized form
        #[arg(long)]
        write: bool,
        /// List the trixel ranges covering the region at this depth
        #[arg(short, long)]
        depth: Option<usize>,
    },

    /// Emit a one-cone region descriptor
    #[clap(allow_negative_numbers = true)]
    Circle {
        /// Right ascension of the centre in degrees
        ra: f64,
        /// Declination of the centre in degrees
        dec: f64,
        /// Radius in arcminutes
        radius: f64,
    },

    /// Run a textual lookup command, e.g. "J2000 6 41.2 -12.5"
    Command { text: String },

    /// Fill a skip list with random keys and print its level histogram
    SkiplistStats {
        /// Number of keys to insert
        #[arg(long, default_value_t = 10_000)]
        count: usize,
        /// Promotion probability
        #[arg(long, default_value_t = 0.5)]
        probability: f64,
        /// Seed for reproducible levels and keys
        #[arg(long)]
        seed: Option<u64>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_lookup_forms() {
        let cli = Cli::parse_from(["sky-htm", "lookup", "10.5", "-20", "--depth", "7"]);
        match cli.command {
            Commands::Lookup { ra, dec, xyz, depth } => {
                assert_eq!((ra, dec, xyz, depth), (Some(10.5), Some(-20.0), None, 7));
            }
            other => panic!("unexpected {other:?}"),
        }

        let cli = Cli::parse_from(["sky-htm", "lookup", "--xyz", "0", "0", "-1"]);
        match cli.command {
            Commands::Lookup { ra, xyz, .. } => {
                assert_eq!(ra, None);
                assert_eq!(xyz, Some(vec![0.0, 0.0, -1.0]));
            }
            other => panic!("unexpected {other:?}"),
        }

        assert!(Cli::try_parse_from(["sky-htm", "lookup"]).is_err());
    }

    #[test]
    fn test_parse_region_flags() {
        let cli = Cli::parse_from([
            "sky-htm", "-v", "region", "q.txt", "--contains", "120", "-45", "--write", "-d", "6",
        ]);
        assert!(cli.verbose);
        match cli.command {
            Commands::Region {
                file,
                contains,
                write,
                depth,
            } => {
                assert_eq!(file, PathBuf::from("q.txt"));
                assert_eq!(contains, Some(vec![120.0, -45.0]));
                assert!(write);
                assert_eq!(depth, Some(6));
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
