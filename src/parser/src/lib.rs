use std::{
    error::Error,
    fs::File,
    path::{Path, PathBuf},
    ffi::OsStr,
    fmt::{self, Display, Formatter},
};

use located_error::*;

use clap::{Parser, Subcommand};
use serde::{Serialize, Deserialize};
use log::debug;
use anyhow::{anyhow, Result};

mod error;
pub use error::ParserError;

#[derive(Parser, Debug, Serialize, Deserialize)]
#[clap(name="vbwt", author, version, about, long_about = None)]
#[clap(propagate_version = true)]
/// Population reference graph indexer and approximate read mapper.
pub struct Cli {
    /// Set the verbosity level (-v -vv -vvv)
    ///
    /// -v: Info  |  -vv: Debug  | -vvv: Trace {n}
    ///
    /// Note that the program will still output warnings by default, even when this flag is off.
    /// Use --quiet/-q to disable them.
    #[clap(short='v', long, parse(from_occurrences), global=true)]
    pub verbose: u8,

    /// Disable warnings.
    ///
    /// By default, warnings are emitted and redirected to the console, even when verbose mode is
    /// off. Use this argument to disable this. Only errors will be displayed.
    #[clap(short='q', long, global=true)]
    pub quiet: bool,

    #[clap(subcommand)]
    pub commands: Commands,
}

impl Cli {
    /// Serialize command line arguments within a `.yaml` file.
    ///
    /// # Behavior
    /// - File naming follows the convention '{current time}-{module name}.yaml'. current time
    ///   follows the format `YYYY`-`MM`-`DD`T`hhmmss`
    /// - File is written at the root of the subcommand's own build/output directory.
    ///
    /// # Errors
    /// Sends an unrecoverable error if `serde_yaml` fails to parse `Self` to a string.
    pub fn serialize(&self) -> Result<(), Box<dyn Error>> {
        let serialized = serde_yaml::to_string(&self)
            .map_err(|err| format!("Failed to serialize command line arguments. got [{err}]"))?;

        debug!("\n---- Command line args ----\n{}\n---", serialized);

        let current_time = chrono::offset::Local::now().format("%Y-%m-%dT%H%M%S").to_string();

        let output_file = match &self.commands {
            Commands::Build {common, build: _} => {
                let dir_string = common.build_dir.to_str().expect("Invalid characters in directory");
                format!("{dir_string}/{current_time}-build.yaml")
            },
            Commands::Genotype {common, genotype} => {
                let dir_string = genotype.output_dir.to_str()
                    .unwrap_or_else(|| common.build_dir.to_str().expect("Invalid characters in directory"));
                format!("{dir_string}/{current_time}-genotype.yaml")
            },
            Commands::FromYaml {yaml: _} => return Ok(()),
        };

        match std::fs::write(&output_file, serialized) {
            Err(e) => Err(format!("Unable to serialize arguments into {output_file}: [{e}]").into()),
            Ok(()) => Ok(()),
        }
    }

    /// Deserialize a `.yaml` file into Command line arguments.
    ///
    /// # Errors
    /// - Returns `FileNotFound` or `PermissionDenied` if the provided `.yaml` is invalid, or does
    ///   not carry read permissions
    /// - Sends an unrecoverable error if `serde_yaml` fails to parse the provided file to `Self`.
    pub fn deserialize(yaml: PathBuf) -> Result<Self, Box<dyn Error>> {
        Ok(serde_yaml::from_reader(File::open(yaml)?)?)
    }
}

#[derive(Subcommand, Debug, Serialize, Deserialize)]
pub enum Commands {
    /// Normalise a PRG, build its coverage graph, FM-index and k-mer index.
    Build {
        #[clap(flatten)]
        common: Common,
        #[clap(flatten)]
        build: BuildArgs,
    },

    /// Map a set of reads against a previously built index and summarise coverage.
    Genotype {
        #[clap(flatten)]
        common: Common,
        #[clap(flatten)]
        genotype: GenotypeArgs,
    },

    /// Run this program using a previously generated .yaml configuration file.
    ///
    /// This allows users to easily re-apply an invocation using the exact same parameters and
    /// arguments.
    FromYaml {
        yaml: PathBuf,
    },
}

#[derive(Parser, Debug, Serialize, Deserialize)]
pub struct Common {
    /// Directory holding (or receiving) the built index artefacts: the normalised PRG, the
    /// FM-index, the bitmap masks and the k-mer index.
    #[clap(short='B', long, parse(try_from_os_str=valid_output_dir))]
    pub build_dir: PathBuf,

    /// Maximum number of worker threads to use for the parallel-over-reads map phase, or for
    /// k-mer index precomputation during `build`.
    #[clap(short='@', long, default_value("1"))]
    pub threads: usize,

    /// Seed the PRNG used to break multi-mapping ties. Picked at random when unset.
    #[clap(long, required(false), default_value_t=fastrand::u64(u64::MIN..=u64::MAX))]
    pub seed: u64,

    /// Length of the k-mers precomputed and cached to seed read mapping at `build` time, and
    /// checked against the loaded index at `genotype` time.
    #[clap(short, long, default_value("31"))]
    pub kmer_size: usize,
}

/// Build-time flags: the PRG to index.
#[derive(Parser, Debug, Serialize, Deserialize)]
pub struct BuildArgs {
    /// Path to the PRG to index.
    ///
    /// Accepts either a human-readable bracket-notation file (`[A,C[A,T]]`) or a raw
    /// little-endian 4-byte-integer encoded PRG.
    #[clap(short, long, parse(try_from_os_str=valid_input_file))]
    pub prg: PathBuf,

    /// Overwrite an existing build directory's artefacts.
    #[clap(short='w', long)]
    pub overwrite: bool,
}

/// Genotype-time flags: the reads to map and the mapping parameters.
#[derive(Parser, Debug, Serialize, Deserialize)]
pub struct GenotypeArgs {
    /// Input read file(s) (FASTQ).
    #[clap(short, long, multiple_values(true), parse(try_from_os_str=valid_input_file))]
    pub reads: Vec<PathBuf>,

    /// Reads longer than this are rejected rather than truncated.
    #[clap(short='M', long, default_value("150"))]
    pub max_read_size: usize,

    /// Ploidy assumed by the downstream coverage summary.
    #[clap(long, default_value("2"))]
    pub ploidy: u8,

    /// Output directory for the coverage summary and read statistics.
    #[clap(short, long, default_value("vbwt-output"), parse(try_from_os_str=valid_output_dir))]
    pub output_dir: PathBuf,

    /// Overwrite existing output files.
    #[clap(short='w', long)]
    pub overwrite: bool,
}

impl Common {
    /// # Errors
    /// if `--kmer-size` is zero.
    pub fn check_kmer_size(&self) -> Result<(), ParserError> {
        if self.kmer_size == 0 {
            return Err(ParserError::InvalidKmerSize)
        }
        Ok(())
    }
}

impl GenotypeArgs {
    /// # Errors
    /// if `--ploidy` is zero.
    pub fn check_ploidy(&self) -> Result<(), ParserError> {
        if self.ploidy == 0 {
            return Err(ParserError::InvalidPloidy)
        }
        Ok(())
    }

    /// Check if a given output file already exists; raise an error if such is the case and the
    /// user did not explicitly allow overwriting.
    ///
    /// # Errors
    /// - If the provided `pathbuf` already exists and `--overwrite` was not specified.
    pub fn can_write_file(&self, pathbuf: &Path) -> Result<bool> {
        if !self.overwrite && pathbuf.exists() {
            return Err(ParserError::CannotOverwrite(pathbuf.display().to_string()))
                .loc("While parsing command line arguments")
        }
        Ok(true)
    }
}

#[derive(Debug, Clone, Copy)]
pub enum FileEntity {File, Directory}

impl Display for FileEntity {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Self::File      => write!(f, "File"),
            Self::Directory => write!(f, "Directory"),
        }
    }
}

impl FileEntity {
    fn validate(&self, path: &Path) -> Result<(), ParserError> {
        use ParserError::InvalidFileEntity;
        let valid = match self {
            Self::File      => path.is_file(),
            Self::Directory => path.is_dir()
        };

        if valid {
            Ok(())
        } else {
            Err(InvalidFileEntity(*self, path.display().to_string()))
        }
    }
}

fn assert_filesystem_entity_is_valid(s: &OsStr, entity: &FileEntity) -> Result<()> {
    use ParserError::MissingFileEntity;
    let path = Path::new(s);
    if ! path.exists() {
        return Err(MissingFileEntity(*entity, path.display().to_string()))
            .loc("While parsing arguments.")
    }

    entity.validate(path).loc("While parsing arguments.")
}

fn valid_input_file(s: &OsStr) -> Result<PathBuf> {
    assert_filesystem_entity_is_valid(s, &FileEntity::File)
        .loc("While checking for file validity")?;
    Ok(PathBuf::from(s))
}

fn valid_output_dir(s: &OsStr) -> Result<PathBuf> {
    if ! Path::new(s).exists() {
        std::fs::create_dir_all(s)?;
    }
    assert_filesystem_entity_is_valid(s, &FileEntity::Directory)
        .loc("While checking for directory validity")?;
    Ok(PathBuf::from(s))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::IntoApp;

    #[test]
    fn cli_parses_build_subcommand() {
        Cli::into_app().debug_assert();
    }

    #[test]
    fn file_entity_display_matches_kind() {
        assert_eq!(FileEntity::File.to_string(), "File");
        assert_eq!(FileEntity::Directory.to_string(), "Directory");
    }
}
