//! Transcodes meshes into binary STL and hides or extracts a message in the
//! attribute channel.
//!
//! # Usage
//!
//! ```bash
//! # Hide a message while converting PLY to STL
//! stenomesh part.ply -m "serial 0042" -o part.stl
//!
//! # Read it back
//! stenomesh -x part.stl
//!
//! # Merge vertices closer than 0.1% of the shortest edge of the bounding
//! # box and reject parts thinner than 2mm
//! stenomesh part.stl --merge-percent 0.1 --min-size 2 -o merged.stl
//! ```
//!
//! The exit code is 3 if the mesh fails extent validation and 1 for any other
//! failure.

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use nalgebra::Vector3;
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::str::FromStr;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use stenomesh::bounds::ValidationError;
use stenomesh::encoding::{self, stl::StlEncoding};
use stenomesh::prelude::*;

const EXIT_FAILURE: u8 = 1;
const EXIT_VALIDATION: u8 = 3;

/// Hide messages in binary STL
#[derive(Parser, Debug)]
#[command(name = "stenomesh")]
#[command(version, about, long_about = None)]
struct Args {
    /// Input mesh (PLY, binary STL or ASCII STL); reads stdin if omitted
    input: Option<PathBuf>,

    /// Output file; writes stdout if omitted
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Write the embedded message instead of a mesh
    #[arg(short = 'x', long)]
    extract: bool,

    /// Header text of the written STL
    #[arg(short, long)]
    comment: Option<String>,

    /// Message to embed
    #[arg(short, long, conflicts_with = "message_file")]
    message: Option<String>,

    /// File whose contents are embedded as the message
    #[arg(short = 'f', long)]
    message_file: Option<PathBuf>,

    /// Scale applied to written positions (S or X,Y,Z)
    #[arg(short, long, default_value = "1")]
    scale: Axes,

    /// Merge vertices closer than this distance
    #[arg(long, conflicts_with = "merge_percent")]
    merge: Option<f64>,

    /// Merge vertices closer than this percentage of the shortest bounding
    /// box edge
    #[arg(long)]
    merge_percent: Option<f64>,

    /// Fail if the bounding box is smaller than this (S or X,Y,Z)
    #[arg(long)]
    min_size: Option<Axes>,

    /// Embed the message even if it does not fit (it is truncated)
    #[arg(long)]
    force: bool,

    /// Increase log verbosity (repeatable)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

/// Per-axis values given as either `S` or `X,Y,Z`.
#[derive(Clone, Copy, Debug, PartialEq)]
struct Axes(Vector3<f32>);

impl FromStr for Axes {
    type Err = String;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let values = text
            .split(',')
            .map(|value| {
                value
                    .trim()
                    .parse::<f32>()
                    .ok()
                    .filter(|value| value.is_finite())
                    .ok_or_else(|| format!("invalid number `{}`", value.trim()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        match values.as_slice() {
            [value] => Ok(Axes(Vector3::repeat(*value))),
            [x, y, z] => Ok(Axes(Vector3::new(*x, *y, *z))),
            _ => Err(format!(
                "expected one or three values, got {}",
                values.len()
            )),
        }
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            error!("{:#}", error);
            ExitCode::from(exit_code(&error))
        }
    }
}

fn exit_code(error: &anyhow::Error) -> u8 {
    if error.downcast_ref::<ValidationError>().is_some() {
        EXIT_VALIDATION
    }
    else {
        EXIT_FAILURE
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

fn run(args: &Args) -> Result<()> {
    let mut mesh = match &args.input {
        Some(path) => decode(
            BufReader::new(
                File::open(path).with_context(|| format!("failed to open `{}`", path.display()))?,
            ),
            path,
        )?,
        None => decode(io::stdin().lock(), Path::new("<stdin>"))?,
    };
    info!(
        vertices = mesh.vertex_count(),
        faces = mesh.face_count(),
        "read mesh"
    );

    let output = if args.extract {
        let message = mesh.message.take().unwrap_or_default();
        if message.is_empty() {
            warn!("no message found");
        }
        message
    }
    else {
        transcode(args, mesh)?
    };
    // The output is only opened once it is complete, so a failure never
    // truncates an existing file (which may also be the input).
    write_output(args.output.as_deref(), &output)
}

fn transcode(args: &Args, mut mesh: Mesh) -> Result<Vec<u8>> {
    let tolerance = match (args.merge, args.merge_percent) {
        (Some(tolerance), _) => Some(tolerance),
        (None, Some(percentage)) => match mesh.bounding_box() {
            Some(bounds) => Some(bounds.relative_tolerance(percentage)),
            None => {
                warn!("mesh is empty; skipping merge");
                None
            }
        },
        (None, None) => None,
    };
    if let Some(tolerance) = tolerance {
        let report = mesh.merge_vertices(tolerance)?;
        info!(
            tolerance,
            vertices_removed = report.vertices_removed,
            faces_removed = report.faces_removed,
            "merged vertices"
        );
    }

    if let Some(Axes(minimum)) = args.min_size {
        mesh.validate_extent(&minimum)?;
    }

    if let Some(comment) = &args.comment {
        mesh.comment = comment.clone();
    }
    if let Some(message) = &args.message {
        mesh.message = Some(message.clone().into_bytes());
    }
    else if let Some(path) = &args.message_file {
        let message =
            fs::read(path).with_context(|| format!("failed to read `{}`", path.display()))?;
        mesh.message = Some(message);
    }

    let encoding = StlEncoding {
        scale: args.scale.0,
        ignore_capacity: args.force,
    };
    let mut stl = Vec::new();
    let size = mesh.to_stl(&encoding, &mut stl)?;
    info!(size, "encoded binary STL");
    Ok(stl)
}

fn decode<R>(read: R, path: &Path) -> Result<Mesh>
where
    R: BufRead,
{
    encoding::decode(read).with_context(|| format!("failed to decode `{}`", path.display()))
}

fn write_output(path: Option<&Path>, bytes: &[u8]) -> Result<()> {
    match path {
        Some(path) => {
            fs::write(path, bytes).with_context(|| format!("failed to write `{}`", path.display()))
        }
        None => {
            let mut stdout = io::stdout().lock();
            stdout.write_all(bytes)?;
            stdout.flush()?;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use clap::{CommandFactory, Parser};
    use nalgebra::{Point3, Vector3};
    use std::ffi::{OsStr, OsString};
    use std::fs;
    use std::path::Path;
    use stenomesh::encoding::stl::{StlEncoding, ToStl};
    use stenomesh::encoding::EncodingError;
    use stenomesh::mesh::Mesh;
    use tempfile::TempDir;

    use crate::{exit_code, run, Args, Axes, EXIT_FAILURE, EXIT_VALIDATION};

    const TRIANGLE: &[u8] = include_bytes!("../../data/triangle.ply");

    fn stenomesh(arguments: &[&dyn AsRef<OsStr>]) -> Result<()> {
        let arguments = arguments
            .iter()
            .map(|argument| argument.as_ref().to_owned())
            .collect::<Vec<OsString>>();
        let args = Args::try_parse_from([OsString::from("stenomesh")].into_iter().chain(arguments))?;
        run(&args)
    }

    // Unit cube (12 faces) as binary STL.
    fn cube_stl(message: Option<&[u8]>) -> Vec<u8> {
        #[rustfmt::skip]
        let indices = vec![
            0, 2, 1, 0, 3, 2, 4, 5, 6, 4, 6, 7, 0, 1, 5, 0, 5, 4,
            3, 6, 2, 3, 7, 6, 0, 4, 7, 0, 7, 3, 1, 2, 6, 1, 6, 5,
        ];
        let vertices = [
            (0.0, 0.0, 0.0),
            (1.0, 0.0, 0.0),
            (1.0, 1.0, 0.0),
            (0.0, 1.0, 0.0),
            (0.0, 0.0, 1.0),
            (1.0, 0.0, 1.0),
            (1.0, 1.0, 1.0),
            (0.0, 1.0, 1.0),
        ]
        .into_iter()
        .map(|(x, y, z)| Point3::new(x, y, z));
        let mut mesh = Mesh::from_raw_buffers_with_arity(indices, vertices, 3).unwrap();
        mesh.message = message.map(<[u8]>::to_vec);
        let mut stl = Vec::new();
        mesh.to_stl(&StlEncoding::default(), &mut stl).unwrap();
        stl
    }

    fn write(directory: &TempDir, name: &str, bytes: &[u8]) -> std::path::PathBuf {
        let path = directory.path().join(name);
        fs::write(&path, bytes).unwrap();
        path
    }

    fn extract(path: &Path, directory: &TempDir) -> Vec<u8> {
        let message = directory.path().join("message.bin");
        stenomesh(&[&path, &"-x", &"-o", &message]).unwrap();
        fs::read(message).unwrap()
    }

    #[test]
    fn verify_command() {
        Args::command().debug_assert();
    }

    #[test]
    fn parse_axes() {
        assert_eq!(Axes(Vector3::repeat(2.5)), "2.5".parse::<Axes>().unwrap());
        assert_eq!(Axes(Vector3::new(1.0, -2.0, 3.0)), " 1, -2 ,3".parse::<Axes>().unwrap());
        assert!("1,2".parse::<Axes>().is_err());
        assert!("1,x,3".parse::<Axes>().is_err());
        assert!("inf".parse::<Axes>().is_err());
    }

    #[test]
    fn parse_arguments() {
        let args = Args::try_parse_from([
            "stenomesh",
            "part.ply",
            "-m",
            "hello",
            "-s",
            "1,1,2",
            "--merge-percent",
            "0.5",
            "-vv",
        ])
        .unwrap();
        assert_eq!(Some("hello"), args.message.as_deref());
        assert_eq!(Axes(Vector3::new(1.0, 1.0, 2.0)), args.scale);
        assert_eq!(Some(0.5), args.merge_percent);
        assert_eq!(2, args.verbose);
        assert!(!args.extract);
    }

    #[test]
    fn reject_conflicting_arguments() {
        assert!(Args::try_parse_from(["stenomesh", "-m", "a", "-f", "b"]).is_err());
        assert!(Args::try_parse_from(["stenomesh", "--merge", "1", "--merge-percent", "1"]).is_err());
    }

    #[test]
    fn capacity_error_leaves_output_intact() {
        let directory = tempfile::tempdir().unwrap();
        let input = write(&directory, "triangle.ply", TRIANGLE);
        let output = directory.path().join("triangle.stl");
        stenomesh(&[&input, &"-o", &output]).unwrap();
        let stl = fs::read(&output).unwrap();
        assert_eq!(84 + 50, stl.len());

        // Overwrite the input in place with a message that cannot fit.
        let error =
            stenomesh(&[&output, &"-m", &"too long for one triangle", &"-o", &output]).unwrap_err();
        assert!(matches!(
            error.downcast_ref::<EncodingError>(),
            Some(EncodingError::CapacityExceeded { .. })
        ));
        assert_eq!(EXIT_FAILURE, exit_code(&error));
        assert_eq!(stl, fs::read(&output).unwrap());
    }

    #[test]
    fn validation_failure_exit_code() {
        let directory = tempfile::tempdir().unwrap();
        let input = write(&directory, "triangle.ply", TRIANGLE);
        let output = directory.path().join("triangle.stl");
        let error = stenomesh(&[&input, &"--min-size", &"5", &"-o", &output]).unwrap_err();
        assert_eq!(EXIT_VALIDATION, exit_code(&error));
        assert!(!output.exists());
    }

    #[test]
    fn decoded_message_is_carried_through() {
        let directory = tempfile::tempdir().unwrap();
        let input = write(&directory, "cube.stl", &cube_stl(Some(b"keep")));
        let output = directory.path().join("out.stl");

        stenomesh(&[&input, &"-c", &"relabeled", &"-o", &output]).unwrap();
        assert_eq!(b"keep".to_vec(), extract(&output, &directory));
        assert!(fs::read(&output).unwrap().starts_with(b"relabeled"));

        stenomesh(&[&input, &"-m", &"replaced", &"-o", &output]).unwrap();
        assert_eq!(b"replaced".to_vec(), extract(&output, &directory));
    }

    #[test]
    fn extract_writes_raw_message() {
        let directory = tempfile::tempdir().unwrap();
        let input = write(&directory, "cube.stl", &cube_stl(None));
        let payload = write(&directory, "payload.bin", &[0x00, 0xFF, b'\n', 0x80]);
        let output = directory.path().join("out.stl");

        stenomesh(&[&input, &"-f", &payload, &"-o", &output]).unwrap();
        assert_eq!(vec![0x00, 0xFF, b'\n', 0x80], extract(&output, &directory));
        assert!(extract(&input, &directory).is_empty());
    }

    #[test]
    fn merge_percent_skips_empty_mesh() {
        let directory = tempfile::tempdir().unwrap();
        let mut empty = vec![0u8; 80];
        empty.extend_from_slice(&[0, 0, 0, 0]);
        let input = write(&directory, "empty.stl", &empty);
        let output = directory.path().join("out.stl");

        stenomesh(&[&input, &"--merge-percent", &"1", &"-o", &output]).unwrap();
        assert_eq!(empty, fs::read(&output).unwrap());
    }

    #[test]
    fn merge_percent_joins_soup() {
        let directory = tempfile::tempdir().unwrap();
        let input = write(&directory, "cube.stl", &cube_stl(Some(b"merged")));
        let output = directory.path().join("out.stl");

        stenomesh(&[&input, &"--merge-percent", &"0.1", &"-o", &output]).unwrap();
        assert_eq!(cube_stl(Some(b"merged")), fs::read(&output).unwrap());
    }
}
