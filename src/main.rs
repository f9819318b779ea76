//! Bird's-Eye View Renderer
//!
//! Command-line tool that warps a camera image into a top-down view of a
//! reference plane. The camera calibration is read from a YAML file, the
//! plane is given by its normal and a point on it, and the result is
//! written as a PNG.
//!
//! Usage:
//! ```bash
//! cargo run -- \
//!   --camera samples/pinhole.yaml \
//!   --image frame.png \
//!   --plane-normal 0,0,-1 \
//!   --plane-center 0,-1.5,8 \
//!   --output birdseye.png
//! ```

use birdseye_tools::camera::PinholeCamera;
use birdseye_tools::homography::{BirdsEyeView, PlaneReference, ViewOutput};
use clap::Parser;
use log::{info, warn};
use nalgebra::{Point3, Unit, Vector3};
use std::path::PathBuf;

/// Bird's-eye view rendering tool
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the camera calibration YAML file
    #[arg(short = 'c', long)]
    camera: PathBuf,

    /// Path to the source image
    #[arg(short = 'i', long)]
    image: PathBuf,

    /// Reference plane normal as "x,y,z"
    #[arg(long, default_value = "0,0,-1")]
    plane_normal: String,

    /// A point on the reference plane as "x,y,z"
    #[arg(long, default_value = "0,0,10")]
    plane_center: String,

    /// Viewing distance of the virtual top-down camera in meters
    #[arg(short = 'd', long, default_value = "10")]
    distance: f64,

    /// Path of the output PNG
    #[arg(short = 'o', long, default_value = "birdseye.png")]
    output: PathBuf,
}

fn parse_triple(raw: &str) -> Result<[f64; 3], Box<dyn std::error::Error>> {
    let parts: Vec<f64> = raw
        .split(',')
        .map(|p| p.trim().parse::<f64>())
        .collect::<Result<_, _>>()?;
    if parts.len() != 3 {
        return Err(format!("expected three comma-separated values, got '{raw}'").into());
    }
    Ok([parts[0], parts[1], parts[2]])
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let cli = Cli::parse();

    info!("Loading camera calibration from: {}", cli.camera.display());
    let camera = PinholeCamera::load_from_yaml(
        cli.camera
            .to_str()
            .ok_or("camera path is not valid UTF-8")?,
    )?;

    info!("Loading source image from: {}", cli.image.display());
    let source = image::open(&cli.image)?.to_rgba8();

    let normal = parse_triple(&cli.plane_normal)?;
    let center = parse_triple(&cli.plane_center)?;
    let plane = PlaneReference {
        normal: Unit::new_normalize(Vector3::new(normal[0], normal[1], normal[2])),
        center: Point3::new(center[0], center[1], center[2]),
    };

    let mut view = BirdsEyeView::new(cli.distance);
    view.set_plane(Some(plane));
    view.update(&camera);

    match view.render(&camera, Some(&source), source.width(), source.height()) {
        ViewOutput::Raster(raster) => {
            raster.save(&cli.output)?;
            info!("Bird's-eye view written to: {}", cli.output.display());
        }
        ViewOutput::PassThrough => {
            warn!("no reference plane configured, source image left untouched");
            source.save(&cli.output)?;
        }
        ViewOutput::Clear => {
            warn!("view is degenerate or the camera has no intrinsics, writing a blank frame");
            let blank = image::RgbaImage::new(source.width(), source.height());
            blank.save(&cli.output)?;
        }
    }

    Ok(())
}
