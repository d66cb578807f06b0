use std::{
    env,
    ffi::OsString,
    path::{Path, PathBuf},
};

use anyhow::anyhow;
use wristcam::{
    config::DetectionConfig,
    detection_loop::{CancelToken, DetectionLoop},
    error::SetupError,
    gui::{self, RepaintScheduler, WindowCanvas},
    pose::movenet::MoveNet,
    video::{
        webcam::{Webcam, WebcamOptions},
        FrameSource, StillImage,
    },
};

const USAGE: &str = "usage: wristcam [MODEL.onnx] [IMAGE] (MODEL may also be set with WRISTCAM_MODEL)";

fn main() {
    wristcam::init_logger!();

    gui::run(app);
}

fn app() -> anyhow::Result<()> {
    let (model, image) = parse_args(env::args_os().skip(1), env::var_os("WRISTCAM_MODEL"))?;
    let config = DetectionConfig::from_env()?;
    let estimator = MoveNet::load(&model)?;

    // The loop runs on this thread, so the webcam never has to cross threads.
    let source: Box<dyn FrameSource> = match image {
        Some(path) => Box::new(StillImage::load(path)?),
        None => Box::new(Webcam::open(WebcamOptions::default()).map_err(SetupError::from)?),
    };

    let detection = DetectionLoop::new(
        source,
        estimator,
        WindowCanvas::new("wristcam"),
        RepaintScheduler::new(),
        config,
    )?;
    detection.run(&CancelToken::new());
    Ok(())
}

/// Splits the command line into the model path and an optional still image.
///
/// The model argument can be omitted when `WRISTCAM_MODEL` is set.
fn parse_args<I>(args: I, env_model: Option<OsString>) -> anyhow::Result<(PathBuf, Option<PathBuf>)>
where
    I: IntoIterator<Item = OsString>,
{
    let mut args = args.into_iter().map(PathBuf::from);
    let first = args.next();
    let (model, image) = match first {
        Some(path) if is_model(&path) => (Some(path), args.next()),
        other => (env_model.map(PathBuf::from), other),
    };
    if let Some(extra) = args.next() {
        anyhow::bail!("unexpected argument '{}'\n{USAGE}", extra.display());
    }
    let model = model.ok_or_else(|| anyhow!("{USAGE}"))?;
    Ok((model, image))
}

fn is_model(path: &Path) -> bool {
    path.extension().map_or(false, |ext| ext == "onnx")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(args: &[&str]) -> Vec<OsString> {
        args.iter().map(OsString::from).collect()
    }

    #[test]
    fn model_and_image() {
        let (model, image) = parse_args(args(&["movenet.onnx", "me.jpg"]), None).unwrap();
        assert_eq!(model, PathBuf::from("movenet.onnx"));
        assert_eq!(image, Some(PathBuf::from("me.jpg")));
    }

    #[test]
    fn model_from_env() {
        let (model, image) =
            parse_args(args(&["me.png"]), Some("/models/movenet.onnx".into())).unwrap();
        assert_eq!(model, PathBuf::from("/models/movenet.onnx"));
        assert_eq!(image, Some(PathBuf::from("me.png")));

        let (model, image) = parse_args(args(&[]), Some("m.onnx".into())).unwrap();
        assert_eq!(model, PathBuf::from("m.onnx"));
        assert_eq!(image, None);
    }

    #[test]
    fn missing_model() {
        assert!(parse_args(args(&[]), None).is_err());
        assert!(parse_args(args(&["me.jpg"]), None).is_err());
        assert!(parse_args(args(&["m.onnx", "a.jpg", "b.jpg"]), None).is_err());
    }
}
