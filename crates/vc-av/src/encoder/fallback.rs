//! Fallback backend: single-pass, bitrate-targeted VP9 at realtime speed.
//!
//! Its parameter mapping is independent of the primary backend's.

use vc_core::{EncodingPlan, FrameRate, Resolution};

use super::{path_arg, AttemptPaths, EncoderBackend, Invocation};
use crate::tools::FALLBACK_ENCODER;

const THREADS: &str = "4";

#[derive(Debug, Clone, Copy, Default)]
pub struct RealtimeVp9Encoder;

impl EncoderBackend for RealtimeVp9Encoder {
    fn name(&self) -> &'static str {
        "ffmpeg-vp9-realtime"
    }

    fn tool(&self) -> &'static str {
        FALLBACK_ENCODER
    }

    /// Two-pass and the quality knob are ignored; only the bitrate drives
    /// rate control.
    fn invocations(&self, plan: &EncodingPlan, paths: AttemptPaths<'_>) -> Vec<Invocation> {
        let mut args: Vec<String> = vec![
            "-hide_banner".into(),
            "-nostdin".into(),
            "-y".into(),
            "-i".into(),
            path_arg(paths.input),
            "-c:v".into(),
            "libvpx-vp9".into(),
            "-b:v".into(),
            format!("{}k", plan.target_bitrate_kbps),
            "-deadline".into(),
            "realtime".into(),
            "-cpu-used".into(),
            "8".into(),
            "-threads".into(),
            THREADS.into(),
        ];

        if let Resolution::Fixed { width, height } = plan.resolution {
            args.push("-s".into());
            args.push(format!("{width}x{height}"));
        }
        if let FrameRate::Fixed(fps) = plan.frame_rate {
            args.push("-r".into());
            args.push(fps.to_string());
        }

        args.extend(
            ["-c:a", "libopus", "-f", "webm"]
                .into_iter()
                .map(String::from),
        );
        args.push(path_arg(paths.output));

        vec![Invocation {
            label: "fallback".into(),
            args,
            span: (0.0, 100.0),
        }]
    }
}
