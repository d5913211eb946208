//! Primary backend: libvpx-vp9 constrained quality through ffmpeg.

use vc_core::{EncodingPlan, FrameRate, Resolution};

use super::{path_arg, AttemptPaths, EncoderBackend, Invocation};
use crate::tools::FFMPEG;

/// VP9 in WebM with a CRF target capped by a bitrate, optionally two-pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct Vp9Encoder;

impl Vp9Encoder {
    fn video_args(plan: &EncodingPlan, paths: &AttemptPaths<'_>) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "-hide_banner".into(),
            "-nostdin".into(),
            "-y".into(),
            "-i".into(),
            path_arg(paths.input),
            "-c:v".into(),
            "libvpx-vp9".into(),
            "-crf".into(),
            plan.quality.to_string(),
            "-b:v".into(),
            format!("{}k", plan.target_bitrate_kbps),
            "-deadline".into(),
            "good".into(),
            "-cpu-used".into(),
            "4".into(),
            "-row-mt".into(),
            "1".into(),
            "-auto-alt-ref".into(),
            "0".into(),
        ];

        if let Resolution::Fixed { width, height } = plan.resolution {
            args.push("-vf".into());
            args.push(format!("scale={width}:{height}"));
        }
        if let FrameRate::Fixed(fps) = plan.frame_rate {
            args.push("-r".into());
            args.push(fps.to_string());
        }
        args
    }
}

impl EncoderBackend for Vp9Encoder {
    fn name(&self) -> &'static str {
        "ffmpeg-vp9"
    }

    fn tool(&self) -> &'static str {
        FFMPEG
    }

    fn invocations(&self, plan: &EncodingPlan, paths: AttemptPaths<'_>) -> Vec<Invocation> {
        let base = Self::video_args(plan, &paths);
        let output_args = [
            "-c:a".to_string(),
            "libopus".to_string(),
            "-f".to_string(),
            "webm".to_string(),
            path_arg(paths.output),
        ];

        if !plan.two_pass {
            let mut args = base;
            args.extend(output_args);
            return vec![Invocation {
                label: "single pass".into(),
                args,
                span: (0.0, 100.0),
            }];
        }

        let passlog = path_arg(paths.passlog_prefix);

        let mut first = base.clone();
        first.extend(
            ["-pass", "1", "-passlogfile", passlog.as_str(), "-an", "-f", "null", "-"]
                .map(String::from),
        );

        let mut second = base;
        second.extend(["-pass", "2", "-passlogfile", passlog.as_str()].map(String::from));
        second.extend(output_args);

        vec![
            Invocation {
                label: "pass 1/2".into(),
                args: first,
                span: (0.0, 50.0),
            },
            Invocation {
                label: "pass 2/2".into(),
                args: second,
                span: (50.0, 100.0),
            },
        ]
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use vc_core::PresetName;

    use super::*;

    fn paths() -> AttemptPaths<'static> {
        AttemptPaths {
            input: Path::new("/up/in.mp4"),
            output: Path::new("/scratch/output.webm"),
            passlog_prefix: Path::new("/scratch/passlog"),
        }
    }

    fn joined(inv: &Invocation) -> String {
        inv.args.join(" ")
    }

    #[test]
    fn web_standard_is_single_pass_at_source_size() {
        let plan = EncodingPlan::for_preset(PresetName::WebStandard).unwrap();
        let runs = Vp9Encoder.invocations(&plan, paths());
        assert_eq!(runs.len(), 1);
        let cmd = joined(&runs[0]);
        assert!(cmd.contains("-i /up/in.mp4"));
        assert!(cmd.contains("-c:v libvpx-vp9 -crf 32 -b:v 2000k"));
        assert!(!cmd.contains("-vf"));
        assert!(!cmd.contains(" -r "));
        assert!(!cmd.contains("-pass"));
        assert!(cmd.ends_with("-f webm /scratch/output.webm"));
        assert_eq!(runs[0].span, (0.0, 100.0));
    }

    #[test]
    fn high_quality_runs_two_passes() {
        let plan = EncodingPlan::for_preset(PresetName::HighQuality).unwrap();
        let runs = Vp9Encoder.invocations(&plan, paths());
        assert_eq!(runs.len(), 2);

        let first = joined(&runs[0]);
        assert!(first.contains("-crf 18 -b:v 4000k"));
        assert!(first.contains("-vf scale=1920:1080"));
        assert!(first.contains("-r 30"));
        assert!(first.contains("-pass 1 -passlogfile /scratch/passlog"));
        assert!(first.ends_with("-an -f null -"));
        assert!(!first.contains("output.webm"));
        assert_eq!(runs[0].span, (0.0, 50.0));

        let second = joined(&runs[1]);
        assert!(second.contains("-pass 2 -passlogfile /scratch/passlog"));
        assert!(second.ends_with("-f webm /scratch/output.webm"));
        assert_eq!(runs[1].span, (50.0, 100.0));
    }

    #[test]
    fn last_argument_is_the_output_target() {
        let plan = EncodingPlan::for_preset(PresetName::MaxCompression).unwrap();
        let runs = Vp9Encoder.invocations(&plan, paths());
        assert_eq!(runs[0].args.last().map(String::as_str), Some("-"));
        assert_eq!(
            runs[1].args.last().map(String::as_str),
            Some("/scratch/output.webm")
        );
    }
}
