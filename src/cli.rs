use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use sovits_agent::application::{
    ClearCommand, InferCommand, PreprocessCommand, SliceCommand, TrainCommand,
};
use sovits_agent::domain::{
    ClearTarget, EndpointAddress, Precision, TrainOverrides, F0_PREDICTOR_INFER_DEFAULT,
    F0_PREDICTOR_PREPROCESS_DEFAULT, SPEECH_ENCODER_DEFAULT,
};

#[derive(Debug, Parser, Clone)]
#[command(name = "sovits-agent")]
#[command(about = "Run so-vits-svc pipeline steps locally or on a remote worker")]
pub struct Cli {
    /// Configuration file (defaults to config.toml / config.local.toml).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Remote worker, as `host,port` or `host:port`.
    #[arg(long, global = true, value_parser = parse_endpoint)]
    pub remote: Option<EndpointAddress>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Slice voice files into the dataset.
    Slice(SliceArgs),
    /// Resample, build file lists and extract features.
    Preprocess(PreprocessArgs),
    /// Start or resume training.
    Train(TrainArgs),
    /// Convert voice files with the latest model.
    Infer(InferArgs),
    /// Clear the output of a pipeline step.
    Clear(ClearArgs),
    /// List speakers in the training config.
    Speakers,
    /// Retrieve inference results from the remote worker.
    Results,
}

#[derive(Debug, Args, Clone)]
pub struct SliceArgs {
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    #[arg(long, default_value = "")]
    pub speaker: String,

    /// Minimum silence interval in ms.
    #[arg(long)]
    pub min_interval: Option<u32>,
}

#[derive(Debug, Args, Clone)]
pub struct PreprocessArgs {
    #[arg(long, default_value = SPEECH_ENCODER_DEFAULT)]
    pub encoder: String,

    #[arg(long, default_value = F0_PREDICTOR_PREPROCESS_DEFAULT)]
    pub f0_predictor: String,

    #[arg(long)]
    pub loudness_embedding: bool,
}

#[derive(Debug, Args, Clone)]
pub struct TrainArgs {
    #[arg(long, default_value_t = 0)]
    pub gpu: u32,

    #[arg(long, default_value_t = 50)]
    pub log_interval: u32,

    #[arg(long, default_value_t = 200)]
    pub eval_interval: u32,

    #[arg(long, default_value_t = 4)]
    pub batch_size: u32,

    #[arg(long, value_enum, default_value_t = PrecisionArg::Fp32)]
    pub precision: PrecisionArg,

    #[arg(long, default_value_t = 1)]
    pub keep_ckpts: u32,

    #[arg(long)]
    pub all_in_mem: bool,
}

#[derive(Debug, Args, Clone)]
pub struct InferArgs {
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    #[arg(long)]
    pub speaker: String,

    #[arg(long, default_value_t = 0)]
    pub gpu: u32,

    #[arg(long, default_value = F0_PREDICTOR_INFER_DEFAULT)]
    pub f0_predictor: String,

    #[arg(long)]
    pub nsf_hifigan: bool,

    /// Pitch shift in semitones.
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    pub pitch_shift: i32,

    /// Forced slice length in seconds, 0 for automatic.
    #[arg(long, default_value_t = 0.0)]
    pub clip: f32,
}

#[derive(Debug, Args, Clone)]
pub struct ClearArgs {
    #[arg(value_enum)]
    pub target: ClearArg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PrecisionArg {
    Fp32,
    Fp16,
    Bf16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ClearArg {
    Slice,
    Preprocess,
    Train,
}

fn parse_endpoint(input: &str) -> Result<EndpointAddress, String> {
    EndpointAddress::parse(input).map_err(|e| e.to_string())
}

impl From<PrecisionArg> for Precision {
    fn from(arg: PrecisionArg) -> Self {
        match arg {
            PrecisionArg::Fp32 => Precision::Fp32,
            PrecisionArg::Fp16 => Precision::Fp16,
            PrecisionArg::Bf16 => Precision::Bf16,
        }
    }
}

impl From<ClearArg> for ClearTarget {
    fn from(arg: ClearArg) -> Self {
        match arg {
            ClearArg::Slice => ClearTarget::Slice,
            ClearArg::Preprocess => ClearTarget::Preprocess,
            ClearArg::Train => ClearTarget::Train,
        }
    }
}

impl From<SliceArgs> for SliceCommand {
    fn from(args: SliceArgs) -> Self {
        Self {
            files: args.files,
            speaker: args.speaker,
            min_interval: args.min_interval,
        }
    }
}

impl From<PreprocessArgs> for PreprocessCommand {
    fn from(args: PreprocessArgs) -> Self {
        Self {
            encoder: args.encoder,
            f0_predictor: args.f0_predictor,
            loudness_embedding: args.loudness_embedding,
        }
    }
}

impl From<TrainArgs> for TrainCommand {
    fn from(args: TrainArgs) -> Self {
        Self {
            gpu_id: args.gpu,
            overrides: TrainOverrides {
                log_interval: args.log_interval,
                eval_interval: args.eval_interval,
                batch_size: args.batch_size,
                precision: args.precision.into(),
                keep_ckpts: args.keep_ckpts,
                all_in_mem: args.all_in_mem,
            },
        }
    }
}

impl From<InferArgs> for InferCommand {
    fn from(args: InferArgs) -> Self {
        Self {
            gpu_id: args.gpu,
            f0_predictor: args.f0_predictor,
            nsf_hifigan: args.nsf_hifigan,
            pitch_shift: args.pitch_shift,
            clip: args.clip,
            ..InferCommand::new(args.files, args.speaker)
        }
    }
}

impl From<ClearArgs> for ClearCommand {
    fn from(args: ClearArgs) -> Self {
        Self {
            target: args.target.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_global_remote_after_subcommand() {
        let cli = Cli::try_parse_from(["sovits-agent", "speakers", "--remote", "gpu-box,23332"])
            .unwrap();
        assert_eq!(cli.remote, Some(EndpointAddress::new("gpu-box", 23332)));
        assert!(matches!(cli.command, Command::Speakers));
    }

    #[test]
    fn test_parse_infer_defaults() {
        let cli = Cli::try_parse_from([
            "sovits-agent",
            "infer",
            "a.wav",
            "--speaker",
            "alice",
            "--pitch-shift",
            "-3",
        ])
        .unwrap();
        let Command::Infer(args) = cli.command else {
            panic!("expected infer");
        };
        let cmd = InferCommand::from(args);
        assert_eq!(cmd.f0_predictor, F0_PREDICTOR_INFER_DEFAULT);
        assert_eq!(cmd.pitch_shift, -3);
        assert_eq!(cmd.files, vec![PathBuf::from("a.wav")]);
    }

    #[test]
    fn test_parse_train_overrides() {
        let cli =
            Cli::try_parse_from(["sovits-agent", "train", "--gpu", "1", "--precision", "bf16"])
                .unwrap();
        let Command::Train(args) = cli.command else {
            panic!("expected train");
        };
        let cmd = TrainCommand::from(args);
        assert_eq!(cmd.gpu_id, 1);
        assert_eq!(cmd.overrides.precision, Precision::Bf16);
        assert_eq!(cmd.overrides.batch_size, 4);
    }

    #[test]
    fn test_rejects_bad_endpoint_and_target() {
        assert!(Cli::try_parse_from(["sovits-agent", "speakers", "--remote", "nowhere"]).is_err());
        assert!(Cli::try_parse_from(["sovits-agent", "clear", "everything"]).is_err());
        assert!(Cli::try_parse_from(["sovits-agent", "slice"]).is_err());
    }
}
