//! `imgtrain`: train an image classifier from a CSV manifest, then score it.

use std::path::PathBuf;

use imgtrain::config::{ScheduleSettings, TrainSettings, load_settings};
use imgtrain::logging;
use imgtrain::ml::{Evaluation, MlpClassifier, MlpOptions};
use imgtrain::train::ImageClassifierTrainer;

fn main() {
    if let Err(err) = run() {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let options = parse_args(std::env::args().skip(1).collect())?;
    if let Err(err) = logging::init("info") {
        eprintln!("Logging disabled: {err}");
    }
    let mut settings = match &options.config {
        Some(path) => load_settings(path).map_err(|err| err.to_string())?,
        None => TrainSettings::default(),
    };
    options.apply(&mut settings);

    let model = MlpClassifier::new(MlpOptions {
        hidden_size: settings.model.hidden_size,
        l2_penalty: settings.model.l2_penalty,
        learning_rate: initial_rate(settings.training.schedule),
        seed: settings.training.seed,
    });
    let mut trainer =
        ImageClassifierTrainer::new(model, settings).map_err(|err| err.to_string())?;
    println!(
        "Loaded {} train / {} test images of shape {} across {} classes",
        trainer.train_frame().len(),
        trainer.test_frame().len(),
        trainer.input_shape(),
        trainer.n_classes()
    );

    let report = trainer.fit().map_err(|err| err.to_string())?;
    if let Some(last) = report.history.last() {
        println!(
            "final epoch: loss={:.4} accuracy={:.4} val_loss={:.4} val_accuracy={:.4}",
            last.loss, last.accuracy, last.val_loss, last.val_accuracy
        );
    }
    if let Some(path) = &report.best_checkpoint {
        println!("best checkpoint: {}", path.display());
    }

    let evaluation = trainer.score().map_err(|err| err.to_string())?;
    print_evaluation(&evaluation, trainer.encoder().classes());
    Ok(())
}

fn initial_rate(schedule: ScheduleSettings) -> f32 {
    match schedule {
        ScheduleSettings::Step { base_rate } => base_rate,
        ScheduleSettings::Constant { rate } => rate,
    }
}

fn print_evaluation(evaluation: &Evaluation, classes: &[String]) {
    println!("test loss: {:.4}", evaluation.loss);
    println!("test accuracy: {:.4}", evaluation.accuracy);
    for (idx, stats) in evaluation.per_class.iter().enumerate() {
        let name = classes.get(idx).map_or("?", String::as_str);
        println!(
            "class {:>2} {:<16}  precision={:.3}  recall={:.3}  f1={:.3}  support={}",
            idx, name, stats.precision, stats.recall, stats.f1, stats.support
        );
    }
    let cm = &evaluation.confusion;
    println!("confusion matrix (rows=true, cols=pred):");
    for truth in 0..cm.n_classes {
        let mut row = String::new();
        for pred in 0..cm.n_classes {
            row.push_str(&format!("{:6}", cm.get(truth, pred)));
        }
        println!("{row}");
    }
}

#[derive(Debug, Clone, Default)]
struct CliOptions {
    config: Option<PathBuf>,
    manifest: Option<PathBuf>,
    label_column: Option<String>,
    header: Option<usize>,
    epochs: Option<usize>,
    batch_size: Option<usize>,
    train_size: Option<f64>,
    n_classes: Option<usize>,
    workers: Option<usize>,
    seed: Option<u64>,
    hidden_size: Option<usize>,
    learning_rate: Option<f32>,
    checkpoint_dir: Option<PathBuf>,
    no_augment: bool,
    no_normalize: bool,
    no_balance: bool,
}

impl CliOptions {
    /// Command-line flags win over the config file.
    fn apply(&self, settings: &mut TrainSettings) {
        if let Some(manifest) = &self.manifest {
            settings.data.manifest = manifest.clone();
        }
        if let Some(column) = &self.label_column {
            settings.data.label_column = Some(column.clone());
        }
        if let Some(header) = self.header {
            settings.data.header = header;
        }
        if let Some(train_size) = self.train_size {
            settings.data.train_size = train_size;
        }
        if let Some(epochs) = self.epochs {
            settings.training.epochs = epochs;
        }
        if let Some(batch_size) = self.batch_size {
            settings.training.batch_size = batch_size;
        }
        if let Some(n_classes) = self.n_classes {
            settings.training.n_classes = Some(n_classes);
        }
        if let Some(workers) = self.workers {
            settings.training.workers = workers;
        }
        if let Some(seed) = self.seed {
            settings.training.seed = seed;
        }
        if let Some(hidden) = self.hidden_size {
            settings.model.hidden_size = hidden;
        }
        if let Some(rate) = self.learning_rate {
            settings.training.schedule = match settings.training.schedule {
                ScheduleSettings::Step { .. } => ScheduleSettings::Step { base_rate: rate },
                ScheduleSettings::Constant { .. } => ScheduleSettings::Constant { rate },
            };
        }
        if let Some(dir) = &self.checkpoint_dir {
            settings.training.checkpoint_dir = Some(dir.clone());
        }
        if self.no_augment {
            settings.training.augment = false;
        }
        if self.no_normalize {
            settings.data.normalize = false;
        }
        if self.no_balance {
            settings.data.balance = false;
        }
    }
}

fn parse_args(args: Vec<String>) -> Result<CliOptions, String> {
    let mut options = CliOptions::default();
    let mut idx = 0usize;
    while idx < args.len() {
        let flag = args[idx].as_str();
        match flag {
            "-h" | "--help" => return Err(help_text()),
            "--no-augment" => options.no_augment = true,
            "--no-normalize" => options.no_normalize = true,
            "--no-balance" => options.no_balance = true,
            "--config" => options.config = Some(PathBuf::from(value(&args, &mut idx)?)),
            "--manifest" => options.manifest = Some(PathBuf::from(value(&args, &mut idx)?)),
            "--label-column" => options.label_column = Some(value(&args, &mut idx)?.to_string()),
            "--checkpoint-dir" => {
                options.checkpoint_dir = Some(PathBuf::from(value(&args, &mut idx)?));
            }
            "--header" => options.header = Some(parsed(&args, &mut idx)?),
            "--epochs" => options.epochs = Some(parsed(&args, &mut idx)?),
            "--batch" => options.batch_size = Some(parsed(&args, &mut idx)?),
            "--train-size" => options.train_size = Some(parsed(&args, &mut idx)?),
            "--classes" => options.n_classes = Some(parsed(&args, &mut idx)?),
            "--workers" => options.workers = Some(parsed(&args, &mut idx)?),
            "--seed" => options.seed = Some(parsed(&args, &mut idx)?),
            "--hidden" => options.hidden_size = Some(parsed(&args, &mut idx)?),
            "--learning-rate" => options.learning_rate = Some(parsed(&args, &mut idx)?),
            unknown => return Err(format!("Unknown argument: {unknown}\n\n{}", help_text())),
        }
        idx += 1;
    }
    if options.config.is_none() && options.manifest.is_none() {
        return Err(help_text());
    }
    Ok(options)
}

/// Advance past `args[idx]` and return the flag's value.
fn value<'a>(args: &'a [String], idx: &mut usize) -> Result<&'a str, String> {
    let flag = &args[*idx];
    *idx += 1;
    args.get(*idx)
        .map(String::as_str)
        .ok_or_else(|| format!("{flag} requires a value"))
}

fn parsed<T: std::str::FromStr>(args: &[String], idx: &mut usize) -> Result<T, String> {
    let flag = args[*idx].clone();
    let raw = value(args, idx)?;
    raw.parse::<T>()
        .map_err(|_| format!("Invalid {flag} value: {raw}"))
}

fn help_text() -> String {
    [
        "imgtrain",
        "",
        "Trains an image classifier from a CSV manifest and reports test metrics.",
        "",
        "Usage:",
        "  imgtrain --manifest <labels.csv> [options]",
        "  imgtrain --config <settings.toml> [options]",
        "",
        "Options:",
        "  --config <file>         TOML settings; flags below override it.",
        "  --manifest <file>       CSV manifest of image paths and labels.",
        "  --label-column <name>   Label column (default: last column).",
        "  --header <n>            Zero-based header row index (default 0).",
        "  --epochs <n>            Training epochs (default 20).",
        "  --batch <n>             Batch size (default 32).",
        "  --train-size <f>        Train fraction in (0, 1) (default 0.8).",
        "  --classes <n>           Number of classes (default: inferred).",
        "  --workers <n>           Batch producer threads, 0 = inline (default 4).",
        "  --seed <n>              RNG seed (default 42).",
        "  --hidden <n>            Hidden layer size (default 128).",
        "  --learning-rate <f>     Base learning rate (default 1e-3).",
        "  --checkpoint-dir <dir>  Checkpoint directory (default ./saved_models).",
        "  --no-augment            Plain shuffled batches, no checkpoints.",
        "  --no-normalize          Keep raw 0-255 pixel values.",
        "  --no-balance            Keep the original class distribution.",
    ]
    .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn flags_override_settings() {
        let options = parse_args(args(&[
            "--manifest",
            "data/labels.csv",
            "--epochs",
            "3",
            "--learning-rate",
            "0.01",
            "--no-augment",
        ]))
        .unwrap();
        let mut settings = TrainSettings::default();
        options.apply(&mut settings);
        assert_eq!(settings.data.manifest, PathBuf::from("data/labels.csv"));
        assert_eq!(settings.training.epochs, 3);
        assert!(!settings.training.augment);
        assert_eq!(
            settings.training.schedule,
            ScheduleSettings::Step { base_rate: 0.01 }
        );
    }

    #[test]
    fn missing_and_invalid_values_are_reported() {
        let err = parse_args(args(&["--manifest", "x.csv", "--epochs"])).unwrap_err();
        assert_eq!(err, "--epochs requires a value");
        let err = parse_args(args(&["--manifest", "x.csv", "--batch", "many"])).unwrap_err();
        assert_eq!(err, "Invalid --batch value: many");
        assert!(parse_args(args(&["--bogus"])).unwrap_err().starts_with("Unknown argument"));
    }
}
