use std::process::ExitCode;

use log::error;
use molgnn::{
    TrainConfig,
    error::Result,
    infer::Predictor,
    pipeline,
};

mod cli;

use cli::{Command, PredictArgs, TrainArgs};

fn train(args: TrainArgs) -> Result<()> {
    let mut cfg = match &args.config {
        Some(path) => TrainConfig::load(path)?,
        None => TrainConfig::default(),
    };
    if let Some(epochs) = args.epochs {
        cfg.epochs = epochs;
    }
    if let Some(dir) = args.artifact_dir {
        cfg.artifact_dir = dir;
    }

    let summary = pipeline::run(&args.data, &args.mode, &cfg)?;
    let report = &summary.report;

    println!(
        "Trained on {} datapoints for {} epochs in {:.1} s",
        summary.num_datapoints, report.epochs, report.elapsed_s
    );
    println!("Checkpoint: {:?}", report.model_path);

    Ok(())
}

fn predict(args: PredictArgs) -> Result<()> {
    let predictor = Predictor::load(&args.artifact_dir)?;
    let mode = predictor.config().mode.to_string();

    let datapoints = pipeline::load_datapoints(&args.data, &mode)?;
    let preds = predictor.predict(&datapoints)?;

    println!("{:<40} {:>12} {:>12}", "molecule", "label", "predicted");
    for (dp, pred) in datapoints.iter().zip(preds) {
        println!("{:<40} {:>12.4} {:>12.4}", dp.mol.ident, dp.y, pred);
    }

    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = cli::parse();
    let result = match cli.command {
        Command::Train(args) => train(args),
        Command::Predict(args) => predict(args),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
