use std::{
    fs::{self, File},
    io::{self, BufWriter, Write},
    path::{Path, PathBuf},
};

use log::info;
use machine_learning::training::History;
use serde::Serialize;

use crate::configs::ModelType;

/// The performance summary of a training run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub model_type: String,
    pub parameters: usize,
    pub epochs: usize,
    pub best_epoch: Option<usize>,
    pub best_test_loss: Option<f32>,
    pub final_train_loss: Option<f32>,
    pub final_test_loss: Option<f32>,
    /// The relative L2 error of the final parameters on the test split.
    pub test_rel_l2: f32,
    pub train_loss: Vec<f32>,
    pub test_loss: Vec<f32>,
}

/// Where a report was written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportPaths {
    pub json: PathBuf,
    pub csv: PathBuf,
}

impl Report {
    pub fn new(
        model_type: ModelType,
        parameters: usize,
        history: &History,
        test_rel_l2: f32,
    ) -> Self {
        let best = history.best();
        let last = history.last();

        Self {
            model_type: model_type.to_string(),
            parameters,
            epochs: history.epochs(),
            best_epoch: best.map(|(epoch, _)| epoch),
            best_test_loss: best.map(|(_, loss)| loss),
            final_train_loss: last.map(|(train, _)| train),
            final_test_loss: last.map(|(_, test)| test),
            test_rel_l2,
            train_loss: history.train_loss().to_vec(),
            test_loss: history.test_loss().to_vec(),
        }
    }

    /// Writes the report as `<name>_loss.json` and the loss curves as `<name>_loss.csv`.
    ///
    /// # Arguments
    /// * `dir` - The directory to write to, created if missing.
    /// * `name` - The base name of the artifacts.
    ///
    /// # Returns
    /// The paths of both artifacts.
    pub fn write(&self, dir: &Path, name: &str) -> io::Result<ReportPaths> {
        fs::create_dir_all(dir)?;

        let paths = ReportPaths {
            json: dir.join(format!("{name}_loss.json")),
            csv: dir.join(format!("{name}_loss.csv")),
        };

        let mut json = BufWriter::new(File::create(&paths.json)?);
        serde_json::to_writer_pretty(&mut json, self)?;
        json.flush()?;

        let mut csv = BufWriter::new(File::create(&paths.csv)?);
        writeln!(csv, "epoch,train_loss,test_loss")?;
        for (i, (train, test)) in self.train_loss.iter().zip(&self.test_loss).enumerate() {
            writeln!(csv, "{},{train},{test}", i + 1)?;
        }
        csv.flush()?;

        Ok(paths)
    }

    /// Logs the summary.
    pub fn log(&self) {
        info!(
            model_type = self.model_type.as_str(),
            parameters = self.parameters,
            epochs = self.epochs;
            "training finished"
        );

        if let (Some(epoch), Some(loss)) = (self.best_epoch, self.best_test_loss) {
            info!(best_epoch = epoch, best_test_loss = loss; "best test loss {loss:.6e} at epoch {epoch}");
        }

        if let (Some(train), Some(test)) = (self.final_train_loss, self.final_test_loss) {
            info!(train_loss = train, test_loss = test; "final losses");
        }

        info!(test_rel_l2 = self.test_rel_l2; "relative L2 test error {:.4}", self.test_rel_l2);
    }
}

/// Logs the summary of a run and writes its artifacts to `dir`.
///
/// # Arguments
/// * `model_type` - The trained architecture.
/// * `parameters` - The amount of trainable parameters.
/// * `history` - The per epoch losses.
/// * `test_rel_l2` - The relative L2 error on the test split.
/// * `dir` - The directory to write the artifacts to.
/// * `name` - The base name of the artifacts.
///
/// # Returns
/// The paths of the written artifacts.
pub fn report(
    model_type: ModelType,
    parameters: usize,
    history: &History,
    test_rel_l2: f32,
    dir: &Path,
    name: &str,
) -> io::Result<ReportPaths> {
    let report = Report::new(model_type, parameters, history, test_rel_l2);
    report.log();
    report.write(dir, name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history() -> History {
        let mut history = History::new();
        history.push(1.0, 0.8);
        history.push(0.5, 0.4);
        history.push(0.25, 0.6);
        history
    }

    #[test]
    fn summarizes_the_history() {
        let report = Report::new(ModelType::Fno, 42, &history(), 0.125);

        assert_eq!(report.model_type, "FNO");
        assert_eq!(report.epochs, 3);
        assert_eq!((report.best_epoch, report.best_test_loss), (Some(2), Some(0.4)));
        assert_eq!(
            (report.final_train_loss, report.final_test_loss),
            (Some(0.25), Some(0.6))
        );
    }

    #[test]
    fn writes_json_and_csv() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("reports");

        let paths = report(ModelType::DeepONet, 7, &history(), 0.5, &out, "deeponet").unwrap();
        assert_eq!(paths.json, out.join("deeponet_loss.json"));

        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&paths.json).unwrap()).unwrap();
        assert_eq!(json["model_type"], "DeepONet");
        assert_eq!(json["parameters"], 7);
        assert_eq!(json["best_epoch"], 2);
        assert_eq!(json["test_loss"].as_array().unwrap().len(), 3);

        let csv = fs::read_to_string(&paths.csv).unwrap();
        let lines: Vec<_> = csv.lines().collect();
        assert_eq!(lines[0], "epoch,train_loss,test_loss");
        assert_eq!(lines[1], "1,1,0.8");
        assert_eq!(lines.len(), 4);
    }
}
