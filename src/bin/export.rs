use chrono::{Local, NaiveDate};
use clap::Parser;
use snafu::{Report, ResultExt, Snafu, Whatever};
use std::path::PathBuf;
use tracing::{error, info, Level};

use totseg_measure::errors::archive::ArchiveError;
use totseg_measure::export::{export, ExportedDataset};
use totseg_measure::layout::TOTSEG_DIR;
use totseg_measure::Stage;

#[derive(Debug, Snafu)]
enum Error {
    #[snafu(display("Invalid data path: {}", path.display()))]
    InvalidDataPath { path: PathBuf },

    #[snafu(display("Error exporting {}: {}", path.display(), source))]
    Export {
        path: PathBuf,
        #[snafu(source(from(ArchiveError, Box::new)))]
        source: Box<ArchiveError>,
    },
}

fn default_dir(stage: Stage) -> PathBuf {
    PathBuf::from("build").join(TOTSEG_DIR).join(stage.folder())
}

#[derive(Parser, Debug)]
#[command(author = "Scott Chase Waggener", version = env!("CARGO_PKG_VERSION"), about = "Export cohort shape datasets with harmonized subject ids and visit numbers", long_about = None)]
struct Args {
    #[arg(
        help = "Measurement stage directory holding the cohort datasets",
        long = "data",
        short = 'd',
        default_value_os_t = default_dir(Stage::Measure)
    )]
    data: PathBuf,

    #[arg(
        help = "Directory receiving the exported datasets",
        long = "build",
        short = 'b',
        default_value_os_t = default_dir(Stage::Export)
    )]
    build: PathBuf,

    #[arg(
        help = "Date stamped in the file names, YYYY-MM-DD (default: today)",
        long = "date"
    )]
    date: Option<NaiveDate>,
}

fn main() {
    let args = Args::parse();

    tracing::subscriber::set_global_default(
        tracing_subscriber::FmtSubscriber::builder()
            .with_max_level(Level::INFO)
            .finish(),
    )
    .whatever_context("Could not set up global logging subscriber")
    .unwrap_or_else(|e: Whatever| {
        eprintln!("[ERROR] {}", Report::from_error(e));
    });

    run(args).unwrap_or_else(|e| {
        error!("{}", Report::from_error(e));
        std::process::exit(-1);
    });
}

fn run(args: Args) -> Result<Vec<ExportedDataset>, Error> {
    if !args.data.is_dir() {
        return InvalidDataPathSnafu { path: args.data }.fail();
    }
    let date = args.date.unwrap_or_else(|| Local::now().date_naive());
    let exported = export(&args.data, &args.build, date).context(ExportSnafu { path: &args.data })?;
    for dataset in exported.iter() {
        info!(
            "Exported {}, {} and {}",
            dataset.archive.display(),
            dataset.long.display(),
            dataset.wide.display()
        );
    }
    Ok(exported)
}

#[cfg(test)]
mod tests {
    use super::{default_dir, run, Args, Error};
    use chrono::NaiveDate;
    use rstest::rstest;
    use tempfile::TempDir;
    use totseg_measure::{dmr, Feature, FeatureKey, FeatureRecord, Stage};

    fn cohort(dir: &std::path::Path, name: &str) {
        let mut record = FeatureRecord::new();
        for (part, volume) in [("liver", 1450.0), ("femur_left", 320.0)] {
            record.insert(
                "1128_001",
                "Visit3",
                FeatureKey::new(part, "shape_ski", "volume"),
                Feature::float(volume, "Volume", "mL"),
            );
        }
        dmr::write(dir.join(name), &dmr::Dmr::from(&record)).unwrap();
    }

    #[test]
    fn test_export() {
        let dir = TempDir::new().unwrap();
        let data = dir.path().join("stage_3_measure");
        let build = dir.path().join("stage_3_export");
        cohort(&data, "Patients_totseg_auto");

        let exported = run(Args {
            data,
            build: build.clone(),
            date: NaiveDate::from_ymd_opt(2025, 1, 31),
        })
        .unwrap();
        assert_eq!(exported.len(), 1);
        assert_eq!(
            exported[0].archive,
            build.join("Patients_OrgansShape_2025-01-31.dmr.zip")
        );

        let wide = std::fs::read_to_string(build.join("Patients_OrgansShape_2025-01-31_wide.csv"))
            .unwrap();
        assert_eq!(
            wide.lines().collect::<Vec<_>>(),
            vec!["harmonized_id,visit_nr,liver-shape_ski-volume", "iBE-1128001,2,1450"]
        );
    }

    #[test]
    fn test_invalid_data_path() {
        let dir = TempDir::new().unwrap();
        let err = run(Args {
            data: dir.path().join("missing"),
            build: dir.path().join("out"),
            date: None,
        })
        .unwrap_err();
        assert!(matches!(err, Error::InvalidDataPath { .. }));
    }

    #[rstest]
    #[case(Stage::Measure, "build/totseg/stage_3_measure")]
    #[case(Stage::Export, "build/totseg/stage_3_export")]
    fn test_default_dir(#[case] stage: Stage, #[case] expected: &str) {
        assert_eq!(default_dir(stage), std::path::PathBuf::from(expected));
    }
}
