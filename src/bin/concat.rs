use clap::Parser;
use snafu::{Report, ResultExt, Snafu, Whatever};
use std::path::PathBuf;
use tracing::{error, info, warn, Level};

use totseg_measure::dmr::pars_to_parquet;
use totseg_measure::store::COHORT_SUFFIX;
use totseg_measure::errors::archive::ArchiveError;
use totseg_measure::{CohortDataset, Group, ResultStore};

#[derive(Debug, Snafu)]
enum Error {
    #[snafu(display("Invalid source path: {}", path.display()))]
    InvalidSourcePath { path: PathBuf },

    #[snafu(display("Error concatenating {}: {}", group, source))]
    Concatenate {
        group: Group,
        #[snafu(source(from(ArchiveError, Box::new)))]
        source: Box<ArchiveError>,
    },

    #[snafu(display("Error writing parquet table {}: {}", path.display(), source))]
    WriteParquet {
        path: PathBuf,
        #[snafu(source(from(ArchiveError, Box::new)))]
        source: Box<ArchiveError>,
    },
}

#[derive(Parser, Debug)]
#[command(author = "Scott Chase Waggener", version = env!("CARGO_PKG_VERSION"), about = "Concatenate per-image measurement archives into cohort datasets", long_about = None)]
struct Args {
    #[arg(help = "Measurement stage directory containing the Controls and Patients folders")]
    source: PathBuf,

    #[arg(
        help = "Also write the long table of each cohort as <group>_totseg_auto.parquet",
        long = "parquet",
        default_value_t = false
    )]
    parquet: bool,
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

fn run(args: Args) -> Result<Vec<CohortDataset>, Error> {
    if !args.source.is_dir() {
        return InvalidSourcePathSnafu { path: args.source }.fail();
    }

    let mut datasets = Vec::new();
    for group in Group::all() {
        let dataset = ResultStore::concatenate(&args.source, &group)
            .context(ConcatenateSnafu {
                group: group.clone(),
            })?;
        let Some(dataset) = dataset else {
            warn!("No archives found for {} in {}", group, args.source.display());
            continue;
        };
        info!(
            "Wrote {} values of {} to {}",
            dataset.dmr.len(),
            group,
            dataset.archive.display()
        );

        if args.parquet {
            let path = dataset.long.with_file_name(format!(
                "{}_{}.parquet",
                group.name(),
                COHORT_SUFFIX
            ));
            pars_to_parquet(&dataset.archive, &path).context(WriteParquetSnafu { path: &path })?;
            info!("Wrote {}", path.display());
        }
        datasets.push(dataset);
    }
    Ok(datasets)
}

#[cfg(test)]
mod tests {
    use super::{run, Args, Error};
    use arrow::array::{Array, Float64Array};
    use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
    use std::fs::File;
    use tempfile::TempDir;
    use totseg_measure::{Feature, FeatureKey, FeatureRecord, ResultStore};

    fn save(dir: &std::path::Path, subject: &str, volume: f64) {
        let mut record = FeatureRecord::new();
        record.insert(
            subject,
            "Baseline",
            FeatureKey::new("spleen", "shape_ski", "volume"),
            Feature::float(volume, "Volume", "mL"),
        );
        ResultStore::new(dir)
            .save(&record, subject, "Baseline", "total_mr")
            .unwrap();
    }

    #[test]
    fn test_concat_both_groups() {
        let dir = TempDir::new().unwrap();
        save(&dir.path().join("Controls"), "1128_001", 180.0);
        save(&dir.path().join("Patients/Bari"), "2128_001", 210.0);
        save(&dir.path().join("Patients/Turku"), "7128_001", 230.0);

        let datasets = run(Args {
            source: dir.path().to_path_buf(),
            parquet: false,
        })
        .unwrap();
        assert_eq!(datasets.len(), 2);
        assert_eq!(datasets[0].dmr.len(), 1);
        assert_eq!(datasets[1].dmr.len(), 2);
        assert!(dir.path().join("Patients_totseg_auto_wide.csv").is_file());
        assert!(!dir.path().join("Patients_totseg_auto.parquet").exists());
    }

    #[test]
    fn test_concat_parquet() {
        let dir = TempDir::new().unwrap();
        save(&dir.path().join("Controls"), "1128_001", 180.0);
        save(&dir.path().join("Controls"), "1128_002", 190.0);

        let datasets = run(Args {
            source: dir.path().to_path_buf(),
            parquet: true,
        })
        .unwrap();
        assert_eq!(datasets.len(), 1);

        let file = File::open(dir.path().join("Controls_totseg_auto.parquet")).unwrap();
        let mut reader = ParquetRecordBatchReaderBuilder::try_new(file)
            .unwrap()
            .build()
            .unwrap();
        let batch = reader.next().unwrap().unwrap();
        assert_eq!(batch.num_rows(), 2);
        let values = batch
            .column_by_name("value")
            .unwrap()
            .as_any()
            .downcast_ref::<Float64Array>()
            .unwrap();
        assert_eq!(values.len(), 2);
        assert_eq!(values.value(0), 180.0);
        assert_eq!(values.value(1), 190.0);
    }

    #[test]
    fn test_invalid_source() {
        let dir = TempDir::new().unwrap();
        let err = run(Args {
            source: dir.path().join("missing"),
            parquet: false,
        })
        .unwrap_err();
        assert!(matches!(err, Error::InvalidSourcePath { .. }));
    }
}
