use std::path::PathBuf;

use clap::Parser;
use snafu::{Report, ResultExt, Snafu, Whatever};
use tracing::{error, info, Dispatch, Level};

use totseg_measure::errors::MeasureError;
use totseg_measure::layout::SITES;
use totseg_measure::{Group, Layout, LogConfig, MeasureSummary, Measurer, Stage, Task};

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("Invalid build path: {}", path.display()))]
    InvalidBuildPath { path: PathBuf },

    #[snafu(display("Unknown site {}, expected one of {:?}", site, SITES))]
    InvalidSite { site: String },

    #[snafu(display("A site can only be given for the Patients group"))]
    SiteWithoutPatients,

    #[snafu(display("Measurement failed: {}", source))]
    Measure {
        #[snafu(source(from(MeasureError, Box::new)))]
        source: Box<MeasureError>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum GroupArg {
    Controls,
    Patients,
}

#[derive(Parser, Debug)]
#[command(author = "Scott Chase Waggener", version = env!("CARGO_PKG_VERSION"), about = "Measure organ shape biomarkers on TotalSegmentator MR segmentations", long_about = None)]
struct Args {
    #[arg(help = "Build directory of the pipeline, containing the totseg stage folders")]
    build: PathBuf,

    #[arg(
        help = "Group to measure. Both groups are measured when omitted",
        long = "group",
        short = 'g',
        value_parser = clap::value_parser!(GroupArg),
    )]
    group: Option<GroupArg>,

    #[arg(
        help = "Site of the Patients group. All sites are measured when omitted",
        long = "site",
        short = 's'
    )]
    site: Option<String>,

    #[arg(
        help = "Segmentation task to measure. Can be repeated, all tasks are measured when omitted",
        long = "task",
        short = 't',
        value_parser = clap::value_parser!(Task),
    )]
    task: Vec<Task>,

    #[arg(
        help = "Measure the manually edited mask of this organ instead of the automated segmentations",
        long = "edited",
        short = 'e'
    )]
    edited: Option<String>,

    #[arg(
        help = "Log file. Defaults to error.log in the build directory",
        long = "log-file"
    )]
    log_file: Option<PathBuf>,

    #[arg(
        help = "Do not rebuild the cohort datasets after measuring",
        long = "no-concat",
        default_value_t = false
    )]
    no_concat: bool,

    #[arg(
        help = "Abort on the first image that fails to be measured",
        long = "strict",
        default_value_t = false
    )]
    strict: bool,

    #[arg(
        help = "Also log skipped images and regions",
        long = "verbose",
        short = 'v',
        default_value_t = false
    )]
    verbose: bool,
}

impl Args {
    fn log_config(&self) -> LogConfig {
        let level = if self.verbose {
            Level::DEBUG
        } else {
            Level::INFO
        };
        let file = match (&self.log_file, self.build.is_dir()) {
            (Some(path), _) => Some(path.clone()),
            (None, true) => Some(Layout::new(&self.build).log_file()),
            (None, false) => None,
        };
        LogConfig::new(level, file)
    }

    fn groups(&self) -> Result<Vec<Group>, Error> {
        if let Some(site) = &self.site {
            if !SITES.contains(&site.as_str()) {
                return InvalidSiteSnafu { site }.fail();
            }
        }
        match (self.group, &self.site) {
            (Some(GroupArg::Controls), Some(_)) => SiteWithoutPatientsSnafu.fail(),
            (Some(GroupArg::Controls), None) => Ok(vec![Group::Controls]),
            (_, Some(site)) => Ok(vec![Group::patients(site)]),
            (Some(GroupArg::Patients), None) => Ok(vec![Group::Patients { site: None }]),
            (None, None) => Ok(Group::all().to_vec()),
        }
    }

    fn tasks(&self) -> Vec<Task> {
        if self.task.is_empty() {
            Task::ALL.to_vec()
        } else {
            self.task.clone()
        }
    }
}

fn main() {
    let args = Args::parse();

    let dispatch = args.log_config().dispatch().unwrap_or_else(|e| {
        eprintln!("[ERROR] {}", Report::from_error(e));
        std::process::exit(-1);
    });
    tracing::dispatcher::set_global_default(dispatch.clone())
        .whatever_context("Could not set up global logging subscriber")
        .unwrap_or_else(|e: Whatever| {
            eprintln!("[ERROR] {}", Report::from_error(e));
        });

    run(args, dispatch).unwrap_or_else(|e| {
        error!("{}", Report::from_error(e));
        std::process::exit(-1);
    });
}

fn run(args: Args, dispatch: Dispatch) -> Result<MeasureSummary, Error> {
    if !args.build.is_dir() {
        return InvalidBuildPathSnafu { path: args.build }.fail();
    }
    let layout = Layout::new(&args.build);
    let groups = args.groups()?;
    let tasks = args.tasks();
    let measurer = Measurer::dicom(dispatch).strict(args.strict);

    let mut summary = MeasureSummary::default();
    let stage = match &args.edited {
        Some(organ) => {
            // The organ is measured with the first task that defines it
            let task = tasks
                .iter()
                .copied()
                .find(|task| task.label_of(organ).is_ok())
                .unwrap_or(tasks[0]);
            for group in groups.iter() {
                summary = summary
                    + measurer
                        .edited_organ(&layout, group, task, organ)
                        .context(MeasureSnafu)?;
            }
            Stage::EditedMeasure
        }
        None => {
            for group in groups.iter() {
                for task in tasks.iter() {
                    summary = summary
                        + measurer
                            .all_organs(&layout, group, *task)
                            .context(MeasureSnafu)?;
                }
            }
            Stage::Measure
        }
    };
    info!("Measurement finished: {}", summary);

    if !args.no_concat {
        let datasets = measurer
            .concatenate(&layout, stage)
            .context(MeasureSnafu)?;
        for dataset in datasets {
            info!(
                "Cohort dataset {} ({} values)",
                dataset.archive.display(),
                dataset.dmr.len()
            );
        }
    }
    Ok(summary)
}
