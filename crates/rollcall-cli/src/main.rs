use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use rollcall_core::ScrfdDetector;
use rollcall_engine::{
    Config, EnrollmentPipeline, MarkStatus, Recognizer, Reconciler, Trainer,
};
use rollcall_store::{Database, SampleStore};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "rollcall", about = "Face-recognition attendance portal CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a student in the identity registry
    AddStudent {
        roll_number: String,
        name: String,
    },
    /// Register a subject
    AddSubject {
        name: String,
    },
    /// Capture face samples for a registered student from image files
    Enroll {
        roll_number: String,
        /// Must match the registered name (case-insensitive)
        name: String,
        /// Image files to extract face samples from
        #[arg(required = true)]
        images: Vec<PathBuf>,
    },
    /// Remove every stored face sample for a student, ahead of a re-capture
    ClearSamples {
        roll_number: String,
    },
    /// Retrain the recognition model over all stored samples
    Train,
    /// Recognize faces in a frame (no attendance is recorded)
    Recognize {
        image: PathBuf,
    },
    /// Recognize faces in a frame and mark attendance for a subject
    Mark {
        subject: String,
        image: PathBuf,
        /// Calendar day to record against (default: today)
        #[arg(long)]
        date: Option<NaiveDate>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();

    match cli.command {
        Commands::AddStudent { roll_number, name } => {
            let db = Database::open(&config.db_path)?;
            db.add_student(&roll_number, &name)?;
            println!("registered student {name} ({roll_number})");
        }
        Commands::AddSubject { name } => {
            let db = Database::open(&config.db_path)?;
            let id = db.add_subject(&name)?;
            println!("registered subject {name} (id {id})");
        }
        Commands::Enroll { roll_number, name, images } => {
            let db = Database::open(&config.db_path)?;
            let store = SampleStore::open(&config.samples_dir)?;
            let mut detector = ScrfdDetector::load(&config.detector_asset)?;

            let mut raw = Vec::with_capacity(images.len());
            for path in &images {
                raw.push(
                    std::fs::read(path)
                        .with_context(|| format!("reading {}", path.display()))?,
                );
            }

            let mut pipeline = EnrollmentPipeline::new(&mut detector, &db, &store);
            let written = pipeline.enroll(&roll_number, &name, &raw)?;
            println!("saved {written} new face samples for {name}");
            println!("run `rollcall train` to make them recognizable");
        }
        Commands::ClearSamples { roll_number } => {
            let store = SampleStore::open(&config.samples_dir)?;
            store.clear(&roll_number)?;
            println!("cleared stored samples for {roll_number}");
            println!("enroll new images and run `rollcall train` to update the model");
        }
        Commands::Train => {
            let store = SampleStore::open(&config.samples_dir)?;
            let report = Trainer::new(&store, &config.model_path).train()?;
            println!(
                "model trained over {} samples from {} students",
                report.samples, report.identities
            );
        }
        Commands::Recognize { image } => {
            let detector = ScrfdDetector::load(&config.detector_asset)?;
            let mut recognizer =
                Recognizer::load(&config.model_path, detector, config.distance_threshold)?;

            let frame = image::open(&image)
                .with_context(|| format!("reading {}", image.display()))?
                .to_luma8();
            let results = recognizer.recognize(&frame)?;

            if results.is_empty() {
                println!("no faces detected");
            }
            for r in &results {
                match &r.roll_number {
                    Some(roll) => println!(
                        "{roll} (distance {:.1}) at {:.0},{:.0} {:.0}x{:.0}",
                        r.distance, r.face.x, r.face.y, r.face.width, r.face.height
                    ),
                    None => println!(
                        "unknown (distance {:.1}) at {:.0},{:.0} {:.0}x{:.0}",
                        r.distance, r.face.x, r.face.y, r.face.width, r.face.height
                    ),
                }
            }
        }
        Commands::Mark { subject, image, date } => {
            let db = Database::open(&config.db_path)?;
            let detector = ScrfdDetector::load(&config.detector_asset)?;
            let mut recognizer =
                Recognizer::load(&config.model_path, detector, config.distance_threshold)?;

            let frame = image::open(&image)
                .with_context(|| format!("reading {}", image.display()))?
                .to_luma8();
            let recognitions = recognizer.recognize(&frame)?;

            let day = date.unwrap_or_else(|| chrono::Local::now().date_naive());
            let reconciler = Reconciler::new(&db, &db, &db);
            let outcomes = reconciler.reconcile(&subject, &recognitions, day)?;

            for outcome in &outcomes {
                let status = match outcome.status {
                    MarkStatus::Marked => "attendance marked",
                    MarkStatus::AlreadyMarked => "already marked today",
                };
                println!("{} ({}): {status}", outcome.name, outcome.roll_number);
            }
        }
    }

    Ok(())
}
